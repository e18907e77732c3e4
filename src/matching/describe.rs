//! Description strings used for pairing records.

use tracing::debug;

use crate::docs::sheet::{Cell, CellRef, SheetGrid};
use crate::docs::types::StructuredRecord;

/// Marker that separates a campaign code such as `(AC-118)` from its name.
const CODE_MARKER: &str = ") ";

/// Text derived from a record for similarity scoring.
///
/// `Invalid` stands for a missing or unusable description and never matches
/// anything, not even another `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Description {
    Valid(String),
    Invalid,
}

impl Description {
    pub fn as_valid(&self) -> Option<&str> {
        match self {
            Description::Valid(text) => Some(text),
            Description::Invalid => None,
        }
    }
}

/// Keep what follows the code marker, drop path separators, collapse
/// whitespace runs and trim.
pub fn normalize(raw: &str) -> Description {
    let tail = match raw.find(CODE_MARKER) {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    };
    let without_separators: String = tail.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    let collapsed = without_separators.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        Description::Invalid
    } else {
        Description::Valid(collapsed)
    }
}

/// Description of a briefing: the text cell at `at`.
pub fn from_briefing(grid: &SheetGrid, at: CellRef) -> Description {
    match grid.get(at) {
        Some(Cell::Text(raw)) => normalize(raw),
        other => {
            debug!(cell = %at, found = ?other, "Description cell is not text");
            Description::Invalid
        }
    }
}

/// Description of a decoded reference document. Only a missing or
/// non-string description yields `Invalid`; other sections are not consulted.
pub fn from_record(record: Option<&StructuredRecord>) -> Description {
    record
        .and_then(StructuredRecord::description)
        .map(normalize)
        .unwrap_or(Description::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with(cell: Cell) -> SheetGrid {
        let mut rows = vec![Vec::new(); 6];
        let mut row = vec![Cell::Empty; 7];
        row.push(cell);
        rows.push(row);
        SheetGrid::from_rows(rows)
    }

    const H7: CellRef = CellRef { row: 6, col: 7 };

    #[test]
    fn test_normalize_strips_code_and_noise() {
        assert_eq!(
            normalize("(AC-118) Envio de SMS /  a clientes   Alta  "),
            Description::Valid("Envio de SMS a clientes Alta".to_string())
        );
        assert_eq!(
            normalize("  Campaña nómina "),
            Description::Valid("Campaña nómina".to_string())
        );
    }

    #[test]
    fn test_normalize_only_uses_first_marker() {
        assert_eq!(
            normalize("(A) Tarjeta (oro) premium"),
            Description::Valid("Tarjeta (oro) premium".to_string())
        );
    }

    #[test]
    fn test_blank_description_is_invalid() {
        assert_eq!(normalize("(AC-1)  / "), Description::Invalid);
        assert_eq!(normalize(""), Description::Invalid);
    }

    #[test]
    fn test_briefing_text_cell() {
        let grid = grid_with(Cell::Text("(AC-118) Envio de SMS a clientes Alta".into()));
        assert_eq!(
            from_briefing(&grid, H7),
            Description::Valid("Envio de SMS a clientes Alta".to_string())
        );
    }

    #[test]
    fn test_briefing_numeric_cell_is_invalid() {
        let grid = grid_with(Cell::Number(2025.0));
        assert_eq!(from_briefing(&grid, H7), Description::Invalid);
    }

    #[test]
    fn test_briefing_missing_cell_is_invalid() {
        let grid = SheetGrid::from_rows(vec![vec![Cell::Text("Briefing".into())]]);
        assert_eq!(from_briefing(&grid, H7), Description::Invalid);
    }

    fn from_text(text: &str) -> Description {
        from_record(StructuredRecord::decode(text).as_ref())
    }

    #[test]
    fn test_reference_description() {
        let text = r#"{"commercial_activity": {}, "description": "(AC-118) Envio de SMS a clientes Alta", "success_criteria": []}"#;
        assert_eq!(
            from_text(text),
            Description::Valid("Envio de SMS a clientes Alta".to_string())
        );
    }

    #[test]
    fn test_reference_description_survives_drift_elsewhere() {
        let expected = Description::Valid("Envio de SMS a clientes Alta".to_string());
        for text in [
            r#"{"description": "(AC-1) Envio de SMS a clientes Alta", "success_criteria": null}"#,
            r#"{"description": "(AC-1) Envio de SMS a clientes Alta", "commercial_activity": null}"#,
            r#"{"description": "(AC-1) Envio de SMS a clientes Alta", "commercial_activity": {"start_date": 20250401}, "success_criteria": [{"metric_name": 7}]}"#,
        ] {
            assert_eq!(from_text(text), expected, "{}", text);
        }
    }

    #[test]
    fn test_reference_without_usable_description() {
        assert_eq!(from_text(r#"{"description": null}"#), Description::Invalid);
        assert_eq!(from_text(r#"{"description": ["x"]}"#), Description::Invalid);
        assert_eq!(from_text("not json"), Description::Invalid);
        assert_eq!(from_text(""), Description::Invalid);
        assert_eq!(from_record(None), Description::Invalid);
    }
}
