//! First-sheet extraction from briefing workbooks.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Excel parse error: {0}")]
    Calamine(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheets,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid cell reference '{0}', expected A1 notation such as H7")]
pub struct CellRefError(pub String);

/// Zero-based absolute cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl FromStr for CellRef {
    type Err = CellRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_uppercase();
        let split = raw
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| CellRefError(s.to_string()))?;
        let (letters, digits) = raw.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(CellRefError(s.to_string()));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            col = col
                .checked_mul(26)
                .and_then(|v| v.checked_add(c as u32 - 'A' as u32 + 1))
                .ok_or_else(|| CellRefError(s.to_string()))?;
        }
        let row: u32 = digits.parse().map_err(|_| CellRefError(s.to_string()))?;
        if row == 0 {
            return Err(CellRefError(s.to_string()));
        }

        Ok(CellRef {
            row: row - 1,
            col: col - 1,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let letters: String = letters.into_iter().rev().collect();
        write!(f, "{}{}", letters, self.row + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Error(String),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(f) => {
                if f.fract() == 0.0 {
                    format!("{:.0}", f)
                } else {
                    format!("{}", f)
                }
            }
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
            Cell::Date(dt) => {
                if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            Cell::Error(e) => format!("#ERROR: {}", e),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(parsed) => Cell::Date(parsed),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                Ok(parsed) => Cell::Date(parsed),
                Err(_) => Cell::Text(s.clone()),
            },
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Error(format!("{:?}", e)),
        }
    }
}

/// The used cells of one worksheet, indexed by absolute position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    rows: Vec<Vec<Cell>>,
}

impl SheetGrid {
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn get(&self, at: CellRef) -> Option<&Cell> {
        self.rows.get(at.row as usize)?.get(at.col as usize)
    }

    /// Plain-text dump for prompts: one line per non-empty row, cells joined by ` | `.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Cell::render).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            let last = cells.iter().rposition(|c| !c.is_empty()).unwrap_or(0);
            text.push_str(&cells[..=last].join(" | "));
            text.push('\n');
        }
        text
    }
}

/// Read the first worksheet of an `.xlsx`/`.xls` file. Blocking.
pub fn read_first_sheet(path: &Path) -> Result<SheetGrid, SheetError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::NoSheets)??;

    let Some((start_row, start_col)) = range.start() else {
        return Ok(SheetGrid::default());
    };

    let mut rows: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<Cell> = (0..start_col).map(|_| Cell::Empty).collect();
        cells.extend(row.iter().map(Cell::from));
        rows.push(cells);
    }

    Ok(SheetGrid::from_rows(rows))
}
