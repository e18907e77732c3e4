pub mod describe;
pub mod similarity;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::docs::types::RecordId;
use describe::Description;
pub use similarity::similarity;

pub const DEFAULT_THRESHOLD: f64 = 0.93;

/// A reference document paired with a briefing by description similarity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchedPair {
    pub reference_id: RecordId,
    pub briefing_id: RecordId,
    pub reference_description: String,
    pub briefing_description: String,
}

/// Compare every reference description with every briefing description and
/// keep each pair scoring at least `threshold`.
///
/// One reference may pair with several briefings and vice versa; no best
/// match is picked. Invalid descriptions are excluded before scoring.
pub fn match_descriptions(
    references: &BTreeMap<RecordId, Description>,
    briefings: &BTreeMap<RecordId, Description>,
    threshold: f64,
) -> BTreeSet<MatchedPair> {
    let mut matches = BTreeSet::new();

    for (reference_id, reference_desc) in references {
        let Some(reference_text) = reference_desc.as_valid() else {
            continue;
        };
        for (briefing_id, briefing_desc) in briefings {
            let Some(briefing_text) = briefing_desc.as_valid() else {
                continue;
            };
            let score = similarity(reference_text, briefing_text);
            if score >= threshold {
                debug!(
                    reference = %reference_id,
                    briefing = %briefing_id,
                    score,
                    "descriptions match"
                );
                matches.insert(MatchedPair {
                    reference_id: reference_id.clone(),
                    briefing_id: briefing_id.clone(),
                    reference_description: reference_text.to_string(),
                    briefing_description: briefing_text.to_string(),
                });
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptions(entries: &[(&str, Option<&str>)]) -> BTreeMap<RecordId, Description> {
        entries
            .iter()
            .map(|(path, text)| {
                let desc = match text {
                    Some(t) => Description::Valid(t.to_string()),
                    None => Description::Invalid,
                };
                (RecordId::new(*path), desc)
            })
            .collect()
    }

    #[test]
    fn test_close_descriptions_are_paired() {
        let refs = descriptions(&[("jsons/a.json", Some("Envio de SMS a clientes Alta"))]);
        let briefs = descriptions(&[("briefing/a.xlsx", Some("Envio de SMS a clientes Alta "))]);
        let matches = match_descriptions(&refs, &briefs, DEFAULT_THRESHOLD);
        assert_eq!(matches.len(), 1);
        let pair = matches.iter().next().unwrap();
        assert_eq!(pair.reference_id, RecordId::new("jsons/a.json"));
        assert_eq!(pair.briefing_id, RecordId::new("briefing/a.xlsx"));
    }

    #[test]
    fn test_distant_descriptions_are_not_paired() {
        let refs = descriptions(&[("a.json", Some("Campaña A"))]);
        let briefs = descriptions(&[(
            "b.xlsx",
            Some("Campaña B — totalmente distinta y mucho más larga"),
        )]);
        assert!(match_descriptions(&refs, &briefs, DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_invalid_never_matches_even_at_zero_threshold() {
        let refs = descriptions(&[("a.json", None), ("b.json", Some("Campaña nómina"))]);
        let briefs = descriptions(&[("a.xlsx", None)]);
        assert!(match_descriptions(&refs, &briefs, 0.0).is_empty());
        assert!(match_descriptions(&refs, &briefs, 1.0).is_empty());
    }

    #[test]
    fn test_many_to_many_pairs_are_kept() {
        let refs = descriptions(&[
            ("a.json", Some("Campaña nómina verano")),
            ("b.json", Some("Campaña nómina verano")),
        ]);
        let briefs = descriptions(&[
            ("x.xlsx", Some("Campaña nómina verano")),
            ("y.xlsx", Some("Campaña nómina veranos")),
        ]);
        let matches = match_descriptions(&refs, &briefs, DEFAULT_THRESHOLD);
        assert_eq!(matches.len(), 4);
    }

    #[test]
    fn test_every_pair_clears_threshold_and_rerun_is_identical() {
        let refs = descriptions(&[
            ("1.json", Some("Tarjeta oro bienvenida")),
            ("2.json", Some("Tarjeta plata bienvenida")),
            ("3.json", Some("Préstamo preconcedido")),
        ]);
        let briefs = descriptions(&[
            ("1.xlsx", Some("Tarjeta oro bienvenida")),
            ("2.xlsx", Some("Tarjeta plata bienvenid")),
            ("3.xlsx", Some("Prestamo preconcedido")),
        ]);
        for threshold in [0.5, 0.8, 0.93, 1.0] {
            let first = match_descriptions(&refs, &briefs, threshold);
            for pair in &first {
                assert!(
                    similarity(&pair.reference_description, &pair.briefing_description)
                        >= threshold
                );
            }
            assert_eq!(first, match_descriptions(&refs, &briefs, threshold));
        }
    }
}
