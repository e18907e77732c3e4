use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Path of one source document. Stable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(PathBuf);

impl RecordId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Base file name, for console output.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Reference campaign document exported from the campaign platform.
///
/// Sections other than `description` are optional: a section that is null or
/// has an unexpected shape decodes as `None` instead of failing the record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub commercial_activity: Option<CommercialActivity>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub success_criteria: Option<Vec<Value>>,
    #[serde(default)]
    pub customer_segmentation: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommercialActivity {
    #[serde(default)]
    pub start_date: Option<Value>,
    #[serde(default)]
    pub end_date: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
}

/// `Some(T)` when the value has the shape of `T`, `None` otherwise.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl StructuredRecord {
    /// Decode a reference document. `None` when the text is not a JSON object.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "Reference document does not decode");
                None
            }
        }
    }

    /// Raw description text: the top-level `description`, or the one nested
    /// under `commercial_activity`. `None` when absent or not a string.
    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().and_then(Value::as_str).or_else(|| {
            self.commercial_activity
                .as_ref()?
                .description
                .as_ref()
                .and_then(Value::as_str)
        })
    }

    pub fn criteria(&self) -> &[Value] {
        self.success_criteria.as_deref().unwrap_or_default()
    }

    /// Metric names of the success criteria that carry a string name.
    pub fn metric_names(&self) -> Vec<&str> {
        self.criteria()
            .iter()
            .filter_map(|c| c.get("metric_name").and_then(Value::as_str))
            .collect()
    }

    pub fn is_segmented(&self) -> bool {
        matches!(&self.customer_segmentation, Some(v) if !v.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_document() {
        let record = StructuredRecord::decode(
            r#"{
                "commercial_activity": {"start_date": "2025-04-01", "end_date": "2025-04-30", "channel": "SMS"},
                "description": "(AC-118) Envio de SMS a clientes Alta",
                "success_criteria": [
                    {"metric_name": "altas", "function": "count", "min_amount": 300, "time_window": "30d"}
                ],
                "customer_segmentation": null
            }"#,
        )
        .unwrap();
        assert_eq!(record.description(), Some("(AC-118) Envio de SMS a clientes Alta"));
        let activity = record.commercial_activity.as_ref().unwrap();
        assert_eq!(activity.start_date.as_ref().and_then(Value::as_str), Some("2025-04-01"));
        assert_eq!(record.metric_names(), vec!["altas"]);
        assert!(!record.is_segmented());
    }

    #[test]
    fn test_description_falls_back_to_activity() {
        let record = StructuredRecord::decode(
            r#"{"commercial_activity": {"description": "Campaña nómina"}, "customer_segmentation": {"segment": "Alta"}}"#,
        )
        .unwrap();
        assert_eq!(record.description(), Some("Campaña nómina"));
        assert!(record.is_segmented());
    }

    #[test]
    fn test_drifted_sections_keep_the_description() {
        let docs = [
            r#"{"description": "(AC-1) Envio", "success_criteria": null}"#,
            r#"{"description": "(AC-1) Envio", "commercial_activity": null}"#,
            r#"{"description": "(AC-1) Envio", "commercial_activity": "n.a.", "success_criteria": {"metric_name": 7}}"#,
            r#"{"description": "(AC-1) Envio", "commercial_activity": {"start_date": 20250401}, "success_criteria": [{"metric_name": 7}, 3]}"#,
        ];
        for text in docs {
            let record = StructuredRecord::decode(text).unwrap();
            assert_eq!(record.description(), Some("(AC-1) Envio"), "{}", text);
        }

        let record = StructuredRecord::decode(docs[3]).unwrap();
        assert_eq!(record.criteria().len(), 2);
        assert!(record.metric_names().is_empty());
    }

    #[test]
    fn test_non_string_description() {
        let record = StructuredRecord::decode(r#"{"description": 42}"#).unwrap();
        assert_eq!(record.description(), None);
        assert!(StructuredRecord::decode("not json").is_none());
        assert!(StructuredRecord::decode("[1, 2]").is_none());
    }

    #[test]
    fn test_record_id_file_name() {
        let id = RecordId::new("/data/reports/jsons/AC-118.json");
        assert_eq!(id.file_name(), "AC-118.json");
    }
}
