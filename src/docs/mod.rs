pub mod sheet;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use sheet::SheetGrid;
use types::{RecordId, StructuredRecord};

pub const REFERENCE_EXTENSIONS: &[&str] = &["json"];
pub const BRIEFING_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// A reference document: literal text for prompts plus its decoded record.
#[derive(Debug, Clone)]
pub struct ReferenceDoc {
    pub id: RecordId,
    pub text: String,
    /// `None` when the text is not a JSON object.
    pub record: Option<StructuredRecord>,
}

impl ReferenceDoc {
    pub fn new(id: RecordId, text: String) -> Self {
        let record = StructuredRecord::decode(&text);
        Self { id, text, record }
    }
}

/// Files directly inside `dir` with one of the given extensions, sorted by path.
/// Excel lock files (`~$name.xlsx`) are skipped.
pub async fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<RecordId>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        let lock_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("~$"))
            .unwrap_or(false);
        if wanted && !lock_file && entry.file_type().await?.is_file() {
            found.push(RecordId::new(path));
        }
    }

    found.sort();
    Ok(found)
}

/// Read every reference document in `dir`. An unreadable file is kept with
/// empty text, which later yields the invalid description.
pub async fn load_references(dir: &Path) -> Result<Vec<ReferenceDoc>> {
    let mut docs = Vec::new();
    for id in list_files(dir, REFERENCE_EXTENSIONS).await? {
        let text = match tokio::fs::read_to_string(id.path()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %id, error = %e, "Unreadable reference document");
                String::new()
            }
        };
        debug!(file = %id, size = text.len(), "reference loaded");
        docs.push(ReferenceDoc::new(id, text));
    }
    Ok(docs)
}

/// Decode the first sheet of one workbook off the async runtime.
pub async fn read_briefing(path: &Path) -> Result<SheetGrid> {
    let owned = path.to_path_buf();
    let grid = tokio::task::spawn_blocking(move || sheet::read_first_sheet(&owned))
        .await
        .context("spawn_blocking join failed")?
        .with_context(|| format!("Failed to read workbook {}", path.display()))?;
    Ok(grid)
}

/// Load every briefing workbook in `dir`. Workbooks that fail to decode are
/// logged and left out.
pub async fn load_briefings(dir: &Path) -> Result<BTreeMap<RecordId, SheetGrid>> {
    let mut grids = BTreeMap::new();
    for id in list_files(dir, BRIEFING_EXTENSIONS).await? {
        match read_briefing(id.path()).await {
            Ok(grid) => {
                debug!(file = %id, "briefing loaded");
                grids.insert(id, grid);
            }
            Err(e) => warn!(file = %id, error = %format!("{:#}", e), "Skipping briefing"),
        }
    }
    Ok(grids)
}
