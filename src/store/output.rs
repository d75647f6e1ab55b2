use super::StoreError;
use crate::domain::{AWARD_ID_FIELD, AwardRecord};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Append-only CSV file of award rows with a single header row.
///
/// A new file gets the requested fields followed by the identifier column.
/// When rows are appended to a file that already has a header, the cells
/// follow that header instead, so rows always line up with the columns on disk.
#[derive(Debug, Clone)]
pub struct OutputStore {
    path: PathBuf,
    columns: Vec<String>,
    /// Column order of the header on disk, once known.
    layout: Option<Vec<String>>,
}

impl OutputStore {
    pub fn new(path: impl Into<PathBuf>, fields: &[String]) -> Self {
        let mut columns: Vec<String> = Vec::with_capacity(fields.len() + 1);
        for field in fields {
            if !columns.contains(field) {
                columns.push(field.clone());
            }
        }
        if !columns.iter().any(|c| c == AWARD_ID_FIELD) {
            columns.push(AWARD_ID_FIELD.to_string());
        }

        Self {
            path: path.into(),
            columns,
            layout: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the file exists and holds at least one byte.
    pub async fn has_content(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    /// Appends `rows`, preceded by the header row when `write_header` is set.
    pub async fn append(
        &mut self,
        rows: Vec<AwardRecord>,
        write_header: bool,
    ) -> Result<usize, StoreError> {
        let layout = if write_header {
            self.columns.clone()
        } else {
            self.resolve_layout().await?
        };
        self.layout = Some(layout.clone());

        let path = self.path.clone();
        let count = rows.len();
        tokio::task::spawn_blocking(move || write_rows(&path, &layout, &rows, write_header))
            .await??;

        debug!(
            "Appended {} rows to {} (header: {})",
            count,
            self.path.display(),
            write_header
        );
        Ok(count)
    }

    /// Deletes the file. Returns whether a file was removed.
    pub async fn remove(&mut self) -> Result<bool, StoreError> {
        self.layout = None;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Deleted old file: {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every identifier already stored. A missing file is an empty set.
    pub async fn load_existing_ids(&self) -> Result<HashSet<String>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_ids(&path)).await?
    }

    async fn resolve_layout(&mut self) -> Result<Vec<String>, StoreError> {
        if let Some(layout) = &self.layout {
            return Ok(layout.clone());
        }

        let path = self.path.clone();
        let header = tokio::task::spawn_blocking(move || read_header(&path)).await??;
        let Some(header) = header else {
            return Ok(self.columns.clone());
        };

        if header != self.columns {
            let missing: Vec<&str> = self
                .columns
                .iter()
                .filter(|c| !header.contains(c))
                .map(String::as_str)
                .collect();
            warn!(
                "Header of {} is [{}], writing rows in that order (not on file: [{}])",
                self.path.display(),
                header.join(","),
                missing.join(",")
            );
        }
        Ok(header)
    }
}

fn write_rows(
    path: &Path,
    columns: &[String],
    rows: &[AwardRecord],
    write_header: bool,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if write_header {
        writer.write_record(columns)?;
    }
    for row in rows {
        writer.write_record(columns.iter().map(|column| row.cell(column)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Header row of an existing, non-empty file.
fn read_header(path: &Path) -> Result<Option<Vec<String>>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if header.iter().all(String::is_empty) {
        Ok(None)
    } else {
        Ok(Some(header))
    }
}

fn read_ids(path: &Path) -> Result<HashSet<String>, StoreError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let id_index = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == AWARD_ID_FIELD)
        .ok_or_else(|| {
            StoreError::MissingColumn(AWARD_ID_FIELD.to_string(), path.display().to_string())
        })?;

    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(id_index).map(str::trim)
            && !id.is_empty()
        {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
