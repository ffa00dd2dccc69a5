//! Flat CSV view of the results: one row per image, one 0/1 column per amenity.

use crate::models::DetectionRecord;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BASE_COLUMNS: &[&str] = &[
    "image_name",
    "image_path",
    "room_category",
    "description",
    "processed_at",
    "content_hash",
];

pub type CsvRow = IndexMap<String, String>;

#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `record`, replacing any row with the same `image_path`.
    ///
    /// Columns missing from an existing file are appended to the header and
    /// filled with `0` for the rows already present.
    pub fn upsert(&self, record: &DetectionRecord, vocabulary: &[String]) -> anyhow::Result<()> {
        let (mut header, mut rows) = if self.exists() {
            self.read()?
        } else {
            (Vec::new(), Vec::new())
        };

        let wanted = BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(vocabulary.iter().cloned())
            .chain(record.detected_amenities.iter().cloned());
        let mut added = Vec::new();
        for column in wanted {
            if !header.contains(&column) {
                header.push(column.clone());
                added.push(column);
            }
        }
        if !added.is_empty() && !rows.is_empty() {
            debug!(path = %self.path.display(), columns = added.len(), "extending CSV header");
        }
        for row in rows.iter_mut() {
            for column in &added {
                let fill = if BASE_COLUMNS.contains(&column.as_str()) { "" } else { "0" };
                row.entry(column.clone()).or_insert_with(|| fill.to_string());
            }
        }

        let new_row = to_row(record, &header);
        match rows.iter().position(|r| r.get("image_path") == Some(&record.image_path)) {
            Some(idx) => rows[idx] = new_row,
            None => rows.push(new_row),
        }
        self.write(&header, &rows)
    }

    pub fn read_rows(&self) -> anyhow::Result<Vec<CsvRow>> {
        Ok(self.read()?.1)
    }

    pub fn read_records(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        self.read_rows()?.iter().map(from_row).collect()
    }

    fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    fn read(&self) -> anyhow::Result<(Vec<String>, Vec<CsvRow>)> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row = header
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            rows.push(row);
        }
        Ok((header, rows))
    }

    fn write(&self, header: &[String], rows: &[CsvRow]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(header)?;
            for row in rows {
                writer.write_record(
                    header
                        .iter()
                        .map(|c| row.get(c).map(String::as_str).unwrap_or("0")),
                )?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_row(record: &DetectionRecord, header: &[String]) -> CsvRow {
    header
        .iter()
        .map(|column| {
            let value = match column.as_str() {
                "image_name" => record.image_name.clone(),
                "image_path" => record.image_path.clone(),
                "room_category" => record.room_category.clone().unwrap_or_default(),
                "description" => record.description.clone(),
                "processed_at" => format_timestamp(&record.processed_at),
                "content_hash" => record.content_hash.clone().unwrap_or_default(),
                amenity if record.detected_amenities.contains(amenity) => "1".to_string(),
                _ => "0".to_string(),
            };
            (column.clone(), value)
        })
        .collect()
}

fn from_row(row: &CsvRow) -> anyhow::Result<DetectionRecord> {
    let field = |name: &str| row.get(name).cloned().unwrap_or_default();
    let optional = |name: &str| row.get(name).filter(|v| !v.is_empty()).cloned();
    let processed_at = DateTime::parse_from_rfc3339(&field("processed_at"))
        .with_context(|| format!("bad processed_at for {}", field("image_path")))?
        .with_timezone(&Utc);
    let detected_amenities: BTreeSet<String> = row
        .iter()
        .filter(|(column, value)| !BASE_COLUMNS.contains(&column.as_str()) && value.as_str() == "1")
        .map(|(column, _)| column.clone())
        .collect();
    Ok(DetectionRecord {
        image_name: field("image_name"),
        image_path: field("image_path"),
        room_category: optional("room_category"),
        detected_amenities,
        description: field("description"),
        processed_at,
        content_hash: optional("content_hash"),
    })
}
