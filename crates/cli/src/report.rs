//! Plain-text rendering of detections and stored results.

use amenity_core::data_manager::ResultRow;
use amenity_core::models::Detection;
use amenity_core::schema::AmenitySchema;
use amenity_core::RunReport;
use serde_json::Value;
use storage::models::{AmenityFrequency, ImageSummary};

/// `living_room` → `Living Room`
pub fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn detection_text(detection: &Detection) -> String {
    let mut out = String::from("Detected amenities:\n");
    let rooms = detection.present_by_room();
    if rooms.is_empty() {
        out.push_str("  (none)\n");
    }
    for (room, amenities) in rooms {
        let names: Vec<String> = amenities.iter().map(|a| title_case(a)).collect();
        out.push_str(&format!("  {}: {}\n", title_case(&room), names.join(", ")));
    }
    out.push_str("\nDescription:\n");
    out.push_str(&detection.description);
    out.push('\n');
    out
}

pub fn run_text(report: &RunReport) -> String {
    let mut out = format!(
        "discovered {}, processed {}, skipped {}, failed {}\n",
        report.discovered, report.processed, report.skipped, report.failed
    );
    if !report.summary.is_empty() {
        out.push('\n');
        out.push_str(&summary_table(&report.summary));
    }
    out
}

pub fn summary_table(rows: &[ImageSummary]) -> String {
    let width = rows
        .iter()
        .map(|r| r.image_path.len())
        .max()
        .unwrap_or(0)
        .max("image".len());
    let mut out = format!("{:<width$}  {:>9}  description\n", "image", "amenities");
    for row in rows {
        out.push_str(&format!(
            "{:<width$}  {:>9}  {}\n",
            row.image_path,
            row.amenity_count,
            first_line(&row.description)
        ));
    }
    out
}

pub fn frequency_table(rows: &[AmenityFrequency]) -> String {
    let width = rows
        .iter()
        .map(|r| r.amenity_name.len())
        .max()
        .unwrap_or(0)
        .max("amenity".len());
    let mut out = format!("{:<width$}  images\n", "amenity");
    for row in rows {
        out.push_str(&format!("{:<width$}  {}\n", row.amenity_name, row.image_count));
    }
    out
}

/// One line per image listing the amenity columns set to 1.
pub fn results_text(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let name = row
            .get("image_name")
            .or_else(|| row.get("image_path"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        let present: Vec<&str> = row
            .iter()
            .filter(|(_, v)| v.as_i64() == Some(1))
            .map(|(k, _)| k.as_str())
            .collect();
        out.push_str(&format!("{}: {}\n", name, present.join(", ")));
    }
    out
}

pub fn schema_text(schema: &AmenitySchema) -> String {
    let mut out = String::new();
    for (room, amenities) in schema.rooms() {
        out.push_str(&format!("{}: {}\n", room, amenities.join(", ")));
    }
    out
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
