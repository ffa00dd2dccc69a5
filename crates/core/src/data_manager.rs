//! Persists detection results to `amenities.csv` and `amenities.db`.
//!
//! The two stores are written one after the other without a shared
//! transaction. Readers prefer the CSV and fall back to SQLite.

use crate::csv_store::{format_timestamp, CsvStore, BASE_COLUMNS};
use crate::models::{DetectionRecord, RoomAmenities};
use crate::schema::AmenitySchema;
use anyhow::Context;
use indexmap::IndexMap;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::models::{Amenity, AmenityFrequency, Image, ImageSummary};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{error, info};

pub const CSV_FILE: &str = "amenities.csv";
pub const DB_FILE: &str = "amenities.db";

/// One row of `all_results`: base columns followed by 0/1 amenity columns.
pub type ResultRow = IndexMap<String, Value>;

pub struct AmenityDataManager {
    output_dir: PathBuf,
    csv: CsvStore,
    pool: SqlitePool,
    schema: Arc<AmenitySchema>,
    write_lock: Mutex<()>,
}

impl AmenityDataManager {
    pub async fn open(output_dir: impl Into<PathBuf>, schema: Arc<AmenitySchema>) -> anyhow::Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let db_path = output_dir.join(DB_FILE);
        let pool = storage::connect(&db_path.to_string_lossy()).await?;
        storage::migrate(&pool).await?;
        info!(dir = %output_dir.display(), "data storage initialized");
        Ok(Self {
            csv: CsvStore::new(output_dir.join(CSV_FILE)),
            output_dir,
            pool,
            schema,
            write_lock: Mutex::new(()),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn csv_path(&self) -> &Path {
        self.csv.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.output_dir.join(DB_FILE)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stores one image's result in SQLite, then in the CSV.
    pub async fn save(&self, record: &DetectionRecord, amenities_by_room: &RoomAmenities) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.save_sqlite(record, amenities_by_room)
            .await
            .with_context(|| format!("failed to store {} in SQLite", record.image_path))?;

        let csv = self.csv.clone();
        let vocabulary = self.schema.all_amenities();
        let row = record.clone();
        task::spawn_blocking(move || csv.upsert(&row, &vocabulary))
            .await?
            .with_context(|| format!("failed to store {} in CSV", record.image_path))?;

        info!(image = %record.image_path, "results saved to database and CSV");
        Ok(())
    }

    async fn save_sqlite(&self, record: &DetectionRecord, amenities_by_room: &RoomAmenities) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let image_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO images (image_path, image_name, description, room_category, content_hash, processed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(image_path) DO UPDATE SET
                image_name = excluded.image_name,
                description = excluded.description,
                room_category = excluded.room_category,
                content_hash = excluded.content_hash,
                processed_at = excluded.processed_at
            RETURNING id
            "#,
        )
        .bind(&record.image_path)
        .bind(&record.image_name)
        .bind(&record.description)
        .bind(&record.room_category)
        .bind(&record.content_hash)
        .bind(record.processed_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM amenities WHERE image_id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
        for (room, amenities) in amenities_by_room {
            for (amenity, present) in amenities {
                sqlx::query(
                    "INSERT INTO amenities (image_id, room_type, amenity_name, is_present) VALUES (?, ?, ?, ?)",
                )
                .bind(image_id)
                .bind(room)
                .bind(amenity)
                .bind(*present)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Images ordered by number of present amenity rows. Errors are logged and yield an empty list.
    pub async fn results_summary(&self) -> Vec<ImageSummary> {
        let result = sqlx::query_as::<_, ImageSummary>(
            r#"
            SELECT i.image_path, i.description,
                   CAST(COALESCE(SUM(CASE WHEN a.is_present = 1 THEN 1 ELSE 0 END), 0) AS INTEGER) AS amenity_count
            FROM images i
            LEFT JOIN amenities a ON i.id = a.image_id
            GROUP BY i.id
            ORDER BY amenity_count DESC, i.image_path
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        match result {
            Ok(rows) => rows,
            Err(e) => {
                error!("error retrieving results summary: {}", e);
                Vec::new()
            }
        }
    }

    /// Every stored image as a flat row. Reads the CSV, or rebuilds from SQLite when that fails.
    pub async fn all_results(&self) -> Vec<ResultRow> {
        let csv = self.csv.clone();
        let from_csv = task::spawn_blocking(move || csv.read_rows())
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        match from_csv {
            Ok(rows) => return rows.into_iter().map(csv_row_to_json).collect(),
            Err(e) => error!("error reading CSV file: {:#}", e),
        }
        match self.sqlite_results().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("error reconstructing data from SQLite: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Pivot of the amenities table into `room_amenity` columns.
    pub async fn sqlite_results(&self) -> anyhow::Result<Vec<ResultRow>> {
        let images = self.images().await?;
        let amenities = sqlx::query_as::<_, Amenity>(
            "SELECT id, image_id, room_type, amenity_name, is_present FROM amenities",
        )
        .fetch_all(&self.pool)
        .await?;

        let columns: BTreeSet<String> = amenities
            .iter()
            .map(|a| format!("{}_{}", a.room_type, a.amenity_name))
            .collect();
        let mut cells: HashMap<i64, HashMap<String, bool>> = HashMap::new();
        for a in &amenities {
            cells
                .entry(a.image_id)
                .or_default()
                .insert(format!("{}_{}", a.room_type, a.amenity_name), a.is_present);
        }

        Ok(images
            .iter()
            .map(|image| {
                let mut row = image_row(image);
                let present = cells.get(&image.id);
                for column in &columns {
                    let on = present.and_then(|p| p.get(column)).copied().unwrap_or(false);
                    row.insert(column.clone(), Value::from(u8::from(on)));
                }
                row
            })
            .collect())
    }

    /// Number of images each amenity was seen in.
    pub async fn amenity_frequencies(&self) -> anyhow::Result<Vec<AmenityFrequency>> {
        let rows = sqlx::query_as::<_, AmenityFrequency>(
            r#"
            SELECT amenity_name, COUNT(DISTINCT image_id) AS image_count
            FROM amenities
            WHERE is_present = 1
            GROUP BY amenity_name
            ORDER BY image_count DESC, amenity_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Records as stored in SQLite, in insertion order.
    pub async fn load_records(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        let images = self.images().await?;
        let present: Vec<(i64, String)> = sqlx::query_as(
            "SELECT DISTINCT image_id, amenity_name FROM amenities WHERE is_present = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_image: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
        for (image_id, name) in present {
            by_image.entry(image_id).or_default().insert(name);
        }
        Ok(images
            .into_iter()
            .map(|image| DetectionRecord {
                detected_amenities: by_image.remove(&image.id).unwrap_or_default(),
                image_name: image.image_name,
                image_path: image.image_path,
                room_category: image.room_category,
                description: image.description,
                processed_at: image.processed_at,
                content_hash: image.content_hash,
            })
            .collect())
    }

    pub async fn read_csv_records(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        let csv = self.csv.clone();
        task::spawn_blocking(move || csv.read_records()).await?
    }

    /// Raw CSV file contents, `None` before anything was stored.
    pub async fn csv_export(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.csv.path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stored_hash(&self, image_path: &str) -> anyhow::Result<Option<String>> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT content_hash FROM images WHERE image_path = ?")
                .bind(image_path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    pub async fn record_count(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn images(&self) -> anyhow::Result<Vec<Image>> {
        let images = sqlx::query_as::<_, Image>(
            r#"
            SELECT id, image_path, image_name, description, room_category, content_hash, processed_at
            FROM images
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }
}

fn image_row(image: &Image) -> ResultRow {
    let mut row = ResultRow::new();
    row.insert("image_name".into(), Value::from(image.image_name.clone()));
    row.insert("image_path".into(), Value::from(image.image_path.clone()));
    row.insert("room_category".into(), Value::from(image.room_category.clone()));
    row.insert("description".into(), Value::from(image.description.clone()));
    row.insert("processed_at".into(), Value::from(format_timestamp(&image.processed_at)));
    row.insert("content_hash".into(), Value::from(image.content_hash.clone()));
    row
}

fn csv_row_to_json(row: IndexMap<String, String>) -> ResultRow {
    row.into_iter()
        .map(|(column, value)| {
            let json = if BASE_COLUMNS.contains(&column.as_str()) {
                if value.is_empty() && matches!(column.as_str(), "room_category" | "content_hash") {
                    Value::Null
                } else {
                    Value::from(value)
                }
            } else {
                value
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(value))
            };
            (column, json)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::restructure;

    async fn manager(dir: &Path) -> AmenityDataManager {
        AmenityDataManager::open(dir.join("out"), Arc::new(AmenitySchema::default()))
            .await
            .unwrap()
    }

    fn detected(names: &[&str]) -> BTreeMap<String, bool> {
        names.iter().map(|n| (n.to_string(), true)).collect()
    }

    #[tokio::test]
    async fn open_creates_both_stores() {
        let temp = tempfile::tempdir().unwrap();
        let dm = manager(temp.path()).await;
        assert!(dm.db_path().exists());
        assert!(!dm.csv_path().exists());
        assert!(dm.csv_export().await.unwrap().is_none());
        assert!(dm.results_summary().await.is_empty());
        assert!(dm.all_results().await.is_empty());
    }

    #[tokio::test]
    async fn summary_and_frequencies() {
        let temp = tempfile::tempdir().unwrap();
        let dm = manager(temp.path()).await;
        let schema = AmenitySchema::default();

        for (path, names) in [
            ("/p/kitchen.jpg", vec!["oven", "microwave"]),
            ("/p/yard.jpg", vec!["pool"]),
            ("/p/empty.jpg", vec![]),
        ] {
            let mut detection = restructure(&schema, &detected(&names));
            detection.description = format!("{} description", path);
            let record = DetectionRecord::new(Path::new(path), &detection, None);
            dm.save(&record, &detection.amenities_by_room).await.unwrap();
        }

        let summary = dm.results_summary().await;
        let order: Vec<_> = summary.iter().map(|s| (s.image_path.as_str(), s.amenity_count)).collect();
        assert_eq!(
            order,
            vec![("/p/kitchen.jpg", 2), ("/p/yard.jpg", 1), ("/p/empty.jpg", 0)]
        );

        let freq = dm.amenity_frequencies().await.unwrap();
        let names: Vec<_> = freq.iter().map(|f| (f.amenity_name.as_str(), f.image_count)).collect();
        assert_eq!(names, vec![("microwave", 1), ("oven", 1), ("pool", 1)]);
        assert_eq!(dm.record_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn shared_amenity_counts_once_per_image_in_frequencies() {
        let temp = tempfile::tempdir().unwrap();
        let dm = manager(temp.path()).await;
        let schema = AmenitySchema::default();
        // sink belongs to kitchen and bathroom
        let detection = restructure(&schema, &detected(&["sink"]));
        let record = DetectionRecord::new(Path::new("/p/sink.jpg"), &detection, None);
        dm.save(&record, &detection.amenities_by_room).await.unwrap();

        let freq = dm.amenity_frequencies().await.unwrap();
        assert_eq!(freq, vec![AmenityFrequency { amenity_name: "sink".into(), image_count: 1 }]);
        assert_eq!(dm.results_summary().await[0].amenity_count, 2);
    }

    #[tokio::test]
    async fn sqlite_fallback_when_csv_is_unreadable() {
        let temp = tempfile::tempdir().unwrap();
        let dm = manager(temp.path()).await;
        let schema = AmenitySchema::default();
        let mut detection = restructure(&schema, &detected(&["pool"]));
        detection.description = "Pool".into();
        let record = DetectionRecord::new(Path::new("/p/yard.jpg"), &detection, Some("h".into()));
        dm.save(&record, &detection.amenities_by_room).await.unwrap();

        let rows = dm.all_results().await;
        assert_eq!(rows[0]["pool"], Value::from(1));
        assert_eq!(rows[0]["content_hash"], Value::from("h"));

        std::fs::remove_file(dm.csv_path()).unwrap();
        let rows = dm.all_results().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["image_path"], Value::from("/p/yard.jpg"));
        assert_eq!(rows[0]["outdoor_pool"], Value::from(1));
        assert_eq!(rows[0]["kitchen_oven"], Value::from(0));
        assert_eq!(rows[0]["room_category"], Value::from("outdoor"));
    }

    #[tokio::test]
    async fn stored_hash_lookup() {
        let temp = tempfile::tempdir().unwrap();
        let dm = manager(temp.path()).await;
        let detection = restructure(&AmenitySchema::default(), &BTreeMap::new());
        let record = DetectionRecord::new(Path::new("/p/a.jpg"), &detection, Some("abc".into()));
        dm.save(&record, &detection.amenities_by_room).await.unwrap();
        assert_eq!(dm.stored_hash("/p/a.jpg").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(dm.stored_hash("/p/other.jpg").await.unwrap(), None);
    }
}
