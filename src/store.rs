//! SQLite persistence of completed analyses.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, info};
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::inference::severity_of_label;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A completed analysis ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub recorded_at: DateTime<Local>,
    pub symptoms: String,
    pub history: String,
    pub temperature: Option<f64>,
    pub pulse: Option<u32>,
    pub temperature_source: Option<String>,
    pub pulse_source: Option<String>,
    pub urgency: String,
    pub diagnosis: String,
    pub summary: String,
}

/// A stored record as listed on the history screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRow {
    pub id: i64,
    pub recorded_at: NaiveDateTime,
    pub symptoms: String,
    pub history: String,
    pub temperature: Option<f64>,
    pub pulse: Option<u32>,
    pub temperature_source: Option<String>,
    pub pulse_source: Option<String>,
    pub urgency: String,
    pub diagnosis: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySort {
    Date(SortDirection),
    Urgency(SortDirection),
}

impl Default for HistorySort {
    fn default() -> Self {
        HistorySort::Date(SortDirection::Descending)
    }
}

impl HistorySort {
    /// Date order switches to most-urgent-first; urgency order switches back
    /// to date order with its direction flipped.
    pub fn toggle(self) -> Self {
        match self {
            HistorySort::Date(_) => HistorySort::Urgency(SortDirection::Descending),
            HistorySort::Urgency(direction) => HistorySort::Date(direction.flip()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            HistorySort::Date(d) => format!("date ({})", d.to_string().to_lowercase()),
            HistorySort::Urgency(d) => format!("urgency ({})", d.to_string().to_lowercase()),
        }
    }
}

/// Urgency rank in the given direction, ties broken by newest first.
pub fn compare_by_urgency(a: &PatientRow, b: &PatientRow, direction: SortDirection) -> Ordering {
    direction
        .apply(severity_of_label(&a.urgency).cmp(&severity_of_label(&b.urgency)))
        .then_with(|| b.recorded_at.cmp(&a.recorded_at))
}

#[derive(Debug)]
pub struct PatientStore {
    conn: Connection,
}

impl PatientStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
        info!("opening patient store at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                symptoms TEXT,
                history TEXT,
                temperature REAL,
                pulse INTEGER,
                temperature_source TEXT,
                pulse_source TEXT,
                urgency TEXT,
                diagnosis TEXT,
                summary TEXT
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_patients_recorded_at ON patients(recorded_at)",
            [],
        )?;
        Ok(PatientStore { conn })
    }

    pub fn insert(&self, record: &PatientRecord) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO patients
            (recorded_at, symptoms, history, temperature, pulse,
             temperature_source, pulse_source, urgency, diagnosis, summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.recorded_at.format(TIMESTAMP_FORMAT).to_string(),
                record.symptoms,
                record.history,
                record.temperature,
                record.pulse,
                record.temperature_source,
                record.pulse_source,
                record.urgency,
                record.diagnosis,
                record.summary,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!("saved patient record {id}");
        Ok(id)
    }

    pub fn list(&self, sort: HistorySort) -> Result<Vec<PatientRow>, StoreError> {
        let order = match sort {
            HistorySort::Date(SortDirection::Ascending) => "ASC",
            _ => "DESC",
        };
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT id, recorded_at, symptoms, history, temperature, pulse,
                   temperature_source, pulse_source, urgency, diagnosis, summary
            FROM patients
            ORDER BY recorded_at {order}, id {order}
            "#
        ))?;

        let row_iter = stmt.query_map([], |row| {
            let recorded_at: String = row.get(1)?;
            let recorded_at = NaiveDateTime::parse_from_str(&recorded_at, TIMESTAMP_FORMAT)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(PatientRow {
                id: row.get(0)?,
                recorded_at,
                symptoms: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                history: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                temperature: row.get(4)?,
                pulse: row.get(5)?,
                temperature_source: row.get(6)?,
                pulse_source: row.get(7)?,
                urgency: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                diagnosis: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                summary: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            })
        })?;

        let mut rows = Vec::new();
        for row in row_iter {
            rows.push(row?);
        }

        if let HistorySort::Urgency(direction) = sort {
            rows.sort_by(|a, b| compare_by_urgency(a, b, direction));
        }
        debug!("listed {} patient records by {}", rows.len(), sort.describe());
        Ok(rows)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!("deleted patient record {id}");
        }
        Ok(removed > 0)
    }
}
