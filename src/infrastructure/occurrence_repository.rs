use crate::domain::models::{Occurrence, OccurrenceState};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::task_repository::{parse_occurrence_state, parse_stored_datetime};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait OccurrenceRepository: Send + Sync {
    fn insert(&self, occurrence: &Occurrence) -> Result<(), CoreError>;
    fn update(&self, occurrence: &Occurrence) -> Result<(), CoreError>;
    fn delete(&self, occurrence_id: &str) -> Result<bool, CoreError>;
    fn find_by_id(&self, occurrence_id: &str) -> Result<Option<Occurrence>, CoreError>;
    fn find_by_task(&self, task_id: &str) -> Result<Vec<Occurrence>, CoreError>;
    /// Occurrences whose [start_at, end_at) intersects the given half-open range.
    fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError>;
    fn find_by_state(&self, state: OccurrenceState) -> Result<Vec<Occurrence>, CoreError>;
    /// Occurrences whose end_at falls within [start, end].
    fn find_ending_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError>;
    fn update_state(&self, occurrence_id: &str, state: OccurrenceState) -> Result<(), CoreError>;
    fn list_all(&self) -> Result<Vec<Occurrence>, CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteOccurrenceRepository {
    db_path: PathBuf,
}

impl SqliteOccurrenceRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(sql)?;
        let rows = statement.query_map(params, read_occurrence_row)?;
        let mut occurrences = Vec::new();
        for row in rows {
            occurrences.push(occurrence_from_row(row?)?);
        }
        Ok(occurrences)
    }
}

struct OccurrenceRow {
    id: String,
    task_id: String,
    start_at: String,
    end_at: String,
    state: String,
    actual_start: Option<String>,
    actual_end: Option<String>,
    snooze_count: u32,
}

const OCCURRENCE_COLUMNS: &str =
    "id, task_id, start_at, end_at, state, actual_start, actual_end, snooze_count";

fn read_occurrence_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OccurrenceRow> {
    Ok(OccurrenceRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        start_at: row.get(2)?,
        end_at: row.get(3)?,
        state: row.get(4)?,
        actual_start: row.get(5)?,
        actual_end: row.get(6)?,
        snooze_count: row.get(7)?,
    })
}

fn occurrence_from_row(row: OccurrenceRow) -> Result<Occurrence, CoreError> {
    Ok(Occurrence {
        id: row.id,
        task_id: row.task_id,
        start_at: parse_stored_datetime(&row.start_at, "occurrences.start_at")?,
        end_at: parse_stored_datetime(&row.end_at, "occurrences.end_at")?,
        state: parse_occurrence_state(&row.state)?,
        actual_start: row
            .actual_start
            .as_deref()
            .map(|raw| parse_stored_datetime(raw, "occurrences.actual_start"))
            .transpose()?,
        actual_end: row
            .actual_end
            .as_deref()
            .map(|raw| parse_stored_datetime(raw, "occurrences.actual_end"))
            .transpose()?,
        snooze_count: row.snooze_count,
    })
}

impl OccurrenceRepository for SqliteOccurrenceRepository {
    fn insert(&self, occurrence: &Occurrence) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO occurrences (id, task_id, start_at, end_at, state, actual_start,
                                      actual_end, snooze_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                occurrence.id,
                occurrence.task_id,
                occurrence.start_at.to_rfc3339(),
                occurrence.end_at.to_rfc3339(),
                occurrence.state.as_str(),
                occurrence.actual_start.map(|value| value.to_rfc3339()),
                occurrence.actual_end.map(|value| value.to_rfc3339()),
                occurrence.snooze_count,
            ],
        )?;
        Ok(())
    }

    fn update(&self, occurrence: &Occurrence) -> Result<(), CoreError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE occurrences SET task_id = ?2, start_at = ?3, end_at = ?4, state = ?5,
                                    actual_start = ?6, actual_end = ?7, snooze_count = ?8
             WHERE id = ?1",
            params![
                occurrence.id,
                occurrence.task_id,
                occurrence.start_at.to_rfc3339(),
                occurrence.end_at.to_rfc3339(),
                occurrence.state.as_str(),
                occurrence.actual_start.map(|value| value.to_rfc3339()),
                occurrence.actual_end.map(|value| value.to_rfc3339()),
                occurrence.snooze_count,
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("occurrence {}", occurrence.id)));
        }
        Ok(())
    }

    fn delete(&self, occurrence_id: &str) -> Result<bool, CoreError> {
        let connection = self.connect()?;
        let changed =
            connection.execute("DELETE FROM occurrences WHERE id = ?1", params![occurrence_id])?;
        Ok(changed > 0)
    }

    fn find_by_id(&self, occurrence_id: &str) -> Result<Option<Occurrence>, CoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE id = ?1"),
                params![occurrence_id],
                read_occurrence_row,
            )
            .optional()?;
        row.map(occurrence_from_row).transpose()
    }

    fn find_by_task(&self, task_id: &str) -> Result<Vec<Occurrence>, CoreError> {
        self.query(
            &format!(
                "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE task_id = ?1 ORDER BY start_at"
            ),
            params![task_id],
        )
    }

    fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        // RFC 3339 UTC strings compare lexicographically in chronological order.
        self.query(
            &format!(
                "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
                 WHERE start_at < ?2 AND end_at > ?1 ORDER BY start_at"
            ),
            params![start.to_rfc3339(), end.to_rfc3339()],
        )
    }

    fn find_by_state(&self, state: OccurrenceState) -> Result<Vec<Occurrence>, CoreError> {
        self.query(
            &format!(
                "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE state = ?1 ORDER BY start_at"
            ),
            params![state.as_str()],
        )
    }

    fn find_ending_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        self.query(
            &format!(
                "SELECT {OCCURRENCE_COLUMNS} FROM occurrences
                 WHERE end_at >= ?1 AND end_at <= ?2 ORDER BY end_at"
            ),
            params![start.to_rfc3339(), end.to_rfc3339()],
        )
    }

    fn update_state(&self, occurrence_id: &str, state: OccurrenceState) -> Result<(), CoreError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE occurrences SET state = ?2 WHERE id = ?1",
            params![occurrence_id, state.as_str()],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("occurrence {occurrence_id}")));
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Occurrence>, CoreError> {
        self.query(
            &format!("SELECT {OCCURRENCE_COLUMNS} FROM occurrences ORDER BY start_at"),
            [],
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOccurrenceRepository {
    occurrences: Mutex<HashMap<String, Occurrence>>,
}

impl InMemoryOccurrenceRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Occurrence>>, CoreError> {
        self.occurrences.lock().map_err(|error| {
            CoreError::InvalidInput(format!("occurrence store lock poisoned: {error}"))
        })
    }

    fn filtered<F>(&self, predicate: F) -> Result<Vec<Occurrence>, CoreError>
    where
        F: Fn(&Occurrence) -> bool,
    {
        let occurrences = self.lock()?;
        let mut matched = occurrences
            .values()
            .filter(|occurrence| predicate(occurrence))
            .cloned()
            .collect::<Vec<_>>();
        matched.sort_by(|left, right| left.start_at.cmp(&right.start_at));
        Ok(matched)
    }
}

impl OccurrenceRepository for InMemoryOccurrenceRepository {
    fn insert(&self, occurrence: &Occurrence) -> Result<(), CoreError> {
        let mut occurrences = self.lock()?;
        occurrences.insert(occurrence.id.clone(), occurrence.clone());
        Ok(())
    }

    fn update(&self, occurrence: &Occurrence) -> Result<(), CoreError> {
        let mut occurrences = self.lock()?;
        if !occurrences.contains_key(&occurrence.id) {
            return Err(CoreError::NotFound(format!("occurrence {}", occurrence.id)));
        }
        occurrences.insert(occurrence.id.clone(), occurrence.clone());
        Ok(())
    }

    fn delete(&self, occurrence_id: &str) -> Result<bool, CoreError> {
        let mut occurrences = self.lock()?;
        Ok(occurrences.remove(occurrence_id).is_some())
    }

    fn find_by_id(&self, occurrence_id: &str) -> Result<Option<Occurrence>, CoreError> {
        let occurrences = self.lock()?;
        Ok(occurrences.get(occurrence_id).cloned())
    }

    fn find_by_task(&self, task_id: &str) -> Result<Vec<Occurrence>, CoreError> {
        self.filtered(|occurrence| occurrence.task_id == task_id)
    }

    fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        self.filtered(|occurrence| occurrence.start_at < end && occurrence.end_at > start)
    }

    fn find_by_state(&self, state: OccurrenceState) -> Result<Vec<Occurrence>, CoreError> {
        self.filtered(|occurrence| occurrence.state == state)
    }

    fn find_ending_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        self.filtered(|occurrence| occurrence.end_at >= start && occurrence.end_at <= end)
    }

    fn update_state(&self, occurrence_id: &str, state: OccurrenceState) -> Result<(), CoreError> {
        let mut occurrences = self.lock()?;
        let occurrence = occurrences
            .get_mut(occurrence_id)
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        occurrence.state = state;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Occurrence>, CoreError> {
        self.filtered(|_| true)
    }
}
