use crate::domain::models::{Occurrence, SleepSchedule, Task};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::sleep_repository::SleepScheduleRepository;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Portable dump of the whole store, for backup and device migration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub occurrences: Vec<Occurrence>,
    pub sleep_schedule: Option<SleepSchedule>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub tasks_imported: usize,
    pub occurrences_imported: usize,
    pub skipped: usize,
}

pub fn export_snapshot<T, O, S>(
    tasks: &T,
    occurrences: &O,
    sleep: &S,
    exported_at: DateTime<Utc>,
) -> Result<Snapshot, CoreError>
where
    T: TaskRepository,
    O: OccurrenceRepository,
    S: SleepScheduleRepository,
{
    Ok(Snapshot {
        version: SNAPSHOT_VERSION,
        exported_at,
        tasks: tasks.list_all()?,
        occurrences: occurrences.list_all()?,
        sleep_schedule: sleep.load()?,
    })
}

/// Loads a snapshot into the stores. Rows that fail validation or insertion
/// are skipped and counted rather than aborting the whole import.
pub fn import_snapshot<T, O, S>(
    tasks: &T,
    occurrences: &O,
    sleep: &S,
    snapshot: &Snapshot,
) -> Result<ImportSummary, CoreError>
where
    T: TaskRepository,
    O: OccurrenceRepository,
    S: SleepScheduleRepository,
{
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CoreError::InvalidInput(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    let mut summary = ImportSummary::default();
    for task in &snapshot.tasks {
        if let Err(reason) = task.validate() {
            warn!(task_id = %task.id, %reason, "skipping invalid task");
            summary.skipped += 1;
            continue;
        }
        match tasks.insert(task) {
            Ok(()) => summary.tasks_imported += 1,
            Err(error) => {
                warn!(task_id = %task.id, %error, "skipping task");
                summary.skipped += 1;
            }
        }
    }
    for occurrence in &snapshot.occurrences {
        if let Err(reason) = occurrence.validate() {
            warn!(occurrence_id = %occurrence.id, %reason, "skipping invalid occurrence");
            summary.skipped += 1;
            continue;
        }
        match occurrences.insert(occurrence) {
            Ok(()) => summary.occurrences_imported += 1,
            Err(error) => {
                warn!(occurrence_id = %occurrence.id, %error, "skipping occurrence");
                summary.skipped += 1;
            }
        }
    }
    if let Some(schedule) = &snapshot.sleep_schedule {
        match schedule.validate() {
            Ok(()) => sleep.save(schedule)?,
            Err(reason) => {
                warn!(%reason, "skipping invalid sleep schedule");
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

pub fn write_snapshot_file(snapshot: &Snapshot, path: &Path) -> Result<(), CoreError> {
    let formatted = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn read_snapshot_file(path: &Path) -> Result<Snapshot, CoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
