use crate::domain::models::SleepSchedule;
use crate::infrastructure::error::CoreError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait SleepScheduleRepository: Send + Sync {
    fn load(&self) -> Result<Option<SleepSchedule>, CoreError>;
    fn save(&self, schedule: &SleepSchedule) -> Result<(), CoreError>;
    fn clear(&self) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSleepScheduleRepository {
    db_path: PathBuf,
}

impl SqliteSleepScheduleRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

impl SleepScheduleRepository for SqliteSleepScheduleRepository {
    fn load(&self) -> Result<Option<SleepSchedule>, CoreError> {
        let connection = self.connect()?;
        let row: Option<(String, String)> = connection
            .query_row(
                "SELECT start, end FROM sleep_schedule WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(start, end)| SleepSchedule { start, end }))
    }

    fn save(&self, schedule: &SleepSchedule) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO sleep_schedule (id, start, end)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               start = excluded.start,
               end = excluded.end",
            params![schedule.start, schedule.end],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM sleep_schedule WHERE id = 1", [])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySleepScheduleRepository {
    schedule: Mutex<Option<SleepSchedule>>,
}

impl InMemorySleepScheduleRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<SleepSchedule>>, CoreError> {
        self.schedule.lock().map_err(|error| {
            CoreError::InvalidInput(format!("sleep schedule lock poisoned: {error}"))
        })
    }
}

impl SleepScheduleRepository for InMemorySleepScheduleRepository {
    fn load(&self) -> Result<Option<SleepSchedule>, CoreError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, schedule: &SleepSchedule) -> Result<(), CoreError> {
        *self.lock()? = Some(schedule.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        *self.lock()? = None;
        Ok(())
    }
}
