use crate::domain::models::{
    OccurrenceState, RecurrenceRule, ScheduleMode, SleepConflictPolicy, Task, TaskKind,
};
use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait TaskRepository: Send + Sync {
    fn insert(&self, task: &Task) -> Result<(), CoreError>;
    fn update(&self, task: &Task) -> Result<(), CoreError>;
    fn delete(&self, task_id: &str) -> Result<bool, CoreError>;
    fn find_by_id(&self, task_id: &str) -> Result<Option<Task>, CoreError>;
    fn list_all(&self) -> Result<Vec<Task>, CoreError>;
    fn update_state(&self, task_id: &str, state: OccurrenceState) -> Result<(), CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

struct TaskRow {
    id: String,
    title: String,
    description: Option<String>,
    tags: String,
    kind: String,
    mode: String,
    duration_minutes: Option<u32>,
    start_at: Option<String>,
    end_at: Option<String>,
    recurrence: Option<String>,
    sleep_policy: String,
    reminder_offsets_minutes: String,
    alarms_enabled: bool,
    notifications_enabled: bool,
    priority: i32,
    state: String,
    created_at: String,
}

const TASK_COLUMNS: &str = "id, title, description, tags, kind, mode, duration_minutes, \
     start_at, end_at, recurrence, sleep_policy, reminder_offsets_minutes, \
     alarms_enabled, notifications_enabled, priority, state, created_at";

fn read_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        tags: row.get(3)?,
        kind: row.get(4)?,
        mode: row.get(5)?,
        duration_minutes: row.get(6)?,
        start_at: row.get(7)?,
        end_at: row.get(8)?,
        recurrence: row.get(9)?,
        sleep_policy: row.get(10)?,
        reminder_offsets_minutes: row.get(11)?,
        alarms_enabled: row.get(12)?,
        notifications_enabled: row.get(13)?,
        priority: row.get(14)?,
        state: row.get(15)?,
        created_at: row.get(16)?,
    })
}

fn task_from_row(row: TaskRow) -> Result<Task, CoreError> {
    let recurrence: Option<RecurrenceRule> = match row.recurrence.as_deref() {
        Some(raw) => Some(serde_json::from_str(raw)?),
        None => None,
    };
    Ok(Task {
        id: row.id.clone(),
        title: row.title,
        description: row.description,
        tags: serde_json::from_str(&row.tags)?,
        kind: parse_task_kind(&row.kind)?,
        mode: parse_schedule_mode(&row.mode)?,
        duration_minutes: row.duration_minutes,
        start_at: row
            .start_at
            .as_deref()
            .map(|raw| parse_stored_datetime(raw, "tasks.start_at"))
            .transpose()?,
        end_at: row
            .end_at
            .as_deref()
            .map(|raw| parse_stored_datetime(raw, "tasks.end_at"))
            .transpose()?,
        recurrence,
        sleep_policy: parse_sleep_policy(&row.sleep_policy)?,
        reminder_offsets_minutes: serde_json::from_str(&row.reminder_offsets_minutes)?,
        alarms_enabled: row.alarms_enabled,
        notifications_enabled: row.notifications_enabled,
        priority: row.priority,
        state: parse_occurrence_state(&row.state)?,
        created_at: parse_stored_datetime(&row.created_at, "tasks.created_at")?,
    })
}

impl TaskRepository for SqliteTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (id, title, description, tags, kind, mode, duration_minutes,
                                start_at, end_at, recurrence, sleep_policy,
                                reminder_offsets_minutes, alarms_enabled, notifications_enabled,
                                priority, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                task.id,
                task.title,
                task.description,
                serde_json::to_string(&task.tags)?,
                task_kind_str(task.kind),
                schedule_mode_str(task.mode),
                task.duration_minutes,
                task.start_at.map(|value| value.to_rfc3339()),
                task.end_at.map(|value| value.to_rfc3339()),
                task.recurrence
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                sleep_policy_str(task.sleep_policy),
                serde_json::to_string(&task.reminder_offsets_minutes)?,
                task.alarms_enabled,
                task.notifications_enabled,
                task.priority,
                task.state.as_str(),
                task.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<(), CoreError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET title = ?2, description = ?3, tags = ?4, kind = ?5, mode = ?6,
                              duration_minutes = ?7, start_at = ?8, end_at = ?9, recurrence = ?10,
                              sleep_policy = ?11, reminder_offsets_minutes = ?12,
                              alarms_enabled = ?13, notifications_enabled = ?14, priority = ?15,
                              state = ?16
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.description,
                serde_json::to_string(&task.tags)?,
                task_kind_str(task.kind),
                schedule_mode_str(task.mode),
                task.duration_minutes,
                task.start_at.map(|value| value.to_rfc3339()),
                task.end_at.map(|value| value.to_rfc3339()),
                task.recurrence
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                sleep_policy_str(task.sleep_policy),
                serde_json::to_string(&task.reminder_offsets_minutes)?,
                task.alarms_enabled,
                task.notifications_enabled,
                task.priority,
                task.state.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    fn delete(&self, task_id: &str) -> Result<bool, CoreError> {
        let connection = self.connect()?;
        let changed = connection.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(changed > 0)
    }

    fn find_by_id(&self, task_id: &str) -> Result<Option<Task>, CoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                read_task_row,
            )
            .optional()?;
        row.map(task_from_row).transpose()
    }

    fn list_all(&self) -> Result<Vec<Task>, CoreError> {
        let connection = self.connect()?;
        let mut statement =
            connection.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at"))?;
        let rows = statement.query_map([], read_task_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(task_from_row(row?)?);
        }
        Ok(tasks)
    }

    fn update_state(&self, task_id: &str, state: OccurrenceState) -> Result<(), CoreError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET state = ?2 WHERE id = ?1",
            params![task_id, state.as_str()],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, CoreError> {
        self.tasks
            .lock()
            .map_err(|error| CoreError::InvalidInput(format!("task store lock poisoned: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), CoreError> {
        let mut tasks = self.lock()?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn update(&self, task: &Task) -> Result<(), CoreError> {
        let mut tasks = self.lock()?;
        if !tasks.contains_key(&task.id) {
            return Err(CoreError::NotFound(format!("task {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn delete(&self, task_id: &str) -> Result<bool, CoreError> {
        let mut tasks = self.lock()?;
        Ok(tasks.remove(task_id).is_some())
    }

    fn find_by_id(&self, task_id: &str) -> Result<Option<Task>, CoreError> {
        let tasks = self.lock()?;
        Ok(tasks.get(task_id).cloned())
    }

    fn list_all(&self) -> Result<Vec<Task>, CoreError> {
        let tasks = self.lock()?;
        let mut all = tasks.values().cloned().collect::<Vec<_>>();
        all.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(all)
    }

    fn update_state(&self, task_id: &str, state: OccurrenceState) -> Result<(), CoreError> {
        let mut tasks = self.lock()?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        task.state = state;
        Ok(())
    }
}

pub(crate) fn parse_stored_datetime(raw: &str, field: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| CoreError::InvalidInput(format!("invalid {field} '{raw}': {error}")))
}

fn task_kind_str(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::OneTime => "one_time",
        TaskKind::Daily => "daily",
        TaskKind::Weekly => "weekly",
    }
}

fn parse_task_kind(value: &str) -> Result<TaskKind, CoreError> {
    match value {
        "one_time" => Ok(TaskKind::OneTime),
        "daily" => Ok(TaskKind::Daily),
        "weekly" => Ok(TaskKind::Weekly),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported task kind: {other}"
        ))),
    }
}

fn schedule_mode_str(mode: ScheduleMode) -> &'static str {
    match mode {
        ScheduleMode::Duration => "duration",
        ScheduleMode::TimeRange => "time_range",
    }
}

fn parse_schedule_mode(value: &str) -> Result<ScheduleMode, CoreError> {
    match value {
        "duration" => Ok(ScheduleMode::Duration),
        "time_range" => Ok(ScheduleMode::TimeRange),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported schedule mode: {other}"
        ))),
    }
}

fn sleep_policy_str(policy: SleepConflictPolicy) -> &'static str {
    match policy {
        SleepConflictPolicy::Block => "block",
        SleepConflictPolicy::ProposeShift => "propose_shift",
        SleepConflictPolicy::Force => "force",
    }
}

fn parse_sleep_policy(value: &str) -> Result<SleepConflictPolicy, CoreError> {
    match value {
        "block" => Ok(SleepConflictPolicy::Block),
        "propose_shift" => Ok(SleepConflictPolicy::ProposeShift),
        "force" => Ok(SleepConflictPolicy::Force),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported sleep policy: {other}"
        ))),
    }
}

pub(crate) fn parse_occurrence_state(value: &str) -> Result<OccurrenceState, CoreError> {
    match value {
        "scheduled" => Ok(OccurrenceState::Scheduled),
        "running" => Ok(OccurrenceState::Running),
        "completed" => Ok(OccurrenceState::Completed),
        "missed" => Ok(OccurrenceState::Missed),
        "cancelled" => Ok(OccurrenceState::Cancelled),
        "snoozed" => Ok(OccurrenceState::Snoozed),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported occurrence state: {other}"
        ))),
    }
}
