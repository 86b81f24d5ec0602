//! TaskBell core: a personal task and reminder backend.
//!
//! Tasks describe intent (a one-time appointment, a daily routine, a weekly
//! habit); occurrences are the concrete calendar instances generated from
//! them. The availability engine answers conflict and free-slot queries, the
//! task service orchestrates CRUD and the occurrence state machine, and the
//! lifecycle monitor reconciles whatever the platform's wake-ups delivered
//! late or not at all. Storage is SQLite behind repository traits, with
//! in-memory implementations for embedding and tests.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::availability::AvailabilityEngine;
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::generator::OccurrenceGenerator;
pub use application::monitor::{LifecycleMonitor, TickSummary};
pub use application::snapshot::{
    export_snapshot, import_snapshot, read_snapshot_file, write_snapshot_file, ImportSummary,
    Snapshot, SNAPSHOT_VERSION,
};
pub use application::task_service::{NewTask, TaskService};
pub use application::NowProvider;
pub use domain::models::{
    Occurrence, OccurrenceState, RecurrenceRule, ScheduleMode, SleepConflictPolicy, SleepSchedule,
    Task, TaskKind, TimeSlot,
};
pub use infrastructure::alarm_gateway::{
    AlarmGateway, RecordingAlarmGateway, WakeupKind, WakeupPayload,
};
pub use infrastructure::config::{load_monitor_config, MonitorConfig};
pub use infrastructure::error::CoreError;
pub use infrastructure::occurrence_repository::{
    InMemoryOccurrenceRepository, OccurrenceRepository, SqliteOccurrenceRepository,
};
pub use infrastructure::sleep_repository::{
    InMemorySleepScheduleRepository, SleepScheduleRepository, SqliteSleepScheduleRepository,
};
pub use infrastructure::storage::initialize_database;
pub use infrastructure::task_repository::{
    InMemoryTaskRepository, SqliteTaskRepository, TaskRepository,
};
