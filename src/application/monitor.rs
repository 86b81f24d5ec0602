use crate::application::availability::AvailabilityEngine;
use crate::application::generator::OccurrenceGenerator;
use crate::application::task_service::{
    apply_occurrence_transition, cancel_occurrence_wakeups, schedule_occurrence_wakeups,
};
use crate::application::NowProvider;
use crate::domain::models::{Occurrence, OccurrenceState, ScheduleMode, Task, TaskKind};
use crate::infrastructure::alarm_gateway::{AlarmGateway, WakeupKind, WakeupPayload};
use crate::infrastructure::config::MonitorConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::sleep_repository::SleepScheduleRepository;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What a single reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub started: usize,
    pub completed: usize,
    pub missed: usize,
}

/// Periodic reconciliation over the occurrence store. Wake-ups delivered
/// through [`LifecycleMonitor::handle_wakeup`] drive the lifecycle at the
/// exact times; the tick sweeps up anything the platform delivered late or
/// not at all, so every correction is idempotent.
pub struct LifecycleMonitor<T, O, S, A> {
    tasks: Arc<T>,
    occurrences: Arc<O>,
    alarms: Arc<A>,
    generator: OccurrenceGenerator<O, S>,
    config: MonitorConfig,
    now: NowProvider,
    last_daily_pass: Mutex<Option<NaiveDate>>,
}

impl<T, O, S, A> LifecycleMonitor<T, O, S, A>
where
    T: TaskRepository,
    O: OccurrenceRepository,
    S: SleepScheduleRepository,
    A: AlarmGateway,
{
    pub fn new(
        tasks: Arc<T>,
        occurrences: Arc<O>,
        sleep: Arc<S>,
        alarms: Arc<A>,
        config: MonitorConfig,
    ) -> Self {
        let engine = AvailabilityEngine::new(Arc::clone(&occurrences), sleep)
            .with_timezone(config.timezone);
        Self {
            tasks,
            occurrences,
            alarms,
            generator: OccurrenceGenerator::new(engine),
            config,
            now: Arc::new(Utc::now),
            last_daily_pass: Mutex::new(None),
        }
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    /// One reconciliation sweep over the lookback window. Every lapsed
    /// scheduled occurrence goes to missed, every lapsed running occurrence
    /// goes to completed, and due scheduled occurrences are started. Errors
    /// on individual occurrences are logged and skipped.
    pub async fn tick(&self) -> Result<TickSummary, CoreError> {
        let now = self.now();
        let lookback_start = now - Duration::hours(self.config.lookback_hours);
        let mut summary = TickSummary::default();

        for occurrence in self.occurrences.find_ending_between(lookback_start, now)? {
            // Settled only once the end has actually passed.
            if occurrence.end_at >= now {
                continue;
            }
            let outcome = match occurrence.state {
                OccurrenceState::Scheduled => Some((OccurrenceState::Missed, "missed")),
                OccurrenceState::Running => Some((OccurrenceState::Completed, "completed")),
                _ => None,
            };
            let Some((next, label)) = outcome else {
                continue;
            };
            match self.settle(occurrence, next, now).await {
                Ok(()) => match next {
                    OccurrenceState::Missed => summary.missed += 1,
                    _ => summary.completed += 1,
                },
                Err(error) => warn!(%error, label, "failed to settle occurrence"),
            }
        }

        for occurrence in self.occurrences.find_in_range(lookback_start, now)? {
            if occurrence.state != OccurrenceState::Scheduled
                || occurrence.start_at > now
                || occurrence.end_at <= now
            {
                continue;
            }
            match apply_occurrence_transition(
                &*self.tasks,
                &*self.occurrences,
                occurrence,
                OccurrenceState::Running,
                now,
            ) {
                Ok(started) => {
                    debug!(occurrence_id = %started.id, "occurrence started by tick");
                    summary.started += 1;
                }
                Err(error) => warn!(%error, "failed to start due occurrence"),
            }
        }

        if summary != TickSummary::default() {
            info!(
                started = summary.started,
                completed = summary.completed,
                missed = summary.missed,
                "tick reconciled occurrences"
            );
        }
        Ok(summary)
    }

    /// Expands today's occurrences for recurring time range tasks, at most
    /// once per local day and at most one occurrence per task and day.
    /// Errors on individual tasks are logged and skipped; the day is only
    /// marked done after a pass with no failures, so skipped tasks are
    /// retried on the next tick.
    pub async fn daily_pass(&self) -> Result<usize, CoreError> {
        let now = self.now();
        let today = now.with_timezone(&self.config.timezone).date_naive();
        if *self.lock_daily_pass()? == Some(today) {
            return Ok(0);
        }

        let mut generated = 0;
        let mut failed = 0;
        for task in self.tasks.list_all()? {
            if !matches!(task.kind, TaskKind::Daily | TaskKind::Weekly)
                || task.mode != ScheduleMode::TimeRange
            {
                continue;
            }
            match self.expand_for_day(&task, today, now).await {
                Ok(count) => generated += count,
                Err(error) => {
                    warn!(task_id = %task.id, %error, "failed to expand task for today");
                    failed += 1;
                }
            }
        }
        if failed == 0 {
            *self.lock_daily_pass()? = Some(today);
        }
        if generated > 0 {
            info!(count = generated, %today, "daily pass expanded occurrences");
        }
        Ok(generated)
    }

    fn lock_daily_pass(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<NaiveDate>>, CoreError> {
        self.last_daily_pass
            .lock()
            .map_err(|error| CoreError::InvalidInput(format!("daily pass lock poisoned: {error}")))
    }

    async fn expand_for_day(
        &self,
        task: &Task,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let already_covered = self
            .occurrences
            .find_by_task(&task.id)?
            .iter()
            .any(|occurrence| {
                occurrence.start_at.with_timezone(&self.config.timezone).date_naive() == today
            });
        if already_covered {
            return Ok(0);
        }

        let mut generated = 0;
        for occurrence in self.generator.generate_occurrences(task, today, 1)? {
            if occurrence.start_at.with_timezone(&self.config.timezone).date_naive() != today {
                continue;
            }
            self.occurrences.insert(&occurrence)?;
            if let Err(error) =
                schedule_occurrence_wakeups(&self.alarms, task, &occurrence, now).await
            {
                warn!(occurrence_id = %occurrence.id, %error, "failed to schedule wakeups");
            }
            generated += 1;
        }
        Ok(generated)
    }

    /// Entry point for a fired platform wake-up. Tolerates stale payloads;
    /// a wake-up for a deleted or already settled occurrence is a no-op.
    pub async fn handle_wakeup(&self, payload: WakeupPayload) -> Result<(), CoreError> {
        let Some(occurrence) = self.occurrences.find_by_id(&payload.occurrence_id)? else {
            debug!(occurrence_id = %payload.occurrence_id, "wakeup for unknown occurrence");
            return Ok(());
        };
        let task = self.tasks.find_by_id(&occurrence.task_id)?;
        let now = self.now();

        match payload.kind {
            WakeupKind::Reminder { offset_minutes } => {
                if occurrence.state != OccurrenceState::Scheduled {
                    return Ok(());
                }
                if let Some(task) = &task {
                    self.notify(
                        task,
                        &format!("{}:reminder", occurrence.id),
                        "Upcoming",
                        &format!("{} starts in {} minutes", task.title, offset_minutes),
                    )
                    .await;
                }
            }
            WakeupKind::Start => {
                if occurrence.state != OccurrenceState::Scheduled {
                    return Ok(());
                }
                let started = apply_occurrence_transition(
                    &*self.tasks,
                    &*self.occurrences,
                    occurrence,
                    OccurrenceState::Running,
                    now,
                )?;
                if let Some(task) = &task {
                    self.notify(
                        task,
                        &format!("{}:started", started.id),
                        "Started",
                        &format!("{} is starting now", task.title),
                    )
                    .await;
                }
            }
            WakeupKind::End => {
                let next = match occurrence.state {
                    OccurrenceState::Running => OccurrenceState::Completed,
                    OccurrenceState::Scheduled => OccurrenceState::Missed,
                    _ => return Ok(()),
                };
                self.settle(occurrence, next, now).await?;
            }
        }
        Ok(())
    }

    /// Runs tick and daily pass forever on the configured interval. Each
    /// cycle finishes before the next sleep starts.
    pub async fn run(&self) {
        let interval = std::time::Duration::from_secs(self.config.tick_interval_seconds);
        loop {
            if let Err(error) = self.tick().await {
                warn!(%error, "tick failed");
            }
            if let Err(error) = self.daily_pass().await {
                warn!(%error, "daily pass failed");
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Moves an occurrence into a terminal state, drops its remaining
    /// wake-ups, and tells the user what happened.
    async fn settle(
        &self,
        occurrence: Occurrence,
        next: OccurrenceState,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let settled = apply_occurrence_transition(
            &*self.tasks,
            &*self.occurrences,
            occurrence,
            next,
            now,
        )?;
        let Some(task) = self.tasks.find_by_id(&settled.task_id)? else {
            return Ok(());
        };
        if let Err(error) = cancel_occurrence_wakeups(&self.alarms, &task, &settled).await {
            warn!(occurrence_id = %settled.id, %error, "failed to cancel wakeups");
        }
        let (title, body) = match next {
            OccurrenceState::Missed => ("Missed", format!("{} was missed", task.title)),
            _ => ("Completed", format!("{} finished", task.title)),
        };
        self.notify(&task, &format!("{}:{}", settled.id, title.to_lowercase()), title, &body)
            .await;
        Ok(())
    }

    async fn notify(&self, task: &Task, notification_id: &str, title: &str, body: &str) {
        if !task.notifications_enabled {
            return;
        }
        if let Err(error) = self.alarms.show_notification(notification_id, title, body).await {
            warn!(notification_id, %error, "failed to show notification");
        }
    }
}
