use crate::application::availability::AvailabilityEngine;
use crate::application::generator::OccurrenceGenerator;
use crate::application::{next_id, NowProvider};
use crate::domain::models::{
    Occurrence, OccurrenceState, RecurrenceRule, ScheduleMode, SleepConflictPolicy, SleepSchedule,
    Task, TaskKind,
};
use crate::infrastructure::alarm_gateway::{AlarmGateway, WakeupKind, WakeupPayload};
use crate::infrastructure::config::MonitorConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::sleep_repository::SleepScheduleRepository;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Input for [`TaskService::create_task`]; the service assigns the id,
/// creation timestamp, and initial state.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub kind: TaskKind,
    pub mode: ScheduleMode,
    pub duration_minutes: Option<u32>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub recurrence: Option<RecurrenceRule>,
    pub sleep_policy: SleepConflictPolicy,
    pub reminder_offsets_minutes: Vec<u32>,
    pub alarms_enabled: bool,
    pub notifications_enabled: bool,
    pub priority: i32,
}

impl Default for NewTask {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            tags: Vec::new(),
            kind: TaskKind::OneTime,
            mode: ScheduleMode::TimeRange,
            duration_minutes: None,
            start_at: None,
            end_at: None,
            recurrence: None,
            sleep_policy: SleepConflictPolicy::Block,
            reminder_offsets_minutes: Vec::new(),
            alarms_enabled: true,
            notifications_enabled: true,
            priority: 0,
        }
    }
}

/// Orchestrates task CRUD, the occurrence lifecycle, and wake-up scheduling
/// over the repository traits and the alarm gateway.
pub struct TaskService<T, O, S, A> {
    tasks: Arc<T>,
    occurrences: Arc<O>,
    sleep: Arc<S>,
    alarms: Arc<A>,
    engine: AvailabilityEngine<O, S>,
    generator: OccurrenceGenerator<O, S>,
    config: MonitorConfig,
    now: NowProvider,
}

impl<T, O, S, A> TaskService<T, O, S, A>
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
        let engine = AvailabilityEngine::new(Arc::clone(&occurrences), Arc::clone(&sleep))
            .with_timezone(config.timezone);
        let generator = OccurrenceGenerator::new(engine.clone());
        Self {
            tasks,
            occurrences,
            sleep,
            alarms,
            engine,
            generator,
            config,
            now: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    pub fn engine(&self) -> &AvailabilityEngine<O, S> {
        &self.engine
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    pub async fn create_task(&self, input: NewTask) -> Result<Task, CoreError> {
        let now = self.now();
        let task = Task {
            id: next_id("tsk"),
            title: input.title,
            description: input.description,
            tags: input.tags,
            kind: input.kind,
            mode: input.mode,
            duration_minutes: input.duration_minutes,
            start_at: input.start_at,
            end_at: input.end_at,
            recurrence: input.recurrence,
            sleep_policy: input.sleep_policy,
            reminder_offsets_minutes: input.reminder_offsets_minutes,
            alarms_enabled: input.alarms_enabled,
            notifications_enabled: input.notifications_enabled,
            priority: input.priority,
            state: OccurrenceState::Scheduled,
            created_at: now,
        };
        task.validate().map_err(CoreError::InvalidInput)?;
        self.check_anchor(&task, None)?;

        self.tasks.insert(&task)?;
        self.expand_and_schedule(&task, now).await?;
        debug!(task_id = %task.id, title = %task.title, "task created");
        Ok(task)
    }

    /// Replaces the stored task and rebuilds its future schedule. Past and
    /// already-started occurrences are left untouched.
    pub async fn update_task(&self, task: Task) -> Result<Task, CoreError> {
        task.validate().map_err(CoreError::InvalidInput)?;
        if self.tasks.find_by_id(&task.id)?.is_none() {
            return Err(CoreError::NotFound(format!("task {}", task.id)));
        }
        self.check_anchor(&task, Some(&task.id))?;

        let now = self.now();
        self.drop_pending_occurrences(&task, now).await?;
        self.tasks.update(&task)?;
        self.expand_and_schedule(&task, now).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), CoreError> {
        let task = self
            .tasks
            .find_by_id(task_id)?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;

        for occurrence in self.occurrences.find_by_task(task_id)? {
            if let Err(error) = cancel_occurrence_wakeups(&self.alarms, &task, &occurrence).await {
                warn!(occurrence_id = %occurrence.id, %error, "failed to cancel wakeups");
            }
            if let Err(error) = self.occurrences.delete(&occurrence.id) {
                warn!(occurrence_id = %occurrence.id, %error, "failed to delete occurrence");
            }
        }
        self.tasks.delete(task_id)?;
        debug!(task_id, "task deleted");
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>, CoreError> {
        self.tasks.find_by_id(task_id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, CoreError> {
        self.tasks.list_all()
    }

    pub fn list_occurrences(&self, task_id: &str) -> Result<Vec<Occurrence>, CoreError> {
        self.occurrences.find_by_task(task_id)
    }

    /// Starts a duration mode task on demand with an occurrence running from
    /// now for the task's duration.
    pub async fn start_task(&self, task_id: &str) -> Result<Occurrence, CoreError> {
        let task = self
            .tasks
            .find_by_id(task_id)?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        let Some(duration) = task.duration_minutes else {
            return Err(CoreError::InvalidInput(format!(
                "task {task_id} has no duration to start on demand"
            )));
        };

        let now = self.now();
        let end = now + Duration::minutes(i64::from(duration));
        if let Some(conflicting) = self.engine.has_conflict(now, end, Some(task_id))? {
            return Err(CoreError::Conflict(format!(
                "would overlap an occurrence of task {conflicting}"
            )));
        }
        self.check_sleep_window(&task, now, end)?;

        let occurrence = Occurrence {
            id: next_id("occ"),
            task_id: task.id.clone(),
            start_at: now,
            end_at: end,
            state: OccurrenceState::Running,
            actual_start: Some(now),
            actual_end: None,
            snooze_count: 0,
        };
        self.occurrences.insert(&occurrence)?;
        mirror_task_state(&*self.tasks, &*self.occurrences, &occurrence)?;
        schedule_occurrence_wakeups(&self.alarms, &task, &occurrence, now).await?;
        Ok(occurrence)
    }

    pub async fn start_occurrence(&self, occurrence_id: &str) -> Result<Occurrence, CoreError> {
        self.transition(occurrence_id, OccurrenceState::Running).await
    }

    pub async fn complete_occurrence(&self, occurrence_id: &str) -> Result<Occurrence, CoreError> {
        let occurrence = self.transition(occurrence_id, OccurrenceState::Completed).await?;
        self.cancel_wakeups_for(&occurrence).await;
        Ok(occurrence)
    }

    pub async fn cancel_occurrence(&self, occurrence_id: &str) -> Result<Occurrence, CoreError> {
        let occurrence = self.transition(occurrence_id, OccurrenceState::Cancelled).await?;
        self.cancel_wakeups_for(&occurrence).await;
        Ok(occurrence)
    }

    /// Pushes a scheduled occurrence forward by the configured snooze delay.
    /// The occurrence passes through the snoozed state and re-enters the
    /// schedule with its counter bumped and its wake-ups moved.
    pub async fn snooze_occurrence(&self, occurrence_id: &str) -> Result<Occurrence, CoreError> {
        let mut occurrence = self
            .occurrences
            .find_by_id(occurrence_id)?
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        if !occurrence.state.can_transition_to(OccurrenceState::Snoozed) {
            return Err(CoreError::InvalidTransition(format!(
                "occurrence {occurrence_id} cannot be snoozed from {}",
                occurrence.state.as_str()
            )));
        }

        let task = self.tasks.find_by_id(&occurrence.task_id)?;
        if let Some(task) = &task {
            if let Err(error) = cancel_occurrence_wakeups(&self.alarms, task, &occurrence).await {
                warn!(occurrence_id, %error, "failed to cancel wakeups before snooze");
            }
        }

        let length = occurrence.end_at - occurrence.start_at;
        let now = self.now();
        occurrence.start_at = now + Duration::minutes(self.config.snooze_minutes);
        occurrence.end_at = occurrence.start_at + length;
        occurrence.snooze_count += 1;
        occurrence.state = OccurrenceState::Scheduled;
        self.occurrences.update(&occurrence)?;

        if let Some(task) = &task {
            schedule_occurrence_wakeups(&self.alarms, task, &occurrence, now).await?;
        }
        Ok(occurrence)
    }

    pub fn set_sleep_schedule(&self, schedule: SleepSchedule) -> Result<(), CoreError> {
        schedule.validate().map_err(CoreError::InvalidInput)?;
        self.sleep.save(&schedule)
    }

    pub fn get_sleep_schedule(&self) -> Result<Option<SleepSchedule>, CoreError> {
        self.sleep.load()
    }

    pub fn clear_sleep_schedule(&self) -> Result<(), CoreError> {
        self.sleep.clear()
    }

    async fn transition(
        &self,
        occurrence_id: &str,
        next: OccurrenceState,
    ) -> Result<Occurrence, CoreError> {
        let occurrence = self
            .occurrences
            .find_by_id(occurrence_id)?
            .ok_or_else(|| CoreError::NotFound(format!("occurrence {occurrence_id}")))?;
        apply_occurrence_transition(
            &*self.tasks,
            &*self.occurrences,
            occurrence,
            next,
            self.now(),
        )
    }

    async fn cancel_wakeups_for(&self, occurrence: &Occurrence) {
        let task = match self.tasks.find_by_id(&occurrence.task_id) {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(error) => {
                warn!(occurrence_id = %occurrence.id, %error, "failed to load task for cleanup");
                return;
            }
        };
        if let Err(error) = cancel_occurrence_wakeups(&self.alarms, &task, occurrence).await {
            warn!(occurrence_id = %occurrence.id, %error, "failed to cancel wakeups");
        }
    }

    /// Conflict and sleep checks for a time range anchor; duration mode tasks
    /// have nothing to check until they are started.
    fn check_anchor(&self, task: &Task, exclude_task_id: Option<&str>) -> Result<(), CoreError> {
        let (Some(start), Some(end)) = (task.start_at, task.end_at) else {
            return Ok(());
        };
        if let Some(conflicting) = self.engine.has_conflict(start, end, exclude_task_id)? {
            return Err(CoreError::Conflict(format!(
                "would overlap an occurrence of task {conflicting}"
            )));
        }
        self.check_sleep_window(task, start, end)
    }

    fn check_sleep_window(
        &self,
        task: &Task,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if task.sleep_policy == SleepConflictPolicy::Force {
            return Ok(());
        }
        if !self.engine.conflicts_with_sleep(start, end)? {
            return Ok(());
        }
        match task.sleep_policy {
            SleepConflictPolicy::Block => Err(CoreError::SleepConflict(
                "falls within the configured sleep hours".to_string(),
            )),
            SleepConflictPolicy::ProposeShift => {
                let timezone = self.engine.timezone();
                let local_start = start.with_timezone(&timezone);
                let duration = (end - start).num_minutes().max(1);
                let alternatives = self.engine.suggest_alternatives(
                    local_start.date_naive(),
                    duration,
                    self.config.min_gap_minutes,
                    Some(local_start.time()),
                    3,
                )?;
                let starts = alternatives
                    .iter()
                    .map(|slot| slot.start.with_timezone(&timezone).format("%H:%M").to_string())
                    .collect::<Vec<_>>();
                Err(CoreError::SleepConflict(if starts.is_empty() {
                    "falls within the configured sleep hours and no free slot is available"
                        .to_string()
                } else {
                    format!(
                        "falls within the configured sleep hours; free from {}",
                        starts.join(", ")
                    )
                }))
            }
            SleepConflictPolicy::Force => Ok(()),
        }
    }

    async fn expand_and_schedule(&self, task: &Task, now: DateTime<Utc>) -> Result<(), CoreError> {
        let from_date = now.with_timezone(&self.engine.timezone()).date_naive();
        let generated =
            self.generator
                .generate_occurrences(task, from_date, self.config.horizon_count)?;
        for occurrence in &generated {
            self.occurrences.insert(occurrence)?;
            schedule_occurrence_wakeups(&self.alarms, task, occurrence, now).await?;
        }
        debug!(task_id = %task.id, count = generated.len(), "occurrences expanded");
        Ok(())
    }

    /// Cancels and removes the task's pending future occurrences so the
    /// schedule can be rebuilt from the updated definition.
    async fn drop_pending_occurrences(
        &self,
        task: &Task,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        for occurrence in self.occurrences.find_by_task(&task.id)? {
            let pending = matches!(
                occurrence.state,
                OccurrenceState::Scheduled | OccurrenceState::Snoozed
            );
            if !pending || occurrence.start_at <= now {
                continue;
            }
            if let Err(error) = cancel_occurrence_wakeups(&self.alarms, task, &occurrence).await {
                warn!(occurrence_id = %occurrence.id, %error, "failed to cancel wakeups");
            }
            self.occurrences.delete(&occurrence.id)?;
        }
        Ok(())
    }
}

/// The single transition path for occurrence state. Guards the state machine,
/// stamps actual start/end times, persists, and mirrors the task's state when
/// the occurrence is the task's latest.
pub(crate) fn apply_occurrence_transition<T, O>(
    tasks: &T,
    occurrences: &O,
    mut occurrence: Occurrence,
    next: OccurrenceState,
    now: DateTime<Utc>,
) -> Result<Occurrence, CoreError>
where
    T: TaskRepository,
    O: OccurrenceRepository,
{
    if !occurrence.state.can_transition_to(next) {
        return Err(CoreError::InvalidTransition(format!(
            "occurrence {} cannot move from {} to {}",
            occurrence.id,
            occurrence.state.as_str(),
            next.as_str()
        )));
    }

    occurrence.state = next;
    match next {
        OccurrenceState::Running => occurrence.actual_start = Some(now),
        OccurrenceState::Completed => occurrence.actual_end = Some(now),
        _ => {}
    }
    occurrences.update(&occurrence)?;
    mirror_task_state(tasks, occurrences, &occurrence)?;
    Ok(occurrence)
}

/// Mirrors the occurrence's state onto the owning task when the occurrence is
/// the task's latest by planned start.
fn mirror_task_state<T, O>(tasks: &T, occurrences: &O, occurrence: &Occurrence) -> Result<(), CoreError>
where
    T: TaskRepository,
    O: OccurrenceRepository,
{
    let siblings = occurrences.find_by_task(&occurrence.task_id)?;
    let is_latest = siblings
        .iter()
        .all(|sibling| sibling.start_at <= occurrence.start_at);
    if !is_latest {
        return Ok(());
    }
    match tasks.update_state(&occurrence.task_id, occurrence.state) {
        Ok(()) => Ok(()),
        // The occurrence may outlive its task during deletion.
        Err(CoreError::NotFound(_)) => Ok(()),
        Err(error) => Err(error),
    }
}

/// Registers the occurrence's reminder, start, and end wake-ups. Times already
/// in the past are skipped rather than fired immediately.
pub(crate) async fn schedule_occurrence_wakeups<A>(
    alarms: &Arc<A>,
    task: &Task,
    occurrence: &Occurrence,
    now: DateTime<Utc>,
) -> Result<(), CoreError>
where
    A: AlarmGateway,
{
    if !task.alarms_enabled {
        return Ok(());
    }

    let mut wakeups = Vec::new();
    for &offset in &task.reminder_offsets_minutes {
        wakeups.push((
            occurrence.start_at - Duration::minutes(i64::from(offset)),
            WakeupKind::Reminder {
                offset_minutes: offset,
            },
        ));
    }
    wakeups.push((occurrence.start_at, WakeupKind::Start));
    wakeups.push((occurrence.end_at, WakeupKind::End));

    for (at, kind) in wakeups {
        if at <= now {
            continue;
        }
        let payload = WakeupPayload {
            occurrence_id: occurrence.id.clone(),
            kind,
        };
        alarms.schedule_wakeup(&payload.wakeup_id(), at, payload.clone()).await?;
    }
    Ok(())
}

pub(crate) async fn cancel_occurrence_wakeups<A>(
    alarms: &Arc<A>,
    task: &Task,
    occurrence: &Occurrence,
) -> Result<(), CoreError>
where
    A: AlarmGateway,
{
    for &offset in &task.reminder_offsets_minutes {
        let kind = WakeupKind::Reminder {
            offset_minutes: offset,
        };
        alarms
            .cancel_wakeup(&format!("{}:{}", occurrence.id, kind.suffix()))
            .await?;
    }
    alarms.cancel_wakeup(&format!("{}:start", occurrence.id)).await?;
    alarms.cancel_wakeup(&format!("{}:end", occurrence.id)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::alarm_gateway::RecordingAlarmGateway;
    use crate::infrastructure::occurrence_repository::InMemoryOccurrenceRepository;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use crate::infrastructure::sleep_repository::InMemorySleepScheduleRepository;

    type TestService = TaskService<
        InMemoryTaskRepository,
        InMemoryOccurrenceRepository,
        InMemorySleepScheduleRepository,
        RecordingAlarmGateway,
    >;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn service_at(now: &str) -> (TestService, Arc<RecordingAlarmGateway>) {
        let alarms = Arc::new(RecordingAlarmGateway::default());
        let service = TaskService::new(
            Arc::new(InMemoryTaskRepository::default()),
            Arc::new(InMemoryOccurrenceRepository::default()),
            Arc::new(InMemorySleepScheduleRepository::default()),
            Arc::clone(&alarms),
            MonitorConfig::default(),
        );
        let instant = fixed_time(now);
        (
            service.with_now_provider(Arc::new(move || instant)),
            alarms,
        )
    }

    fn one_time_input(start: &str, end: &str) -> NewTask {
        NewTask {
            title: "Dentist appointment".to_string(),
            start_at: Some(fixed_time(start)),
            end_at: Some(fixed_time(end)),
            reminder_offsets_minutes: vec![10],
            ..NewTask::default()
        }
    }

    #[tokio::test]
    async fn create_start_complete_walks_the_lifecycle() {
        let (service, _alarms) = service_at("2026-02-15T08:00:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");

        let occurrences = service.list_occurrences(&task.id).expect("list");
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].state, OccurrenceState::Scheduled);

        let running = service
            .start_occurrence(&occurrences[0].id)
            .await
            .expect("start");
        assert_eq!(running.state, OccurrenceState::Running);
        assert!(running.actual_start.is_some());

        let completed = service
            .complete_occurrence(&running.id)
            .await
            .expect("complete");
        assert_eq!(completed.state, OccurrenceState::Completed);
        assert!(completed.actual_end.is_some());

        let stored = service.get_task(&task.id).expect("find").expect("exists");
        assert_eq!(stored.state, OccurrenceState::Completed);
    }

    #[tokio::test]
    async fn create_rejects_overlap_with_existing_occurrence() {
        let (service, _alarms) = service_at("2026-02-15T08:00:00Z");
        service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create first");

        let result = service
            .create_task(one_time_input(
                "2026-02-16T10:30:00Z",
                "2026-02-16T11:30:00Z",
            ))
            .await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        // A back-to-back range is allowed.
        service
            .create_task(one_time_input(
                "2026-02-16T11:00:00Z",
                "2026-02-16T12:00:00Z",
            ))
            .await
            .expect("create adjacent");
    }

    #[tokio::test]
    async fn sleep_policy_controls_night_scheduling() {
        let (service, _alarms) = service_at("2026-02-15T08:00:00Z");
        service
            .set_sleep_schedule(SleepSchedule {
                start: "22:00".to_string(),
                end: "06:00".to_string(),
            })
            .expect("set sleep schedule");

        let night = one_time_input("2026-02-16T23:00:00Z", "2026-02-16T23:30:00Z");
        let blocked = service.create_task(night.clone()).await;
        assert!(matches!(blocked, Err(CoreError::SleepConflict(_))));

        let mut proposed = night.clone();
        proposed.sleep_policy = SleepConflictPolicy::ProposeShift;
        match service.create_task(proposed).await {
            Err(CoreError::SleepConflict(message)) => {
                assert!(message.contains("free from"), "message: {message}");
            }
            other => panic!("expected sleep conflict, got {other:?}"),
        }

        let mut forced = night;
        forced.sleep_policy = SleepConflictPolicy::Force;
        let task = service.create_task(forced).await.expect("force create");
        assert_eq!(service.list_occurrences(&task.id).expect("list").len(), 1);
    }

    #[tokio::test]
    async fn wakeups_follow_the_occurrence() {
        let (service, alarms) = service_at("2026-02-15T08:00:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");
        let occurrence = service.list_occurrences(&task.id).expect("list").remove(0);

        let ids = alarms.scheduled_ids();
        assert_eq!(
            ids,
            vec![
                format!("{}:end", occurrence.id),
                format!("{}:reminder-10", occurrence.id),
                format!("{}:start", occurrence.id),
            ]
        );

        service
            .cancel_occurrence(&occurrence.id)
            .await
            .expect("cancel");
        assert!(alarms.scheduled_ids().is_empty());
    }

    #[tokio::test]
    async fn past_reminder_times_are_not_scheduled() {
        let (service, alarms) = service_at("2026-02-16T09:55:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");
        let occurrence = service.list_occurrences(&task.id).expect("list").remove(0);

        // The 10 minute reminder would land at 09:50, already behind us.
        let ids = alarms.scheduled_ids();
        assert!(!ids.contains(&format!("{}:reminder-10", occurrence.id)));
        assert!(ids.contains(&format!("{}:start", occurrence.id)));
    }

    #[tokio::test]
    async fn snooze_shifts_the_occurrence_and_bumps_the_counter() {
        let (service, alarms) = service_at("2026-02-16T09:00:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");
        let occurrence = service.list_occurrences(&task.id).expect("list").remove(0);

        let snoozed = service
            .snooze_occurrence(&occurrence.id)
            .await
            .expect("snooze");
        assert_eq!(snoozed.state, OccurrenceState::Scheduled);
        assert_eq!(snoozed.snooze_count, 1);
        assert_eq!(snoozed.start_at, fixed_time("2026-02-16T09:10:00Z"));
        assert_eq!(snoozed.end_at, fixed_time("2026-02-16T10:10:00Z"));

        let (_, wakeup) = alarms
            .scheduled()
            .into_iter()
            .find(|(id, _)| id.ends_with(":start"))
            .expect("start wakeup present");
        assert_eq!(wakeup.at, snoozed.start_at);
    }

    #[tokio::test]
    async fn completed_occurrence_rejects_further_transitions() {
        let (service, _alarms) = service_at("2026-02-16T09:00:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");
        let occurrence = service.list_occurrences(&task.id).expect("list").remove(0);

        // Completing without starting violates the state machine.
        let early = service.complete_occurrence(&occurrence.id).await;
        assert!(matches!(early, Err(CoreError::InvalidTransition(_))));

        service.start_occurrence(&occurrence.id).await.expect("start");
        service
            .complete_occurrence(&occurrence.id)
            .await
            .expect("complete");
        let again = service.cancel_occurrence(&occurrence.id).await;
        assert!(matches!(again, Err(CoreError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn start_task_runs_a_duration_task_on_demand() {
        let (service, alarms) = service_at("2026-02-16T14:00:00Z");
        let task = service
            .create_task(NewTask {
                title: "Stretch break".to_string(),
                mode: ScheduleMode::Duration,
                duration_minutes: Some(15),
                ..NewTask::default()
            })
            .await
            .expect("create task");
        assert!(service.list_occurrences(&task.id).expect("list").is_empty());

        let occurrence = service.start_task(&task.id).await.expect("start");
        assert_eq!(occurrence.state, OccurrenceState::Running);
        assert_eq!(occurrence.start_at, fixed_time("2026-02-16T14:00:00Z"));
        assert_eq!(occurrence.end_at, fixed_time("2026-02-16T14:15:00Z"));
        assert_eq!(
            service
                .get_task(&task.id)
                .expect("find")
                .expect("exists")
                .state,
            OccurrenceState::Running
        );
        assert!(alarms
            .scheduled_ids()
            .contains(&format!("{}:end", occurrence.id)));
    }

    #[tokio::test]
    async fn update_task_rebuilds_future_occurrences() {
        let (service, alarms) = service_at("2026-02-15T08:00:00Z");
        let mut task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");
        let before = service.list_occurrences(&task.id).expect("list").remove(0);

        task.start_at = Some(fixed_time("2026-02-17T10:00:00Z"));
        task.end_at = Some(fixed_time("2026-02-17T11:00:00Z"));
        service.update_task(task.clone()).await.expect("update");

        let after = service.list_occurrences(&task.id).expect("list");
        assert_eq!(after.len(), 1);
        assert_ne!(after[0].id, before.id);
        assert_eq!(after[0].start_at, fixed_time("2026-02-17T10:00:00Z"));
        assert!(!alarms
            .scheduled_ids()
            .contains(&format!("{}:start", before.id)));
    }

    #[tokio::test]
    async fn delete_task_removes_occurrences_and_wakeups() {
        let (service, alarms) = service_at("2026-02-15T08:00:00Z");
        let task = service
            .create_task(one_time_input(
                "2026-02-16T10:00:00Z",
                "2026-02-16T11:00:00Z",
            ))
            .await
            .expect("create task");

        service.delete_task(&task.id).await.expect("delete");
        assert!(service.get_task(&task.id).expect("find").is_none());
        assert!(service.list_occurrences(&task.id).expect("list").is_empty());
        assert!(alarms.scheduled_ids().is_empty());
    }

    #[tokio::test]
    async fn weekly_task_expands_to_the_horizon() {
        let (service, _alarms) = service_at("2026-02-15T08:00:00Z");
        let task = service
            .create_task(NewTask {
                title: "Gym session".to_string(),
                kind: TaskKind::Weekly,
                start_at: Some(fixed_time("2026-02-16T18:00:00Z")),
                end_at: Some(fixed_time("2026-02-16T19:00:00Z")),
                recurrence: Some(RecurrenceRule {
                    days_of_week: vec!["Monday".to_string()],
                    interval_days: 1,
                    until: None,
                }),
                ..NewTask::default()
            })
            .await
            .expect("create task");

        let occurrences = service.list_occurrences(&task.id).expect("list");
        // 90 day scan over Mondays only.
        assert_eq!(occurrences.len(), 13);
        for occurrence in &occurrences {
            assert_eq!(
                occurrence.start_at.time(),
                fixed_time("2026-02-16T18:00:00Z").time()
            );
        }
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_persisting() {
        let (service, _alarms) = service_at("2026-02-15T08:00:00Z");
        let result = service
            .create_task(NewTask {
                title: "  ".to_string(),
                ..one_time_input("2026-02-16T10:00:00Z", "2026-02-16T11:00:00Z")
            })
            .await;
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        assert!(service.list_tasks().expect("list").is_empty());
    }
}
