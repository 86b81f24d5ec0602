use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    OneTime,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Duration,
    TimeRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SleepConflictPolicy {
    Block,
    ProposeShift,
    Force,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceState {
    Scheduled,
    Running,
    Completed,
    Missed,
    Cancelled,
    Snoozed,
}

impl OccurrenceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Missed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: OccurrenceState) -> bool {
        match self {
            Self::Scheduled => matches!(
                next,
                Self::Running | Self::Missed | Self::Cancelled | Self::Snoozed
            ),
            Self::Running => matches!(next, Self::Completed | Self::Cancelled),
            Self::Snoozed => matches!(next, Self::Scheduled),
            Self::Completed | Self::Missed | Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Cancelled => "cancelled",
            Self::Snoozed => "snoozed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub days_of_week: Vec<String>,
    pub interval_days: u32,
    pub until: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_days == 0 {
            return Err("recurrence.interval_days must be > 0".to_string());
        }
        for day in &self.days_of_week {
            if parse_weekday(day).is_none() {
                return Err(format!(
                    "recurrence.days_of_week contains unknown day: {day}"
                ));
            }
        }
        Ok(())
    }

    pub fn weekdays(&self) -> Vec<Weekday> {
        self.days_of_week
            .iter()
            .filter_map(|day| parse_weekday(day))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
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
    pub state: OccurrenceState,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;

        match self.mode {
            ScheduleMode::Duration => {
                let Some(duration) = self.duration_minutes else {
                    return Err("task.duration_minutes is required for duration mode".to_string());
                };
                if duration == 0 {
                    return Err("task.duration_minutes must be > 0".to_string());
                }
                if self.start_at.is_some() || self.end_at.is_some() {
                    return Err("task.start_at/end_at must be unset for duration mode".to_string());
                }
            }
            ScheduleMode::TimeRange => {
                let (Some(start), Some(end)) = (self.start_at, self.end_at) else {
                    return Err(
                        "task.start_at and task.end_at are required for time range mode"
                            .to_string(),
                    );
                };
                if end <= start {
                    return Err("task.end_at must be after task.start_at".to_string());
                }
                if self.duration_minutes.is_some() {
                    return Err(
                        "task.duration_minutes must be unset for time range mode".to_string()
                    );
                }
            }
        }

        match self.kind {
            TaskKind::OneTime => {}
            TaskKind::Daily => {
                if let Some(rule) = &self.recurrence {
                    rule.validate()?;
                }
            }
            TaskKind::Weekly => {
                let Some(rule) = &self.recurrence else {
                    return Err("task.recurrence is required for weekly tasks".to_string());
                };
                rule.validate()?;
                if rule.weekdays().is_empty() {
                    return Err("task.recurrence.days_of_week must not be empty".to_string());
                }
            }
        }

        Ok(())
    }

    /// Switches the scheduling mode, clearing the fields owned by the old mode.
    pub fn switch_mode(&mut self, mode: ScheduleMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        match mode {
            ScheduleMode::Duration => {
                self.start_at = None;
                self.end_at = None;
            }
            ScheduleMode::TimeRange => {
                self.duration_minutes = None;
            }
        }
    }

    /// Clock times of the anchor range, if both ends are set.
    pub fn time_of_day(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((self.start_at?.time(), self.end_at?.time()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occurrence {
    pub id: String,
    pub task_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub state: OccurrenceState,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub snooze_count: u32,
}

impl Occurrence {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "occurrence.id")?;
        validate_non_empty(&self.task_id, "occurrence.task_id")?;
        if self.end_at <= self.start_at {
            return Err("occurrence.end_at must be after occurrence.start_at".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub available: bool,
    pub conflicting_task_id: Option<String>,
}

impl TimeSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SleepSchedule {
    pub start: String,
    pub end: String,
}

impl SleepSchedule {
    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.start, "sleep_schedule.start")?;
        validate_hhmm(&self.end, "sleep_schedule.end")?;
        Ok(())
    }

    pub fn parsed(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_hhmm(&self.start)?, parse_hhmm(&self.end)?))
    }

    pub fn crosses_midnight(&self) -> bool {
        self.parsed()
            .map(|(start, end)| end < start)
            .unwrap_or(false)
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub(crate) fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_time_range_task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            title: "Morning run".to_string(),
            description: Some("around the park".to_string()),
            tags: vec!["health".to_string()],
            kind: TaskKind::OneTime,
            mode: ScheduleMode::TimeRange,
            duration_minutes: None,
            start_at: Some(fixed_time("2026-02-16T10:00:00Z")),
            end_at: Some(fixed_time("2026-02-16T11:00:00Z")),
            recurrence: None,
            sleep_policy: SleepConflictPolicy::Block,
            reminder_offsets_minutes: vec![10],
            alarms_enabled: true,
            notifications_enabled: true,
            priority: 0,
            state: OccurrenceState::Scheduled,
            created_at: fixed_time("2026-02-15T08:00:00Z"),
        }
    }

    fn sample_weekly_task() -> Task {
        let mut task = sample_time_range_task();
        task.id = "tsk-2".to_string();
        task.kind = TaskKind::Weekly;
        task.recurrence = Some(RecurrenceRule {
            days_of_week: vec!["Monday".to_string(), "Wednesday".to_string()],
            interval_days: 1,
            until: None,
        });
        task
    }

    fn sample_occurrence() -> Occurrence {
        Occurrence {
            id: "occ-1".to_string(),
            task_id: "tsk-1".to_string(),
            start_at: fixed_time("2026-02-16T10:00:00Z"),
            end_at: fixed_time("2026-02-16T11:00:00Z"),
            state: OccurrenceState::Scheduled,
            actual_start: None,
            actual_end: None,
            snooze_count: 0,
        }
    }

    #[test]
    fn task_validate_accepts_time_range_task() {
        assert!(sample_time_range_task().validate().is_ok());
    }

    #[test]
    fn task_validate_rejects_empty_title() {
        let mut task = sample_time_range_task();
        task.title = "   ".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_validate_rejects_reversed_range() {
        let mut task = sample_time_range_task();
        task.end_at = task.start_at;
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_validate_requires_duration_for_duration_mode() {
        let mut task = sample_time_range_task();
        task.mode = ScheduleMode::Duration;
        task.start_at = None;
        task.end_at = None;
        assert!(task.validate().is_err());

        task.duration_minutes = Some(30);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn task_validate_rejects_duration_mode_with_range_fields() {
        let mut task = sample_time_range_task();
        task.mode = ScheduleMode::Duration;
        task.duration_minutes = Some(30);
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_validate_rejects_weekly_without_days() {
        let mut task = sample_weekly_task();
        task.recurrence = Some(RecurrenceRule {
            days_of_week: Vec::new(),
            interval_days: 1,
            until: None,
        });
        assert!(task.validate().is_err());

        task.recurrence = None;
        assert!(task.validate().is_err());
    }

    #[test]
    fn switch_mode_clears_previous_mode_fields() {
        let mut task = sample_time_range_task();
        task.switch_mode(ScheduleMode::Duration);
        assert!(task.start_at.is_none());
        assert!(task.end_at.is_none());

        task.duration_minutes = Some(45);
        task.switch_mode(ScheduleMode::TimeRange);
        assert!(task.duration_minutes.is_none());
    }

    #[test]
    fn occurrence_validate_rejects_reversed_range() {
        let mut occurrence = sample_occurrence();
        occurrence.end_at = occurrence.start_at;
        assert!(occurrence.validate().is_err());
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for state in [
            OccurrenceState::Completed,
            OccurrenceState::Missed,
            OccurrenceState::Cancelled,
        ] {
            assert!(state.is_terminal());
            for next in [
                OccurrenceState::Scheduled,
                OccurrenceState::Running,
                OccurrenceState::Completed,
                OccurrenceState::Missed,
                OccurrenceState::Cancelled,
                OccurrenceState::Snoozed,
            ] {
                assert!(!state.can_transition_to(next));
            }
        }
    }

    #[test]
    fn state_machine_matches_lifecycle_edges() {
        use OccurrenceState::*;
        assert!(Scheduled.can_transition_to(Running));
        assert!(Scheduled.can_transition_to(Missed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Snoozed));
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Missed));
        assert!(Snoozed.can_transition_to(Scheduled));
        assert!(!Snoozed.can_transition_to(Running));
    }

    #[test]
    fn sleep_schedule_detects_midnight_crossing() {
        let overnight = SleepSchedule {
            start: "22:00".to_string(),
            end: "06:00".to_string(),
        };
        assert!(overnight.validate().is_ok());
        assert!(overnight.crosses_midnight());

        let daytime = SleepSchedule {
            start: "13:00".to_string(),
            end: "14:00".to_string(),
        };
        assert!(!daytime.crosses_midnight());
    }

    #[test]
    fn sleep_schedule_rejects_malformed_times() {
        let schedule = SleepSchedule {
            start: "25:00".to_string(),
            end: "06:00".to_string(),
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn parse_weekday_accepts_long_and_short_names() {
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("wed"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("noday"), None);
    }

    #[test]
    fn domain_models_support_serde_roundtrip() {
        let task = sample_weekly_task();
        let occurrence = sample_occurrence();
        let schedule = SleepSchedule {
            start: "22:00".to_string(),
            end: "06:00".to_string(),
        };

        let task_roundtrip: Task =
            serde_json::from_str(&serde_json::to_string(&task).expect("serialize task"))
                .expect("deserialize task");
        let occurrence_roundtrip: Occurrence =
            serde_json::from_str(&serde_json::to_string(&occurrence).expect("serialize occurrence"))
                .expect("deserialize occurrence");
        let schedule_roundtrip: SleepSchedule =
            serde_json::from_str(&serde_json::to_string(&schedule).expect("serialize schedule"))
                .expect("deserialize schedule");

        assert_eq!(task_roundtrip, task);
        assert_eq!(occurrence_roundtrip, occurrence);
        assert_eq!(schedule_roundtrip, schedule);
    }
}
