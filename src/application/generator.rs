use crate::application::availability::{local_datetime, overlaps, AvailabilityEngine};
use crate::application::next_id;
use crate::domain::models::{Occurrence, OccurrenceState, ScheduleMode, Task, TaskKind};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::sleep_repository::SleepScheduleRepository;

/// Recurring tasks are expanded at most this far ahead of the requested
/// start date, even when fewer than `count` dates qualify.
const GENERATION_SCAN_DAYS: i64 = 90;

/// Expands a task's schedule into concrete occurrences, skipping dates that
/// would collide with existing occurrences of other tasks.
pub struct OccurrenceGenerator<O, S> {
    engine: AvailabilityEngine<O, S>,
}

impl<O, S> Clone for OccurrenceGenerator<O, S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<O, S> OccurrenceGenerator<O, S>
where
    O: OccurrenceRepository,
    S: SleepScheduleRepository,
{
    pub fn new(engine: AvailabilityEngine<O, S>) -> Self {
        Self { engine }
    }

    /// Expands up to `count` occurrences starting at `from_date`. Duration
    /// mode recurring tasks are started on demand and expand to nothing here.
    /// A conflicting date is skipped, never retried at another time.
    pub fn generate_occurrences(
        &self,
        task: &Task,
        from_date: NaiveDate,
        count: usize,
    ) -> Result<Vec<Occurrence>, CoreError> {
        if count == 0 || task.mode == ScheduleMode::Duration {
            return Ok(Vec::new());
        }

        match task.kind {
            TaskKind::OneTime => self.generate_one_time(task),
            TaskKind::Daily | TaskKind::Weekly => self.generate_recurring(task, from_date, count),
        }
    }

    fn generate_one_time(&self, task: &Task) -> Result<Vec<Occurrence>, CoreError> {
        let (Some(start), Some(end)) = (task.start_at, task.end_at) else {
            return Ok(Vec::new());
        };
        if self.engine.has_conflict(start, end, Some(&task.id))?.is_some() {
            return Ok(Vec::new());
        }
        Ok(vec![build_occurrence(task, start, end)])
    }

    fn generate_recurring(
        &self,
        task: &Task,
        from_date: NaiveDate,
        count: usize,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let Some((start_time, end_time)) = task.time_of_day() else {
            return Ok(Vec::new());
        };
        // A recurring task without its rule is a data-integrity gap; expand
        // to nothing rather than guessing a cadence.
        let Some(rule) = &task.recurrence else {
            return Ok(Vec::new());
        };
        let interval_days = i64::from(rule.interval_days.max(1));
        let weekdays = if task.kind == TaskKind::Weekly {
            rule.weekdays()
        } else {
            Vec::new()
        };
        if task.kind == TaskKind::Weekly && weekdays.is_empty() {
            return Ok(Vec::new());
        }
        let until = rule.until;
        let timezone = self.engine.timezone();

        let mut generated: Vec<Occurrence> = Vec::new();
        let mut offset = 0i64;
        while generated.len() < count && offset < GENERATION_SCAN_DAYS {
            let date = from_date + Duration::days(offset);
            offset += interval_days;

            if let Some(limit) = until {
                if date > limit {
                    break;
                }
            }
            if task.kind == TaskKind::Weekly && !weekdays.contains(&date.weekday()) {
                continue;
            }

            let start = local_datetime(timezone, date, start_time);
            let end_date = if end_time <= start_time {
                date + Duration::days(1)
            } else {
                date
            };
            let end = local_datetime(timezone, end_date, end_time);
            if end <= start {
                continue;
            }

            if self.engine.has_conflict(start, end, Some(&task.id))?.is_some() {
                continue;
            }
            if generated
                .iter()
                .any(|existing| overlaps(start, end, existing.start_at, existing.end_at))
            {
                continue;
            }
            generated.push(build_occurrence(task, start, end));
        }
        Ok(generated)
    }
}

fn build_occurrence(task: &Task, start: DateTime<Utc>, end: DateTime<Utc>) -> Occurrence {
    Occurrence {
        id: next_id("occ"),
        task_id: task.id.clone(),
        start_at: start,
        end_at: end,
        state: OccurrenceState::Scheduled,
        actual_start: None,
        actual_end: None,
        snooze_count: 0,
    }
}
