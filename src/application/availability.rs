use crate::domain::models::{OccurrenceState, TimeSlot};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::occurrence_repository::OccurrenceRepository;
use crate::infrastructure::sleep_repository::SleepScheduleRepository;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

const SECONDS_PER_DAY: i64 = 86_400;

/// Open-interval overlap test: touching boundaries do not conflict.
pub(crate) fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub(crate) fn local_datetime(timezone: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match timezone.from_local_datetime(&naive).earliest() {
        Some(resolved) => resolved.with_timezone(&Utc),
        // DST gap; fall back to the naive reading.
        None => Utc.from_utc_datetime(&naive),
    }
}

#[derive(Debug, Clone)]
struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }

    intervals.sort_unstable_by(|left, right| left.start.cmp(&right.start));
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

fn clip_interval(
    interval: Interval,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<Interval> {
    if interval.end <= window_start || interval.start >= window_end {
        return None;
    }
    let start = interval.start.max(window_start);
    let end = interval.end.min(window_end);
    (end > start).then_some(Interval { start, end })
}

/// Clock-time ranges in seconds from midnight, split at the day boundary when
/// the range wraps past midnight.
fn split_clock_range(start: NaiveTime, end: NaiveTime) -> Vec<(i64, i64)> {
    let start = i64::from(start.num_seconds_from_midnight());
    let end = i64::from(end.num_seconds_from_midnight());
    if end > start {
        vec![(start, end)]
    } else if end < start {
        vec![(start, SECONDS_PER_DAY), (0, end)]
    } else {
        Vec::new()
    }
}

fn clock_ranges_overlap(a: &[(i64, i64)], b: &[(i64, i64)]) -> bool {
    a.iter()
        .any(|left| b.iter().any(|right| left.0 < right.1 && left.1 > right.0))
}

/// Answers conflict and free-slot queries over the occurrence store and the
/// singleton sleep window. Read-only; every failure is a store read error.
pub struct AvailabilityEngine<O, S> {
    occurrences: Arc<O>,
    sleep: Arc<S>,
    timezone: Tz,
}

impl<O, S> Clone for AvailabilityEngine<O, S> {
    fn clone(&self) -> Self {
        Self {
            occurrences: Arc::clone(&self.occurrences),
            sleep: Arc::clone(&self.sleep),
            timezone: self.timezone,
        }
    }
}

impl<O, S> AvailabilityEngine<O, S>
where
    O: OccurrenceRepository,
    S: SleepScheduleRepository,
{
    pub fn new(occurrences: Arc<O>, sleep: Arc<S>) -> Self {
        Self {
            occurrences,
            sleep,
            timezone: Tz::UTC,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Returns the owning task id of the first occurrence overlapping the
    /// candidate range, skipping `exclude_task_id` and cancelled occurrences.
    pub fn has_conflict(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_task_id: Option<&str>,
    ) -> Result<Option<String>, CoreError> {
        // Padded window for correctness margin around the candidate range.
        let candidates = self
            .occurrences
            .find_in_range(start - Duration::days(1), end + Duration::days(1))?;
        for occurrence in candidates {
            if occurrence.state == OccurrenceState::Cancelled {
                continue;
            }
            if exclude_task_id == Some(occurrence.task_id.as_str()) {
                continue;
            }
            if overlaps(start, end, occurrence.start_at, occurrence.end_at) {
                return Ok(Some(occurrence.task_id));
            }
        }
        Ok(None)
    }

    /// Time-of-day-only check against the sleep window; a window with
    /// `end < start` wraps past midnight and is evaluated as two sub-ranges.
    pub fn conflicts_with_sleep(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let Some(schedule) = self.sleep.load()? else {
            return Ok(false);
        };
        let Some((sleep_start, sleep_end)) = schedule.parsed() else {
            return Ok(false);
        };
        if end - start >= Duration::days(1) {
            return Ok(true);
        }

        let candidate = split_clock_range(
            start.with_timezone(&self.timezone).time(),
            end.with_timezone(&self.timezone).time(),
        );
        let window = split_clock_range(sleep_start, sleep_end);
        Ok(clock_ranges_overlap(&candidate, &window))
    }

    fn day_window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = local_datetime(self.timezone, date, NaiveTime::MIN);
        let end = local_datetime(self.timezone, date + Duration::days(1), NaiveTime::MIN);
        (start, end)
    }

    fn sleep_intervals(
        &self,
        date: NaiveDate,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Interval>, CoreError> {
        let Some(schedule) = self.sleep.load()? else {
            return Ok(Vec::new());
        };
        let Some((sleep_start, sleep_end)) = schedule.parsed() else {
            return Ok(Vec::new());
        };

        let mut intervals = Vec::new();
        if sleep_end > sleep_start {
            intervals.push(Interval {
                start: local_datetime(self.timezone, date, sleep_start),
                end: local_datetime(self.timezone, date, sleep_end),
            });
        } else if sleep_end < sleep_start {
            // Overnight window: tail of last night plus head of tonight.
            intervals.push(Interval {
                start: window_start,
                end: local_datetime(self.timezone, date, sleep_end),
            });
            intervals.push(Interval {
                start: local_datetime(self.timezone, date, sleep_start),
                end: window_end,
            });
        }
        Ok(intervals
            .into_iter()
            .filter_map(|interval| clip_interval(interval, window_start, window_end))
            .collect())
    }

    fn busy_for_day(
        &self,
        date: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>, Vec<(Interval, Option<String>)>), CoreError> {
        let (window_start, window_end) = self.day_window(date);
        let mut busy = Vec::new();
        for occurrence in self.occurrences.find_in_range(window_start, window_end)? {
            if occurrence.state == OccurrenceState::Cancelled {
                continue;
            }
            let interval = Interval {
                start: occurrence.start_at,
                end: occurrence.end_at,
            };
            if let Some(clipped) = clip_interval(interval, window_start, window_end) {
                busy.push((clipped, Some(occurrence.task_id)));
            }
        }
        for interval in self.sleep_intervals(date, window_start, window_end)? {
            busy.push((interval, None));
        }
        busy.sort_by(|left, right| left.0.start.cmp(&right.0.start));
        Ok((window_start, window_end, busy))
    }

    /// The day's busy intervals as unavailable slots, tagged with the owning
    /// task id (none for the sleep window).
    pub fn busy_slots(&self, date: NaiveDate) -> Result<Vec<TimeSlot>, CoreError> {
        let (_, _, busy) = self.busy_for_day(date)?;
        Ok(busy
            .into_iter()
            .map(|(interval, task_id)| TimeSlot {
                start: interval.start,
                end: interval.end,
                available: false,
                conflicting_task_id: task_id,
            })
            .collect())
    }

    /// Free slots for the day, left-to-right sweep over the merged busy set.
    /// Interior gaps must fit `duration + min_gap` and give up `min_gap` at
    /// their end; the final gap to end-of-day only needs to fit `duration`.
    pub fn available_slots(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        min_gap_minutes: i64,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let (window_start, window_end, busy) = self.busy_for_day(date)?;
        let merged = merge_intervals(busy.into_iter().map(|(interval, _)| interval).collect());

        let duration = Duration::minutes(duration_minutes.max(0));
        let min_gap = Duration::minutes(min_gap_minutes.max(0));
        let mut slots = Vec::new();
        let mut cursor = window_start;
        for interval in &merged {
            if interval.start > cursor && interval.start - cursor >= duration + min_gap {
                slots.push(TimeSlot {
                    start: cursor,
                    end: interval.start - min_gap,
                    available: true,
                    conflicting_task_id: None,
                });
            }
            if interval.end > cursor {
                cursor = interval.end;
            }
        }
        if cursor < window_end && window_end - cursor >= duration {
            slots.push(TimeSlot {
                start: cursor,
                end: window_end,
                available: true,
                conflicting_task_id: None,
            });
        }
        Ok(slots)
    }

    /// Free slots ordered by distance from a preferred start time, falling
    /// back to chronological order.
    pub fn suggest_alternatives(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        min_gap_minutes: i64,
        preferred_start: Option<NaiveTime>,
        count: usize,
    ) -> Result<Vec<TimeSlot>, CoreError> {
        let mut slots = self.available_slots(date, duration_minutes, min_gap_minutes)?;
        slots.retain(|slot| slot.duration_minutes() >= duration_minutes);
        if let Some(preferred) = preferred_start {
            let timezone = self.timezone;
            let preferred_seconds = i64::from(preferred.num_seconds_from_midnight());
            slots.sort_by_key(|slot| {
                let slot_seconds = i64::from(
                    slot.start
                        .with_timezone(&timezone)
                        .time()
                        .num_seconds_from_midnight(),
                );
                (slot_seconds - preferred_seconds).abs()
            });
        }
        slots.truncate(count);
        Ok(slots)
    }
}
