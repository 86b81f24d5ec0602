use crate::infrastructure::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// What a fired wake-up asks the core to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WakeupKind {
    Reminder { offset_minutes: u32 },
    Start,
    End,
}

impl WakeupKind {
    pub fn suffix(&self) -> String {
        match self {
            Self::Reminder { offset_minutes } => format!("reminder-{offset_minutes}"),
            Self::Start => "start".to_string(),
            Self::End => "end".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WakeupPayload {
    pub occurrence_id: String,
    pub kind: WakeupKind,
}

impl WakeupPayload {
    pub fn wakeup_id(&self) -> String {
        format!("{}:{}", self.occurrence_id, self.kind.suffix())
    }
}

/// OS alarm/notification capability the core schedules against. Delivery
/// itself (AlarmManager, UNUserNotificationCenter, ...) lives outside the core.
#[async_trait]
pub trait AlarmGateway: Send + Sync {
    async fn schedule_wakeup(
        &self,
        wakeup_id: &str,
        at: DateTime<Utc>,
        payload: WakeupPayload,
    ) -> Result<(), CoreError>;
    async fn cancel_wakeup(&self, wakeup_id: &str) -> Result<(), CoreError>;
    fn can_schedule_exact_wakeups(&self) -> bool;
    async fn show_notification(
        &self,
        notification_id: &str,
        title: &str,
        body: &str,
    ) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWakeup {
    pub at: DateTime<Utc>,
    pub payload: WakeupPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownNotification {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// In-memory gateway recording every call; the platform shell swaps in the
/// real OS-backed implementation.
#[derive(Debug, Default)]
pub struct RecordingAlarmGateway {
    wakeups: Mutex<HashMap<String, ScheduledWakeup>>,
    notifications: Mutex<Vec<ShownNotification>>,
}

impl RecordingAlarmGateway {
    fn lock_wakeups(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, ScheduledWakeup>>, CoreError> {
        self.wakeups
            .lock()
            .map_err(|error| CoreError::InvalidInput(format!("wakeup lock poisoned: {error}")))
    }

    pub fn scheduled(&self) -> Vec<(String, ScheduledWakeup)> {
        let wakeups = self.wakeups.lock().expect("wakeup lock poisoned");
        let mut all = wakeups
            .iter()
            .map(|(id, wakeup)| (id.clone(), wakeup.clone()))
            .collect::<Vec<_>>();
        all.sort_by(|left, right| left.0.cmp(&right.0));
        all
    }

    pub fn scheduled_ids(&self) -> Vec<String> {
        self.scheduled().into_iter().map(|(id, _)| id).collect()
    }

    pub fn notifications(&self) -> Vec<ShownNotification> {
        self.notifications
            .lock()
            .expect("notification lock poisoned")
            .clone()
    }
}

#[async_trait]
impl AlarmGateway for RecordingAlarmGateway {
    async fn schedule_wakeup(
        &self,
        wakeup_id: &str,
        at: DateTime<Utc>,
        payload: WakeupPayload,
    ) -> Result<(), CoreError> {
        let mut wakeups = self.lock_wakeups()?;
        wakeups.insert(wakeup_id.to_string(), ScheduledWakeup { at, payload });
        Ok(())
    }

    async fn cancel_wakeup(&self, wakeup_id: &str) -> Result<(), CoreError> {
        let mut wakeups = self.lock_wakeups()?;
        wakeups.remove(wakeup_id);
        Ok(())
    }

    fn can_schedule_exact_wakeups(&self) -> bool {
        true
    }

    async fn show_notification(
        &self,
        notification_id: &str,
        title: &str,
        body: &str,
    ) -> Result<(), CoreError> {
        let mut notifications = self.notifications.lock().map_err(|error| {
            CoreError::InvalidInput(format!("notification lock poisoned: {error}"))
        })?;
        notifications.push(ShownNotification {
            id: notification_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
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

    #[test]
    fn wakeup_id_combines_occurrence_and_kind() {
        let payload = WakeupPayload {
            occurrence_id: "occ-1".to_string(),
            kind: WakeupKind::Reminder { offset_minutes: 10 },
        };
        assert_eq!(payload.wakeup_id(), "occ-1:reminder-10");
        assert_eq!(
            WakeupPayload {
                occurrence_id: "occ-1".to_string(),
                kind: WakeupKind::End,
            }
            .wakeup_id(),
            "occ-1:end"
        );
    }

    #[tokio::test]
    async fn rescheduling_same_id_replaces_earlier_wakeup() {
        let gateway = RecordingAlarmGateway::default();
        let payload = WakeupPayload {
            occurrence_id: "occ-1".to_string(),
            kind: WakeupKind::Start,
        };

        gateway
            .schedule_wakeup("occ-1:start", fixed_time("2026-02-16T10:00:00Z"), payload.clone())
            .await
            .expect("schedule");
        gateway
            .schedule_wakeup("occ-1:start", fixed_time("2026-02-16T10:30:00Z"), payload)
            .await
            .expect("reschedule");

        let scheduled = gateway.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].1.at, fixed_time("2026-02-16T10:30:00Z"));
    }

    #[tokio::test]
    async fn cancel_removes_wakeup_and_tolerates_unknown_id() {
        let gateway = RecordingAlarmGateway::default();
        let payload = WakeupPayload {
            occurrence_id: "occ-1".to_string(),
            kind: WakeupKind::End,
        };
        gateway
            .schedule_wakeup("occ-1:end", fixed_time("2026-02-16T11:00:00Z"), payload)
            .await
            .expect("schedule");

        gateway.cancel_wakeup("occ-1:end").await.expect("cancel");
        gateway
            .cancel_wakeup("occ-unknown:end")
            .await
            .expect("cancel unknown");
        assert!(gateway.scheduled().is_empty());
    }

    #[tokio::test]
    async fn notifications_are_recorded_in_order() {
        let gateway = RecordingAlarmGateway::default();
        gateway
            .show_notification("n-1", "Missed", "Water plants was missed")
            .await
            .expect("notify");
        gateway
            .show_notification("n-2", "Completed", "Water plants completed")
            .await
            .expect("notify");

        let shown = gateway.notifications();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].title, "Missed");
    }
}
