//! Persisted key records and their audit history.
//!
//! The whole store is one [`KeyDocument`]: a map from key identifier to
//! [`KeyRecord`], serialized as pretty JSON with camelCase field names.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::LeaseDuration;

/// The entire persisted store.
pub type KeyDocument = BTreeMap<String, KeyRecord>;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryAction {
    Create,
    Activate,
    Lock,
    Unlock,
    ResetHwid,
    Renew,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryAction::Create => "create",
            HistoryAction::Activate => "activate",
            HistoryAction::Lock => "lock",
            HistoryAction::Unlock => "unlock",
            HistoryAction::ResetHwid => "reset-hwid",
            HistoryAction::Renew => "renew",
        };
        f.pad(s)
    }
}

/// Outcome tag recorded with each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Ok,
    Success,
    Locked,
}

/// One entry in a key's audit trail. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub time: DateTime<Utc>,
    pub action: HistoryAction,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryEvent {
    pub fn new(
        time: DateTime<Utc>,
        action: HistoryAction,
        status: EventStatus,
        note: Option<String>,
    ) -> Self {
        Self {
            time,
            action,
            status,
            note,
        }
    }
}

/// A single issued license key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// `None` for keys issued before leases existed. Such keys never expire.
    #[serde(default)]
    pub duration: Option<LeaseDuration>,
    #[serde(default)]
    pub hwid: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl KeyRecord {
    /// A freshly minted, unbound, unlocked record with its `create` event.
    pub fn new(
        duration: LeaseDuration,
        note: String,
        now: DateTime<Utc>,
        expire_at: Option<DateTime<Utc>>,
    ) -> Self {
        let event_note = (!note.is_empty()).then(|| note.clone());
        Self {
            duration: Some(duration),
            hwid: None,
            locked: false,
            activated_at: None,
            expire_at,
            created_at: now,
            note,
            history: vec![HistoryEvent::new(
                now,
                HistoryAction::Create,
                EventStatus::Ok,
                event_note,
            )],
        }
    }

    pub fn is_bound(&self) -> bool {
        self.hwid.is_some()
    }

    /// Whether the lease has run out at `now`. Keys without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|expire| now > expire)
    }

    /// Append an event to the audit trail.
    pub fn record(
        &mut self,
        time: DateTime<Utc>,
        action: HistoryAction,
        status: EventStatus,
        note: Option<String>,
    ) {
        self.history
            .push(HistoryEvent::new(time, action, status, note));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn new_record_starts_with_create_event() {
        let record = KeyRecord::new(LeaseDuration::SevenDays, "vip".into(), at(0), None);

        assert!(!record.is_bound());
        assert!(!record.locked);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].action, HistoryAction::Create);
        assert_eq!(record.history[0].note.as_deref(), Some("vip"));
    }

    #[test]
    fn expiry_is_strictly_after_expire_at() {
        let mut record = KeyRecord::new(LeaseDuration::OneDay, String::new(), at(0), None);
        assert!(!record.is_expired_at(at(23)));

        record.expire_at = Some(at(0) + Duration::days(1));
        assert!(!record.is_expired_at(at(0) + Duration::days(1)));
        assert!(record.is_expired_at(at(1) + Duration::days(1)));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = KeyRecord::new(LeaseDuration::ThirtyDays, String::new(), at(0), None);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["duration"], 30);
        assert!(json["hwid"].is_null());
        assert!(json["expireAt"].is_null());
        assert!(json.get("activatedAt").is_some());
        assert_eq!(json["history"][0]["action"], "create");
        assert_eq!(json["history"][0]["status"], "ok");
    }

    #[test]
    fn loads_minimal_legacy_record() {
        // Older hand-edited keys.json entries carry only a few fields.
        let record: KeyRecord =
            serde_json::from_str(r#"{ "duration": "7DAY", "hwid": null }"#).unwrap();

        assert_eq!(record.duration, Some(LeaseDuration::SevenDays));
        assert!(record.history.is_empty());
        assert_eq!(record.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn loads_record_without_lease() {
        let record: KeyRecord = serde_json::from_str(r#"{ "hwid": "HWX" }"#).unwrap();

        assert!(record.duration.is_none());
        assert_eq!(record.hwid.as_deref(), Some("HWX"));
        assert!(!record.is_expired_at(Utc::now()));
    }

    #[test]
    fn history_action_uses_kebab_case() {
        let json = serde_json::to_string(&HistoryAction::ResetHwid).unwrap();
        assert_eq!(json, "\"reset-hwid\"");
        assert_eq!(HistoryAction::ResetHwid.to_string(), "reset-hwid");
    }
}
