//! The key store: lifecycle of license keys and the check state machine.
//!
//! Every operation holds one exclusive lock for its whole
//! load → modify → save cycle, so concurrent requests cannot lose each
//! other's updates and two first-use checks cannot both bind a key.
//! The document is reloaded on every call, which keeps hand edits of the
//! backing file visible without a restart.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{CheckKeyConfig, ExpiryAnchor, KeyConfig};
use crate::duration::LeaseDuration;
use crate::errors::{KeyError, KeyResult};
use crate::key_generation::{generate_key, KeyFormat};
use crate::presentation::{format_local, remaining};
use crate::record::{EventStatus, HistoryAction, HistoryEvent, KeyDocument, KeyRecord};
use crate::store::persistence::{JsonFilePersistence, Persistence};

/// Why a check did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFound,
    Locked,
    Expired,
    DeviceMismatch,
}

/// Result of checking a key against a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First use: the HWID was bound to the key.
    Activated { expire_at: Option<DateTime<Utc>> },
    /// The key is already bound to this HWID.
    Validated { expire_at: Option<DateTime<Utc>> },
    Rejected(RejectReason),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CheckOutcome::Rejected(_))
    }
}

/// Audit trail of a key with display-ready expiry information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub events: Vec<HistoryEvent>,
    pub expire_at: Option<String>,
    pub remaining: String,
}

/// Behavioural knobs of the store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub format: KeyFormat,
    pub max_batch: u32,
    pub expiry_anchor: ExpiryAnchor,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from(&KeyConfig::default())
    }
}

impl From<&KeyConfig> for StoreSettings {
    fn from(config: &KeyConfig) -> Self {
        Self {
            format: KeyFormat::from(config),
            max_batch: config.max_batch,
            expiry_anchor: config.expiry_anchor,
        }
    }
}

pub struct KeyStore {
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
    lock: Mutex<()>,
}

impl KeyStore {
    pub fn new(persistence: Arc<dyn Persistence>, settings: StoreSettings) -> Self {
        Self {
            persistence,
            clock: Arc::new(SystemClock),
            settings,
            lock: Mutex::new(()),
        }
    }

    /// Store backed by the JSON file named in the configuration.
    pub fn from_config(config: &CheckKeyConfig) -> Self {
        Self::new(
            Arc::new(JsonFilePersistence::new(config.storage.path.clone())),
            StoreSettings::from(&config.keys),
        )
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn location(&self) -> String {
        self.persistence.location()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // A panic mid-operation never reaches `save`, so the document on disk is
    // still consistent and the lock can be reused.
    fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load, apply `change` to one record, save.
    fn update<T>(
        &self,
        key: &str,
        change: impl FnOnce(&mut KeyRecord, DateTime<Utc>) -> T,
    ) -> KeyResult<T> {
        let _guard = self.exclusive();
        let mut document = self.persistence.load();
        let now = self.clock.now();

        let record = document
            .get_mut(key)
            .ok_or_else(|| KeyError::NotFound(key.to_string()))?;
        let result = change(record, now);

        self.persistence.save(&document)?;
        Ok(result)
    }

    /// Mint `count` new keys for the given lease.
    ///
    /// The whole batch is built in memory and saved once; on a failed save
    /// nothing is persisted.
    pub fn create(
        &self,
        duration: LeaseDuration,
        count: u32,
        note: &str,
    ) -> KeyResult<Vec<String>> {
        if count == 0 || count > self.settings.max_batch {
            return Err(KeyError::InvalidInput(format!(
                "count must be between 1 and {}",
                self.settings.max_batch
            )));
        }

        let _guard = self.exclusive();
        let mut document = self.persistence.load();
        let now = self.clock.now();
        let expire_at = match self.settings.expiry_anchor {
            ExpiryAnchor::Creation => Some(now + duration.as_duration()),
            ExpiryAnchor::Activation => None,
        };

        let mut keys = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = loop {
                let candidate = generate_key(duration, &self.settings.format);
                if !document.contains_key(&candidate) {
                    break candidate;
                }
                debug!(key = %candidate, "generated key collided, retrying");
            };

            document.insert(
                key.clone(),
                KeyRecord::new(duration, note.to_string(), now, expire_at),
            );
            keys.push(key);
        }

        self.persistence.save(&document)?;
        Ok(keys)
    }

    /// Validate `key` for the device `hwid`, binding it on first use.
    ///
    /// Only the binding branch writes; every rejection leaves the document
    /// untouched.
    pub fn check(&self, key: &str, hwid: &str) -> KeyResult<CheckOutcome> {
        if key.trim().is_empty() || hwid.trim().is_empty() {
            return Err(KeyError::InvalidInput("key and hwid are required".to_string()));
        }

        let _guard = self.exclusive();
        let mut document = self.persistence.load();
        let now = self.clock.now();

        let Some(record) = document.get_mut(key) else {
            return Ok(CheckOutcome::Rejected(RejectReason::NotFound));
        };

        if record.locked {
            return Ok(CheckOutcome::Rejected(RejectReason::Locked));
        }

        if record.is_expired_at(now) {
            return Ok(CheckOutcome::Rejected(RejectReason::Expired));
        }

        if let Some(bound) = record.hwid.as_deref() {
            if bound != hwid {
                return Ok(CheckOutcome::Rejected(RejectReason::DeviceMismatch));
            }
            return Ok(CheckOutcome::Validated {
                expire_at: record.expire_at,
            });
        }

        record.hwid = Some(hwid.to_string());
        record.activated_at = Some(now);
        // Under the creation anchor the expiry is already set, except for
        // records written before the anchor was switched. Keys without a
        // lease stay open-ended.
        if self.settings.expiry_anchor == ExpiryAnchor::Activation || record.expire_at.is_none() {
            record.expire_at = record.duration.map(|d| now + d.as_duration());
        }
        record.record(
            now,
            HistoryAction::Activate,
            EventStatus::Success,
            Some(hwid.to_string()),
        );
        let expire_at = record.expire_at;

        self.persistence.save(&document)?;
        Ok(CheckOutcome::Activated { expire_at })
    }

    /// Block every future check of `key` until it is unlocked.
    pub fn lock(&self, key: &str, reason: Option<&str>) -> KeyResult<()> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        self.update(key, |record, now| {
            record.locked = true;
            record.record(now, HistoryAction::Lock, EventStatus::Locked, reason);
        })
    }

    /// Lift a lock set by [`KeyStore::lock`].
    pub fn unlock(&self, key: &str) -> KeyResult<()> {
        self.update(key, |record, now| {
            record.locked = false;
            record.record(now, HistoryAction::Unlock, EventStatus::Ok, None);
        })
    }

    /// Unbind the device so the next check binds afresh.
    ///
    /// Under the activation anchor the lease is undone as well and the key
    /// behaves as newly created.
    pub fn reset_hwid(&self, key: &str) -> KeyResult<()> {
        let anchor = self.settings.expiry_anchor;

        self.update(key, |record, now| {
            let previous = record.hwid.take();
            record.activated_at = None;
            if anchor == ExpiryAnchor::Activation {
                record.expire_at = None;
            }
            record.record(now, HistoryAction::ResetHwid, EventStatus::Ok, previous);
        })
    }

    /// Change the lease of `key`.
    ///
    /// A running lease is replaced by `duration` counted from now; the time
    /// left on the old lease is discarded. Unactivated keys only get the new
    /// duration. Returns the resulting expiry.
    pub fn renew(&self, key: &str, duration: LeaseDuration) -> KeyResult<Option<DateTime<Utc>>> {
        let anchor = self.settings.expiry_anchor;

        self.update(key, |record, now| {
            record.duration = Some(duration);

            let running = match anchor {
                ExpiryAnchor::Activation => record.activated_at.is_some() || record.is_bound(),
                ExpiryAnchor::Creation => true,
            };
            if running {
                record.expire_at = Some(now + duration.as_duration());
            }

            record.record(now, HistoryAction::Renew, EventStatus::Ok, Some(duration.tag()));
            record.expire_at
        })
    }

    /// Remove `key` and its history permanently.
    pub fn delete(&self, key: &str) -> KeyResult<()> {
        let _guard = self.exclusive();
        let mut document = self.persistence.load();

        if document.remove(key).is_none() {
            return Err(KeyError::NotFound(key.to_string()));
        }

        self.persistence.save(&document)
    }

    /// Every record in the store.
    pub fn list(&self) -> KeyDocument {
        let _guard = self.exclusive();
        self.persistence.load()
    }

    pub fn get(&self, key: &str) -> KeyResult<KeyRecord> {
        let _guard = self.exclusive();
        self.persistence
            .load()
            .remove(key)
            .ok_or_else(|| KeyError::NotFound(key.to_string()))
    }

    /// The audit trail of `key`, oldest first.
    pub fn history(&self, key: &str) -> KeyResult<Vec<HistoryEvent>> {
        Ok(self.get(key)?.history)
    }

    /// The audit trail plus expiry rendered in `offset`.
    pub fn history_view(&self, key: &str, offset: FixedOffset) -> KeyResult<HistoryView> {
        let record = self.get(key)?;
        let now = self.clock.now();

        Ok(HistoryView {
            expire_at: record.expire_at.map(|ts| format_local(ts, offset)),
            remaining: remaining(now, record.expire_at),
            events: record.history,
        })
    }
}
