//! Kiosk event journal with push-notification fan-out.
//!
//! Each recorded event lands in a bounded in-memory journal and is then pushed
//! to every registered operator device. A failed push never fails the record.

#![allow(async_fn_in_trait)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::KioskResult;

/// Events kept before the oldest are dropped.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1_000;

/// Page size when a query names none.
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AttemptLogin,
    AttemptOtp,
    AttemptOrderId,
    AttemptEnterNumber,
    AttemptEnterOtp,
    AttemptCancelOrder,
    AttemptUnlockCompartment,
    AttemptDropMoney,
    AttemptFinishOrder,
    DeleteOrder,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AttemptLogin => "ATTEMPT_LOGIN",
            EventKind::AttemptOtp => "ATTEMPT_OTP",
            EventKind::AttemptOrderId => "ATTEMPT_ORDER_ID",
            EventKind::AttemptEnterNumber => "ATTEMPT_ENTER_NUMBER",
            EventKind::AttemptEnterOtp => "ATTEMPT_ENTER_OTP",
            EventKind::AttemptCancelOrder => "ATTEMPT_CANCEL_ORDER",
            EventKind::AttemptUnlockCompartment => "ATTEMPT_UNLOCK_COMPARTMENT",
            EventKind::AttemptDropMoney => "ATTEMPT_DROP_MONEY",
            EventKind::AttemptFinishOrder => "ATTEMPT_FINISH_ORDER",
            EventKind::DeleteOrder => "DELETE_ORDER",
        }
    }

    /// Human title: `ATTEMPT_UNLOCK_COMPARTMENT` becomes `Attempt Unlock Compartment`.
    pub fn title(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let lower = word.to_ascii_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic, starting at 1.
    pub id: u64,
    pub kind: EventKind,
    pub message: String,
    /// Optional camera capture attached to the event.
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cursor query over the journal. Results are newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    /// Only events with a smaller id.
    pub before: Option<u64>,
    /// Only events with a larger id.
    pub after: Option<u64>,
    pub limit: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            before: None,
            after: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EventQuery {
    fn matches(&self, id: u64) -> bool {
        self.before.is_none_or(|before| id < before) && self.after.is_none_or(|after| id > after)
    }
}

/// Push notification fan-out to every registered operator device.
pub trait Notifier: Send + Sync {
    /// Returns `false` when nobody is registered to receive it.
    async fn notify_all(&self, title: &str, body: &str) -> KioskResult<bool>;
}

/// Notifier used when push delivery is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNotifier;

impl Notifier for NoNotifier {
    async fn notify_all(&self, title: &str, _body: &str) -> KioskResult<bool> {
        debug!(title, "No notifier configured, skipping");
        Ok(false)
    }
}

struct Journal {
    next_id: u64,
    capacity: usize,
    records: VecDeque<EventRecord>,
}

pub struct EventLog<N = NoNotifier> {
    journal: Mutex<Journal>,
    notifier: N,
}

impl<N: Notifier> EventLog<N> {
    pub fn new(notifier: N) -> Self {
        Self::with_capacity(notifier, DEFAULT_JOURNAL_CAPACITY)
    }

    pub fn with_capacity(notifier: N, capacity: usize) -> Self {
        Self {
            journal: Mutex::new(Journal {
                next_id: 1,
                capacity: capacity.max(1),
                records: VecDeque::new(),
            }),
            notifier,
        }
    }

    /// Journal an event and push it to operators.
    pub async fn record(
        &self,
        kind: EventKind,
        message: impl Into<String>,
        photo: Option<String>,
    ) -> EventRecord {
        let record = {
            let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
            let record = EventRecord {
                id: journal.next_id,
                kind,
                message: message.into(),
                photo,
                created_at: Utc::now(),
            };
            journal.next_id += 1;
            if journal.records.len() == journal.capacity {
                journal.records.pop_front();
            }
            journal.records.push_back(record.clone());
            record
        };
        info!(id = record.id, kind = %record.kind, message = %record.message, "Kiosk event");

        let title = format!("Log: {}", kind.title());
        let body = format!("Message: {}", record.message);
        match self.notifier.notify_all(&title, &body).await {
            Ok(true) => debug!(id = record.id, "Event pushed"),
            Ok(false) => debug!(id = record.id, "No notification targets"),
            Err(e) => warn!(id = record.id, error = %e, "Event notification failed"),
        }

        record
    }

    /// Page through the journal, newest first.
    pub fn query(&self, query: EventQuery) -> Vec<EventRecord> {
        let journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        journal
            .records
            .iter()
            .rev()
            .filter(|record| query.matches(record.id))
            .take(query.limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
