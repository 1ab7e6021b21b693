//! Turns live pose matches into key triggers.
//!
//! A record fires once it has matched continuously for its hold time. Click
//! records fire a single `Click`; hold records fire `Press` and later a
//! `Release` when the pose is let go.

use crate::core::library::PoseRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Click,
    Press,
    Release,
}

/// A key event for the external key injector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTrigger {
    pub key: i32,
    pub action: TriggerAction,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ActiveMatch {
    record: usize,
    key: i32,
    hold_time_ms: u32,
    is_click: bool,
    since: DateTime<Utc>,
    fired: bool,
}

impl ActiveMatch {
    /// Release owed for this match, if it pressed a key.
    fn release(self, at: DateTime<Utc>) -> Option<KeyTrigger> {
        (self.fired && !self.is_click).then_some(KeyTrigger {
            key: self.key,
            action: TriggerAction::Release,
            at,
        })
    }
}

/// Follows which library record matches the live frame over time.
#[derive(Debug, Clone, Default)]
pub struct TriggerTracker {
    active: Option<ActiveMatch>,
}

impl TriggerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the record matching the frame taken at `at`, or `None`.
    pub fn update(
        &mut self,
        matched: Option<(usize, &PoseRecord)>,
        at: DateTime<Utc>,
    ) -> Vec<KeyTrigger> {
        let mut triggers = Vec::new();

        let continuing = matches!(
            (&self.active, matched),
            (Some(active), Some((index, _))) if active.record == index
        );
        if !continuing {
            if let Some(trigger) = self.active.take().and_then(|a| a.release(at)) {
                triggers.push(trigger);
            }
            if let Some((index, record)) = matched {
                debug!(record = index, key = record.key, "Pose match started");
                self.active = Some(ActiveMatch {
                    record: index,
                    key: record.key,
                    hold_time_ms: record.hold_time_ms,
                    is_click: record.is_click,
                    since: at,
                    fired: false,
                });
            }
        }

        if let Some(ref mut active) = self.active {
            let held_ms = (at - active.since).num_milliseconds();
            if !active.fired && held_ms >= i64::from(active.hold_time_ms) {
                active.fired = true;
                triggers.push(KeyTrigger {
                    key: active.key,
                    action: if active.is_click {
                        TriggerAction::Click
                    } else {
                        TriggerAction::Press
                    },
                    at,
                });
            }
        }

        triggers
    }

    /// Forget the active match, releasing its key if it was pressed.
    pub fn reset(&mut self, at: DateTime<Utc>) -> Option<KeyTrigger> {
        self.active.take().and_then(|a| a.release(at))
    }

    /// Key of the record currently matching, if any.
    pub fn active_key(&self) -> Option<i32> {
        self.active.as_ref().map(|a| a.key)
    }
}
