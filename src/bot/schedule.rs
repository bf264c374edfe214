/// Scheduled channel messages.
///
/// Each timer repeats a fixed text every `interval_minutes`, counted in whole
/// minutes since the bot started. A timer fires when the elapsed minute is a
/// multiple of its interval and at least one full interval has passed since
/// it last fired, so a minute that spans several loop iterations fires once.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::JsonStore;

/// Stored form of a timer; the message text is the store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("interval must be at least one minute")]
    ZeroInterval,

    #[error("message is empty")]
    EmptyText,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    timers: JsonStore<Timer>,
    /// Text → minute offset of the last fire. Not persisted; every timer
    /// starts fresh at boot.
    last_fired: HashMap<String, u64>,
}

impl Scheduler {
    pub fn new(timers: JsonStore<Timer>) -> Self {
        Self {
            timers,
            last_fired: HashMap::new(),
        }
    }

    /// Add or replace a timer. Returns the previous interval for `text`.
    pub fn add(&mut self, text: &str, interval_minutes: u64) -> Result<Option<u64>, ScheduleError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ScheduleError::EmptyText);
        }
        if interval_minutes == 0 {
            return Err(ScheduleError::ZeroInterval);
        }
        info!(%text, interval_minutes, "timer set");
        let previous = self.timers.set(text, Timer { interval_minutes });
        Ok(previous.map(|t| t.interval_minutes))
    }

    pub fn remove(&mut self, text: &str) -> Option<u64> {
        let text = text.trim();
        self.last_fired.remove(text);
        let removed = self.timers.delete(text)?;
        info!(%text, "timer removed");
        Some(removed.interval_minutes)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Texts due at `elapsed` whole minutes, marking them as fired.
    pub fn due(&mut self, elapsed: u64) -> Vec<String> {
        let mut fired = Vec::new();
        for (text, timer) in self.timers.iter() {
            let interval = timer.interval_minutes;
            if interval == 0 || elapsed % interval != 0 {
                continue;
            }
            let last = self.last_fired.get(text).copied().unwrap_or(0);
            if elapsed.saturating_sub(last) >= interval {
                self.last_fired.insert(text.clone(), elapsed);
                fired.push(text.clone());
            }
        }
        fired
    }
}
