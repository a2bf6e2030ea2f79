//! Time-based triggers for backup entries.
//!
//! The coordinator only consumes trigger events through the [`Scheduler`]
//! trait. [`ClockScheduler`] is the in-process implementation used by the
//! daemon: it keeps one [`ScheduleBinding`] per entry and checks for due
//! entries on a fixed tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::models::BackupSettings;

/// When an entry should run on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Manual,
    Every {
        minutes: u32,
    },
    Daily {
        hour: u32,
        minute: u32,
    },
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl Schedule {
    /// Next run strictly after `now`, or `None` if the schedule never fires.
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        match *self {
            Schedule::Manual => None,
            Schedule::Every { minutes: 0 } => None,
            Schedule::Every { minutes } => {
                Some(now + chrono::Duration::minutes(i64::from(minutes)))
            }
            Schedule::Daily { hour, minute } => next_wall_clock(now, None, hour, minute),
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => next_wall_clock(now, Some(weekday), hour, minute),
        }
    }
}

fn next_wall_clock(
    now: DateTime<Local>,
    weekday: Option<Weekday>,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Local>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date_naive();

    // A week plus one day covers "same weekday, time already passed".
    for offset in 0..=7u64 {
        let date = today.checked_add_days(Days::new(offset))?;
        if weekday.is_some_and(|wd| date.weekday() != wd) {
            continue;
        }
        match at_local(date, time) {
            Some(candidate) if candidate > now => return Some(candidate),
            _ => continue,
        }
    }
    None
}

/// Local wall-clock time, skipping times that fall in a DST gap.
fn at_local(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

/// The scheduler's record of an entry's next trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleBinding {
    pub schedule: Schedule,
    pub next_run: DateTime<Local>,
}

/// Trigger source consumed by the coordinator.
pub trait Scheduler: Send + Sync {
    /// Replace the binding for an entry with one derived from `settings`.
    fn update_backup(&self, entry_id: &str, settings: &BackupSettings);

    /// Forget an entry entirely.
    fn remove_backup(&self, entry_id: &str);

    /// Take the trigger stream. Only the first call returns `Some`.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<String>>;
}

type Bindings = Arc<Mutex<HashMap<String, ScheduleBinding>>>;

pub struct ClockScheduler {
    bindings: Bindings,
    trigger_tx: mpsc::UnboundedSender<String>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
}

impl Default for ClockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockScheduler {
    pub fn new() -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Self {
            bindings: Arc::new(Mutex::new(HashMap::new())),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn the tick loop. Runs until [`ClockScheduler::stop`].
    pub fn start(&self, tick: Duration) {
        let bindings = self.bindings.clone();
        let tx = self.trigger_tx.clone();
        let cancel = self.cancel.clone();

        info!(tick_secs = tick.as_secs(), "Scheduler started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        fire_due(&bindings, &tx, Local::now());
                    }
                }
            }
            debug!("Scheduler tick loop stopped");
        });
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn binding(&self, entry_id: &str) -> Option<ScheduleBinding> {
        lock(&self.bindings).get(entry_id).cloned()
    }

    /// Emit triggers for every binding due at `now` and advance them.
    pub fn fire_due(&self, now: DateTime<Local>) -> Vec<String> {
        fire_due(&self.bindings, &self.trigger_tx, now)
    }

    fn bind(&self, entry_id: &str, schedule: &Schedule, now: DateTime<Local>) {
        let mut bindings = lock(&self.bindings);
        match schedule.next_after(now) {
            Some(next_run) => {
                debug!(entry_id, next_run = %next_run, "Schedule bound");
                bindings.insert(
                    entry_id.to_string(),
                    ScheduleBinding {
                        schedule: schedule.clone(),
                        next_run,
                    },
                );
            }
            None => {
                bindings.remove(entry_id);
            }
        }
    }
}

impl Scheduler for ClockScheduler {
    fn update_backup(&self, entry_id: &str, settings: &BackupSettings) {
        self.bind(entry_id, &settings.schedule, Local::now());
    }

    fn remove_backup(&self, entry_id: &str) {
        lock(&self.bindings).remove(entry_id);
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn lock(bindings: &Bindings) -> MutexGuard<'_, HashMap<String, ScheduleBinding>> {
    bindings.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fire_due(
    bindings: &Bindings,
    tx: &mpsc::UnboundedSender<String>,
    now: DateTime<Local>,
) -> Vec<String> {
    let mut fired = Vec::new();
    let mut bindings = lock(bindings);

    bindings.retain(|entry_id, binding| {
        if binding.next_run > now {
            return true;
        }
        fired.push(entry_id.clone());
        match binding.schedule.next_after(now) {
            Some(next_run) => {
                binding.next_run = next_run;
                true
            }
            None => false,
        }
    });

    for entry_id in &fired {
        info!(entry_id = %entry_id, "Scheduled backup due");
        let _ = tx.send(entry_id.clone());
    }

    fired
}
