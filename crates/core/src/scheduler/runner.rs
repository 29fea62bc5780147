//! Time-of-day scheduler.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{
    FireOutcome, FireRecord, Schedule, ScheduleAction, SchedulePhase, ScheduleView,
    SchedulerError,
};
use crate::config::SchedulerConfig;
use crate::fleet::{FleetError, FleetRegistry};
use crate::metrics::SCHEDULE_FIRES;

/// Fire records kept for `history()`.
const HISTORY_LIMIT: usize = 200;

struct ScheduleSlot {
    schedule: Schedule,
    phase: SchedulePhase,
    /// Calendar day of the last slot that fired.
    last_fired_on: Option<NaiveDate>,
}

/// Fires start/stop/pause/resume actions at local times of day.
///
/// A schedule fires at most once per calendar day, when a tick lands in
/// `[time_of_day, time_of_day + fire_window)`. The window is what makes
/// firing independent of tick frequency.
pub struct Scheduler {
    registry: Arc<FleetRegistry>,
    tick_interval: Duration,
    fire_window: chrono::Duration,
    arm_lead: chrono::Duration,
    schedules: Mutex<BTreeMap<String, ScheduleSlot>>,
    history: Mutex<VecDeque<FireRecord>>,
}

impl Scheduler {
    pub fn new(registry: Arc<FleetRegistry>, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            tick_interval: Duration::from_secs(config.tick_interval_secs),
            fire_window: chrono::Duration::seconds(config.fire_window_secs as i64),
            arm_lead: chrono::Duration::seconds(config.arm_lead_secs as i64),
            schedules: Mutex::new(BTreeMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub async fn add_schedule(&self, schedule: Schedule) -> Result<(), SchedulerError> {
        let mut schedules = self.schedules.lock().await;
        if schedules.contains_key(&schedule.name) {
            return Err(SchedulerError::DuplicateSchedule(schedule.name));
        }
        info!(
            schedule = %schedule.name,
            torrent_id = %schedule.torrent_id,
            action = %schedule.action,
            time = %schedule.time_of_day.format("%H:%M"),
            "Schedule registered"
        );
        schedules.insert(
            schedule.name.clone(),
            ScheduleSlot {
                schedule,
                phase: SchedulePhase::Idle,
                last_fired_on: None,
            },
        );
        Ok(())
    }

    pub async fn remove_schedule(&self, name: &str) -> Result<(), SchedulerError> {
        if self.schedules.lock().await.remove(name).is_none() {
            return Err(SchedulerError::ScheduleNotFound(name.to_string()));
        }
        info!(schedule = %name, "Schedule removed");
        Ok(())
    }

    /// Registered schedules, ordered by name.
    pub async fn schedules(&self) -> Vec<ScheduleView> {
        self.schedules
            .lock()
            .await
            .values()
            .map(|slot| {
                let mut weekdays: Vec<_> = slot.schedule.weekdays.iter().copied().collect();
                weekdays.sort_by_key(|d| d.num_days_from_monday());
                ScheduleView {
                    name: slot.schedule.name.clone(),
                    torrent_id: slot.schedule.torrent_id,
                    action: slot.schedule.action,
                    time: slot.schedule.time_of_day.format("%H:%M").to_string(),
                    weekdays: weekdays.iter().map(|d| d.to_string()).collect(),
                    phase: slot.phase,
                    last_fired_on: slot.last_fired_on,
                }
            })
            .collect()
    }

    /// Most recent firings, oldest first.
    pub async fn history(&self) -> Vec<FireRecord> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn tick(&self) -> Vec<FireRecord> {
        self.tick_at(Local::now().naive_local()).await
    }

    /// Advance every schedule to `now` (local time) and fire the due ones.
    ///
    /// A schedule is marked fired before its action runs, so a failing or
    /// slow action is never retried within the same day.
    pub async fn tick_at(&self, now: NaiveDateTime) -> Vec<FireRecord> {
        let due: Vec<Schedule> = {
            let mut schedules = self.schedules.lock().await;
            schedules
                .values_mut()
                .filter_map(|slot| self.advance(slot, now))
                .collect()
        };

        let mut records = Vec::with_capacity(due.len());
        for schedule in due {
            let outcome = match self.dispatch(&schedule).await {
                Ok(()) => {
                    info!(
                        schedule = %schedule.name,
                        torrent_id = %schedule.torrent_id,
                        action = %schedule.action,
                        "Schedule fired"
                    );
                    FireOutcome::Fired
                }
                Err(FleetError::NotFound(id)) => {
                    warn!(
                        schedule = %schedule.name,
                        torrent_id = %id,
                        "Schedule target no longer exists"
                    );
                    FireOutcome::SkippedMissingTarget
                }
                Err(e) => {
                    warn!(
                        schedule = %schedule.name,
                        torrent_id = %schedule.torrent_id,
                        error = %e,
                        "Schedule action failed"
                    );
                    FireOutcome::Failed(e.to_string())
                }
            };
            SCHEDULE_FIRES.with_label_values(&[outcome.label()]).inc();
            records.push(FireRecord {
                schedule: schedule.name.clone(),
                torrent_id: schedule.torrent_id,
                action: schedule.action,
                at: now,
                outcome,
            });
        }

        if !records.is_empty() {
            let mut history = self.history.lock().await;
            history.extend(records.iter().cloned());
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
        records
    }

    /// Update one slot's phase; returns the schedule when it is due.
    fn advance(&self, slot: &mut ScheduleSlot, now: NaiveDateTime) -> Option<Schedule> {
        let today = now.date();
        // Yesterday's slot can still be inside its window just after midnight
        let candidates = [today.pred_opt(), Some(today)];
        for day in candidates.into_iter().flatten() {
            if !slot.schedule.runs_on(day.weekday()) || slot.last_fired_on == Some(day) {
                continue;
            }
            let since = now - day.and_time(slot.schedule.time_of_day);
            if since >= chrono::Duration::zero() && since < self.fire_window {
                slot.last_fired_on = Some(day);
                slot.phase = SchedulePhase::Fired;
                return Some(slot.schedule.clone());
            }
        }

        slot.phase = if slot.last_fired_on == Some(today) {
            SchedulePhase::Fired
        } else {
            let until = today.and_time(slot.schedule.time_of_day) - now;
            if slot.schedule.runs_on(today.weekday())
                && until > chrono::Duration::zero()
                && until <= self.arm_lead
            {
                if slot.phase != SchedulePhase::Armed {
                    debug!(schedule = %slot.schedule.name, "Schedule armed");
                }
                SchedulePhase::Armed
            } else {
                SchedulePhase::Idle
            }
        };
        None
    }

    async fn dispatch(&self, schedule: &Schedule) -> Result<(), FleetError> {
        match schedule.action {
            ScheduleAction::Start | ScheduleAction::Resume => {
                self.registry.resume(schedule.torrent_id).await
            }
            ScheduleAction::Stop | ScheduleAction::Pause => {
                self.registry.pause(schedule.torrent_id).await
            }
        }
    }
}
