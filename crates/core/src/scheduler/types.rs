//! Schedule definitions and parsing.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScheduleConfig;
use crate::fleet::TorrentId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Schedule already exists: {0}")]
    DuplicateSchedule(String),

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("Invalid time of day {0:?}: expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid weekday {0:?}")]
    InvalidWeekday(String),

    #[error("Invalid schedule action {0:?}: expected start, stop, pause or resume")]
    InvalidAction(String),
}

/// What a schedule does to its torrent when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Start,
    Stop,
    Pause,
    Resume,
}

impl ScheduleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleAction::Start => "start",
            ScheduleAction::Stop => "stop",
            ScheduleAction::Pause => "pause",
            ScheduleAction::Resume => "resume",
        }
    }
}

impl fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleAction {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(ScheduleAction::Start),
            "stop" => Ok(ScheduleAction::Stop),
            "pause" => Ok(ScheduleAction::Pause),
            "resume" => Ok(ScheduleAction::Resume),
            _ => Err(SchedulerError::InvalidAction(s.to_string())),
        }
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`) local time.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, SchedulerError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| SchedulerError::InvalidTime(s.to_string()))
}

/// Parse weekday names ("mon", "Monday", ...). An empty list means every day.
pub fn parse_weekdays(names: &[String]) -> Result<HashSet<Weekday>, SchedulerError> {
    names
        .iter()
        .map(|name| {
            name.trim()
                .parse::<Weekday>()
                .map_err(|_| SchedulerError::InvalidWeekday(name.clone()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub name: String,
    pub torrent_id: TorrentId,
    pub action: ScheduleAction,
    pub time_of_day: NaiveTime,
    /// Empty means every day.
    pub weekdays: HashSet<Weekday>,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, SchedulerError> {
        Ok(Self {
            name: config.name.clone(),
            torrent_id: TorrentId(config.torrent_id),
            action: config.action.parse()?,
            time_of_day: parse_time_of_day(&config.time)?,
            weekdays: parse_weekdays(&config.weekdays)?,
        })
    }

    pub fn runs_on(&self, day: Weekday) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&day)
    }
}

/// Per-day state of a schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePhase {
    #[default]
    Idle,
    /// The slot is coming up soon.
    Armed,
    /// Already fired for today's slot.
    Fired,
}

/// Read-only view of a registered schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleView {
    pub name: String,
    pub torrent_id: TorrentId,
    pub action: ScheduleAction,
    pub time: String,
    pub weekdays: Vec<String>,
    pub phase: SchedulePhase,
    pub last_fired_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum FireOutcome {
    Fired,
    SkippedMissingTarget,
    Failed(String),
}

impl FireOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FireOutcome::Fired => "fired",
            FireOutcome::SkippedMissingTarget => "skipped_missing_target",
            FireOutcome::Failed(_) => "failed",
        }
    }
}

/// One firing, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireRecord {
    pub schedule: String,
    pub torrent_id: TorrentId,
    pub action: ScheduleAction,
    pub at: NaiveDateTime,
    pub outcome: FireOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("09:00").unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("23:59:30").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 30).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("9am").is_err());
    }

    #[test]
    fn test_parse_weekdays() {
        let days = parse_weekdays(&["mon".to_string(), "Friday".to_string()]).unwrap();
        assert_eq!(days.len(), 2);
        assert!(days.contains(&Weekday::Mon));
        assert!(days.contains(&Weekday::Fri));

        assert!(parse_weekdays(&[]).unwrap().is_empty());
        assert!(matches!(
            parse_weekdays(&["someday".to_string()]),
            Err(SchedulerError::InvalidWeekday(_))
        ));
    }

    #[test]
    fn test_parse_action() {
        assert_eq!("Start".parse::<ScheduleAction>().unwrap(), ScheduleAction::Start);
        assert_eq!("stop".parse::<ScheduleAction>().unwrap(), ScheduleAction::Stop);
        assert!(matches!(
            "reboot".parse::<ScheduleAction>(),
            Err(SchedulerError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_empty_weekdays_runs_daily() {
        let schedule = Schedule {
            name: "daily".to_string(),
            torrent_id: TorrentId(1),
            action: ScheduleAction::Pause,
            time_of_day: NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            weekdays: HashSet::new(),
        };
        assert!(schedule.runs_on(Weekday::Sun));
        assert!(schedule.runs_on(Weekday::Wed));
    }
}
