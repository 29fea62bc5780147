use std::collections::HashSet;

use super::{types::Config, ConfigError, EngineBackend};
use crate::fleet::MAX_PRIORITY;
use crate::scheduler::{parse_time_of_day, parse_weekdays, ScheduleAction};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - The selected engine backend has its section (qbittorrent)
/// - Priorities are within 0-7
/// - Intervals and timeouts are positive
/// - The schedule fire window spans at least one scheduler tick
/// - Schedules parse and have unique names
/// - Feeds have unique ids and compilable regex filters
/// - Rule ids are unique
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.engine.backend == EngineBackend::Qbittorrent && config.engine.qbittorrent.is_none()
    {
        return Err(invalid(
            "engine.backend = \"qbittorrent\" requires an [engine.qbittorrent] section",
        ));
    }

    for (key, value) in [
        ("engine.call_timeout_secs", config.engine.call_timeout_secs),
        ("engine.add_timeout_secs", config.engine.add_timeout_secs),
        ("stats.interval_secs", config.stats.interval_secs),
        ("stats.retention_secs", config.stats.retention_secs),
        ("scheduler.tick_interval_secs", config.scheduler.tick_interval_secs),
        ("scheduler.fire_window_secs", config.scheduler.fire_window_secs),
        ("rss.poll_tick_secs", config.rss.poll_tick_secs),
        ("rss.default_poll_interval_secs", config.rss.default_poll_interval_secs),
        ("rss.fetch_timeout_secs", config.rss.fetch_timeout_secs),
        ("automation.interval_secs", config.automation.interval_secs),
    ] {
        if value == 0 {
            return Err(invalid(&format!("{} must be greater than 0", key)));
        }
    }

    // A narrower window can fall between two ticks and never fire
    if config.scheduler.fire_window_secs < config.scheduler.tick_interval_secs {
        return Err(invalid(&format!(
            "scheduler.fire_window_secs ({}) must be at least scheduler.tick_interval_secs ({})",
            config.scheduler.fire_window_secs, config.scheduler.tick_interval_secs
        )));
    }

    if config.session.default_priority > MAX_PRIORITY {
        return Err(invalid(&format!(
            "session.default_priority must be between 0 and {}",
            MAX_PRIORITY
        )));
    }

    if config.rss.seen_retention == 0 {
        return Err(invalid("rss.seen_retention must be greater than 0"));
    }

    let mut names = HashSet::new();
    for schedule in &config.scheduler.schedules {
        if !names.insert(schedule.name.as_str()) {
            return Err(invalid(&format!("duplicate schedule name '{}'", schedule.name)));
        }
        schedule
            .action
            .parse::<ScheduleAction>()
            .map_err(|e| invalid(&format!("schedule '{}': {}", schedule.name, e)))?;
        parse_time_of_day(&schedule.time)
            .map_err(|e| invalid(&format!("schedule '{}': {}", schedule.name, e)))?;
        parse_weekdays(&schedule.weekdays)
            .map_err(|e| invalid(&format!("schedule '{}': {}", schedule.name, e)))?;
    }

    let mut feed_ids = HashSet::new();
    for feed in &config.rss.feeds {
        if !feed_ids.insert(feed.feed_id.as_str()) {
            return Err(invalid(&format!("duplicate feed id '{}'", feed.feed_id)));
        }
        if feed.poll_interval_secs == Some(0) {
            return Err(invalid(&format!(
                "feed '{}': poll_interval_secs must be greater than 0",
                feed.feed_id
            )));
        }
        for filter in &feed.filters {
            if filter.priority > MAX_PRIORITY {
                return Err(invalid(&format!(
                    "feed '{}': filter '{}' priority must be between 0 and {}",
                    feed.feed_id, filter.pattern, MAX_PRIORITY
                )));
            }
            if filter.regex {
                regex_lite::Regex::new(&filter.pattern).map_err(|e| {
                    invalid(&format!(
                        "feed '{}': invalid regex '{}': {}",
                        feed.feed_id, filter.pattern, e
                    ))
                })?;
            }
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in &config.automation.rules {
        if !rule_ids.insert(rule.rule_id.as_str()) {
            return Err(invalid(&format!("duplicate rule id '{}'", rule.rule_id)));
        }
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
