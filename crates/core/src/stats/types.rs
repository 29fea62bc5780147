//! Statistics sample and rollup types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{StatusSnapshot, TorrentState};
use crate::fleet::TorrentId;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// One torrent inside a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSample {
    pub id: TorrentId,
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u32,
    pub state: TorrentState,
}

/// Aggregate figures over a set of torrents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    pub num_torrents: usize,
    /// Torrents currently downloading.
    pub active: usize,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u64,
    pub total_downloaded: u64,
    pub total_uploaded: u64,
}

impl FleetTotals {
    pub fn from_statuses<'a, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'a StatusSnapshot>,
    {
        statuses
            .into_iter()
            .fold(FleetTotals::default(), |mut totals, status| {
                totals.num_torrents += 1;
                if status.state == TorrentState::Downloading {
                    totals.active += 1;
                }
                totals.download_rate += status.download_rate;
                totals.upload_rate += status.upload_rate;
                totals.num_peers += status.num_peers as u64;
                totals.total_downloaded += status.total_downloaded;
                totals.total_uploaded += status.total_uploaded;
                totals
            })
    }
}

/// Immutable point-in-time capture of the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSample {
    pub timestamp: DateTime<Utc>,
    pub torrents: Vec<TorrentSample>,
    pub totals: FleetTotals,
    /// Torrents whose status could not be read this tick.
    #[serde(default)]
    pub failed: Vec<TorrentId>,
}

/// Rollup of every sample taken during one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub sample_count: u64,
    pub avg_download_rate: f64,
    pub avg_upload_rate: f64,
    pub peak_download_rate: u64,
    pub peak_upload_rate: u64,
    /// Estimated from rate x time since the previous sample.
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    /// Torrents observed crossing 100% that day.
    pub torrents_completed: u64,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            sample_count: 0,
            avg_download_rate: 0.0,
            avg_upload_rate: 0.0,
            peak_download_rate: 0,
            peak_upload_rate: 0,
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            torrents_completed: 0,
        }
    }

    /// Fold one sample in. `elapsed_secs` is the time the sample stands for.
    pub fn absorb(&mut self, sample: &StatSample, elapsed_secs: f64, newly_completed: u64) {
        let totals = &sample.totals;
        self.sample_count += 1;
        let n = self.sample_count as f64;
        self.avg_download_rate += (totals.download_rate as f64 - self.avg_download_rate) / n;
        self.avg_upload_rate += (totals.upload_rate as f64 - self.avg_upload_rate) / n;
        self.peak_download_rate = self.peak_download_rate.max(totals.download_rate);
        self.peak_upload_rate = self.peak_upload_rate.max(totals.upload_rate);
        self.downloaded_bytes += (totals.download_rate as f64 * elapsed_secs) as u64;
        self.uploaded_bytes += (totals.upload_rate as f64 * elapsed_secs) as u64;
        self.torrents_completed += newly_completed;
    }
}

/// Sum of consecutive daily rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sample_count: u64,
    pub avg_download_rate: f64,
    pub avg_upload_rate: f64,
    pub peak_download_rate: u64,
    pub peak_upload_rate: u64,
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    pub torrents_completed: u64,
    pub days: Vec<DailyStats>,
}

impl PeriodStats {
    pub fn from_days(start: NaiveDate, end: NaiveDate, days: Vec<DailyStats>) -> Self {
        let sample_count: u64 = days.iter().map(|d| d.sample_count).sum();
        let weighted = |f: fn(&DailyStats) -> f64| {
            if sample_count == 0 {
                0.0
            } else {
                days.iter().map(|d| f(d) * d.sample_count as f64).sum::<f64>() / sample_count as f64
            }
        };
        Self {
            start,
            end,
            sample_count,
            avg_download_rate: weighted(|d| d.avg_download_rate),
            avg_upload_rate: weighted(|d| d.avg_upload_rate),
            peak_download_rate: days.iter().map(|d| d.peak_download_rate).max().unwrap_or(0),
            peak_upload_rate: days.iter().map(|d| d.peak_upload_rate).max().unwrap_or(0),
            downloaded_bytes: days.iter().map(|d| d.downloaded_bytes).sum(),
            uploaded_bytes: days.iter().map(|d| d.uploaded_bytes).sum(),
            torrents_completed: days.iter().map(|d| d.torrents_completed).sum(),
            days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(download_rate: u64, upload_rate: u64) -> StatSample {
        StatSample {
            timestamp: Utc::now(),
            torrents: Vec::new(),
            totals: FleetTotals {
                download_rate,
                upload_rate,
                ..Default::default()
            },
            failed: Vec::new(),
        }
    }

    #[test]
    fn test_absorb_averages_and_peaks() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut daily = DailyStats::empty(date);
        daily.absorb(&sample(100, 10), 60.0, 0);
        daily.absorb(&sample(300, 30), 60.0, 1);

        assert_eq!(daily.sample_count, 2);
        assert!((daily.avg_download_rate - 200.0).abs() < 1e-9);
        assert!((daily.avg_upload_rate - 20.0).abs() < 1e-9);
        assert_eq!(daily.peak_download_rate, 300);
        assert_eq!(daily.downloaded_bytes, 100 * 60 + 300 * 60);
        assert_eq!(daily.torrents_completed, 1);
    }

    #[test]
    fn test_period_weights_by_samples() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let mut a = DailyStats::empty(d1);
        a.absorb(&sample(100, 0), 1.0, 0);
        let mut b = DailyStats::empty(d2);
        b.absorb(&sample(400, 0), 1.0, 2);
        b.absorb(&sample(400, 0), 1.0, 0);
        b.absorb(&sample(400, 0), 1.0, 0);

        let period = PeriodStats::from_days(d1, d2, vec![a, b]);
        assert_eq!(period.sample_count, 4);
        assert!((period.avg_download_rate - 325.0).abs() < 1e-9);
        assert_eq!(period.torrents_completed, 2);
        assert_eq!(period.peak_download_rate, 400);
    }

    #[test]
    fn test_totals_from_statuses() {
        let statuses = vec![
            StatusSnapshot {
                download_rate: 10,
                upload_rate: 1,
                num_peers: 3,
                state: TorrentState::Downloading,
                ..Default::default()
            },
            StatusSnapshot {
                download_rate: 0,
                upload_rate: 5,
                num_peers: 2,
                state: TorrentState::Seeding,
                ..Default::default()
            },
        ];
        let totals = FleetTotals::from_statuses(&statuses);
        assert_eq!(totals.num_torrents, 2);
        assert_eq!(totals.active, 1);
        assert_eq!(totals.download_rate, 10);
        assert_eq!(totals.upload_rate, 6);
        assert_eq!(totals.num_peers, 5);
    }
}
