//! Plain-text rendering for CLI output.

use std::fmt::Write;

use tamer_core::engine::PeerInfo;
use tamer_core::{FleetStats, TorrentEntry, TorrentInfo};

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Pieces per piece-map row.
const PIECE_MAP_WIDTH: usize = 50;

/// Peers listed before the "and N more" line.
const PEER_PANEL_LIMIT: usize = 10;

pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn format_rate(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

pub fn format_progress(progress: f64) -> String {
    format!("{:.1}%", (progress * 100.0).clamp(0.0, 100.0))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// One row per torrent, with a header.
pub fn torrent_table(entries: &[TorrentEntry]) -> String {
    if entries.is_empty() {
        return "No torrents.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:<40}  {:<11}  {:>6}  {:>12}  {:>12}  {:>3}  {:>5}",
        "ID", "NAME", "STATE", "DONE", "DOWN", "UP", "PRI", "PEERS"
    );
    for entry in entries {
        let status = &entry.last_known_status;
        let _ = writeln!(
            out,
            "{:>4}  {:<40}  {:<11}  {:>6}  {:>12}  {:>12}  {:>3}  {:>5}",
            entry.id.0,
            truncate(&entry.name, 40),
            status.state.as_str(),
            format_progress(status.progress),
            format_rate(status.download_rate),
            format_rate(status.upload_rate),
            entry.priority,
            status.num_peers,
        );
    }
    out
}

pub fn torrent_detail(info: &TorrentInfo) -> String {
    let entry = &info.entry;
    let status = &entry.last_known_status;
    let mut out = String::new();

    let _ = writeln!(out, "ID:            {}", entry.id);
    let _ = writeln!(out, "Name:          {}", entry.name);
    let _ = writeln!(out, "Info hash:     {}", entry.info_hash);
    let _ = writeln!(out, "Source:        {}", entry.source);
    let _ = writeln!(out, "Added:         {}", entry.added_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        out,
        "State:         {}{}",
        status.state.as_str(),
        if info.live { "" } else { " (cached)" }
    );
    let _ = writeln!(
        out,
        "Progress:      {} of {}",
        format_progress(status.progress),
        format_bytes(status.total_size)
    );
    let _ = writeln!(
        out,
        "Rates:         down {}, up {}",
        format_rate(status.download_rate),
        format_rate(status.upload_rate)
    );
    let _ = writeln!(
        out,
        "Transferred:   down {}, up {}",
        format_bytes(status.total_downloaded),
        format_bytes(status.total_uploaded)
    );
    let _ = writeln!(out, "Peers:         {}", status.num_peers);
    let _ = writeln!(out, "Priority:      {}", entry.priority);
    let _ = writeln!(out, "Sequential:    {}", yes_no(entry.sequential));
    let _ = writeln!(out, "Super-seeding: {}", yes_no(entry.super_seeding));
    let _ = writeln!(
        out,
        "Limits:        down {}, up {}",
        format_limit(entry.download_limit),
        format_limit(entry.upload_limit)
    );
    if !entry.save_path.is_empty() {
        let _ = writeln!(out, "Save path:     {}", entry.save_path);
    }

    if entry.trackers.is_empty() {
        let _ = writeln!(out, "Trackers:      none");
    } else {
        let _ = writeln!(out, "Trackers:");
        for tracker in &entry.trackers {
            let _ = writeln!(out, "  {}", tracker);
        }
    }

    if !info.files.is_empty() {
        let _ = writeln!(out, "Files:");
        for file in &info.files {
            let _ = writeln!(
                out,
                "  [{}] {}  {}  priority {}",
                file.index,
                file.path,
                format_bytes(file.size),
                file.priority
            );
        }
    }

    if !status.peers.is_empty() {
        let _ = writeln!(out, "Connected peers:");
        for peer in &status.peers {
            let _ = writeln!(
                out,
                "  {}:{}  {}  {}  down {}  up {}",
                peer.ip,
                peer.port,
                peer.client,
                format_progress(peer.progress),
                format_rate(peer.download_rate),
                format_rate(peer.upload_rate)
            );
        }
    }
    out
}

pub fn stats_summary(stats: &FleetStats) -> String {
    let totals = &stats.totals;
    let today = &stats.today;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Torrents:      {} ({} active)",
        totals.num_torrents, totals.active
    );
    let _ = writeln!(
        out,
        "Rates:         down {}, up {}",
        format_rate(totals.download_rate),
        format_rate(totals.upload_rate)
    );
    let _ = writeln!(out, "Peers:         {}", totals.num_peers);
    let _ = writeln!(
        out,
        "Session:       down {}, up {}",
        format_bytes(totals.total_downloaded),
        format_bytes(totals.total_uploaded)
    );
    let _ = writeln!(out, "Today ({}):", today.date);
    let _ = writeln!(
        out,
        "  Average:     down {}, up {}",
        format_rate(today.avg_download_rate.round() as u64),
        format_rate(today.avg_upload_rate.round() as u64)
    );
    let _ = writeln!(
        out,
        "  Peak:        down {}, up {}",
        format_rate(today.peak_download_rate),
        format_rate(today.peak_upload_rate)
    );
    let _ = writeln!(
        out,
        "  Transferred: down {}, up {}",
        format_bytes(today.downloaded_bytes),
        format_bytes(today.uploaded_bytes)
    );
    let _ = writeln!(out, "  Completed:   {}", today.torrents_completed);
    let _ = writeln!(out, "  Samples:     {}", today.sample_count);
    out
}

/// Which optional panels `monitor_screen` draws for the first torrent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorPanels {
    pub pieces: bool,
    pub peers: bool,
}

/// `█` for a complete piece, `░` otherwise, wrapped every 50 pieces.
pub fn piece_map(bitmap: &[bool]) -> String {
    let mut out = String::new();
    for row in bitmap.chunks(PIECE_MAP_WIDTH) {
        let line: String = row.iter().map(|&have| if have { '█' } else { '░' }).collect();
        let _ = writeln!(out, "{}", line);
    }
    out
}

pub fn peer_table(peers: &[PeerInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<39}  {:>5}  {:<20}  {:>6}  {:>12}  {:>12}",
        "IP", "PORT", "CLIENT", "DONE", "DOWN", "UP"
    );
    for peer in peers.iter().take(PEER_PANEL_LIMIT) {
        let _ = writeln!(
            out,
            "{:<39}  {:>5}  {:<20}  {:>6}  {:>12}  {:>12}",
            peer.ip,
            peer.port,
            truncate(&peer.client, 20),
            format_progress(peer.progress),
            format_rate(peer.download_rate),
            format_rate(peer.upload_rate),
        );
    }
    if peers.len() > PEER_PANEL_LIMIT {
        let _ = writeln!(out, "... and {} more peers", peers.len() - PEER_PANEL_LIMIT);
    }
    out
}

/// One monitor frame: fleet table, optional panels, then session totals.
pub fn monitor_screen(
    entries: &[TorrentEntry],
    stats: Option<&FleetStats>,
    panels: MonitorPanels,
) -> String {
    let mut out = String::new();
    out.push_str(&torrent_table(entries));

    if let Some(first) = entries.first() {
        let status = &first.last_known_status;
        if panels.pieces {
            let _ = writeln!(out, "\nPieces of {}:", first.name);
            if status.piece_bitmap.is_empty() {
                let _ = writeln!(out, "not reported by the engine");
            } else {
                out.push_str(&piece_map(&status.piece_bitmap));
            }
        }
        if panels.peers {
            let _ = writeln!(out, "\nPeers of {}:", first.name);
            if status.peers.is_empty() {
                let _ = writeln!(out, "none connected");
            } else {
                out.push_str(&peer_table(&status.peers));
            }
        }
    }

    if let Some(stats) = stats {
        let totals = &stats.totals;
        let _ = writeln!(out, "\nSession:");
        let _ = writeln!(
            out,
            "  Rates:       down {}, up {}",
            format_rate(totals.download_rate),
            format_rate(totals.upload_rate)
        );
        let _ = writeln!(
            out,
            "  Transferred: down {}, up {}",
            format_bytes(totals.total_downloaded),
            format_bytes(totals.total_uploaded)
        );
        let _ = writeln!(
            out,
            "  Torrents:    {} ({} active), {} peers",
            totals.num_torrents, totals.active, totals.num_peers
        );
    }
    out
}

fn format_limit(kbps: u64) -> String {
    if kbps == 0 {
        "unlimited".to_string()
    } else {
        format_rate(kbps.saturating_mul(1024))
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tamer_core::engine::{StatusSnapshot, TorrentState};
    use tamer_core::TorrentId;

    fn entry(id: u64, name: &str) -> TorrentEntry {
        TorrentEntry {
            id: TorrentId(id),
            source: format!("magnet:?xt=urn:btih:{:040x}", id),
            name: name.to_string(),
            info_hash: format!("{:040x}", id),
            added_at: Utc::now(),
            priority: 5,
            sequential: false,
            super_seeding: false,
            trackers: vec![],
            download_limit: 0,
            upload_limit: 0,
            save_path: "/downloads".to_string(),
            last_known_status: StatusSnapshot {
                progress: 0.5,
                download_rate: 2048,
                state: TorrentState::Downloading,
                ..StatusSnapshot::default()
            },
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_format_progress_clamps() {
        assert_eq!(format_progress(0.421), "42.1%");
        assert_eq!(format_progress(1.2), "100.0%");
    }

    #[test]
    fn test_torrent_table_rows() {
        let table = torrent_table(&[entry(1, "Ubuntu"), entry(2, "Fedora")]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  ID"));
        assert!(lines[1].contains("Ubuntu"));
        assert!(lines[1].contains("downloading"));
        assert!(lines[1].contains("2.0 KiB/s"));
        assert_eq!(torrent_table(&[]), "No torrents.\n");
    }

    #[test]
    fn test_truncate_long_names() {
        let long = "x".repeat(60);
        let table = torrent_table(&[entry(1, &long)]);
        assert!(table.contains('…'));
        assert!(!table.contains(&long));
    }

    #[test]
    fn test_detail_marks_cached_status() {
        let info = TorrentInfo {
            entry: entry(3, "Debian"),
            files: vec![],
            live: false,
        };
        let detail = torrent_detail(&info);
        assert!(detail.contains("downloading (cached)"));
        assert!(detail.contains("Trackers:      none"));
        assert!(detail.contains("Limits:        down unlimited, up unlimited"));
        assert!(detail.contains("Save path:     /downloads"));
    }

    #[test]
    fn test_piece_map_wraps_rows() {
        let bitmap: Vec<bool> = (0..120).map(|i| i < 60).collect();
        let map = piece_map(&bitmap);
        let rows: Vec<&str> = map.lines().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].chars().filter(|&c| c == '█').count(), 50);
        assert_eq!(rows[1].chars().filter(|&c| c == '█').count(), 10);
        assert_eq!(rows[2].chars().count(), 20);
    }

    #[test]
    fn test_peer_table_caps_rows() {
        let peers: Vec<PeerInfo> = (0..12)
            .map(|i| PeerInfo {
                ip: format!("10.0.0.{}", i),
                port: 6881,
                client: "qBittorrent/5.0".to_string(),
                progress: 0.25,
                download_rate: 1024,
                upload_rate: 0,
            })
            .collect();
        let table = peer_table(&peers);
        assert!(table.contains("10.0.0.9"));
        assert!(!table.contains("10.0.0.10 "));
        assert!(table.ends_with("... and 2 more peers\n"));
    }

    #[test]
    fn test_monitor_screen_panels() {
        let mut first = entry(1, "Ubuntu");
        first.last_known_status.piece_bitmap = vec![true, false, true];
        let screen = monitor_screen(
            &[first, entry(2, "Fedora")],
            None,
            MonitorPanels {
                pieces: true,
                peers: true,
            },
        );
        assert!(screen.contains("Pieces of Ubuntu:\n█░█\n"));
        assert!(screen.contains("Peers of Ubuntu:\nnone connected"));
        assert!(!screen.contains("Session:"));

        let plain = monitor_screen(&[], None, MonitorPanels::default());
        assert_eq!(plain, "No torrents.\n");
    }
}
