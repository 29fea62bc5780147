//! Execution of the client-side CLI verbs against a running daemon.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use crate::cli::Command;
use crate::client::{ApiClient, CliError, CliResult};
use crate::format::{self, MonitorPanels};

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Failure(anyhow::anyhow!("failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn print_entry<T: Serialize>(json: bool, value: &T, message: String) -> CliResult<()> {
    if json {
        print_json(value)
    } else {
        println!("{}", message);
        Ok(())
    }
}

pub async fn execute(client: &ApiClient, command: Command, json: bool) -> CliResult<()> {
    match command {
        Command::Serve { .. } => Err(CliError::Validation(
            "serve runs in-process and is not a client command".to_string(),
        )),
        Command::Add {
            source,
            priority,
            sequential,
        } => {
            let entry = client
                .add(&source, priority, sequential.then_some(true))
                .await?;
            print_entry(json, &entry, format!("Added torrent {} ({})", entry.id, entry.name))
        }
        Command::List { status, refresh } => {
            let entries = if refresh {
                client.list_live(status.as_deref()).await?
            } else {
                client.list(status.as_deref()).await?
            };
            if json {
                print_json(&entries)
            } else {
                print!("{}", format::torrent_table(&entries));
                Ok(())
            }
        }
        Command::Pause { id } => {
            let entry = client.pause(id).await?;
            print_entry(json, &entry, format!("Paused torrent {}", id))
        }
        Command::Resume { id } => {
            let entry = client.resume(id).await?;
            print_entry(json, &entry, format!("Resumed torrent {}", id))
        }
        Command::Remove { id, delete_data } => {
            client.remove(id, delete_data).await?;
            if delete_data {
                println!("Removed torrent {} and its data", id);
            } else {
                println!("Removed torrent {}", id);
            }
            Ok(())
        }
        Command::Priority { id, level } => {
            let entry = client.set_priority(id, level).await?;
            print_entry(json, &entry, format!("Torrent {} priority set to {}", id, entry.priority))
        }
        Command::FilePriority {
            id,
            file_index,
            level,
        } => {
            let entry = client.set_file_priority(id, file_index, level).await?;
            print_entry(
                json,
                &entry,
                format!("Torrent {} file {} priority set to {}", id, file_index, level),
            )
        }
        Command::AddTrackers { id, urls } => {
            let entry = client.add_trackers(id, &urls).await?;
            print_entry(
                json,
                &entry,
                format!("Torrent {} now has {} tracker(s)", id, entry.trackers.len()),
            )
        }
        Command::RemoveTrackers { id, urls } => {
            let entry = client.remove_trackers(id, &urls).await?;
            print_entry(
                json,
                &entry,
                format!("Torrent {} now has {} tracker(s)", id, entry.trackers.len()),
            )
        }
        Command::Sequential { id, toggle } => {
            let entry = client.set_sequential(id, toggle.enabled()).await?;
            print_entry(
                json,
                &entry,
                format!("Sequential download {} for torrent {}", on_off(entry.sequential), id),
            )
        }
        Command::SuperSeeding { id, toggle } => {
            let entry = client.set_super_seeding(id, toggle.enabled()).await?;
            print_entry(
                json,
                &entry,
                format!("Super-seeding {} for torrent {}", on_off(entry.super_seeding), id),
            )
        }
        Command::ForceRecheck { id } => {
            let entry = client.force_recheck(id).await?;
            print_entry(json, &entry, format!("Recheck started for torrent {}", id))
        }
        Command::DownloadLimit { id, kbps } => {
            let entry = client.set_download_limit(id, kbps).await?;
            print_entry(json, &entry, limit_message(id, "Download", kbps))
        }
        Command::UploadLimit { id, kbps } => {
            let entry = client.set_upload_limit(id, kbps).await?;
            print_entry(json, &entry, limit_message(id, "Upload", kbps))
        }
        Command::Move { id, path } => {
            let entry = client.move_storage(id, &path).await?;
            print_entry(
                json,
                &entry,
                format!("Torrent {} storage moved to {}", id, entry.save_path),
            )
        }
        Command::Search { query } => {
            let entries = client.search(&query).await?;
            if json {
                print_json(&entries)
            } else {
                print!("{}", format::torrent_table(&entries));
                Ok(())
            }
        }
        Command::Info { id } => {
            let info = client.info(id).await?;
            if json {
                print_json(&info)
            } else {
                print!("{}", format::torrent_detail(&info));
                Ok(())
            }
        }
        Command::Stats => {
            let stats = client.stats().await?;
            if json {
                print_json(&stats)
            } else {
                print!("{}", format::stats_summary(&stats));
                Ok(())
            }
        }
        Command::Export { id, output } => {
            let bytes = client.export(id).await?;
            tokio::fs::write(&output, &bytes).await.map_err(|e| {
                CliError::Failure(anyhow::anyhow!("failed to write {:?}: {}", output, e))
            })?;
            println!("Exported torrent {} to {}", id, output.display());
            Ok(())
        }
        Command::Monitor {
            interval,
            pieces,
            peers,
        } => {
            let panels = MonitorPanels { pieces, peers };
            monitor(client, Duration::from_secs(interval.max(1)), panels).await
        }
    }
}

/// Redraw live fleet status and session totals every `interval` until
/// Ctrl+C.
async fn monitor(
    client: &ApiClient,
    interval: Duration,
    panels: MonitorPanels,
) -> CliResult<()> {
    loop {
        match client.list_live(None).await {
            Ok(entries) => {
                let stats = match client.stats().await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        tracing::debug!(error = %e, "Session totals unavailable");
                        None
                    }
                };
                // Clear screen and home the cursor.
                print!("\x1b[2J\x1b[H");
                print!("{}", format::monitor_screen(&entries, stats.as_ref(), panels));
                println!("\nRefreshing every {}s, Ctrl+C to exit", interval.as_secs());
            }
            Err(e) => eprintln!("error: {}", e),
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = sleep(interval) => {}
        }
    }
}

fn limit_message(id: u64, direction: &str, kbps: u64) -> String {
    if kbps == 0 {
        format!("{} limit lifted for torrent {}", direction, id)
    } else {
        format!("{} limit for torrent {} set to {} KB/s", direction, id, kbps)
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "enabled"
    } else {
        "disabled"
    }
}
