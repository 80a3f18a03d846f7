use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

const KEEP_SESSIONS: usize = 10;

/// Append-only journal of one `watch` run, written to `<dir>/latest.log`.
///
/// `log()` only pushes into a channel; a background task owns the file, so
/// the render loop never waits on disk.
pub struct SessionLogger {
    tx: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
    path: PathBuf,
}

impl SessionLogger {
    /// Opens a fresh journal in `dir`, rotating the previous `latest.log` to
    /// `session-<unix millis>.log` and pruning all but the newest rotations.
    pub async fn new(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let latest = dir.join("latest.log");
        if tokio::fs::try_exists(&latest).await.unwrap_or(false) {
            let rotated = dir.join(format!("session-{}.log", unix_millis()));
            tokio::fs::rename(&latest, &rotated).await?;
        }
        prune_sessions(dir, KEEP_SESSIONS).await;

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&latest)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(writer_task(file, rx));
        let _ = tx.send(format!(
            "=== scene-sync session {} ===\n",
            format_timestamp(unix_secs())
        ));

        Ok(Self {
            tx,
            writer,
            path: latest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, prefix: &str, line: &str) {
        send_log(&self.tx, prefix, line);
    }

    /// For tasks that log without holding the logger. The journal stays open
    /// until every clone is dropped.
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }

    /// Writes the footer and waits until everything queued is on disk.
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(e) = self.writer.await {
            log::warn!("Journal writer ended abnormally: {e}");
        }
    }
}

pub fn send_log(tx: &mpsc::UnboundedSender<String>, prefix: &str, line: &str) {
    let _ = tx.send(format_line(unix_secs(), prefix, line));
}

fn format_line(secs: u64, prefix: &str, line: &str) -> String {
    format!("[{}] [{prefix}] {line}\n", format_timestamp(secs))
}

async fn writer_task(file: tokio::fs::File, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut writer = tokio::io::BufWriter::new(file);

    while let Some(line) = rx.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            log::warn!("Journal write failed: {e}");
            continue;
        }
        // Keep the file tail-able while the session runs.
        let _ = writer.flush().await;
    }

    let footer = format!("=== ended {} ===\n", format_timestamp(unix_secs()));
    let _ = writer.write_all(footer.as_bytes()).await;
    let _ = writer.flush().await;
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// ISO 8601 UTC, e.g. `2024-06-15T10:30:00Z`.
pub fn format_timestamp(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem / 60) % 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

async fn prune_sessions(dir: &Path, keep: usize) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };

    let mut sessions: Vec<(u128, PathBuf)> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let stamp = name
            .to_str()
            .and_then(|n| n.strip_prefix("session-"))
            .and_then(|n| n.strip_suffix(".log"))
            .and_then(|n| n.parse::<u128>().ok());
        if let Some(stamp) = stamp {
            sessions.push((stamp, entry.path()));
        }
    }

    // Numeric order; names alone would sort "9" after "10".
    sessions.sort();
    let excess = sessions.len().saturating_sub(keep);
    for (_, path) in sessions.into_iter().take(excess) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::debug!("Could not prune {}: {e}", path.display());
        }
    }
}
