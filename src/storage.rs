use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::frame::RawFrame;

/// JPEG quality used for pictures grabbed from the video feed.
pub const SNAPSHOT_QUALITY: u8 = 90;

/// Timestamp layout shared by recordings and pictures.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// `<device>-<YYYY-MM-DD_HHMMSS>.<ext>`
pub fn timestamped_name(device: &str, at: &DateTime<Local>, ext: &str) -> String {
    format!("{}-{}.{}", device, at.format(TIMESTAMP_FORMAT), ext)
}

/// Reserve a fresh output path in `dir`, creating the directory when missing.
///
/// Two captures started within the same second get a numeric suffix instead of
/// overwriting each other.
pub fn reserve_path(dir: &Path, device: &str, at: &DateTime<Local>, ext: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create media directory {}", dir.display()))?;
    let base = dir.join(timestamped_name(device, at, ext));
    if !base.exists() {
        return Ok(base);
    }
    let stem = format!("{}-{}", device, at.format(TIMESTAMP_FORMAT));
    for n in 1..1000 {
        let candidate = dir.join(format!("{}-{}.{}", stem, n, ext));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow!(
        "no free file name for {} in {}",
        stem,
        dir.display()
    ))
}

/// Write photo data delivered by the vehicle to `<dir>/<device>-<ts>.jpeg`.
pub fn save_picture(dir: &Path, device: &str, bytes: &[u8]) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(anyhow!("picture data is empty"));
    }
    let path = reserve_path(dir, device, &Local::now(), "jpeg")?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("create picture {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write picture {}", path.display()))?;
    file.sync_all()?;
    log::info!("Saved picture {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// Save a still of a decoded video frame, for vehicles that cannot deliver
/// camera photos themselves.
pub fn save_snapshot(dir: &Path, device: &str, frame: &RawFrame) -> Result<PathBuf> {
    let bytes = frame
        .to_jpeg(SNAPSHOT_QUALITY)
        .with_context(|| format!("snapshot of frame {}", frame.index()))?;
    save_picture(dir, device, &bytes)
}
