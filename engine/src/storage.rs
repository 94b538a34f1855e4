// --- Storage usage line --------------------------------------------------
//
// Polled on its own timer and completely independent of everything else: a
// failed poll is logged and shown as an error line, nothing more.

use std::time::Duration;

use tracing::warn;

use crate::device::{DeviceApi, StorageStatus};
use crate::panel::Panel;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const STORAGE_ERROR_TEXT: &str = "Storage: error";

pub fn format_storage(s: &StorageStatus) -> String {
    let used_kb = s.used as f64 / 1024.0;
    let total_kb = s.total as f64 / 1024.0;
    let percent = if s.total == 0 {
        0.0
    } else {
        s.used as f64 / s.total as f64 * 100.0
    };
    format!("Storage: {used_kb:.2} KB / {total_kb:.2} KB ({percent:.1}%)")
}

/// Refresh the storage line once.
pub async fn refresh_storage<D: DeviceApi>(panel: &Panel<D>) {
    let line = match panel.device().storage().await {
        Ok(status) => format_storage(&status),
        Err(e) => {
            warn!("storage poll failed: {e}");
            STORAGE_ERROR_TEXT.to_string()
        }
    };
    panel.state().write().await.storage_line = line;
}

/// Refresh immediately, then every `POLL_INTERVAL`, forever.
pub async fn storage_tick<D: DeviceApi>(panel: Panel<D>) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        refresh_storage(&panel).await;
    }
}
