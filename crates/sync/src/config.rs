use std::time::Duration;

/// Batches at or above this size go to the trash in one call.  
/// 刪除項目達到此數量時改用單次批次丟入垃圾桶。
pub const DELETE_BATCH_THRESHOLD: usize = 8;
pub const PENDING_SAVE_ATTEMPTS: u32 = 10;
pub const PENDING_SAVE_INTERVAL: Duration = Duration::from_millis(50);
pub const WATCH_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const WATCH_GRACE_WINDOW: Duration = Duration::from_millis(1500);

/// Tunables for the action pipeline.  
/// 檔案操作流程的可調參數。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub delete_batch_threshold: usize,
    pub pending_save_attempts: u32,
    pub pending_save_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delete_batch_threshold: DELETE_BATCH_THRESHOLD,
            pending_save_attempts: PENDING_SAVE_ATTEMPTS,
            pending_save_interval: PENDING_SAVE_INTERVAL,
        }
    }
}

/// Timing of the external change watcher.  
/// 外部變更監看器的時間設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Quiet period that ends a burst of notifications.
    pub settle_delay: Duration,
    /// Events arriving this soon after an engine mutation are treated as echoes.
    pub grace_window: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_delay: WATCH_SETTLE_DELAY,
            grace_window: WATCH_GRACE_WINDOW,
        }
    }
}
