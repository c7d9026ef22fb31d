//! Timeout watchdog
//!
//! Sweeps pending attempts on a fixed interval and expires the overdue ones,
//! independent of whoever triggered the transfer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;

/// Configuration for the watchdog
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Interval between sweeps (default: 250ms)
    pub sweep_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(250),
        }
    }
}

pub struct TimeoutWatchdog {
    config: WatchdogConfig,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    expired_total: Arc<AtomicU64>,
}

impl TimeoutWatchdog {
    pub fn new(config: WatchdogConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            expired_total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the sweep loop; a second call while running is a no-op
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "Timeout watchdog started (sweep every {}ms)",
            self.config.sweep_interval.as_millis()
        );

        let sweep_interval = self.config.sweep_interval;
        let dispatcher = self.dispatcher.clone();
        let running = self.running.clone();
        let expired_total = self.expired_total.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let expired = dispatcher.expire_overdue().await;
                if expired > 0 {
                    expired_total.fetch_add(expired as u64, Ordering::Relaxed);
                    debug!("Watchdog expired {} overdue attempt(s)", expired);
                }
            }

            info!("Timeout watchdog stopped");
        });
    }

    /// Stop the sweep loop after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a single sweep now
    pub async fn sweep_once(&self) -> usize {
        let expired = self.dispatcher.expire_overdue().await;
        self.expired_total
            .fetch_add(expired as u64, Ordering::Relaxed);
        expired
    }

    /// Attempts expired since start
    pub fn expired_total(&self) -> u64 {
        self.expired_total.load(Ordering::Relaxed)
    }
}

impl Drop for TimeoutWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
