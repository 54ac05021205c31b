use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{ReapReport, UploadOrchestrator};

/// Periodically reclaims storage held by expired sessions
pub struct SessionReaper {
    orchestrator: Arc<UploadOrchestrator>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(orchestrator: Arc<UploadOrchestrator>) -> Self {
        Self {
            orchestrator,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(orchestrator: Arc<UploadOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run forever; spawn this on the runtime.
    pub async fn start(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "starting upload session reaper");

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One reaper cycle
    pub async fn run_once(&self) -> ReapReport {
        match self.orchestrator.reap_expired().await {
            Ok(report) => {
                if report == ReapReport::default() {
                    debug!("no expired upload sessions");
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "upload session reaping failed");
                ReapReport::default()
            }
        }
    }

    /// Spawn [`start`](Self::start) on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.start())
    }
}
