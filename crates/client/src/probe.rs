// crates/client/src/probe.rs
//! HTTP reachability probe
//!
//! Stand-in for an OS-level network notifier: polls a set of well-known
//! URLs and reports the result into a reachability handle. The monitor's
//! publish point drops redundant reports, so polling on an interval still
//! produces clean transitions.

use std::time::Duration;
use tether_reachability::{ConnectivityState, ReachabilityHandle};
use tokio::task::JoinHandle;

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URLs tried in order; one reachable URL means the network is up
    pub urls: Vec<String>,
    /// Time between polls
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            urls: vec![
                "https://www.google.com".to_string(),
                "https://www.cloudflare.com".to_string(),
                "https://www.rust-lang.org".to_string(),
            ],
            interval: Duration::from_secs(10),
        }
    }
}

/// Background reachability probe, aborted on drop
pub struct HttpProbe {
    task: JoinHandle<()>,
}

impl HttpProbe {
    /// Spawns the polling task
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(http: reqwest::Client, config: ProbeConfig, handle: ReachabilityHandle) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let mut online = false;
                for url in &config.urls {
                    if http.head(url).send().await.is_ok() {
                        online = true;
                        break;
                    }
                }

                let state = if online {
                    ConnectivityState::Reachable
                } else {
                    ConnectivityState::Unreachable
                };
                handle.report(state);

                tokio::time::sleep(config.interval).await;
            }
        });

        Self { task }
    }

    /// Stops the probe
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for HttpProbe {
    fn drop(&mut self) {
        self.task.abort();
    }
}
