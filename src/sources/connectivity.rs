use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::sources::traits::Connectivity;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Online flag plus a recovery event fired on every offline -> online edge.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    recovered: broadcast::Sender<()>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (recovered, _) = broadcast::channel(8);
        Self {
            online: AtomicBool::new(online),
            recovered,
        }
    }

    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::info!("connectivity restored");
            // No subscribers is fine
            let _ = self.recovered.send(());
        } else if !online && was_online {
            tracing::warn!("connectivity lost");
        }
    }

    /// One TCP connect to `host:port`; the outcome becomes the online flag.
    pub async fn check(&self, host: &str, port: u16) -> bool {
        let reachable = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        );
        tracing::trace!(host, port, reachable, "connectivity check");
        self.set_online(reachable);
        reachable
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.recovered.subscribe()
    }
}

/// Run [`ConnectivityMonitor::check`] against `host:port` every `interval`.
/// Runs until the handle is aborted.
pub fn spawn_probe(
    monitor: Arc<ConnectivityMonitor>,
    host: String,
    port: u16,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            monitor.check(&host, port).await;
            tokio::time::sleep(interval).await;
        }
    })
}
