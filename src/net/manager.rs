use super::group::{ConnectionGroup, Direction, FailedConnection, SharedConnection};
use crate::config::NetworkConfig;
use crate::peer::{PeerConnection, Transport};
use crate::scheduler::{
    EntityEvent, EntityId, EventWaiter, Priority, RateControlScheduler, SchedulerStats,
    SchedulerThread,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The scheduled entities created for one peer.
#[derive(Clone)]
pub struct PeerHandle {
    pub upload_id: EntityId,
    pub download_id: EntityId,
    pub upload: Arc<ConnectionGroup>,
    pub download: Arc<ConnectionGroup>,
}

impl PeerHandle {
    pub fn set_priority(&self, priority: Priority) {
        self.upload.set_priority(priority);
        self.download.set_priority(priority);
    }
}

/// Owns the upload and download schedulers of a client.
///
/// Both run on their own threads from [`start`](Self::start) until
/// [`shutdown`](Self::shutdown). Connections created here signal the upload
/// scheduler whenever a message is queued.
pub struct NetworkManager {
    config: NetworkConfig,
    upload: SchedulerThread,
    download: SchedulerThread,
    upload_stats: Arc<SchedulerStats>,
    download_stats: Arc<SchedulerStats>,
    upload_events: Option<mpsc::UnboundedReceiver<EntityEvent>>,
    download_events: Option<mpsc::UnboundedReceiver<EntityEvent>>,
}

impl NetworkManager {
    pub fn start(config: NetworkConfig) -> io::Result<Self> {
        let (upload, upload_events) = RateControlScheduler::new(config.upload.clone());
        let (download, download_events) = RateControlScheduler::new(config.download.clone());
        let upload_stats = upload.stats();
        let download_stats = download.stats();

        let upload = upload.spawn("peerwire-upload")?;
        let download = download.spawn("peerwire-download")?;

        info!(
            upload_limit = config.upload.rate_limit,
            download_limit = config.download.rate_limit,
            "network manager started"
        );

        Ok(Self {
            config,
            upload,
            download,
            upload_stats,
            download_stats,
            upload_events: Some(upload_events),
            download_events: Some(download_events),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Wraps a transport in a connection wired to the upload scheduler.
    pub fn connection(&self, transport: Box<dyn Transport>) -> SharedConnection {
        Arc::new(Mutex::new(PeerConnection::new(
            transport,
            self.upload.handle().waiter(),
        )))
    }

    /// Schedules a peer's connections in both directions.
    pub fn add_peer(&self, connections: Vec<SharedConnection>, priority: Priority) -> PeerHandle {
        let upload = Arc::new(ConnectionGroup::with_connections(
            Direction::Upload,
            priority,
            self.config.upload.boost_handshakes,
            connections.clone(),
        ));
        let download = Arc::new(ConnectionGroup::with_connections(
            Direction::Download,
            priority,
            self.config.download.boost_handshakes,
            connections,
        ));

        let upload_id = self.upload.handle().register(upload.clone());
        let download_id = self.download.handle().register(download.clone());
        debug!(%upload_id, %download_id, ?priority, "peer added");

        PeerHandle {
            upload_id,
            download_id,
            upload,
            download,
        }
    }

    /// Unschedules a peer and returns the connections its groups dropped
    /// since they were last drained.
    pub fn remove_peer(&self, peer: &PeerHandle) -> Vec<FailedConnection> {
        self.upload.handle().unregister(peer.upload_id);
        self.download.handle().unregister(peer.download_id);

        let mut failed = peer.upload.take_failed();
        failed.extend(peer.download.take_failed());
        debug!(
            upload_id = %peer.upload_id,
            download_id = %peer.download_id,
            failed = failed.len(),
            "peer removed"
        );
        failed
    }

    /// Bytes per second, 0 = unlimited.
    pub fn set_upload_limit(&mut self, bytes_per_sec: u64) {
        self.config.upload.rate_limit = bytes_per_sec;
        self.upload.handle().set_rate_limit(bytes_per_sec);
    }

    /// Bytes per second, 0 = unlimited.
    pub fn set_download_limit(&mut self, bytes_per_sec: u64) {
        self.config.download.rate_limit = bytes_per_sec;
        self.download.handle().set_rate_limit(bytes_per_sec);
    }

    /// Wakes the download scheduler, e.g. when a socket became readable.
    pub fn notify_readable(&self) {
        self.download.handle().waiter().signal();
    }

    pub fn waiter(&self, direction: Direction) -> Arc<EventWaiter> {
        match direction {
            Direction::Upload => self.upload.handle().waiter(),
            Direction::Download => self.download.handle().waiter(),
        }
    }

    pub fn stats(&self, direction: Direction) -> Arc<SchedulerStats> {
        match direction {
            Direction::Upload => Arc::clone(&self.upload_stats),
            Direction::Download => Arc::clone(&self.download_stats),
        }
    }

    /// Takes the failure event stream for one direction. Returns `None` once taken.
    pub fn take_events(
        &mut self,
        direction: Direction,
    ) -> Option<mpsc::UnboundedReceiver<EntityEvent>> {
        match direction {
            Direction::Upload => self.upload_events.take(),
            Direction::Download => self.download_events.take(),
        }
    }

    pub fn shutdown(self) {
        let NetworkManager {
            upload, download, ..
        } = self;
        upload.shutdown();
        download.shutdown();
        info!("network manager stopped");
    }
}
