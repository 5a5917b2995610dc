//! Connection groups and the network manager.
//!
//! This is where peer connections meet the schedulers:
//!
//! - [`ConnectionGroup`] - a [`RateControlledEntity`](crate::scheduler::RateControlledEntity)
//!   owning one or more connections for one direction
//! - [`NetworkManager`] - runs an upload and a download scheduler and
//!   registers each peer's groups with them
//!
//! # Examples
//!
//! ```no_run
//! use peerwire::config::NetworkConfig;
//! use peerwire::net::NetworkManager;
//! use peerwire::peer::{Handshake, Message, PeerId, TcpTransport};
//! use peerwire::scheduler::Priority;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // 500KB/s upload, unlimited download
//! let manager = NetworkManager::start(NetworkConfig::with_limits(500_000, 0))?;
//!
//! let transport = TcpTransport::connect("192.168.1.100:6881".parse()?).await?;
//! let connection = manager.connection(Box::new(transport));
//! connection
//!     .lock()
//!     .send(Message::Handshake(Handshake::new([0u8; 20], *PeerId::generate().as_bytes())))?;
//!
//! let peer = manager.add_peer(vec![connection], Priority::Normal);
//! // ...
//! manager.remove_peer(&peer);
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

mod group;
mod manager;

pub use group::{ConnectionGroup, Direction, FailedConnection, SharedConnection};
pub use manager::{NetworkManager, PeerHandle};
