//! Protocol constants and scheduler tuning parameters.
//!
//! Wire-level values come from BEP-3. Scheduler defaults are sized so that a
//! single op moves roughly one piece block plus its frame header.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8; 8] = b"-PW0001-";

// ============================================================================
// Wire protocol
// ============================================================================

/// Protocol string sent in the handshake
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// Length of the protocol string, the first byte of every handshake
pub const PROTOCOL_LEN: u8 = 19;

/// Total handshake size: pstrlen + pstr + reserved + info hash + peer id
pub const HANDSHAKE_LEN: usize = 1 + PROTOCOL_LEN as usize + 8 + 20 + 20;

/// Version tag carried by every message of the base protocol
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Standard block size requested from peers
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Largest frame body accepted from a peer (a 16 MiB block plus piece header)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024 + 9;

// ============================================================================
// Connection buffers
// ============================================================================

/// Initial capacity of a connection's read buffer
pub const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound for a single transport read
pub const MAX_READ_CHUNK: usize = 64 * 1024;

/// Timeout for establishing an outgoing TCP connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Scheduler
// ============================================================================

/// Length of one scheduling interval
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// How long an idle scheduler sleeps before re-polling entities
pub const DEFAULT_IDLE_WAIT_MS: u64 = 100;

/// Upper bound for any configured tick or idle interval (one hour)
pub const MAX_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Bytes a single processing op may move: one block plus a piece header
pub const DEFAULT_OP_SIZE: usize = BLOCK_SIZE + 13;

/// Cap on back-to-back ops for one high priority entity within a round
pub const DEFAULT_MAX_HIGH_OPS: usize = 64;

/// Sentinel allowance used when no rate limit is configured
pub const UNLIMITED_BUDGET: u64 = u64::MAX;

/// Smoothing factor for the scheduler's moving average rate
pub const RATE_SMOOTHING: f64 = 0.2;
