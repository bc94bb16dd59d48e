//! Server configuration constants.
//!
//! Centralizes protocol values and defaults for easier configuration and documentation.

use std::time::Duration;

/// Default TFTP bind address (the well-known TFTP port on all interfaces).
pub const DEFAULT_TFTP_BIND: &str = "0.0.0.0:69";

/// Default NFS bind address.
pub const DEFAULT_NFS_BIND: &str = "0.0.0.0:2049";

/// TFTP data segment size (RFC 1350). Block size options are not negotiated.
pub const SEGMENT_SIZE: usize = 512;

/// Largest datagram accepted. Read requests with options can exceed one segment.
pub const MAX_DATAGRAM: usize = 1500;

/// How often the TFTP loop wakes up without traffic.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Filesystem id reported in NFS attributes.
pub const NFS_FSID: u64 = 0x7078_6566;
