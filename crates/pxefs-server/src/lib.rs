//! pxefs network servers.
//!
//! Boot clients fetch loaders and kernels over TFTP, then mount the same
//! namespace over NFS as their root filesystem.
//!
//! - [`tftp`] - packet codec, transfer engine and UDP server loop
//! - `nfs` - NFSv3 binding of the namespace (feature `nfs`)
//! - [`config`] - configuration file loading
//! - [`supervisor`] - index images, run the servers, tear down

pub mod config;
pub mod constants;
#[cfg(feature = "nfs")]
pub mod nfs;
pub mod supervisor;
pub mod tftp;

pub use config::{Config, ConfigError, NfsConfig, TftpConfig};
pub use supervisor::{Supervisor, build_namespace};
pub use tftp::{TftpServer, TransferEngine};
