//! Read-only TFTP server (RFC 1350, octet mode).

mod engine;
mod packet;
mod server;
mod session;

pub use engine::TransferEngine;
pub use packet::{ErrorCode, Packet, PacketError};
pub use server::TftpServer;
pub use session::SendContext;
