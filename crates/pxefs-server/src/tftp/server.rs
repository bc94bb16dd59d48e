//! UDP loop around the transfer engine.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use pxefs_kernel::Namespace;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::TransferEngine;
use crate::constants::MAX_DATAGRAM;

/// A bound TFTP server.
///
/// One task owns the socket and handles datagrams one at a time; replies
/// go out from the same socket.
pub struct TftpServer {
    socket: UdpSocket,
    engine: TransferEngine,
    poll_interval: Duration,
}

impl TftpServer {
    pub async fn bind(
        addr: SocketAddr,
        namespace: Namespace,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            engine: TransferEngine::new(namespace),
            poll_interval,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "tftp server listening");
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(self.poll_interval, self.socket.recv_from(&mut buf)) => r,
            };

            let (len, peer) = match received {
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "tftp receive failed");
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            let Some(reply) = self.engine.handle(peer, &buf[..len]).await else {
                continue;
            };
            if let Err(e) = self.socket.send_to(&reply.encode(), peer).await {
                warn!(peer = %peer, error = %e, "tftp send failed");
            }
        }

        debug!(sessions = self.engine.session_count(), "dropping open sessions");
        info!("tftp server stopped");
        Ok(())
    }
}
