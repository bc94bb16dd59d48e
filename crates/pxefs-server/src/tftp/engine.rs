//! TFTP transfer engine.
//!
//! Socket-free: [`TransferEngine::handle`] takes one datagram and returns
//! the reply, if any. The UDP loop in [`super::server`] owns the socket.
//!
//! ```text
//! no session --RRQ (resolved)--> transferring --short block sent--> no session
//!     ^                              |
//!     +------ client ERROR / failure +
//! ```

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use pxefs_kernel::{ContentError, ContentResult, Namespace};
use pxefs_types::Image;
use tracing::{debug, info, warn};

use super::packet::{ErrorCode, Packet};
use super::session::SendContext;
use crate::constants::SEGMENT_SIZE;

/// Message of the generic error reply.
const GENERIC_ERROR: &str = "ERROR";

/// Serves read transfers out of a [`Namespace`].
pub struct TransferEngine {
    namespace: Namespace,
    sessions: HashMap<SocketAddr, SendContext>,
}

impl TransferEngine {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            sessions: HashMap::with_capacity(8),
        }
    }

    /// Number of transfers in progress.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, peer: &SocketAddr) -> bool {
        self.sessions.contains_key(peer)
    }

    /// Map a requested file name to an image and a path inside it.
    ///
    /// Tried in order:
    /// 1. split at the first `/` into image name and path; an empty image
    ///    name means the root image
    /// 2. drop the first segment and split the rest at its first `/`
    /// 3. the whole name inside the root image
    pub fn resolve(&self, filename: &str) -> Option<(Image, String)> {
        let mut name = filename.to_string();
        while name.contains("//") {
            name = name.replace("//", "/");
        }

        if let Some(first) = name.find('/') {
            if let Some(found) = self.lookup(&name[..first], &name[first + 1..]) {
                return Some(found);
            }
            let rest = &name[first + 1..];
            if let Some(next) = rest.find('/') {
                if let Some(found) = self.lookup(&rest[..next], &rest[next + 1..]) {
                    return Some(found);
                }
            }
        }

        let image = self.namespace.registry().root()?;
        let path = name.trim_start_matches('/');
        self.found(image, path)
    }

    fn lookup(&self, candidate: &str, path: &str) -> Option<(Image, String)> {
        let candidate = candidate.trim_start_matches('/');
        let registry = self.namespace.registry();
        let image = if candidate.is_empty() {
            registry.root()?
        } else {
            registry.by_name(candidate)?
        };
        self.found(image, path)
    }

    fn found(&self, image: &Image, path: &str) -> Option<(Image, String)> {
        if path.is_empty() || !self.namespace.content().exists(image, path) {
            return None;
        }
        Some((image.clone(), path.to_string()))
    }

    /// Process one datagram from `peer` and produce the reply.
    ///
    /// Never fails: undecodable datagrams get no reply, and request
    /// failures turn into a generic ERROR packet.
    pub async fn handle(&mut self, peer: SocketAddr, datagram: &[u8]) -> Option<Packet> {
        let packet = match Packet::parse(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(peer = %peer, error = %e, "ignoring malformed datagram");
                return None;
            }
        };

        let result = match packet {
            Packet::ReadRequest { filename, mode, .. } => {
                info!(peer = %peer, file = %filename, mode = %mode, "read request");
                self.on_read_request(peer, &filename).await
            }
            Packet::Ack { block } => self.on_ack(peer, block).await,
            Packet::WriteRequest { filename, .. } => {
                warn!(peer = %peer, file = %filename, "rejecting write request");
                return Some(Packet::error(
                    ErrorCode::NotDefined,
                    "write requests are not supported",
                ));
            }
            Packet::Error { code, message } => {
                debug!(peer = %peer, code = code.code(), message = %message, "client aborted transfer");
                self.sessions.remove(&peer);
                return None;
            }
            Packet::Data { .. } => return None,
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(peer = %peer, error = %e, "tftp request failed");
                self.sessions.remove(&peer);
                Some(Packet::error(ErrorCode::NotDefined, GENERIC_ERROR))
            }
        }
    }

    async fn on_read_request(
        &mut self,
        peer: SocketAddr,
        filename: &str,
    ) -> ContentResult<Option<Packet>> {
        if self.sessions.remove(&peer).is_some() {
            debug!(peer = %peer, "replacing stale session");
        }

        let Some((image, path)) = self.resolve(filename) else {
            info!(peer = %peer, file = %filename, "file not found");
            return Ok(Some(Packet::error(
                ErrorCode::FileNotFound,
                format!("Failed to locate file {filename}"),
            )));
        };
        debug!(peer = %peer, image = %image.name, path = %path, "resolved");

        let mut context = SendContext::new(image, path);
        let packet = self.send_next(&mut context).await?;
        self.keep_or_finish(peer, context);
        Ok(Some(packet))
    }

    async fn on_ack(&mut self, peer: SocketAddr, block: u16) -> ContentResult<Option<Packet>> {
        let Some(mut context) = self.sessions.remove(&peer) else {
            debug!(peer = %peer, block, "ack for unknown session");
            return Ok(None);
        };

        if block == context.block {
            let size = self
                .namespace
                .content()
                .get_size(&context.image, &context.path)?;
            if !context.has_more(size) {
                return Ok(None);
            }
            let packet = self.send_next(&mut context).await?;
            self.keep_or_finish(peer, context);
            return Ok(Some(packet));
        }

        let reply = if block == context.block.wrapping_sub(1) {
            debug!(peer = %peer, block = context.block, "retransmitting");
            Some(Packet::Data {
                block: context.block,
                payload: context.last.clone().unwrap_or_default(),
            })
        } else {
            None
        };
        self.sessions.insert(peer, context);
        Ok(reply)
    }

    /// Read and frame the next block of `context`.
    async fn send_next(&self, context: &mut SendContext) -> ContentResult<Packet> {
        let content = self.namespace.content();
        let size = content.get_size(&context.image, &context.path)?;
        let len = size.saturating_sub(context.sent).min(SEGMENT_SIZE as u64) as usize;

        let payload = if len == 0 {
            Vec::new()
        } else {
            content
                .read_range(&context.image, &context.path, context.sent, len)
                .await?
        };
        if payload.is_empty() && len > 0 {
            return Err(ContentError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ended before its indexed size", context.path),
            )));
        }

        let block = context.advance(payload.clone());
        Ok(Packet::Data { block, payload })
    }

    fn keep_or_finish(&mut self, peer: SocketAddr, context: SendContext) {
        if context.finished() {
            info!(
                peer = %peer,
                image = %context.image.name,
                path = %context.path,
                bytes = context.sent,
                "transfer complete"
            );
        } else {
            self.sessions.insert(peer, context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxefs_kernel::{ContentDirectory, ImageRegistry};
    use pxefs_types::{ImageFormat, ImageId};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DEBIAN: u64 = 0x0100_0000;
    const TOOLS: u64 = 0x0200_0000;

    struct Fixture {
        engine: TransferEngine,
        dirs: Vec<TempDir>,
    }

    fn write(root: &Path, path: &str, data: &[u8]) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, data).unwrap();
    }

    fn fixture() -> Fixture {
        let debian = TempDir::new().unwrap();
        write(debian.path(), "pxelinux.0", &[3u8; 1200]);
        write(debian.path(), "boot/vmlinuz", b"kernel");

        let tools = TempDir::new().unwrap();
        write(tools.path(), "path/to/file", &[9u8; 1200]);
        write(tools.path(), "exact.bin", &[1u8; SEGMENT_SIZE]);
        write(tools.path(), "empty", b"");

        let images = vec![
            Image::new(
                ImageId::new(DEBIAN).unwrap(),
                "debian",
                ImageFormat::Directory,
                debian.path(),
            )
            .as_root(),
            Image::new(
                ImageId::new(TOOLS).unwrap(),
                "tools",
                ImageFormat::Directory,
                tools.path(),
            ),
        ];
        let registry = ImageRegistry::new(images).unwrap();
        let content = ContentDirectory::init_all(registry.images()).unwrap();
        Fixture {
            engine: TransferEngine::new(Namespace::new(Arc::new(registry), Arc::new(content))),
            dirs: vec![debian, tools],
        }
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:2001".parse().unwrap()
    }

    fn rrq(name: &str) -> Vec<u8> {
        Packet::ReadRequest {
            filename: name.into(),
            mode: "octet".into(),
            options: vec![],
        }
        .encode()
    }

    fn ack(block: u16) -> Vec<u8> {
        Packet::Ack { block }.encode()
    }

    fn data(packet: Option<Packet>) -> (u16, Vec<u8>) {
        match packet {
            Some(Packet::Data { block, payload }) => (block, payload),
            other => panic!("expected DATA, got {other:?}"),
        }
    }

    fn resolved(engine: &TransferEngine, name: &str) -> Option<(String, String)> {
        engine
            .resolve(name)
            .map(|(image, path)| (image.name, path))
    }

    #[test]
    fn test_resolve_order() {
        let f = fixture();
        let e = &f.engine;
        let expect = |image: &str, path: &str| Some((image.to_string(), path.to_string()));

        assert_eq!(resolved(e, "tools/path/to/file"), expect("tools", "path/to/file"));
        assert_eq!(resolved(e, "tools//path//to/file"), expect("tools", "path/to/file"));
        // Leading separator: empty image name means the root image.
        assert_eq!(resolved(e, "/boot/vmlinuz"), expect("debian", "boot/vmlinuz"));
        // Root image miss, then one more split.
        assert_eq!(resolved(e, "/tools/empty"), expect("tools", "empty"));
        // A leading junk segment is skipped once.
        assert_eq!(resolved(e, "junk/tools/empty"), expect("tools", "empty"));
        assert_eq!(resolved(e, "junk/tools/path/to/file"), expect("tools", "path/to/file"));
        assert_eq!(resolved(e, "junk/more/tools/empty"), None);
        assert_eq!(resolved(e, "//tools/path/to/file"), expect("tools", "path/to/file"));
        // Bare names fall back to the root image.
        assert_eq!(resolved(e, "pxelinux.0"), expect("debian", "pxelinux.0"));
        assert_eq!(resolved(e, "boot/vmlinuz"), expect("debian", "boot/vmlinuz"));

        assert_eq!(resolved(e, "tools/missing"), None);
        assert_eq!(resolved(e, "nothing"), None);
        assert_eq!(resolved(e, "tools"), None);
        assert_eq!(resolved(e, ""), None);
    }

    #[tokio::test]
    async fn test_three_block_transfer() {
        let mut f = fixture();
        let p = peer();

        let (block, payload) = data(f.engine.handle(p, &rrq("tools/path/to/file")).await);
        assert_eq!((block, payload.len()), (1, 512));
        assert!(f.engine.has_session(&p));

        let (block, payload) = data(f.engine.handle(p, &ack(1)).await);
        assert_eq!((block, payload.len()), (2, 512));

        let (block, payload) = data(f.engine.handle(p, &ack(2)).await);
        assert_eq!((block, payload.len()), (3, 176));
        assert!(payload.iter().all(|&b| b == 9));
        assert!(!f.engine.has_session(&p));

        assert_eq!(f.engine.handle(p, &ack(3)).await, None);
        assert_eq!(f.engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let mut f = fixture();
        let reply = f.engine.handle(peer(), &rrq("tools/nope")).await;
        assert_eq!(
            reply,
            Some(Packet::error(
                ErrorCode::FileNotFound,
                "Failed to locate file tools/nope"
            ))
        );
        assert_eq!(f.engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_empty_block() {
        let mut f = fixture();
        let p = peer();
        let (_, payload) = data(f.engine.handle(p, &rrq("tools/exact.bin")).await);
        assert_eq!(payload.len(), SEGMENT_SIZE);
        assert!(f.engine.has_session(&p));

        let (block, payload) = data(f.engine.handle(p, &ack(1)).await);
        assert_eq!(block, 2);
        assert!(payload.is_empty());
        assert!(!f.engine.has_session(&p));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let mut f = fixture();
        let (block, payload) = data(f.engine.handle(peer(), &rrq("tools/empty")).await);
        assert_eq!(block, 1);
        assert!(payload.is_empty());
        assert_eq!(f.engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ack_retransmits() {
        let mut f = fixture();
        let p = peer();
        let (_, first) = data(f.engine.handle(p, &rrq("pxelinux.0")).await);

        // The client re-acks the request (block 0): resend block 1.
        let (block, again) = data(f.engine.handle(p, &ack(0)).await);
        assert_eq!(block, 1);
        assert_eq!(again, first);

        // Acks far off are ignored.
        assert_eq!(f.engine.handle(p, &ack(40)).await, None);
        assert!(f.engine.has_session(&p));

        let (block, _) = data(f.engine.handle(p, &ack(1)).await);
        assert_eq!(block, 2);
    }

    #[tokio::test]
    async fn test_sessions_are_per_peer() {
        let mut f = fixture();
        let a = peer();
        let b: SocketAddr = "10.0.0.8:2001".parse().unwrap();
        data(f.engine.handle(a, &rrq("tools/path/to/file")).await);
        data(f.engine.handle(b, &rrq("pxelinux.0")).await);
        assert_eq!(f.engine.session_count(), 2);

        let (block, payload) = data(f.engine.handle(b, &ack(1)).await);
        assert_eq!((block, payload[0]), (2, 3));
        let (block, payload) = data(f.engine.handle(a, &ack(1)).await);
        assert_eq!((block, payload[0]), (2, 9));
    }

    #[tokio::test]
    async fn test_new_request_replaces_session() {
        let mut f = fixture();
        let p = peer();
        data(f.engine.handle(p, &rrq("tools/path/to/file")).await);
        data(f.engine.handle(p, &ack(1)).await);

        let (block, payload) = data(f.engine.handle(p, &rrq("pxelinux.0")).await);
        assert_eq!((block, payload[0]), (1, 3));
        assert_eq!(f.engine.session_count(), 1);
    }

    #[tokio::test]
    async fn test_client_error_ends_session() {
        let mut f = fixture();
        let p = peer();
        data(f.engine.handle(p, &rrq("pxelinux.0")).await);
        let abort = Packet::error(ErrorCode::NotDefined, "cancelled").encode();
        assert_eq!(f.engine.handle(p, &abort).await, None);
        assert!(!f.engine.has_session(&p));
    }

    #[tokio::test]
    async fn test_write_request_is_rejected() {
        let mut f = fixture();
        let wrq = Packet::WriteRequest {
            filename: "tools/new".into(),
            mode: "octet".into(),
        }
        .encode();
        let reply = f.engine.handle(peer(), &wrq).await;
        assert!(matches!(
            reply,
            Some(Packet::Error { code: ErrorCode::NotDefined, .. })
        ));
    }

    #[tokio::test]
    async fn test_noise_is_ignored() {
        let mut f = fixture();
        assert_eq!(f.engine.handle(peer(), &[0, 9, 1]).await, None);
        assert_eq!(f.engine.handle(peer(), &ack(1)).await, None);
        let stray = Packet::Data {
            block: 1,
            payload: vec![1],
        };
        assert_eq!(f.engine.handle(peer(), &stray.encode()).await, None);
    }

    #[tokio::test]
    async fn test_read_failure_sends_generic_error() {
        let mut f = fixture();
        std::fs::remove_file(f.dirs[1].path().join("path/to/file")).unwrap();

        let reply = f.engine.handle(peer(), &rrq("tools/path/to/file")).await;
        assert_eq!(reply, Some(Packet::error(ErrorCode::NotDefined, "ERROR")));
        assert_eq!(f.engine.session_count(), 0);

        // Other transfers keep working.
        data(f.engine.handle(peer(), &rrq("pxelinux.0")).await);
    }
}
