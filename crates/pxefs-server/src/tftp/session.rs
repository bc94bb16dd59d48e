//! Per-client transfer state.

use pxefs_types::Image;

use crate::constants::SEGMENT_SIZE;

/// Progress of one read transfer.
#[derive(Debug, Clone)]
pub struct SendContext {
    pub image: Image,
    pub path: String,
    /// Bytes of the file already sent.
    pub sent: u64,
    /// Block number of the last DATA packet (0 before the first).
    pub block: u16,
    /// Payload of the last DATA packet, kept for retransmission.
    pub last: Option<Vec<u8>>,
}

impl SendContext {
    pub fn new(image: Image, path: impl Into<String>) -> Self {
        Self {
            image,
            path: path.into(),
            sent: 0,
            block: 0,
            last: None,
        }
    }

    /// Whether another DATA block is owed for a file of `size` bytes.
    ///
    /// Bytes remaining always need a block. Once everything is sent, one
    /// more (empty) block is owed if the last one was full, so the client
    /// sees a short block terminate the transfer.
    pub fn has_more(&self, size: u64) -> bool {
        if self.sent < size {
            return true;
        }
        self.last
            .as_ref()
            .map_or(true, |payload| payload.len() == SEGMENT_SIZE)
    }

    /// Record a sent block and return its number.
    pub fn advance(&mut self, payload: Vec<u8>) -> u16 {
        self.block = self.block.wrapping_add(1);
        self.sent += payload.len() as u64;
        self.last = Some(payload);
        self.block
    }

    /// Whether the last sent block was the final one.
    pub fn finished(&self) -> bool {
        self.last
            .as_ref()
            .is_some_and(|payload| payload.len() < SEGMENT_SIZE)
    }
}
