//! TFTP wire format (RFC 1350).
//!
//! ```text
//! RRQ/WRQ  | 01/02 | filename | 0 | mode | 0 | [opt | 0 | value | 0]* |
//! DATA     | 03    | block#   | data (0..512 bytes)                     |
//! ACK      | 04    | block#   |                                         |
//! ERROR    | 05    | code     | message | 0                             |
//! ```
//!
//! Option extensions (RFC 2347) on read requests are parsed and kept, but
//! the engine never acknowledges them, which makes clients fall back to the
//! fixed segment size.

use thiserror::Error;

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;

/// Datagram that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet of {0} bytes is too short")]
    Truncated(usize),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),
    #[error("unterminated string field")]
    Unterminated,
    #[error("string field is not valid UTF-8")]
    Encoding,
}

/// TFTP error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileExists => 6,
            Self::NoSuchUser => 7,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileExists,
            7 => Self::NoSuchUser,
            _ => Self::NotDefined,
        }
    }
}

/// A decoded TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest {
        filename: String,
        mode: String,
        options: Vec<(String, String)>,
    },
    WriteRequest {
        filename: String,
        mode: String,
    },
    Data {
        block: u16,
        payload: Vec<u8>,
    },
    Ack {
        block: u16,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Packet {
    /// Build an ERROR packet.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Decode one datagram.
    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < 4 {
            return Err(PacketError::Truncated(buf.len()));
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];

        match opcode {
            OP_RRQ => {
                let mut fields = Fields(body);
                let filename = fields.next_str()?;
                let mode = fields.next_str()?;
                let mut options = Vec::new();
                while !fields.is_empty() {
                    let name = fields.next_str()?;
                    let value = fields.next_str()?;
                    options.push((name.to_ascii_lowercase(), value));
                }
                Ok(Self::ReadRequest {
                    filename,
                    mode,
                    options,
                })
            }
            OP_WRQ => {
                let mut fields = Fields(body);
                let filename = fields.next_str()?;
                let mode = fields.next_str()?;
                Ok(Self::WriteRequest { filename, mode })
            }
            OP_DATA => Ok(Self::Data {
                block: u16::from_be_bytes([body[0], body[1]]),
                payload: body[2..].to_vec(),
            }),
            OP_ACK => Ok(Self::Ack {
                block: u16::from_be_bytes([body[0], body[1]]),
            }),
            OP_ERROR => {
                let code = ErrorCode::from_code(u16::from_be_bytes([body[0], body[1]]));
                // Some clients omit the terminator on error messages.
                let raw = &body[2..];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let message = String::from_utf8_lossy(&raw[..end]).into_owned();
                Ok(Self::Error { code, message })
            }
            other => Err(PacketError::UnknownOpcode(other)),
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        match self {
            Self::ReadRequest {
                filename,
                mode,
                options,
            } => {
                out.extend_from_slice(&OP_RRQ.to_be_bytes());
                push_str(&mut out, filename);
                push_str(&mut out, mode);
                for (name, value) in options {
                    push_str(&mut out, name);
                    push_str(&mut out, value);
                }
            }
            Self::WriteRequest { filename, mode } => {
                out.extend_from_slice(&OP_WRQ.to_be_bytes());
                push_str(&mut out, filename);
                push_str(&mut out, mode);
            }
            Self::Data { block, payload } => {
                out.reserve(payload.len());
                out.extend_from_slice(&OP_DATA.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
                out.extend_from_slice(payload);
            }
            Self::Ack { block } => {
                out.extend_from_slice(&OP_ACK.to_be_bytes());
                out.extend_from_slice(&block.to_be_bytes());
            }
            Self::Error { code, message } => {
                out.extend_from_slice(&OP_ERROR.to_be_bytes());
                out.extend_from_slice(&code.code().to_be_bytes());
                push_str(&mut out, message);
            }
        }
        out
    }
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Cursor over NUL-terminated string fields.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn next_str(&mut self) -> Result<String, PacketError> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .ok_or(PacketError::Unterminated)?;
        let field = std::str::from_utf8(&self.0[..end]).map_err(|_| PacketError::Encoding)?;
        self.0 = &self.0[end + 1..];
        Ok(field.to_string())
    }
}
