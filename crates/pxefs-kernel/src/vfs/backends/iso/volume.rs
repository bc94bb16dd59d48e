//! ISO9660 on-disc structures (ECMA-119).
//!
//! Only what indexing needs: the primary volume descriptor, directory
//! records, the 7-byte recording timestamp and Rock Ridge `NM` names.
//! Everything is parsed out of byte slices; nothing is cast in place.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::time::SystemTime;

use chrono::{NaiveDate, TimeDelta};

/// Logical sector size. Directory records never cross a sector.
pub const SECTOR_SIZE: u64 = 2048;

/// First volume descriptor sector.
const DESCRIPTOR_START: u64 = 16;

/// Give up looking for the primary descriptor after this many sectors.
const DESCRIPTOR_LIMIT: u64 = 64;

const TYPE_PRIMARY: u8 = 1;
const TYPE_TERMINATOR: u8 = 255;
const STANDARD_ID: &[u8; 5] = b"CD001";

/// Fixed part of a directory record, up to the identifier.
const RECORD_HEADER_LEN: usize = 33;

const FLAG_DIRECTORY: u8 = 0x02;
const FLAG_MULTI_EXTENT: u8 = 0x80;

/// Rock Ridge NM flag: name continues in the next NM entry.
const NM_CONTINUE: u8 = 0x01;

/// Fields of the primary volume descriptor used for walking.
#[derive(Debug, Clone)]
pub struct PrimaryVolume {
    pub block_size: u64,
    pub root: Record,
}

/// One parsed directory record.
#[derive(Debug, Clone)]
pub struct Record {
    /// Display name: Rock Ridge name if present, else the cleaned identifier.
    pub name: String,
    pub extent: u32,
    pub size: u32,
    pub flags: u8,
    pub recorded: SystemTime,
}

impl Record {
    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// More records for the same file follow.
    pub fn continues(&self) -> bool {
        self.flags & FLAG_MULTI_EXTENT != 0
    }

    /// Parse the record at the start of `data`.
    ///
    /// `.` and `..` parse like any other record with names `"\0"` and
    /// `"\u{1}"`; callers skip them.
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let len = *data.first().ok_or_else(|| invalid("empty directory record"))? as usize;
        if len < RECORD_HEADER_LEN + 1 || len > data.len() {
            return Err(invalid(format!("bad directory record length {len}")));
        }
        let record = &data[..len];
        let name_len = record[32] as usize;
        let name_end = RECORD_HEADER_LEN + name_len;
        if name_end > len {
            return Err(invalid(format!("identifier length {name_len} overruns record")));
        }

        let identifier = &record[RECORD_HEADER_LEN..name_end];
        // System use area starts after a pad byte when the identifier length is even.
        let su_start = name_end + usize::from(name_len % 2 == 0);
        let system_use = record.get(su_start..).unwrap_or_default();

        let name = match identifier {
            [0] => "\0".to_string(),
            [1] => "\u{1}".to_string(),
            _ => rock_ridge_name(system_use).unwrap_or_else(|| clean_identifier(identifier)),
        };

        let mut recorded = [0u8; 7];
        recorded.copy_from_slice(&record[18..25]);

        Ok(Self {
            name,
            extent: le_u32(&record[2..6]),
            size: le_u32(&record[10..14]),
            flags: record[25],
            recorded: recording_time(&recorded),
        })
    }

    fn is_self_or_parent(&self) -> bool {
        self.name == "\0" || self.name == "\u{1}"
    }
}

/// Strip the `;N` version suffix and a trailing `.` from an identifier.
pub fn clean_identifier(identifier: &[u8]) -> String {
    let raw = String::from_utf8_lossy(identifier);
    let base = raw.split(';').next().unwrap_or_default();
    base.strip_suffix('.').unwrap_or(base).to_string()
}

/// Concatenated Rock Ridge `NM` entries of a system use area, if any.
fn rock_ridge_name(mut area: &[u8]) -> Option<String> {
    let mut name: Option<Vec<u8>> = None;
    while area.len() >= 4 {
        let signature = &area[0..2];
        let len = area[2] as usize;
        if len < 4 || len > area.len() {
            break;
        }
        match signature {
            b"NM" if len >= 5 => {
                let flags = area[4];
                name.get_or_insert_with(Vec::new).extend_from_slice(&area[5..len]);
                if flags & NM_CONTINUE == 0 {
                    break;
                }
            }
            b"ST" => break,
            _ => {}
        }
        area = &area[len..];
    }
    name.filter(|n| !n.is_empty())
        .map(|n| String::from_utf8_lossy(&n).into_owned())
}

/// Decode the 7-byte recording timestamp.
///
/// Bytes: years since 1900, month, day, hour, minute, second, and the GMT
/// offset in signed 15-minute units. Invalid dates become the epoch.
pub fn recording_time(bytes: &[u8; 7]) -> SystemTime {
    let year = 1900 + i32::from(bytes[0]);
    let Some(local) = NaiveDate::from_ymd_opt(year, u32::from(bytes[1]), u32::from(bytes[2]))
        .and_then(|date| {
            date.and_hms_opt(u32::from(bytes[3]), u32::from(bytes[4]), u32::from(bytes[5]))
        })
    else {
        return SystemTime::UNIX_EPOCH;
    };
    let offset = TimeDelta::minutes(i64::from(bytes[6] as i8) * 15);
    SystemTime::from(local.and_utc() - offset)
}

/// Locate and parse the primary volume descriptor.
pub fn read_primary(file: &File) -> io::Result<PrimaryVolume> {
    let mut sector = [0u8; SECTOR_SIZE as usize];
    for index in DESCRIPTOR_START..DESCRIPTOR_START + DESCRIPTOR_LIMIT {
        file.read_exact_at(&mut sector, index * SECTOR_SIZE)?;
        if &sector[1..6] != STANDARD_ID {
            return Err(invalid(format!("sector {index} is not a volume descriptor")));
        }
        match sector[0] {
            TYPE_PRIMARY => {
                let block_size = u64::from(u16::from_le_bytes([sector[128], sector[129]]));
                if block_size == 0 {
                    return Err(invalid("logical block size is zero"));
                }
                let root = Record::parse(&sector[156..190])?;
                return Ok(PrimaryVolume { block_size, root });
            }
            TYPE_TERMINATOR => break,
            _ => {}
        }
    }
    Err(invalid("no primary volume descriptor"))
}

/// Records of one directory extent, in on-disc order, without `.`/`..`.
pub fn read_directory(file: &File, volume: &PrimaryVolume, dir: &Record) -> io::Result<Vec<Record>> {
    let mut data = vec![0u8; dir.size as usize];
    file.read_exact_at(&mut data, u64::from(dir.extent) * volume.block_size)?;

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data[pos] == 0 {
            // Zero padding up to the next sector.
            pos = (pos / SECTOR_SIZE as usize + 1) * SECTOR_SIZE as usize;
            continue;
        }
        let record = Record::parse(&data[pos..])?;
        pos += data[pos] as usize;
        if !record.is_self_or_parent() {
            records.push(record);
        }
    }
    Ok(records)
}

/// A contiguous byte range of the image holding (part of) a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub length: u64,
}

/// One file or directory found by [`walk`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub size: u64,
    pub recorded: SystemTime,
    pub is_directory: bool,
    pub extents: Vec<Extent>,
}

/// Depth-first walk of the whole tree from the root directory.
///
/// Multi-extent files are merged into one entry. Directory extents
/// already visited are not entered again.
pub fn walk(file: &File, volume: &PrimaryVolume, mut visit: impl FnMut(WalkEntry) -> io::Result<()>) -> io::Result<()> {
    let mut visited = HashSet::new();
    visited.insert(volume.root.extent);
    walk_dir(file, volume, &volume.root, "", &mut visited, &mut visit)
}

fn walk_dir(
    file: &File,
    volume: &PrimaryVolume,
    dir: &Record,
    prefix: &str,
    visited: &mut HashSet<u32>,
    visit: &mut impl FnMut(WalkEntry) -> io::Result<()>,
) -> io::Result<()> {
    let mut pending: Option<WalkEntry> = None;

    for record in read_directory(file, volume, dir)? {
        let path = if prefix.is_empty() {
            record.name.clone()
        } else {
            format!("{prefix}/{}", record.name)
        };
        let extent = Extent {
            start: u64::from(record.extent) * volume.block_size,
            length: u64::from(record.size),
        };

        let mut entry = match pending.take() {
            Some(mut partial) if partial.path == path => {
                partial.size += extent.length;
                partial.extents.push(extent);
                partial
            }
            stale => {
                if let Some(partial) = stale {
                    tracing::warn!(path = %partial.path, "multi-extent file without final record");
                    visit(partial)?;
                }
                WalkEntry {
                    path,
                    size: extent.length,
                    recorded: record.recorded,
                    is_directory: record.is_directory(),
                    extents: vec![extent],
                }
            }
        };

        if record.continues() {
            pending = Some(entry);
            continue;
        }

        if entry.is_directory {
            entry.extents.truncate(1);
            let path = entry.path.clone();
            visit(entry)?;
            if visited.insert(record.extent) {
                walk_dir(file, volume, &record, &path, visited, visit)?;
            } else {
                tracing::warn!(%path, extent = record.extent, "directory extent already visited, skipping");
            }
        } else {
            visit(entry)?;
        }
    }

    if let Some(partial) = pending {
        visit(partial)?;
    }
    Ok(())
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(identifier: &[u8], system_use: &[u8], flags: u8) -> Vec<u8> {
        let pad = usize::from(identifier.len() % 2 == 0);
        let len = RECORD_HEADER_LEN + identifier.len() + pad + system_use.len();
        let mut data = vec![0u8; len];
        data[0] = len as u8;
        data[2..6].copy_from_slice(&20u32.to_le_bytes());
        data[10..14].copy_from_slice(&1234u32.to_le_bytes());
        data[25] = flags;
        data[32] = identifier.len() as u8;
        data[33..33 + identifier.len()].copy_from_slice(identifier);
        data[33 + identifier.len() + pad..].copy_from_slice(system_use);
        data
    }

    #[test]
    fn test_clean_identifier() {
        assert_eq!(clean_identifier(b"VMLINUZ.;1"), "VMLINUZ");
        assert_eq!(clean_identifier(b"README.TXT;1"), "README.TXT");
        assert_eq!(clean_identifier(b"ISOLINUX"), "ISOLINUX");
    }

    #[test]
    fn test_parse_plain_record() {
        let data = record(b"INITRD.IMG;1", &[], 0);
        let parsed = Record::parse(&data).unwrap();
        assert_eq!(parsed.name, "INITRD.IMG");
        assert_eq!(parsed.extent, 20);
        assert_eq!(parsed.size, 1234);
        assert!(!parsed.is_directory());
        assert!(!parsed.continues());
    }

    #[test]
    fn test_rock_ridge_name_wins() {
        let mut su = Vec::new();
        su.extend_from_slice(b"PX\x04\x01");
        su.extend_from_slice(b"NM\x0b\x01\x01initrd");
        su.extend_from_slice(b"NM\x09\x01\x00.img");
        let parsed = Record::parse(&record(b"INITRD.IMG;1", &su, 0)).unwrap();
        assert_eq!(parsed.name, "initrd.img");
    }

    #[test]
    fn test_dot_records_keep_raw_names() {
        let parsed = Record::parse(&record(&[0], &[], FLAG_DIRECTORY)).unwrap();
        assert!(parsed.is_self_or_parent());
        assert!(parsed.is_directory());
        let parsed = Record::parse(&record(&[1], &[], FLAG_DIRECTORY)).unwrap();
        assert!(parsed.is_self_or_parent());
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let data = record(b"A;1", &[], 0);
        assert!(Record::parse(&data[..20]).is_err());
        assert!(Record::parse(&[]).is_err());
    }

    #[test]
    fn test_recording_time_applies_gmt_offset() {
        // 2024-01-02 03:04:05 at UTC+02:00
        let time = recording_time(&[124, 1, 2, 3, 4, 5, 8]);
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(1_704_164_645 - 7200);
        assert_eq!(time, expected);
    }

    #[test]
    fn test_invalid_recording_time_is_epoch() {
        assert_eq!(recording_time(&[0; 7]), SystemTime::UNIX_EPOCH);
    }
}
