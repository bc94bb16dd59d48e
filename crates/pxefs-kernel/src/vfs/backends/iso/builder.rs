//! Minimal ISO9660 image writer for tests.
//!
//! Layout: system area, primary descriptor at 16, terminator at 17,
//! directory extents from 18 (root first), then file data. Every record
//! carries the recording time 2024-01-02 03:04:05 UTC.

use std::collections::HashMap;
use std::path::Path;

const SECTOR: usize = 2048;
const FIRST_DIR_LBA: usize = 18;

pub const RECORDED: [u8; 7] = [124, 1, 2, 3, 4, 5, 0];

/// Unix time of [`RECORDED`].
pub const RECORDED_UNIX: u64 = 1_704_164_645;

enum Content {
    Dir,
    File(Vec<u8>),
    /// Stored as several non-contiguous extents of `chunk` bytes.
    Split(Vec<u8>, usize),
}

struct Node {
    path: String,
    content: Content,
}

pub struct IsoBuilder {
    nodes: Vec<Node>,
    rock_ridge: bool,
}

impl IsoBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            rock_ridge: false,
        }
    }

    /// Emit lowercase Rock Ridge `NM` names next to uppercase identifiers.
    pub fn rock_ridge(mut self) -> Self {
        self.rock_ridge = true;
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.push(Node {
            path: path.to_string(),
            content: Content::Dir,
        });
        self
    }

    pub fn file(mut self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.nodes.push(Node {
            path: path.to_string(),
            content: Content::File(data.into()),
        });
        self
    }

    pub fn split_file(mut self, path: &str, data: impl Into<Vec<u8>>, chunk: usize) -> Self {
        self.nodes.push(Node {
            path: path.to_string(),
            content: Content::Split(data.into(), chunk),
        });
        self
    }

    pub fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }

    pub fn build(&self) -> Vec<u8> {
        let mut dirs = vec![String::new()];
        dirs.extend(
            self.nodes
                .iter()
                .filter(|n| matches!(n.content, Content::Dir))
                .map(|n| n.path.clone()),
        );

        // Directory extents: sizes depend only on names.
        let mut lba = FIRST_DIR_LBA;
        let mut dir_extent: HashMap<String, (u32, u32)> = HashMap::new();
        for dir in &dirs {
            let lens: Vec<usize> = self
                .children(dir)
                .flat_map(|node| self.records_for(node, &[(0, 0)]))
                .map(|r| r.len())
                .collect();
            let size = packed_size(&lens);
            dir_extent.insert(dir.clone(), (lba as u32, size as u32));
            lba += size / SECTOR;
        }

        // File extents; split files leave a free sector between parts.
        let mut file_extents: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        for node in &self.nodes {
            match &node.content {
                Content::Dir => {}
                Content::File(data) => {
                    file_extents.insert(node.path.clone(), vec![(lba as u32, data.len() as u32)]);
                    lba += data.len().div_ceil(SECTOR);
                }
                Content::Split(data, chunk) => {
                    let mut parts = Vec::new();
                    for piece in data.chunks(*chunk) {
                        parts.push((lba as u32, piece.len() as u32));
                        lba += piece.len().div_ceil(SECTOR) + 1;
                    }
                    file_extents.insert(node.path.clone(), parts);
                }
            }
        }

        let mut image = vec![0u8; lba * SECTOR];
        let (root_lba, root_size) = dir_extent[""];
        write_descriptors(&mut image, lba as u32, root_lba, root_size);

        for dir in &dirs {
            let (own_lba, own_size) = dir_extent[dir];
            let parent = parent_of(dir);
            let (parent_lba, parent_size) = dir_extent[parent];

            let mut records = vec![
                record(&[0], own_lba, own_size, 0x02, None),
                record(&[1], parent_lba, parent_size, 0x02, None),
            ];
            for node in self.children(dir) {
                let extents = match &node.content {
                    Content::Dir => vec![dir_extent[&node.path]],
                    _ => file_extents[&node.path].clone(),
                };
                records.extend(self.records_for(node, &extents));
            }

            let mut pos = own_lba as usize * SECTOR;
            for rec in records {
                if pos % SECTOR + rec.len() > SECTOR {
                    pos = pos.next_multiple_of(SECTOR);
                }
                image[pos..pos + rec.len()].copy_from_slice(&rec);
                pos += rec.len();
            }
        }

        for node in &self.nodes {
            let (Content::File(data) | Content::Split(data, _)) = &node.content else {
                continue;
            };
            let mut offset = 0;
            for &(lba, len) in &file_extents[&node.path] {
                let start = lba as usize * SECTOR;
                let len = len as usize;
                image[start..start + len].copy_from_slice(&data[offset..offset + len]);
                offset += len;
            }
        }

        image
    }

    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| parent_of(&n.path) == dir)
    }

    fn records_for(&self, node: &Node, extents: &[(u32, u32)]) -> Vec<Vec<u8>> {
        let name = node.path.rsplit('/').next().unwrap_or_default();
        let is_dir = matches!(node.content, Content::Dir);
        let identifier = if is_dir {
            name.to_uppercase()
        } else {
            format!("{};1", name.to_uppercase())
        };
        let rr = self.rock_ridge.then_some(name);

        let count = match &node.content {
            Content::Split(data, chunk) => data.chunks(*chunk).count().max(1),
            _ => 1,
        };
        (0..count)
            .map(|i| {
                let (lba, len) = extents.get(i).copied().unwrap_or((0, 0));
                let mut flags = if is_dir { 0x02 } else { 0 };
                if i + 1 < count {
                    flags |= 0x80;
                }
                record(identifier.as_bytes(), lba, len, flags, rr)
            })
            .collect()
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn packed_size(record_lens: &[usize]) -> usize {
    // Two 34-byte dot records first.
    let mut pos = 68;
    for &len in record_lens {
        if pos % SECTOR + len > SECTOR {
            pos = pos.next_multiple_of(SECTOR);
        }
        pos += len;
    }
    pos.next_multiple_of(SECTOR)
}

fn record(identifier: &[u8], lba: u32, size: u32, flags: u8, rr_name: Option<&str>) -> Vec<u8> {
    let pad = usize::from(identifier.len() % 2 == 0);
    let mut system_use = Vec::new();
    if let Some(name) = rr_name {
        system_use.extend_from_slice(b"NM");
        system_use.push((5 + name.len()) as u8);
        system_use.push(1);
        system_use.push(0);
        system_use.extend_from_slice(name.as_bytes());
    }
    let mut len = 33 + identifier.len() + pad + system_use.len();
    len += len % 2;

    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    both_endian_u32(&mut rec[2..10], lba);
    both_endian_u32(&mut rec[10..18], size);
    rec[18..25].copy_from_slice(&RECORDED);
    rec[25] = flags;
    rec[28..30].copy_from_slice(&1u16.to_le_bytes());
    rec[30..32].copy_from_slice(&1u16.to_be_bytes());
    rec[32] = identifier.len() as u8;
    rec[33..33 + identifier.len()].copy_from_slice(identifier);
    let su_start = 33 + identifier.len() + pad;
    rec[su_start..su_start + system_use.len()].copy_from_slice(&system_use);
    rec
}

fn write_descriptors(image: &mut [u8], total_sectors: u32, root_lba: u32, root_size: u32) {
    let pvd = &mut image[16 * SECTOR..17 * SECTOR];
    pvd[0] = 1;
    pvd[1..6].copy_from_slice(b"CD001");
    pvd[6] = 1;
    pvd[8..40].fill(b' ');
    pvd[40..72].fill(b' ');
    pvd[40..47].copy_from_slice(b"PXETEST");
    both_endian_u32(&mut pvd[80..88], total_sectors);
    pvd[120..122].copy_from_slice(&1u16.to_le_bytes());
    pvd[122..124].copy_from_slice(&1u16.to_be_bytes());
    pvd[124..126].copy_from_slice(&1u16.to_le_bytes());
    pvd[126..128].copy_from_slice(&1u16.to_be_bytes());
    pvd[128..130].copy_from_slice(&(SECTOR as u16).to_le_bytes());
    pvd[130..132].copy_from_slice(&(SECTOR as u16).to_be_bytes());
    pvd[156..190].copy_from_slice(&record(&[0], root_lba, root_size, 0x02, None));
    pvd[881] = 1;

    let terminator = &mut image[17 * SECTOR..18 * SECTOR];
    terminator[0] = 255;
    terminator[1..6].copy_from_slice(b"CD001");
    terminator[6] = 1;
}

fn both_endian_u32(dst: &mut [u8], value: u32) {
    dst[0..4].copy_from_slice(&value.to_le_bytes());
    dst[4..8].copy_from_slice(&value.to_be_bytes());
}
