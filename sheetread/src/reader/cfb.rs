//! Compound-file container reader
//!
//! Only what the workbook decoder needs: header, FAT (including chained
//! DIFAT sectors), mini-FAT, the flat directory and stream extraction. Every
//! chain walk carries a step budget so cyclic or hostile chains terminate.

use log::{debug, warn};

use super::binary::{decode_utf16le, read_u8, read_u16_le, read_u32_le, read_u64_le};
use crate::error::{ReadError, Result};

pub const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const HEADER_LEN: usize = 512;
const HEADER_DIFAT_ENTRIES: usize = 109;
const DIR_ENTRY_LEN: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
/// Streams shorter than this live in the mini stream, whatever the header says
const MINI_STREAM_CUTOFF: u64 = 4096;

const FREESECT: u32 = 0xFFFF_FFFF;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FATSECT: u32 = 0xFFFF_FFFD;
const DIFSECT: u32 = 0xFFFF_FFFC;

const ENTRY_STREAM: u8 = 2;
const ENTRY_ROOT: u8 = 5;

/// Stream names that hold the workbook, newest dialect first
pub const WORKBOOK_STREAM_NAMES: [&str; 2] = ["Workbook", "Book"];

/// True when `data` starts with the compound-file signature
pub fn is_compound_file(data: &[u8]) -> bool {
    data.len() >= SIGNATURE.len() && data[..SIGNATURE.len()] == SIGNATURE
}

/// Extract the named stream from a container in one call
pub fn extract_stream(data: &[u8], name: &str, max_chain_length: usize) -> Result<Vec<u8>> {
    CompoundFile::parse(data, max_chain_length)?.read_stream(name)
}

fn is_regular(sector: u32) -> bool {
    !matches!(sector, FREESECT | ENDOFCHAIN | FATSECT | DIFSECT)
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub entry_type: u8,
    pub start_sector: u32,
    pub size: u64,
}

impl DirEntry {
    pub fn is_stream(&self) -> bool {
        self.entry_type == ENTRY_STREAM
    }
}

#[derive(Debug)]
pub struct CompoundFile<'a> {
    data: &'a [u8],
    sector_size: usize,
    max_chain_length: usize,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_stream: Vec<u8>,
    entries: Vec<DirEntry>,
}

impl<'a> CompoundFile<'a> {
    pub fn parse(data: &'a [u8], max_chain_length: usize) -> Result<Self> {
        if data.len() < HEADER_LEN || !is_compound_file(data) {
            return Err(ReadError::ContainerCorrupt(
                "missing compound-file signature".to_string(),
            ));
        }
        let header_u32 = |offset: usize| {
            read_u32_le(data, offset).ok_or_else(|| {
                ReadError::ContainerCorrupt(format!("header field at {offset:#x} unreadable"))
            })
        };

        let sector_shift = read_u16_le(data, 0x1E).unwrap_or(0);
        let sector_size = match sector_shift {
            9 => 512,
            12 => 4096,
            other => {
                return Err(ReadError::ContainerCorrupt(format!(
                    "unsupported sector shift {other}"
                )));
            }
        };
        let mini_shift = read_u16_le(data, 0x20).unwrap_or(0);
        if mini_shift != 6 {
            return Err(ReadError::ContainerCorrupt(format!(
                "unsupported mini-sector shift {mini_shift}"
            )));
        }

        let mut cfb = CompoundFile {
            data,
            sector_size,
            max_chain_length,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            mini_stream: Vec::new(),
            entries: Vec::new(),
        };

        let declared_cutoff = u64::from(header_u32(0x38)?);
        if declared_cutoff != MINI_STREAM_CUTOFF {
            warn!("header declares mini-stream cutoff {declared_cutoff}, using {MINI_STREAM_CUTOFF}");
        }

        let fat_sector_count = header_u32(0x2C)? as usize;
        let first_dir = header_u32(0x30)?;
        let first_mini_fat = header_u32(0x3C)?;
        let mini_fat_count = header_u32(0x40)?;
        let first_difat = header_u32(0x44)?;
        let difat_count = header_u32(0x48)? as usize;

        let fat_sectors = cfb.collect_fat_sector_ids(fat_sector_count, first_difat, difat_count)?;
        cfb.fat = cfb.build_fat(&fat_sectors)?;
        debug!(
            "compound file: {} byte sectors, {} FAT sectors, {} FAT entries",
            sector_size,
            fat_sectors.len(),
            cfb.fat.len()
        );

        let directory = cfb.read_fat_chain(first_dir)?;
        cfb.entries = parse_directory(&directory, sector_size);

        let root = cfb
            .entries
            .iter()
            .find(|e| e.entry_type == ENTRY_ROOT)
            .cloned()
            .ok_or_else(|| ReadError::ContainerCorrupt("root directory entry missing".into()))?;

        if mini_fat_count > 0 && is_regular(first_mini_fat) {
            let raw = cfb.read_fat_chain(first_mini_fat)?;
            cfb.mini_fat = raw
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            let mut mini_stream = cfb.read_fat_chain(root.start_sector)?;
            mini_stream.truncate(root.size as usize);
            cfb.mini_stream = mini_stream;
        }

        Ok(cfb)
    }

    /// Upper bound on sectors any chain may visit
    fn chain_budget(&self, unit: usize, pool_len: usize) -> usize {
        (pool_len / unit + 1).min(self.max_chain_length)
    }

    fn sector(&self, id: u32) -> Result<&'a [u8]> {
        let start = (id as usize)
            .checked_add(1)
            .and_then(|n| n.checked_mul(self.sector_size))
            .ok_or_else(|| ReadError::ContainerCorrupt(format!("sector id {id} overflows")))?;
        self.data
            .get(start..start + self.sector_size)
            .ok_or_else(|| {
                ReadError::StreamTruncated(format!(
                    "sector {id} lies beyond the end of the file ({} bytes)",
                    self.data.len()
                ))
            })
    }

    fn collect_fat_sector_ids(
        &self,
        fat_sector_count: usize,
        first_difat: u32,
        difat_count: usize,
    ) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(fat_sector_count.min(HEADER_DIFAT_ENTRIES));
        for i in 0..HEADER_DIFAT_ENTRIES {
            if ids.len() >= fat_sector_count {
                break;
            }
            let id = read_u32_le(self.data, 0x4C + i * 4).unwrap_or(FREESECT);
            if is_regular(id) {
                ids.push(id);
            }
        }

        let per_sector = self.sector_size / 4 - 1;
        let budget = self.chain_budget(self.sector_size, self.data.len());
        let mut next = first_difat;
        let mut steps = 0;
        while ids.len() < fat_sector_count && is_regular(next) && steps < difat_count {
            steps += 1;
            if steps > budget {
                return Err(ReadError::ContainerCorrupt(
                    "DIFAT chain exceeds the sector budget".into(),
                ));
            }
            let sector = self.sector(next)?;
            for i in 0..per_sector {
                let id = read_u32_le(sector, i * 4).unwrap_or(FREESECT);
                if is_regular(id) && ids.len() < fat_sector_count {
                    ids.push(id);
                }
            }
            next = read_u32_le(sector, per_sector * 4).unwrap_or(ENDOFCHAIN);
        }

        if ids.len() < fat_sector_count {
            warn!(
                "compound file declares {fat_sector_count} FAT sectors, found {}",
                ids.len()
            );
        }
        if ids.is_empty() {
            return Err(ReadError::ContainerCorrupt("no FAT sectors".into()));
        }
        Ok(ids)
    }

    fn build_fat(&self, fat_sectors: &[u32]) -> Result<Vec<u32>> {
        let mut fat = Vec::with_capacity(fat_sectors.len() * self.sector_size / 4);
        for &id in fat_sectors {
            let sector = self.sector(id)?;
            fat.extend(
                sector
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        Ok(fat)
    }

    /// Concatenate the sectors of a regular chain
    fn read_fat_chain(&self, start: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let budget = self.chain_budget(self.sector_size, self.data.len());
        let mut current = start;
        let mut steps = 0;
        while is_regular(current) {
            steps += 1;
            if steps > budget {
                return Err(ReadError::ContainerCorrupt(format!(
                    "sector chain from {start} exceeds {budget} steps"
                )));
            }
            out.extend_from_slice(self.sector(current)?);
            current = *self.fat.get(current as usize).ok_or_else(|| {
                ReadError::ContainerCorrupt(format!("sector {current} outside the FAT"))
            })?;
        }
        Ok(out)
    }

    /// Concatenate the mini sectors of a chain inside the mini stream
    fn read_mini_chain(&self, start: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let budget = self.chain_budget(MINI_SECTOR_SIZE, self.mini_stream.len());
        let mut current = start;
        let mut steps = 0;
        while is_regular(current) {
            steps += 1;
            if steps > budget {
                return Err(ReadError::ContainerCorrupt(format!(
                    "mini-sector chain from {start} exceeds {budget} steps"
                )));
            }
            let offset = current as usize * MINI_SECTOR_SIZE;
            let chunk = self
                .mini_stream
                .get(offset..offset + MINI_SECTOR_SIZE)
                .ok_or_else(|| {
                    ReadError::StreamTruncated(format!(
                        "mini sector {current} lies beyond the mini stream"
                    ))
                })?;
            out.extend_from_slice(chunk);
            current = *self.mini_fat.get(current as usize).ok_or_else(|| {
                ReadError::ContainerCorrupt(format!("mini sector {current} outside the mini-FAT"))
            })?;
        }
        Ok(out)
    }

    pub fn find_stream(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|e| e.is_stream() && e.name.eq_ignore_ascii_case(name))
    }

    pub fn read_entry(&self, entry: &DirEntry) -> Result<Vec<u8>> {
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF && !self.mini_fat.is_empty() {
            self.read_mini_chain(entry.start_sector)?
        } else {
            self.read_fat_chain(entry.start_sector)?
        };
        let declared = usize::try_from(entry.size).unwrap_or(usize::MAX);
        if bytes.len() < declared {
            warn!(
                "stream '{}' declares {} bytes but its chain holds {}",
                entry.name,
                entry.size,
                bytes.len()
            );
        }
        bytes.truncate(declared);
        Ok(bytes)
    }

    pub fn read_stream(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_stream(name)
            .ok_or_else(|| ReadError::ContainerCorrupt(format!("stream '{name}' not found")))?;
        self.read_entry(entry)
    }

    /// The BIFF workbook stream, under either of its historical names
    pub fn workbook_stream(&self) -> Result<Vec<u8>> {
        let entry = WORKBOOK_STREAM_NAMES
            .iter()
            .find_map(|name| self.find_stream(name))
            .ok_or_else(|| {
                ReadError::ContainerCorrupt("no Workbook or Book stream in container".into())
            })?;
        self.read_entry(entry)
    }
}

fn parse_directory(directory: &[u8], sector_size: usize) -> Vec<DirEntry> {
    directory
        .chunks_exact(DIR_ENTRY_LEN)
        .filter_map(|raw| {
            let entry_type = read_u8(raw, 0x42)?;
            if entry_type == 0 {
                return None;
            }
            let name_len = read_u16_le(raw, 0x40)? as usize;
            let name = if (2..=64).contains(&name_len) {
                decode_utf16le(&raw[..name_len - 2])
            } else {
                String::new()
            };
            let raw_size = read_u64_le(raw, 0x78)?;
            // Version 3 files leave the high half undefined
            let size = if sector_size == 512 {
                raw_size & 0xFFFF_FFFF
            } else {
                raw_size
            };
            Some(DirEntry {
                name,
                entry_type,
                start_sector: read_u32_le(raw, 0x74)?,
                size,
            })
        })
        .collect()
}
