//! On-disk container for raw packet streams
//!
//! File structure:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Header (length-prefixed MsgPack)       │
//! │  - Magic, version, run metadata         │
//! ├─────────────────────────────────────────┤
//! │  Packet block 1                         │
//! │  - Length prefix (u32 LE)               │
//! │  - MsgPack serialized RawPacket         │
//! ├─────────────────────────────────────────┤
//! │  ...                                    │
//! ├─────────────────────────────────────────┤
//! │  Footer (fixed 64 bytes)                │
//! │  - Magic, checksum, completion flag     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The footer is written last, so a crash during write leaves a file the
//! reader can still walk block by block.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use xxhash_rust::xxh64::xxh64;

use crate::common::RawPacket;

/// Magic bytes opening a raw packet file
pub const FILE_MAGIC: [u8; 8] = *b"CTPRAW01";

/// Current container format version
pub const FORMAT_VERSION: u32 = 1;

/// Footer magic bytes (distinct from the header magic to detect truncation)
pub const FOOTER_MAGIC: [u8; 8] = *b"CTPEND01";

/// Fixed footer size in bytes
pub const FOOTER_SIZE: usize = 64;

/// Upper bound on one packet block, used as a corruption sanity check
const MAX_BLOCK_BYTES: usize = 100_000_000;

/// Container errors
#[derive(Debug, thiserror::Error)]
pub enum RawFileError {
    #[error("Data too short to contain valid structure")]
    TooShort,

    #[error("Invalid file magic bytes")]
    InvalidMagic,

    #[error("Invalid footer magic bytes")]
    InvalidFooterMagic,

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata written at the start of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHeader {
    /// Container format version
    pub version: u32,
    /// Run number the packets belong to
    pub run_number: u32,
    /// Free-form description of the stream
    pub comment: String,
    /// File creation time (Unix timestamp in nanoseconds)
    pub file_start_time_ns: u64,
    /// Additional key-value metadata
    pub metadata: HashMap<String, String>,
}

impl FileHeader {
    pub fn new(run_number: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            run_number,
            comment: String::new(),
            file_start_time_ns: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64,
            metadata: HashMap::new(),
        }
    }

    /// Serialize with the magic prefix and length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&FILE_MAGIC);
        let body = rmp_serde::to_vec(self)?;
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize, RawFileError> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, RawFileError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(RawFileError::InvalidMagic);
        }
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        Ok(rmp_serde::from_slice(&body)?)
    }
}

/// Fixed 64-byte footer, seekable from the file end.
#[derive(Debug, Clone, Copy)]
pub struct FileFooter {
    pub magic: [u8; 8],
    /// Combined xxHash64 over all packet blocks (length prefixes included)
    pub data_checksum: u64,
    /// Packets written
    pub total_packets: u64,
    /// Bytes of packet blocks (header and footer excluded)
    pub data_bytes: u64,
    /// Lowest packet orbit in the file
    pub first_orbit: u32,
    /// Highest packet orbit in the file
    pub last_orbit: u32,
    /// File end time (Unix timestamp in nanoseconds)
    pub file_end_time_ns: u64,
    /// 1 = complete, 0 = incomplete (crash during write)
    pub write_complete: u8,
    _reserved: [u8; 15],
}

impl Default for FileFooter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFooter {
    pub fn new() -> Self {
        Self {
            magic: FOOTER_MAGIC,
            data_checksum: 0,
            total_packets: 0,
            data_bytes: 0,
            first_orbit: u32::MAX,
            last_orbit: 0,
            file_end_time_ns: 0,
            write_complete: 0,
            _reserved: [0u8; 15],
        }
    }

    /// Mark as complete and stamp the end time.
    pub fn finalize(&mut self) {
        self.write_complete = 1;
        self.file_end_time_ns = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
    }

    pub fn is_complete(&self) -> bool {
        self.write_complete == 1
    }

    /// Grow the orbit range to include `orbit`.
    pub fn update_orbit_range(&mut self, orbit: u32) {
        if orbit < self.first_orbit {
            self.first_orbit = orbit;
        }
        if orbit > self.last_orbit {
            self.last_orbit = orbit;
        }
    }

    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.magic);
        buf[8..16].copy_from_slice(&self.data_checksum.to_le_bytes());
        buf[16..24].copy_from_slice(&self.total_packets.to_le_bytes());
        buf[24..32].copy_from_slice(&self.data_bytes.to_le_bytes());
        buf[32..36].copy_from_slice(&self.first_orbit.to_le_bytes());
        buf[36..40].copy_from_slice(&self.last_orbit.to_le_bytes());
        buf[40..48].copy_from_slice(&self.file_end_time_ns.to_le_bytes());
        buf[48] = self.write_complete;
        buf
    }

    pub fn from_bytes(data: &[u8; FOOTER_SIZE]) -> Result<Self, RawFileError> {
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[0..8]);
        if magic != FOOTER_MAGIC {
            return Err(RawFileError::InvalidFooterMagic);
        }
        let u64_at = |off: usize| {
            u64::from_le_bytes(data[off..off + 8].try_into().expect("fixed-size slice"))
        };
        let u32_at = |off: usize| {
            u32::from_le_bytes(data[off..off + 4].try_into().expect("fixed-size slice"))
        };
        Ok(Self {
            magic,
            data_checksum: u64_at(8),
            total_packets: u64_at(16),
            data_bytes: u64_at(24),
            first_orbit: u32_at(32),
            last_orbit: u32_at(36),
            file_end_time_ns: u64_at(40),
            write_complete: data[48],
            _reserved: [0u8; 15],
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), RawFileError> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, RawFileError> {
        let mut buf = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Incremental checksum over the packet blocks.
///
/// xxHash64 has no streaming entry point in the crate API used here, so
/// block hashes are combined with rotate-and-xor and mixed with the total
/// length at the end.
#[derive(Debug, Clone, Default)]
pub struct ChecksumCalculator {
    state: u64,
    bytes_processed: u64,
}

impl ChecksumCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let block_hash = xxh64(data, 0);
        self.state = self.state.rotate_left(5) ^ block_hash;
        self.bytes_processed += data.len() as u64;
    }

    pub fn finalize(&self) -> u64 {
        self.state ^ self.bytes_processed
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

/// Writer producing the container incrementally: header on construction,
/// one block per packet, footer on [`finish`](RawFileWriter::finish).
pub struct RawFileWriter<W: Write> {
    writer: W,
    footer: FileFooter,
    checksum: ChecksumCalculator,
}

impl<W: Write> RawFileWriter<W> {
    pub fn new(mut writer: W, header: &FileHeader) -> Result<Self, RawFileError> {
        header.write_to(&mut writer)?;
        Ok(Self {
            writer,
            footer: FileFooter::new(),
            checksum: ChecksumCalculator::new(),
        })
    }

    pub fn write_packet(&mut self, packet: &RawPacket) -> Result<(), RawFileError> {
        let body = rmp_serde::to_vec(packet)?;
        let len_bytes = (body.len() as u32).to_le_bytes();
        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(&body)?;

        self.checksum.update(&len_bytes);
        self.checksum.update(&body);
        self.footer.total_packets += 1;
        self.footer.data_bytes += (len_bytes.len() + body.len()) as u64;
        self.footer.update_orbit_range(packet.header.orbit);
        Ok(())
    }

    /// Write the footer and return the underlying writer.
    pub fn finish(mut self) -> Result<W, RawFileError> {
        self.footer.data_checksum = self.checksum.finalize();
        self.footer.finalize();
        self.footer.write_to(&mut self.writer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Result of whole-file validation
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub header: Option<FileHeader>,
    pub footer: Option<FileFooter>,
    /// Blocks readable before the first corruption
    pub recoverable_packets: u64,
    pub errors: Vec<String>,
}

/// Reader walking the container block by block, with recovery support for
/// truncated files.
pub struct RawFileReader<R> {
    reader: R,
    header: FileHeader,
    footer: Option<FileFooter>,
    header_size: u64,
    file_size: u64,
}

impl<R: Read + Seek> RawFileReader<R> {
    pub fn new(mut reader: R) -> Result<Self, RawFileError> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read_from(&mut reader)?;
        let header_size = reader.stream_position()?;
        Ok(Self {
            reader,
            header,
            footer: None,
            header_size,
            file_size,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn footer(&self) -> Option<&FileFooter> {
        self.footer.as_ref()
    }

    /// Read the footer; fails for truncated files.
    pub fn read_footer(&mut self) -> Result<FileFooter, RawFileError> {
        if self.file_size < self.header_size + FOOTER_SIZE as u64 {
            return Err(RawFileError::TooShort);
        }
        self.reader.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let footer = FileFooter::read_from(&mut self.reader)?;
        self.footer = Some(footer);
        Ok(footer)
    }

    /// End of the packet-block region.
    fn data_end(&self) -> u64 {
        if self.footer.is_some() && self.file_size >= FOOTER_SIZE as u64 {
            self.file_size - FOOTER_SIZE as u64
        } else {
            self.file_size
        }
    }

    /// Iterator over packet blocks, starting after the header. Stops at the
    /// first corrupt or truncated block.
    pub fn packets(&mut self) -> Result<PacketIterator<'_, R>, RawFileError> {
        self.reader.seek(SeekFrom::Start(self.header_size))?;
        Ok(PacketIterator {
            data_end: self.data_end(),
            reader: &mut self.reader,
            done: false,
        })
    }

    /// Read every packet into memory.
    pub fn read_all(&mut self) -> Result<Vec<RawPacket>, RawFileError> {
        let _ = self.read_footer();
        self.packets()?.collect()
    }

    /// Full integrity check: footer present and complete, checksum over the
    /// block region matches, every block deserializes.
    pub fn validate(&mut self) -> ValidationResult {
        let mut result = ValidationResult {
            is_valid: false,
            header: Some(self.header.clone()),
            footer: None,
            recoverable_packets: 0,
            errors: Vec::new(),
        };

        match self.read_footer() {
            Ok(footer) => {
                result.footer = Some(footer);
                if !footer.is_complete() {
                    result
                        .errors
                        .push("file incomplete (crash during write)".to_string());
                }
            }
            Err(e) => result.errors.push(format!("failed to read footer: {e}")),
        }

        let mut checksum = ChecksumCalculator::new();
        let data_end = self.data_end();
        if let Err(e) = self.count_blocks(data_end, &mut checksum, &mut result) {
            result.errors.push(format!("block walk failed: {e}"));
        }

        if let Some(footer) = &result.footer {
            if footer.is_complete() {
                let computed = checksum.finalize();
                if computed == footer.data_checksum {
                    result.is_valid = result.errors.is_empty();
                } else {
                    result.errors.push(format!(
                        "checksum mismatch: expected {:016x}, got {computed:016x}",
                        footer.data_checksum
                    ));
                }
            }
        }
        result
    }

    fn count_blocks(
        &mut self,
        data_end: u64,
        checksum: &mut ChecksumCalculator,
        result: &mut ValidationResult,
    ) -> Result<(), RawFileError> {
        self.reader.seek(SeekFrom::Start(self.header_size))?;
        loop {
            let pos = self.reader.stream_position()?;
            if pos >= data_end {
                break;
            }
            let mut len_bytes = [0u8; 4];
            if self.reader.read_exact(&mut len_bytes).is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            if len == 0 || len > MAX_BLOCK_BYTES || pos + 4 + len as u64 > data_end {
                break;
            }
            let mut body = vec![0u8; len];
            if self.reader.read_exact(&mut body).is_err() {
                break;
            }
            if rmp_serde::from_slice::<RawPacket>(&body).is_err() {
                result.errors.push(format!("corrupt block at offset {pos}"));
                break;
            }
            checksum.update(&len_bytes);
            checksum.update(&body);
            result.recoverable_packets += 1;
        }
        Ok(())
    }
}

/// Iterator over the packet blocks of one file
pub struct PacketIterator<'a, R> {
    reader: &'a mut R,
    data_end: u64,
    done: bool,
}

impl<R: Read + Seek> Iterator for PacketIterator<'_, R> {
    type Item = Result<RawPacket, RawFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let pos = match self.reader.stream_position() {
            Ok(p) => p,
            Err(e) => {
                self.done = true;
                return Some(Err(RawFileError::Io(e)));
            }
        };
        if pos >= self.data_end {
            self.done = true;
            return None;
        }

        let mut len_bytes = [0u8; 4];
        if let Err(e) = self.reader.read_exact(&mut len_bytes) {
            self.done = true;
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return None;
            }
            return Some(Err(RawFileError::Io(e)));
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_BLOCK_BYTES || pos + 4 + len as u64 > self.data_end {
            self.done = true;
            return None;
        }

        let mut body = vec![0u8; len];
        if let Err(e) = self.reader.read_exact(&mut body) {
            self.done = true;
            return Some(Err(RawFileError::Io(e)));
        }
        match rmp_serde::from_slice(&body) {
            Ok(packet) => Some(Ok(packet)),
            Err(e) => {
                self.done = true;
                Some(Err(RawFileError::Deserialization(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PacketHeader;
    use std::io::Cursor;

    fn make_packet(orbit: u32, payload: Vec<u8>) -> RawPacket {
        RawPacket::new(
            PacketHeader {
                fee_id: 0,
                orbit,
                trigger_type: 0x2,
                page_counter: 0,
                data_format: 2,
            },
            payload,
        )
    }

    #[test]
    fn header_roundtrip() {
        let mut header = FileHeader::new(42);
        header.comment = "pilot beam".to_string();
        header
            .metadata
            .insert("filling_scheme".to_string(), "single".to_string());

        let bytes = header.to_bytes().unwrap();
        assert_eq!(&bytes[0..8], &FILE_MAGIC);

        let mut cursor = Cursor::new(bytes);
        let restored = FileHeader::read_from(&mut cursor).unwrap();
        assert_eq!(restored.version, FORMAT_VERSION);
        assert_eq!(restored.run_number, 42);
        assert_eq!(restored.comment, "pilot beam");
        assert_eq!(
            restored.metadata.get("filling_scheme"),
            Some(&"single".to_string())
        );
    }

    #[test]
    fn header_invalid_magic() {
        let mut cursor = Cursor::new(b"BADMAGIC\x00\x00\x00\x00".to_vec());
        assert!(matches!(
            FileHeader::read_from(&mut cursor),
            Err(RawFileError::InvalidMagic)
        ));
    }

    #[test]
    fn footer_roundtrip_is_64_bytes() {
        let mut footer = FileFooter::new();
        footer.data_checksum = 0x1234_5678_9abc_def0;
        footer.total_packets = 17;
        footer.data_bytes = 4096;
        footer.update_orbit_range(100);
        footer.update_orbit_range(7);
        footer.finalize();

        let bytes = footer.to_bytes();
        assert_eq!(bytes.len(), FOOTER_SIZE);

        let restored = FileFooter::from_bytes(&bytes).unwrap();
        assert_eq!(restored.data_checksum, footer.data_checksum);
        assert_eq!(restored.total_packets, 17);
        assert_eq!(restored.first_orbit, 7);
        assert_eq!(restored.last_orbit, 100);
        assert!(restored.is_complete());
    }

    #[test]
    fn footer_invalid_magic() {
        let mut data = [0u8; FOOTER_SIZE];
        data[0..8].copy_from_slice(b"NOTANEND");
        assert!(matches!(
            FileFooter::from_bytes(&data),
            Err(RawFileError::InvalidFooterMagic)
        ));
    }

    #[test]
    fn checksum_is_order_sensitive() {
        let mut a = ChecksumCalculator::new();
        a.update(b"one");
        a.update(b"two");
        let mut b = ChecksumCalculator::new();
        b.update(b"two");
        b.update(b"one");
        assert_ne!(a.finalize(), b.finalize());
        assert_eq!(a.bytes_processed(), 6);
    }

    #[test]
    fn write_then_read_back() {
        let header = FileHeader::new(7);
        let mut writer = RawFileWriter::new(Vec::new(), &header).unwrap();
        let packets = vec![
            make_packet(10, vec![1, 2, 3]),
            make_packet(11, vec![]),
            make_packet(12, vec![0xff; 32]),
        ];
        for packet in &packets {
            writer.write_packet(packet).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut reader = RawFileReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().run_number, 7);
        let restored = reader.read_all().unwrap();
        assert_eq!(restored, packets);

        let footer = reader.footer().unwrap();
        assert_eq!(footer.total_packets, 3);
        assert_eq!(footer.first_orbit, 10);
        assert_eq!(footer.last_orbit, 12);
        assert!(footer.is_complete());
    }

    #[test]
    fn complete_file_validates() {
        let header = FileHeader::new(1);
        let mut writer = RawFileWriter::new(Vec::new(), &header).unwrap();
        writer.write_packet(&make_packet(5, vec![9; 10])).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = RawFileReader::new(Cursor::new(bytes)).unwrap();
        let result = reader.validate();
        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert_eq!(result.recoverable_packets, 1);
    }

    #[test]
    fn truncated_file_recovers_whole_blocks() {
        let header = FileHeader::new(1);
        let mut writer = RawFileWriter::new(Vec::new(), &header).unwrap();
        writer.write_packet(&make_packet(5, vec![1; 10])).unwrap();
        let after_first = writer.writer.len();
        writer.write_packet(&make_packet(6, vec![2; 10])).unwrap();
        let mut bytes = writer.finish().unwrap();

        // Cut inside the second block and drop the footer
        bytes.truncate(after_first + 7);

        let mut reader = RawFileReader::new(Cursor::new(bytes)).unwrap();
        let result = reader.validate();
        assert!(!result.is_valid);
        assert_eq!(result.recoverable_packets, 1);

        let packets: Vec<_> = reader
            .packets()
            .unwrap()
            .filter_map(|p| p.ok())
            .collect();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.orbit, 5);
    }

    #[test]
    fn corrupted_checksum_fails_validation() {
        let header = FileHeader::new(1);
        let mut writer = RawFileWriter::new(Vec::new(), &header).unwrap();
        writer.write_packet(&make_packet(5, vec![7; 64])).unwrap();
        let mut bytes = writer.finish().unwrap();

        // Flip one payload byte without touching the footer
        let mid = bytes.len() - FOOTER_SIZE - 10;
        bytes[mid] ^= 0x80;

        let mut reader = RawFileReader::new(Cursor::new(bytes)).unwrap();
        let result = reader.validate();
        assert!(!result.is_valid);
    }
}
