//! Core data types shared by the decoder, the inverse encoder and the
//! file container: interaction records, trigger digits, luminosity
//! samples and the raw packet envelope.

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{DecodeError, DecodeResult};

/// Constants of the CTP readout-link format
pub mod constants {
    /// Bits per serialized GBT word
    pub const NGBT: u32 = 80;
    /// Bunch crossings per orbit
    pub const BCS_PER_ORBIT: u16 = 3564;
    /// Bits of the bunch-crossing id field at the bottom of every chunk
    pub const BCID_BITS: u32 = 12;
    /// Trigger inputs carried on the interaction-record link
    pub const NUM_INPUTS: u32 = 48;
    /// Trigger classes carried on the class-record link
    pub const NUM_CLASSES: u32 = 64;
    /// Payload chunk width of the interaction-record link (bcid + inputs)
    pub const INT_REC_PAYLOAD: u32 = BCID_BITS + NUM_INPUTS;
    /// Payload chunk width of the class-record link (bcid + classes)
    pub const CLASS_REC_PAYLOAD: u32 = BCID_BITS + NUM_CLASSES;
    /// Link id of the interaction-record channel (fee_id bits 8..12)
    pub const LINK_INT_REC: u8 = 0;
    /// Link id of the class-record channel
    pub const LINK_CLASS_REC: u8 = 1;
    /// Trigger-type bit flagging a timeframe start
    pub const TF_TRIGGER_MASK: u32 = 0x800;
    /// Trigger-type bit flagging a heartbeat
    pub const HB_TRIGGER_MASK: u32 = 0x2;
    /// Payload bytes per word in compact framing
    pub const WORD_BYTES: usize = 10;
    /// Payload bytes per word in padded framing
    pub const WORD_BYTES_PADDED: usize = 16;
    /// Header data_format value selecting padded 16-byte framing
    pub const DATA_FORMAT_PADDED: u8 = 0;
    /// Header data_format value selecting compact 10-byte framing
    pub const DATA_FORMAT_COMPACT: u8 = 2;
}

/// Identifier of one collision time slot: (orbit, bunch crossing).
///
/// Field order gives the derived ordering: orbit first, then bc, so the
/// digit map iterates in timeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct InteractionRecord {
    /// Orbit number
    pub orbit: u32,
    /// Bunch-crossing id within the orbit (0..3563)
    pub bc: u16,
}

impl InteractionRecord {
    pub fn new(bc: u16, orbit: u32) -> Self {
        Self { orbit, bc }
    }

    /// Position on the single monotonically increasing bc timeline.
    pub fn global_bc(&self) -> u64 {
        self.orbit as u64 * constants::BCS_PER_ORBIT as u64 + self.bc as u64
    }

    /// Rebuild a record from a global bc index.
    pub fn from_global_bc(global: u64) -> Self {
        let bcs = constants::BCS_PER_ORBIT as u64;
        Self {
            orbit: (global / bcs) as u32,
            bc: (global % bcs) as u16,
        }
    }

    /// Subtract a bc offset, borrowing across the orbit boundary.
    ///
    /// Returns `None` if the correction would underflow the start of the
    /// timeline. Negative offsets shift forward.
    pub fn checked_sub_bc(&self, offset: i64) -> Option<Self> {
        let shifted = self.global_bc() as i64 - offset;
        if shifted < 0 {
            return None;
        }
        Some(Self::from_global_bc(shifted as u64))
    }

    /// Shift forward by a bc offset (inverse of [`checked_sub_bc`]).
    ///
    /// [`checked_sub_bc`]: InteractionRecord::checked_sub_bc
    pub fn add_bc(&self, offset: i64) -> Self {
        Self::from_global_bc((self.global_bc() as i64 + offset) as u64)
    }
}

impl std::fmt::Display for InteractionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "orbit {} bc {}", self.orbit, self.bc)
    }
}

/// One decoded trigger digit: a timing-corrected interaction record plus
/// the two independently contributed bit masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digit {
    /// Timing-corrected interaction record (map key)
    pub record: InteractionRecord,
    /// Trigger-input mask from the interaction-record channel (48 bits)
    pub input_mask: u64,
    /// Trigger-class mask from the class-record channel (64 bits)
    pub class_mask: u64,
}

impl Digit {
    pub fn new(record: InteractionRecord) -> Self {
        Self {
            record,
            input_mask: 0,
            class_mask: 0,
        }
    }

    pub fn has_inputs(&self) -> bool {
        self.input_mask != 0
    }

    pub fn has_classes(&self) -> bool {
        self.class_mask != 0
    }
}

/// Per-heartbeat-frame luminosity counters.
///
/// The reserved fields keep the wire layout of the original record and are
/// always zero here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LumiSample {
    /// Start orbit of the heartbeat frame the counts belong to
    pub orbit: u32,
    pub reserved0: u64,
    pub reserved1: u64,
    /// Chunks matching the minimum-bias trigger pattern
    pub mb_trigger_count: u64,
    /// Chunks matching the veto trigger pattern
    pub mb_veto_count: u64,
}

impl LumiSample {
    pub fn new(orbit: u32, mb_trigger_count: u64, mb_veto_count: u64) -> Self {
        Self {
            orbit,
            reserved0: 0,
            reserved1: 0,
            mb_trigger_count,
            mb_veto_count,
        }
    }
}

/// Header fields of one raw hardware packet, as extracted by the external
/// transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Front-end identifier; bits 8..12 select the logical link
    pub fee_id: u16,
    /// Heartbeat orbit of the packet
    pub orbit: u32,
    /// Trigger-type flag word
    pub trigger_type: u32,
    /// Packet sequence number within the heartbeat frame
    pub page_counter: u16,
    /// Payload framing selector (see `constants::DATA_FORMAT_*`)
    pub data_format: u8,
}

impl PacketHeader {
    /// Logical link id carried in the fee_id.
    pub fn link(&self) -> u8 {
        ((self.fee_id & 0xf00) >> 8) as u8
    }

    /// Whether the payload uses padded 16-byte word framing.
    ///
    /// An unrecognized data_format is a fatal introspection failure for the
    /// whole interval.
    pub fn padded(&self) -> DecodeResult<bool> {
        match self.data_format {
            constants::DATA_FORMAT_PADDED => Ok(true),
            constants::DATA_FORMAT_COMPACT => Ok(false),
            other => Err(DecodeError::UnknownDataFormat(other)),
        }
    }

    /// Timeframe-start packets open a new acquisition interval.
    pub fn is_timeframe_start(&self) -> bool {
        (self.trigger_type & constants::TF_TRIGGER_MASK) != 0 && self.page_counter == 0
    }

    /// Heartbeat packets open a new heartbeat frame.
    pub fn is_heartbeat(&self) -> bool {
        (self.trigger_type & constants::HB_TRIGGER_MASK) != 0 && self.page_counter == 0
    }
}

/// One raw hardware packet: header plus the byte payload of the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPacket {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl RawPacket {
    pub fn new(header: PacketHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }
}
