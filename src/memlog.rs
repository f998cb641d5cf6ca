//! Reader for the binary trace log emitted by the emulator.
//!
//! The log is a flat sequence of 40-byte little-endian records. Each record
//! is an address access, a branch decision, or a select decision; richer
//! events (memset/memcpy/helper brackets) are synthesized later by the
//! associator from these raw records plus the IR.

use crate::addr::{AddrEntry, AddrFlag, AddrKind};
use thiserror::Error;

/// What an address record describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddrOp {
    Load,
    Store,
    /// Legacy tagging record for branches
    BranchAddr,
    /// Legacy tagging record for selects
    SelectAddr,
}

impl AddrOp {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(AddrOp::Load),
            1 => Some(AddrOp::Store),
            2 => Some(AddrOp::BranchAddr),
            3 => Some(AddrOp::SelectAddr),
            _ => None,
        }
    }
}

/// One raw record from the trace log.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TraceEntry {
    Addr { op: AddrOp, addr: AddrEntry },
    Branch { taken: u32 },
    Select { value: u32 },
}

/// On-disk size of one trace record.
pub const RECORD_SIZE: usize = 40;

/// Fatal trace-reader faults. A malformed record invalidates everything after
/// it, so parsing stops at the first error.
#[derive(Error, Debug)]
pub enum TraceParseError {
    #[error("truncated trace: record at offset {offset} needs {RECORD_SIZE} bytes, only {remaining} left")]
    Truncated { offset: usize, remaining: usize },

    #[error("unknown entry type {value} at offset {offset}")]
    UnknownEntryType { offset: usize, value: u64 },

    #[error("unknown address op {value} at offset {offset}")]
    UnknownAddrOp { offset: usize, value: u64 },

    #[error("unknown address kind {value} at offset {offset}")]
    UnknownAddrKind { offset: usize, value: u64 },

    #[error("unknown address flag {value} at offset {offset}")]
    UnknownAddrFlag { offset: usize, value: i32 },
}

fn u64_at(record: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(record[at..at + 8].try_into().unwrap())
}

fn u32_at(record: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(record[at..at + 4].try_into().unwrap())
}

fn i32_at(record: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(record[at..at + 4].try_into().unwrap())
}

/// Parse a whole trace log.
pub fn parse_trace(bytes: &[u8]) -> Result<Vec<TraceEntry>, TraceParseError> {
    let mut entries = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    let mut offset = 0;
    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < RECORD_SIZE {
            return Err(TraceParseError::Truncated { offset, remaining });
        }
        let record = &bytes[offset..offset + RECORD_SIZE];
        let entry = match u64_at(record, 0) {
            0 => {
                let op = u64_at(record, 8);
                let op = AddrOp::from_u64(op)
                    .ok_or(TraceParseError::UnknownAddrOp { offset, value: op })?;
                let kind = u64_at(record, 16);
                let kind = AddrKind::from_u64(kind)
                    .ok_or(TraceParseError::UnknownAddrKind { offset, value: kind })?;
                let val = u64_at(record, 24);
                let off = u32_at(record, 32);
                // the flag field is the one signed quantity in the record
                let flag = i32_at(record, 36);
                let flag = AddrFlag::from_i32(flag)
                    .ok_or(TraceParseError::UnknownAddrFlag { offset, value: flag })?;
                TraceEntry::Addr { op, addr: AddrEntry { kind, val, off, flag } }
            },
            1 => TraceEntry::Branch { taken: u32_at(record, 8) },
            2 => TraceEntry::Select { value: u32_at(record, 8) },
            value => return Err(TraceParseError::UnknownEntryType { offset, value }),
        };
        entries.push(entry);
        offset += RECORD_SIZE;
    }
    Ok(entries)
}
