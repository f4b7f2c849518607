use thiserror::Error;

use crate::gen::Generation;
use crate::header::CommandKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while encoding, decoding, or executing command streams.
///
/// Every variant is structured so callers can map it onto a driver status code
/// (see [`Error::status_code`](crate::status)) without string matching.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("value 0x{value:x} does not fit in {field} (bits {hi}:{lo})")]
    FieldOverflow {
        field: &'static str,
        hi: u32,
        lo: u32,
        value: u64,
    },

    #[error("{field} 0x{address:x} is not {alignment}-byte aligned")]
    MisalignedAddress {
        field: &'static str,
        address: u64,
        alignment: u64,
    },

    #[error("{field} 0x{address:x} exceeds the {bits}-bit GPU address space")]
    AddressOutOfRange {
        field: &'static str,
        address: u64,
        bits: u32,
    },

    #[error("{field} is not available on {gen}")]
    UnsupportedField { field: &'static str, gen: Generation },

    #[error("empty command buffer")]
    EmptyBuffer,

    #[error("unknown command header 0x{dw0:08x}")]
    UnknownCommand { dw0: u32 },

    #[error("expected {expected:?} but header is 0x{dw0:08x}")]
    UnexpectedCommand { expected: CommandKind, dw0: u32 },

    #[error("{kind:?}: expected {expected} dwords, found {found}")]
    BadLength {
        kind: CommandKind,
        expected: usize,
        found: usize,
    },

    #[error("{kind:?} at dword {offset} needs {needed} dwords but only {available} remain")]
    Truncated {
        kind: CommandKind,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("buffer length {len} is not a multiple of 4")]
    UnalignedLength { len: usize },

    #[error("command buffer full: need {needed} bytes, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    #[error("MI_MATH takes 1..={max} ALU instructions, got {count}")]
    AluInstructionCount { count: usize, max: usize },

    #[error("invalid ALU instruction 0x{dword:08x}")]
    InvalidAluInstruction { dword: u32 },

    #[error("invalid register index {index} (max {max})")]
    InvalidRegisterIndex { index: u32, max: u32 },

    #[error("query supports at most {max} user registers, got {count}")]
    TooManyRegisters { count: usize, max: usize },

    #[error("report not ready (end tag 0x{found:016x})")]
    ReportNotReady { found: u64 },

    #[error("inconsistent report: {0}")]
    ReportInconsistent(&'static str),

    #[error("report buffer too small: need {needed} bytes, got {found}")]
    ReportTooSmall { needed: usize, found: usize },

    #[error("gpu memory access out of range: address=0x{address:x} len={len}")]
    Memory { address: u64, len: usize },

    #[error("software executor does not support {0}")]
    UnsupportedByExecutor(&'static str),
}
