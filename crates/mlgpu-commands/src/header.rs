//! Command header (dword 0) layout and classification.
//!
//! ```text
//! MI:       31:29 type = 0 | 28:23 opcode | ...              | n:0 DWordLength
//! GFXPIPE:  31:29 type = 3 | 28:27 subtype | 26:24 opcode | 23:16 sub-opcode | 7:0 DWordLength
//! ```
//!
//! `DWordLength` is the total command length in dwords minus two. `MI_NOOP` and
//! `MI_BATCH_BUFFER_END` are single-dword commands without a length field.

use crate::bits::field_get;
use crate::error::{Error, Result};

pub const COMMAND_TYPE_MI: u32 = 0;
pub const COMMAND_TYPE_GFXPIPE: u32 = 3;

pub const MI_NOOP_OPCODE: u32 = 0x00;
pub const MI_BATCH_BUFFER_END_OPCODE: u32 = 0x0A;
pub const MI_MATH_OPCODE: u32 = 0x1A;
pub const MI_STORE_DATA_IMM_OPCODE: u32 = 0x20;
pub const MI_LOAD_REGISTER_IMM_OPCODE: u32 = 0x22;
pub const MI_STORE_REGISTER_MEM_OPCODE: u32 = 0x24;
pub const MI_REPORT_PERF_COUNT_OPCODE: u32 = 0x28;
pub const MI_LOAD_REGISTER_MEM_OPCODE: u32 = 0x29;
pub const MI_LOAD_REGISTER_REG_OPCODE: u32 = 0x2A;
pub const MI_COPY_MEM_MEM_OPCODE: u32 = 0x2E;

pub const PIPE_CONTROL_SUBTYPE: u32 = 3;
pub const PIPE_CONTROL_OPCODE: u32 = 2;
pub const PIPE_CONTROL_SUB_OPCODE: u32 = 0;

/// Every command this crate can encode and decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CommandKind {
    MiNoop,
    MiBatchBufferEnd,
    MiMath,
    MiStoreDataImm,
    MiLoadRegisterImm,
    MiStoreRegisterMem,
    MiReportPerfCount,
    MiLoadRegisterMem,
    MiLoadRegisterReg,
    MiCopyMemMem,
    PipeControl,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::MiNoop,
        CommandKind::MiBatchBufferEnd,
        CommandKind::MiMath,
        CommandKind::MiStoreDataImm,
        CommandKind::MiLoadRegisterImm,
        CommandKind::MiStoreRegisterMem,
        CommandKind::MiReportPerfCount,
        CommandKind::MiLoadRegisterMem,
        CommandKind::MiLoadRegisterReg,
        CommandKind::MiCopyMemMem,
        CommandKind::PipeControl,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            CommandKind::MiNoop => "MI_NOOP",
            CommandKind::MiBatchBufferEnd => "MI_BATCH_BUFFER_END",
            CommandKind::MiMath => "MI_MATH",
            CommandKind::MiStoreDataImm => "MI_STORE_DATA_IMM",
            CommandKind::MiLoadRegisterImm => "MI_LOAD_REGISTER_IMM",
            CommandKind::MiStoreRegisterMem => "MI_STORE_REGISTER_MEM",
            CommandKind::MiReportPerfCount => "MI_REPORT_PERF_COUNT",
            CommandKind::MiLoadRegisterMem => "MI_LOAD_REGISTER_MEM",
            CommandKind::MiLoadRegisterReg => "MI_LOAD_REGISTER_REG",
            CommandKind::MiCopyMemMem => "MI_COPY_MEM_MEM",
            CommandKind::PipeControl => "PIPE_CONTROL",
        }
    }

    pub const fn mi_opcode(self) -> Option<u32> {
        match self {
            CommandKind::MiNoop => Some(MI_NOOP_OPCODE),
            CommandKind::MiBatchBufferEnd => Some(MI_BATCH_BUFFER_END_OPCODE),
            CommandKind::MiMath => Some(MI_MATH_OPCODE),
            CommandKind::MiStoreDataImm => Some(MI_STORE_DATA_IMM_OPCODE),
            CommandKind::MiLoadRegisterImm => Some(MI_LOAD_REGISTER_IMM_OPCODE),
            CommandKind::MiStoreRegisterMem => Some(MI_STORE_REGISTER_MEM_OPCODE),
            CommandKind::MiReportPerfCount => Some(MI_REPORT_PERF_COUNT_OPCODE),
            CommandKind::MiLoadRegisterMem => Some(MI_LOAD_REGISTER_MEM_OPCODE),
            CommandKind::MiLoadRegisterReg => Some(MI_LOAD_REGISTER_REG_OPCODE),
            CommandKind::MiCopyMemMem => Some(MI_COPY_MEM_MEM_OPCODE),
            CommandKind::PipeControl => None,
        }
    }

    pub const fn from_mi_opcode(opcode: u32) -> Option<Self> {
        match opcode {
            MI_NOOP_OPCODE => Some(CommandKind::MiNoop),
            MI_BATCH_BUFFER_END_OPCODE => Some(CommandKind::MiBatchBufferEnd),
            MI_MATH_OPCODE => Some(CommandKind::MiMath),
            MI_STORE_DATA_IMM_OPCODE => Some(CommandKind::MiStoreDataImm),
            MI_LOAD_REGISTER_IMM_OPCODE => Some(CommandKind::MiLoadRegisterImm),
            MI_STORE_REGISTER_MEM_OPCODE => Some(CommandKind::MiStoreRegisterMem),
            MI_REPORT_PERF_COUNT_OPCODE => Some(CommandKind::MiReportPerfCount),
            MI_LOAD_REGISTER_MEM_OPCODE => Some(CommandKind::MiLoadRegisterMem),
            MI_LOAD_REGISTER_REG_OPCODE => Some(CommandKind::MiLoadRegisterReg),
            MI_COPY_MEM_MEM_OPCODE => Some(CommandKind::MiCopyMemMem),
            _ => None,
        }
    }

    /// `(hi, lo)` of the DWordLength field, or `None` for single-dword commands.
    pub const fn length_field(self) -> Option<(u32, u32)> {
        match self {
            CommandKind::MiNoop | CommandKind::MiBatchBufferEnd => None,
            CommandKind::MiReportPerfCount => Some((5, 0)),
            CommandKind::MiStoreDataImm => Some((9, 0)),
            _ => Some((7, 0)),
        }
    }

    /// Dword 0 with the type/opcode bits set and every other field zero.
    pub const fn header_base(self) -> u32 {
        match self.mi_opcode() {
            Some(opcode) => (COMMAND_TYPE_MI << 29) | (opcode << 23),
            None => {
                (COMMAND_TYPE_GFXPIPE << 29)
                    | (PIPE_CONTROL_SUBTYPE << 27)
                    | (PIPE_CONTROL_OPCODE << 24)
                    | (PIPE_CONTROL_SUB_OPCODE << 16)
            }
        }
    }

    /// Dword 0 for a command of `dword_count` total dwords.
    pub const fn header(self, dword_count: usize) -> u32 {
        match self.length_field() {
            None => self.header_base(),
            Some((_, lo)) => self.header_base() | (((dword_count as u32) - 2) << lo),
        }
    }
}

/// Identify the command starting with `dw0` and its total length in dwords.
pub fn classify(dw0: u32) -> Result<(CommandKind, usize)> {
    let kind = match field_get(dw0, 31, 29) {
        COMMAND_TYPE_MI => CommandKind::from_mi_opcode(field_get(dw0, 28, 23)),
        COMMAND_TYPE_GFXPIPE
            if field_get(dw0, 28, 27) == PIPE_CONTROL_SUBTYPE
                && field_get(dw0, 26, 24) == PIPE_CONTROL_OPCODE
                && field_get(dw0, 23, 16) == PIPE_CONTROL_SUB_OPCODE =>
        {
            Some(CommandKind::PipeControl)
        }
        _ => None,
    };
    let kind = kind.ok_or(Error::UnknownCommand { dw0 })?;

    let dwords = match kind.length_field() {
        None => 1,
        Some((hi, lo)) => field_get(dw0, hi, lo) as usize + 2,
    };
    Ok((kind, dwords))
}
