//! Typed, bit-exact command layouts.
//!
//! Each layout is a plain struct with public fields. `Default` is the hardware
//! "Init()" state: header dword populated, every other field zero.

use core::fmt;

use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::header::{classify, CommandKind};

mod mi_flow;
mod mi_math;
mod mi_memory;
mod mi_register;
mod pipe_control;

pub use mi_flow::{MiBatchBufferEnd, MiNoop};
pub use mi_math::{AluInstruction, AluOpcode, AluOperand, MiMath, MI_MATH_MAX_INSTRUCTIONS};
pub use mi_memory::{MiCopyMemMem, MiReportPerfCount, MiStoreDataImm};
pub use mi_register::{MiLoadRegisterImm, MiLoadRegisterMem, MiLoadRegisterReg, MiStoreRegisterMem};
pub use pipe_control::{PipeControl, PipeControlFlags, PostSyncOperation};

/// A command with a fixed hardware layout.
pub trait GpuCommand: Sized {
    const KIND: CommandKind;

    /// Byte size of the layout in its default form.
    const SIZE_BYTES: usize;

    /// Number of dwords this instance encodes to.
    fn dword_count(&self) -> usize {
        Self::SIZE_BYTES / 4
    }

    /// Encode into `out`, which must be exactly [`GpuCommand::dword_count`] long.
    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()>;

    /// Decode from `words`, which must hold exactly one command.
    fn decode(gen: Generation, words: &[u32]) -> Result<Self>;

    fn to_dwords(&self, gen: Generation) -> Result<Vec<u32>> {
        let mut out = vec![0u32; self.dword_count()];
        self.encode(gen, &mut out)?;
        Ok(out)
    }
}

pub(crate) fn check_out_len(kind: CommandKind, out: &[u32], expected: usize) -> Result<()> {
    if out.len() != expected {
        return Err(Error::BadLength {
            kind,
            expected,
            found: out.len(),
        });
    }
    Ok(())
}

/// Validate that `words` holds exactly one command of `kind` and return its length.
pub(crate) fn check_header(kind: CommandKind, words: &[u32]) -> Result<usize> {
    let Some(&dw0) = words.first() else {
        return Err(Error::BadLength {
            kind,
            expected: 1,
            found: 0,
        });
    };
    let (found, dwords) = classify(dw0)?;
    if found != kind {
        return Err(Error::UnexpectedCommand { expected: kind, dw0 });
    }
    if words.len() != dwords {
        return Err(Error::BadLength {
            kind,
            expected: dwords,
            found: words.len(),
        });
    }
    Ok(dwords)
}

/// Like [`check_header`], additionally requiring a fixed length.
pub(crate) fn check_fixed(kind: CommandKind, words: &[u32], expected: usize) -> Result<()> {
    let dwords = check_header(kind, words)?;
    if dwords != expected {
        return Err(Error::BadLength {
            kind,
            expected,
            found: dwords,
        });
    }
    Ok(())
}

/// Any supported command, decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "command", content = "fields"))]
pub enum Command {
    MiNoop(MiNoop),
    MiBatchBufferEnd(MiBatchBufferEnd),
    MiMath(MiMath),
    MiStoreDataImm(MiStoreDataImm),
    MiLoadRegisterImm(MiLoadRegisterImm),
    MiStoreRegisterMem(MiStoreRegisterMem),
    MiReportPerfCount(MiReportPerfCount),
    MiLoadRegisterMem(MiLoadRegisterMem),
    MiLoadRegisterReg(MiLoadRegisterReg),
    MiCopyMemMem(MiCopyMemMem),
    PipeControl(PipeControl),
}

impl Command {
    /// Decode exactly one command.
    pub fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        let dw0 = *words.first().ok_or(Error::EmptyBuffer)?;
        let (kind, _) = classify(dw0)?;
        Ok(match kind {
            CommandKind::MiNoop => Command::MiNoop(MiNoop::decode(gen, words)?),
            CommandKind::MiBatchBufferEnd => Command::MiBatchBufferEnd(MiBatchBufferEnd::decode(gen, words)?),
            CommandKind::MiMath => Command::MiMath(MiMath::decode(gen, words)?),
            CommandKind::MiStoreDataImm => Command::MiStoreDataImm(MiStoreDataImm::decode(gen, words)?),
            CommandKind::MiLoadRegisterImm => Command::MiLoadRegisterImm(MiLoadRegisterImm::decode(gen, words)?),
            CommandKind::MiStoreRegisterMem => Command::MiStoreRegisterMem(MiStoreRegisterMem::decode(gen, words)?),
            CommandKind::MiReportPerfCount => Command::MiReportPerfCount(MiReportPerfCount::decode(gen, words)?),
            CommandKind::MiLoadRegisterMem => Command::MiLoadRegisterMem(MiLoadRegisterMem::decode(gen, words)?),
            CommandKind::MiLoadRegisterReg => Command::MiLoadRegisterReg(MiLoadRegisterReg::decode(gen, words)?),
            CommandKind::MiCopyMemMem => Command::MiCopyMemMem(MiCopyMemMem::decode(gen, words)?),
            CommandKind::PipeControl => Command::PipeControl(PipeControl::decode(gen, words)?),
        })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::MiNoop(_) => CommandKind::MiNoop,
            Command::MiBatchBufferEnd(_) => CommandKind::MiBatchBufferEnd,
            Command::MiMath(_) => CommandKind::MiMath,
            Command::MiStoreDataImm(_) => CommandKind::MiStoreDataImm,
            Command::MiLoadRegisterImm(_) => CommandKind::MiLoadRegisterImm,
            Command::MiStoreRegisterMem(_) => CommandKind::MiStoreRegisterMem,
            Command::MiReportPerfCount(_) => CommandKind::MiReportPerfCount,
            Command::MiLoadRegisterMem(_) => CommandKind::MiLoadRegisterMem,
            Command::MiLoadRegisterReg(_) => CommandKind::MiLoadRegisterReg,
            Command::MiCopyMemMem(_) => CommandKind::MiCopyMemMem,
            Command::PipeControl(_) => CommandKind::PipeControl,
        }
    }

    pub fn encode(&self, gen: Generation) -> Result<Vec<u32>> {
        match self {
            Command::MiNoop(c) => c.to_dwords(gen),
            Command::MiBatchBufferEnd(c) => c.to_dwords(gen),
            Command::MiMath(c) => c.to_dwords(gen),
            Command::MiStoreDataImm(c) => c.to_dwords(gen),
            Command::MiLoadRegisterImm(c) => c.to_dwords(gen),
            Command::MiStoreRegisterMem(c) => c.to_dwords(gen),
            Command::MiReportPerfCount(c) => c.to_dwords(gen),
            Command::MiLoadRegisterMem(c) => c.to_dwords(gen),
            Command::MiLoadRegisterReg(c) => c.to_dwords(gen),
            Command::MiCopyMemMem(c) => c.to_dwords(gen),
            Command::PipeControl(c) => c.to_dwords(gen),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind().mnemonic())?;
        match self {
            Command::MiNoop(c) => {
                if c.identification_number_register_write_enable {
                    write!(f, " id=0x{:x}", c.identification_number)?;
                }
                Ok(())
            }
            Command::MiBatchBufferEnd(_) => Ok(()),
            Command::MiMath(c) => {
                for (i, alu) in c.instructions.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "; " };
                    write!(f, "{sep}{alu}")?;
                }
                Ok(())
            }
            Command::MiStoreDataImm(c) => {
                if c.store_qword {
                    write!(f, " addr=0x{:x} qword=0x{:016x}", c.address, c.data)
                } else {
                    write!(f, " addr=0x{:x} dword=0x{:08x}", c.address, c.data)
                }
            }
            Command::MiLoadRegisterImm(c) => {
                write!(f, " reg=0x{:x} data=0x{:08x}", c.register_offset, c.data)
            }
            Command::MiStoreRegisterMem(c) => {
                write!(f, " reg=0x{:x} addr=0x{:x}", c.register_offset, c.memory_address)
            }
            Command::MiReportPerfCount(c) => {
                write!(f, " addr=0x{:x} report_id=0x{:x}", c.address, c.report_id)
            }
            Command::MiLoadRegisterMem(c) => {
                write!(f, " reg=0x{:x} addr=0x{:x}", c.register_offset, c.memory_address)
            }
            Command::MiLoadRegisterReg(c) => {
                write!(f, " src=0x{:x} dst=0x{:x}", c.source_register, c.destination_register)
            }
            Command::MiCopyMemMem(c) => {
                write!(f, " src=0x{:x} dst=0x{:x}", c.source_address, c.destination_address)
            }
            Command::PipeControl(c) => {
                write!(f, " flags={:?} post_sync={:?}", c.flags, c.post_sync)?;
                if c.post_sync != PostSyncOperation::NoWrite {
                    write!(f, " addr=0x{:x}", c.address)?;
                }
                if c.post_sync == PostSyncOperation::WriteImmediateData {
                    write!(f, " imm=0x{:x}", c.immediate_data)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! impl_from_layout {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Command {
                fn from(value: $ty) -> Self {
                    Command::$ty(value)
                }
            }
        )*
    };
}

impl_from_layout!(
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
);
