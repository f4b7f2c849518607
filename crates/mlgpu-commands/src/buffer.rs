//! Command buffer writers.
//!
//! Sequences are written against [`CommandSink`] so the same code can first run
//! against a [`SizeCalculator`] (to size the buffer) and then against a
//! [`CommandBuffer`] (to fill it).

use crate::commands::{
    GpuCommand, MiBatchBufferEnd, MiCopyMemMem, MiLoadRegisterImm, MiLoadRegisterMem, MiLoadRegisterReg, MiMath,
    MiNoop, MiReportPerfCount, MiStoreDataImm, MiStoreRegisterMem, PipeControl,
};
use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::stream::dwords_to_le_bytes;

pub trait CommandSink {
    fn generation(&self) -> Generation;

    /// Append one command.
    fn emit<C: GpuCommand>(&mut self, cmd: &C) -> Result<()>;

    fn noop(&mut self) -> Result<()> {
        self.emit(&MiNoop::default())
    }

    fn batch_buffer_end(&mut self) -> Result<()> {
        self.emit(&MiBatchBufferEnd::default())
    }

    fn load_register_imm(&mut self, register_offset: u32, data: u32) -> Result<()> {
        self.emit(&MiLoadRegisterImm {
            register_offset,
            data,
            ..Default::default()
        })
    }

    fn load_register_reg(&mut self, source_register: u32, destination_register: u32) -> Result<()> {
        self.emit(&MiLoadRegisterReg {
            source_register,
            destination_register,
            ..Default::default()
        })
    }

    fn load_register_mem(&mut self, register_offset: u32, memory_address: u64) -> Result<()> {
        self.emit(&MiLoadRegisterMem {
            register_offset,
            memory_address,
            ..Default::default()
        })
    }

    fn store_register_mem(&mut self, register_offset: u32, memory_address: u64) -> Result<()> {
        self.emit(&MiStoreRegisterMem {
            register_offset,
            memory_address,
            ..Default::default()
        })
    }

    fn store_data_imm_dword(&mut self, address: u64, data: u32) -> Result<()> {
        self.emit(&MiStoreDataImm::dword(address, data))
    }

    fn store_data_imm_qword(&mut self, address: u64, data: u64) -> Result<()> {
        self.emit(&MiStoreDataImm::qword(address, data))
    }

    fn copy_mem_mem(&mut self, destination_address: u64, source_address: u64) -> Result<()> {
        self.emit(&MiCopyMemMem {
            destination_address,
            source_address,
            ..Default::default()
        })
    }

    fn report_perf_count(&mut self, address: u64, report_id: u32) -> Result<()> {
        self.emit(&MiReportPerfCount {
            address,
            report_id,
            ..Default::default()
        })
    }

    fn pipe_control(&mut self, pipe_control: &PipeControl) -> Result<()> {
        self.emit(pipe_control)
    }

    fn math(&mut self, math: &MiMath) -> Result<()> {
        self.emit(math)
    }
}

/// Accumulates the byte size of everything emitted without encoding it.
#[derive(Clone, Copy, Debug)]
pub struct SizeCalculator {
    gen: Generation,
    bytes: usize,
}

impl SizeCalculator {
    pub fn new(gen: Generation) -> Self {
        Self { gen, bytes: 0 }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes
    }
}

impl CommandSink for SizeCalculator {
    fn generation(&self) -> Generation {
        self.gen
    }

    fn emit<C: GpuCommand>(&mut self, cmd: &C) -> Result<()> {
        self.bytes += cmd.dword_count() * 4;
        Ok(())
    }
}

/// Encodes commands into a dword buffer.
///
/// A buffer created with [`CommandBuffer::with_limit`] refuses commands that do
/// not fit and is left unchanged by the failed emit.
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    gen: Generation,
    words: Vec<u32>,
    limit_bytes: Option<usize>,
}

impl CommandBuffer {
    pub fn new(gen: Generation) -> Self {
        Self {
            gen,
            words: Vec::new(),
            limit_bytes: None,
        }
    }

    pub fn with_limit(gen: Generation, limit_bytes: usize) -> Self {
        Self {
            gen,
            words: Vec::with_capacity(limit_bytes / 4),
            limit_bytes: Some(limit_bytes),
        }
    }

    pub fn as_dwords(&self) -> &[u32] {
        &self.words
    }

    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Bytes still available, or `None` for a growable buffer.
    pub fn remaining_bytes(&self) -> Option<usize> {
        self.limit_bytes.map(|limit| limit.saturating_sub(self.len_bytes()))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        dwords_to_le_bytes(&self.words)
    }

    pub fn reset(&mut self) {
        self.words.clear();
    }

    /// Pad with `MI_NOOP` until the length is a multiple of 8 bytes.
    pub fn pad_to_qword(&mut self) -> Result<()> {
        if self.words.len() % 2 != 0 {
            self.noop()?;
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<u32> {
        self.words
    }

    fn reserve_checked(&self, bytes: usize) -> Result<()> {
        if let Some(available) = self.remaining_bytes() {
            if bytes > available {
                tracing::debug!(needed = bytes, available, "command buffer limit reached");
                return Err(Error::InsufficientSpace {
                    needed: bytes,
                    available,
                });
            }
        }
        Ok(())
    }
}

impl CommandSink for CommandBuffer {
    fn generation(&self) -> Generation {
        self.gen
    }

    fn emit<C: GpuCommand>(&mut self, cmd: &C) -> Result<()> {
        let dwords = cmd.dword_count();
        self.reserve_checked(dwords * 4)?;

        let start = self.words.len();
        self.words.resize(start + dwords, 0);
        if let Err(err) = cmd.encode(self.gen, &mut self.words[start..]) {
            self.words.truncate(start);
            return Err(err);
        }
        tracing::trace!(kind = ?C::KIND, offset = start, dwords, "emitted command");
        Ok(())
    }
}
