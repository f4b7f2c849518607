//! Software command streamer.
//!
//! Interprets decoded command streams against a register file and a
//! [`GpuMemory`] implementation. Timing is synthetic: every executed command
//! advances the timestamp and GPU ticks counters by a fixed amount, which is
//! enough to check that query sequences produce well-formed reports.

use std::collections::HashMap;

use crate::commands::{
    AluInstruction, AluOpcode, AluOperand, Command, MiLoadRegisterImm, MiMath, PipeControl, PipeControlFlags,
    PostSyncOperation,
};
use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::query::OaReportHeader;
use crate::registers::{cs_gpr, cs_gpr_udw, GPU_TICKS, RCS_TIMESTAMP, RCS_TIMESTAMP_UDW};
use crate::stream::CommandIter;

/// GPU virtual memory as seen by the command streamer.
pub trait GpuMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<()>;
    fn write(&mut self, address: u64, src: &[u8]) -> Result<()>;

    fn read_u32(&self, address: u64) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read(address, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read(address, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    fn write_u32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }

    fn write_u64(&mut self, address: u64, value: u64) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }
}

const PAGE_SIZE: u64 = 4096;

/// Page-granular sparse memory. Unwritten memory reads as zero.
#[derive(Clone, Debug, Default)]
pub struct SparseMemory {
    pages: HashMap<u64, Box<[u8]>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages that have been written.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Convenience for tests and tools: read `len` bytes into a new vector.
    pub fn read_vec(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read(address, &mut out)?;
        Ok(out)
    }

    fn check_range(address: u64, len: usize) -> Result<()> {
        address
            .checked_add(len as u64)
            .map(|_| ())
            .ok_or(Error::Memory { address, len })
    }
}

impl GpuMemory for SparseMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<()> {
        Self::check_range(address, dst.len())?;
        let mut done = 0;
        while done < dst.len() {
            let addr = address + done as u64;
            let page = addr / PAGE_SIZE;
            let in_page = (addr % PAGE_SIZE) as usize;
            let chunk = (PAGE_SIZE as usize - in_page).min(dst.len() - done);
            match self.pages.get(&page) {
                Some(data) => dst[done..done + chunk].copy_from_slice(&data[in_page..in_page + chunk]),
                None => dst[done..done + chunk].fill(0),
            }
            done += chunk;
        }
        Ok(())
    }

    fn write(&mut self, address: u64, src: &[u8]) -> Result<()> {
        Self::check_range(address, src.len())?;
        let mut done = 0;
        while done < src.len() {
            let addr = address + done as u64;
            let page = addr / PAGE_SIZE;
            let in_page = (addr % PAGE_SIZE) as usize;
            let chunk = (PAGE_SIZE as usize - in_page).min(src.len() - done);
            let data = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize].into_boxed_slice());
            data[in_page..in_page + chunk].copy_from_slice(&src[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Timestamp ticks added after each command.
    pub ticks_per_command: u64,
    /// GPU ticks added after each command.
    pub gpu_ticks_per_command: u64,
    /// Reported in OA reports.
    pub context_id: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ticks_per_command: 10,
            gpu_ticks_per_command: 25,
            context_id: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub commands_executed: usize,
    pub reached_batch_buffer_end: bool,
}

#[derive(Clone, Debug)]
pub struct SoftwareExecutor {
    gen: Generation,
    config: ExecutorConfig,
    registers: HashMap<u32, u32>,
    timestamp: u64,
    gpu_ticks: u64,
}

/// ALU-internal registers for one MI_MATH program.
#[derive(Default)]
struct AluState {
    src_a: u64,
    src_b: u64,
    accu: u64,
    zf: u64,
    cf: u64,
}

fn flag(value: bool) -> u64 {
    if value {
        !0
    } else {
        0
    }
}

impl SoftwareExecutor {
    pub fn new(gen: Generation) -> Self {
        Self::with_config(gen, ExecutorConfig::default())
    }

    pub fn with_config(gen: Generation, config: ExecutorConfig) -> Self {
        Self {
            gen,
            config,
            registers: HashMap::new(),
            timestamp: 0,
            gpu_ticks: 0,
        }
    }

    pub fn generation(&self) -> Generation {
        self.gen
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn gpu_ticks(&self) -> u64 {
        self.gpu_ticks
    }

    /// Advance both clocks as if `commands` commands had run.
    pub fn advance_clock(&mut self, commands: u64) {
        self.timestamp = self
            .timestamp
            .wrapping_add(commands.wrapping_mul(self.config.ticks_per_command));
        self.gpu_ticks = self
            .gpu_ticks
            .wrapping_add(commands.wrapping_mul(self.config.gpu_ticks_per_command));
    }

    pub fn register(&self, offset: u32) -> u32 {
        match offset {
            RCS_TIMESTAMP => self.timestamp as u32,
            RCS_TIMESTAMP_UDW => (self.timestamp >> 32) as u32,
            GPU_TICKS => self.gpu_ticks as u32,
            _ => self.registers.get(&offset).copied().unwrap_or(0),
        }
    }

    pub fn set_register(&mut self, offset: u32, value: u32) {
        self.registers.insert(offset, value);
    }

    pub fn gpr(&self, n: u32) -> Result<u64> {
        let lo = self.register(cs_gpr(n)?);
        let hi = self.register(cs_gpr_udw(n)?);
        Ok(u64::from(lo) | (u64::from(hi) << 32))
    }

    pub fn set_gpr(&mut self, n: u32, value: u64) -> Result<()> {
        self.set_register(cs_gpr(n)?, value as u32);
        self.set_register(cs_gpr_udw(n)?, (value >> 32) as u32);
        Ok(())
    }

    /// Run `words` until `MI_BATCH_BUFFER_END` or the end of the slice.
    pub fn execute(&mut self, words: &[u32], memory: &mut dyn GpuMemory) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        for raw in CommandIter::new(self.gen, words) {
            let raw = raw?;
            let command = raw.decode()?;
            self.execute_command(&command, memory)?;
            report.commands_executed += 1;
            self.advance_clock(1);
            if matches!(command, Command::MiBatchBufferEnd(_)) {
                report.reached_batch_buffer_end = true;
            }
        }
        tracing::debug!(
            commands = report.commands_executed,
            reached_batch_buffer_end = report.reached_batch_buffer_end,
            timestamp = self.timestamp,
            "software executor stopped"
        );
        Ok(report)
    }

    pub fn execute_command(&mut self, command: &Command, memory: &mut dyn GpuMemory) -> Result<()> {
        tracing::trace!(%command, "execute");
        match command {
            Command::MiNoop(_) | Command::MiBatchBufferEnd(_) => Ok(()),
            Command::MiLoadRegisterImm(c) => {
                self.load_register_imm(c);
                Ok(())
            }
            Command::MiLoadRegisterReg(c) => {
                let value = self.register(c.source_register);
                self.set_register(c.destination_register, value);
                Ok(())
            }
            Command::MiLoadRegisterMem(c) => {
                let value = memory.read_u32(c.memory_address)?;
                self.set_register(c.register_offset, value);
                Ok(())
            }
            Command::MiStoreRegisterMem(c) => memory.write_u32(c.memory_address, self.register(c.register_offset)),
            Command::MiStoreDataImm(c) => {
                if c.store_qword {
                    memory.write_u64(c.address, c.data)
                } else {
                    memory.write_u32(c.address, c.data as u32)
                }
            }
            Command::MiCopyMemMem(c) => {
                let value = memory.read_u32(c.source_address)?;
                memory.write_u32(c.destination_address, value)
            }
            Command::MiReportPerfCount(c) => {
                let mut report = vec![0u8; self.gen.oa_report_size_bytes()];
                let header = OaReportHeader {
                    report_id: c.report_id,
                    timestamp: self.timestamp as u32,
                    context_id: self.config.context_id,
                    gpu_ticks: self.gpu_ticks as u32,
                };
                report[..OaReportHeader::SIZE_BYTES].copy_from_slice(&header.to_bytes());
                memory.write(c.address, &report)
            }
            Command::PipeControl(c) => self.pipe_control(c, memory),
            Command::MiMath(c) => self.math(c),
        }
    }

    fn load_register_imm(&mut self, c: &MiLoadRegisterImm) {
        let mut keep = 0u32;
        for lane in 0..4 {
            if c.byte_write_disables & (1 << lane) != 0 {
                keep |= 0xFF << (8 * lane);
            }
        }
        let old = self.register(c.register_offset);
        self.set_register(c.register_offset, (old & keep) | (c.data & !keep));
    }

    fn pipe_control(&mut self, c: &PipeControl, memory: &mut dyn GpuMemory) -> Result<()> {
        let value = match c.post_sync {
            PostSyncOperation::NoWrite => return Ok(()),
            PostSyncOperation::WriteImmediateData => c.immediate_data,
            // No rasterization happens here.
            PostSyncOperation::WritePsDepthCount => 0,
            PostSyncOperation::WriteTimestamp => self.timestamp,
        };
        if c.flags.contains(PipeControlFlags::STORE_DATA_INDEX) {
            return Err(Error::UnsupportedByExecutor("PIPE_CONTROL store data index"));
        }
        memory.write_u64(c.address, value)
    }

    fn math(&mut self, c: &MiMath) -> Result<()> {
        let mut alu = AluState::default();
        for &inst in &c.instructions {
            self.alu_step(&mut alu, inst)?;
        }
        Ok(())
    }

    fn read_operand(&self, alu: &AluState, operand: AluOperand) -> Result<u64> {
        Ok(match operand {
            AluOperand::Gpr(n) => self.gpr(u32::from(n))?,
            AluOperand::SrcA => alu.src_a,
            AluOperand::SrcB => alu.src_b,
            AluOperand::Accu => alu.accu,
            AluOperand::Zf => alu.zf,
            AluOperand::Cf => alu.cf,
        })
    }

    fn write_operand(&mut self, alu: &mut AluState, operand: AluOperand, value: u64) -> Result<()> {
        match operand {
            AluOperand::Gpr(n) => self.set_gpr(u32::from(n), value)?,
            AluOperand::SrcA => alu.src_a = value,
            AluOperand::SrcB => alu.src_b = value,
            AluOperand::Accu => alu.accu = value,
            AluOperand::Zf => alu.zf = value,
            AluOperand::Cf => alu.cf = value,
        }
        Ok(())
    }

    fn alu_step(&mut self, alu: &mut AluState, inst: AluInstruction) -> Result<()> {
        let (a, b) = (alu.src_a, alu.src_b);
        match inst.opcode {
            AluOpcode::Noop => {}
            AluOpcode::Load => {
                let value = self.read_operand(alu, inst.operand2)?;
                self.write_operand(alu, inst.operand1, value)?;
            }
            AluOpcode::LoadInv => {
                let value = self.read_operand(alu, inst.operand2)?;
                self.write_operand(alu, inst.operand1, !value)?;
            }
            AluOpcode::Load0 => self.write_operand(alu, inst.operand1, 0)?,
            // Inverted LOAD0.
            AluOpcode::Load1 => self.write_operand(alu, inst.operand1, !0)?,
            AluOpcode::Add => {
                let (sum, carry) = a.overflowing_add(b);
                alu.accu = sum;
                alu.cf = flag(carry);
                alu.zf = flag(sum == 0);
            }
            AluOpcode::Sub => {
                let (diff, borrow) = a.overflowing_sub(b);
                alu.accu = diff;
                alu.cf = flag(borrow);
                alu.zf = flag(diff == 0);
            }
            AluOpcode::And | AluOpcode::Or | AluOpcode::Xor => {
                let value = match inst.opcode {
                    AluOpcode::And => a & b,
                    AluOpcode::Or => a | b,
                    _ => a ^ b,
                };
                alu.accu = value;
                alu.cf = 0;
                alu.zf = flag(value == 0);
            }
            AluOpcode::Store => {
                let value = self.read_operand(alu, inst.operand2)?;
                self.write_operand(alu, inst.operand1, value)?;
            }
            AluOpcode::StoreInv => {
                let value = self.read_operand(alu, inst.operand2)?;
                self.write_operand(alu, inst.operand1, !value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{CommandBuffer, CommandSink};

    #[test]
    fn sparse_memory_spans_pages() {
        let mut mem = SparseMemory::new();
        mem.write(PAGE_SIZE - 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mem.resident_pages(), 2);
        assert_eq!(mem.read_vec(PAGE_SIZE - 4, 8).unwrap(), vec![0, 0, 1, 2, 3, 4, 0, 0]);
        assert_eq!(
            mem.read_u32(u64::MAX - 1),
            Err(Error::Memory {
                address: u64::MAX - 1,
                len: 4
            })
        );
    }

    #[test]
    fn lri_honors_byte_write_disables() {
        let mut exec = SoftwareExecutor::new(Generation::Gen12);
        exec.set_register(0x2600, 0xAABB_CCDD);
        let lri = MiLoadRegisterImm {
            byte_write_disables: 0b0101,
            register_offset: 0x2600,
            data: 0x1122_3344,
            ..Default::default()
        };
        exec.execute_command(&lri.into(), &mut SparseMemory::new()).unwrap();
        assert_eq!(exec.register(0x2600), 0x11BB_33DD);
    }

    #[test]
    fn math_sub_sets_borrow() {
        let gen = Generation::Gen12;
        let mut buf = CommandBuffer::new(gen);
        buf.math(&MiMath::sub(2, 0, 1)).unwrap();
        buf.batch_buffer_end().unwrap();

        let mut exec = SoftwareExecutor::new(gen);
        exec.set_gpr(0, 5).unwrap();
        exec.set_gpr(1, 7).unwrap();
        let report = exec.execute(buf.as_dwords(), &mut SparseMemory::new()).unwrap();
        assert_eq!(report.commands_executed, 2);
        assert!(report.reached_batch_buffer_end);
        assert_eq!(exec.gpr(2).unwrap(), (-2i64) as u64);
        assert_eq!(exec.register(cs_gpr(2).unwrap()), 0xFFFF_FFFE);
    }

    #[test]
    fn store_data_index_is_unsupported() {
        let pc = PipeControl {
            flags: PipeControlFlags::STORE_DATA_INDEX,
            post_sync: PostSyncOperation::WriteImmediateData,
            ..Default::default()
        };
        let err = SoftwareExecutor::new(Generation::Gen9)
            .execute_command(&pc.into(), &mut SparseMemory::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedByExecutor(_)));
    }
}
