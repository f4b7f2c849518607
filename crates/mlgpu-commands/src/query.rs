//! Performance query command sequences and report parsing.
//!
//! A query is a pair of command sequences placed around the workload being
//! measured. Both sequences write into a caller-provided report buffer in GPU
//! memory; the end sequence finishes by storing [`QUERY_END_TAG`] so the CPU can
//! tell a complete report from one that is still in flight.
//!
//! Hardware counters report layout (`R` = OA report size, `n` = user registers):
//!
//! ```text
//! 0                 begin OA report (R bytes)
//! R                 end OA report (R bytes)
//! 2R                begin user register values (4n bytes)
//! 2R + 4n           end user register values (4n bytes)
//! align8(2R + 8n)   end tag (8 bytes)
//! ```

use crate::buffer::{CommandSink, SizeCalculator};
use crate::commands::PipeControl;
use crate::error::{Error, Result};
use crate::gen::Generation;

/// Written last by every end sequence.
pub const QUERY_END_TAG: u64 = 0x4D4C_5155_4552_5944;

pub const MAX_USER_REGISTERS: usize = 16;

/// Dword offsets inside an OA report.
pub const OA_REPORT_ID_DWORD: usize = 0;
pub const OA_TIMESTAMP_DWORD: usize = 1;
pub const OA_CONTEXT_ID_DWORD: usize = 2;
pub const OA_GPU_TICKS_DWORD: usize = 3;

/// A begin/end command sequence pair.
pub trait Query {
    fn write_begin<S: CommandSink>(&self, sink: &mut S) -> Result<()>;

    fn write_end<S: CommandSink>(&self, sink: &mut S) -> Result<()>;

    /// Bytes needed for the begin and end sequences together.
    fn command_buffer_size(&self, gen: Generation) -> Result<usize> {
        let mut calc = SizeCalculator::new(gen);
        self.write_begin(&mut calc)?;
        self.write_end(&mut calc)?;
        Ok(calc.size_bytes())
    }
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.saturating_add(N);
    let src = bytes.get(offset..end).ok_or(Error::ReportTooSmall {
        needed: end,
        found: bytes.len(),
    })?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(src);
    Ok(raw)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    read_array(bytes, offset).map(u32::from_le_bytes)
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    read_array(bytes, offset).map(u64::from_le_bytes)
}

fn check_report_len(bytes: &[u8], needed: usize) -> Result<()> {
    if bytes.len() < needed {
        return Err(Error::ReportTooSmall {
            needed,
            found: bytes.len(),
        });
    }
    Ok(())
}

fn check_end_tag(bytes: &[u8], offset: usize) -> Result<()> {
    let found = read_u64(bytes, offset)?;
    if found != QUERY_END_TAG {
        return Err(Error::ReportNotReady { found });
    }
    Ok(())
}

/// Convert timestamp ticks to nanoseconds.
pub fn ticks_to_ns(ticks: u64, frequency_hz: u64) -> u64 {
    if frequency_hz == 0 {
        return 0;
    }
    (u128::from(ticks) * 1_000_000_000 / u128::from(frequency_hz)) as u64
}

/// Begin and end command streamer timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineTimestampsQuery {
    /// 8-byte aligned GPU address of the 24-byte report.
    pub report_address: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PipelineTimestampsResult {
    pub begin: u64,
    pub end: u64,
    pub timestamp_delta: u64,
    pub timestamp_ns: u64,
}

impl PipelineTimestampsQuery {
    pub const REPORT_SIZE_BYTES: usize = 24;
    const BEGIN_OFFSET: u64 = 0;
    const END_OFFSET: u64 = 8;
    const TAG_OFFSET: u64 = 16;

    pub fn new(report_address: u64) -> Self {
        Self { report_address }
    }

    /// Parse a report read back from GPU memory.
    ///
    /// `frequency_hz` overrides the generation's default timestamp frequency.
    pub fn parse_report(
        &self,
        gen: Generation,
        bytes: &[u8],
        frequency_hz: Option<u64>,
    ) -> Result<PipelineTimestampsResult> {
        check_report_len(bytes, Self::REPORT_SIZE_BYTES)?;
        check_end_tag(bytes, Self::TAG_OFFSET as usize)?;

        let begin = read_u64(bytes, Self::BEGIN_OFFSET as usize)?;
        let end = read_u64(bytes, Self::END_OFFSET as usize)?;
        let timestamp_delta = end.wrapping_sub(begin);
        Ok(PipelineTimestampsResult {
            begin,
            end,
            timestamp_delta,
            timestamp_ns: ticks_to_ns(timestamp_delta, frequency_hz.unwrap_or(gen.timestamp_frequency_hz())),
        })
    }
}

impl Query for PipelineTimestampsQuery {
    fn write_begin<S: CommandSink>(&self, sink: &mut S) -> Result<()> {
        sink.pipe_control(&PipeControl::timestamp(self.report_address + Self::BEGIN_OFFSET))
    }

    fn write_end<S: CommandSink>(&self, sink: &mut S) -> Result<()> {
        sink.pipe_control(&PipeControl::timestamp(self.report_address + Self::END_OFFSET))?;
        sink.store_data_imm_qword(self.report_address + Self::TAG_OFFSET, QUERY_END_TAG)
    }
}

/// Byte offsets of each region in a hardware counters report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HwCountersReportLayout {
    pub oa_report_size: usize,
    pub begin_oa_report: usize,
    pub end_oa_report: usize,
    pub begin_user_registers: usize,
    pub end_user_registers: usize,
    pub end_tag: usize,
    pub total_size: usize,
}

impl HwCountersReportLayout {
    pub fn new(gen: Generation, user_register_count: usize) -> Result<Self> {
        if user_register_count > MAX_USER_REGISTERS {
            return Err(Error::TooManyRegisters {
                count: user_register_count,
                max: MAX_USER_REGISTERS,
            });
        }
        let r = gen.oa_report_size_bytes();
        let registers = 4 * user_register_count;
        let end_tag = (2 * r + 2 * registers + 7) & !7;
        Ok(Self {
            oa_report_size: r,
            begin_oa_report: 0,
            end_oa_report: r,
            begin_user_registers: 2 * r,
            end_user_registers: 2 * r + registers,
            end_tag,
            total_size: end_tag + 8,
        })
    }
}

/// OA counter snapshots plus optional user registers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HwCountersQuery {
    /// 64-byte aligned GPU address of the report.
    pub report_address: u64,
    /// Stored in the begin OA report; the end report uses `report_id + 1`.
    pub report_id: u32,
    /// MMIO registers sampled alongside the OA reports.
    pub user_registers: Vec<u32>,
}

/// Fields read from the start of an OA report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OaReportHeader {
    pub report_id: u32,
    pub timestamp: u32,
    pub context_id: u32,
    pub gpu_ticks: u32,
}

impl OaReportHeader {
    pub const SIZE_BYTES: usize = 16;

    /// Read the header from the start of `bytes`, which must hold at least
    /// [`OaReportHeader::SIZE_BYTES`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_report_len(bytes, Self::SIZE_BYTES)?;
        Ok(Self {
            report_id: read_u32(bytes, OA_REPORT_ID_DWORD * 4)?,
            timestamp: read_u32(bytes, OA_TIMESTAMP_DWORD * 4)?,
            context_id: read_u32(bytes, OA_CONTEXT_ID_DWORD * 4)?,
            gpu_ticks: read_u32(bytes, OA_GPU_TICKS_DWORD * 4)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let mut out = [0u8; Self::SIZE_BYTES];
        out[0..4].copy_from_slice(&self.report_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..12].copy_from_slice(&self.context_id.to_le_bytes());
        out[12..16].copy_from_slice(&self.gpu_ticks.to_le_bytes());
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HwCountersResult {
    pub begin: OaReportHeader,
    pub end: OaReportHeader,
    pub context_id: u32,
    /// Wrap-aware difference of the 32-bit OA timestamps.
    pub timestamp_delta: u64,
    pub timestamp_ns: u64,
    pub gpu_ticks_delta: u64,
    pub user_register_deltas: Vec<u32>,
}

impl HwCountersQuery {
    pub fn new(report_address: u64, report_id: u32) -> Self {
        Self {
            report_address,
            report_id,
            user_registers: Vec::new(),
        }
    }

    pub fn with_user_registers(mut self, registers: impl IntoIterator<Item = u32>) -> Self {
        self.user_registers.extend(registers);
        self
    }

    pub fn layout(&self, gen: Generation) -> Result<HwCountersReportLayout> {
        HwCountersReportLayout::new(gen, self.user_registers.len())
    }

    fn end_report_id(&self) -> u32 {
        self.report_id.wrapping_add(1)
    }

    fn write_snapshot<S: CommandSink>(&self, sink: &mut S, oa_offset: usize, id: u32, regs_offset: usize) -> Result<()> {
        sink.pipe_control(&PipeControl::cs_stall())?;
        sink.report_perf_count(self.report_address + oa_offset as u64, id)?;
        for (i, &register) in self.user_registers.iter().enumerate() {
            let address = self.report_address + (regs_offset + 4 * i) as u64;
            sink.store_register_mem(register, address)?;
        }
        Ok(())
    }

    pub fn parse_report(&self, gen: Generation, bytes: &[u8], frequency_hz: Option<u64>) -> Result<HwCountersResult> {
        let layout = self.layout(gen)?;
        check_report_len(bytes, layout.total_size)?;
        check_end_tag(bytes, layout.end_tag)?;

        let begin = OaReportHeader::from_bytes(&bytes[layout.begin_oa_report..])?;
        let end = OaReportHeader::from_bytes(&bytes[layout.end_oa_report..])?;
        if begin.report_id != self.report_id {
            return Err(Error::ReportInconsistent("begin OA report id mismatch"));
        }
        if end.report_id != self.end_report_id() {
            return Err(Error::ReportInconsistent("end OA report id mismatch"));
        }
        if begin.context_id != end.context_id {
            return Err(Error::ReportInconsistent("context id changed between begin and end"));
        }

        let user_register_deltas = (0..self.user_registers.len())
            .map(|i| {
                let b = read_u32(bytes, layout.begin_user_registers + 4 * i)?;
                let e = read_u32(bytes, layout.end_user_registers + 4 * i)?;
                Ok(e.wrapping_sub(b))
            })
            .collect::<Result<Vec<_>>>()?;

        let timestamp_delta = u64::from(end.timestamp.wrapping_sub(begin.timestamp));
        Ok(HwCountersResult {
            begin,
            end,
            context_id: begin.context_id,
            timestamp_delta,
            timestamp_ns: ticks_to_ns(timestamp_delta, frequency_hz.unwrap_or(gen.timestamp_frequency_hz())),
            gpu_ticks_delta: u64::from(end.gpu_ticks.wrapping_sub(begin.gpu_ticks)),
            user_register_deltas,
        })
    }
}

impl Query for HwCountersQuery {
    fn write_begin<S: CommandSink>(&self, sink: &mut S) -> Result<()> {
        let layout = self.layout(sink.generation())?;
        self.write_snapshot(
            sink,
            layout.begin_oa_report,
            self.report_id,
            layout.begin_user_registers,
        )
    }

    fn write_end<S: CommandSink>(&self, sink: &mut S) -> Result<()> {
        let layout = self.layout(sink.generation())?;
        self.write_snapshot(
            sink,
            layout.end_oa_report,
            self.end_report_id(),
            layout.end_user_registers,
        )?;
        sink.store_data_imm_qword(self.report_address + layout.end_tag as u64, QUERY_END_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_aligns_end_tag() {
        let layout = HwCountersReportLayout::new(Generation::Gen12, 3).unwrap();
        assert_eq!(layout.begin_user_registers, 512);
        assert_eq!(layout.end_user_registers, 524);
        assert_eq!(layout.end_tag, 536);
        assert_eq!(layout.total_size, 544);

        let empty = HwCountersReportLayout::new(Generation::Gen9, 0).unwrap();
        assert_eq!(empty.end_tag, 512);
        assert!(matches!(
            HwCountersReportLayout::new(Generation::Gen9, 17),
            Err(Error::TooManyRegisters { count: 17, max: 16 })
        ));
    }

    #[test]
    fn command_buffer_sizes() {
        let ts = PipelineTimestampsQuery::new(0x1000);
        // Two PIPE_CONTROLs and one qword MI_STORE_DATA_IMM.
        assert_eq!(ts.command_buffer_size(Generation::Gen9).unwrap(), 24 + 24 + 20);

        let hw = HwCountersQuery::new(0x10000, 7).with_user_registers([0x2358, 0x2600]);
        // Per snapshot: PIPE_CONTROL + RPC + 2 SRM; end adds the tag.
        let snapshot = 24 + 16 + 2 * 16;
        assert_eq!(hw.command_buffer_size(Generation::Gen12).unwrap(), 2 * snapshot + 20);
    }

    #[test]
    fn missing_tag_is_not_ready() {
        let bytes = [0u8; PipelineTimestampsQuery::REPORT_SIZE_BYTES];
        assert_eq!(
            PipelineTimestampsQuery::new(0).parse_report(Generation::Gen9, &bytes, None),
            Err(Error::ReportNotReady { found: 0 })
        );
        assert!(matches!(
            PipelineTimestampsQuery::new(0).parse_report(Generation::Gen9, &bytes[..8], None),
            Err(Error::ReportTooSmall { needed: 24, found: 8 })
        ));
    }

    #[test]
    fn oa_header_rejects_short_buffers() {
        assert_eq!(
            OaReportHeader::from_bytes(&[0u8; 8]),
            Err(Error::ReportTooSmall { needed: 16, found: 8 })
        );
        let header = OaReportHeader {
            report_id: 7,
            timestamp: 0x100,
            context_id: 1,
            gpu_ticks: 0x250,
        };
        assert_eq!(OaReportHeader::from_bytes(&header.to_bytes()), Ok(header));
    }

    #[test]
    fn ticks_convert_without_overflow() {
        assert_eq!(ticks_to_ns(12_000_000, 12_000_000), 1_000_000_000);
        assert_eq!(ticks_to_ns(192, 19_200_000), 10_000);
        assert_eq!(ticks_to_ns(u64::MAX, 1_000_000_000), u64::MAX);
    }
}
