//! PIPE_CONTROL: pipeline synchronization, cache flushes, and post-sync writes.

use bitflags::bitflags;

use super::{check_fixed, check_out_len, GpuCommand};
use crate::bits::{decode_address_checked, encode_address, field_get, field_set, gated_flag_get, gated_flag_set};
use crate::error::Result;
use crate::gen::Generation;
use crate::header::CommandKind;

bitflags! {
    /// Single-bit controls in PIPE_CONTROL DW1. The post-sync operation (bits 15:14)
    /// is carried separately in [`PostSyncOperation`].
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct PipeControlFlags: u32 {
        const DEPTH_CACHE_FLUSH = 1 << 0;
        const STALL_AT_PIXEL_SCOREBOARD = 1 << 1;
        const STATE_CACHE_INVALIDATE = 1 << 2;
        const CONSTANT_CACHE_INVALIDATE = 1 << 3;
        const VF_CACHE_INVALIDATE = 1 << 4;
        const DC_FLUSH = 1 << 5;
        const PIPE_CONTROL_FLUSH = 1 << 7;
        const NOTIFY = 1 << 8;
        const INDIRECT_STATE_POINTERS_DISABLE = 1 << 9;
        const TEXTURE_CACHE_INVALIDATE = 1 << 10;
        const INSTRUCTION_CACHE_INVALIDATE = 1 << 11;
        const RENDER_TARGET_CACHE_FLUSH = 1 << 12;
        const DEPTH_STALL = 1 << 13;
        const GENERIC_MEDIA_STATE_CLEAR = 1 << 16;
        const TLB_INVALIDATE = 1 << 18;
        const GLOBAL_SNAPSHOT_COUNT_RESET = 1 << 19;
        const CS_STALL = 1 << 20;
        const STORE_DATA_INDEX = 1 << 21;
        const LRI_POST_SYNC = 1 << 23;
        const DESTINATION_ADDRESS_TYPE = 1 << 24;
        const FLUSH_LLC = 1 << 26;
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PipeControlFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(None)?;
        for (name, _) in self.iter_names() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

const POST_SYNC_HI: u32 = 15;
const POST_SYNC_LO: u32 = 14;

/// DW1 bits 15:14.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PostSyncOperation {
    #[default]
    NoWrite,
    WriteImmediateData,
    WritePsDepthCount,
    WriteTimestamp,
}

impl PostSyncOperation {
    pub const fn bits(self) -> u32 {
        match self {
            PostSyncOperation::NoWrite => 0,
            PostSyncOperation::WriteImmediateData => 1,
            PostSyncOperation::WritePsDepthCount => 2,
            PostSyncOperation::WriteTimestamp => 3,
        }
    }

    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => PostSyncOperation::NoWrite,
            1 => PostSyncOperation::WriteImmediateData,
            2 => PostSyncOperation::WritePsDepthCount,
            _ => PostSyncOperation::WriteTimestamp,
        }
    }

    /// Post-sync writes are 64 bits wide and need a qword aligned address.
    pub const fn align_shift(self) -> u32 {
        match self {
            PostSyncOperation::NoWrite => 2,
            _ => 3,
        }
    }
}

/// PIPE_CONTROL (GFXPIPE 3/2/0), 6 dwords.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PipeControl {
    /// DW0 bit 9, Gen12+.
    pub hdc_pipeline_flush: bool,
    /// DW0 bit 10, XeHPG.
    pub l3_read_only_cache_invalidate: bool,
    /// DW0 bit 11, XeHPG.
    pub untyped_data_port_cache_flush: bool,
    /// DW0 bit 13, XeHPG.
    pub ccs_flush: bool,
    /// DW0 bit 14, XeHPG.
    pub workload_partition_id_offset_enable: bool,
    pub flags: PipeControlFlags,
    pub post_sync: PostSyncOperation,
    pub address: u64,
    pub immediate_data: u64,
}

impl PipeControl {
    /// Command streamer stall followed by a 64-bit timestamp write.
    pub fn timestamp(address: u64) -> Self {
        Self {
            flags: PipeControlFlags::CS_STALL,
            post_sync: PostSyncOperation::WriteTimestamp,
            address,
            ..Default::default()
        }
    }

    /// Command streamer stall without a post-sync write.
    pub fn cs_stall() -> Self {
        Self {
            flags: PipeControlFlags::CS_STALL,
            ..Default::default()
        }
    }
}

impl GpuCommand for PipeControl {
    const KIND: CommandKind = CommandKind::PipeControl;
    const SIZE_BYTES: usize = 24;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 6)?;

        let hdc = gen.has_hdc_pipeline_flush();
        let xehp = gen.has_xehp_pipe_control_flushes();
        let mut dw0 = Self::KIND.header(6);
        dw0 = gated_flag_set(dw0, 9, self.hdc_pipeline_flush, hdc, "hdc_pipeline_flush", gen)?;
        dw0 = gated_flag_set(
            dw0,
            10,
            self.l3_read_only_cache_invalidate,
            xehp,
            "l3_read_only_cache_invalidate",
            gen,
        )?;
        dw0 = gated_flag_set(
            dw0,
            11,
            self.untyped_data_port_cache_flush,
            xehp,
            "untyped_data_port_cache_flush",
            gen,
        )?;
        dw0 = gated_flag_set(dw0, 13, self.ccs_flush, xehp, "ccs_flush", gen)?;
        dw0 = gated_flag_set(
            dw0,
            14,
            self.workload_partition_id_offset_enable,
            xehp,
            "workload_partition_id_offset_enable",
            gen,
        )?;
        out[0] = dw0;

        out[1] = field_set(
            self.flags.bits(),
            POST_SYNC_HI,
            POST_SYNC_LO,
            self.post_sync.bits(),
            "post_sync",
        )?;

        let [lo, hi] = encode_address("address", self.address, self.post_sync.align_shift(), gen.gpu_address_bits())?;
        out[2] = lo;
        out[3] = hi;
        out[4] = self.immediate_data as u32;
        out[5] = (self.immediate_data >> 32) as u32;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 6)?;

        let dw0 = words[0];
        let hdc = gen.has_hdc_pipeline_flush();
        let xehp = gen.has_xehp_pipe_control_flushes();

        let dw1 = words[1];
        let flag_bits = dw1 & !crate::bits::mask(POST_SYNC_HI, POST_SYNC_LO);
        let flags = PipeControlFlags::from_bits_truncate(flag_bits);
        if flags.bits() != flag_bits {
            tracing::warn!(
                "PIPE_CONTROL DW1 has reserved bits set: 0x{:08x}",
                flag_bits & !PipeControlFlags::all().bits()
            );
        }

        let post_sync = PostSyncOperation::from_bits(field_get(dw1, POST_SYNC_HI, POST_SYNC_LO));
        let address = decode_address_checked(
            "address",
            words[2],
            words[3],
            2,
            post_sync.align_shift(),
            gen.gpu_address_bits(),
        )?;

        Ok(Self {
            hdc_pipeline_flush: gated_flag_get(dw0, 9, hdc, "hdc_pipeline_flush", gen),
            l3_read_only_cache_invalidate: gated_flag_get(dw0, 10, xehp, "l3_read_only_cache_invalidate", gen),
            untyped_data_port_cache_flush: gated_flag_get(dw0, 11, xehp, "untyped_data_port_cache_flush", gen),
            ccs_flush: gated_flag_get(dw0, 13, xehp, "ccs_flush", gen),
            workload_partition_id_offset_enable: gated_flag_get(
                dw0,
                14,
                xehp,
                "workload_partition_id_offset_enable",
                gen,
            ),
            flags,
            post_sync,
            address,
            immediate_data: u64::from(words[4]) | (u64::from(words[5]) << 32),
        })
    }
}

const _: () = assert!(PipeControl::SIZE_BYTES == 24);
