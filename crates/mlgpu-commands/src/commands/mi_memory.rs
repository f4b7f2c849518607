//! Memory write commands: MI_STORE_DATA_IMM, MI_COPY_MEM_MEM, MI_REPORT_PERF_COUNT.

use super::{check_fixed, check_header, check_out_len, GpuCommand};
use crate::bits::{decode_address_checked, encode_address, field_get, flag_get, flag_set};
use crate::error::{Error, Result};
use crate::gen::Generation;
use crate::header::CommandKind;

/// MI_STORE_DATA_IMM.
///
/// The dword form is 4 dwords (DWordLength 2); the qword form is 5 dwords
/// (DWordLength 3) with the Store Qword bit set and an 8-byte aligned address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiStoreDataImm {
    pub use_global_gtt: bool,
    pub store_qword: bool,
    pub core_mode_enable: bool,
    pub address: u64,
    /// Only the low dword is used unless `store_qword` is set.
    pub data: u64,
}

impl MiStoreDataImm {
    pub fn dword(address: u64, data: u32) -> Self {
        Self {
            address,
            data: u64::from(data),
            ..Default::default()
        }
    }

    pub fn qword(address: u64, data: u64) -> Self {
        Self {
            store_qword: true,
            address,
            data,
            ..Default::default()
        }
    }
}

impl GpuCommand for MiStoreDataImm {
    const KIND: CommandKind = CommandKind::MiStoreDataImm;
    const SIZE_BYTES: usize = 20;

    fn dword_count(&self) -> usize {
        if self.store_qword {
            5
        } else {
            4
        }
    }

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        let dwords = self.dword_count();
        check_out_len(Self::KIND, out, dwords)?;
        if !self.store_qword && self.data > u64::from(u32::MAX) {
            return Err(Error::FieldOverflow {
                field: "data",
                hi: 31,
                lo: 0,
                value: self.data,
            });
        }

        let mut dw0 = Self::KIND.header(dwords);
        dw0 = flag_set(dw0, 21, self.store_qword);
        dw0 = flag_set(dw0, 22, self.use_global_gtt);
        out[0] = dw0;

        let align_shift = if self.store_qword { 3 } else { 2 };
        let [lo, hi] = encode_address("address", self.address, align_shift, gen.gpu_address_bits())?;
        out[1] = flag_set(lo, 0, self.core_mode_enable);
        out[2] = hi;
        out[3] = self.data as u32;
        if self.store_qword {
            out[4] = (self.data >> 32) as u32;
        }
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        let dwords = check_header(Self::KIND, words)?;
        let store_qword = flag_get(words[0], 21);
        let expected = if store_qword { 5 } else { 4 };
        if dwords != expected {
            return Err(Error::BadLength {
                kind: Self::KIND,
                expected,
                found: dwords,
            });
        }

        let align_shift = if store_qword { 3 } else { 2 };
        let address = decode_address_checked("address", words[1], words[2], 2, align_shift, gen.gpu_address_bits())?;

        let mut data = u64::from(words[3]);
        if store_qword {
            data |= u64::from(words[4]) << 32;
        }
        Ok(Self {
            use_global_gtt: flag_get(words[0], 22),
            store_qword,
            core_mode_enable: flag_get(words[1], 0),
            address,
            data,
        })
    }
}

/// MI_COPY_MEM_MEM: copy one dword between two memory locations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiCopyMemMem {
    pub use_global_gtt_source: bool,
    pub use_global_gtt_destination: bool,
    pub destination_address: u64,
    pub source_address: u64,
}

impl GpuCommand for MiCopyMemMem {
    const KIND: CommandKind = CommandKind::MiCopyMemMem;
    const SIZE_BYTES: usize = 20;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 5)?;
        let mut dw0 = Self::KIND.header(5);
        dw0 = flag_set(dw0, 21, self.use_global_gtt_destination);
        dw0 = flag_set(dw0, 22, self.use_global_gtt_source);
        out[0] = dw0;
        let bits = gen.gpu_address_bits();
        let [dst_lo, dst_hi] = encode_address("destination_address", self.destination_address, 2, bits)?;
        let [src_lo, src_hi] = encode_address("source_address", self.source_address, 2, bits)?;
        out[1] = dst_lo;
        out[2] = dst_hi;
        out[3] = src_lo;
        out[4] = src_hi;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 5)?;
        let bits = gen.gpu_address_bits();
        Ok(Self {
            use_global_gtt_source: flag_get(words[0], 22),
            use_global_gtt_destination: flag_get(words[0], 21),
            destination_address: decode_address_checked("destination_address", words[1], words[2], 2, 2, bits)?,
            source_address: decode_address_checked("source_address", words[3], words[4], 2, 2, bits)?,
        })
    }
}

/// MI_REPORT_PERF_COUNT: snapshot the OA counters into a 64-byte aligned report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiReportPerfCount {
    pub use_global_gtt: bool,
    pub core_mode_enable: bool,
    pub address: u64,
    /// Written into the first dword of the report.
    pub report_id: u32,
}

impl MiReportPerfCount {
    pub const ADDRESS_ALIGNMENT: u64 = 64;
}

impl GpuCommand for MiReportPerfCount {
    const KIND: CommandKind = CommandKind::MiReportPerfCount;
    const SIZE_BYTES: usize = 16;

    fn encode(&self, gen: Generation, out: &mut [u32]) -> Result<()> {
        check_out_len(Self::KIND, out, 4)?;
        out[0] = Self::KIND.header(4);
        let [lo, hi] = encode_address("address", self.address, 6, gen.gpu_address_bits())?;
        let lo = flag_set(lo, 0, self.use_global_gtt);
        out[1] = flag_set(lo, 4, self.core_mode_enable);
        out[2] = hi;
        out[3] = self.report_id;
        Ok(())
    }

    fn decode(gen: Generation, words: &[u32]) -> Result<Self> {
        check_fixed(Self::KIND, words, 4)?;
        if field_get(words[1], 5, 1) & !0b1000 != 0 {
            tracing::warn!("MI_REPORT_PERF_COUNT reserved address bits set: 0x{:08x}", words[1]);
        }
        Ok(Self {
            use_global_gtt: flag_get(words[1], 0),
            core_mode_enable: flag_get(words[1], 4),
            address: decode_address_checked("address", words[1], words[2], 6, 6, gen.gpu_address_bits())?,
            report_id: words[3],
        })
    }
}

const _: () = assert!(MiReportPerfCount::SIZE_BYTES == 16);
const _: () = assert!(MiCopyMemMem::SIZE_BYTES == 20);
const _: () = assert!(MiStoreDataImm::SIZE_BYTES == 20);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdi_forms_pick_length_and_alignment() {
        let gen = Generation::Gen12;
        let dword = MiStoreDataImm::dword(0x1004, 0xCAFE);
        assert_eq!(dword.to_dwords(gen).unwrap(), vec![0x1000_0002, 0x1004, 0, 0xCAFE]);

        let qword = MiStoreDataImm::qword(0x1008, 0x1122_3344_5566_7788);
        assert_eq!(
            qword.to_dwords(gen).unwrap(),
            vec![0x1020_0003, 0x1008, 0, 0x5566_7788, 0x1122_3344]
        );
        assert!(matches!(
            MiStoreDataImm::qword(0x1004, 1).to_dwords(gen),
            Err(Error::MisalignedAddress { alignment: 8, .. })
        ));
    }

    #[test]
    fn sdi_rejects_length_mismatching_qword_bit() {
        let words = [0x1000_0003, 0x1008, 0, 1, 2];
        assert!(matches!(
            MiStoreDataImm::decode(Generation::Gen9, &words),
            Err(Error::BadLength { expected: 4, found: 5, .. })
        ));
    }

    #[test]
    fn sdi_decode_applies_encode_alignment() {
        let gen = Generation::Gen12;
        assert!(matches!(
            MiStoreDataImm::decode(gen, &[0x1020_0003, 0x1004, 0, 1, 2]),
            Err(Error::MisalignedAddress { address: 0x1004, alignment: 8, .. })
        ));
        let dword = MiStoreDataImm::decode(gen, &[0x1000_0002, 0x1004, 0, 1]).unwrap();
        assert_eq!(dword.to_dwords(gen).unwrap(), vec![0x1000_0002, 0x1004, 0, 1]);
    }

    #[test]
    fn decode_rejects_addresses_beyond_generation_width() {
        let words = [0x1700_0003, 0x1000, 0x0001_0000, 0x2000, 0];
        assert!(matches!(
            MiCopyMemMem::decode(Generation::Gen12, &words),
            Err(Error::AddressOutOfRange { bits: 48, .. })
        ));
        let cmm = MiCopyMemMem::decode(Generation::XeHpg, &words).unwrap();
        assert_eq!(cmm.destination_address, 0x1_0000_0000_1000);
    }

    #[test]
    fn rpc_requires_64_byte_alignment() {
        let rpc = MiReportPerfCount {
            address: 0x1020,
            ..Default::default()
        };
        assert!(matches!(
            rpc.to_dwords(Generation::Gen9),
            Err(Error::MisalignedAddress { alignment: 64, .. })
        ));
    }
}
