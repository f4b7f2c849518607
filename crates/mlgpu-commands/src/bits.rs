//! Field encode/decode primitives shared by every command layout.
//!
//! Bit ranges are written `hi:lo` inclusive, matching the hardware documentation.

use crate::error::{Error, Result};
use crate::gen::Generation;

/// Mask covering bits `hi:lo` of a dword.
pub const fn mask(hi: u32, lo: u32) -> u32 {
    let width = hi - lo + 1;
    if width >= 32 {
        u32::MAX
    } else {
        ((1u32 << width) - 1) << lo
    }
}

pub const fn field_get(word: u32, hi: u32, lo: u32) -> u32 {
    (word & mask(hi, lo)) >> lo
}

/// Replace bits `hi:lo` of `word` with `value`.
pub fn field_set(word: u32, hi: u32, lo: u32, value: u32, field: &'static str) -> Result<u32> {
    let width = hi - lo + 1;
    if width < 32 && (value >> width) != 0 {
        return Err(Error::FieldOverflow {
            field,
            hi,
            lo,
            value: u64::from(value),
        });
    }
    Ok((word & !mask(hi, lo)) | (value << lo))
}

pub const fn flag_get(word: u32, bit: u32) -> bool {
    (word >> bit) & 1 != 0
}

pub const fn flag_set(word: u32, bit: u32, on: bool) -> u32 {
    if on {
        word | (1 << bit)
    } else {
        word & !(1 << bit)
    }
}

/// Set a flag that only exists on some generations.
///
/// Requesting an unsupported flag is an error; leaving it clear is always fine.
pub fn gated_flag_set(
    word: u32,
    bit: u32,
    on: bool,
    supported: bool,
    field: &'static str,
    gen: Generation,
) -> Result<u32> {
    if on && !supported {
        return Err(Error::UnsupportedField { field, gen });
    }
    Ok(flag_set(word, bit, on))
}

/// Read a generation-gated flag. On generations without the field the bit is
/// reserved: it decodes as clear.
pub fn gated_flag_get(word: u32, bit: u32, supported: bool, field: &'static str, gen: Generation) -> bool {
    let set = flag_get(word, bit);
    if set && !supported {
        tracing::warn!(field, %gen, "reserved bit {bit} set in 0x{word:08x}; ignoring");
        return false;
    }
    set
}

/// Split a GPU address into its low and high dwords.
///
/// `align_shift` is the number of low bits that must be zero (the field starts at
/// bit `align_shift`); `address_bits` bounds the address from above.
pub fn encode_address(field: &'static str, address: u64, align_shift: u32, address_bits: u32) -> Result<[u32; 2]> {
    let alignment = 1u64 << align_shift;
    if address & (alignment - 1) != 0 {
        return Err(Error::MisalignedAddress {
            field,
            address,
            alignment,
        });
    }
    if address_bits < 64 && (address >> address_bits) != 0 {
        return Err(Error::AddressOutOfRange {
            field,
            address,
            bits: address_bits,
        });
    }
    Ok([address as u32, (address >> 32) as u32])
}

/// Join two dwords into an address, dropping the low bits that hold other fields.
pub const fn decode_address(lo: u32, hi: u32, align_shift: u32) -> u64 {
    let raw = ((hi as u64) << 32) | lo as u64;
    raw & !((1u64 << align_shift) - 1)
}

/// Join an address like [`decode_address`], then apply the checks [`encode_address`]
/// makes, so anything that decodes also re-encodes.
///
/// `field_shift` is the lowest bit of the address field in the low dword;
/// `align_shift` is the alignment the command requires of the address.
pub fn decode_address_checked(
    field: &'static str,
    lo: u32,
    hi: u32,
    field_shift: u32,
    align_shift: u32,
    address_bits: u32,
) -> Result<u64> {
    let address = decode_address(lo, hi, field_shift);
    encode_address(field, address, align_shift, address_bits)?;
    Ok(address)
}

/// MMIO register offset field (bits 22:2 of its dword).
pub fn encode_register(field: &'static str, offset: u32) -> Result<u32> {
    if offset & 0x3 != 0 {
        return Err(Error::MisalignedAddress {
            field,
            address: u64::from(offset),
            alignment: 4,
        });
    }
    if offset & !mask(22, 2) != 0 {
        return Err(Error::FieldOverflow {
            field,
            hi: 22,
            lo: 2,
            value: u64::from(offset),
        });
    }
    Ok(offset)
}

pub const fn decode_register(word: u32) -> u32 {
    word & mask(22, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_covers_inclusive_range() {
        assert_eq!(mask(7, 0), 0xFF);
        assert_eq!(mask(28, 23), 0x1F80_0000);
        assert_eq!(mask(31, 0), u32::MAX);
        assert_eq!(mask(22, 2), 0x007F_FFFC);
    }

    #[test]
    fn field_set_rejects_wide_values() {
        assert_eq!(field_set(0, 11, 8, 0xF, "bwd").unwrap(), 0xF00);
        let err = field_set(0, 11, 8, 0x10, "bwd").unwrap_err();
        assert!(matches!(err, Error::FieldOverflow { field: "bwd", hi: 11, lo: 8, .. }));
    }

    #[test]
    fn field_set_preserves_other_bits() {
        let word = field_set(0xFFFF_FFFF, 15, 14, 0b01, "post_sync").unwrap();
        assert_eq!(word, 0xFFFF_7FFF);
        assert_eq!(field_get(word, 15, 14), 0b01);
    }

    #[test]
    fn address_alignment_and_range() {
        assert_eq!(encode_address("a", 0x1_2345_6780, 2, 48).unwrap(), [0x2345_6780, 0x1]);
        assert!(matches!(
            encode_address("a", 0x1004, 6, 48),
            Err(Error::MisalignedAddress { alignment: 64, .. })
        ));
        assert!(matches!(
            encode_address("a", 1u64 << 48, 2, 48),
            Err(Error::AddressOutOfRange { bits: 48, .. })
        ));
        assert_eq!(decode_address(0x2345_6781, 0x1, 2), 0x1_2345_6780);
    }

    #[test]
    fn checked_decode_matches_encode_rules() {
        assert_eq!(decode_address_checked("a", 0x1001, 0, 2, 2, 48).unwrap(), 0x1000);
        assert!(matches!(
            decode_address_checked("a", 0x1004, 0, 2, 3, 48),
            Err(Error::MisalignedAddress { alignment: 8, .. })
        ));
        assert!(matches!(
            decode_address_checked("a", 0, 0x0001_0000, 2, 2, 48),
            Err(Error::AddressOutOfRange { bits: 48, .. })
        ));
        assert_eq!(decode_address_checked("a", 0, 0x0001_0000, 2, 2, 57).unwrap(), 1u64 << 48);
    }

    #[test]
    fn gated_flags() {
        assert!(matches!(
            gated_flag_set(0, 17, true, false, "mmio_remap_enable", Generation::Gen9),
            Err(Error::UnsupportedField { .. })
        ));
        assert_eq!(gated_flag_set(0, 17, false, false, "mmio_remap_enable", Generation::Gen9), Ok(0));
        assert!(!gated_flag_get(1 << 17, 17, false, "mmio_remap_enable", Generation::Gen9));
        assert!(gated_flag_get(1 << 17, 17, true, "mmio_remap_enable", Generation::Gen12));
    }

    #[test]
    fn register_offsets() {
        assert_eq!(encode_register("reg", 0x2358).unwrap(), 0x2358);
        assert!(encode_register("reg", 0x2359).is_err());
        assert!(encode_register("reg", 0x80_0000).is_err());
        assert_eq!(decode_register(0xFF80_2358), 0x2358);
    }
}
