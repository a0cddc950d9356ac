//! Fixed-width numeric readers.
//!
//! Every reader is an exact-width read composed with the matching decode, so
//! all of them inherit the engine's suspend/resume behavior: a multi-byte
//! integer split across two chunks is decoded once the second chunk arrives.
//!
//! The single-byte readers live at this level; the multi-byte ones come in
//! little-endian ([`le`]), big-endian ([`be`]) and native-endian ([`ne`])
//! flavors.

use crate::combinator::any_byte;
use crate::engine::Parser;

/// An unsigned byte.
pub fn uint8() -> Parser<u8> {
    any_byte()
}

/// A signed byte.
pub fn int8() -> Parser<i8> {
    any_byte().map(|b| b as i8)
}

macro_rules! endian_readers {
    ($mod_name:ident, $from_bytes:ident, $doc:literal) => {
        #[doc = $doc]
        pub mod $mod_name {
            use crate::combinator::take_array;
            use crate::engine::Parser;

            /// A 16-bit signed integer.
            pub fn int16() -> Parser<i16> {
                take_array::<2>().map(i16::$from_bytes)
            }

            /// A 16-bit unsigned integer.
            pub fn uint16() -> Parser<u16> {
                take_array::<2>().map(u16::$from_bytes)
            }

            /// A 32-bit signed integer.
            pub fn int32() -> Parser<i32> {
                take_array::<4>().map(i32::$from_bytes)
            }

            /// A 32-bit unsigned integer.
            pub fn uint32() -> Parser<u32> {
                take_array::<4>().map(u32::$from_bytes)
            }

            /// A 64-bit signed integer.
            pub fn int64() -> Parser<i64> {
                take_array::<8>().map(i64::$from_bytes)
            }

            /// A 64-bit unsigned integer.
            pub fn uint64() -> Parser<u64> {
                take_array::<8>().map(u64::$from_bytes)
            }

            /// A 32-bit IEEE 754 float.
            pub fn float32() -> Parser<f32> {
                take_array::<4>().map(f32::$from_bytes)
            }

            /// A 64-bit IEEE 754 float.
            pub fn float64() -> Parser<f64> {
                take_array::<8>().map(f64::$from_bytes)
            }
        }
    };
}

endian_readers!(le, from_le_bytes, "Little-endian readers.");
endian_readers!(be, from_be_bytes, "Big-endian readers.");
endian_readers!(ne, from_ne_bytes, "Native-endian readers.");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse_only;

    #[test]
    fn test_single_byte_readers() {
        assert_eq!(parse_only(&uint8(), &[0xff][..]).unwrap(), 0xff);
        assert_eq!(parse_only(&int8(), &[0xff][..]).unwrap(), -1);
    }

    #[test]
    fn test_multibyte_integers() {
        let bytes = &[0x78, 0x56, 0x34, 0x12][..];
        assert_eq!(parse_only(&le::uint32(), bytes).unwrap(), 0x1234_5678);
        assert_eq!(parse_only(&be::uint32(), bytes).unwrap(), 0x7856_3412);
        assert_eq!(
            parse_only(&le::int16(), &[0xfe, 0xff][..]).unwrap(),
            -2i16
        );
        assert_eq!(
            parse_only(&be::uint64(), &[0, 0, 0, 0, 0, 0, 1, 2][..]).unwrap(),
            258
        );
    }

    #[test]
    fn test_floats() {
        assert_eq!(
            parse_only(&le::float64(), &1.5f64.to_le_bytes()[..]).unwrap(),
            1.5
        );
        assert_eq!(
            parse_only(&be::float32(), &2.25f32.to_be_bytes()[..]).unwrap(),
            2.25
        );
        assert_eq!(
            parse_only(&ne::uint16(), &7u16.to_ne_bytes()[..]).unwrap(),
            7
        );
    }

    #[test]
    fn test_starved_reader_fails_on_complete_input() {
        assert!(parse_only(&le::uint32(), &[1, 2][..]).is_err());
    }
}
