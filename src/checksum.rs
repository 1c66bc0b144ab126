//! Header checksum and key hashing.
//!
//! Headers carry a single CRC-8 byte (polynomial 0x07, init 0x00, no
//! reflection, no final XOR: CRC-8/SMBUS). Keys are indexed by a DJB2
//! hash truncated to 16 bits; the hash is a scan filter only and full key
//! bytes are always compared on a hit.

use crc::{Crc, CRC_8_SMBUS};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8 over `data`, MSB first.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// 16-bit DJB2 hash of the key bytes (no terminator included).
pub fn hash_key(key: &[u8]) -> u16 {
    let mut hash: u16 = 5381;
    for &c in key {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(c as u16);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc8_check_vector() {
        // CRC-8/SMBUS check value for "123456789"
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn crc8_empty_is_zero() {
        assert_eq!(crc8(&[]), 0x00);
    }

    #[test]
    fn crc8_detects_single_bit_flip() {
        let a = crc8(&[0x01, 0x04, 0x00]);
        let b = crc8(&[0x01, 0x05, 0x00]);
        assert_ne!(a, b);
    }

    #[test]
    fn djb2_known_values() {
        // 5381 * 33 + 'x' (120) mod 2^16
        assert_eq!(hash_key(b"x"), 0xB61D);
        assert_eq!(hash_key(b""), 5381);
    }

    #[test]
    fn djb2_differs_for_similar_keys() {
        assert_ne!(hash_key(b"key1"), hash_key(b"key2"));
        assert_ne!(hash_key(b"ab"), hash_key(b"ba"));
    }
}
