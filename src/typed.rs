//! Typed put/get adapters.
//!
//! Thin encodings over [`MiniPrefs::write_entry`]/[`MiniPrefs::find_entry`]:
//! scalars are fixed-width little-endian, strings carry a trailing NUL on
//! the device, byte blobs are stored as-is. Getters return the caller's
//! default when the key is missing or the stored entry has a different
//! type tag or width; storage errors on the read path also fall back to
//! the default.

use crate::device::MemoryDevice;
use crate::error::Result;
use crate::header::DataType;
use crate::store::MiniPrefs;

macro_rules! scalar_accessors {
    ($put:ident, $get:ident, $ty:ty, $tag:expr) => {
        pub fn $put(&mut self, key: &str, value: $ty) -> Result<()> {
            self.write_entry(key, $tag, &value.to_le_bytes())
        }

        pub fn $get(&self, key: &str, default: $ty) -> $ty {
            match self.read_scalar::<{ std::mem::size_of::<$ty>() }>(key, $tag) {
                Some(bytes) => <$ty>::from_le_bytes(bytes),
                None => default,
            }
        }
    };
}

impl<D: MemoryDevice> MiniPrefs<D> {
    pub fn put_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.write_entry(key, DataType::Bool, &[value as u8])
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.read_scalar::<1>(key, DataType::Bool) {
            Some([byte]) => byte != 0,
            None => default,
        }
    }

    scalar_accessors!(put_i8, get_i8, i8, DataType::I8);
    scalar_accessors!(put_u8, get_u8, u8, DataType::U8);
    scalar_accessors!(put_i16, get_i16, i16, DataType::I16);
    scalar_accessors!(put_u16, get_u16, u16, DataType::U16);
    scalar_accessors!(put_i32, get_i32, i32, DataType::I32);
    scalar_accessors!(put_u32, get_u32, u32, DataType::U32);
    scalar_accessors!(put_i64, get_i64, i64, DataType::I64);
    scalar_accessors!(put_u64, get_u64, u64, DataType::U64);
    scalar_accessors!(put_f32, get_f32, f32, DataType::F32);
    scalar_accessors!(put_f64, get_f64, f64, DataType::F64);

    /// Store a string. The device copy carries a trailing NUL.
    pub fn put_string(&mut self, key: &str, value: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.write_entry(key, DataType::Str, &bytes)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        let Ok(info) = self.find_entry(key) else {
            return default.to_string();
        };
        if info.data_type != DataType::Str || info.value_len == 0 {
            return default.to_string();
        }
        let mut bytes = vec![0u8; info.value_len as usize];
        if self.read_bytes(info.value_addr, &mut bytes).is_err() {
            return default.to_string();
        }
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => default.to_string(),
        }
    }

    pub fn put_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.write_entry(key, DataType::Bytes, value)
    }

    /// Copy a blob into `buf`, truncating to its length. Returns the
    /// number of bytes copied, 0 when absent or not a blob.
    pub fn get_bytes(&self, key: &str, buf: &mut [u8]) -> usize {
        let Ok(info) = self.find_entry(key) else {
            return 0;
        };
        if info.data_type != DataType::Bytes {
            return 0;
        }
        let n = (info.value_len as usize).min(buf.len());
        if self.read_bytes(info.value_addr, &mut buf[..n]).is_err() {
            return 0;
        }
        n
    }

    fn read_scalar<const N: usize>(&self, key: &str, tag: DataType) -> Option<[u8; N]> {
        let info = self.find_entry(key).ok()?;
        if info.data_type != tag || info.value_len as usize != N {
            return None;
        }
        let mut bytes = [0u8; N];
        self.read_bytes(info.value_addr, &mut bytes).ok()?;
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefsConfig;
    use crate::device::SimMemory;

    fn test_store() -> MiniPrefs<SimMemory> {
        let config = PrefsConfig::default();
        let mem = SimMemory::new(config.total_memory_bytes() as usize);
        let mut store = MiniPrefs::new(config, mem).unwrap();
        store.begin().unwrap();
        store
    }

    #[test]
    fn scalar_round_trips() {
        let mut store = test_store();
        store.put_bool("b", true).unwrap();
        store.put_i8("i8", -5).unwrap();
        store.put_u16("u16", 0xBEEF).unwrap();
        store.put_i32("i32", -123_456).unwrap();
        store.put_u64("u64", u64::MAX - 1).unwrap();
        store.put_f32("f32", 1.5).unwrap();
        store.put_f64("f64", -2.25).unwrap();

        assert!(store.get_bool("b", false));
        assert_eq!(store.get_i8("i8", 0), -5);
        assert_eq!(store.get_u16("u16", 0), 0xBEEF);
        assert_eq!(store.get_i32("i32", 0), -123_456);
        assert_eq!(store.get_u64("u64", 0), u64::MAX - 1);
        assert_eq!(store.get_f32("f32", 0.0), 1.5);
        assert_eq!(store.get_f64("f64", 0.0), -2.25);
    }

    #[test]
    fn missing_key_returns_default() {
        let store = test_store();
        assert_eq!(store.get_i32("absent", 42), 42);
        assert_eq!(store.get_string("absent", "fallback"), "fallback");
        assert!(!store.get_bool("absent", false));
    }

    #[test]
    fn type_mismatch_returns_default() {
        let mut store = test_store();
        store.put_i32("n", 7).unwrap();
        // Same width, different tag
        assert_eq!(store.get_u32("n", 99), 99);
        assert_eq!(store.get_f32("n", 3.0), 3.0);
        // Different width
        assert_eq!(store.get_i64("n", -1), -1);
        assert_eq!(store.get_string("n", "d"), "d");
    }

    #[test]
    fn string_round_trip_stores_nul() {
        let mut store = test_store();
        store.put_string("greeting", "hello").unwrap();
        assert_eq!(store.get_string("greeting", ""), "hello");

        let info = store.find_entry("greeting").unwrap();
        assert_eq!(info.value_len, 6);
        let mut raw = [0u8; 6];
        store.read_bytes(info.value_addr, &mut raw).unwrap();
        assert_eq!(&raw, b"hello\0");
    }

    #[test]
    fn empty_string_round_trips() {
        let mut store = test_store();
        store.put_string("empty", "").unwrap();
        assert_eq!(store.get_string("empty", "d"), "");
    }

    #[test]
    fn bytes_copy_truncates_to_buffer() {
        let mut store = test_store();
        store.put_bytes("blob", &[1, 2, 3, 4, 5]).unwrap();

        let mut exact = [0u8; 5];
        assert_eq!(store.get_bytes("blob", &mut exact), 5);
        assert_eq!(exact, [1, 2, 3, 4, 5]);

        let mut short = [0u8; 3];
        assert_eq!(store.get_bytes("blob", &mut short), 3);
        assert_eq!(short, [1, 2, 3]);

        let mut roomy = [0xAA; 8];
        assert_eq!(store.get_bytes("blob", &mut roomy), 5);
        assert_eq!(&roomy[..5], &[1, 2, 3, 4, 5]);
        assert_eq!(&roomy[5..], &[0xAA; 3]);
    }

    #[test]
    fn overwrite_with_different_type() {
        let mut store = test_store();
        store.put_i32("k", 1).unwrap();
        store.put_string("k", "now a string").unwrap();
        assert_eq!(store.get_i32("k", 0), 0);
        assert_eq!(store.get_string("k", ""), "now a string");
    }
}
