//! Ledger binary encoding ("bytesrepr").
//!
//! Everything that is hashed or stored on the ledger goes through this
//! format: little-endian integers, `u32` length prefixes for strings and
//! sequences, and a single length byte for big unsigned integers.
//! careful: deploy hashes depend on this being byte-exact.

use crate::error::{RecoveryError, Result};
use num_bigint::BigUint;

pub trait ToBytes {
    fn write_bytes(&self, writer: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_bytes(&mut buf);
        buf
    }
}

// --- Primitives ---

impl ToBytes for u8 {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.push(*self);
    }
}

impl ToBytes for u32 {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.to_le_bytes());
    }
}

impl ToBytes for u64 {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.to_le_bytes());
    }
}

impl ToBytes for bool {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.push(if *self { 1u8 } else { 0u8 });
    }
}

impl ToBytes for str {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        let bytes = self.as_bytes();
        (bytes.len() as u32).write_bytes(writer);
        writer.extend_from_slice(bytes);
    }
}

impl ToBytes for String {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        self.as_str().write_bytes(writer);
    }
}

impl<const N: usize> ToBytes for [u8; N] {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(self);
    }
}

impl<T: ToBytes> ToBytes for Vec<T> {
    fn write_bytes(&self, writer: &mut Vec<u8>) {
        (self.len() as u32).write_bytes(writer);
        for item in self {
            item.write_bytes(writer);
        }
    }
}

/// Length-prefixed raw bytes (module bytes, serialized values).
pub fn write_byte_slice(bytes: &[u8], writer: &mut Vec<u8>) {
    (bytes.len() as u32).write_bytes(writer);
    writer.extend_from_slice(bytes);
}

/// U128/U256/U512: one length byte followed by the minimal little-endian
/// magnitude. Zero is encoded as a single `0x00` length byte.
pub fn write_big_uint(value: &BigUint, writer: &mut Vec<u8>) {
    let mut le = value.to_bytes_le();
    while le.last() == Some(&0) {
        le.pop();
    }
    writer.push(le.len() as u8);
    writer.extend_from_slice(&le);
}

/// Cursor over a serialized value.
pub struct BytesReader<'a> {
    bytes: &'a [u8],
}

impl<'a> BytesReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(RecoveryError::Deserialization(format!(
                "early end of stream: wanted {} bytes, {} left",
                n,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(RecoveryError::Deserialization(format!(
                "invalid bool byte {}",
                other
            ))),
        }
    }

    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    pub fn byte_vec(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String> {
        let bytes = self.byte_vec()?;
        String::from_utf8(bytes)
            .map_err(|e| RecoveryError::Deserialization(format!("invalid utf-8: {}", e)))
    }

    pub fn big_uint(&mut self, max_bytes: usize) -> Result<BigUint> {
        let len = self.u8()? as usize;
        if len > max_bytes {
            return Err(RecoveryError::Deserialization(format!(
                "big integer of {} bytes exceeds {}",
                len, max_bytes
            )));
        }
        Ok(BigUint::from_bytes_le(self.take(len)?))
    }

    /// Fails if bytes are left over.
    pub fn finish(self) -> Result<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(RecoveryError::Deserialization(format!(
                "{} trailing bytes",
                self.bytes.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_is_length_prefixed() {
        assert_eq!("abc".to_bytes(), vec![3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_big_uint_minimal_encoding() {
        let mut buf = Vec::new();
        write_big_uint(&BigUint::from(0u8), &mut buf);
        assert_eq!(buf, vec![0]);

        let mut buf = Vec::new();
        write_big_uint(&BigUint::from(2_500_000_000u64), &mut buf);
        assert_eq!(buf, vec![4, 0x00, 0xf9, 0x02, 0x95]);

        let mut reader = BytesReader::new(&buf);
        assert_eq!(reader.big_uint(64).unwrap(), BigUint::from(2_500_000_000u64));
        reader.finish().unwrap();
    }

    #[test]
    fn test_reader_rejects_short_input() {
        let mut reader = BytesReader::new(&[1, 0]);
        assert!(reader.u32().is_err());
    }

    #[test]
    fn test_reader_rejects_invalid_bool() {
        let mut reader = BytesReader::new(&[7]);
        assert!(reader.bool().is_err());
    }
}
