//! Binary primitives shared by every codec.
//!
//! All formats are little-endian. Strings use the .NET `BinaryWriter`
//! convention: a 7-bit variable-length byte count followed by UTF-8 bytes.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Upper bound on a decoded string, guards against garbage length prefixes.
const MAX_STRING_LEN: usize = 1 << 20;

pub trait BinaryRead: Read {
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_string(&mut self) -> Result<String> {
        let mut len = 0usize;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(Error::format("string", "length prefix is too long"));
            }
        }
        if len > MAX_STRING_LEN {
            return Err(Error::format("string", format!("length {} exceeds limit", len)));
        }
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Reads an i16 count followed by the bits packed LSB-first.
    fn read_bit_vector(&mut self) -> Result<Vec<bool>> {
        let count = self.read_i16::<LittleEndian>()?;
        if count < 0 {
            return Err(Error::format("bit vector", format!("negative length {}", count)));
        }
        let count = count as usize;
        let mut bits = Vec::with_capacity(count);
        let mut byte = 0u8;
        for i in 0..count {
            if i % 8 == 0 {
                byte = self.read_u8()?;
            }
            bits.push(byte & (1 << (i % 8)) != 0);
        }
        Ok(bits)
    }
}

impl<R: Read + ?Sized> BinaryRead for R {}

pub trait BinaryWrite: Write {
    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)?;
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        let mut len = value.len();
        while len >= 0x80 {
            self.write_u8((len as u8) | 0x80)?;
            len >>= 7;
        }
        self.write_u8(len as u8)?;
        self.write_all(value.as_bytes())?;
        Ok(())
    }

    fn write_bit_vector(&mut self, bits: &[bool]) -> Result<()> {
        if bits.len() > i16::MAX as usize {
            return Err(Error::format(
                "bit vector",
                format!("{} entries do not fit an i16 count", bits.len()),
            ));
        }
        self.write_i16::<LittleEndian>(bits.len() as i16)?;
        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= 1 << i;
                }
            }
            self.write_u8(byte)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> BinaryWrite for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_string_long_prefix() {
        let text = "x".repeat(300);
        let mut buf = Vec::new();
        buf.write_string(&text).unwrap();
        // 300 = 0b10_0101100 -> two prefix bytes
        assert_eq!(&buf[..2], &[0xAC, 0x02]);
        assert_eq!(Cursor::new(&buf).read_string().unwrap(), text);
    }

    #[test]
    fn test_bit_vector_layout() {
        let bits = vec![true, false, false, true, false, false, false, false, true];
        let mut buf = Vec::new();
        buf.write_bit_vector(&bits).unwrap();
        assert_eq!(buf, vec![9, 0, 0b0000_1001, 0b0000_0001]);
        assert_eq!(Cursor::new(&buf).read_bit_vector().unwrap(), bits);
    }

    #[test]
    fn test_truncated_string_is_io_error() {
        let buf = vec![5u8, b'a', b'b'];
        let err = Cursor::new(&buf).read_string().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
