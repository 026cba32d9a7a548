//! Fixed-width primitives shared by the header and message codecs.
//!
//! Everything is little-endian. Strings carry a one byte length prefix, so no
//! string on the wire is longer than 255 bytes regardless of the field limit.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Vec2, Vec3};
use log::warn;

use super::error::WireError;
use crate::id::Identifier;

pub fn truncate_utf8(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

pub trait WireWrite: Write {
    fn write_identifier(&mut self, id: Identifier) -> Result<(), WireError> {
        self.write_u16::<LittleEndian>(id.generation)?;
        self.write_u16::<LittleEndian>(id.index)?;
        Ok(())
    }

    /// Oversized strings are a caller bug; release builds report them as
    /// `StringTooLong` instead of truncating.
    fn write_string(&mut self, value: &str, max_len: usize) -> Result<(), WireError> {
        let max = max_len.min(u8::MAX as usize);
        let len = value.len();
        debug_assert!(len <= max, "string of {len} bytes exceeds limit of {max}");
        if len > max {
            return Err(WireError::StringTooLong { len, max });
        }

        self.write_u8(len as u8)?;
        self.write_all(value.as_bytes())?;
        Ok(())
    }

    fn write_vec2(&mut self, value: Vec2) -> Result<(), WireError> {
        self.write_f32::<LittleEndian>(value.x)?;
        self.write_f32::<LittleEndian>(value.y)?;
        Ok(())
    }

    fn write_vec3(&mut self, value: Vec3) -> Result<(), WireError> {
        self.write_f32::<LittleEndian>(value.x)?;
        self.write_f32::<LittleEndian>(value.y)?;
        self.write_f32::<LittleEndian>(value.z)?;
        Ok(())
    }
}

impl<W: Write + ?Sized> WireWrite for W {}

pub trait WireRead: Read {
    fn read_identifier(&mut self) -> Result<Identifier, WireError> {
        let generation = self.read_u16::<LittleEndian>()?;
        let index = self.read_u16::<LittleEndian>()?;
        Ok(Identifier { index, generation })
    }

    /// Reads a length-prefixed string. A declared length above `max_len` is
    /// consumed in full but only the first `max_len` bytes are kept.
    fn read_string(&mut self, max_len: usize) -> Result<String, WireError> {
        let declared = self.read_u8()? as usize;
        let mut bytes = vec![0u8; declared];
        self.read_exact(&mut bytes)?;

        if declared > max_len {
            warn!(
                "Truncating string of {} bytes to limit of {}",
                declared, max_len
            );
            bytes.truncate(max_len);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_vec2(&mut self) -> Result<Vec2, WireError> {
        let x = self.read_f32::<LittleEndian>()?;
        let y = self.read_f32::<LittleEndian>()?;
        Ok(Vec2::new(x, y))
    }

    fn read_vec3(&mut self) -> Result<Vec3, WireError> {
        let x = self.read_f32::<LittleEndian>()?;
        let y = self.read_f32::<LittleEndian>()?;
        let z = self.read_f32::<LittleEndian>()?;
        Ok(Vec3::new(x, y, z))
    }
}

impl<R: Read + ?Sized> WireRead for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_identifier_writes_generation_first() {
        let mut buf = Vec::new();
        buf.write_identifier(Identifier::new(0x0102, 0x0304)).unwrap();

        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);

        let id = Cursor::new(&buf[..]).read_identifier().unwrap();
        assert_eq!(id, Identifier::new(0x0102, 0x0304));
    }

    #[test]
    fn test_string_within_limit() {
        let mut buf = Vec::new();
        buf.write_string("hello", 10).unwrap();
        assert_eq!(buf.len(), 6);

        let value = Cursor::new(&buf[..]).read_string(10).unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_string_over_limit_is_rejected() {
        let mut buf = Vec::new();
        let err = buf.write_string("abcdefghijklmnopqrst", 10).unwrap_err();
        assert!(matches!(err, WireError::StringTooLong { len: 20, max: 10 }));
        assert!(buf.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds limit")]
    fn test_string_over_limit_panics_in_debug() {
        let mut buf = Vec::new();
        let _ = buf.write_string("abcdefghijklmnopqrst", 10);
    }

    #[test]
    fn test_oversized_string_truncates_and_keeps_cursor() {
        let mut buf = Vec::new();
        buf.write_string("abcdefghijklmnopqrst", 32).unwrap();
        buf.write_u8(0xAB).unwrap();

        let mut reader = Cursor::new(&buf[..]);
        let value = reader.read_string(10).unwrap();

        assert_eq!(value, "abcdefghij");
        assert_eq!(reader.position(), 21);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
    }

    #[test]
    fn test_short_string_payload_is_truncated_error() {
        let buf = [5u8, b'a', b'b'];
        let err = Cursor::new(&buf[..]).read_string(10).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundaries() {
        assert_eq!(truncate_utf8("short", 16), "short");
        assert_eq!(truncate_utf8("abcdef", 3), "abc");
        assert_eq!(truncate_utf8("héllo", 2), "h");
    }

    #[test]
    fn test_vectors() {
        let mut buf = Vec::new();
        buf.write_vec3(Vec3::new(1.0, -2.5, 3.25)).unwrap();
        buf.write_vec2(Vec2::new(0.5, 0.0)).unwrap();
        assert_eq!(buf.len(), 20);

        let mut reader = Cursor::new(&buf[..]);
        assert_eq!(reader.read_vec3().unwrap(), Vec3::new(1.0, -2.5, 3.25));
        assert_eq!(reader.read_vec2().unwrap(), Vec2::new(0.5, 0.0));
    }
}
