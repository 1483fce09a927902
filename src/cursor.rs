use std::fmt::Debug;
use std::io::{self, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::errors::ParseError;
use crate::Result;

/// Extends `byteorder`'s `ReadBytesExt` (which itself extends `io::Read`)
/// and `io::Seek` with the primitive operations of the save format:
/// length-prefixed strings with UTF-8/UTF-16LE branches, flag bytes
/// constrained to {0, 1}, raw byte runs, confirmation of well-known values,
/// and size-bracketed regions.
///
/// Implemented for `io::Cursor` over any byte buffer, so both the raw file
/// and the decompressed body are walked entirely in memory.
pub trait SaveReader: ReadBytesExt + Seek + Sized {
  /// Total length of the underlying buffer
  fn data_len(&self) -> u64;

  /// Current offset into the underlying buffer
  fn offset(&self) -> u64;

  /// Fails with an `invalid_file` error when fewer than `len` bytes remain
  fn check_remaining(&self, len: u64) -> Result<()> {
    if self.offset() + len > self.data_len() {
      return Err(ParseError::InvalidFile(format!(
        "{} bytes wanted at offset {} in {}-byte data",
        len,
        self.offset(),
        self.data_len(),
      )));
    }
    Ok(())
  }

  /// Reads `len` bytes without interpreting them
  fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
    self.check_remaining(len as u64)?;
    let mut buf = vec![0; len];
    self.read_exact(&mut buf)?;
    Ok(buf)
  }

  /// Reads a single byte that must be 0 or 1
  fn read_u8_bool(&mut self) -> Result<bool> {
    let value = self.read_u8()?;
    if value > 1 {
      return Err(ParseError::InvalidFlag {
        value: u32::from(value),
        offset: self.offset() - 1,
      });
    }
    Ok(value == 1)
  }

  /// Reads four bytes that must decode to 0 or 1
  fn read_u32_bool(&mut self) -> Result<bool> {
    let value = self.read_u32::<LittleEndian>()?;
    if value > 1 {
      return Err(ParseError::InvalidFlag {
        value,
        offset: self.offset() - 4,
      });
    }
    Ok(value == 1)
  }

  /// Reads a string whose length and encoding are specified by a signed
  /// 32-bit prefix:
  ///
  /// - If the prefix is > 0, that many UTF-8 bytes follow
  /// - If the prefix is < 0, its magnitude counts UTF-16LE code units
  /// - If it == 0, the string is empty
  ///
  /// The byte budget includes a trailing NUL, which is dropped from the
  /// returned string.
  fn read_string(&mut self) -> Result<String> {
    let len = self.read_i32::<LittleEndian>()?;

    if len == 0 {
      return Ok(String::new());
    }

    if len > 0 {
      let raw = self.read_raw(len as usize)?;
      let mut string = String::from_utf8(raw)?;
      string.pop();
      Ok(string)
    } else {
      let units = len.unsigned_abs() as usize;
      self.check_remaining(units as u64 * 2)?;
      let mut buf: Vec<u16> = vec![0; units];
      self.read_u16_into::<LittleEndian>(&mut buf)?;
      buf.pop();
      Ok(String::from_utf16(&buf)?)
    }
  }

  /// Reads a value and fails with an `invalid_file` error when it differs
  /// from the expected one
  fn confirm<T, F>(&mut self, read: F, expected: T) -> Result<T>
  where
    T: PartialEq + Debug,
    F: FnOnce(&mut Self) -> Result<T>,
  {
    let start = self.offset();
    let value = read(self)?;
    if value != expected {
      return Err(ParseError::InvalidFile(format!(
        "expected {expected:?} at offset {start}, found {value:?}"
      )));
    }
    Ok(value)
  }

  fn confirm_u8(&mut self, expected: u8) -> Result<u8> {
    self.confirm(|r| Ok(r.read_u8()?), expected)
  }

  fn confirm_u32(&mut self, expected: u32) -> Result<u32> {
    self.confirm(|r| Ok(r.read_u32::<LittleEndian>()?), expected)
  }

  fn confirm_string(&mut self, expected: &str) -> Result<String> {
    self.confirm(|r| r.read_string(), expected.to_owned())
  }

  /// Runs `body` and asserts that it consumed exactly `size` bytes
  fn expect_size<T, F>(&mut self, size: u64, what: &'static str, body: F) -> Result<T>
  where
    F: FnOnce(&mut Self) -> Result<T>,
  {
    let start = self.offset();
    let value = body(self)?;
    let actual = self.offset() - start;
    if actual != size {
      return Err(ParseError::InvalidSize {
        what,
        expected: size,
        actual,
      });
    }
    Ok(value)
  }
}

impl<T: AsRef<[u8]>> SaveReader for io::Cursor<T> {
  fn data_len(&self) -> u64 {
    self.get_ref().as_ref().len() as u64
  }

  fn offset(&self) -> u64 {
    self.position()
  }
}

/// Accumulates the byte image of a save. Every method appends to a growing
/// buffer and returns `&mut Self` so field sequences chain the way they are
/// laid out on the wire. Writing cannot fail; size prefixes for bracketed
/// regions are measured by serializing the region into a nested writer
/// first.
#[derive(Debug, Default)]
pub struct SaveWriter {
  content: Vec<u8>,
}

impl SaveWriter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> u64 {
    self.content.len() as u64
  }

  pub fn is_empty(&self) -> bool {
    self.content.is_empty()
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.content
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.content
  }

  pub fn add_raw(&mut self, bytes: &[u8]) -> &mut Self {
    self.content.extend_from_slice(bytes);
    self
  }

  pub fn add_u8(&mut self, value: u8) -> &mut Self {
    self.content.push(value);
    self
  }

  pub fn add_i8(&mut self, value: i8) -> &mut Self {
    self.content.push(value as u8);
    self
  }

  pub fn add_u32(&mut self, value: u32) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_i32(&mut self, value: i32) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_u64(&mut self, value: u64) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_i64(&mut self, value: i64) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_f32(&mut self, value: f32) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_f64(&mut self, value: f64) -> &mut Self {
    self.add_raw(&value.to_le_bytes())
  }

  pub fn add_u8_bool(&mut self, value: bool) -> &mut Self {
    self.add_u8(u8::from(value))
  }

  pub fn add_u32_bool(&mut self, value: bool) -> &mut Self {
    self.add_u32(u32::from(value))
  }

  /// Writes a length-prefixed string. ASCII strings are written as UTF-8
  /// with a positive length prefix; anything else is written as UTF-16LE
  /// with a negative prefix counting code units. Both budgets include a
  /// trailing NUL.
  pub fn add_string(&mut self, value: &str) -> &mut Self {
    if value.is_empty() {
      return self.add_i32(0);
    }

    if value.is_ascii() {
      self.add_i32(value.len() as i32 + 1);
      self.add_raw(value.as_bytes());
      self.add_u8(0)
    } else {
      let units: Vec<u16> = value.encode_utf16().collect();
      self.add_i32(-(units.len() as i32 + 1));
      for unit in units {
        self.add_raw(&unit.to_le_bytes());
      }
      self.add_raw(&[0, 0])
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use byteorder::{LittleEndian, ReadBytesExt};

  use super::{SaveReader, SaveWriter};

  fn reader(w: &SaveWriter) -> Cursor<&[u8]> {
    Cursor::new(w.as_slice())
  }

  #[test]
  fn primitives_round_trip() {
    let mut w = SaveWriter::new();
    w.add_u8(0xAB)
      .add_i8(-5)
      .add_u32(0xDEAD_BEEF)
      .add_i32(-123_456)
      .add_u64(u64::MAX - 7)
      .add_i64(i64::MIN + 3)
      .add_f32(1.5)
      .add_f64(-2.25);

    let mut r = reader(&w);
    assert_eq!(r.read_u8().unwrap(), 0xAB);
    assert_eq!(r.read_i8().unwrap(), -5);
    assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 0xDEAD_BEEF);
    assert_eq!(r.read_i32::<LittleEndian>().unwrap(), -123_456);
    assert_eq!(r.read_u64::<LittleEndian>().unwrap(), u64::MAX - 7);
    assert_eq!(r.read_i64::<LittleEndian>().unwrap(), i64::MIN + 3);
    assert_eq!(r.read_f32::<LittleEndian>().unwrap(), 1.5);
    assert_eq!(r.read_f64::<LittleEndian>().unwrap(), -2.25);
    assert_eq!(r.offset(), r.data_len());
  }

  #[test]
  fn bools_round_trip_and_reject_other_values() {
    let mut w = SaveWriter::new();
    w.add_u8_bool(true).add_u32_bool(false);
    let mut r = reader(&w);
    assert!(r.read_u8_bool().unwrap());
    assert!(!r.read_u32_bool().unwrap());

    let mut bad = Cursor::new([2u8]);
    let err = bad.read_u8_bool().unwrap_err();
    assert_eq!(err.code(), "invalid_flag");

    let mut bad = Cursor::new(7u32.to_le_bytes());
    let err = bad.read_u32_bool().unwrap_err();
    assert_eq!(err.code(), "invalid_flag");
  }

  #[test]
  fn ascii_string_encoding() {
    let mut w = SaveWriter::new();
    w.add_string("Persistent_Level");
    // 4-byte prefix plus the bytes plus a NUL
    assert_eq!(w.len(), 4 + 16 + 1);
    assert_eq!(&w.as_slice()[..4], &17i32.to_le_bytes());
    assert_eq!(reader(&w).read_string().unwrap(), "Persistent_Level");
  }

  #[test]
  fn empty_string_encoding() {
    let mut w = SaveWriter::new();
    w.add_string("");
    assert_eq!(w.as_slice(), &0i32.to_le_bytes());
    assert_eq!(reader(&w).read_string().unwrap(), "");
  }

  #[test]
  fn non_ascii_string_uses_utf16() {
    let mut w = SaveWriter::new();
    w.add_string("завод");
    // 4-byte prefix plus two bytes per code unit including the NUL pair
    assert_eq!(w.len(), 4 + 2 * (5 + 1));
    assert_eq!(&w.as_slice()[..4], &(-6i32).to_le_bytes());
    assert_eq!(reader(&w).read_string().unwrap(), "завод");
  }

  #[test]
  fn string_overrun_is_invalid_file() {
    let mut w = SaveWriter::new();
    w.add_i32(100).add_raw(b"short\0");
    let err = reader(&w).read_string().unwrap_err();
    assert_eq!(err.code(), "invalid_file");
  }

  #[test]
  fn confirm_mismatch_is_invalid_file() {
    let mut w = SaveWriter::new();
    w.add_u32(41);
    let err = reader(&w).confirm_u32(42).unwrap_err();
    assert_eq!(err.code(), "invalid_file");

    let mut w = SaveWriter::new();
    w.add_string("Persistent");
    assert!(reader(&w).confirm_string("Persistent").is_ok());
  }

  #[test]
  fn expect_size_checks_consumption() {
    let mut w = SaveWriter::new();
    w.add_u32(1).add_u32(2);

    let mut r = reader(&w);
    assert!(r
      .expect_size(8, "pair", |r| {
        r.read_u32::<LittleEndian>()?;
        r.read_u32::<LittleEndian>()?;
        Ok(())
      })
      .is_ok());

    let mut r = reader(&w);
    let err = r
      .expect_size(8, "pair", |r| {
        r.read_u32::<LittleEndian>()?;
        Ok(())
      })
      .unwrap_err();
    assert_eq!(err.code(), "invalid_size");
  }

  #[test]
  fn read_raw_round_trips() {
    let mut w = SaveWriter::new();
    w.add_raw(&[1, 2, 3, 4]);
    let mut r = reader(&w);
    assert_eq!(r.read_raw(4).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(r.read_raw(0).unwrap(), Vec::<u8>::new());
    assert_eq!(r.read_raw(1).unwrap_err().code(), "invalid_file");
  }
}
