use std::{io, string::{FromUtf16Error, FromUtf8Error}};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
  #[error("Read error: {0}")]
  Read(#[from] io::Error),

  #[error("Unsupported save header version: {0}")]
  UnsupportedHeaderVersion(u32),

  #[error("Unsupported save version: {0}")]
  UnsupportedSaveVersion(u32),

  #[error("Invalid flag value {value} at offset {offset}")]
  InvalidFlag { value: u32, offset: u64 },

  #[error("Invalid file: {0}")]
  InvalidFile(String),

  #[error("{what}: size is {actual}, expected {expected}")]
  InvalidSize { what: &'static str, expected: u64, actual: u64 },

  #[error("Deserializer did not advance past offset {0}")]
  StalledDeserializer(u64),

  #[error("UTF-8 decoding error: {0}")]
  Utf8(#[from] FromUtf8Error),

  #[error("UTF-16 decoding error: {0}")]
  Utf16(#[from] FromUtf16Error),

  #[error("Missing object header for object at index {0}")]
  MissingObjectHeader(usize),

  #[error("Unknown object type: {0}")]
  UnknownObjectType(u32),

  #[error("Unknown session visibility: {0}")]
  UnknownSessionVisibility(u8),

  #[error("Unknown grid name: {0}")]
  UnknownGridName(String),

  #[error("Unknown property type: {0}")]
  UnknownPropertyType(String),

  #[error("Unknown array element type: {0}")]
  UnknownArrayElementType(String),

  #[error("Unknown map key type: {0}")]
  UnknownMapKeyType(String),

  #[error("Unknown map value type: {0}")]
  UnknownMapValueType(String),

  #[error("Unknown text history type: {0}")]
  UnknownTextHistoryType(u8),

  #[error("Unknown text argument type: {0}")]
  UnknownTextArgumentType(u8),

  #[error("Unknown client identity variant: {0}")]
  UnknownIdentityVariant(u8),
}

impl ParseError {
  /// Stable code for callers that match on failure categories instead of
  /// display strings
  pub fn code(&self) -> &'static str {
    match self {
      ParseError::Read(_)
      | ParseError::InvalidFile(_)
      | ParseError::MissingObjectHeader(_) => "invalid_file",
      ParseError::UnsupportedHeaderVersion(_) => "unsupported_save_header_version",
      ParseError::UnsupportedSaveVersion(_) => "unsupported_save_version",
      ParseError::InvalidFlag { .. } => "invalid_flag",
      ParseError::InvalidSize { .. } => "invalid_size",
      ParseError::StalledDeserializer(_) => "invalid_deserializer",
      ParseError::Utf8(_) | ParseError::Utf16(_) => "string_decode_failure",
      _ => "unk",
    }
  }
}
