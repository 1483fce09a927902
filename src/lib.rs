//! Bidirectional codec for the Satisfactory save-file format (header type
//! 14, save version 52).
//!
//! A save file is a fixed uncompressed header followed by a stream of
//! zlib-deflated chunks. The inflated chunk payloads concatenate into the
//! body: a grid table, the sublevels, the persistent level, and a trailing
//! reference table, with the bulk of the data expressed through a
//! recursive, self-describing property format.
//!
//! [`parse_save`] turns raw bytes into a [`SaveFile`]; [`write_save`] turns
//! a [`SaveFile`] back into bytes. A re-encoded file is byte-identical at
//! the decompressed layer only: zlib parameters and chunk split points are
//! implementation-defined.

use std::fs;
use std::io;
use std::path::Path;
use std::result;

use env_logger::Env;
use serde::{Deserialize, Serialize};

pub mod cursor;
pub mod errors;
pub mod level;
pub mod property;
pub mod save;
pub mod text;
pub mod typed_data;

use crate::cursor::SaveWriter;
use crate::errors::ParseError;
use crate::save::{read_chunked_body, write_chunked_body, SaveFileBody, SaveFileHeader};

pub type Result<T> = result::Result<T, ParseError>;

/// Accepted values of the header-type word
pub const SUPPORTED_HEADER_TYPES: &[u32] = &[14];

/// Accepted values of the save-version word
pub const SUPPORTED_SAVE_VERSIONS: &[u32] = &[52];

/// Unreal package signature opening every compressed chunk
pub const PACKAGE_SIGNATURE: u32 = 0x9E2A_83C1;

/// Upper bound on the decompressed size of a single chunk
pub const MAX_CHUNK_SIZE: u32 = 128 * 1024;

/// Save timestamps count 100 ns ticks
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Seconds between year 1 (proleptic Gregorian) and the Unix epoch
pub const EPOCH_1_TO_1970: i64 = 719_162 * 24 * 60 * 60;

/// Number of level grouping grids in every save body
pub const GRID_COUNT: usize = 5;

/// A fully-parsed save: the uncompressed header and the decompressed,
/// structured body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
  pub header: SaveFileHeader,
  pub body: SaveFileBody,
}

/// Parses a complete save file from raw bytes
pub fn parse_save(data: &[u8]) -> Result<SaveFile> {
  let _ = env_logger::try_init_from_env(Env::default());

  let mut cursor = io::Cursor::new(data);
  let header = SaveFileHeader::read(&mut cursor)?;
  let body_bytes = read_chunked_body(&mut cursor)?;

  let mut body_cursor = io::Cursor::new(body_bytes.as_slice());
  let body = SaveFileBody::read(&mut body_cursor)?;

  Ok(SaveFile { header, body })
}

/// Serializes a save back to bytes. The decompressed body round-trips
/// byte-for-byte; the compressed envelope may differ from the input file.
pub fn write_save(save: &SaveFile) -> Vec<u8> {
  let mut w = SaveWriter::new();
  save.header.write(&mut w);

  let mut body = SaveWriter::new();
  save.body.write(&mut body);
  write_chunked_body(&mut w, body.as_slice());

  w.into_bytes()
}

/// Reads and parses the save file at `path`
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<SaveFile> {
  let data = fs::read(path)?;
  parse_save(&data)
}

/// Serializes `save` and writes it to `path`
pub fn write_file<P: AsRef<Path>>(path: P, save: &SaveFile) -> Result<()> {
  Ok(fs::write(path, write_save(save))?)
}
