use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Duration, Utc};
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::cursor::{SaveReader, SaveWriter};
use crate::errors::ParseError;
use crate::level::{Level, ObjectReference};
use crate::{
  Result, EPOCH_1_TO_1970, GRID_COUNT, MAX_CHUNK_SIZE, PACKAGE_SIGNATURE,
  SUPPORTED_HEADER_TYPES, SUPPORTED_SAVE_VERSIONS, TICKS_PER_SECOND,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionVisibility {
  Private = 0,
  FriendsOnly = 1,
}

impl SessionVisibility {
  pub fn from_u8(value: u8) -> Option<SessionVisibility> {
    match value {
      0 => Some(SessionVisibility::Private),
      1 => Some(SessionVisibility::FriendsOnly),
      _ => None,
    }
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

/// The fixed, uncompressed prefix of every save file. The version gates
/// live here: files with other header types or save versions are rejected
/// before any chunk is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFileHeader {
  pub header_type: u32,
  pub save_version: u32,
  pub build_version: u32,
  pub save_name: String,
  pub map_name: String,
  pub map_options: String,
  pub session_name: String,
  pub play_duration: u32,
  pub save_ticks: u64,
  pub session_visibility: SessionVisibility,
  pub editor_object_version: u32,
  pub mod_metadata: String,
  pub mod_flags: u32,
  pub save_id: String,
  pub is_partitioned_world: bool,
  pub creative_mode_enabled: bool,
  pub checksum: [u8; 16],
  pub is_cheat: bool,
}

impl SaveFileHeader {
  pub fn read<R: SaveReader>(r: &mut R) -> Result<SaveFileHeader> {
    let header_type = r.read_u32::<LittleEndian>()?;
    if !SUPPORTED_HEADER_TYPES.contains(&header_type) {
      return Err(ParseError::UnsupportedHeaderVersion(header_type));
    }
    let save_version = r.read_u32::<LittleEndian>()?;
    if !SUPPORTED_SAVE_VERSIONS.contains(&save_version) {
      return Err(ParseError::UnsupportedSaveVersion(save_version));
    }

    let build_version = r.read_u32::<LittleEndian>()?;
    let save_name = r.read_string()?;
    let map_name = r.read_string()?;
    let map_options = r.read_string()?;
    let session_name = r.read_string()?;
    let play_duration = r.read_u32::<LittleEndian>()?;
    let save_ticks = r.read_u64::<LittleEndian>()?;
    let visibility_byte = r.read_u8()?;
    let session_visibility = SessionVisibility::from_u8(visibility_byte)
      .ok_or(ParseError::UnknownSessionVisibility(visibility_byte))?;
    let editor_object_version = r.read_u32::<LittleEndian>()?;
    let mod_metadata = r.read_string()?;
    let mod_flags = r.read_u32::<LittleEndian>()?;
    let save_id = r.read_string()?;
    let is_partitioned_world = r.read_u32_bool()?;
    let creative_mode_enabled = r.read_u32_bool()?;
    let mut checksum = [0u8; 16];
    r.read_exact(&mut checksum)?;
    let is_cheat = r.read_u32_bool()?;

    Ok(SaveFileHeader {
      header_type,
      save_version,
      build_version,
      save_name,
      map_name,
      map_options,
      session_name,
      play_duration,
      save_ticks,
      session_visibility,
      editor_object_version,
      mod_metadata,
      mod_flags,
      save_id,
      is_partitioned_world,
      creative_mode_enabled,
      checksum,
      is_cheat,
    })
  }

  pub fn write(&self, w: &mut SaveWriter) {
    w.add_u32(self.header_type)
      .add_u32(self.save_version)
      .add_u32(self.build_version)
      .add_string(&self.save_name)
      .add_string(&self.map_name)
      .add_string(&self.map_options)
      .add_string(&self.session_name)
      .add_u32(self.play_duration)
      .add_u64(self.save_ticks)
      .add_u8(self.session_visibility.as_u8())
      .add_u32(self.editor_object_version)
      .add_string(&self.mod_metadata)
      .add_u32(self.mod_flags)
      .add_string(&self.save_id)
      .add_u32_bool(self.is_partitioned_world)
      .add_u32_bool(self.creative_mode_enabled)
      .add_raw(&self.checksum)
      .add_u32_bool(self.is_cheat);
  }

  /// Wall-clock play time of the session
  pub fn play_time(&self) -> Duration {
    Duration::seconds(i64::from(self.play_duration))
  }

  /// Timestamp of the save. Ticks are 100 ns units counted from year 1
  /// proleptic Gregorian.
  pub fn save_time(&self) -> Option<DateTime<Utc>> {
    let seconds = (self.save_ticks / TICKS_PER_SECOND) as i64 - EPOCH_1_TO_1970;
    let nanos = (self.save_ticks % TICKS_PER_SECOND) * 100;
    DateTime::from_timestamp(seconds, nanos as u32)
  }
}

const CHUNK_PADDING_WORD: u32 = 0x2222_2222;
const CHUNK_COMPRESSOR_TAG: u32 = 0x0300_0000;

/// Reads chunk frames until the end of the buffer, concatenating their
/// decompressed payloads
pub(crate) fn read_chunked_body<R: SaveReader>(r: &mut R) -> Result<Vec<u8>> {
  let mut body = vec![];
  let mut chunks = 0usize;
  while r.offset() < r.data_len() {
    body.extend_from_slice(&read_chunk(r)?);
    chunks += 1;
  }
  debug!("inflated {} chunks into {} bytes", chunks, body.len());
  Ok(body)
}

fn read_chunk<R: SaveReader>(r: &mut R) -> Result<Vec<u8>> {
  r.confirm_u32(PACKAGE_SIGNATURE)?;
  r.confirm_u32(CHUNK_PADDING_WORD)?;
  r.confirm_u8(0)?;
  // Maximum chunk size; historically 131072, not validated
  r.read_u32::<LittleEndian>()?;
  r.confirm_u32(CHUNK_COMPRESSOR_TAG)?;

  let compressed_size = r.read_u64::<LittleEndian>()?;
  let uncompressed_size = r.read_u64::<LittleEndian>()?;
  if r.read_u64::<LittleEndian>()? != compressed_size {
    return Err(ParseError::InvalidFile(
      "compressed chunk size mismatch".to_owned(),
    ));
  }
  if r.read_u64::<LittleEndian>()? != uncompressed_size {
    return Err(ParseError::InvalidFile(
      "uncompressed chunk size mismatch".to_owned(),
    ));
  }

  let compressed = r.read_raw(compressed_size as usize)?;
  let mut payload = Vec::with_capacity(uncompressed_size as usize);
  ZlibDecoder::new(&compressed[..]).read_to_end(&mut payload)?;
  if payload.len() as u64 != uncompressed_size {
    return Err(ParseError::InvalidFile(format!(
      "chunk inflated to {} bytes, expected {}",
      payload.len(),
      uncompressed_size
    )));
  }

  Ok(payload)
}

/// Splits `payload` into chunks of at most [`MAX_CHUNK_SIZE`] bytes and
/// writes each as an independently-deflated frame
pub(crate) fn write_chunked_body(w: &mut SaveWriter, payload: &[u8]) {
  for chunk in payload.chunks(MAX_CHUNK_SIZE as usize) {
    write_chunk(w, chunk);
  }
}

fn write_chunk(w: &mut SaveWriter, payload: &[u8]) {
  let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
  encoder
    .write_all(payload)
    .expect("deflating into memory cannot fail");
  let compressed = encoder
    .finish()
    .expect("deflating into memory cannot fail");

  w.add_u32(PACKAGE_SIGNATURE)
    .add_u32(CHUNK_PADDING_WORD)
    .add_u8(0)
    .add_u32(MAX_CHUNK_SIZE)
    .add_u32(CHUNK_COMPRESSOR_TAG)
    .add_u64(compressed.len() as u64)
    .add_u64(payload.len() as u64)
    .add_u64(compressed.len() as u64)
    .add_u64(payload.len() as u64)
    .add_raw(&compressed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
pub enum GridName {
  #[strum(serialize = "MainGrid")]
  Main,
  #[strum(serialize = "LandscapeGrid")]
  Landscape,
  #[strum(serialize = "ExplorationGrid")]
  Exploration,
  #[strum(serialize = "FoliageGrid")]
  Foliage,
  #[strum(serialize = "HLOD0_256m_1023m")]
  Hlod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
  pub name: String,
  pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelGroupingGrid {
  pub grid_name: GridName,
  pub unknown_1: u32,
  pub unknown_2: u32,
  pub levels: Vec<LevelInfo>,
}

impl LevelGroupingGrid {
  fn read<R: SaveReader>(r: &mut R) -> Result<LevelGroupingGrid> {
    let grid_name = r.read_string()?;
    let grid_name =
      GridName::from_str(&grid_name).map_err(|_| ParseError::UnknownGridName(grid_name))?;
    let unknown_1 = r.read_u32::<LittleEndian>()?;
    let unknown_2 = r.read_u32::<LittleEndian>()?;
    let count = r.read_u32::<LittleEndian>()?;
    let mut levels = Vec::with_capacity(count as usize);
    for _ in 0..count {
      levels.push(LevelInfo {
        name: r.read_string()?,
        value: r.read_u32::<LittleEndian>()?,
      });
    }
    Ok(LevelGroupingGrid {
      grid_name,
      unknown_1,
      unknown_2,
      levels,
    })
  }

  fn write(&self, w: &mut SaveWriter) {
    w.add_string(self.grid_name.as_ref())
      .add_u32(self.unknown_1)
      .add_u32(self.unknown_2)
      .add_u32(self.levels.len() as u32);
    for level in &self.levels {
      w.add_string(&level.name).add_u32(level.value);
    }
  }
}

/// The decompressed body of a save: a short prefix of literals and two
/// unknown words, five grouping grids, the sublevels, the persistent level,
/// and a trailing reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFileBody {
  pub unknown_1: u32,
  pub unknown_2: u32,
  pub grids: Vec<LevelGroupingGrid>,
  pub sublevels: Vec<Level>,
  pub persistent_level: Level,
  pub references: Vec<ObjectReference>,
}

impl SaveFileBody {
  pub fn read<R: SaveReader>(r: &mut R) -> Result<SaveFileBody> {
    // Declared body size; informational only
    r.read_u64::<LittleEndian>()?;
    r.read_u32::<LittleEndian>()?;
    r.confirm_string("None")?;
    r.confirm_u32(0)?;
    let unknown_1 = r.read_u32::<LittleEndian>()?;
    r.confirm_u32(1)?;
    r.confirm_string("None")?;
    let unknown_2 = r.read_u32::<LittleEndian>()?;

    let mut grids = Vec::with_capacity(GRID_COUNT);
    for _ in 0..GRID_COUNT {
      grids.push(LevelGroupingGrid::read(r)?);
    }

    let sublevel_count = r.read_u32::<LittleEndian>()?;
    debug!("{} sublevels", sublevel_count);
    let mut sublevels = Vec::with_capacity(sublevel_count as usize);
    for _ in 0..sublevel_count {
      sublevels.push(Level::read(r, false)?);
    }

    let persistent_level = Level::read(r, true)?;

    // Some emitters drop the trailing zero reference count
    let references = if r.offset() == r.data_len() {
      warn!("body ends without a reference count; assuming an empty table");
      vec![]
    } else {
      let count = r.read_u32::<LittleEndian>()?;
      let mut references = Vec::with_capacity(count as usize);
      for _ in 0..count {
        references.push(ObjectReference::read(r)?);
      }
      references
    };

    Ok(SaveFileBody {
      unknown_1,
      unknown_2,
      grids,
      sublevels,
      persistent_level,
      references,
    })
  }

  pub fn write(&self, w: &mut SaveWriter) {
    let mut body = SaveWriter::new();
    body.add_u32(6);
    body.add_string("None");
    body.add_u32(0);
    body.add_u32(self.unknown_1);
    body.add_u32(1);
    body.add_string("None");
    body.add_u32(self.unknown_2);

    for grid in &self.grids {
      grid.write(&mut body);
    }

    body.add_u32(self.sublevels.len() as u32);
    for level in &self.sublevels {
      level.write(&mut body, false);
    }
    self.persistent_level.write(&mut body, true);

    body.add_u32(self.references.len() as u32);
    for reference in &self.references {
      reference.write(&mut body);
    }

    w.add_u64(body.len()).add_raw(body.as_slice());
  }
}
