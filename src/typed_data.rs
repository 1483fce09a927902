use std::io::{Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::cursor::{SaveReader, SaveWriter};
use crate::errors::ParseError;
use crate::level::{ObjectReference, Quaternion, Vector3};
use crate::property::{read_properties, write_properties, Property};
use crate::Result;

/// Value of a struct-typed property, dispatched on the wire-level struct
/// type name. Types outside the well-known set carry either a nested
/// property stream or, when that fails to parse, the raw payload bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructValue {
  LinearColor { r: f32, g: f32, b: f32, a: f32 },
  Vector(Vector3<f64>),
  Quat(Quaternion<f64>),
  Box(BoundingBox),
  InventoryItem(InventoryItem),
  FluidBox(f32),
  RailroadTrackPosition(RailroadTrackPosition),
  DateTime(i64),
  ClientIdentityInfo(ClientIdentityInfo),
  SpawnData(SpawnData),
  Guid(Vec<u8>),
  Properties(Vec<Property>),
  Opaque(Vec<u8>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub min_x: f64,
  pub min_y: f64,
  pub min_z: f64,
  pub max_x: f64,
  pub max_y: f64,
  pub max_z: f64,
  pub is_valid: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
  pub name: String,
  pub payload: Option<InventoryItemPayload>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemPayload {
  pub type_path: String,
  pub properties: Vec<Property>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailroadTrackPosition {
  pub reference: ObjectReference,
  pub offset: f32,
  pub forward: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientIdentityVariant {
  Epic = 1,
  Steam = 6,
}

impl ClientIdentityVariant {
  pub fn from_u8(value: u8) -> Option<ClientIdentityVariant> {
    match value {
      1 => Some(ClientIdentityVariant::Epic),
      6 => Some(ClientIdentityVariant::Steam),
      _ => None,
    }
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
  pub variant: ClientIdentityVariant,
  pub data: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentityInfo {
  pub uuid: String,
  pub identities: Vec<ClientIdentity>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnData {
  pub name: String,
  pub level_path: ObjectReference,
  pub properties: Vec<Property>,
}

impl InventoryItem {
  fn read<R: SaveReader>(r: &mut R) -> Result<InventoryItem> {
    r.read_u32::<LittleEndian>()?;
    let name = r.read_string()?;
    let payload = if r.read_u32_bool()? {
      r.read_u32::<LittleEndian>()?;
      let type_path = r.read_string()?;
      let size = r.read_u32::<LittleEndian>()?;
      let properties = r.expect_size(u64::from(size), "InventoryItem.properties", read_properties)?;
      Some(InventoryItemPayload {
        type_path,
        properties,
      })
    } else {
      None
    };
    Ok(InventoryItem { name, payload })
  }

  fn write(&self, w: &mut SaveWriter) {
    w.add_u32(0)
      .add_string(&self.name)
      .add_u32_bool(self.payload.is_some());
    if let Some(payload) = &self.payload {
      let mut properties = SaveWriter::new();
      write_properties(&mut properties, &payload.properties);
      w.add_u32(0)
        .add_string(&payload.type_path)
        .add_u32(properties.len() as u32)
        .add_raw(properties.as_slice());
    }
  }
}

impl ClientIdentityInfo {
  fn read<R: SaveReader>(r: &mut R) -> Result<ClientIdentityInfo> {
    let uuid = r.read_string()?;
    let count = r.read_u32::<LittleEndian>()?;
    let mut identities = Vec::with_capacity(count as usize);
    for _ in 0..count {
      let variant_byte = r.read_u8()?;
      let variant = ClientIdentityVariant::from_u8(variant_byte)
        .ok_or(ParseError::UnknownIdentityVariant(variant_byte))?;
      let size = r.read_u32::<LittleEndian>()?;
      identities.push(ClientIdentity {
        variant,
        data: r.read_raw(size as usize)?,
      });
    }
    Ok(ClientIdentityInfo { uuid, identities })
  }

  fn write(&self, w: &mut SaveWriter) {
    w.add_string(&self.uuid).add_u32(self.identities.len() as u32);
    for identity in &self.identities {
      w.add_u8(identity.variant.as_u8())
        .add_u32(identity.data.len() as u32)
        .add_raw(&identity.data);
    }
  }
}

impl SpawnData {
  fn read<R: SaveReader>(r: &mut R) -> Result<SpawnData> {
    let name = r.read_string()?;
    r.confirm_string("ObjectProperty")?;
    let size = r.read_u32::<LittleEndian>()?;
    r.confirm_u32(0)?;
    r.confirm_u8(0)?;
    let level_path = r.expect_size(u64::from(size), "SpawnData", ObjectReference::read)?;
    // The property stream sits outside the declared bracket on the wire
    let properties = read_properties(r)?;
    Ok(SpawnData {
      name,
      level_path,
      properties,
    })
  }

  fn write(&self, w: &mut SaveWriter) {
    w.add_string(&self.name).add_string("ObjectProperty");
    let mut level_path = SaveWriter::new();
    self.level_path.write(&mut level_path);
    w.add_u32(level_path.len() as u32)
      .add_u32(0)
      .add_u8(0)
      .add_raw(level_path.as_slice());
    write_properties(w, &self.properties);
  }
}

/// Reads a struct value whose type name is in the well-known set. Returns
/// `None` without consuming anything when the type is not recognized.
pub(crate) fn read_known_struct_value<R: SaveReader>(
  r: &mut R,
  struct_type: &str,
  payload_size: u32,
) -> Result<Option<StructValue>> {
  let value = match struct_type {
    "LinearColor" | "Color" => StructValue::LinearColor {
      r: r.read_f32::<LittleEndian>()?,
      g: r.read_f32::<LittleEndian>()?,
      b: r.read_f32::<LittleEndian>()?,
      a: r.read_f32::<LittleEndian>()?,
    },
    "Vector" | "Rotator" => StructValue::Vector(Vector3::read_double(r)?),
    "Quat" => StructValue::Quat(Quaternion::read_double(r)?),
    "Box" => StructValue::Box(BoundingBox {
      min_x: r.read_f64::<LittleEndian>()?,
      min_y: r.read_f64::<LittleEndian>()?,
      min_z: r.read_f64::<LittleEndian>()?,
      max_x: r.read_f64::<LittleEndian>()?,
      max_y: r.read_f64::<LittleEndian>()?,
      max_z: r.read_f64::<LittleEndian>()?,
      is_valid: r.read_u8_bool()?,
    }),
    "InventoryItem" => StructValue::InventoryItem(InventoryItem::read(r)?),
    "FluidBox" => StructValue::FluidBox(r.read_f32::<LittleEndian>()?),
    "RailroadTrackPosition" => StructValue::RailroadTrackPosition(RailroadTrackPosition {
      reference: ObjectReference::read(r)?,
      offset: r.read_f32::<LittleEndian>()?,
      forward: r.read_f32::<LittleEndian>()?,
    }),
    "DateTime" => StructValue::DateTime(r.read_i64::<LittleEndian>()?),
    "ClientIdentityInfo" => StructValue::ClientIdentityInfo(ClientIdentityInfo::read(r)?),
    "SpawnData" => StructValue::SpawnData(SpawnData::read(r)?),
    "Guid" => StructValue::Guid(r.read_raw(payload_size as usize)?),
    _ => return Ok(None),
  };
  Ok(Some(value))
}

/// Reads a struct value of any type. Unrecognized types are parsed as a
/// nested property stream; when that fails the cursor rewinds and the whole
/// payload is kept as raw bytes.
pub(crate) fn read_struct_value<R: SaveReader>(
  r: &mut R,
  struct_type: &str,
  payload_size: u32,
) -> Result<StructValue> {
  if let Some(value) = read_known_struct_value(r, struct_type, payload_size)? {
    return Ok(value);
  }

  let start = r.offset();
  match read_properties(r) {
    Ok(properties) => Ok(StructValue::Properties(properties)),
    Err(err) => {
      warn!(
        "struct value '{struct_type}' at offset {start} did not parse as properties ({err}); \
         keeping {payload_size} raw bytes"
      );
      r.seek(SeekFrom::Start(start))?;
      Ok(StructValue::Opaque(r.read_raw(payload_size as usize)?))
    }
  }
}

impl StructValue {
  pub(crate) fn write(&self, w: &mut SaveWriter) {
    match self {
      StructValue::LinearColor { r, g, b, a } => {
        w.add_f32(*r).add_f32(*g).add_f32(*b).add_f32(*a);
      }
      StructValue::Vector(vector) => {
        vector.write(w);
      }
      StructValue::Quat(quat) => {
        quat.write(w);
      }
      StructValue::Box(bounds) => {
        w.add_f64(bounds.min_x)
          .add_f64(bounds.min_y)
          .add_f64(bounds.min_z)
          .add_f64(bounds.max_x)
          .add_f64(bounds.max_y)
          .add_f64(bounds.max_z)
          .add_u8_bool(bounds.is_valid);
      }
      StructValue::InventoryItem(item) => item.write(w),
      StructValue::FluidBox(value) => {
        w.add_f32(*value);
      }
      StructValue::RailroadTrackPosition(position) => {
        position.reference.write(w);
        w.add_f32(position.offset).add_f32(position.forward);
      }
      StructValue::DateTime(ticks) => {
        w.add_i64(*ticks);
      }
      StructValue::ClientIdentityInfo(info) => info.write(w),
      StructValue::SpawnData(data) => data.write(w),
      StructValue::Guid(data) | StructValue::Opaque(data) => {
        w.add_raw(data);
      }
      StructValue::Properties(properties) => write_properties(w, properties),
    }
  }
}
