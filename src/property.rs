use std::io::{Seek, SeekFrom};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::cursor::{SaveReader, SaveWriter};
use crate::errors::ParseError;
use crate::level::ObjectReference;
use crate::text::TextValue;
use crate::typed_data::{read_known_struct_value, read_struct_value, StructValue};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
pub enum PropertyTypeName {
  #[strum(serialize = "ArrayProperty")]
  Array,
  #[strum(serialize = "BoolProperty")]
  Bool,
  #[strum(serialize = "ByteProperty")]
  Byte,
  #[strum(serialize = "EnumProperty")]
  Enum,
  #[strum(serialize = "FloatProperty")]
  Float,
  #[strum(serialize = "DoubleProperty")]
  Double,
  #[strum(serialize = "IntProperty")]
  Int,
  #[strum(serialize = "Int8Property")]
  Int8,
  #[strum(serialize = "Int64Property")]
  Int64,
  #[strum(serialize = "UInt32Property")]
  UInt32,
  #[strum(serialize = "NameProperty")]
  Name,
  #[strum(serialize = "ObjectProperty")]
  Object,
  #[strum(serialize = "SoftObjectProperty")]
  SoftObject,
  #[strum(serialize = "StrProperty")]
  Str,
  #[strum(serialize = "TextProperty")]
  Text,
  #[strum(serialize = "SetProperty")]
  Set,
  #[strum(serialize = "StructProperty")]
  Struct,
  #[strum(serialize = "MapProperty")]
  Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
pub enum ArrayElementTypeName {
  #[strum(serialize = "ByteProperty")]
  Byte,
  #[strum(serialize = "EnumProperty")]
  Enum,
  #[strum(serialize = "StrProperty")]
  Str,
  #[strum(serialize = "InterfaceProperty")]
  Interface,
  #[strum(serialize = "ObjectProperty")]
  Object,
  #[strum(serialize = "IntProperty")]
  Int,
  #[strum(serialize = "Int64Property")]
  Int64,
  #[strum(serialize = "FloatProperty")]
  Float,
  #[strum(serialize = "SoftObjectProperty")]
  SoftObject,
  #[strum(serialize = "StructProperty")]
  Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
pub enum MapKeyTypeName {
  #[strum(serialize = "ObjectProperty")]
  Object,
  #[strum(serialize = "IntProperty")]
  Int,
  #[strum(serialize = "Int64Property")]
  Int64,
  #[strum(serialize = "NameProperty")]
  Name,
  #[strum(serialize = "StrProperty")]
  Str,
  #[strum(serialize = "EnumProperty")]
  Enum,
  #[strum(serialize = "StructProperty")]
  Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Serialize, Deserialize)]
pub enum MapValueTypeName {
  #[strum(serialize = "ByteProperty")]
  Byte,
  #[strum(serialize = "BoolProperty")]
  Bool,
  #[strum(serialize = "IntProperty")]
  Int,
  #[strum(serialize = "Int64Property")]
  Int64,
  #[strum(serialize = "FloatProperty")]
  Float,
  #[strum(serialize = "DoubleProperty")]
  Double,
  #[strum(serialize = "StrProperty")]
  Str,
  #[strum(serialize = "ObjectProperty")]
  Object,
  #[strum(serialize = "TextProperty")]
  Text,
  #[strum(serialize = "StructProperty")]
  Struct,
}

/// A single named, type-tagged element of a property stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub name: String,
  pub index: u32,
  pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
  Bool(bool),
  Byte {
    inner_type: String,
    value: ByteValue,
  },
  Enum {
    inner_type: String,
    value: String,
  },
  Float(f32),
  Double(f64),
  Int(i32),
  Int8(i8),
  Int64(i64),
  UInt32(u32),
  Name(String),
  Str(String),
  Object(ObjectReference),
  SoftObject(SoftObjectReference),
  Text(TextValue),
  Array(ArrayValue),
  Set {
    set_type: String,
    value: SetValue,
  },
  Struct {
    struct_type: String,
    uuid: Vec<u8>,
    value: StructValue,
  },
  Map(MapData),
}

/// Byte properties carry either a plain byte or, when the inner type names
/// an enum, its entry name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ByteValue {
  Byte(u8),
  Name(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftObjectReference {
  pub reference: ObjectReference,
  pub unknown: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValue {
  Byte(Vec<u8>),
  Enum(Vec<String>),
  Str(Vec<String>),
  Interface(Vec<ObjectReference>),
  Object(Vec<ObjectReference>),
  Int(Vec<i32>),
  Int64(Vec<i64>),
  Float(Vec<f32>),
  SoftObject(Vec<SoftObjectReference>),
  Struct(StructArray),
}

/// Struct-typed arrays carry their own header: a mirror of the property
/// name, an inner payload size, the element type, and an opaque UUID run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructArray {
  pub name: String,
  pub element_type: String,
  pub uuid: Vec<u8>,
  pub elements: StructArrayElements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructArrayElements {
  Values(Vec<StructValue>),
  Opaque { length: u32, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetValue {
  Object(Vec<ObjectReference>),
  UInt32(Vec<u32>),
  Struct(Vec<(u64, u64)>),
  Opaque { length: u32, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
  pub key_type: MapKeyTypeName,
  pub value_type: MapValueTypeName,
  pub mode: u32,
  pub entries: Vec<(MapKey, MapValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapKey {
  Int(i32),
  Int64(i64),
  Name(String),
  Str(String),
  Enum(String),
  Object(ObjectReference),
  Struct(i32, i32, i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapValue {
  Byte(u8),
  ByteString(String),
  Bool(bool),
  Int(i32),
  Int64(i64),
  Float(f32),
  Double(f64),
  Str(String),
  Object(ObjectReference),
  Text(TextValue),
  Properties(Vec<Property>),
}

/// Reads properties until the terminating `"None"` name
pub fn read_properties<R: SaveReader>(r: &mut R) -> Result<Vec<Property>> {
  let mut properties = vec![];

  loop {
    let name = r.read_string()?;
    if name == "None" {
      break;
    }

    let type_name = r.read_string()?;
    let type_name = PropertyTypeName::from_str(&type_name)
      .map_err(|_| ParseError::UnknownPropertyType(type_name))?;
    let payload_size = r.read_u32::<LittleEndian>()?;
    let index = r.read_u32::<LittleEndian>()?;

    debug!("property '{}' ({}) at offset {}", name, type_name.as_ref(), r.offset());

    let start = r.offset();
    let value = read_property_value(r, type_name, payload_size)?;
    if r.offset() == start {
      return Err(ParseError::StalledDeserializer(start));
    }

    properties.push(Property { name, index, value });
  }

  Ok(properties)
}

/// Writes each property and the terminating `"None"` name
pub fn write_properties(w: &mut SaveWriter, properties: &[Property]) {
  for property in properties {
    property.write(w);
  }
  w.add_string("None");
}

fn read_property_value<R: SaveReader>(
  r: &mut R,
  type_name: PropertyTypeName,
  payload_size: u32,
) -> Result<PropertyValue> {
  match type_name {
    PropertyTypeName::Bool => {
      let value = r.read_u8_bool()?;
      r.read_u8()?;
      Ok(PropertyValue::Bool(value))
    }
    PropertyTypeName::Byte => {
      let inner_type = r.read_string()?;
      r.read_u8()?;
      let value = if inner_type == "None" {
        ByteValue::Byte(r.read_u8()?)
      } else {
        ByteValue::Name(r.read_string()?)
      };
      Ok(PropertyValue::Byte { inner_type, value })
    }
    PropertyTypeName::Enum => {
      let inner_type = r.read_string()?;
      r.read_u8()?;
      Ok(PropertyValue::Enum {
        inner_type,
        value: r.read_string()?,
      })
    }
    PropertyTypeName::Float => {
      r.read_u8()?;
      Ok(PropertyValue::Float(r.read_f32::<LittleEndian>()?))
    }
    PropertyTypeName::Double => {
      r.read_u8()?;
      Ok(PropertyValue::Double(r.read_f64::<LittleEndian>()?))
    }
    PropertyTypeName::Int => {
      r.read_u8()?;
      Ok(PropertyValue::Int(r.read_i32::<LittleEndian>()?))
    }
    PropertyTypeName::Int8 => {
      r.read_u8()?;
      Ok(PropertyValue::Int8(r.read_i8()?))
    }
    PropertyTypeName::Int64 => {
      r.read_u8()?;
      Ok(PropertyValue::Int64(r.read_i64::<LittleEndian>()?))
    }
    PropertyTypeName::UInt32 => {
      r.read_u8()?;
      Ok(PropertyValue::UInt32(r.read_u32::<LittleEndian>()?))
    }
    PropertyTypeName::Name => {
      r.read_u8()?;
      Ok(PropertyValue::Name(r.read_string()?))
    }
    PropertyTypeName::Str => {
      r.read_u8()?;
      Ok(PropertyValue::Str(r.read_string()?))
    }
    PropertyTypeName::Object => {
      r.read_u8()?;
      Ok(PropertyValue::Object(ObjectReference::read(r)?))
    }
    PropertyTypeName::SoftObject => {
      r.read_u8()?;
      Ok(PropertyValue::SoftObject(SoftObjectReference {
        reference: ObjectReference::read(r)?,
        unknown: r.read_u32::<LittleEndian>()?,
      }))
    }
    PropertyTypeName::Text => {
      r.read_u8()?;
      Ok(PropertyValue::Text(TextValue::read(r)?))
    }
    PropertyTypeName::Array => read_array_value(r, payload_size),
    PropertyTypeName::Set => read_set_value(r, payload_size),
    PropertyTypeName::Struct => read_struct_property_value(r, payload_size),
    PropertyTypeName::Map => read_map_value(r, payload_size),
  }
}

fn read_array_value<R: SaveReader>(r: &mut R, payload_size: u32) -> Result<PropertyValue> {
  let element_type = r.read_string()?;
  let element_type = ArrayElementTypeName::from_str(&element_type)
    .map_err(|_| ParseError::UnknownArrayElementType(element_type))?;
  r.confirm_u8(0)?;

  let value = r.expect_size(u64::from(payload_size), "ArrayProperty", |r| {
    let length = r.read_u32::<LittleEndian>()?;
    match element_type {
      ArrayElementTypeName::Byte => Ok(ArrayValue::Byte(r.read_raw(length as usize)?)),
      ArrayElementTypeName::Enum => {
        Ok(ArrayValue::Enum(read_list(r, length, SaveReader::read_string)?))
      }
      ArrayElementTypeName::Str => {
        Ok(ArrayValue::Str(read_list(r, length, SaveReader::read_string)?))
      }
      ArrayElementTypeName::Interface => {
        Ok(ArrayValue::Interface(read_list(r, length, ObjectReference::read)?))
      }
      ArrayElementTypeName::Object => {
        Ok(ArrayValue::Object(read_list(r, length, ObjectReference::read)?))
      }
      ArrayElementTypeName::Int => Ok(ArrayValue::Int(read_list(r, length, |r| {
        Ok(r.read_i32::<LittleEndian>()?)
      })?)),
      ArrayElementTypeName::Int64 => Ok(ArrayValue::Int64(read_list(r, length, |r| {
        Ok(r.read_i64::<LittleEndian>()?)
      })?)),
      ArrayElementTypeName::Float => Ok(ArrayValue::Float(read_list(r, length, |r| {
        Ok(r.read_f32::<LittleEndian>()?)
      })?)),
      ArrayElementTypeName::SoftObject => {
        Ok(ArrayValue::SoftObject(read_list(r, length, |r| {
          Ok(SoftObjectReference {
            reference: ObjectReference::read(r)?,
            unknown: r.read_u32::<LittleEndian>()?,
          })
        })?))
      }
      ArrayElementTypeName::Struct => Ok(ArrayValue::Struct(read_struct_array(r, length)?)),
    }
  })?;

  Ok(PropertyValue::Array(value))
}

fn read_list<R, T, F>(r: &mut R, length: u32, mut read: F) -> Result<Vec<T>>
where
  R: SaveReader,
  F: FnMut(&mut R) -> Result<T>,
{
  let mut items = Vec::with_capacity(length as usize);
  for _ in 0..length {
    items.push(read(r)?);
  }
  Ok(items)
}

fn read_struct_array<R: SaveReader>(r: &mut R, length: u32) -> Result<StructArray> {
  let name = r.read_string()?;
  r.read_string()?;
  let inner_size = r.read_u32::<LittleEndian>()?;
  r.read_u32::<LittleEndian>()?;
  let element_type = r.read_string()?;
  let uuid = r.read_raw(17)?;

  let elements = r.expect_size(u64::from(inner_size), "ArrayProperty.structs", |r| {
    let start = r.offset();
    let mut values = Vec::with_capacity(length as usize);
    for _ in 0..length {
      if let Some(value) = read_known_struct_value(r, &element_type, inner_size)? {
        values.push(value);
        continue;
      }
      let element_start = r.offset();
      match read_properties(r) {
        Ok(properties) => values.push(StructValue::Properties(properties)),
        Err(err) => {
          // One bad element makes the whole payload opaque
          warn!(
            "struct array element '{element_type}' at offset {element_start} did not parse \
             ({err}); keeping {inner_size} raw bytes"
          );
          r.seek(SeekFrom::Start(start))?;
          return Ok(StructArrayElements::Opaque {
            length,
            data: r.read_raw(inner_size as usize)?,
          });
        }
      }
    }
    Ok(StructArrayElements::Values(values))
  })?;

  Ok(StructArray {
    name,
    element_type,
    uuid,
    elements,
  })
}

fn read_set_value<R: SaveReader>(r: &mut R, payload_size: u32) -> Result<PropertyValue> {
  let set_type = r.read_string()?;
  r.read_u8()?;

  let value = r.expect_size(u64::from(payload_size), "SetProperty", |r| {
    r.read_u32::<LittleEndian>()?;
    let length = r.read_u32::<LittleEndian>()?;
    match set_type.as_str() {
      "ObjectProperty" => Ok(SetValue::Object(read_list(r, length, ObjectReference::read)?)),
      "UInt32Property" => Ok(SetValue::UInt32(read_list(r, length, |r| {
        Ok(r.read_u32::<LittleEndian>()?)
      })?)),
      "StructProperty" => Ok(SetValue::Struct(read_list(r, length, |r| {
        Ok((r.read_u64::<LittleEndian>()?, r.read_u64::<LittleEndian>()?))
      })?)),
      other => {
        warn!("no set deserializer for element type '{other}'; keeping raw bytes");
        let remaining = u64::from(payload_size).saturating_sub(8);
        Ok(SetValue::Opaque {
          length,
          data: r.read_raw(remaining as usize)?,
        })
      }
    }
  })?;

  Ok(PropertyValue::Set { set_type, value })
}

fn read_struct_property_value<R: SaveReader>(r: &mut R, payload_size: u32) -> Result<PropertyValue> {
  let struct_type = r.read_string()?;
  let uuid = r.read_raw(17)?;
  let value = read_struct_value(r, &struct_type, payload_size)?;
  Ok(PropertyValue::Struct {
    struct_type,
    uuid,
    value,
  })
}

fn read_map_value<R: SaveReader>(r: &mut R, payload_size: u32) -> Result<PropertyValue> {
  let key_type = r.read_string()?;
  let key_type =
    MapKeyTypeName::from_str(&key_type).map_err(|_| ParseError::UnknownMapKeyType(key_type))?;
  let value_type = r.read_string()?;
  let value_type = MapValueTypeName::from_str(&value_type)
    .map_err(|_| ParseError::UnknownMapValueType(value_type))?;
  r.read_u8()?;

  let (mode, entries) = r.expect_size(u64::from(payload_size), "MapProperty", |r| {
    let mode = r.read_u32::<LittleEndian>()?;
    let count = r.read_u32::<LittleEndian>()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
      let key = match key_type {
        MapKeyTypeName::Int => MapKey::Int(r.read_i32::<LittleEndian>()?),
        MapKeyTypeName::Int64 => MapKey::Int64(r.read_i64::<LittleEndian>()?),
        MapKeyTypeName::Name => MapKey::Name(r.read_string()?),
        MapKeyTypeName::Str => MapKey::Str(r.read_string()?),
        MapKeyTypeName::Enum => MapKey::Enum(r.read_string()?),
        MapKeyTypeName::Object => MapKey::Object(ObjectReference::read(r)?),
        MapKeyTypeName::Struct => MapKey::Struct(
          r.read_i32::<LittleEndian>()?,
          r.read_i32::<LittleEndian>()?,
          r.read_i32::<LittleEndian>()?,
        ),
      };
      let value = match value_type {
        MapValueTypeName::Byte => {
          if key_type == MapKeyTypeName::Str {
            MapValue::ByteString(r.read_string()?)
          } else {
            MapValue::Byte(r.read_u8()?)
          }
        }
        MapValueTypeName::Bool => MapValue::Bool(r.read_u8_bool()?),
        MapValueTypeName::Int => MapValue::Int(r.read_i32::<LittleEndian>()?),
        MapValueTypeName::Int64 => MapValue::Int64(r.read_i64::<LittleEndian>()?),
        MapValueTypeName::Float => MapValue::Float(r.read_f32::<LittleEndian>()?),
        MapValueTypeName::Double => MapValue::Double(r.read_f64::<LittleEndian>()?),
        MapValueTypeName::Str => MapValue::Str(r.read_string()?),
        MapValueTypeName::Object => MapValue::Object(ObjectReference::read(r)?),
        MapValueTypeName::Text => MapValue::Text(TextValue::read(r)?),
        MapValueTypeName::Struct => MapValue::Properties(read_properties(r)?),
      };
      entries.push((key, value));
    }
    Ok((mode, entries))
  })?;

  Ok(PropertyValue::Map(MapData {
    key_type,
    value_type,
    mode,
    entries,
  }))
}

impl Property {
  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_string(&self.name);
    w.add_string(self.value.type_name().as_ref());
    self.value.write_body(w, self.index);
  }
}

impl PropertyValue {
  pub fn type_name(&self) -> PropertyTypeName {
    match self {
      PropertyValue::Bool(_) => PropertyTypeName::Bool,
      PropertyValue::Byte { .. } => PropertyTypeName::Byte,
      PropertyValue::Enum { .. } => PropertyTypeName::Enum,
      PropertyValue::Float(_) => PropertyTypeName::Float,
      PropertyValue::Double(_) => PropertyTypeName::Double,
      PropertyValue::Int(_) => PropertyTypeName::Int,
      PropertyValue::Int8(_) => PropertyTypeName::Int8,
      PropertyValue::Int64(_) => PropertyTypeName::Int64,
      PropertyValue::UInt32(_) => PropertyTypeName::UInt32,
      PropertyValue::Name(_) => PropertyTypeName::Name,
      PropertyValue::Str(_) => PropertyTypeName::Str,
      PropertyValue::Object(_) => PropertyTypeName::Object,
      PropertyValue::SoftObject(_) => PropertyTypeName::SoftObject,
      PropertyValue::Text(_) => PropertyTypeName::Text,
      PropertyValue::Array(_) => PropertyTypeName::Array,
      PropertyValue::Set { .. } => PropertyTypeName::Set,
      PropertyValue::Struct { .. } => PropertyTypeName::Struct,
      PropertyValue::Map(_) => PropertyTypeName::Map,
    }
  }

  /// Writes the payload size, array index, the kind-specific header fields,
  /// and the payload itself. Sizes are measured by serializing the payload
  /// into a scratch writer first.
  fn write_body(&self, w: &mut SaveWriter, index: u32) {
    match self {
      PropertyValue::Bool(value) => {
        // The value lives ahead of the payload; the payload itself is empty
        w.add_u32(0).add_u32(index).add_u8_bool(*value).add_u8(0);
      }
      PropertyValue::Byte { inner_type, value } => {
        let mut payload = SaveWriter::new();
        match value {
          ByteValue::Byte(byte) => {
            payload.add_u8(*byte);
          }
          ByteValue::Name(name) => {
            payload.add_string(name);
          }
        }
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(inner_type)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Enum { inner_type, value } => {
        let mut payload = SaveWriter::new();
        payload.add_string(value);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(inner_type)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Float(value) => {
        w.add_u32(4).add_u32(index).add_u8(0).add_f32(*value);
      }
      PropertyValue::Double(value) => {
        w.add_u32(8).add_u32(index).add_u8(0).add_f64(*value);
      }
      PropertyValue::Int(value) => {
        w.add_u32(4).add_u32(index).add_u8(0).add_i32(*value);
      }
      PropertyValue::Int8(value) => {
        w.add_u32(1).add_u32(index).add_u8(0).add_i8(*value);
      }
      PropertyValue::Int64(value) => {
        w.add_u32(8).add_u32(index).add_u8(0).add_i64(*value);
      }
      PropertyValue::UInt32(value) => {
        w.add_u32(4).add_u32(index).add_u8(0).add_u32(*value);
      }
      PropertyValue::Name(value) | PropertyValue::Str(value) => {
        let mut payload = SaveWriter::new();
        payload.add_string(value);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Object(reference) => {
        let mut payload = SaveWriter::new();
        reference.write(&mut payload);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::SoftObject(soft) => {
        let mut payload = SaveWriter::new();
        soft.reference.write(&mut payload);
        payload.add_u32(soft.unknown);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Text(text) => {
        let mut payload = SaveWriter::new();
        text.write(&mut payload);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Array(array) => {
        let mut payload = SaveWriter::new();
        array.write_elements(&mut payload);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(array.element_type_name().as_ref())
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Set { set_type, value } => {
        let mut payload = SaveWriter::new();
        payload.add_u32(0);
        value.write_elements(&mut payload);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(set_type)
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Struct {
        struct_type,
        uuid,
        value,
      } => {
        let mut payload = SaveWriter::new();
        value.write(&mut payload);
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(struct_type)
          .add_raw(uuid)
          .add_raw(payload.as_slice());
      }
      PropertyValue::Map(map) => {
        let mut payload = SaveWriter::new();
        payload.add_u32(map.mode).add_u32(map.entries.len() as u32);
        for (key, value) in &map.entries {
          key.write(&mut payload);
          value.write(&mut payload);
        }
        w.add_u32(payload.len() as u32)
          .add_u32(index)
          .add_string(map.key_type.as_ref())
          .add_string(map.value_type.as_ref())
          .add_u8(0)
          .add_raw(payload.as_slice());
      }
    }
  }
}

impl ArrayValue {
  pub fn element_type_name(&self) -> ArrayElementTypeName {
    match self {
      ArrayValue::Byte(_) => ArrayElementTypeName::Byte,
      ArrayValue::Enum(_) => ArrayElementTypeName::Enum,
      ArrayValue::Str(_) => ArrayElementTypeName::Str,
      ArrayValue::Interface(_) => ArrayElementTypeName::Interface,
      ArrayValue::Object(_) => ArrayElementTypeName::Object,
      ArrayValue::Int(_) => ArrayElementTypeName::Int,
      ArrayValue::Int64(_) => ArrayElementTypeName::Int64,
      ArrayValue::Float(_) => ArrayElementTypeName::Float,
      ArrayValue::SoftObject(_) => ArrayElementTypeName::SoftObject,
      ArrayValue::Struct(_) => ArrayElementTypeName::Struct,
    }
  }

  fn write_elements(&self, w: &mut SaveWriter) {
    match self {
      ArrayValue::Byte(items) => {
        w.add_u32(items.len() as u32).add_raw(items);
      }
      ArrayValue::Enum(items) | ArrayValue::Str(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          w.add_string(item);
        }
      }
      ArrayValue::Interface(items) | ArrayValue::Object(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          item.write(w);
        }
      }
      ArrayValue::Int(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          w.add_i32(*item);
        }
      }
      ArrayValue::Int64(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          w.add_i64(*item);
        }
      }
      ArrayValue::Float(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          w.add_f32(*item);
        }
      }
      ArrayValue::SoftObject(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          item.reference.write(w);
          w.add_u32(item.unknown);
        }
      }
      ArrayValue::Struct(array) => {
        let mut inner = SaveWriter::new();
        match &array.elements {
          StructArrayElements::Values(values) => {
            for value in values {
              value.write(&mut inner);
            }
          }
          StructArrayElements::Opaque { data, .. } => {
            inner.add_raw(data);
          }
        }
        let length = match &array.elements {
          StructArrayElements::Values(values) => values.len() as u32,
          StructArrayElements::Opaque { length, .. } => *length,
        };
        w.add_u32(length)
          .add_string(&array.name)
          .add_string("StructProperty")
          .add_u32(inner.len() as u32)
          .add_u32(0)
          .add_string(&array.element_type)
          .add_raw(&array.uuid)
          .add_raw(inner.as_slice());
      }
    }
  }
}

impl SetValue {
  fn write_elements(&self, w: &mut SaveWriter) {
    match self {
      SetValue::Object(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          item.write(w);
        }
      }
      SetValue::UInt32(items) => {
        w.add_u32(items.len() as u32);
        for item in items {
          w.add_u32(*item);
        }
      }
      SetValue::Struct(items) => {
        w.add_u32(items.len() as u32);
        for (a, b) in items {
          w.add_u64(*a).add_u64(*b);
        }
      }
      SetValue::Opaque { length, data } => {
        w.add_u32(*length).add_raw(data);
      }
    }
  }
}

impl MapKey {
  fn write(&self, w: &mut SaveWriter) {
    match self {
      MapKey::Int(value) => {
        w.add_i32(*value);
      }
      MapKey::Int64(value) => {
        w.add_i64(*value);
      }
      MapKey::Name(value) | MapKey::Str(value) | MapKey::Enum(value) => {
        w.add_string(value);
      }
      MapKey::Object(reference) => {
        reference.write(w);
      }
      MapKey::Struct(a, b, c) => {
        w.add_i32(*a).add_i32(*b).add_i32(*c);
      }
    }
  }
}

impl MapValue {
  fn write(&self, w: &mut SaveWriter) {
    match self {
      MapValue::Byte(value) => {
        w.add_u8(*value);
      }
      MapValue::ByteString(value) | MapValue::Str(value) => {
        w.add_string(value);
      }
      MapValue::Bool(value) => {
        w.add_u8_bool(*value);
      }
      MapValue::Int(value) => {
        w.add_i32(*value);
      }
      MapValue::Int64(value) => {
        w.add_i64(*value);
      }
      MapValue::Float(value) => {
        w.add_f32(*value);
      }
      MapValue::Double(value) => {
        w.add_f64(*value);
      }
      MapValue::Object(reference) => {
        reference.write(w);
      }
      MapValue::Text(text) => {
        text.write(w);
      }
      MapValue::Properties(properties) => {
        write_properties(w, properties);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use crate::cursor::{SaveReader, SaveWriter};
  use crate::level::ObjectReference;
  use crate::text::TextValue;
  use crate::typed_data::{InventoryItem, StructValue};

  use super::*;

  fn round_trip(properties: &[Property]) -> Vec<Property> {
    let mut w = SaveWriter::new();
    write_properties(&mut w, properties);
    let mut r = Cursor::new(w.as_slice());
    let back = read_properties(&mut r).unwrap();
    assert_eq!(r.offset(), w.len());
    back
  }

  fn reference(n: u32) -> ObjectReference {
    ObjectReference {
      level_name: "Persistent_Level".to_owned(),
      path_name: format!("Persistent_Level:PersistentLevel.Build_{n}"),
    }
  }

  #[test]
  fn empty_stream_is_a_lone_none() {
    let mut w = SaveWriter::new();
    write_properties(&mut w, &[]);
    // length prefix plus the NUL-terminated "None"
    assert_eq!(w.len(), 4 + 5);

    let mut r = Cursor::new(w.as_slice());
    assert_eq!(read_properties(&mut r).unwrap(), vec![]);
    assert_eq!(r.offset(), 9);
  }

  #[test]
  fn simple_properties_round_trip() {
    let properties = vec![
      Property {
        name: "mIsProducing".to_owned(),
        index: 0,
        value: PropertyValue::Bool(true),
      },
      Property {
        name: "mCurrentPotential".to_owned(),
        index: 0,
        value: PropertyValue::Float(0.75),
      },
      Property {
        name: "mExtractionRate".to_owned(),
        index: 0,
        value: PropertyValue::Double(120.5),
      },
      Property {
        name: "mTrainCount".to_owned(),
        index: 2,
        value: PropertyValue::Int(-3),
      },
      Property {
        name: "mTinyValue".to_owned(),
        index: 0,
        value: PropertyValue::Int8(-8),
      },
      Property {
        name: "mTotalTicks".to_owned(),
        index: 0,
        value: PropertyValue::Int64(1 << 40),
      },
      Property {
        name: "mSlotBits".to_owned(),
        index: 0,
        value: PropertyValue::UInt32(0xFFFF_0001),
      },
      Property {
        name: "mStationName".to_owned(),
        index: 0,
        value: PropertyValue::Name("Station_Iron".to_owned()),
      },
      Property {
        name: "mNote".to_owned(),
        index: 0,
        value: PropertyValue::Str("переплавка".to_owned()),
      },
    ];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn byte_and_enum_properties_round_trip() {
    let properties = vec![
      Property {
        name: "mRawByte".to_owned(),
        index: 0,
        value: PropertyValue::Byte {
          inner_type: "None".to_owned(),
          value: ByteValue::Byte(42),
        },
      },
      Property {
        name: "mGasType".to_owned(),
        index: 0,
        value: PropertyValue::Byte {
          inner_type: "EGasType".to_owned(),
          value: ByteValue::Name("EGasType::GT_NORMAL".to_owned()),
        },
      },
      Property {
        name: "mPendingStatus".to_owned(),
        index: 0,
        value: PropertyValue::Enum {
          inner_type: "EPendingStatus".to_owned(),
          value: "EPendingStatus::EPS_Idle".to_owned(),
        },
      },
    ];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn object_and_text_properties_round_trip() {
    let properties = vec![
      Property {
        name: "mOwningSpawner".to_owned(),
        index: 0,
        value: PropertyValue::Object(reference(1)),
      },
      Property {
        name: "mSignText".to_owned(),
        index: 0,
        value: PropertyValue::Text(TextValue::None {
          flags: 2,
          has_culture_invariant_string: true,
          value: "Iron Ingots".to_owned(),
        }),
      },
      Property {
        name: "mLinkedDescriptor".to_owned(),
        index: 0,
        value: PropertyValue::SoftObject(SoftObjectReference {
          reference: reference(2),
          unknown: 0,
        }),
      },
    ];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn plain_arrays_round_trip() {
    let properties = vec![
      Property {
        name: "mFogOfWarRawData".to_owned(),
        index: 0,
        value: PropertyValue::Array(ArrayValue::Byte(vec![0, 1, 2, 255])),
      },
      Property {
        name: "mActiveRecipes".to_owned(),
        index: 0,
        value: PropertyValue::Array(ArrayValue::Enum(vec![
          "ERecipe::Plate".to_owned(),
          "ERecipe::Rod".to_owned(),
        ])),
      },
      Property {
        name: "mConnectedWires".to_owned(),
        index: 0,
        value: PropertyValue::Array(ArrayValue::Object(vec![reference(3), reference(4)])),
      },
      Property {
        name: "mDamageValues".to_owned(),
        index: 0,
        value: PropertyValue::Array(ArrayValue::Float(vec![1.0, 2.5, -7.125])),
      },
      Property {
        name: "mTimestamps".to_owned(),
        index: 0,
        value: PropertyValue::Array(ArrayValue::Int64(vec![i64::MIN, 0, i64::MAX])),
      },
    ];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn struct_array_round_trips() {
    let items = StructArrayElements::Values(vec![
      StructValue::InventoryItem(InventoryItem {
        name: "Desc_IronPlate_C".to_owned(),
        payload: None,
      }),
      StructValue::InventoryItem(InventoryItem {
        name: "Desc_IronRod_C".to_owned(),
        payload: None,
      }),
    ]);
    let properties = vec![Property {
      name: "mInventoryStacks".to_owned(),
      index: 0,
      value: PropertyValue::Array(ArrayValue::Struct(StructArray {
        name: "mInventoryStacks".to_owned(),
        element_type: "InventoryItem".to_owned(),
        uuid: vec![0; 17],
        elements: items,
      })),
    }];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn set_property_round_trips() {
    let properties = vec![
      Property {
        name: "mRemovedInstances".to_owned(),
        index: 0,
        value: PropertyValue::Set {
          set_type: "ObjectProperty".to_owned(),
          value: SetValue::Object(vec![reference(5)]),
        },
      },
      Property {
        name: "mSeenColors".to_owned(),
        index: 0,
        value: PropertyValue::Set {
          set_type: "UInt32Property".to_owned(),
          value: SetValue::UInt32(vec![7, 8, 9]),
        },
      },
      Property {
        name: "mFoliageHandles".to_owned(),
        index: 0,
        value: PropertyValue::Set {
          set_type: "StructProperty".to_owned(),
          value: SetValue::Struct(vec![(1, 2), (3, 4)]),
        },
      },
    ];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn unknown_set_type_keeps_raw_bytes() {
    let mut w = SaveWriter::new();
    w.add_string("mWeird");
    w.add_string("SetProperty");
    let payload = {
      let mut p = SaveWriter::new();
      p.add_u32(0).add_u32(2).add_raw(&[0xDE, 0xAD, 0xBE, 0xEF]);
      p
    };
    w.add_u32(payload.len() as u32).add_u32(0);
    w.add_string("NameProperty").add_u8(0);
    w.add_raw(payload.as_slice());
    w.add_string("None");

    let back = read_properties(&mut Cursor::new(w.as_slice())).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(
      back[0].value,
      PropertyValue::Set {
        set_type: "NameProperty".to_owned(),
        value: SetValue::Opaque {
          length: 2,
          data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        },
      }
    );

    // And the capture re-emits byte-identically
    let mut again = SaveWriter::new();
    write_properties(&mut again, &back);
    assert_eq!(again.as_slice(), w.as_slice());
  }

  #[test]
  fn map_property_round_trips() {
    let properties = vec![Property {
      name: "mSaveData".to_owned(),
      index: 0,
      value: PropertyValue::Map(MapData {
        key_type: MapKeyTypeName::Struct,
        value_type: MapValueTypeName::Struct,
        mode: 0,
        entries: vec![
          (
            MapKey::Struct(-2, 0, 3),
            MapValue::Properties(vec![Property {
              name: "mHasPower".to_owned(),
              index: 0,
              value: PropertyValue::Bool(false),
            }]),
          ),
          (MapKey::Struct(1, 1, 1), MapValue::Properties(vec![])),
        ],
      }),
    }];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn map_with_string_keyed_bytes_round_trips() {
    let properties = vec![Property {
      name: "mCheatFlags".to_owned(),
      index: 0,
      value: PropertyValue::Map(MapData {
        key_type: MapKeyTypeName::Str,
        value_type: MapValueTypeName::Byte,
        mode: 0,
        entries: vec![(
          MapKey::Str("NoCost".to_owned()),
          MapValue::ByteString("1".to_owned()),
        )],
      }),
    }];
    assert_eq!(round_trip(&properties), properties);
  }

  #[test]
  fn unknown_property_type_is_rejected() {
    let mut w = SaveWriter::new();
    w.add_string("mMystery");
    w.add_string("FancyProperty");
    w.add_u32(0).add_u32(0);
    w.add_string("None");
    let err = read_properties(&mut Cursor::new(w.as_slice())).unwrap_err();
    assert_eq!(err.code(), "unk");
  }

  #[test]
  fn payload_size_mismatch_is_invalid_size() {
    let mut w = SaveWriter::new();
    w.add_string("mInts");
    w.add_string("ArrayProperty");
    w.add_u32(99).add_u32(0);
    w.add_string("IntProperty").add_u8(0);
    w.add_u32(1).add_i32(7);
    w.add_string("None");
    let err = read_properties(&mut Cursor::new(w.as_slice())).unwrap_err();
    assert_eq!(err.code(), "invalid_size");
  }
}
