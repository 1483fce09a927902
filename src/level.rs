use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cursor::{SaveReader, SaveWriter};
use crate::errors::ParseError;
use crate::property::{read_properties, write_properties, Property};
use crate::Result;

/// A (level name, path name) pair identifying a single entity
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
  pub level_name: String,
  pub path_name: String,
}

impl ObjectReference {
  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<ObjectReference> {
    Ok(ObjectReference {
      level_name: r.read_string()?,
      path_name: r.read_string()?,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_string(&self.level_name).add_string(&self.path_name);
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3<T> {
  pub x: T,
  pub y: T,
  pub z: T,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion<T> {
  pub x: T,
  pub y: T,
  pub z: T,
  pub w: T,
}

impl Vector3<f32> {
  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<Vector3<f32>> {
    Ok(Vector3 {
      x: r.read_f32::<LittleEndian>()?,
      y: r.read_f32::<LittleEndian>()?,
      z: r.read_f32::<LittleEndian>()?,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_f32(self.x).add_f32(self.y).add_f32(self.z);
  }
}

impl Vector3<f64> {
  pub(crate) fn read_double<R: SaveReader>(r: &mut R) -> Result<Vector3<f64>> {
    Ok(Vector3 {
      x: r.read_f64::<LittleEndian>()?,
      y: r.read_f64::<LittleEndian>()?,
      z: r.read_f64::<LittleEndian>()?,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_f64(self.x).add_f64(self.y).add_f64(self.z);
  }
}

impl Quaternion<f32> {
  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<Quaternion<f32>> {
    Ok(Quaternion {
      x: r.read_f32::<LittleEndian>()?,
      y: r.read_f32::<LittleEndian>()?,
      z: r.read_f32::<LittleEndian>()?,
      w: r.read_f32::<LittleEndian>()?,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_f32(self.x).add_f32(self.y).add_f32(self.z).add_f32(self.w);
  }
}

impl Quaternion<f64> {
  pub(crate) fn read_double<R: SaveReader>(r: &mut R) -> Result<Quaternion<f64>> {
    Ok(Quaternion {
      x: r.read_f64::<LittleEndian>()?,
      y: r.read_f64::<LittleEndian>()?,
      z: r.read_f64::<LittleEndian>()?,
      w: r.read_f64::<LittleEndian>()?,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    w.add_f64(self.x).add_f64(self.y).add_f64(self.z).add_f64(self.w);
  }
}

const HEADER_TYPE_COMPONENT: u32 = 0;
const HEADER_TYPE_ACTOR: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectHeader {
  Component(ComponentHeader),
  Actor(ActorHeader),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHeader {
  pub type_path: String,
  pub root_object: String,
  pub instance_name: String,
  pub unknown: u32,
  pub parent_actor_name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorHeader {
  pub type_path: String,
  pub root_object: String,
  pub instance_name: String,
  pub unknown: u32,
  pub need_transform: bool,
  pub rotation: Quaternion<f32>,
  pub position: Vector3<f32>,
  pub scale: Vector3<f32>,
  pub was_placed_in_level: bool,
}

impl ObjectHeader {
  pub fn type_path(&self) -> &str {
    match self {
      ObjectHeader::Component(header) => &header.type_path,
      ObjectHeader::Actor(header) => &header.type_path,
    }
  }

  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<ObjectHeader> {
    let header_type = r.read_u32::<LittleEndian>()?;
    match header_type {
      HEADER_TYPE_COMPONENT => Ok(ObjectHeader::Component(ComponentHeader::read(r)?)),
      HEADER_TYPE_ACTOR => Ok(ObjectHeader::Actor(ActorHeader::read(r)?)),
      other => Err(ParseError::UnknownObjectType(other)),
    }
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    match self {
      ObjectHeader::Component(header) => {
        w.add_u32(HEADER_TYPE_COMPONENT);
        header.write(w);
      }
      ObjectHeader::Actor(header) => {
        w.add_u32(HEADER_TYPE_ACTOR);
        header.write(w);
      }
    }
  }
}

impl ComponentHeader {
  fn read<R: SaveReader>(r: &mut R) -> Result<ComponentHeader> {
    Ok(ComponentHeader {
      type_path: r.read_string()?,
      root_object: r.read_string()?,
      instance_name: r.read_string()?,
      unknown: r.read_u32::<LittleEndian>()?,
      parent_actor_name: r.read_string()?,
    })
  }

  fn write(&self, w: &mut SaveWriter) {
    w.add_string(&self.type_path)
      .add_string(&self.root_object)
      .add_string(&self.instance_name)
      .add_u32(self.unknown)
      .add_string(&self.parent_actor_name);
  }
}

impl ActorHeader {
  fn read<R: SaveReader>(r: &mut R) -> Result<ActorHeader> {
    // On the wire, need_transform precedes the transform itself
    Ok(ActorHeader {
      type_path: r.read_string()?,
      root_object: r.read_string()?,
      instance_name: r.read_string()?,
      unknown: r.read_u32::<LittleEndian>()?,
      need_transform: r.read_u32_bool()?,
      rotation: Quaternion::read(r)?,
      position: Vector3::read(r)?,
      scale: Vector3::read(r)?,
      was_placed_in_level: r.read_u32_bool()?,
    })
  }

  fn write(&self, w: &mut SaveWriter) {
    // The game's emitter places need_transform after the transform when
    // writing, unlike the read order above
    w.add_string(&self.type_path)
      .add_string(&self.root_object)
      .add_string(&self.instance_name)
      .add_u32(self.unknown);
    self.rotation.write(w);
    self.position.write(w);
    self.scale.write(w);
    w.add_u32_bool(self.need_transform)
      .add_u32_bool(self.was_placed_in_level);
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LevelObject {
  Component(ComponentObject),
  Actor(ActorObject),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentObject {
  pub save_version: u32,
  pub flag: u32,
  pub properties: Vec<Property>,
  pub trailing: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorObject {
  pub save_version: u32,
  pub flag: u32,
  pub parent: ObjectReference,
  pub components: Vec<ObjectReference>,
  pub properties: Vec<Property>,
  pub trailing: Vec<u8>,
}

impl LevelObject {
  /// Reads an object body; its shape is decided by the paired header
  pub(crate) fn read<R: SaveReader>(r: &mut R, header: &ObjectHeader) -> Result<LevelObject> {
    let save_version = r.read_u32::<LittleEndian>()?;
    let flag = r.read_u32::<LittleEndian>()?;
    let size = r.read_u32::<LittleEndian>()?;

    match header {
      ObjectHeader::Actor(_) => r.expect_size(u64::from(size), "ActorObject", |r| {
        let start = r.offset();
        let parent = ObjectReference::read(r)?;
        let component_count = r.read_u32::<LittleEndian>()?;
        let mut components = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
          components.push(ObjectReference::read(r)?);
        }
        let properties = read_properties(r)?;
        r.read_u32::<LittleEndian>()?;
        let trailing = read_trailing(r, u64::from(size), start, "ActorObject")?;
        Ok(LevelObject::Actor(ActorObject {
          save_version,
          flag,
          parent,
          components,
          properties,
          trailing,
        }))
      }),
      ObjectHeader::Component(_) => r.expect_size(u64::from(size), "ComponentObject", |r| {
        let start = r.offset();
        let properties = read_properties(r)?;
        r.read_u32::<LittleEndian>()?;
        let trailing = read_trailing(r, u64::from(size), start, "ComponentObject")?;
        Ok(LevelObject::Component(ComponentObject {
          save_version,
          flag,
          properties,
          trailing,
        }))
      }),
    }
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    match self {
      LevelObject::Actor(object) => {
        w.add_u32(object.save_version).add_u32(object.flag);
        let mut body = SaveWriter::new();
        object.parent.write(&mut body);
        body.add_u32(object.components.len() as u32);
        for component in &object.components {
          component.write(&mut body);
        }
        write_properties(&mut body, &object.properties);
        body.add_u32(0);
        body.add_raw(&object.trailing);
        w.add_u32(body.len() as u32).add_raw(body.as_slice());
      }
      LevelObject::Component(object) => {
        w.add_u32(object.save_version).add_u32(object.flag);
        let mut body = SaveWriter::new();
        write_properties(&mut body, &object.properties);
        body.add_u32(0);
        body.add_raw(&object.trailing);
        w.add_u32(body.len() as u32).add_raw(body.as_slice());
      }
    }
  }
}

fn read_trailing<R: SaveReader>(
  r: &mut R,
  size: u64,
  start: u64,
  what: &'static str,
) -> Result<Vec<u8>> {
  let consumed = r.offset() - start;
  let remaining = size.checked_sub(consumed).ok_or(ParseError::InvalidSize {
    what,
    expected: size,
    actual: consumed,
  })?;
  r.read_raw(remaining as usize)
}

/// One level of the world. The persistent level omits the leading name and
/// the trailing collectables repeat, and may carry an extra-level-names
/// block inside its header bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
  pub sublevel_name: Option<String>,
  pub object_headers: Vec<ObjectHeader>,
  pub extra_level_names: Option<String>,
  pub collectables: Vec<ObjectReference>,
  pub objects: Vec<LevelObject>,
  pub save_version: u32,
  pub second_collectables: Vec<ObjectReference>,
}

impl Level {
  pub(crate) fn read<R: SaveReader>(r: &mut R, is_persistent: bool) -> Result<Level> {
    let sublevel_name = if is_persistent {
      None
    } else {
      Some(r.read_string()?)
    };

    let bracket_size = r.read_u64::<LittleEndian>()?;
    let bracket_start = r.offset();

    let header_count = r.read_u32::<LittleEndian>()?;
    debug!(
      "level '{}': {} object headers",
      sublevel_name.as_deref().unwrap_or("<persistent>"),
      header_count
    );
    let mut object_headers = Vec::with_capacity(header_count as usize);
    for _ in 0..header_count {
      object_headers.push(ObjectHeader::read(r)?);
    }

    let extra_level_names = if is_persistent && r.read_u32_bool()? {
      Some(r.read_string()?)
    } else {
      None
    };

    // Whether a collectables table follows is decided by how much of the
    // declared header bracket remains
    let collectables = if r.offset() - bracket_start != bracket_size {
      let count = r.read_u32::<LittleEndian>()?;
      let mut collectables = Vec::with_capacity(count as usize);
      for _ in 0..count {
        collectables.push(ObjectReference::read(r)?);
      }
      collectables
    } else {
      vec![]
    };

    let objects_size = r.read_u64::<LittleEndian>()?;
    let objects = r.expect_size(objects_size, "Level.objects", |r| {
      let count = r.read_u32::<LittleEndian>()?;
      if count as usize > object_headers.len() {
        return Err(ParseError::MissingObjectHeader(object_headers.len()));
      }
      let mut objects = Vec::with_capacity(count as usize);
      for (idx, header) in object_headers.iter().take(count as usize).enumerate() {
        debug!("object {}/{}: '{}'", idx + 1, count, header.type_path());
        objects.push(LevelObject::read(r, header)?);
      }
      Ok(objects)
    })?;

    let save_version = r.read_u32::<LittleEndian>()?;

    let second_collectables = if is_persistent {
      vec![]
    } else {
      let count = r.read_u32::<LittleEndian>()?;
      let mut second_collectables = Vec::with_capacity(count as usize);
      for _ in 0..count {
        second_collectables.push(ObjectReference::read(r)?);
      }
      second_collectables
    };

    Ok(Level {
      sublevel_name,
      object_headers,
      extra_level_names,
      collectables,
      objects,
      save_version,
      second_collectables,
    })
  }

  pub(crate) fn write(&self, w: &mut SaveWriter, is_persistent: bool) {
    if let Some(name) = &self.sublevel_name {
      w.add_string(name);
    }

    let mut headers = SaveWriter::new();
    headers.add_u32(self.object_headers.len() as u32);
    for header in &self.object_headers {
      header.write(&mut headers);
    }
    if is_persistent {
      headers.add_u32_bool(self.extra_level_names.is_some());
      if let Some(names) = &self.extra_level_names {
        headers.add_string(names);
      }
    }
    headers.add_u32(self.collectables.len() as u32);
    for collectable in &self.collectables {
      collectable.write(&mut headers);
    }
    w.add_u64(headers.len()).add_raw(headers.as_slice());

    let mut objects = SaveWriter::new();
    objects.add_u32(self.objects.len() as u32);
    for object in &self.objects {
      object.write(&mut objects);
    }
    w.add_u64(objects.len()).add_raw(objects.as_slice());

    w.add_u32(self.save_version);

    if !is_persistent {
      w.add_u32(self.second_collectables.len() as u32);
      for collectable in &self.second_collectables {
        collectable.write(w);
      }
    }
  }
}
