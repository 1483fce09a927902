use std::io::{Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::cursor::{SaveReader, SaveWriter};
use crate::errors::ParseError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextHistoryType {
  Base = 0,
  Named = 1,
  Argument = 3,
  Transform = 10,
  StringTableEntry = 11,
  None = 255,
}

impl TextHistoryType {
  pub fn from_u8(value: u8) -> Option<TextHistoryType> {
    match value {
      0 => Some(TextHistoryType::Base),
      1 => Some(TextHistoryType::Named),
      3 => Some(TextHistoryType::Argument),
      10 => Some(TextHistoryType::Transform),
      11 => Some(TextHistoryType::StringTableEntry),
      255 => Some(TextHistoryType::None),
      _ => None,
    }
  }

  pub fn as_u8(self) -> u8 {
    self as u8
  }
}

/// Localized-text payload. Every variant except `Base` starts with a flags
/// word and its own history byte; `Base` carries only the history byte
/// before its three strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextValue {
  Base {
    namespace: String,
    key: String,
    value: String,
  },
  WithArguments {
    history_type: TextHistoryType,
    flags: u32,
    source_format: Box<TextValue>,
    arguments: Vec<TextArgument>,
  },
  Transform {
    flags: u32,
    source_text: Box<TextValue>,
    transform_type: u8,
  },
  StringTableEntry {
    flags: u32,
    table_id: String,
    table_key: String,
  },
  None {
    flags: u32,
    has_culture_invariant_string: bool,
    value: String,
  },
}

impl TextValue {
  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<TextValue> {
    // The history discriminant sits after the flags word. Peek both without
    // committing: each variant body consumes its own prefix.
    let start = r.offset();
    r.read_u32::<LittleEndian>()?;
    let history_byte = r.read_u8()?;
    r.seek(SeekFrom::Start(start))?;

    match TextHistoryType::from_u8(history_byte) {
      Some(TextHistoryType::Base) => {
        r.read_u8()?;
        Ok(TextValue::Base {
          namespace: r.read_string()?,
          key: r.read_string()?,
          value: r.read_string()?,
        })
      }
      Some(history_type @ (TextHistoryType::Named | TextHistoryType::Argument)) => {
        let flags = r.read_u32::<LittleEndian>()?;
        r.read_u8()?;
        let source_format = Box::new(TextValue::read(r)?);
        let argument_count = r.read_u32::<LittleEndian>()?;
        let mut arguments = Vec::with_capacity(argument_count as usize);
        for _ in 0..argument_count {
          arguments.push(TextArgument::read(r)?);
        }
        Ok(TextValue::WithArguments {
          history_type,
          flags,
          source_format,
          arguments,
        })
      }
      Some(TextHistoryType::Transform) => {
        let flags = r.read_u32::<LittleEndian>()?;
        r.read_u8()?;
        let source_text = Box::new(TextValue::read(r)?);
        Ok(TextValue::Transform {
          flags,
          source_text,
          transform_type: r.read_u8()?,
        })
      }
      Some(TextHistoryType::StringTableEntry) => {
        let flags = r.read_u32::<LittleEndian>()?;
        r.read_u8()?;
        Ok(TextValue::StringTableEntry {
          flags,
          table_id: r.read_string()?,
          table_key: r.read_string()?,
        })
      }
      Some(TextHistoryType::None) => {
        let flags = r.read_u32::<LittleEndian>()?;
        r.read_u8()?;
        Ok(TextValue::None {
          flags,
          has_culture_invariant_string: r.read_u32_bool()?,
          value: r.read_string()?,
        })
      }
      None => Err(ParseError::UnknownTextHistoryType(history_byte)),
    }
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    match self {
      TextValue::Base {
        namespace,
        key,
        value,
      } => {
        w.add_u8(TextHistoryType::Base.as_u8())
          .add_string(namespace)
          .add_string(key)
          .add_string(value);
      }
      TextValue::WithArguments {
        history_type,
        flags,
        source_format,
        arguments,
      } => {
        w.add_u32(*flags).add_u8(history_type.as_u8());
        source_format.write(w);
        w.add_u32(arguments.len() as u32);
        for argument in arguments {
          argument.write(w);
        }
      }
      TextValue::Transform {
        flags,
        source_text,
        transform_type,
      } => {
        w.add_u32(*flags).add_u8(TextHistoryType::Transform.as_u8());
        source_text.write(w);
        w.add_u8(*transform_type);
      }
      TextValue::StringTableEntry {
        flags,
        table_id,
        table_key,
      } => {
        w.add_u32(*flags)
          .add_u8(TextHistoryType::StringTableEntry.as_u8())
          .add_string(table_id)
          .add_string(table_key);
      }
      TextValue::None {
        flags,
        has_culture_invariant_string,
        value,
      } => {
        w.add_u32(*flags)
          .add_u8(TextHistoryType::None.as_u8())
          .add_u32_bool(*has_culture_invariant_string)
          .add_string(value);
      }
    }
  }
}

const ARGUMENT_TYPE_INT: u8 = 0;
const ARGUMENT_TYPE_TEXT: u8 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextArgument {
  Int {
    name: String,
    value: i32,
    unknown: i32,
  },
  Text {
    name: String,
    value: TextValue,
  },
}

impl TextArgument {
  pub(crate) fn read<R: SaveReader>(r: &mut R) -> Result<TextArgument> {
    let name = r.read_string()?;
    let value_type = r.read_u8()?;
    match value_type {
      ARGUMENT_TYPE_INT => Ok(TextArgument::Int {
        name,
        value: r.read_i32::<LittleEndian>()?,
        unknown: r.read_i32::<LittleEndian>()?,
      }),
      ARGUMENT_TYPE_TEXT => Ok(TextArgument::Text {
        name,
        value: TextValue::read(r)?,
      }),
      other => Err(ParseError::UnknownTextArgumentType(other)),
    }
  }

  pub(crate) fn write(&self, w: &mut SaveWriter) {
    match self {
      TextArgument::Int {
        name,
        value,
        unknown,
      } => {
        w.add_string(name)
          .add_u8(ARGUMENT_TYPE_INT)
          .add_i32(*value)
          .add_i32(*unknown);
      }
      TextArgument::Text { name, value } => {
        w.add_string(name).add_u8(ARGUMENT_TYPE_TEXT);
        value.write(w);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use crate::cursor::SaveWriter;

  use super::{TextArgument, TextValue};

  fn round_trip(value: &TextValue) -> TextValue {
    let mut w = SaveWriter::new();
    value.write(&mut w);
    TextValue::read(&mut Cursor::new(w.as_slice())).unwrap()
  }

  #[test]
  fn none_history_round_trips() {
    let value = TextValue::None {
      flags: 2,
      has_culture_invariant_string: true,
      value: "Oil Outpost".to_owned(),
    };
    assert_eq!(round_trip(&value), value);
  }

  #[test]
  fn base_history_round_trips_without_flags() {
    let value = TextValue::Base {
      namespace: String::new(),
      key: "D9C8…".to_owned(),
      value: "Space Elevator".to_owned(),
    };
    let mut w = SaveWriter::new();
    value.write(&mut w);
    // history byte, then three strings; no flags word
    assert_eq!(w.as_slice()[0], 0);
    assert_eq!(round_trip(&value), value);
  }

  #[test]
  fn argument_history_round_trips() {
    let inner = TextValue::None {
      flags: 0,
      has_culture_invariant_string: false,
      value: String::new(),
    };
    let value = TextValue::WithArguments {
      history_type: super::TextHistoryType::Argument,
      flags: 1,
      source_format: Box::new(inner.clone()),
      arguments: vec![
        TextArgument::Int {
          name: "count".to_owned(),
          value: 7,
          unknown: 0,
        },
        TextArgument::Text {
          name: "label".to_owned(),
          value: inner,
        },
      ],
    };
    assert_eq!(round_trip(&value), value);
  }

  #[test]
  fn unknown_history_type_is_rejected() {
    let mut w = SaveWriter::new();
    w.add_u32(0).add_u8(99).add_u32(0);
    let err = TextValue::read(&mut Cursor::new(w.as_slice())).unwrap_err();
    assert_eq!(err.code(), "unk");
  }
}
