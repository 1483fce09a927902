use std::io::Cursor;

use ficsit_sav::cursor::SaveWriter;
use ficsit_sav::level::{
  ActorHeader, ActorObject, ComponentHeader, ComponentObject, Level, LevelObject, ObjectHeader,
  ObjectReference, Quaternion, Vector3,
};
use ficsit_sav::property::{
  ArrayValue, MapData, MapKey, MapKeyTypeName, MapValue, MapValueTypeName, Property,
  PropertyValue, StructArray, StructArrayElements,
};
use ficsit_sav::save::{
  GridName, LevelGroupingGrid, SaveFileBody, SaveFileHeader, SessionVisibility,
};
use ficsit_sav::text::TextValue;
use ficsit_sav::typed_data::{InventoryItem, InventoryItemPayload, StructValue};
use ficsit_sav::{parse_save, write_save, SaveFile};

fn sample_header() -> SaveFileHeader {
  SaveFileHeader {
    header_type: 14,
    save_version: 52,
    build_version: 366202,
    save_name: "autosave_0".to_owned(),
    map_name: "Persistent_Level".to_owned(),
    map_options: "?startloc=Grass Fields".to_owned(),
    session_name: "First Factory".to_owned(),
    play_duration: 54_000,
    save_ticks: 638_000_000_000_000_000,
    session_visibility: SessionVisibility::FriendsOnly,
    editor_object_version: 46,
    mod_metadata: String::new(),
    mod_flags: 0,
    save_id: "F1E2D3C4".to_owned(),
    is_partitioned_world: true,
    creative_mode_enabled: false,
    checksum: [0xAB; 16],
    is_cheat: false,
  }
}

fn empty_grids() -> Vec<LevelGroupingGrid> {
  [
    GridName::Main,
    GridName::Landscape,
    GridName::Exploration,
    GridName::Foliage,
    GridName::Hlod,
  ]
  .into_iter()
  .map(|grid_name| LevelGroupingGrid {
    grid_name,
    unknown_1: 0,
    unknown_2: 0,
    levels: vec![],
  })
  .collect()
}

fn empty_persistent_level() -> Level {
  Level {
    sublevel_name: None,
    object_headers: vec![],
    extra_level_names: None,
    collectables: vec![],
    objects: vec![],
    save_version: 52,
    second_collectables: vec![],
  }
}

fn empty_save() -> SaveFile {
  SaveFile {
    header: sample_header(),
    body: SaveFileBody {
      unknown_1: 0,
      unknown_2: 1,
      grids: empty_grids(),
      sublevels: vec![],
      persistent_level: empty_persistent_level(),
      references: vec![],
    },
  }
}

fn reference(path: &str) -> ObjectReference {
  ObjectReference {
    level_name: "Persistent_Level".to_owned(),
    path_name: format!("Persistent_Level:PersistentLevel.{path}"),
  }
}

/// A save with one sublevel and a populated persistent level exercising the
/// property kinds a real factory produces
fn populated_save() -> SaveFile {
  let smelter_header = ObjectHeader::Actor(ActorHeader {
    type_path:
      "/Game/FactoryGame/Buildable/Factory/SmelterMk1/Build_SmelterMk1.Build_SmelterMk1_C"
        .to_owned(),
    root_object: "Persistent_Level".to_owned(),
    instance_name: "Persistent_Level:PersistentLevel.Build_SmelterMk1_C_1".to_owned(),
    unknown: 0,
    need_transform: true,
    rotation: Quaternion {
      x: 0.0,
      y: 0.0,
      z: 0.38268343,
      w: 0.92387953,
    },
    position: Vector3 {
      x: -1200.0,
      y: 4800.0,
      z: 125.5,
    },
    scale: Vector3 {
      x: 1.0,
      y: 1.0,
      z: 1.0,
    },
    was_placed_in_level: false,
  });

  let inventory_header = ObjectHeader::Component(ComponentHeader {
    type_path: "/Script/FactoryGame.FGInventoryComponent".to_owned(),
    root_object: "Persistent_Level".to_owned(),
    instance_name: "Persistent_Level:PersistentLevel.Build_SmelterMk1_C_1.InputInventory"
      .to_owned(),
    unknown: 0,
    parent_actor_name: "Persistent_Level:PersistentLevel.Build_SmelterMk1_C_1".to_owned(),
  });

  let inventory_stacks = Property {
    name: "mInventoryStacks".to_owned(),
    index: 0,
    value: PropertyValue::Array(ArrayValue::Struct(StructArray {
      name: "mInventoryStacks".to_owned(),
      element_type: "InventoryItem".to_owned(),
      uuid: vec![0; 17],
      elements: StructArrayElements::Values(vec![
        StructValue::InventoryItem(InventoryItem {
          name: "Desc_OreIron_C".to_owned(),
          payload: Some(InventoryItemPayload {
            type_path: "/Script/FactoryGame.FGItemDescriptor".to_owned(),
            properties: vec![Property {
              name: "NumItems".to_owned(),
              index: 0,
              value: PropertyValue::Int(42),
            }],
          }),
        }),
        StructValue::InventoryItem(InventoryItem {
          name: "Desc_IronIngot_C".to_owned(),
          payload: None,
        }),
        StructValue::InventoryItem(InventoryItem {
          name: String::new(),
          payload: None,
        }),
      ]),
    })),
  };

  let smelter = LevelObject::Actor(ActorObject {
    save_version: 52,
    flag: 0,
    parent: ObjectReference::default(),
    components: vec![reference("Build_SmelterMk1_C_1.InputInventory")],
    properties: vec![
      Property {
        name: "mIsProducing".to_owned(),
        index: 0,
        value: PropertyValue::Bool(true),
      },
      Property {
        name: "mCustomName".to_owned(),
        index: 0,
        value: PropertyValue::Text(TextValue::None {
          flags: 2,
          has_culture_invariant_string: true,
          value: "Плавильня".to_owned(),
        }),
      },
      Property {
        name: "mCachedFactories".to_owned(),
        index: 0,
        value: PropertyValue::Map(MapData {
          key_type: MapKeyTypeName::Name,
          value_type: MapValueTypeName::Int,
          mode: 0,
          entries: vec![(MapKey::Name("SmelterMk1".to_owned()), MapValue::Int(1))],
        }),
      },
    ],
    trailing: vec![],
  });

  let inventory = LevelObject::Component(ComponentObject {
    save_version: 52,
    flag: 0,
    properties: vec![inventory_stacks],
    trailing: vec![],
  });

  let persistent_level = Level {
    sublevel_name: None,
    object_headers: vec![smelter_header, inventory_header],
    extra_level_names: Some(String::new()),
    collectables: vec![reference("BP_Crystal_7")],
    objects: vec![smelter, inventory],
    save_version: 52,
    second_collectables: vec![],
  };

  let sublevel = Level {
    sublevel_name: Some("Level_Cave_03".to_owned()),
    object_headers: vec![],
    extra_level_names: None,
    collectables: vec![],
    objects: vec![],
    save_version: 52,
    second_collectables: vec![reference("BP_Berry_12")],
  };

  let mut header = sample_header();
  header.session_name = "Завод №1".to_owned();

  SaveFile {
    header,
    body: SaveFileBody {
      unknown_1: 0,
      unknown_2: 1,
      grids: empty_grids(),
      sublevels: vec![sublevel],
      persistent_level,
      references: vec![reference("Build_SmelterMk1_C_1")],
    },
  }
}

fn body_bytes(body: &SaveFileBody) -> Vec<u8> {
  let mut w = SaveWriter::new();
  body.write(&mut w);
  w.into_bytes()
}

#[test]
fn empty_save_is_byte_identical_at_the_decompressed_layer() {
  let save = empty_save();
  let first = body_bytes(&save.body);

  let parsed = SaveFileBody::read(&mut Cursor::new(first.as_slice())).unwrap();
  assert_eq!(parsed, save.body);

  let second = body_bytes(&parsed);
  assert_eq!(first, second);
}

#[test]
fn missing_reference_count_is_tolerated_and_restored() {
  let save = empty_save();
  let full = body_bytes(&save.body);

  // Drop the trailing zero reference count, as some emitters do
  let truncated = &full[..full.len() - 4];
  let parsed = SaveFileBody::read(&mut Cursor::new(truncated)).unwrap();
  assert_eq!(parsed.references, vec![]);

  // Re-emitting restores the explicit zero
  assert_eq!(body_bytes(&parsed), full);
}

#[test]
fn populated_save_round_trips_through_the_file_layer() {
  let save = populated_save();
  let bytes = write_save(&save);
  let parsed = parse_save(&bytes).unwrap();
  assert_eq!(parsed, save);
}

#[test]
fn utf16_session_name_survives_the_round_trip() {
  let save = populated_save();
  let parsed = parse_save(&write_save(&save)).unwrap();
  assert_eq!(parsed.header.session_name, "Завод №1");
}

#[test]
fn header_type_gate_applies_to_whole_files() {
  let mut bytes = write_save(&empty_save());
  bytes[..4].copy_from_slice(&13u32.to_le_bytes());
  let err = parse_save(&bytes).unwrap_err();
  assert_eq!(err.code(), "unsupported_save_header_version");
}

#[test]
fn save_version_gate_applies_to_whole_files() {
  let mut bytes = write_save(&empty_save());
  bytes[4..8].copy_from_slice(&51u32.to_le_bytes());
  let err = parse_save(&bytes).unwrap_err();
  assert_eq!(err.code(), "unsupported_save_version");
}

#[test]
fn bad_cheat_flag_fails_with_invalid_flag() {
  let save = empty_save();
  let mut header_image = SaveWriter::new();
  save.header.write(&mut header_image);
  let header_len = header_image.len() as usize;

  let mut bytes = write_save(&save);
  // is_cheat occupies the last four header bytes
  bytes[header_len - 4] = 2;
  let err = parse_save(&bytes).unwrap_err();
  assert_eq!(err.code(), "invalid_flag");
}

#[test]
fn corrupt_chunk_magic_fails_with_invalid_file() {
  let mut bytes = write_save(&empty_save());
  let signature = ficsit_sav::PACKAGE_SIGNATURE.to_le_bytes();
  let at = bytes
    .windows(4)
    .position(|window| window == signature.as_slice())
    .unwrap();
  bytes[at..at + 4].fill(0);
  let err = parse_save(&bytes).unwrap_err();
  assert_eq!(err.code(), "invalid_file");
}

#[test]
fn parsed_save_is_json_representable() {
  let save = populated_save();
  let json = serde_json::to_string(&save).unwrap();
  let back: SaveFile = serde_json::from_str(&json).unwrap();
  assert_eq!(back, save);
}
