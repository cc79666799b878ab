//! Protocol messages - JSON request/update definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Three-component vector as sent on the wire (`{"x":..,"y":..,"z":..}`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xyz<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> Xyz<T> {
    pub fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion (`{"x":..,"y":..,"z":..,"w":..}`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Messages sent from a client to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the full record of one mapblock
    ReqMapblock { pos: Xyz<i32> },
    /// Upload a full mapblock, replacing the server copy
    SetMapblock { data: MapblockRecord },
    /// Place a single node at a world position
    SetNode { pos: Xyz<i32>, data: NodeEdit },
    /// Report the sender's own transform
    SetPlayerPos {
        pos: Xyz<f32>,
        vel: Xyz<f32>,
        rot: Quaternion,
    },
    /// Post a chat line to a channel
    SendChat { channel: String, message: String },
    /// Run a slash command such as `/nick new_name`
    ChatCommand { command: String },
}

/// Payload of a `set_node` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEdit {
    /// Material identifier, e.g. `default:stone`
    pub itemstring: String,
    /// Orientation. Any integer is accepted; the server keeps the low 8 bits.
    pub rot: i64,
}

/// Messages sent from the server to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full mapblock record, either as a reply or as a broadcast update
    ReqMapblock { data: MapblockRecord },
    /// Chat line. `from` is absent for server notices; `private` marks a
    /// reply meant for one player only.
    SendChat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        channel: String,
        message: String,
        #[serde(default, skip_serializing_if = "is_false")]
        private: bool,
    },
    /// Entity create/update/delete actions
    UpdateEntities { actions: Vec<EntityAction> },
}

/// Full mapblock record as exchanged on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapblockRecord {
    pub pos: Xyz<i32>,
    pub update_num: u64,
    pub light_update_num: u64,
    /// 0 = up to date, 1 = needs recompute, 2 = needs full recompute
    pub light_needs_update: u8,
    #[serde(rename = "IDtoIS")]
    pub id_to_is: Vec<String>,
    #[serde(rename = "IStoID")]
    pub is_to_id: BTreeMap<String, u32>,
    pub props: MapblockProps,
    /// Packed node values indexed `[x][y][z]`
    pub data: Vec<Vec<Vec<u32>>>,
}

/// Generation metadata attached to a mapblock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapblockProps {
    pub sunlit: bool,
    /// Any additional keys are carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityActionKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAction {
    #[serde(rename = "type")]
    pub kind: EntityActionKind,
    pub data: EntityData,
}

/// Serialized entity transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub id: String,
    pub pos: Xyz<f32>,
    pub vel: Xyz<f32>,
    pub rot: Quaternion,
}

impl EntityAction {
    pub fn create(data: EntityData) -> Self {
        Self {
            kind: EntityActionKind::Create,
            data,
        }
    }

    pub fn update(data: EntityData) -> Self {
        Self {
            kind: EntityActionKind::Update,
            data,
        }
    }

    pub fn delete(data: EntityData) -> Self {
        Self {
            kind: EntityActionKind::Delete,
            data,
        }
    }
}

impl ServerMessage {
    pub fn mapblock(data: MapblockRecord) -> Self {
        Self::ReqMapblock { data }
    }

    pub fn chat(
        from: impl Into<String>,
        channel: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SendChat {
            from: Some(from.into()),
            channel: channel.into(),
            message: message.into(),
            private: false,
        }
    }

    /// Server notice to everyone
    pub fn notice(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendChat {
            from: None,
            channel: channel.into(),
            message: message.into(),
            private: false,
        }
    }

    /// Server reply to a single player
    pub fn private_notice(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendChat {
            from: None,
            channel: channel.into(),
            message: message.into(),
            private: true,
        }
    }

    pub fn entities(actions: Vec<EntityAction>) -> Self {
        Self::UpdateEntities { actions }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serialize a message as a single newline-terminated JSON line
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Parse one JSON line (surrounding whitespace is ignored)
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_set_node() {
        let msg: ClientMessage = decode_line(
            r#"{"type":"set_node","pos":{"x":-1,"y":3,"z":17},"data":{"itemstring":"default:stone","rot":4}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::SetNode { pos, data } => {
                assert_eq!(pos, Xyz::new(-1, 3, 17));
                assert_eq!(data.itemstring, "default:stone");
                assert_eq!(data.rot, 4);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_decode_player_pos() {
        let msg: ClientMessage = decode_line(
            r#"{"type":"set_player_pos","pos":{"x":1.5,"y":2,"z":3},"vel":{"x":0,"y":0,"z":0},"rot":{"x":0,"y":0,"z":0,"w":1}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::SetPlayerPos { rot, .. } if rot.w == 1.0));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let res: Result<ClientMessage, _> = decode_line(r#"{"type":"teleport","pos":{"x":0,"y":0,"z":0}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_mapblock_field_names() {
        let record = MapblockRecord {
            pos: Xyz::new(0, -1, 0),
            update_num: 1,
            light_update_num: 0,
            light_needs_update: 1,
            id_to_is: vec!["air".into()],
            is_to_id: BTreeMap::from([("air".to_string(), 0)]),
            props: MapblockProps::default(),
            data: vec![],
        };
        let value = serde_json::to_value(ServerMessage::mapblock(record)).unwrap();
        assert_eq!(value["type"], "req_mapblock");
        let data = &value["data"];
        assert_eq!(data["updateNum"], 1);
        assert_eq!(data["lightUpdateNum"], 0);
        assert_eq!(data["lightNeedsUpdate"], 1);
        assert_eq!(data["IDtoIS"][0], "air");
        assert_eq!(data["IStoID"]["air"], 0);
        assert_eq!(data["props"]["sunlit"], false);
    }

    #[test]
    fn test_props_keep_unknown_keys() {
        let props: MapblockProps =
            serde_json::from_str(r#"{"sunlit":true,"biome":"plains"}"#).unwrap();
        assert!(props.sunlit);
        assert_eq!(props.extra["biome"], "plains");
        let back = serde_json::to_value(&props).unwrap();
        assert_eq!(back["biome"], "plains");
    }

    #[test]
    fn test_entity_action_shape() {
        let action = EntityAction::delete(EntityData {
            id: "user7".into(),
            pos: Xyz::default(),
            vel: Xyz::default(),
            rot: Quaternion::default(),
        });
        let value = serde_json::to_value(ServerMessage::entities(vec![action])).unwrap();
        assert_eq!(value["type"], "update_entities");
        assert_eq!(value["actions"][0]["type"], "delete");
        assert_eq!(value["actions"][0]["data"]["id"], "user7");
    }

    #[test]
    fn test_encode_line_terminated() {
        let line = encode_line(&ServerMessage::chat("user1", "global", "hi")).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_rotation_accepts_any_integer() {
        for (raw, expected) in [("-1", -1i64), ("4294967296", 1i64 << 32)] {
            let line = format!(
                r#"{{"type":"set_node","pos":{{"x":0,"y":0,"z":0}},"data":{{"itemstring":"air","rot":{}}}}}"#,
                raw
            );
            match decode_line::<ClientMessage>(&line).unwrap() {
                ClientMessage::SetNode { data, .. } => assert_eq!(data.rot, expected),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn test_chat_shapes() {
        let public = serde_json::to_value(ServerMessage::chat("user1", "global", "hi")).unwrap();
        assert_eq!(public["from"], "user1");
        assert!(public.get("private").is_none());

        let private = serde_json::to_value(ServerMessage::private_notice("server", "unknown command")).unwrap();
        assert_eq!(private["type"], "send_chat");
        assert_eq!(private["private"], true);
        assert!(private.get("from").is_none());

        let cmd: ClientMessage = decode_line(r#"{"type":"chat_command","command":"/nick bob"}"#).unwrap();
        assert!(matches!(cmd, ClientMessage::ChatCommand { command } if command == "/nick bob"));
    }
}
