//! Wire protocol for blockcast - newline-delimited JSON messages
//!
//! Every message is a single JSON object on its own line, discriminated by
//! its `type` field:
//! ```ignore
//! let line = encode_line(&ServerMessage::chat("user1", "global", "hi"))?;
//! let msg: ClientMessage = decode_line(r#"{"type":"req_mapblock","pos":{"x":0,"y":-1,"z":0}}"#)?;
//! ```

pub mod protocol;

pub use protocol::*;

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;
