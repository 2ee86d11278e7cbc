//! Wire protocol: length-prefixed frames with protobuf bodies

pub mod codec;
pub mod messages;

pub use codec::{build_get, frame, parse_get};
