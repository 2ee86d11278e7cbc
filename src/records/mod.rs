//! Schema-driven binary record codec and per-store serializers

pub mod codec;
pub mod compress;
pub mod schema;
pub mod serializer;
pub mod value;

pub use compress::Compression;
pub use schema::{Primitive, Schema};
pub use serializer::{RecordSerializer, SchemaText, Serializer};
pub use value::Value;
