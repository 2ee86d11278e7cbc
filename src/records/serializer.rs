//! Key/value serializers declared per store
//!
//! Store metadata declares a serializer per side. The record format is
//! advertised under the legacy type name "json" even though the wire
//! encoding is the binary record codec; "identity" passes raw bytes
//! through. Anything else is rejected when the store registry loads.

use crate::common::{Error, Result};
use crate::records::codec;
use crate::records::schema::Schema;
use crate::records::value::Value;
use std::collections::BTreeMap;

/// One `<schema-info>` entry from store metadata.
#[derive(Debug, Clone)]
pub struct SchemaText {
    /// Version attribute as written; `None` means version 0, the literal
    /// string "none" disables the version tag.
    pub version: Option<String>,
    pub text: String,
}

/// Serializer for one side (key or value) of one store.
#[derive(Debug, Clone)]
pub enum Serializer {
    /// Raw bytes in, raw bytes out.
    Identity,
    /// Schema-driven binary records.
    Record(RecordSerializer),
}

impl Serializer {
    /// Build from the declared type name and schema entries.
    pub fn from_spec(kind: &str, schemas: &[SchemaText]) -> Result<Self> {
        match kind {
            "identity" => Ok(Serializer::Identity),
            "json" => Ok(Serializer::Record(RecordSerializer::from_texts(schemas)?)),
            other => Err(Error::UnsupportedSerializer(other.to_string())),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            Serializer::Identity => match value {
                Value::Bytes(b) => Ok(b.clone()),
                Value::String(s) => Ok(s.as_bytes().to_vec()),
                other => Err(Error::SchemaMismatch(format!(
                    "identity serializer takes string or bytes, got {}",
                    other.type_name()
                ))),
            },
            Serializer::Record(record) => record.encode(value),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            Serializer::Identity => Ok(Value::Bytes(bytes.to_vec())),
            Serializer::Record(record) => record.decode(bytes),
        }
    }
}

/// Versioned record serializer.
///
/// Writers always use the highest-numbered schema. When the version tag
/// is enabled the written version leads the payload as a single byte and
/// readers dispatch on it; otherwise readers use schema 0.
#[derive(Debug, Clone)]
pub struct RecordSerializer {
    schemas: BTreeMap<u8, Schema>,
    has_version_tag: bool,
}

impl RecordSerializer {
    pub fn from_texts(texts: &[SchemaText]) -> Result<Self> {
        if texts.is_empty() {
            return Err(Error::InvalidSchema(
                "record serializer declared without schemas".into(),
            ));
        }

        let mut schemas = BTreeMap::new();
        let mut has_version_tag = true;

        for entry in texts {
            let version = match entry.version.as_deref() {
                None => 0,
                Some("none") => {
                    has_version_tag = false;
                    0
                }
                Some(raw) => raw.parse::<u8>().map_err(|_| {
                    Error::InvalidSchema(format!("invalid schema version '{}'", raw))
                })?,
            };

            if schemas
                .insert(version, Schema::parse(&entry.text)?)
                .is_some()
            {
                return Err(Error::InvalidSchema(format!(
                    "duplicate schema version {}",
                    version
                )));
            }
        }

        if !has_version_tag && schemas.len() > 1 {
            return Err(Error::InvalidSchema(
                "untagged serializer cannot declare multiple schema versions".into(),
            ));
        }

        Ok(Self {
            schemas,
            has_version_tag,
        })
    }

    /// Construct from a single schema, mainly for tests and fixtures.
    pub fn single(schema: Schema, has_version_tag: bool) -> Self {
        Self {
            schemas: BTreeMap::from([(0, schema)]),
            has_version_tag,
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let (version, schema) = self
            .schemas
            .iter()
            .next_back()
            .expect("constructor guarantees at least one schema");

        let mut out = Vec::new();
        if self.has_version_tag {
            out.push(*version);
        }
        out.extend(codec::encode(value, schema)?);
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        if self.has_version_tag {
            let (&version, rest) = bytes
                .split_first()
                .ok_or_else(|| Error::SchemaMismatch("empty record payload".into()))?;
            let schema = self
                .schemas
                .get(&version)
                .ok_or(Error::UnknownSchemaVersion(version))?;
            codec::decode(rest, schema)
        } else {
            let schema = self
                .schemas
                .get(&0)
                .ok_or(Error::UnknownSchemaVersion(0))?;
            codec::decode(bytes, schema)
        }
    }
}
