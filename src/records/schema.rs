//! Record schemas
//!
//! A schema node is a primitive name, a one-element list holding the
//! element schema, or a map of field name to sub-schema. Schema text in
//! store metadata is a JSON-style literal; single-quoted literals from
//! older deployments are tolerated.

use crate::common::{Error, Result};
use std::collections::BTreeMap;

/// Primitive wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Date,
    Bytes,
    Boolean,
}

impl Primitive {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(Primitive::String),
            "int8" => Ok(Primitive::Int8),
            "int16" => Ok(Primitive::Int16),
            "int32" => Ok(Primitive::Int32),
            "int64" => Ok(Primitive::Int64),
            "float32" => Ok(Primitive::Float32),
            "float64" => Ok(Primitive::Float64),
            "date" => Ok(Primitive::Date),
            "bytes" => Ok(Primitive::Bytes),
            "boolean" => Ok(Primitive::Boolean),
            other => Err(Error::InvalidSchema(format!(
                "unrecognised primitive type '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Date => "date",
            Primitive::Bytes => "bytes",
            Primitive::Boolean => "boolean",
        }
    }
}

/// A recursive schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Primitive(Primitive),
    List(Box<Schema>),
    Map(BTreeMap<String, Schema>),
}

impl Schema {
    /// Parse schema text. JSON first; on failure, single quotes are
    /// normalised to double quotes and parsing is retried.
    pub fn parse(text: &str) -> Result<Schema> {
        let json: serde_json::Value = match serde_json::from_str(text.trim()) {
            Ok(json) => json,
            Err(_) => {
                let normalised = text.trim().replace('\'', "\"");
                serde_json::from_str(&normalised).map_err(|e| {
                    Error::InvalidSchema(format!("unparseable schema text: {}", e))
                })?
            }
        };

        Self::from_json(&json)
    }

    fn from_json(json: &serde_json::Value) -> Result<Schema> {
        match json {
            serde_json::Value::String(name) => Ok(Schema::Primitive(Primitive::parse(name)?)),
            serde_json::Value::Array(items) => {
                if items.len() != 1 {
                    return Err(Error::InvalidSchema(format!(
                        "list schema must have exactly one element schema, got {}",
                        items.len()
                    )));
                }
                Ok(Schema::List(Box::new(Self::from_json(&items[0])?)))
            }
            serde_json::Value::Object(fields) => {
                let mut map = BTreeMap::new();
                for (name, sub) in fields {
                    map.insert(name.clone(), Self::from_json(sub)?);
                }
                Ok(Schema::Map(map))
            }
            other => Err(Error::InvalidSchema(format!(
                "schema node must be a string, list or object, got {}",
                other
            ))),
        }
    }
}
