//! Binary record encode/decode
//!
//! Wire rules, all integers big-endian:
//! - every primitive reserves one bit pattern as its NULL sentinel
//! - int64 is written as two 32-bit halves (high, low)
//! - string/bytes/list lengths use a 16-bit form below 2^15 - 1 and a
//!   30-bit form tagged with the top two bits otherwise; 0xFFFF is NULL
//! - a map is 0xFF when NULL, else a 0x01 marker followed by its fields
//!   in lexicographic name order

use crate::common::{Error, Result};
use crate::records::schema::{Primitive, Schema};
use crate::records::value::Value;
use chrono::DateTime;
use std::collections::BTreeMap;

const MAP_NULL: u8 = 0xFF;
const MAP_PRESENT: u8 = 0x01;
const BOOLEAN_NULL: u8 = 0x80;
const LENGTH_NULL: u16 = 0xFFFF;
const SHORT_LENGTH_MAX: usize = 0x7FFF; // exclusive
const LONG_LENGTH_MAX: usize = 0x3FFF_FFFF; // exclusive
const LONG_LENGTH_TAG: u32 = 0xC000_0000;

/// Encode `value` against `schema`.
pub fn encode(value: &Value, schema: &Schema) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_value(&mut buf, value, schema)?;
    Ok(buf)
}

/// Decode a full buffer against `schema`. Trailing bytes are an error.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = read_value(&mut reader, schema)?;
    if !reader.is_empty() {
        return Err(Error::SchemaMismatch(format!(
            "{} trailing bytes after record",
            reader.remaining()
        )));
    }
    Ok(value)
}

// === Writing ===

fn write_value(buf: &mut Vec<u8>, value: &Value, schema: &Schema) -> Result<()> {
    match schema {
        Schema::Primitive(p) => write_primitive(buf, value, *p),
        Schema::List(elem) => write_list(buf, value, elem),
        Schema::Map(fields) => write_map(buf, value, fields),
    }
}

fn write_primitive(buf: &mut Vec<u8>, value: &Value, primitive: Primitive) -> Result<()> {
    match primitive {
        Primitive::Boolean => match value {
            Value::Null => buf.push(BOOLEAN_NULL),
            Value::Boolean(b) => buf.push(u8::from(*b)),
            other => return Err(mismatch(primitive, other)),
        },
        Primitive::Int8 => write_int(buf, value, primitive, i8::MIN as i64, i8::MAX as i64, 1)?,
        Primitive::Int16 => write_int(buf, value, primitive, i16::MIN as i64, i16::MAX as i64, 2)?,
        Primitive::Int32 => write_int(buf, value, primitive, i32::MIN as i64, i32::MAX as i64, 4)?,
        Primitive::Int64 => write_int(buf, value, primitive, i64::MIN, i64::MAX, 8)?,
        Primitive::Date => match value {
            Value::Null => write_i64_halves(buf, i64::MIN),
            Value::Date(d) => {
                let millis = d.timestamp_millis();
                if millis == i64::MIN {
                    return Err(Error::ValueOutOfRange("date equals the NULL sentinel".into()));
                }
                write_i64_halves(buf, millis);
            }
            other => return Err(mismatch(primitive, other)),
        },
        Primitive::Float32 => match value {
            Value::Null => buf.extend_from_slice(&1u32.to_be_bytes()),
            Value::Float(_) | Value::Int(_) => {
                let f = as_float(value) as f32;
                if f.is_finite() && f == f32::from_bits(1) {
                    return Err(Error::ValueOutOfRange(
                        "float32 value equals the NULL sentinel".into(),
                    ));
                }
                buf.extend_from_slice(&f.to_be_bytes());
            }
            other => return Err(mismatch(primitive, other)),
        },
        Primitive::Float64 => match value {
            Value::Null => buf.extend_from_slice(&1u64.to_be_bytes()),
            Value::Float(_) | Value::Int(_) => {
                let f = as_float(value);
                if f.is_finite() && f == f64::from_bits(1) {
                    return Err(Error::ValueOutOfRange(
                        "float64 value equals the NULL sentinel".into(),
                    ));
                }
                buf.extend_from_slice(&f.to_be_bytes());
            }
            other => return Err(mismatch(primitive, other)),
        },
        Primitive::String => match value {
            Value::Null => buf.extend_from_slice(&LENGTH_NULL.to_be_bytes()),
            Value::String(s) => {
                write_length(buf, s.len())?;
                buf.extend_from_slice(s.as_bytes());
            }
            other => return Err(mismatch(primitive, other)),
        },
        Primitive::Bytes => match value {
            Value::Null => buf.extend_from_slice(&LENGTH_NULL.to_be_bytes()),
            Value::Bytes(b) => {
                write_length(buf, b.len())?;
                buf.extend_from_slice(b);
            }
            other => return Err(mismatch(primitive, other)),
        },
    }

    Ok(())
}

/// Writes an integer of the given width. `min` itself is the NULL
/// sentinel and is rejected on encode; only a decoded sentinel maps back
/// to NULL.
fn write_int(
    buf: &mut Vec<u8>,
    value: &Value,
    primitive: Primitive,
    min: i64,
    max: i64,
    width: usize,
) -> Result<()> {
    let v = match value {
        Value::Null => min,
        Value::Int(v) => {
            if *v <= min || *v > max {
                return Err(Error::ValueOutOfRange(format!(
                    "{} out of range for {}",
                    v,
                    primitive.name()
                )));
            }
            *v
        }
        other => return Err(mismatch(primitive, other)),
    };

    match width {
        1 => buf.push(v as i8 as u8),
        2 => buf.extend_from_slice(&(v as i16).to_be_bytes()),
        4 => buf.extend_from_slice(&(v as i32).to_be_bytes()),
        _ => write_i64_halves(buf, v),
    }

    Ok(())
}

fn write_i64_halves(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&((v >> 32) as u32).to_be_bytes());
    buf.extend_from_slice(&(v as u32).to_be_bytes());
}

fn write_list(buf: &mut Vec<u8>, value: &Value, elem: &Schema) -> Result<()> {
    match value {
        Value::Null => {
            buf.extend_from_slice(&LENGTH_NULL.to_be_bytes());
            Ok(())
        }
        Value::List(items) => {
            write_length(buf, items.len())?;
            for item in items {
                write_value(buf, item, elem)?;
            }
            Ok(())
        }
        other => Err(Error::SchemaMismatch(format!(
            "expected list, got {}",
            other.type_name()
        ))),
    }
}

fn write_map(buf: &mut Vec<u8>, value: &Value, fields: &BTreeMap<String, Schema>) -> Result<()> {
    match value {
        Value::Null => {
            buf.push(MAP_NULL);
            Ok(())
        }
        Value::Map(entries) => {
            for name in entries.keys() {
                if !fields.contains_key(name) {
                    return Err(Error::SchemaMismatch(format!(
                        "field '{}' not in schema",
                        name
                    )));
                }
            }

            buf.push(MAP_PRESENT);
            for (name, sub) in fields {
                let field = entries.get(name).ok_or_else(|| {
                    Error::SchemaMismatch(format!("missing field '{}'", name))
                })?;
                write_value(buf, field, sub)?;
            }
            Ok(())
        }
        other => Err(Error::SchemaMismatch(format!(
            "expected map, got {}",
            other.type_name()
        ))),
    }
}

fn write_length(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    if len < SHORT_LENGTH_MAX {
        buf.extend_from_slice(&(len as u16).to_be_bytes());
        Ok(())
    } else if len < LONG_LENGTH_MAX {
        buf.extend_from_slice(&(len as u32 | LONG_LENGTH_TAG).to_be_bytes());
        Ok(())
    } else {
        Err(Error::ValueOutOfRange(format!("length {} too large", len)))
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f64,
        _ => unreachable!("checked by caller"),
    }
}

fn mismatch(primitive: Primitive, value: &Value) -> Error {
    Error::SchemaMismatch(format!(
        "expected {}, got {}",
        primitive.name(),
        value.type_name()
    ))
}

// === Reading ===

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::SchemaMismatch("unexpected end of record".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }
}

fn read_value(reader: &mut Reader<'_>, schema: &Schema) -> Result<Value> {
    match schema {
        Schema::Primitive(p) => read_primitive(reader, *p),
        Schema::List(elem) => read_list(reader, elem),
        Schema::Map(fields) => read_map(reader, fields),
    }
}

fn read_primitive(reader: &mut Reader<'_>, primitive: Primitive) -> Result<Value> {
    match primitive {
        Primitive::Boolean => match reader.u8()? {
            BOOLEAN_NULL => Ok(Value::Null),
            0 => Ok(Value::Boolean(false)),
            1 => Ok(Value::Boolean(true)),
            other => Err(Error::SchemaMismatch(format!(
                "invalid boolean byte 0x{:02X}",
                other
            ))),
        },
        Primitive::Int8 => Ok(match reader.u8()? as i8 {
            i8::MIN => Value::Null,
            v => Value::Int(v as i64),
        }),
        Primitive::Int16 => Ok(match reader.i16()? {
            i16::MIN => Value::Null,
            v => Value::Int(v as i64),
        }),
        Primitive::Int32 => Ok(match reader.i32()? {
            i32::MIN => Value::Null,
            v => Value::Int(v as i64),
        }),
        Primitive::Int64 => Ok(match reader.i64()? {
            i64::MIN => Value::Null,
            v => Value::Int(v),
        }),
        Primitive::Date => match reader.i64()? {
            i64::MIN => Ok(Value::Null),
            millis => DateTime::from_timestamp_millis(millis)
                .map(Value::Date)
                .ok_or_else(|| Error::SchemaMismatch(format!("date {} out of range", millis))),
        },
        Primitive::Float32 => {
            let f = reader.f32()?;
            if f.to_bits() == 1 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(f as f64))
            }
        }
        Primitive::Float64 => {
            let f = reader.f64()?;
            if f.to_bits() == 1 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(f))
            }
        }
        Primitive::String => match read_length(reader)? {
            None => Ok(Value::Null),
            Some(len) => {
                let raw = reader.take(len)?;
                String::from_utf8(raw.to_vec())
                    .map(Value::String)
                    .map_err(|_| Error::SchemaMismatch("invalid UTF-8 in string".into()))
            }
        },
        Primitive::Bytes => match read_length(reader)? {
            None => Ok(Value::Null),
            Some(len) => Ok(Value::Bytes(reader.take(len)?.to_vec())),
        },
    }
}

fn read_list(reader: &mut Reader<'_>, elem: &Schema) -> Result<Value> {
    match read_length(reader)? {
        None => Ok(Value::Null),
        Some(len) => {
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(read_value(reader, elem)?);
            }
            Ok(Value::List(items))
        }
    }
}

fn read_map(reader: &mut Reader<'_>, fields: &BTreeMap<String, Schema>) -> Result<Value> {
    match reader.u8()? {
        MAP_NULL => Ok(Value::Null),
        MAP_PRESENT => {
            let mut entries = BTreeMap::new();
            for (name, sub) in fields {
                entries.insert(name.clone(), read_value(reader, sub)?);
            }
            Ok(Value::Map(entries))
        }
        other => Err(Error::SchemaMismatch(format!(
            "invalid map marker 0x{:02X}",
            other
        ))),
    }
}

/// `None` is the NULL marker. A set top bit switches to the 30-bit form:
/// the low 14 bits join the next 16 bits.
fn read_length(reader: &mut Reader<'_>) -> Result<Option<usize>> {
    let head = reader.u16()?;
    if head == LENGTH_NULL {
        return Ok(None);
    }

    if head & 0x8000 != 0 {
        let tail = reader.u16()?;
        Ok(Some((((head & 0x3FFF) as usize) << 16) | tail as usize))
    } else {
        Ok(Some(head as usize))
    }
}
