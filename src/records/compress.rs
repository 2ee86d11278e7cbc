//! Value transcoding between the wire and the record codec
//!
//! Stores may declare gzip on either side. The codec works on whole
//! buffers; values in this dialect are small enough that streaming buys
//! nothing.

use crate::common::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Compression declared by store metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Identity,
    Gzip,
}

impl Compression {
    /// Build from the declared type name. Absent, empty and "none" all
    /// mean identity; anything except "gzip" is rejected.
    pub fn from_spec(kind: Option<&str>) -> Result<Self> {
        match kind {
            None | Some("") | Some("none") => Ok(Compression::Identity),
            Some("gzip") => Ok(Compression::Gzip),
            Some(other) => Err(Error::UnsupportedCompression(other.to_string())),
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Identity => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::Identity => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}
