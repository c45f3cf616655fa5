//! Table items and their JSON line encoding.
//!
//! - `numeric` - arbitrary-precision numbers and their JSON form
//! - `value` - ordered attribute maps
//! - `wire` - decoding of the store's typed item format

mod numeric;
mod value;
mod wire;

use thiserror::Error;

pub use numeric::{EncodedNumber, Number, NumericError};
pub use value::{AttributeValue, Record};
pub use wire::{decode_item, decode_value};

/// Error produced when an item cannot be turned into a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Number(#[from] NumericError),

    #[error("attribute '{name}': {source}")]
    Attribute {
        name: String,
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Names the attribute the error came from.
    pub(crate) fn in_attribute(self, name: &str) -> Self {
        Self::Attribute {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Serializes a record as one JSON line, newline included, into `buf`.
pub fn write_json_line(record: &Record, buf: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    serde_json::to_writer(&mut *buf, record)?;
    buf.push(b'\n');
    Ok(())
}
