//! Records - the unit of data held in a stream window.
//!
//! A record is identified by its key and round-trips through a flat
//! [`Fields`] mapping. Concrete record types are supplied by the application;
//! the engine only needs the capability set described by [`Record`].
//!
//! ## Example
//!
//! ```ignore
//! use streambase_rust::{Fields, FieldValue, Record};
//!
//! #[derive(Clone, Default)]
//! struct Message {
//!     key: Option<String>,
//!     text: Option<String>,
//! }
//!
//! impl Record for Message {
//!     fn key(&self) -> Option<&str> { self.key.as_deref() }
//!     fn set_key(&mut self, key: Option<String>) { self.key = key; }
//!     fn from_key(key: Option<String>) -> Self { Message { key, ..Default::default() } }
//!     fn fields(&self) -> Fields { /* text -> FieldValue::String */ }
//!     fn apply_fields(&mut self, fields: Option<&Fields>) { /* None = deleted */ }
//! }
//! ```

mod document;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StreamError;
use crate::value::{fields_from_json, FieldValue, Fields};

pub use document::Document;

/// Capability set the engine requires from a record type.
pub trait Record: Clone {
    /// The stable identifier, absent until the store or caller assigns one.
    fn key(&self) -> Option<&str>;

    fn set_key(&mut self, key: Option<String>);

    /// Flat field mapping derived from the full record state.
    fn fields(&self) -> Fields;

    /// Factory: an empty record for the given key.
    fn from_key(key: Option<String>) -> Self
    where
        Self: Sized;

    /// Replace the record state from a field mapping. `None` means the backing
    /// entry was deleted.
    fn apply_fields(&mut self, fields: Option<&Fields>);

    /// Value of a single field. Override when `fields()` is expensive.
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields().remove(name)
    }

    /// Build a record from a key and field mapping.
    fn from_parts(key: Option<String>, fields: Option<&Fields>) -> Self
    where
        Self: Sized,
    {
        let mut record = Self::from_key(key);
        record.apply_fields(fields);
        record
    }
}

/// Records are the same entity iff their keys are equal.
pub fn same_key<A: Record, B: Record>(a: &A, b: &B) -> bool {
    a.key() == b.key()
}

/// Serialize a typed value into a field mapping.
pub fn fields_of<T: Serialize>(value: &T) -> Result<Fields, StreamError> {
    let json = serde_json::to_value(value).map_err(|e| StreamError::MalformedEvent {
        key: None,
        reason: e.to_string(),
    })?;
    fields_from_json(json).ok_or_else(|| StreamError::MalformedEvent {
        key: None,
        reason: "value does not serialize to a field mapping".into(),
    })
}

/// Deserialize a typed value from a field mapping.
pub fn decode_fields<T: DeserializeOwned>(fields: &Fields) -> Result<T, StreamError> {
    let json = serde_json::Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    );
    serde_json::from_value(json).map_err(|e| StreamError::MalformedEvent {
        key: None,
        reason: e.to_string(),
    })
}
