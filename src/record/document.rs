//! Document - a schemaless record holding its raw field mapping.

use super::Record;
use crate::value::{FieldValue, Fields};

/// Generic record: a key plus the raw field mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    key: Option<String>,
    fields: Fields,
}

impl Document {
    /// Create an empty document with a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            fields: Fields::new(),
        }
    }

    /// Create a document that has not been assigned a key yet.
    pub fn unkeyed() -> Self {
        Self::default()
    }

    pub fn with_fields(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            key: Some(key.into()),
            fields,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn raw_fields(&self) -> &Fields {
        &self.fields
    }
}

impl Record for Document {
    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn set_key(&mut self, key: Option<String>) {
        self.key = key;
    }

    fn fields(&self) -> Fields {
        self.fields.clone()
    }

    fn from_key(key: Option<String>) -> Self {
        Self {
            key,
            fields: Fields::new(),
        }
    }

    fn apply_fields(&mut self, fields: Option<&Fields>) {
        self.fields = fields.cloned().unwrap_or_default();
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }
}
