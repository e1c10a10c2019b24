//! Change events and their payload encodings.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::value::{fields_from_json, FieldValue, Fields};

/// Kind of remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// How a store encodes event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Already-decoded fields.
    Fields,
    /// JSON object bytes.
    #[default]
    Json,
    /// Compact binary via bitcode.
    Bitcode,
}

/// Record state carried by an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(Fields),
    Json(Vec<u8>),
    Bitcode(Vec<u8>),
}

/// Binary leaf of a flattened field mapping. Bitcode cannot drive untagged
/// enums, so the binary encoding lists `(path, leaf)` pairs instead.
#[derive(Serialize, Deserialize)]
enum WireLeaf {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    EmptyMap,
}

type WireEntry = (Vec<String>, WireLeaf);

fn to_wire(fields: &Fields) -> Vec<WireEntry> {
    fn walk(fields: &Fields, path: &mut Vec<String>, out: &mut Vec<WireEntry>) {
        for (name, value) in fields {
            path.push(name.clone());
            let leaf = match value {
                FieldValue::Null => Some(WireLeaf::Null),
                FieldValue::Bool(b) => Some(WireLeaf::Bool(*b)),
                FieldValue::Number(n) => Some(WireLeaf::Number(*n)),
                FieldValue::String(s) => Some(WireLeaf::String(s.clone())),
                FieldValue::Map(nested) if nested.is_empty() => Some(WireLeaf::EmptyMap),
                FieldValue::Map(nested) => {
                    walk(nested, path, out);
                    None
                }
            };
            if let Some(leaf) = leaf {
                out.push((path.clone(), leaf));
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(fields, &mut Vec::new(), &mut out);
    out
}

fn from_wire(entries: Vec<WireEntry>) -> Result<Fields, String> {
    let mut fields = Fields::new();
    for (path, leaf) in entries {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| "binary payload entry has an empty path".to_string())?;

        let mut map = &mut fields;
        for name in parents {
            let slot = map
                .entry(name.clone())
                .or_insert_with(|| FieldValue::Map(Fields::new()));
            map = match slot {
                FieldValue::Map(nested) => nested,
                _ => return Err(format!("binary payload path conflict at {}", name)),
            };
        }

        let value = match leaf {
            WireLeaf::Null => FieldValue::Null,
            WireLeaf::Bool(b) => FieldValue::Bool(b),
            WireLeaf::Number(n) => FieldValue::Number(n),
            WireLeaf::String(s) => FieldValue::String(s),
            WireLeaf::EmptyMap => FieldValue::Map(Fields::new()),
        };
        map.insert(last.clone(), value);
    }
    Ok(fields)
}

impl Payload {
    /// Encode fields in the given format.
    pub fn encode(format: PayloadFormat, fields: &Fields) -> Result<Self, StreamError> {
        let malformed = |reason: String| StreamError::MalformedEvent { key: None, reason };
        match format {
            PayloadFormat::Fields => Ok(Payload::Fields(fields.clone())),
            PayloadFormat::Json => serde_json::to_vec(fields)
                .map(Payload::Json)
                .map_err(|e| malformed(e.to_string())),
            PayloadFormat::Bitcode => bitcode::serialize(&to_wire(fields))
                .map(Payload::Bitcode)
                .map_err(|e| malformed(e.to_string())),
        }
    }

    /// Decode into a field mapping.
    pub fn decode(&self) -> Result<Fields, String> {
        match self {
            Payload::Fields(fields) => Ok(fields.clone()),
            Payload::Json(bytes) => {
                let value: serde_json::Value =
                    serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
                fields_from_json(value).ok_or_else(|| "payload is not an object".to_string())
            }
            Payload::Bitcode(bytes) => {
                let entries: Vec<WireEntry> =
                    bitcode::deserialize(bytes).map_err(|e| e.to_string())?;
                from_wire(entries)
            }
        }
    }
}

/// One remote change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    /// Present for `Added` and `Changed`, absent for `Removed`.
    pub payload: Option<Payload>,
}

impl ChangeEvent {
    pub fn added(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            kind: ChangeKind::Added,
            key: key.into(),
            payload: Some(Payload::Fields(fields)),
        }
    }

    pub fn changed(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            kind: ChangeKind::Changed,
            key: key.into(),
            payload: Some(Payload::Fields(fields)),
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            key: key.into(),
            payload: None,
        }
    }

    /// Resolve the event into its key and new state (`None` for removals).
    pub fn decode(&self) -> Result<(&str, Option<Fields>), StreamError> {
        let malformed = |reason: &str| StreamError::MalformedEvent {
            key: (!self.key.is_empty()).then(|| self.key.clone()),
            reason: reason.to_string(),
        };

        if self.key.is_empty() {
            return Err(malformed("event has no key"));
        }

        match (self.kind, &self.payload) {
            (ChangeKind::Removed, _) => Ok((&self.key, None)),
            (_, None) => Err(malformed("event carries no payload")),
            (_, Some(payload)) => payload
                .decode()
                .map(|fields| (self.key.as_str(), Some(fields)))
                .map_err(|reason| malformed(&reason)),
        }
    }
}
