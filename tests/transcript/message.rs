//! Chat message record used by the transcript tests.

use serde::{Deserialize, Serialize};
use streambase_rust::{decode_fields, fields_of, Fields, Record};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    key: Option<String>,
    body: Body,
}

impl Message {
    pub fn new(key: &str, username: &str, text: &str, sent_at: i64) -> Self {
        Self {
            key: Some(key.to_string()),
            body: Body {
                text: Some(text.to_string()),
                username: Some(username.to_string()),
                sent_at: Some(sent_at),
            },
        }
    }

    /// A message the store has not assigned a key to yet.
    pub fn draft(username: &str, text: &str) -> Self {
        Self {
            key: None,
            body: Body {
                text: Some(text.to_string()),
                username: Some(username.to_string()),
                sent_at: None,
            },
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.body.text.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.body.username.as_deref()
    }

    pub fn sent_at(&self) -> Option<i64> {
        self.body.sent_at
    }
}

impl Record for Message {
    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn set_key(&mut self, key: Option<String>) {
        self.key = key;
    }

    fn fields(&self) -> Fields {
        fields_of(&self.body).unwrap_or_default()
    }

    fn from_key(key: Option<String>) -> Self {
        Self {
            key,
            body: Body::default(),
        }
    }

    fn apply_fields(&mut self, fields: Option<&Fields>) {
        self.body = match fields {
            Some(fields) => decode_fields(fields).unwrap_or_default(),
            None => Body::default(),
        };
    }
}
