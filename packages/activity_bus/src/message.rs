use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MessageError;

/// Field every message carries: the opaque token of the session that sent it.
pub const SENDER_ID: &str = "sender-id";

/// A single value stored in a [`Message`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// An immutable mapping from field name to value, stamped with a sender id.
///
/// Messages are built once with [`Message::new`] and [`Message::with`] and
/// then shared read-only with every subscriber. Serialized as a flat map;
/// deserializing rejects maps without a text `sender-id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, FieldValue>",
    into = "BTreeMap<String, FieldValue>"
)]
pub struct Message {
    fields: BTreeMap<String, FieldValue>,
}

impl Message {
    pub fn new(sender_id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(SENDER_ID.to_string(), FieldValue::Text(sender_id.into()));
        Self { fields }
    }

    /// Add (or replace) a field. `sender-id` cannot be overwritten.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        if name != SENDER_ID {
            self.fields.insert(name, value.into());
        }
        self
    }

    pub fn sender_id(&self) -> &str {
        match self.fields.get(SENDER_ID) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_int(&self, name: &str) -> Result<i64, MessageError> {
        match self.require(name)? {
            FieldValue::Int(v) => Ok(*v),
            _ => Err(mismatch(name, "an integer")),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<&str, MessageError> {
        match self.require(name)? {
            FieldValue::Text(v) => Ok(v),
            _ => Err(mismatch(name, "text")),
        }
    }

    pub fn get_timestamp(&self, name: &str) -> Result<DateTime<Utc>, MessageError> {
        match self.require(name)? {
            FieldValue::Timestamp(v) => Ok(*v),
            _ => Err(mismatch(name, "a timestamp")),
        }
    }

    /// Field names and values in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn require(&self, name: &str) -> Result<&FieldValue, MessageError> {
        self.fields
            .get(name)
            .ok_or_else(|| MessageError::MissingField(name.to_string()))
    }
}

impl TryFrom<BTreeMap<String, FieldValue>> for Message {
    type Error = MessageError;

    fn try_from(fields: BTreeMap<String, FieldValue>) -> Result<Self, Self::Error> {
        match fields.get(SENDER_ID) {
            Some(FieldValue::Text(_)) => Ok(Self { fields }),
            Some(_) => Err(mismatch(SENDER_ID, "text")),
            None => Err(MessageError::MissingField(SENDER_ID.to_string())),
        }
    }
}

impl From<Message> for BTreeMap<String, FieldValue> {
    fn from(message: Message) -> Self {
        message.fields
    }
}

fn mismatch(field: &str, expected: &'static str) -> MessageError {
    MessageError::TypeMismatch {
        field: field.to_string(),
        expected,
    }
}
