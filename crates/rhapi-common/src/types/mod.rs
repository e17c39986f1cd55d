//! Worker wire contract
//!
//! The worker answers `GET <data_url>?page=N` with a JSON object
//! `{ "items": [...], "version": "..." }`. These types are the only way the
//! server reads that payload; nothing scans raw worker output for substrings.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A catalog item.
///
/// Identity is the `id`. Every other field the worker sends is kept in
/// `fields` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier. Integer ids are normalised to their decimal form.
    #[serde(deserialize_with = "deserialize_item_id")]
    pub id: String,

    /// Display name, when the worker provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remaining catalog-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    /// Create an item with no extra fields
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            fields: Map::new(),
        }
    }

    /// Attach an extra field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItemId {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_item_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match RawItemId::deserialize(deserializer)? {
        RawItemId::Text(id) => Ok(id),
        RawItemId::Number(id) => Ok(id.to_string()),
    }
}

/// Body of one worker page response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    pub items: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A page payload after item validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPage {
    pub items: Vec<Item>,
    pub version: Option<String>,
    /// Entries dropped because they were not objects or carried no usable id
    pub skipped: usize,
}

impl PagePayload {
    /// Build a payload from typed items (used by worker fakes and fixtures)
    pub fn from_items(items: &[Item], version: Option<&str>) -> Self {
        Self {
            items: items
                .iter()
                .filter_map(|item| serde_json::to_value(item).ok())
                .collect(),
            version: version.map(str::to_string),
        }
    }

    /// Decode a raw response body.
    ///
    /// A body that is not a JSON object with an `items` array (or whose
    /// `version` is not a string) is an error. Individual entries without an
    /// id cannot be identified or indexed, so they are counted and dropped.
    pub fn decode(body: &[u8]) -> Result<DecodedPage> {
        let payload: PagePayload = serde_json::from_slice(body)?;
        Ok(payload.into_decoded())
    }

    fn into_decoded(self) -> DecodedPage {
        let mut items = Vec::with_capacity(self.items.len());
        let mut skipped = 0;

        for raw in self.items {
            match serde_json::from_value::<Item>(raw) {
                Ok(item) if !item.id.is_empty() => items.push(item),
                _ => skipped += 1,
            }
        }

        DecodedPage {
            items,
            version: self.version.filter(|v| !v.is_empty()),
            skipped,
        }
    }
}
