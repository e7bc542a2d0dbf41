// Raw entity records as served by the CRUD API

use crate::payload::{Payload, PayloadKind};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Sort key attribute shared by every catalog table
pub const SORT_KEY: &str = "METADATA";

/// Attribute holding the encoded payload
pub const DATA_FIELD: &str = "data";

/// Tables exposed by the CRUD API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "tft_augments")]
    Augments,
    #[serde(rename = "tft_builds")]
    Builds,
    #[serde(rename = "tft_champions")]
    Champions,
    #[serde(rename = "tft_items")]
    Items,
    #[serde(rename = "tft_traits")]
    Traits,
    #[serde(rename = "tft_users")]
    Users,
}

impl Collection {
    /// Collections loaded into a catalog, in fetch order
    pub const CATALOG: [Collection; 4] = [
        Collection::Traits,
        Collection::Champions,
        Collection::Augments,
        Collection::Items,
    ];

    /// Table name used by the API (e.g. "tft_champions")
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Augments => "tft_augments",
            Collection::Builds => "tft_builds",
            Collection::Champions => "tft_champions",
            Collection::Items => "tft_items",
            Collection::Traits => "tft_traits",
            Collection::Users => "tft_users",
        }
    }

    /// Partition key attribute holding the record identifier
    pub fn partition_key(self) -> &'static str {
        match self {
            Collection::Augments => "AUGMENT#",
            Collection::Builds => "BUILD#",
            Collection::Champions => "CHAMPION#",
            Collection::Items => "ITEM#",
            Collection::Traits => "TRAIT#",
            Collection::Users => "USER#",
        }
    }

    /// Payload schema for this collection, if it has one
    pub fn payload_kind(self) -> Option<PayloadKind> {
        match self {
            Collection::Augments => Some(PayloadKind::Augment),
            Collection::Champions => Some(PayloadKind::Champion),
            Collection::Items => Some(PayloadKind::Item),
            Collection::Traits => Some(PayloadKind::Trait),
            Collection::Builds | Collection::Users => None,
        }
    }
}

impl FromStr for Collection {
    type Err = eyre::Report;

    /// Accepts both the table name ("tft_items") and the short form ("items")
    fn from_str(s: &str) -> Result<Self> {
        let short = s.strip_prefix("tft_").unwrap_or(s);
        match short.to_ascii_lowercase().as_str() {
            "augments" => Ok(Collection::Augments),
            "builds" => Ok(Collection::Builds),
            "champions" => Ok(Collection::Champions),
            "items" => Ok(Collection::Items),
            "traits" => Ok(Collection::Traits),
            "users" => Ok(Collection::Users),
            _ => Err(eyre!("Unknown collection: {}", s)),
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// One entity as returned by the data-access layer
///
/// `raw` is the encoded payload exactly as received and is never rewritten;
/// `parsed` is filled in by the index builder when `raw` decodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub collection: Collection,
    pub id: String,
    pub metadata: Option<String>,
    pub raw: Option<String>,
    pub parsed: Option<Payload>,
    /// Any other item attributes, preserved for `to_item`
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(collection: Collection, id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
            metadata: None,
            raw: Some(raw.into()),
            parsed: None,
            attributes: Map::new(),
        }
    }

    /// Build a record from a wire item
    ///
    /// A `data` attribute that is already an object is serialized once so
    /// `raw` always holds the encoded form.
    pub fn from_item(collection: Collection, item: Value) -> Result<Self> {
        let Value::Object(mut attributes) = item else {
            return Err(eyre!("Item in {} is not an object", collection));
        };

        let id = match attributes.remove(collection.partition_key()) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let metadata = match attributes.remove(SORT_KEY) {
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => None,
        };

        let raw = match attributes.remove(DATA_FIELD) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(serde_json::to_string(&other)?),
        };

        Ok(Self {
            collection,
            id,
            metadata,
            raw,
            parsed: None,
            attributes,
        })
    }

    /// Convert back to the wire item shape
    pub fn to_item(&self) -> Value {
        let mut item = self.attributes.clone();
        item.insert(self.collection.partition_key().to_string(), Value::String(self.id.clone()));
        if let Some(metadata) = &self.metadata {
            item.insert(SORT_KEY.to_string(), Value::String(metadata.clone()));
        }
        if let Some(raw) = &self.raw {
            item.insert(DATA_FIELD.to_string(), Value::String(raw.clone()));
        }
        Value::Object(item)
    }

    /// Display name from the decoded payload
    pub fn name(&self) -> Option<&str> {
        self.parsed.as_ref().and_then(|p| p.name())
    }

    /// Normalized traits, empty when undecoded or not a champion
    pub fn traits(&self) -> &[String] {
        self.parsed.as_ref().map(|p| p.traits()).unwrap_or(&[])
    }
}
