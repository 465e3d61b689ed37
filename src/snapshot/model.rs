//! Typed snapshot records and payload parsing.
//!
//! A snapshot source prints one JSON document. The item list lives under
//! `games`, `modes` or `items`; everything else is optional metadata.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::MarkerMatch;
use crate::core::errors::FetchError;

/// Keys accepted for the item list, checked in order.
const ITEM_KEYS: [&str; 3] = ["items", "games", "modes"];

const UNKNOWN_NAME: &str = "Unknown";

// ──────────────────── records ────────────────────

/// One selectable entry. Immutable once produced by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Opaque command handed to the action dispatcher. Empty = not launchable.
    pub command: String,
    pub category: Option<String>,
    pub favorite: bool,
    /// Unix seconds of the last use, when the source knows it.
    pub last_played: Option<i64>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
}

impl Item {
    /// Minimal item for tests and synthetic lists.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            command: command.into(),
            category: None,
            favorite: false,
            last_played: None,
            description: None,
            image: None,
            icon: None,
        }
    }

    #[must_use]
    pub fn is_launchable(&self) -> bool {
        !self.command.trim().is_empty()
    }

    /// The token a persisted marker is compared against under `rule`.
    #[must_use]
    pub fn marker_token(&self, rule: MarkerMatch) -> &str {
        match rule {
            MarkerMatch::TrailingToken => self.command.split_whitespace().last().unwrap_or(""),
            MarkerMatch::Exact => self.command.trim(),
            MarkerMatch::Name => &self.name,
            MarkerMatch::Id => &self.id,
        }
    }

    /// Whether `marker` (already trimmed) selects this item under `rule`.
    #[must_use]
    pub fn matches_marker(&self, marker: &str, rule: MarkerMatch) -> bool {
        !marker.is_empty() && self.marker_token(rule) == marker
    }
}

/// Items plus auxiliary metadata, produced atomically by one fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub items: Vec<Item>,
    pub colors: BTreeMap<String, String>,
    /// Numeric setting reported by the source (RGB brightness).
    pub brightness: Option<i64>,
    /// Opaque configuration block, passed through untouched.
    pub config: Value,
}

impl Snapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ──────────────────── wire format ────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawItem {
    id: Option<String>,
    appid: Option<Value>,
    name: Option<String>,
    title: Option<String>,
    exec: Option<String>,
    command: Option<String>,
    category: Option<String>,
    favorite: Option<bool>,
    last_played: Option<i64>,
    description: Option<String>,
    image: Option<String>,
    icon: Option<String>,
}

impl RawItem {
    fn into_item(self) -> Item {
        let name = self
            .name
            .or(self.title)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| self.appid.as_ref().and_then(scalar_to_string))
            .unwrap_or_else(|| name.clone());
        Item {
            id,
            name,
            command: self.exec.or(self.command).unwrap_or_default(),
            category: self.category,
            favorite: self.favorite.unwrap_or(false),
            last_played: self.last_played.filter(|ts| *ts > 0),
            description: self.description,
            image: self.image.filter(|s| !s.is_empty()),
            icon: self.icon.filter(|s| !s.is_empty()),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one complete snapshot document.
///
/// Any deviation from the schema yields [`FetchError::MalformedPayload`];
/// this never panics on arbitrary bytes.
pub fn parse_payload(bytes: &[u8]) -> Result<Snapshot, FetchError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchError::malformed("empty output"));
    }

    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| FetchError::malformed(e.to_string()))?;
    let Value::Object(mut root) = root else {
        return Err(FetchError::malformed("document root is not an object"));
    };

    let Some(raw_items) = ITEM_KEYS.iter().find_map(|key| root.remove(*key)) else {
        return Err(FetchError::malformed(format!(
            "no item list (expected one of {})",
            ITEM_KEYS.join(", ")
        )));
    };
    let raw_items: Vec<RawItem> = serde_json::from_value(raw_items)
        .map_err(|e| FetchError::malformed(format!("item list: {e}")))?;

    let colors = match root.remove("colors") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| FetchError::malformed(format!("colors: {e}")))?,
    };
    let brightness = match root.remove("brightness") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| FetchError::malformed("brightness is not an integer"))?,
        ),
    };

    Ok(Snapshot {
        items: raw_items.into_iter().map(RawItem::into_item).collect(),
        colors,
        brightness,
        config: root.remove("config").unwrap_or(Value::Null),
    })
}
