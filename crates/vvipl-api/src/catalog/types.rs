//! IPL response types: diagrams, parts, and the merged catalog.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Model identification sent with every catalog request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    /// Manufacturer model number (`modelNumber`).
    pub model_number: String,
    /// Upstream model identifier (`modelId`).
    pub model_id: String,
}

impl ModelRef {
    /// Creates a new model reference.
    #[must_use]
    pub fn new(model_number: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            model_number: model_number.into(),
            model_id: model_id.into(),
        }
    }

    /// Builds the `{modelNumber, modelId}` payload fields.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            String::from("modelNumber"),
            Value::String(self.model_number.clone()),
        );
        fields.insert(
            String::from("modelId"),
            Value::String(self.model_id.clone()),
        );
        fields
    }
}

/// Diagram identifier. Upstream sends either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DiagramId(String);

impl DiagramId {
    /// Creates a diagram ID from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as sent in `diagramId`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DiagramId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

/// One exploded-view diagram of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    /// Diagram identifier.
    #[serde(rename = "diagramId")]
    pub id: DiagramId,
    /// Human-readable section label.
    #[serde(rename = "sectionName", default)]
    pub section_name: Option<String>,
    /// Remaining upstream attributes, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One catalog entry, kept exactly as the upstream record.
///
/// The part number is the key in `PartsCatalog`. The accessors read the
/// known attributes leniently: a value that is missing or cannot be read
/// as the expected type yields `None`, and the record is never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Part {
    fields: Map<String, Value>,
}

impl Part {
    /// Wraps an upstream part record.
    #[must_use]
    pub const fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns the upstream record.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the part and returns the upstream record.
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Returns one raw attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Part description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.text(&["description"])
    }

    /// Dealer price.
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.number(&["price"])
    }

    /// List (retail) price.
    #[must_use]
    pub fn list_price(&self) -> Option<f64> {
        self.number(&["listPrice"])
    }

    /// Quantity in stock (`quantity`, else `qty`).
    #[must_use]
    pub fn quantity(&self) -> Option<f64> {
        self.number(&["quantity", "qty"])
    }

    /// Image URL (`imageUrl`, else `image`).
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.text(&["imageUrl", "image"])
    }

    /// First key holding a non-empty string.
    fn text(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.fields
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
    }

    /// First key holding a readable number.
    fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .find_map(|key| self.fields.get(*key).and_then(parse_number))
    }
}

/// Reads a JSON number or a numeric string such as `"$1,200.50"`.
fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parts of one or more diagrams keyed by part number.
///
/// Keys iterate in sorted order. Merging overwrites existing keys, so the
/// last merged diagram wins on collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartsCatalog {
    parts: BTreeMap<String, Part>,
}

impl PartsCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parts: BTreeMap::new(),
        }
    }

    /// Merges `other` into `self`; entries from `other` replace existing ones.
    ///
    /// Returns the number of part numbers that were overwritten.
    pub fn merge(&mut self, other: Self) -> usize {
        let mut overwritten = 0usize;
        for (number, part) in other.parts {
            if self.parts.insert(number, part).is_some() {
                overwritten = overwritten.saturating_add(1);
            }
        }
        overwritten
    }

    /// Inserts or replaces one part.
    pub fn insert(&mut self, part_number: impl Into<String>, part: Part) -> Option<Part> {
        self.parts.insert(part_number.into(), part)
    }

    /// Looks up a part by number.
    #[must_use]
    pub fn get(&self, part_number: &str) -> Option<&Part> {
        self.parts.get(part_number)
    }

    /// Number of distinct part numbers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the catalog has no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterates `(part number, part)` in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Part> {
        self.parts.iter()
    }
}

impl<'a> IntoIterator for &'a PartsCatalog {
    type Item = (&'a String, &'a Part);
    type IntoIter = btree_map::Iter<'a, String, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl FromIterator<(String, Part)> for PartsCatalog {
    fn from_iter<I: IntoIterator<Item = (String, Part)>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}
