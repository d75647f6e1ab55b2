use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the unique award identifier in API responses.
pub const AWARD_ID_FIELD: &str = "id";

/// A single award as returned by the awards API.
///
/// The schema belongs to the remote source, so the record is kept as an opaque
/// JSON object. Only the identifier field is interpreted (for dedup).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AwardRecord(Map<String, Value>);

impl AwardRecord {
    /// Builds a record from string pairs. Mostly useful for fixtures.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    /// The award identifier, if the source included one.
    ///
    /// Numeric identifiers are normalised to their decimal text so they compare
    /// equal to the values read back from the CSV output.
    pub fn id(&self) -> Option<String> {
        match self.0.get(AWARD_ID_FIELD)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Renders one field as a CSV cell. Missing and null fields are empty.
    pub fn cell(&self, field: &str) -> String {
        match self.0.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
