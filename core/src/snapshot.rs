use serde::{de::DeserializeOwned, Serialize};

/// Canonical structural form of a value, used for change detection.
///
/// Two values are equal snapshots when they serialize to the same JSON tree,
/// regardless of identity or of field order in maps. A freshly constructed but
/// identical draft therefore compares equal to the last saved one.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(serde_json::Value);

impl Snapshot {
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> { Ok(Self(serde_json::to_value(value)?)) }

    /// Parse a snapshot from its stored JSON text
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> { Ok(Self(serde_json::from_str(json)?)) }

    pub fn restore<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> { T::deserialize(&self.0) }
}
