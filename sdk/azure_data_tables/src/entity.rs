//! Schema-less table entities.
//!
//! An [`Entity`] is identified by its `PartitionKey` and `RowKey` and carries an
//! open set of typed properties. Property values are [`EdmValue`]s, one variant
//! per scalar type the Table service stores.
//!
//! ```rust
//! use azure_data_tables::entity::{EdmValue, Entity};
//!
//! let entity = Entity::new("markers", "crayola")
//!     .with("Color", "red")
//!     .with("Count", 12)
//!     .with("Price", 3.5);
//!
//! assert_eq!(entity.partition_key(), "markers");
//! assert_eq!(entity.get("Count"), Some(&EdmValue::Int32(12)));
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Name of the partition key property on the wire.
pub const PARTITION_KEY: &str = "PartitionKey";

/// Name of the row key property on the wire.
pub const ROW_KEY: &str = "RowKey";

/// Name of the server-maintained last-modified property.
pub const TIMESTAMP: &str = "Timestamp";

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

/// A typed entity property value.
#[derive(Debug, Clone, PartialEq)]
pub enum EdmValue {
    /// `Edm.String`
    String(String),
    /// `Edm.Int32`
    Int32(i32),
    /// `Edm.Int64`, sent as a decimal string.
    Int64(i64),
    /// `Edm.Double`
    Double(f64),
    /// `Edm.Boolean`
    Boolean(bool),
    /// `Edm.DateTime`, always UTC.
    DateTime(DateTime<Utc>),
    /// `Edm.Binary`, sent base64-encoded.
    Binary(Vec<u8>),
    /// `Edm.Guid`
    Guid(Uuid),
}

impl EdmValue {
    /// The `@odata.type` annotation this value needs on the wire, if any.
    ///
    /// Strings, booleans and 32-bit integers are inferred by the service from
    /// their JSON form and go unannotated.
    pub fn edm_type(&self) -> Option<&'static str> {
        match self {
            Self::String(_) | Self::Int32(_) | Self::Boolean(_) => None,
            Self::Int64(_) => Some("Edm.Int64"),
            Self::Double(_) => Some("Edm.Double"),
            Self::DateTime(_) => Some("Edm.DateTime"),
            Self::Binary(_) => Some("Edm.Binary"),
            Self::Guid(_) => Some("Edm.Guid"),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, widening `Int32`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<&Uuid> {
        match self {
            Self::Guid(v) => Some(v),
            _ => None,
        }
    }
}

/// Text form of the value, as it appears in a JSON payload.
impl fmt::Display for EdmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) if v.is_nan() => f.write_str("NaN"),
            Self::Double(v) if v.is_infinite() && *v > 0.0 => f.write_str("Infinity"),
            Self::Double(v) if v.is_infinite() => f.write_str("-Infinity"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::DateTime(v) => f.write_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Binary(v) => f.write_str(&STANDARD.encode(v)),
            Self::Guid(v) => write!(f, "{}", v.hyphenated()),
        }
    }
}

impl From<String> for EdmValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for EdmValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i32> for EdmValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for EdmValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for EdmValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for EdmValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<DateTime<Utc>> for EdmValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Vec<u8>> for EdmValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<Uuid> for EdmValue {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A table entity: partition key, row key, optional ETag, and typed properties.
///
/// The keys live in dedicated fields and are the only source of the
/// `PartitionKey` and `RowKey` wire properties. Inserting a property with one
/// of those names rewrites the corresponding key instead of adding a second copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    partition_key: String,
    row_key: String,
    etag: Option<String>,
    properties: BTreeMap<String, EdmValue>,
}

impl Entity {
    /// Create an entity with no properties and no ETag.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            etag: None,
            properties: BTreeMap::new(),
        }
    }

    /// Create an entity from existing properties.
    ///
    /// `PartitionKey` and `RowKey` entries in `properties` override the given keys.
    pub fn with_properties(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        properties: impl IntoIterator<Item = (String, EdmValue)>,
    ) -> Self {
        let mut entity = Self::new(partition_key, row_key);
        for (name, value) in properties {
            entity.insert(name, value);
        }
        entity
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    /// The version token assigned by the service, if the entity was read or written.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Attach an ETag, for example one kept from an earlier read.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub(crate) fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<EdmValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a property, returning the previous value.
    ///
    /// `PartitionKey` and `RowKey` set the key from the value's text form.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<EdmValue>) -> Option<EdmValue> {
        let name = name.into();
        let value = value.into();
        let key = match name.as_str() {
            PARTITION_KEY => &mut self.partition_key,
            ROW_KEY => &mut self.row_key,
            _ => return self.properties.insert(name, value),
        };
        let previous = std::mem::replace(key, value.to_string());
        Some(EdmValue::String(previous))
    }

    /// A property value. Keys are read with [`partition_key`](Self::partition_key)
    /// and [`row_key`](Self::row_key), not through this map.
    pub fn get(&self, name: &str) -> Option<&EdmValue> {
        self.properties.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<EdmValue> {
        self.properties.remove(name)
    }

    /// Properties other than the keys, in name order.
    pub fn properties(&self) -> &BTreeMap<String, EdmValue> {
        &self.properties
    }

    /// The server's last-modified time, present on entities read from the service.
    pub fn timestamp(&self) -> Option<&DateTime<Utc>> {
        self.get(TIMESTAMP).and_then(EdmValue::as_datetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_entity_has_keys_and_no_etag() {
        let entity = Entity::new("pk", "rk");
        assert_eq!(entity.partition_key(), "pk");
        assert_eq!(entity.row_key(), "rk");
        assert!(entity.etag().is_none());
        assert!(entity.properties().is_empty());
    }

    #[test]
    fn inserting_key_names_rewrites_typed_keys() {
        let mut entity = Entity::new("pk", "rk");

        let previous = entity.insert(PARTITION_KEY, "other");
        assert_eq!(previous, Some(EdmValue::String("pk".into())));
        assert_eq!(entity.partition_key(), "other");
        assert!(entity.get(PARTITION_KEY).is_none());

        entity.insert(ROW_KEY, 7);
        assert_eq!(entity.row_key(), "7");
        assert!(entity.properties().is_empty());
    }

    #[test]
    fn with_properties_honors_key_overrides() {
        let entity = Entity::with_properties(
            "pk",
            "rk",
            vec![
                ("RowKey".to_string(), EdmValue::from("rk2")),
                ("a".to_string(), EdmValue::from("1")),
            ],
        );
        assert_eq!(entity.row_key(), "rk2");
        assert_eq!(entity.get("a").and_then(EdmValue::as_str), Some("1"));
        assert_eq!(entity.properties().len(), 1);
    }

    #[test]
    fn edm_type_annotations() {
        assert_eq!(EdmValue::from("x").edm_type(), None);
        assert_eq!(EdmValue::from(1).edm_type(), None);
        assert_eq!(EdmValue::from(true).edm_type(), None);
        assert_eq!(EdmValue::from(1_i64).edm_type(), Some("Edm.Int64"));
        assert_eq!(EdmValue::from(1.5).edm_type(), Some("Edm.Double"));
        assert_eq!(EdmValue::from(vec![1_u8]).edm_type(), Some("Edm.Binary"));
        assert_eq!(EdmValue::from(Uuid::nil()).edm_type(), Some("Edm.Guid"));
    }

    #[test]
    fn display_matches_wire_text() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(EdmValue::from(when).to_string(), "2024-01-02T03:04:05Z");
        assert_eq!(EdmValue::from(vec![1_u8, 2, 3]).to_string(), "AQID");
        assert_eq!(EdmValue::from(f64::NAN).to_string(), "NaN");
        assert_eq!(EdmValue::from(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(EdmValue::from(i64::MAX).to_string(), "9223372036854775807");
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(EdmValue::from(5).as_i64(), Some(5));
        assert_eq!(EdmValue::from(5).as_f64(), None);
        assert_eq!(EdmValue::from("s").as_bool(), None);
        assert_eq!(EdmValue::from(false).as_bool(), Some(false));
    }

    #[test]
    fn timestamp_reads_server_property() {
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entity = Entity::new("pk", "rk").with(TIMESTAMP, when);
        assert_eq!(entity.timestamp(), Some(&when));
    }
}
