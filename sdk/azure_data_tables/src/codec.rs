//! Mapping between [`Entity`] values and OData JSON property maps.
//!
//! Outgoing entities become a flat JSON object with `PartitionKey`, `RowKey`,
//! and one member per property, plus a `<name>@odata.type` annotation for
//! types JSON cannot carry unambiguously. Incoming objects have their OData
//! metadata stripped; keys come from the dedicated columns or, failing that,
//! from `odata.editLink`.

use azure_data_tables_core::client::decode_component;
use azure_data_tables_core::error::{TablesError, TablesResult};
use azure_data_tables_core::models::headers;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::entity::{EdmValue, Entity, PARTITION_KEY, ROW_KEY, TIMESTAMP};

const ODATA_TYPE_SUFFIX: &str = "@odata.type";
const ODATA_ETAG: &str = "odata.etag";
const ODATA_EDIT_LINK: &str = "odata.editLink";

/// Encode an entity as a wire property map.
///
/// The map always carries `PartitionKey` and `RowKey` taken from the typed
/// keys. The ETag is never included; it travels in the `If-Match` header.
/// Neither is `Timestamp`, which only the service sets.
pub fn to_wire_properties(entity: &Entity) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        PARTITION_KEY.to_string(),
        Value::String(entity.partition_key().to_string()),
    );
    map.insert(
        ROW_KEY.to_string(),
        Value::String(entity.row_key().to_string()),
    );

    for (name, value) in entity.properties() {
        // Server-maintained; never written back.
        if name == TIMESTAMP {
            continue;
        }
        if let Some(edm_type) = value.edm_type() {
            map.insert(
                format!("{name}{ODATA_TYPE_SUFFIX}"),
                Value::String(edm_type.to_string()),
            );
        }
        map.insert(name.clone(), encode_value(value));
    }

    map
}

fn encode_value(value: &EdmValue) -> Value {
    match value {
        EdmValue::String(s) => Value::String(s.clone()),
        EdmValue::Int32(v) => Value::from(*v),
        EdmValue::Boolean(v) => Value::Bool(*v),
        EdmValue::Double(v) => match Number::from_f64(*v) {
            Some(number) => Value::Number(number),
            // NaN and the infinities travel as text.
            None => Value::String(value.to_string()),
        },
        EdmValue::DateTime(v) => Value::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        EdmValue::Int64(_) | EdmValue::Binary(_) | EdmValue::Guid(_) => {
            Value::String(value.to_string())
        }
    }
}

/// Decode a wire property map into an entity.
///
/// Members whose name contains `odata` are metadata and never become
/// properties. The ETag comes from `odata.etag`, falling back to the `ETag`
/// response header when `response_headers` is given.
///
/// # Errors
///
/// Returns [`TablesError::MalformedResponse`] if the keys can be found
/// neither in `PartitionKey`/`RowKey` nor in `odata.editLink`, or if a
/// property value does not match its declared type.
pub fn from_wire_properties(
    mut map: Map<String, Value>,
    response_headers: Option<&HeaderMap>,
) -> TablesResult<Entity> {
    let etag = map
        .get(ODATA_ETAG)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            response_headers
                .and_then(|h| h.get(headers::ETAG))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    let (partition_key, row_key) = take_keys(&mut map)?;

    let types: HashMap<String, String> = map
        .iter()
        .filter_map(|(name, value)| {
            let property = name.strip_suffix(ODATA_TYPE_SUFFIX)?;
            Some((property.to_string(), value.as_str()?.to_string()))
        })
        .collect();

    let mut entity = Entity::new(partition_key, row_key);
    for (name, value) in map {
        if name.contains("odata") || value.is_null() {
            continue;
        }
        let decoded = decode_value(&name, value, types.get(&name).map(String::as_str))?;
        entity.insert(name, decoded);
    }
    entity.set_etag(etag);

    Ok(entity)
}

fn take_keys(map: &mut Map<String, Value>) -> TablesResult<(String, String)> {
    let columns = (
        map.get(PARTITION_KEY).and_then(Value::as_str).map(str::to_string),
        map.get(ROW_KEY).and_then(Value::as_str).map(str::to_string),
    );
    map.remove(PARTITION_KEY);
    map.remove(ROW_KEY);

    if let (Some(partition_key), Some(row_key)) = columns {
        return Ok((partition_key, row_key));
    }

    map.get(ODATA_EDIT_LINK)
        .and_then(Value::as_str)
        .and_then(parse_edit_link)
        .ok_or_else(|| {
            TablesError::MalformedResponse(
                "entity has neither PartitionKey/RowKey nor a parseable odata.editLink".into(),
            )
        })
}

/// Extract the keys from an edit link such as
/// `people(PartitionKey='smith',RowKey='o''brien')`.
pub(crate) fn parse_edit_link(link: &str) -> Option<(String, String)> {
    let partition_key = quoted_after(link, "PartitionKey='")?;
    let row_key = quoted_after(link, "RowKey='")?;
    Some((partition_key, row_key))
}

fn quoted_after(link: &str, marker: &str) -> Option<String> {
    let start = link.find(marker)? + marker.len();
    let rest = &link[start..];

    let mut raw = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                raw.push_str("''");
                continue;
            }
            return Some(decode_component(&raw).replace("''", "'"));
        }
        raw.push(c);
    }
    None
}

fn decode_value(name: &str, value: Value, edm_type: Option<&str>) -> TablesResult<EdmValue> {
    let malformed = |expected: &str| {
        TablesError::MalformedResponse(format!("property '{name}' is not a valid {expected}"))
    };

    match edm_type {
        None => match value {
            Value::String(s) => Ok(EdmValue::String(s)),
            Value::Bool(b) => Ok(EdmValue::Boolean(b)),
            Value::Number(n) => Ok(number_value(&n)),
            _ => Err(malformed("scalar")),
        },
        Some("Edm.String") => value
            .as_str()
            .map(|s| EdmValue::String(s.to_string()))
            .ok_or_else(|| malformed("Edm.String")),
        Some("Edm.Boolean") => value
            .as_bool()
            .map(EdmValue::Boolean)
            .ok_or_else(|| malformed("Edm.Boolean")),
        Some("Edm.Int32") => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(EdmValue::Int32)
            .ok_or_else(|| malformed("Edm.Int32")),
        Some("Edm.Int64") => {
            let parsed = match &value {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(EdmValue::Int64)
                .ok_or_else(|| malformed("Edm.Int64"))
        }
        Some("Edm.Double") => {
            let parsed = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => match s.as_str() {
                    "NaN" => Some(f64::NAN),
                    "Infinity" | "INF" => Some(f64::INFINITY),
                    "-Infinity" | "-INF" => Some(f64::NEG_INFINITY),
                    other => other.parse().ok(),
                },
                _ => None,
            };
            parsed
                .map(EdmValue::Double)
                .ok_or_else(|| malformed("Edm.Double"))
        }
        Some("Edm.DateTime") => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| EdmValue::DateTime(dt.with_timezone(&Utc)))
            .ok_or_else(|| malformed("Edm.DateTime")),
        Some("Edm.Binary") => value
            .as_str()
            .and_then(|s| STANDARD.decode(s).ok())
            .map(EdmValue::Binary)
            .ok_or_else(|| malformed("Edm.Binary")),
        Some("Edm.Guid") => value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(EdmValue::Guid)
            .ok_or_else(|| malformed("Edm.Guid")),
        Some(other) => Err(TablesError::MalformedResponse(format!(
            "property '{name}' has unsupported type '{other}'"
        ))),
    }
}

/// Untyped JSON numbers: integers that fit 32 bits are `Int32`, wider ones `Int64`.
fn number_value(n: &Number) -> EdmValue {
    if let Some(v) = n.as_i64() {
        return match i32::try_from(v) {
            Ok(small) => EdmValue::Int32(small),
            Err(_) => EdmValue::Int64(v),
        };
    }
    EdmValue::Double(n.as_f64().unwrap_or(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn to_wire_always_carries_keys_and_never_etag() {
        let entity = Entity::new("markers", "crayola")
            .with("Color", "red")
            .with_etag("W/\"1\"");

        let wire = to_wire_properties(&entity);

        assert_eq!(
            Value::Object(wire),
            json!({"PartitionKey": "markers", "RowKey": "crayola", "Color": "red"})
        );
    }

    #[test]
    fn to_wire_skips_server_timestamp() {
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entity = Entity::new("p", "r").with(TIMESTAMP, when).with("Color", "red");

        let wire = to_wire_properties(&entity);

        assert!(!wire.contains_key("Timestamp"));
        assert!(!wire.contains_key("Timestamp@odata.type"));
        assert_eq!(wire["Color"], json!("red"));
    }

    #[test]
    fn to_wire_annotates_types() {
        let when = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let id = uuid::Uuid::parse_str("936da01f-9abd-4d9d-80c7-02af85c822a8").unwrap();
        let entity = Entity::new("p", "r")
            .with("Big", 1_i64 << 40)
            .with("Ratio", 0.25)
            .with("When", when)
            .with("Blob", vec![0_u8, 255])
            .with("Id", id)
            .with("Small", 3)
            .with("Flag", true);

        let wire = Value::Object(to_wire_properties(&entity));

        assert_eq!(wire["Big"], json!("1099511627776"));
        assert_eq!(wire["Big@odata.type"], json!("Edm.Int64"));
        assert_eq!(wire["Ratio"], json!(0.25));
        assert_eq!(wire["Ratio@odata.type"], json!("Edm.Double"));
        assert_eq!(wire["When"], json!("2024-05-06T07:08:09Z"));
        assert_eq!(wire["When@odata.type"], json!("Edm.DateTime"));
        assert_eq!(wire["Blob"], json!("AP8="));
        assert_eq!(wire["Blob@odata.type"], json!("Edm.Binary"));
        assert_eq!(wire["Id"], json!("936da01f-9abd-4d9d-80c7-02af85c822a8"));
        assert_eq!(wire["Id@odata.type"], json!("Edm.Guid"));
        assert_eq!(wire["Small"], json!(3));
        assert!(wire.get("Small@odata.type").is_none());
        assert_eq!(wire["Flag"], json!(true));
    }

    #[test]
    fn non_finite_doubles_are_text() {
        let entity = Entity::new("p", "r")
            .with("A", f64::NAN)
            .with("B", f64::INFINITY);
        let wire = Value::Object(to_wire_properties(&entity));
        assert_eq!(wire["A"], json!("NaN"));
        assert_eq!(wire["B"], json!("Infinity"));
        assert_eq!(wire["B@odata.type"], json!("Edm.Double"));

        let back = from_wire_properties(object(wire), None).unwrap();
        assert!(back.get("A").and_then(EdmValue::as_f64).unwrap().is_nan());
        assert_eq!(back.get("B"), Some(&EdmValue::Double(f64::INFINITY)));
    }

    #[test]
    fn wire_round_trip_preserves_keys_and_properties() {
        let when = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let entity = Entity::new("part'ition", "row/key")
            .with("Name", "x")
            .with("Count", -4)
            .with("Total", i64::MIN)
            .with("Price", 9.75)
            .with("Active", false)
            .with("Seen", when)
            .with("Bytes", vec![1_u8, 2, 3])
            .with("Id", uuid::Uuid::nil());

        let back = from_wire_properties(to_wire_properties(&entity), None).unwrap();

        assert_eq!(back.partition_key(), entity.partition_key());
        assert_eq!(back.row_key(), entity.row_key());
        assert_eq!(back.properties(), entity.properties());
    }

    #[test]
    fn from_wire_strips_metadata_and_reads_etag() {
        let wire = object(json!({
            "odata.metadata": "https://acct.table.core.windows.net/$metadata#people/@Element",
            "odata.type": "acct.people",
            "odata.id": "https://acct.table.core.windows.net/people(PartitionKey='p',RowKey='r')",
            "odata.etag": "W/\"datetime'2024-01-01T00%3A00%3A00Z'\"",
            "odata.editLink": "people(PartitionKey='p',RowKey='r')",
            "PartitionKey": "p",
            "RowKey": "r",
            "Timestamp@odata.type": "Edm.DateTime",
            "Timestamp": "2024-01-01T00:00:00.1234567Z",
            "Age": 30
        }));

        let entity = from_wire_properties(wire, None).unwrap();

        assert_eq!(entity.partition_key(), "p");
        assert_eq!(entity.row_key(), "r");
        assert_eq!(
            entity.etag(),
            Some("W/\"datetime'2024-01-01T00%3A00%3A00Z'\"")
        );
        assert_eq!(entity.get("Age"), Some(&EdmValue::Int32(30)));
        assert!(entity.timestamp().is_some());
        assert_eq!(entity.properties().len(), 2);
    }

    #[test]
    fn etag_falls_back_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("W/\"2\""));
        let wire = object(json!({"PartitionKey": "p", "RowKey": "r"}));

        let entity = from_wire_properties(wire, Some(&headers)).unwrap();
        assert_eq!(entity.etag(), Some("W/\"2\""));
    }

    #[test]
    fn body_etag_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("W/\"header\""));
        let wire = object(json!({"PartitionKey": "p", "RowKey": "r", "odata.etag": "W/\"body\""}));

        let entity = from_wire_properties(wire, Some(&headers)).unwrap();
        assert_eq!(entity.etag(), Some("W/\"body\""));
    }

    #[test]
    fn keys_fall_back_to_edit_link() {
        let wire = object(json!({
            "odata.editLink": "people(PartitionKey='smith',RowKey='o''brien%20jr')",
            "Name": "x"
        }));

        let entity = from_wire_properties(wire, None).unwrap();
        assert_eq!(entity.partition_key(), "smith");
        assert_eq!(entity.row_key(), "o'brien jr");
        assert_eq!(entity.properties().len(), 1);
    }

    #[test]
    fn dedicated_columns_win_over_edit_link() {
        let wire = object(json!({
            "odata.editLink": "people(PartitionKey='link',RowKey='link')",
            "PartitionKey": "column",
            "RowKey": "column"
        }));

        let entity = from_wire_properties(wire, None).unwrap();
        assert_eq!(entity.partition_key(), "column");
        assert_eq!(entity.row_key(), "column");
    }

    #[test]
    fn missing_keys_are_malformed() {
        let err = from_wire_properties(object(json!({"Name": "x"})), None).unwrap_err();
        assert!(matches!(err, TablesError::MalformedResponse(_)));

        let err = from_wire_properties(
            object(json!({"odata.editLink": "people()", "PartitionKey": "p"})),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TablesError::MalformedResponse(_)));
    }

    #[test]
    fn mistyped_values_are_malformed() {
        let wire = object(json!({
            "PartitionKey": "p",
            "RowKey": "r",
            "Id": "not-a-guid",
            "Id@odata.type": "Edm.Guid"
        }));
        let err = from_wire_properties(wire, None).unwrap_err();
        assert!(matches!(err, TablesError::MalformedResponse(ref m) if m.contains("Id")));
    }

    #[test]
    fn untyped_numbers_pick_narrowest_type() {
        let wire = object(json!({
            "PartitionKey": "p",
            "RowKey": "r",
            "Small": 7,
            "Wide": 5_000_000_000_i64,
            "Frac": 1.5,
            "Missing": null
        }));

        let entity = from_wire_properties(wire, None).unwrap();
        assert_eq!(entity.get("Small"), Some(&EdmValue::Int32(7)));
        assert_eq!(entity.get("Wide"), Some(&EdmValue::Int64(5_000_000_000)));
        assert_eq!(entity.get("Frac"), Some(&EdmValue::Double(1.5)));
        assert!(entity.get("Missing").is_none());
    }

    #[test]
    fn parse_edit_link_handles_escaped_quotes() {
        assert_eq!(
            parse_edit_link("t(PartitionKey='a''b',RowKey='c')"),
            Some(("a'b".to_string(), "c".to_string()))
        );
        assert_eq!(parse_edit_link("t(PartitionKey='a)"), None);
    }
}
