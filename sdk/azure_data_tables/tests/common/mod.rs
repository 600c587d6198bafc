//! An in-memory Table service served through wiremock.
//!
//! Implements enough of the protocol to exercise the clients end to end:
//! table create/delete/list, entity insert/get/merge/replace/delete with
//! `If-Match` conditions, and paged entity queries with continuation headers.

#![allow(dead_code)]

use azure_data_tables::client::TableServiceClient;
use azure_data_tables_core::client::{decode_component, encode_component};
use azure_data_tables_core::test_support::mock_pipeline;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

type Key = (String, String);

struct StoredEntity {
    properties: Map<String, Value>,
    version: u64,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, BTreeMap<Key, StoredEntity>>,
    next_version: u64,
}

/// Stateful fake of the Table service.
#[derive(Clone, Default)]
pub struct FakeTableService {
    state: Arc<Mutex<State>>,
}

impl FakeTableService {
    /// Start a mock server answering every request from a fresh fake.
    pub async fn start() -> (MockServer, FakeTableService) {
        let server = MockServer::start().await;
        let fake = FakeTableService::default();
        Mock::given(any())
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        (server, fake)
    }

    /// Number of entities currently stored in `table`.
    pub fn entity_count(&self, table: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }
}

/// A service client pointed at `server`.
pub fn service_client(server: &MockServer) -> TableServiceClient {
    TableServiceClient::new(mock_pipeline(server))
}

fn etag(version: u64) -> String {
    format!("W/\"{version}\"")
}

fn error(status: u16, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "odata.error": {
            "code": code,
            "message": {"lang": "en-US", "value": format!("{code} (fake)")}
        }
    }))
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

fn query_param(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn body(request: &Request) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(&request.body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Where a request is addressed.
enum Resource {
    Tables,
    Table(String),
    Entities(String),
    Entity(String, Key),
}

fn unquote(key: &str) -> String {
    decode_component(key).replace("''", "'")
}

fn resource(request: &Request) -> Option<Resource> {
    let path = request.url.path().trim_start_matches('/');
    if path == "Tables" {
        return Some(Resource::Tables);
    }
    if let Some(rest) = path.strip_prefix("Tables('") {
        return Some(Resource::Table(rest.strip_suffix("')")?.to_string()));
    }

    let (table, rest) = path.split_once('(')?;
    let inner = rest.strip_suffix(')')?;
    if inner.is_empty() {
        return Some(Resource::Entities(table.to_string()));
    }
    let (pk, rk) = inner
        .strip_prefix("PartitionKey='")?
        .strip_suffix('\'')?
        .split_once("',RowKey='")?;
    Some(Resource::Entity(table.to_string(), (unquote(pk), unquote(rk))))
}

fn quote(key: &str) -> String {
    encode_component(&key.replace('\'', "''"))
}

/// Full-metadata wire form: the stored properties plus ETag and edit link.
fn wire_entity(table: &str, key: &Key, entity: &StoredEntity) -> Value {
    let mut map = entity.properties.clone();
    map.insert("odata.etag".to_string(), json!(etag(entity.version)));
    map.insert(
        "odata.editLink".to_string(),
        json!(format!(
            "{table}(PartitionKey='{}',RowKey='{}')",
            quote(&key.0),
            quote(&key.1)
        )),
    );
    Value::Object(map)
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn stamp(&mut self, properties: &mut Map<String, Value>) -> u64 {
        properties.insert(
            "Timestamp".to_string(),
            json!(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );
        properties.insert("Timestamp@odata.type".to_string(), json!("Edm.DateTime"));
        self.bump()
    }

    fn create_table(&mut self, request: &Request) -> ResponseTemplate {
        let name = match body(request).get("TableName").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => return error(400, "InvalidInput"),
        };
        if self.tables.contains_key(&name) {
            return error(409, "TableAlreadyExists");
        }
        self.tables.insert(name.clone(), BTreeMap::new());
        if header(request, "prefer") == Some("return-no-content") {
            ResponseTemplate::new(204)
        } else {
            ResponseTemplate::new(201).set_body_json(json!({ "TableName": name }))
        }
    }

    fn list_tables(&self, request: &Request) -> ResponseTemplate {
        let top = query_param(request, "$top")
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(1000);
        let start = query_param(request, "NextTableName").unwrap_or_default();

        let mut names = self.tables.keys().filter(|n| n.as_str() >= start.as_str());
        let page: Vec<Value> = names
            .by_ref()
            .take(top)
            .map(|n| json!({ "TableName": n }))
            .collect();

        let mut response = ResponseTemplate::new(200);
        if let Some(next) = names.next() {
            response = response.insert_header("x-ms-continuation-NextTableName", next.as_str());
        }
        response.set_body_json(json!({ "value": page }))
    }

    fn insert(&mut self, table: &str, request: &Request) -> ResponseTemplate {
        let mut properties = body(request);
        let key = match (
            properties.get("PartitionKey").and_then(Value::as_str),
            properties.get("RowKey").and_then(Value::as_str),
        ) {
            (Some(pk), Some(rk)) => (pk.to_string(), rk.to_string()),
            _ => return error(400, "PropertiesNeedValue"),
        };
        if !self.tables.contains_key(table) {
            return error(404, "TableNotFound");
        }
        if self.tables[table].contains_key(&key) {
            return error(409, "EntityAlreadyExists");
        }

        let version = self.stamp(&mut properties);
        let stored = StoredEntity {
            properties,
            version,
        };
        let echo = wire_entity(table, &key, &stored);
        if let Some(entities) = self.tables.get_mut(table) {
            entities.insert(key, stored);
        }

        if header(request, "prefer") == Some("return-no-content") {
            ResponseTemplate::new(204).insert_header("ETag", etag(version).as_str())
        } else {
            ResponseTemplate::new(201)
                .insert_header("ETag", etag(version).as_str())
                .set_body_json(echo)
        }
    }

    fn get(&self, table: &str, key: &Key, request: &Request) -> ResponseTemplate {
        let Some(entities) = self.tables.get(table) else {
            return error(404, "TableNotFound");
        };
        let Some(entity) = entities.get(key) else {
            return error(404, "ResourceNotFound");
        };

        let mut wire = wire_entity(table, key, entity);
        if let (Some(select), Value::Object(map)) = (query_param(request, "$select"), &mut wire) {
            let keep: Vec<&str> = select.split(',').collect();
            map.retain(|k, _| {
                let name = k.split('@').next().unwrap_or(k);
                k.starts_with("odata.") || keep.contains(&name)
            });
        }
        ResponseTemplate::new(200)
            .insert_header("ETag", etag(entity.version).as_str())
            .set_body_json(wire)
    }

    fn write(&mut self, table: &str, key: Key, request: &Request, merge: bool) -> ResponseTemplate {
        let condition = header(request, "if-match").map(str::to_string);
        let Some(entities) = self.tables.get(table) else {
            return error(404, "TableNotFound");
        };

        let existing = entities.get(&key);
        match (&condition, existing) {
            (Some(_), None) => return error(404, "ResourceNotFound"),
            (Some(c), Some(e)) if c != "*" && *c != etag(e.version) => {
                return error(412, "UpdateConditionNotSatisfied");
            }
            _ => {}
        }

        let incoming = body(request);
        let mut properties = match (merge, existing) {
            (true, Some(e)) => {
                let mut merged = e.properties.clone();
                for (name, value) in incoming {
                    if !name.contains('@') {
                        merged.remove(&format!("{name}@odata.type"));
                    }
                    merged.insert(name, value);
                }
                merged
            }
            _ => incoming,
        };
        properties.insert("PartitionKey".to_string(), json!(key.0));
        properties.insert("RowKey".to_string(), json!(key.1));

        let version = self.stamp(&mut properties);
        if let Some(entities) = self.tables.get_mut(table) {
            entities.insert(
                key,
                StoredEntity {
                    properties,
                    version,
                },
            );
        }
        ResponseTemplate::new(204).insert_header("ETag", etag(version).as_str())
    }

    fn delete(&mut self, table: &str, key: &Key, request: &Request) -> ResponseTemplate {
        let Some(entities) = self.tables.get_mut(table) else {
            return error(404, "TableNotFound");
        };
        let Some(entity) = entities.get(key) else {
            return error(404, "ResourceNotFound");
        };
        match header(request, "if-match") {
            Some("*") => {}
            Some(c) if c == etag(entity.version) => {}
            _ => return error(412, "UpdateConditionNotSatisfied"),
        }
        entities.remove(key);
        ResponseTemplate::new(204)
    }

    fn query(&self, table: &str, request: &Request) -> ResponseTemplate {
        let Some(entities) = self.tables.get(table) else {
            return error(404, "TableNotFound");
        };
        let top = query_param(request, "$top")
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(1000);
        let start = (
            query_param(request, "NextPartitionKey").unwrap_or_default(),
            query_param(request, "NextRowKey").unwrap_or_default(),
        );

        let mut remaining = entities.range(start..);
        let page: Vec<Value> = remaining
            .by_ref()
            .take(top)
            .map(|(key, e)| wire_entity(table, key, e))
            .collect();

        let mut response = ResponseTemplate::new(200);
        if let Some(((pk, rk), _)) = remaining.next() {
            response = response
                .insert_header("x-ms-continuation-NextPartitionKey", pk.as_str())
                .insert_header("x-ms-continuation-NextRowKey", rk.as_str());
        }
        response.set_body_json(json!({ "value": page }))
    }
}

impl Respond for FakeTableService {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let method = request.method.as_str();

        match (method, resource(request)) {
            ("POST", Some(Resource::Tables)) => state.create_table(request),
            ("GET", Some(Resource::Tables)) => state.list_tables(request),
            ("DELETE", Some(Resource::Table(name))) => match state.tables.remove(&name) {
                Some(_) => ResponseTemplate::new(204),
                None => error(404, "ResourceNotFound"),
            },
            ("POST", None) => {
                let table = request.url.path().trim_start_matches('/').to_string();
                state.insert(&table, request)
            }
            ("GET", Some(Resource::Entities(table))) => state.query(&table, request),
            ("GET", Some(Resource::Entity(table, key))) => state.get(&table, &key, request),
            ("MERGE", Some(Resource::Entity(table, key))) => {
                state.write(&table, key, request, true)
            }
            ("PUT", Some(Resource::Entity(table, key))) => {
                state.write(&table, key, request, false)
            }
            ("DELETE", Some(Resource::Entity(table, key))) => {
                state.delete(&table, &key, request)
            }
            _ => error(400, "InvalidUri"),
        }
    }
}
