//! Entity reads and writes with ETag-based optimistic concurrency.
//!
//! | Operation | Verb | `If-Match` |
//! |-----------|------|------------|
//! | [`create`] | `POST /{table}` | none |
//! | [`update`] merge | `MERGE /{table}(..)` | ETag, or `*` |
//! | [`update`] replace | `PUT /{table}(..)` | ETag, or `*` |
//! | [`upsert`] merge | `MERGE /{table}(..)` | none (insert-or-merge) |
//! | [`upsert`] replace | `PUT /{table}(..)` | none (insert-or-replace) |
//! | [`delete`] | `DELETE /{table}(..)` | ETag, or `*` |
//!
//! With `if_match` set, the entity's ETag must be present and the write only
//! succeeds while the stored entity still carries it. Otherwise the write is
//! unconditional.
//!
//! ## Example
//!
//! ```rust,no_run
//! use azure_data_tables::entity::Entity;
//! use azure_data_tables::models::UpdateMode;
//! use azure_data_tables::write;
//! use azure_data_tables_core::client::TablesPipeline;
//!
//! # async fn example(pipeline: &TablesPipeline) -> azure_data_tables_core::TablesResult<()> {
//! let created = write::create(pipeline, "supplies", &Entity::new("markers", "crayola"), None).await?;
//!
//! let changed = created.clone().with("Color", "blue");
//! write::update(pipeline, "supplies", &changed, UpdateMode::Merge, true, None).await?;
//! # Ok(())
//! # }
//! ```

use azure_data_tables_core::client::{TablesPipeline, TablesRequest};
use azure_data_tables_core::error::{TablesError, TablesResult};
use azure_data_tables_core::models::{headers, MetadataLevel};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::classify::{classify, Target};
use crate::codec;
use crate::entity::Entity;
use crate::models::{entity_path, validate_key, UpdateMode, WriteResponse};

const RETURN_CONTENT: &str = "return-content";

/// Insert a new entity.
///
/// Returns the entity as stored by the service, including its ETag and
/// `Timestamp`.
///
/// # Errors
///
/// [`TablesError::EntityAlreadyExists`] if an entity with the same keys exists.
///
/// # Tracing
///
/// Emits a span named `tables::entities::create` with fields `table`,
/// `partition_key`, and `row_key`.
#[tracing::instrument(
    name = "tables::entities::create",
    skip(pipeline, entity),
    fields(table = %table, partition_key = %entity.partition_key(), row_key = %entity.row_key())
)]
pub async fn create(
    pipeline: &TablesPipeline,
    table: &str,
    entity: &Entity,
    timeout: Option<Duration>,
) -> TablesResult<Entity> {
    validate_keys(entity)?;
    tracing::debug!("creating entity");

    let request = TablesRequest::post(table)
        .accept(MetadataLevel::Full)
        .header(headers::PREFER, RETURN_CONTENT)
        .json(Value::Object(codec::to_wire_properties(entity)))
        .timeout(timeout);
    let response = pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Entity))?;

    let created = if response.status() == StatusCode::NO_CONTENT {
        let mut echoed = entity.clone();
        echoed.set_etag(etag_header(response.headers()));
        echoed
    } else {
        let response_headers = response.headers().clone();
        let body = response.json::<Map<String, Value>>().await?;
        codec::from_wire_properties(body, Some(&response_headers))?
    };

    tracing::debug!(etag = ?created.etag(), "entity created");
    Ok(created)
}

/// Update an existing entity.
///
/// `Merge` keeps stored properties the entity does not carry; `Replace`
/// removes them.
///
/// # Errors
///
/// - [`TablesError::InvalidArgument`] if `if_match` is set and the entity has no ETag
/// - [`TablesError::EntityNotFound`] if the entity does not exist
/// - [`TablesError::PreconditionFailed`] if `if_match` is set and the ETag is stale
///
/// # Tracing
///
/// Emits a span named `tables::entities::update` with fields `table`,
/// `partition_key`, and `row_key`.
#[tracing::instrument(
    name = "tables::entities::update",
    skip(pipeline, entity),
    fields(table = %table, partition_key = %entity.partition_key(), row_key = %entity.row_key())
)]
pub async fn update(
    pipeline: &TablesPipeline,
    table: &str,
    entity: &Entity,
    mode: UpdateMode,
    if_match: bool,
    timeout: Option<Duration>,
) -> TablesResult<WriteResponse> {
    validate_keys(entity)?;
    let condition = match_condition(entity, if_match)?;
    tracing::debug!(?mode, condition, "updating entity");

    let request = write_request(table, entity, mode, timeout).header(headers::IF_MATCH, condition);
    send_write(pipeline, &request).await
}

/// Insert the entity, or update it if it already exists.
///
/// Without `if_match` this is a single atomic insert-or-merge (`Merge`) or
/// insert-or-replace (`Replace`) call. With `if_match`, an entity carrying an
/// ETag is updated only if the ETag is current, and an entity without one is
/// created, failing if it already exists.
///
/// # Tracing
///
/// Emits a span named `tables::entities::upsert` with fields `table`,
/// `partition_key`, and `row_key`.
#[tracing::instrument(
    name = "tables::entities::upsert",
    skip(pipeline, entity),
    fields(table = %table, partition_key = %entity.partition_key(), row_key = %entity.row_key())
)]
pub async fn upsert(
    pipeline: &TablesPipeline,
    table: &str,
    entity: &Entity,
    mode: UpdateMode,
    if_match: bool,
    timeout: Option<Duration>,
) -> TablesResult<WriteResponse> {
    validate_keys(entity)?;

    match (if_match, entity.etag()) {
        (false, _) => {
            tracing::debug!(?mode, "upserting entity");
            let request = write_request(table, entity, mode, timeout);
            send_write(pipeline, &request).await
        }
        (true, Some(etag)) => {
            tracing::debug!(?mode, "conditionally updating entity");
            let request = write_request(table, entity, mode, timeout).header(headers::IF_MATCH, etag);
            send_write(pipeline, &request).await
        }
        (true, None) => {
            tracing::debug!("entity has no ETag, creating");
            let created = create(pipeline, table, entity, timeout).await?;
            Ok(WriteResponse {
                etag: created.etag().map(str::to_string),
            })
        }
    }
}

/// Delete an entity.
///
/// # Errors
///
/// - [`TablesError::InvalidArgument`] if `if_match` is set and the entity has no ETag
/// - [`TablesError::EntityNotFound`] if the entity does not exist
/// - [`TablesError::PreconditionFailed`] if `if_match` is set and the ETag is stale
///
/// # Tracing
///
/// Emits a span named `tables::entities::delete` with fields `table`,
/// `partition_key`, and `row_key`.
#[tracing::instrument(
    name = "tables::entities::delete",
    skip(pipeline, entity),
    fields(table = %table, partition_key = %entity.partition_key(), row_key = %entity.row_key())
)]
pub async fn delete(
    pipeline: &TablesPipeline,
    table: &str,
    entity: &Entity,
    if_match: bool,
    timeout: Option<Duration>,
) -> TablesResult<()> {
    validate_keys(entity)?;
    let condition = match_condition(entity, if_match)?;
    tracing::debug!(condition, "deleting entity");

    let request = TablesRequest::delete(entity_path(table, entity.partition_key(), entity.row_key()))
        .header(headers::IF_MATCH, condition)
        .timeout(timeout);
    pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Entity))?;

    tracing::debug!("entity deleted");
    Ok(())
}

/// Read a single entity by its keys.
///
/// `select` limits the returned properties; the keys and ETag are always
/// present.
///
/// # Errors
///
/// [`TablesError::EntityNotFound`] if no entity has these keys.
///
/// # Tracing
///
/// Emits a span named `tables::entities::get` with fields `table`,
/// `partition_key`, and `row_key`.
#[tracing::instrument(
    name = "tables::entities::get",
    skip(pipeline, select),
    fields(table = %table, partition_key = %partition_key, row_key = %row_key)
)]
pub async fn get(
    pipeline: &TablesPipeline,
    table: &str,
    partition_key: &str,
    row_key: &str,
    select: Option<&[String]>,
    timeout: Option<Duration>,
) -> TablesResult<Entity> {
    validate_key("PartitionKey", partition_key)?;
    validate_key("RowKey", row_key)?;
    tracing::debug!("getting entity");

    let request = TablesRequest::get(entity_path(table, partition_key, row_key))
        .accept(MetadataLevel::Full)
        .query_opt("$select", select.map(|s| s.join(",")))
        .timeout(timeout);
    let response = pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Entity))?;

    let response_headers = response.headers().clone();
    let body = response.json::<Map<String, Value>>().await?;
    codec::from_wire_properties(body, Some(&response_headers))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_keys(entity: &Entity) -> TablesResult<()> {
    validate_key("PartitionKey", entity.partition_key())?;
    validate_key("RowKey", entity.row_key())
}

/// The `If-Match` value: the entity's ETag when matching, `*` otherwise.
fn match_condition(entity: &Entity, if_match: bool) -> TablesResult<&str> {
    if !if_match {
        return Ok("*");
    }
    entity.etag().ok_or_else(|| {
        TablesError::invalid_argument(
            "if_match requires an entity ETag; read the entity first or pass if_match = false",
        )
    })
}

fn write_request(
    table: &str,
    entity: &Entity,
    mode: UpdateMode,
    timeout: Option<Duration>,
) -> TablesRequest {
    let path = entity_path(table, entity.partition_key(), entity.row_key());
    let request = match mode {
        UpdateMode::Merge => TablesRequest::merge(path),
        UpdateMode::Replace => TablesRequest::put(path),
    };
    request
        .json(Value::Object(codec::to_wire_properties(entity)))
        .timeout(timeout)
}

async fn send_write(pipeline: &TablesPipeline, request: &TablesRequest) -> TablesResult<WriteResponse> {
    let response = pipeline
        .send(request)
        .await
        .map_err(|e| classify(e, Target::Entity))?;

    let etag = etag_header(response.headers());
    tracing::debug!(?etag, "entity written");
    Ok(WriteResponse { etag })
}

fn etag_header(response_headers: &reqwest::header::HeaderMap) -> Option<String> {
    response_headers
        .get(headers::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
