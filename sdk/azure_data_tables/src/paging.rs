//! Continuation-token paging for entity and table listings.
//!
//! Every listing is built from a single-page call ([`entities_page`],
//! [`tables_page`]) that takes the position to resume from and returns the
//! next one. [`entity_pages`] and [`table_pages`] chain those calls into a
//! stream, fetching page N+1 only after page N has arrived; [`entities`] and
//! [`tables`] flatten the pages into items.
//!
//! Tokens are structured values. Their `Display`/`FromStr` forms exist only
//! for handing a position across a process or API boundary.
//!
//! ```rust,no_run
//! use azure_data_tables::models::QueryParams;
//! use azure_data_tables::paging;
//! use azure_data_tables_core::client::TablesPipeline;
//! use futures::TryStreamExt;
//!
//! # async fn example(pipeline: TablesPipeline) -> azure_data_tables_core::TablesResult<()> {
//! let query = QueryParams::new().filter("PartitionKey eq 'markers'");
//! let all: Vec<_> = paging::entities(pipeline, "supplies".into(), query, None)
//!     .try_collect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use azure_data_tables_core::client::{TablesPipeline, TablesRequest};
use azure_data_tables_core::error::{TablesError, TablesResult};
use azure_data_tables_core::models::{headers, MetadataLevel};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::classify::{classify, Target};
use crate::codec;
use crate::entity::Entity;
use crate::models::{ListResponse, QueryParams, Table, TABLES_PATH};

const TOKEN_DELIMITER: char = ';';

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Position of the next entity page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

impl EntityContinuationToken {
    /// Read the token from listing response headers.
    ///
    /// `None` when either header is missing: the listing is exhausted.
    pub fn from_headers(response_headers: &HeaderMap) -> Option<Self> {
        Some(Self {
            next_partition_key: header_value(response_headers, headers::NEXT_PARTITION_KEY)?,
            next_row_key: header_value(response_headers, headers::NEXT_ROW_KEY)?,
        })
    }
}

impl fmt::Display for EntityContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TOKEN_DELIMITER}{}",
            self.next_partition_key, self.next_row_key
        )
    }
}

impl FromStr for EntityContinuationToken {
    type Err = TablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, TOKEN_DELIMITER);
        match (parts.next(), parts.next()) {
            (Some(pk), Some(rk)) if !pk.is_empty() && !rk.is_empty() => Ok(Self {
                next_partition_key: pk.to_string(),
                next_row_key: rk.to_string(),
            }),
            _ => Err(TablesError::InvalidContinuationToken(format!(
                "expected '<next partition key>{TOKEN_DELIMITER}<next row key>', got '{s}'"
            ))),
        }
    }
}

/// Position of the next table page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContinuationToken {
    pub next_table_name: String,
}

impl TableContinuationToken {
    /// Read the token from listing response headers. `None` when exhausted.
    pub fn from_headers(response_headers: &HeaderMap) -> Option<Self> {
        Some(Self {
            next_table_name: header_value(response_headers, headers::NEXT_TABLE_NAME)?,
        })
    }
}

impl fmt::Display for TableContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.next_table_name)
    }
}

impl FromStr for TableContinuationToken {
    type Err = TablesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TablesError::InvalidContinuationToken(
                "table continuation token is empty".into(),
            ));
        }
        Ok(Self {
            next_table_name: s.to_string(),
        })
    }
}

fn header_value(response_headers: &HeaderMap, name: &str) -> Option<String> {
    response_headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// One page of a listing and the position of the next one.
#[derive(Debug, Clone)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    /// `None` on the last page.
    pub continuation: Option<C>,
}

pub type EntityPage = Page<Entity, EntityContinuationToken>;
pub type TablePage = Page<Table, TableContinuationToken>;

/// Fetch one page of entities from `table`.
///
/// Passing `None` as `token` starts from the beginning.
///
/// # Tracing
///
/// Emits a span named `tables::entities::list_page` with field `table`.
#[tracing::instrument(
    name = "tables::entities::list_page",
    skip(pipeline, query, token),
    fields(table = %table)
)]
pub async fn entities_page(
    pipeline: &TablesPipeline,
    table: &str,
    query: &QueryParams,
    token: Option<&EntityContinuationToken>,
    timeout: Option<Duration>,
) -> TablesResult<EntityPage> {
    let mut request = TablesRequest::get(format!("{table}()"))
        .accept(MetadataLevel::Full)
        .timeout(timeout);
    for (key, value) in query.query_pairs() {
        request = request.query(key, value);
    }
    if let Some(token) = token {
        tracing::trace!(%token, "resuming entity listing");
        request = request
            .query("NextPartitionKey", token.next_partition_key.clone())
            .query("NextRowKey", token.next_row_key.clone());
    }

    let response = pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Table))?;
    let continuation = EntityContinuationToken::from_headers(response.headers());
    let body = response.json::<ListResponse<Map<String, Value>>>().await?;

    let items = body
        .value
        .into_iter()
        .map(|map| codec::from_wire_properties(map, None))
        .collect::<TablesResult<Vec<_>>>()?;

    tracing::debug!(
        count = items.len(),
        has_more = continuation.is_some(),
        "entity page received"
    );
    Ok(Page {
        items,
        continuation,
    })
}

/// Fetch one page of tables.
///
/// # Tracing
///
/// Emits a span named `tables::tables::list_page`.
#[tracing::instrument(name = "tables::tables::list_page", skip(pipeline, query, token))]
pub async fn tables_page(
    pipeline: &TablesPipeline,
    query: &QueryParams,
    token: Option<&TableContinuationToken>,
    timeout: Option<Duration>,
) -> TablesResult<TablePage> {
    let mut request = TablesRequest::get(TABLES_PATH)
        .accept(MetadataLevel::Minimal)
        .timeout(timeout);
    for (key, value) in query.query_pairs() {
        request = request.query(key, value);
    }
    if let Some(token) = token {
        tracing::trace!(%token, "resuming table listing");
        request = request.query("NextTableName", token.next_table_name.clone());
    }

    let response = pipeline
        .send(&request)
        .await
        .map_err(|e| classify(e, Target::Table))?;
    let continuation = TableContinuationToken::from_headers(response.headers());
    let body = response.json::<ListResponse<Table>>().await?;

    tracing::debug!(
        count = body.value.len(),
        has_more = continuation.is_some(),
        "table page received"
    );
    Ok(Page {
        items: body.value,
        continuation,
    })
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

enum Cursor<C> {
    Start,
    Next(C),
    Done,
}

struct Listing<C> {
    pipeline: TablesPipeline,
    query: QueryParams,
    timeout: Option<Duration>,
    cursor: Cursor<C>,
}

impl<C> Listing<C> {
    fn new(
        pipeline: TablesPipeline,
        query: QueryParams,
        token: Option<C>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            pipeline,
            query,
            timeout,
            cursor: token.map_or(Cursor::Start, Cursor::Next),
        }
    }

    /// The token to request next, or `None` once the last page was seen.
    fn take_position(&mut self) -> Option<Option<C>> {
        match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start => Some(None),
            Cursor::Next(token) => Some(Some(token)),
            Cursor::Done => None,
        }
    }

    fn advance(&mut self, continuation: Option<C>) {
        self.cursor = continuation.map_or(Cursor::Done, Cursor::Next);
    }
}

/// Stream entity pages from `table`, starting at `token` (or the beginning).
///
/// The stream ends after the page without a continuation token, or after
/// the first error.
pub fn entity_pages(
    pipeline: TablesPipeline,
    table: String,
    query: QueryParams,
    token: Option<EntityContinuationToken>,
    timeout: Option<Duration>,
) -> BoxStream<'static, TablesResult<EntityPage>> {
    let listing = Listing::new(pipeline, query, token, timeout);
    stream::try_unfold((listing, table), |(mut listing, table)| async move {
        let Some(position) = listing.take_position() else {
            return Ok::<_, TablesError>(None);
        };
        let page = entities_page(
            &listing.pipeline,
            &table,
            &listing.query,
            position.as_ref(),
            listing.timeout,
        )
        .await?;
        listing.advance(page.continuation.clone());
        Ok(Some((page, (listing, table))))
    })
    .boxed()
}

/// Stream table pages, starting at `token` (or the beginning).
pub fn table_pages(
    pipeline: TablesPipeline,
    query: QueryParams,
    token: Option<TableContinuationToken>,
    timeout: Option<Duration>,
) -> BoxStream<'static, TablesResult<TablePage>> {
    let listing = Listing::new(pipeline, query, token, timeout);
    stream::try_unfold(listing, |mut listing| async move {
        let Some(position) = listing.take_position() else {
            return Ok::<_, TablesError>(None);
        };
        let page = tables_page(
            &listing.pipeline,
            &listing.query,
            position.as_ref(),
            listing.timeout,
        )
        .await?;
        listing.advance(page.continuation.clone());
        Ok(Some((page, listing)))
    })
    .boxed()
}

/// Stream every entity in `table` matching `query`, across all pages.
pub fn entities(
    pipeline: TablesPipeline,
    table: String,
    query: QueryParams,
    timeout: Option<Duration>,
) -> BoxStream<'static, TablesResult<Entity>> {
    flatten(entity_pages(pipeline, table, query, None, timeout))
}

/// Stream every table matching `query`, across all pages.
pub fn tables(
    pipeline: TablesPipeline,
    query: QueryParams,
    timeout: Option<Duration>,
) -> BoxStream<'static, TablesResult<Table>> {
    flatten(table_pages(pipeline, query, None, timeout))
}

fn flatten<T, C>(
    pages: BoxStream<'static, TablesResult<Page<T, C>>>,
) -> BoxStream<'static, TablesResult<T>>
where
    T: Send + 'static,
    C: Send + 'static,
{
    pages
        .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<T, TablesError>)))
        .try_flatten()
        .boxed()
}
