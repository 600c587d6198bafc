//! Protocol constants shared across the Azure Data Tables crates.

/// Service version sent in `x-ms-version` unless overridden on the builder.
pub const DEFAULT_API_VERSION: &str = "2019-02-02";

/// OData protocol version sent in `DataServiceVersion`.
pub const DATA_SERVICE_VERSION: &str = "3.0";

/// Header names used by the Table service protocol.
pub mod headers {
    pub const X_MS_VERSION: &str = "x-ms-version";
    pub const X_MS_DATE: &str = "x-ms-date";
    pub const X_MS_CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
    pub const DATA_SERVICE_VERSION: &str = "DataServiceVersion";
    pub const IF_MATCH: &str = "If-Match";
    pub const ETAG: &str = "ETag";
    pub const PREFER: &str = "Prefer";
    pub const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
    pub const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";
    pub const NEXT_TABLE_NAME: &str = "x-ms-continuation-NextTableName";
}

/// OData metadata levels accepted by the Table service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataLevel {
    /// `odata.metadata` only.
    Minimal,
    /// Type annotations, ETag, and edit links.
    Full,
    /// No metadata at all.
    None,
}

impl MetadataLevel {
    /// The `Accept` header value for this metadata level.
    pub fn accept(self) -> &'static str {
        match self {
            Self::Minimal => "application/json;odata=minimalmetadata",
            Self::Full => "application/json;odata=fullmetadata",
            Self::None => "application/json;odata=nometadata",
        }
    }
}
