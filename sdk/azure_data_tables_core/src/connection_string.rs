//! Storage connection string parsing.
//!
//! Supports account-key connection strings, explicit `TableEndpoint`
//! strings, SAS connection strings, and `UseDevelopmentStorage=true`
//! (the local Azurite emulator).
//!
//! ```rust
//! use azure_data_tables_core::connection_string::ConnectionString;
//!
//! let cs = ConnectionString::parse(
//!     "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=a2V5;EndpointSuffix=core.windows.net",
//! ).unwrap();
//! assert_eq!(cs.table_endpoint().as_str(), "https://myaccount.table.core.windows.net/");
//! ```

use crate::auth::TablesCredential;
use crate::error::{TablesError, TablesResult};
use secrecy::SecretString;
use url::Url;

/// Account name used by the storage emulator.
pub const DEV_STORE_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known account key of the storage emulator. Not a secret.
pub const DEV_STORE_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Table endpoint of the storage emulator.
pub const DEV_STORE_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEFAULT_PROTOCOL: &str = "https";

/// A parsed storage connection string.
#[derive(Clone)]
pub struct ConnectionString {
    account_name: Option<String>,
    account_key: Option<SecretString>,
    sas: Option<SecretString>,
    table_endpoint: Url,
}

impl ConnectionString {
    /// Parse a `Key=Value;Key=Value` connection string.
    ///
    /// Keys are matched case-insensitively. Empty segments (for example a
    /// trailing `;`) are ignored.
    pub fn parse(connection_string: &str) -> TablesResult<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut sas = None;
        let mut table_endpoint = None;
        let mut protocol = None;
        let mut suffix = None;
        let mut development = false;

        for segment in connection_string.split(';').map(str::trim) {
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                TablesError::InvalidConnectionString(format!(
                    "segment without '=': {}",
                    redact_segment(segment)
                ))
            })?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => account_name = Some(value.to_string()),
                "accountkey" => account_key = Some(SecretString::from(value.to_string())),
                "sharedaccesssignature" => {
                    sas = Some(SecretString::from(value.trim_start_matches('?').to_string()))
                }
                "tableendpoint" => table_endpoint = Some(value.to_string()),
                "defaultendpointsprotocol" => protocol = Some(value.to_string()),
                "endpointsuffix" => suffix = Some(value.to_string()),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                // Blob/queue/file endpoints and unknown keys are irrelevant to tables.
                _ => {}
            }
        }

        if development {
            return Ok(Self {
                account_name: Some(DEV_STORE_ACCOUNT_NAME.to_string()),
                account_key: Some(SecretString::from(DEV_STORE_ACCOUNT_KEY.to_string())),
                sas: None,
                table_endpoint: parse_endpoint(DEV_STORE_TABLE_ENDPOINT)?,
            });
        }

        let table_endpoint = match table_endpoint {
            Some(endpoint) => parse_endpoint(&endpoint)?,
            None => {
                let account = account_name.as_deref().ok_or_else(|| {
                    TablesError::InvalidConnectionString(
                        "either TableEndpoint or AccountName is required".into(),
                    )
                })?;
                let protocol = protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
                let suffix = suffix.as_deref().unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                parse_endpoint(&format!("{protocol}://{account}.table.{suffix}"))?
            }
        };

        if account_key.is_none() && sas.is_none() {
            return Err(TablesError::InvalidConnectionString(
                "either AccountKey or SharedAccessSignature is required".into(),
            ));
        }
        if account_key.is_some() && account_name.is_none() {
            return Err(TablesError::InvalidConnectionString(
                "AccountKey requires AccountName".into(),
            ));
        }

        Ok(Self {
            account_name,
            account_key,
            sas,
            table_endpoint,
        })
    }

    /// The account name, when the connection string names one.
    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref()
    }

    /// The Table service endpoint.
    pub fn table_endpoint(&self) -> &Url {
        &self.table_endpoint
    }

    /// The credential described by the connection string.
    ///
    /// An account key takes precedence over a SAS token.
    pub fn credential(&self) -> TablesResult<TablesCredential> {
        match (&self.account_name, &self.account_key, &self.sas) {
            (Some(name), Some(key), _) => Ok(TablesCredential::SharedKey {
                account: name.clone(),
                key: key.clone(),
            }),
            (_, _, Some(sas)) => Ok(TablesCredential::Sas(sas.clone())),
            _ => Err(TablesError::InvalidConnectionString(
                "connection string carries no usable credential".into(),
            )),
        }
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "****"))
            .field("sas", &self.sas.as_ref().map(|_| "****"))
            .field("table_endpoint", &self.table_endpoint.as_str())
            .finish()
    }
}

fn parse_endpoint(endpoint: &str) -> TablesResult<Url> {
    Url::parse(endpoint).map_err(|e| {
        TablesError::invalid_endpoint_with_source("invalid table endpoint in connection string", e)
    })
}

fn redact_segment(segment: &str) -> String {
    segment.chars().take(12).collect::<String>() + "..."
}
