use crate::error::{TablesError, TablesResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Credential types supported by the Azure Data Tables SDK.
#[derive(Clone)]
pub enum TablesCredential {
    /// Storage account name and base64-encoded account key.
    /// Requests are signed with the Shared Key Lite scheme.
    SharedKey { account: String, key: SecretString },

    /// Shared access signature, appended to every request's query string.
    Sas(SecretString),

    /// A pre-acquired Microsoft Entra ID bearer token.
    Token(SecretString),
}

impl TablesCredential {
    /// Create a credential from the environment.
    ///
    /// Checked in order:
    /// - `AZURE_TABLES_ACCOUNT_NAME` + `AZURE_TABLES_ACCOUNT_KEY` (shared key)
    /// - `AZURE_TABLES_SAS_TOKEN` (shared access signature)
    /// - `AZURE_TABLES_TOKEN` (bearer token)
    pub fn from_env() -> TablesResult<Self> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let (Some(account), Some(key)) = (
            non_empty("AZURE_TABLES_ACCOUNT_NAME"),
            non_empty("AZURE_TABLES_ACCOUNT_KEY"),
        ) {
            return Ok(Self::shared_key(account, key));
        }
        if let Some(sas) = non_empty("AZURE_TABLES_SAS_TOKEN") {
            return Ok(Self::sas(sas));
        }
        if let Some(token) = non_empty("AZURE_TABLES_TOKEN") {
            return Ok(Self::token(token));
        }

        Err(TablesError::Auth(
            "no credential configured. Set AZURE_TABLES_ACCOUNT_NAME and AZURE_TABLES_ACCOUNT_KEY, \
             AZURE_TABLES_SAS_TOKEN, or AZURE_TABLES_TOKEN."
                .into(),
        ))
    }

    /// Create a shared key credential.
    pub fn shared_key(account: impl Into<String>, key: impl Into<String>) -> Self {
        Self::SharedKey {
            account: account.into(),
            key: SecretString::from(key.into()),
        }
    }

    /// Create a SAS credential. A leading `?` is stripped.
    pub fn sas(token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self::Sas(SecretString::from(
            token.trim_start_matches('?').to_string(),
        ))
    }

    /// Create a bearer token credential.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(SecretString::from(token.into()))
    }

    /// Append the SAS token to the request URL. No-op for other credentials.
    pub fn apply_sas(&self, url: &mut Url) {
        if let Self::Sas(sas) = self {
            let sas = sas.expose_secret();
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{sas}"),
                _ => sas.to_string(),
            };
            url.set_query(Some(&query));
        }
    }

    /// Compute the `Authorization` header value for a request, if the credential uses one.
    ///
    /// `date` must be the exact value sent in the `x-ms-date` header.
    pub fn authorization_header(&self, url: &Url, date: &str) -> TablesResult<Option<String>> {
        match self {
            Self::SharedKey { account, key } => {
                let resource = canonicalized_resource(account, url);
                let signature = shared_key_lite_signature(key.expose_secret(), date, &resource)?;
                Ok(Some(format!("SharedKeyLite {account}:{signature}")))
            }
            Self::Sas(_) => Ok(None),
            Self::Token(token) => Ok(Some(format!("Bearer {}", token.expose_secret()))),
        }
    }
}

impl std::fmt::Debug for TablesCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SharedKey { account, .. } => {
                write!(f, "TablesCredential::SharedKey({account}, ****)")
            }
            Self::Sas(_) => write!(f, "TablesCredential::Sas(****)"),
            Self::Token(_) => write!(f, "TablesCredential::Token(****)"),
        }
    }
}

/// Build the Shared Key Lite canonicalized resource for the Table service.
///
/// `/{account}{encoded path}`, plus `?comp=<value>` when the query carries `comp`.
pub fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{account}{}", url.path());
    if let Some((_, comp)) = url.query_pairs().find(|(k, _)| k == "comp") {
        resource.push_str("?comp=");
        resource.push_str(&comp);
    }
    resource
}

/// Sign `date + "\n" + resource` with HMAC-SHA256 using the base64-decoded account key.
pub fn shared_key_lite_signature(key: &str, date: &str, resource: &str) -> TablesResult<String> {
    let key = STANDARD
        .decode(key)
        .map_err(|e| TablesError::Auth(format!("account key is not valid base64: {e}")))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| TablesError::Auth(format!("account key rejected: {e}")))?;
    mac.update(format!("{date}\n{resource}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
