use std::fmt;

use docql_core::config::DEFAULT_DATABASE;
use docql_core::expr::relation::validate_name;
use docql_error::{Result, connection_err};
use url::Url;

pub const DEFAULT_PORT: u16 = 28015;
pub const URL_SCHEME: &str = "docql";

/// Where and how to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub auth_key: Option<String>,
    pub database: String,
}

// Keeps the auth key out of logs.
impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_key", &self.auth_key.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>) -> Self {
        ConnectOptions {
            host: host.into(),
            port: DEFAULT_PORT,
            auth_key: None,
            database: DEFAULT_DATABASE.to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Parse options from an address of the form `host[:port]`.
    pub fn from_address(address: &str, database: &str) -> Result<Self> {
        Self::from_url(&format!("{URL_SCHEME}://{address}/{database}"))
    }

    /// Parse options from a `docql://[auth_key@]host[:port][/database]` url.
    pub fn from_url(s: &str) -> Result<Self> {
        let url =
            Url::parse(s).map_err(|e| connection_err!("Invalid connection url '{s}': {e}"))?;
        if url.scheme() != URL_SCHEME {
            return Err(connection_err!(
                "Unsupported scheme '{}', expected '{URL_SCHEME}'",
                url.scheme()
            ));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| connection_err!("Missing host in '{s}'"))?
            .to_string();

        let auth_key = match url.username() {
            "" => None,
            key => Some(key.to_string()),
        };

        let database = match url.path().trim_start_matches('/') {
            "" => DEFAULT_DATABASE.to_string(),
            db => {
                validate_name("database", db)?;
                db.to_string()
            }
        };

        Ok(ConnectOptions {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            auth_key,
            database,
        })
    }

    /// `host:port` suitable for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
