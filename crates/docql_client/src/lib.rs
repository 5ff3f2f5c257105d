//! TCP transport for docql sessions.
//!
//! ```no_run
//! # async fn example() -> docql_error::Result<()> {
//! let session = docql_client::connect("localhost:28015", "test").await?;
//! let mut cursor = docql_core::Expr::from(1).add(2).run(&session).await?;
//! let three: i64 = cursor.one().await?;
//! assert_eq!(3, three);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod handshake;
pub mod options;

pub use connection::TcpConnection;
use docql_core::{Session, SessionConfig};
use docql_error::Result;
pub use options::ConnectOptions;

/// Connect to `host[:port]`, using `default_database` for tables referenced
/// without a database.
pub async fn connect(address: &str, default_database: &str) -> Result<Session<TcpConnection>> {
    connect_with(&ConnectOptions::from_address(address, default_database)?).await
}

/// Connect using a `docql://[auth_key@]host[:port][/database]` url.
pub async fn connect_url(url: &str) -> Result<Session<TcpConnection>> {
    connect_with(&ConnectOptions::from_url(url)?).await
}

pub async fn connect_with(opts: &ConnectOptions) -> Result<Session<TcpConnection>> {
    let conn = TcpConnection::connect(opts).await?;
    let session = Session::new(conn, SessionConfig::default());
    session.use_database(&opts.database)?;
    Ok(session)
}
