//! Client side query engine.
//!
//! Queries are built as immutable [`Expr`] graphs, compiled into wire terms,
//! and sent through a [`Session`]. Results are read back through a
//! [`Cursor`], and write results can be normalized into a [`WriteOutcome`].

pub mod compile;
pub mod config;
pub mod decode;
pub mod expr;
pub mod outcome;
pub mod query;
pub mod session;

#[cfg(test)]
mod testutil;

pub use config::{Durability, SessionConfig};
pub use decode::{Cursor, DecodedResponse};
pub use expr::collection::{OrderKey, Reduction, asc, desc};
pub use expr::ops::{LetScope, branch, js, let_in};
pub use expr::relation::{
    TableSpec, db, db_create, db_drop, db_list, table, table_create, table_create_spec, table_drop,
    table_list,
};
pub use expr::write::InsertOptions;
pub use expr::{Expr, ExprKind};
pub use outcome::{WriteKind, WriteOutcome};
pub use query::{Query, QueryOptions, ResultShape, WriteState};
pub use session::{Connection, Session};
