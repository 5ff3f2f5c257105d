use docql_error::{DocQlError, Result};
use docql_proto::{RequestEnvelope, Term, TermType};
use tracing::debug;

use crate::compile::{CompileContext, compile};
use crate::decode::cursor::Cursor;
use crate::decode::response::{DecodedResponse, decode_response};
use crate::expr::Expr;
use crate::outcome::atomicity::{NonDeterministicWrite, non_deterministic_writes};
use crate::outcome::write_outcome::WriteKind;
use crate::session::{Connection, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Evaluate update and replace bodies atomically per row.
    pub atomic: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions { atomic: true }
    }
}

/// What the result of a query looks like, as far as the client can tell
/// before running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// A write returning a single summary object.
    ///
    /// `point` is set if the write targets a single document by key.
    Write { kind: WriteKind, point: bool },
    Other,
}

/// Progress of a write query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteState {
    Compiled,
    Sent,
    /// The server evaluated the write and returned its summary.
    Evaluated,
    /// The summary was normalized into a [`WriteOutcome`].
    ///
    /// [`WriteOutcome`]: crate::outcome::WriteOutcome
    Aggregated,
}

/// An expression together with query-wide options.
#[derive(Debug, Clone)]
pub struct Query {
    expr: Expr,
    options: QueryOptions,
}

impl From<Expr> for Query {
    fn from(expr: Expr) -> Self {
        Query::new(expr)
    }
}

impl Query {
    pub fn new(expr: Expr) -> Self {
        Query {
            expr,
            options: QueryOptions::default(),
        }
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.options.atomic = atomic;
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn result_shape(&self) -> ResultShape {
        let Some(term_type) = self.expr.term_type() else {
            return ResultShape::Other;
        };
        let point = || {
            self.expr
                .operands()
                .first()
                .is_some_and(|sel| sel.term_type() == Some(TermType::Get))
        };
        match term_type {
            TermType::Insert => ResultShape::Write {
                kind: WriteKind::Insert,
                point: false,
            },
            TermType::Update => ResultShape::Write {
                kind: WriteKind::Update,
                point: point(),
            },
            TermType::Replace => ResultShape::Write {
                kind: WriteKind::Replace,
                point: point(),
            },
            TermType::Delete => ResultShape::Write {
                kind: WriteKind::Delete,
                point: point(),
            },
            TermType::ForEach => ResultShape::Write {
                kind: WriteKind::Mixed,
                point: false,
            },
            _ => ResultShape::Other,
        }
    }

    /// Writes the server will refuse to evaluate atomically.
    ///
    /// Always empty for relaxed queries.
    pub fn non_deterministic_writes(&self) -> Vec<NonDeterministicWrite> {
        if !self.options.atomic {
            return Vec::new();
        }
        non_deterministic_writes(&self.expr)
    }

    pub fn compile(&self, default_db: Option<&str>) -> Result<Term> {
        let ctx = CompileContext {
            default_db: default_db.map(ToString::to_string),
            atomic: self.options.atomic,
        };
        compile(&self.expr, &ctx)
    }

    /// Compile and send the query, returning a cursor over its result.
    ///
    /// Fails if the first response is an error.
    pub async fn run<C: Connection>(&self, session: &Session<C>) -> Result<Cursor<C>> {
        let config = session.config();
        let term = self.compile(Some(&config.default_database))?;
        let shape = self.result_shape();
        let token = session.next_token();

        debug!(token, query = %term, atomic = self.options.atomic, "running query");
        if matches!(shape, ResultShape::Write { .. }) {
            debug!(token, state = ?WriteState::Compiled, "write state");
        }

        let request = RequestEnvelope::start(token, term, config.start_options());
        let raw = session.send(request).await?;
        if matches!(shape, ResultShape::Write { .. }) {
            debug!(token, state = ?WriteState::Sent, "write state");
        }

        match decode_response(&raw, token)? {
            DecodedResponse::Error(failure) => {
                debug!(token, %failure, "query failed");
                Err(DocQlError::Query(failure))
            }
            response => Ok(Cursor::new(session.clone(), token, shape, response)),
        }
    }
}

impl Expr {
    pub fn into_query(self) -> Query {
        Query::new(self)
    }

    /// Run this expression with default query options.
    pub async fn run<C: Connection>(&self, session: &Session<C>) -> Result<Cursor<C>> {
        Query::new(self.clone()).run(session).await
    }
}
