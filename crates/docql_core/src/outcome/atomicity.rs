//! Atomicity rules for row writes.
//!
//! An atomic update or replace evaluates its body once per row inside the
//! row's lock, so the body must be deterministic: the server refuses to apply
//! a body that reads other data or runs javascript, and every row of such a
//! write is counted as an error. A relaxed write accepts any body.

use std::fmt;

use docql_proto::{Datum, TermType};

use super::write_outcome::{OutcomeField, WriteKind};
use crate::expr::{Expr, ExprKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Determinism {
    Deterministic,
    NonDeterministic { reason: String },
}

impl Determinism {
    pub fn is_deterministic(&self) -> bool {
        matches!(self, Determinism::Deterministic)
    }
}

/// An update or replace whose body can't be evaluated atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonDeterministicWrite {
    pub term_type: TermType,
    pub reason: String,
}

impl fmt::Display for NonDeterministicWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} body {}", self.term_type, self.reason)
    }
}

fn non_deterministic_reason(expr: &Expr) -> Option<String> {
    match expr.kind() {
        ExprKind::DbRef => Some("reads a database".to_string()),
        ExprKind::TableRef => {
            let name = expr
                .operands()
                .last()
                .and_then(|e| e.as_literal())
                .and_then(Datum::as_str)
                .unwrap_or("?");
            Some(format!("reads table '{name}'"))
        }
        ExprKind::Operator(TermType::Javascript) => Some("evaluates javascript".to_string()),
        ExprKind::Operator(tt) if tt.is_relation_source() => Some(format!("reads data with {tt}")),
        ExprKind::Operator(tt) if tt.is_write() || tt.is_admin() => {
            Some(format!("performs a nested {tt}"))
        }
        _ => None,
    }
}

/// Decide whether `body` can be evaluated atomically for a row.
///
/// References to the row itself are deterministic. Anything that reads stored
/// data, runs javascript or writes is not.
pub fn analyze(body: &Expr) -> Determinism {
    let mut reason = None;
    body.walk(&mut |e| {
        if reason.is_none() {
            reason = non_deterministic_reason(e);
        }
    });
    match reason {
        Some(reason) => Determinism::NonDeterministic { reason },
        None => Determinism::Deterministic,
    }
}

/// Find every update or replace in `expr` whose body is not deterministic.
pub fn non_deterministic_writes(expr: &Expr) -> Vec<NonDeterministicWrite> {
    let mut found = Vec::new();
    expr.walk(&mut |e| {
        let Some(tt @ (TermType::Update | TermType::Replace)) = e.term_type() else {
            return;
        };
        let Some(body) = e.operands().get(1) else {
            return;
        };
        if let Determinism::NonDeterministic { reason } = analyze(body) {
            found.push(NonDeterministicWrite {
                term_type: tt,
                reason,
            });
        }
    });
    found
}

/// Classify a single row of a write from its state before and after.
///
/// A missing or null state means the row didn't exist. A row whose body
/// produced no change is skipped, as is an update of a missing row.
pub fn classify_row(kind: WriteKind, before: Option<&Datum>, after: Option<&Datum>) -> OutcomeField {
    let before = before.filter(|d| !d.is_null());
    let after = after.filter(|d| !d.is_null());
    match (before, after) {
        (None, None) => OutcomeField::Skipped,
        (None, Some(_)) => match kind {
            WriteKind::Update => OutcomeField::Skipped,
            _ => OutcomeField::Inserted,
        },
        (Some(_), None) => OutcomeField::Deleted,
        (Some(old), Some(new)) if old == new => OutcomeField::Skipped,
        (Some(_), Some(_)) => match kind {
            WriteKind::Replace => OutcomeField::Modified,
            _ => OutcomeField::Updated,
        },
    }
}
