//! Immutable query expressions.
//!
//! An [`Expr`] is a cheap handle to a shared node. Combinators never modify a
//! node, they build a new one pointing at their inputs. Sharing is visible to
//! the compiler: bound variables are resolved by node identity, so the same
//! placeholder used in many places within a function body compiles to a single
//! variable.

pub mod collection;
pub mod literal;
pub mod ops;
pub mod relation;
pub mod write;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use docql_error::{Result, build_err};
use docql_proto::{Datum, TermType};

use crate::compile::{CompileContext, compile};

/// Kind of an expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A constant value.
    Literal(Datum),
    /// Reference to a database. Operands: `[name]`.
    DbRef,
    /// Reference to a table. Operands: `[name]` or `[db, name]`.
    TableRef,
    /// Application of a server operator to the operands.
    Operator(TermType),
    /// Placeholder for a function parameter.
    Var,
    /// Function. Operands are the parameter placeholders followed by the body.
    Function,
}

#[derive(Debug)]
pub struct ExprNode {
    kind: ExprKind,
    operands: Vec<Expr>,
    options: BTreeMap<String, Expr>,
}

#[derive(Debug, Clone)]
pub struct Expr {
    node: Arc<ExprNode>,
}

impl Expr {
    fn from_node(kind: ExprKind, operands: Vec<Expr>, options: BTreeMap<String, Expr>) -> Self {
        Expr {
            node: Arc::new(ExprNode {
                kind,
                operands,
                options,
            }),
        }
    }

    pub fn literal(datum: impl Into<Datum>) -> Self {
        Self::from_node(ExprKind::Literal(datum.into()), Vec::new(), BTreeMap::new())
    }

    /// The null literal. Returned from an update or replace function it means
    /// "leave this row unchanged" (update) or "delete this row" (replace).
    pub fn null() -> Self {
        Self::literal(Datum::Null)
    }

    /// Build an operator node whose argument count is known to be valid.
    pub(crate) fn operator(term_type: TermType, operands: Vec<Expr>) -> Self {
        Self::operator_with(term_type, operands, BTreeMap::new())
    }

    pub(crate) fn operator_with(
        term_type: TermType,
        operands: Vec<Expr>,
        options: BTreeMap<String, Expr>,
    ) -> Self {
        debug_assert!(
            term_type.arity().accepts(operands.len()),
            "{term_type} built with {} operands",
            operands.len()
        );
        Self::from_node(ExprKind::Operator(term_type), operands, options)
    }

    /// Build an arbitrary operator node, checking the number of operands.
    ///
    /// This is an escape hatch for server operators that don't have a
    /// dedicated combinator.
    pub fn try_operator(
        term_type: TermType,
        operands: Vec<Expr>,
        options: BTreeMap<String, Expr>,
    ) -> Result<Self> {
        if matches!(term_type, TermType::Datum | TermType::Var | TermType::Func) {
            return Err(build_err!(
                "{term_type} cannot be built as a plain operator"
            ));
        }
        let arity = term_type.arity();
        if !arity.accepts(operands.len()) {
            return Err(build_err!(
                "{term_type} expects {arity} arguments, got {}",
                operands.len()
            ));
        }
        Ok(Self::from_node(
            ExprKind::Operator(term_type),
            operands,
            options,
        ))
    }

    pub(crate) fn db_ref(name: String) -> Self {
        Self::from_node(ExprKind::DbRef, vec![Expr::literal(name)], BTreeMap::new())
    }

    pub(crate) fn table_ref(db: Option<Expr>, name: String) -> Self {
        let operands = match db {
            Some(db) => vec![db, Expr::literal(name)],
            None => vec![Expr::literal(name)],
        };
        Self::from_node(ExprKind::TableRef, operands, BTreeMap::new())
    }

    /// Create a fresh, unbound variable placeholder.
    fn placeholder() -> Self {
        Self::from_node(ExprKind::Var, Vec::new(), BTreeMap::new())
    }

    fn function(params: Vec<Expr>, body: Expr) -> Self {
        let mut operands = params;
        operands.push(body);
        Self::from_node(ExprKind::Function, operands, BTreeMap::new())
    }

    /// Build a one argument function by calling `f` once with a placeholder.
    pub(crate) fn func1<F, R>(f: F) -> Self
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        let param = Self::placeholder();
        let body = f(param.clone()).into();
        Self::function(vec![param], body)
    }

    /// Build a two argument function by calling `f` once with placeholders.
    pub(crate) fn func2<F, R>(f: F) -> Self
    where
        F: FnOnce(Expr, Expr) -> R,
        R: Into<Expr>,
    {
        let a = Self::placeholder();
        let b = Self::placeholder();
        let body = f(a.clone(), b.clone()).into();
        Self::function(vec![a, b], body)
    }

    /// Build a function with named parameters. Used for `let_in`.
    pub(crate) fn func_named<F>(names: &[String], f: F) -> Result<Self>
    where
        F: FnOnce(&[Expr]) -> Result<Expr>,
    {
        let params: Vec<_> = names.iter().map(|_| Self::placeholder()).collect();
        let body = f(&params)?;
        Ok(Self::function(params, body))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.node.kind
    }

    pub fn operands(&self) -> &[Expr] {
        &self.node.operands
    }

    pub fn options(&self) -> &BTreeMap<String, Expr> {
        &self.node.options
    }

    pub fn as_literal(&self) -> Option<&Datum> {
        match &self.node.kind {
            ExprKind::Literal(d) => Some(d),
            _ => None,
        }
    }

    /// The operator tag if this is an operator node.
    pub fn term_type(&self) -> Option<TermType> {
        match &self.node.kind {
            ExprKind::Operator(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns true if the node reads from stored data (database, table, point
    /// or range lookup).
    pub fn is_relation_source(&self) -> bool {
        match &self.node.kind {
            ExprKind::DbRef | ExprKind::TableRef => true,
            ExprKind::Operator(t) => t.is_relation_source(),
            _ => false,
        }
    }

    /// Identity of the underlying node.
    ///
    /// Two handles have the same identity if one was cloned from the other.
    pub fn node_id(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Visit this node and every node reachable from it, depth first.
    ///
    /// Shared nodes are visited once per path leading to them.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        for operand in &self.node.operands {
            operand.walk(f);
        }
        for opt in self.node.options.values() {
            opt.walk(f);
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = CompileContext::default();
        match compile(self, &ctx) {
            Ok(term) => write!(f, "{term}"),
            Err(e) => write!(f, "<invalid expression: {e}>"),
        }
    }
}
