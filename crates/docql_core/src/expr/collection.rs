//! Sequence and document combinators.

use std::collections::BTreeMap;

use docql_error::{Result, build_err};
use docql_proto::{Datum, TermType};

use super::Expr;

/// Sort key for [`Expr::order_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Asc(String),
    Desc(String),
}

pub fn asc(field: impl Into<String>) -> OrderKey {
    OrderKey::Asc(field.into())
}

pub fn desc(field: impl Into<String>) -> OrderKey {
    OrderKey::Desc(field.into())
}

impl OrderKey {
    fn field(&self) -> &str {
        match self {
            OrderKey::Asc(f) | OrderKey::Desc(f) => f,
        }
    }

    fn into_expr(self) -> Expr {
        match self {
            OrderKey::Asc(f) => Expr::operator(TermType::Asc, vec![Expr::literal(f)]),
            OrderKey::Desc(f) => Expr::operator(TermType::Desc, vec![Expr::literal(f)]),
        }
    }
}

/// A bare field name sorts ascending.
impl From<&str> for OrderKey {
    fn from(value: &str) -> Self {
        OrderKey::Asc(value.to_string())
    }
}

impl From<String> for OrderKey {
    fn from(value: String) -> Self {
        OrderKey::Asc(value)
    }
}

/// Per-group reduction used by [`Expr::group_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    Count,
    Sum(String),
    Avg(String),
}

impl Reduction {
    pub fn sum(field: impl Into<String>) -> Self {
        Reduction::Sum(field.into())
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Reduction::Avg(field.into())
    }

    fn to_datum(&self) -> Datum {
        let (name, value) = match self {
            Reduction::Count => ("COUNT", Datum::Bool(true)),
            Reduction::Sum(f) => ("SUM", Datum::from(f.as_str())),
            Reduction::Avg(f) => ("AVG", Datum::from(f.as_str())),
        };
        Datum::Object(BTreeMap::from([(name.to_string(), value)]))
    }
}

/// Collect a non-empty list of field names.
fn field_list<I, S>(op: &str, fields: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
    if fields.is_empty() {
        return Err(build_err!("{op} requires at least one field"));
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(build_err!("{op} field names must not be empty"));
    }
    Ok(fields)
}

impl Expr {
    /// Element at `index`. Negative indices count from the end.
    pub fn nth(&self, index: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Nth, vec![self.clone(), index.into()])
    }

    pub fn count(&self) -> Expr {
        Expr::operator(TermType::Count, vec![self.clone()])
    }

    pub fn limit(&self, n: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Limit, vec![self.clone(), n.into()])
    }

    pub fn skip(&self, n: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Skip, vec![self.clone(), n.into()])
    }

    /// Elements from `start` (inclusive) to `end` (exclusive).
    pub fn slice(&self, start: impl Into<Expr>, end: impl Into<Expr>) -> Expr {
        Expr::operator(
            TermType::Slice,
            vec![self.clone(), start.into(), end.into()],
        )
    }

    pub fn append(&self, value: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Append, vec![self.clone(), value.into()])
    }

    pub fn distinct(&self) -> Expr {
        Expr::operator(TermType::Distinct, vec![self.clone()])
    }

    pub fn union(&self, other: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Union, vec![self.clone(), other.into()])
    }

    pub fn map<F, R>(&self, f: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::Map, vec![self.clone(), Expr::func1(f)])
    }

    /// Map every element to a sequence and concatenate the results.
    pub fn concat_map<F, R>(&self, f: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::ConcatMap, vec![self.clone(), Expr::func1(f)])
    }

    /// Keep the elements for which the predicate is true.
    pub fn filter<F, R>(&self, predicate: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::Filter, vec![self.clone(), Expr::func1(predicate)])
    }

    /// Keep the elements whose fields equal those of `example`.
    pub fn filter_by(&self, example: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Filter, vec![self.clone(), example.into()])
    }

    /// Fold the sequence starting from `base`.
    pub fn reduce<F, R>(&self, base: impl Into<Expr>, f: F) -> Expr
    where
        F: FnOnce(Expr, Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(
            TermType::Reduce,
            vec![self.clone(), base.into(), Expr::func2(f)],
        )
    }

    /// Group by the given fields and reduce every group.
    pub fn group_by<I, S>(&self, fields: I, reduction: Reduction) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = field_list("group_by", fields)?;
        Ok(Expr::operator(
            TermType::GroupBy,
            vec![
                self.clone(),
                Expr::array(fields),
                Expr::literal(reduction.to_datum()),
            ],
        ))
    }

    /// Group elements by `group`, map every element with `map` and fold each
    /// group with `reduce` starting from `base`.
    pub fn grouped_map_reduce<G, GR, M, MR, F, FR>(
        &self,
        group: G,
        map: M,
        base: impl Into<Expr>,
        reduce: F,
    ) -> Expr
    where
        G: FnOnce(Expr) -> GR,
        GR: Into<Expr>,
        M: FnOnce(Expr) -> MR,
        MR: Into<Expr>,
        F: FnOnce(Expr, Expr) -> FR,
        FR: Into<Expr>,
    {
        Expr::operator(
            TermType::GroupedMapReduce,
            vec![
                self.clone(),
                Expr::func1(group),
                Expr::func1(map),
                base.into(),
                Expr::func2(reduce),
            ],
        )
    }

    /// Sort by one or more keys. The first key is the most significant.
    pub fn order_by<I, K>(&self, keys: I) -> Result<Expr>
    where
        I: IntoIterator<Item = K>,
        K: Into<OrderKey>,
    {
        let keys: Vec<OrderKey> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(build_err!("order_by requires at least one key"));
        }
        if keys.iter().any(|k| k.field().is_empty()) {
            return Err(build_err!("order_by field names must not be empty"));
        }

        let mut operands = Vec::with_capacity(keys.len() + 1);
        operands.push(self.clone());
        operands.extend(keys.into_iter().map(OrderKey::into_expr));
        Ok(Expr::operator(TermType::OrderBy, operands))
    }

    pub fn get_field(&self, name: impl Into<String>) -> Expr {
        Expr::operator(
            TermType::GetField,
            vec![self.clone(), Expr::literal(name.into())],
        )
    }

    /// True if the object has all of the given fields.
    pub fn contains<I, S>(&self, fields: I) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_op(TermType::Contains, "contains", fields)
    }

    /// Keep only the given fields.
    pub fn pluck<I, S>(&self, fields: I) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_op(TermType::Pluck, "pluck", fields)
    }

    /// Drop the given fields.
    pub fn without<I, S>(&self, fields: I) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_op(TermType::Without, "without", fields)
    }

    /// Keep only the given fields of a single object. Fails on the server if a
    /// field is missing, unlike [`Expr::pluck`].
    pub fn pick<I, S>(&self, fields: I) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_op(TermType::Pick, "pick", fields)
    }

    pub fn merge(&self, other: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Merge, vec![self.clone(), other.into()])
    }

    fn field_op<I, S>(&self, term_type: TermType, op: &str, fields: I) -> Result<Expr>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = field_list(op, fields)?;
        let mut operands = Vec::with_capacity(fields.len() + 1);
        operands.push(self.clone());
        operands.extend(fields.into_iter().map(Expr::literal));
        Ok(Expr::operator(term_type, operands))
    }
}
