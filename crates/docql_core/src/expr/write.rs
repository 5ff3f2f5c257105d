//! Write combinators.
//!
//! Writes never carry the atomicity flag themselves. The flag is a property of
//! the whole query and is attached to every update and replace term when the
//! query is compiled.

use std::collections::BTreeMap;

use docql_proto::TermType;

use super::Expr;
use crate::query::Query;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Replace existing documents with the same primary key instead of
    /// reporting an error for them.
    pub upsert: bool,
}

impl Expr {
    /// Insert a document or an array of documents.
    pub fn insert(&self, docs: impl Into<Expr>) -> Expr {
        self.insert_with(docs, InsertOptions::default())
    }

    pub fn insert_with(&self, docs: impl Into<Expr>, opts: InsertOptions) -> Expr {
        let mut options = BTreeMap::new();
        if opts.upsert {
            options.insert("upsert".to_string(), Expr::literal(true));
        }
        Expr::operator_with(TermType::Insert, vec![self.clone(), docs.into()], options)
    }

    /// Update every selected row with the object returned by `f`.
    ///
    /// Returning null (`()` or `None`) leaves the row unchanged.
    pub fn update<F, R>(&self, f: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::Update, vec![self.clone(), Expr::func1(f)])
    }

    /// Merge `doc` into every selected row.
    pub fn update_with(&self, doc: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Update, vec![self.clone(), doc.into()])
    }

    /// Replace every selected row with the document returned by `f`.
    ///
    /// Returning null deletes the row. For a point selection of a missing row
    /// the function sees null and a non-null result inserts it.
    pub fn replace<F, R>(&self, f: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::Replace, vec![self.clone(), Expr::func1(f)])
    }

    pub fn replace_with(&self, doc: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Replace, vec![self.clone(), doc.into()])
    }

    pub fn delete(&self) -> Expr {
        Expr::operator(TermType::Delete, vec![self.clone()])
    }

    /// Run the write returned by `f` for every element of the sequence.
    pub fn for_each<F, R>(&self, f: F) -> Expr
    where
        F: FnOnce(Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(TermType::ForEach, vec![self.clone(), Expr::func1(f)])
    }

    /// Wrap this expression in a query with the given atomicity.
    pub fn atomic(&self, atomic: bool) -> Query {
        Query::new(self.clone()).with_atomic(atomic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::relation::table;

    #[test]
    fn insert_upsert_option() {
        let t = table("t").unwrap();
        let e = t.insert_with(Expr::object([("id", 1)]), InsertOptions { upsert: true });
        assert_eq!(
            r#"INSERT(TABLE("t"), {"id": 1}, upsert=true)"#,
            e.to_string()
        );
        assert!(t.insert(Expr::object([("id", 1)])).options().is_empty());
    }

    #[test]
    fn update_returning_nothing() {
        let e = table("t").unwrap().update(|_row| ());
        assert_eq!(
            r#"UPDATE(TABLE("t"), FUNC([1], null), atomic=true)"#,
            e.to_string()
        );
    }
}
