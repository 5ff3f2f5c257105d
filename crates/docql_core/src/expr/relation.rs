//! Databases, tables, lookups, joins and catalog operations.

use std::collections::BTreeMap;

use docql_error::{Result, build_err};
use docql_proto::TermType;

use super::{Expr, ExprKind};

/// Primary key used when a table is created without an explicit one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Check a database or table name.
///
/// Names must be non-empty and use only ASCII letters, digits and underscores.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(build_err!("{kind} name must not be empty"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(build_err!(
            "invalid {kind} name '{name}': only letters, digits and '_' are allowed"
        ));
    }
    Ok(())
}

/// Reference a database.
pub fn db(name: impl Into<String>) -> Result<Expr> {
    let name = name.into();
    validate_name("database", &name)?;
    Ok(Expr::db_ref(name))
}

/// Reference a table in the session's default database.
pub fn table(name: impl Into<String>) -> Result<Expr> {
    let name = name.into();
    validate_name("table", &name)?;
    Ok(Expr::table_ref(None, name))
}

pub fn db_create(name: impl Into<String>) -> Result<Expr> {
    let name = name.into();
    validate_name("database", &name)?;
    Ok(Expr::operator(TermType::DbCreate, vec![Expr::literal(name)]))
}

pub fn db_drop(name: impl Into<String>) -> Result<Expr> {
    let name = name.into();
    validate_name("database", &name)?;
    Ok(Expr::operator(TermType::DbDrop, vec![Expr::literal(name)]))
}

pub fn db_list() -> Expr {
    Expr::operator(TermType::DbList, Vec::new())
}

/// Create a table with the default primary key in the session's default
/// database.
pub fn table_create(name: impl Into<String>) -> Result<Expr> {
    TableSpec::new(name).build(None)
}

pub fn table_create_spec(spec: TableSpec) -> Result<Expr> {
    spec.build(None)
}

/// Drop a table from the session's default database.
pub fn table_drop(name: impl Into<String>) -> Result<Expr> {
    let name = name.into();
    validate_name("table", &name)?;
    Ok(Expr::operator(TermType::TableDrop, vec![Expr::literal(name)]))
}

/// List tables of the session's default database.
pub fn table_list() -> Expr {
    Expr::operator(TermType::TableList, Vec::new())
}

/// Description of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: Option<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        TableSpec {
            name: name.into(),
            primary_key: None,
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn primary_key(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    fn build(self, db: Option<Expr>) -> Result<Expr> {
        validate_name("table", &self.name)?;
        let mut options = BTreeMap::new();
        if let Some(key) = self.primary_key {
            if key.is_empty() {
                return Err(build_err!(
                    "primary key of table '{}' must not be empty",
                    self.name
                ));
            }
            options.insert("primary_key".to_string(), Expr::literal(key));
        }

        let mut operands = Vec::with_capacity(2);
        operands.extend(db);
        operands.push(Expr::literal(self.name));
        Ok(Expr::operator_with(TermType::TableCreate, operands, options))
    }
}

impl Expr {
    fn expect_db(&self, op: &str) -> Result<()> {
        match self.kind() {
            ExprKind::DbRef => Ok(()),
            _ => Err(build_err!("{op} must be called on a database reference")),
        }
    }

    /// Reference a table in this database.
    pub fn table(&self, name: impl Into<String>) -> Result<Expr> {
        self.expect_db("table")?;
        let name = name.into();
        validate_name("table", &name)?;
        Ok(Expr::table_ref(Some(self.clone()), name))
    }

    pub fn table_create(&self, name: impl Into<String>) -> Result<Expr> {
        self.table_create_spec(TableSpec::new(name))
    }

    pub fn table_create_spec(&self, spec: TableSpec) -> Result<Expr> {
        self.expect_db("table_create")?;
        spec.build(Some(self.clone()))
    }

    pub fn table_drop(&self, name: impl Into<String>) -> Result<Expr> {
        self.expect_db("table_drop")?;
        let name = name.into();
        validate_name("table", &name)?;
        Ok(Expr::operator(
            TermType::TableDrop,
            vec![self.clone(), Expr::literal(name)],
        ))
    }

    pub fn table_list(&self) -> Result<Expr> {
        self.expect_db("table_list")?;
        Ok(Expr::operator(TermType::TableList, vec![self.clone()]))
    }

    /// Fetch a single document by primary key. Evaluates to null if no
    /// document has that key.
    pub fn get(&self, key: impl Into<Expr>) -> Expr {
        Expr::operator(TermType::Get, vec![self.clone(), key.into()])
    }

    /// Documents whose `index` lies within the bounds (both inclusive).
    ///
    /// One bound gives a lower bound only. Zero or more than two bounds is an
    /// error.
    pub fn between<I, T>(&self, index: impl Into<String>, bounds: I) -> Result<Expr>
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        let index = index.into();
        if index.is_empty() {
            return Err(build_err!("between index must not be empty"));
        }
        let mut options = BTreeMap::new();
        options.insert("index".to_string(), Expr::literal(index));
        self.between_inner(bounds, options)
    }

    /// Like [`Expr::between`] using the table's primary key.
    pub fn between_ids<I, T>(&self, bounds: I) -> Result<Expr>
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        self.between_inner(bounds, BTreeMap::new())
    }

    fn between_inner<I, T>(&self, bounds: I, options: BTreeMap<String, Expr>) -> Result<Expr>
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        let bounds: Vec<Expr> = bounds.into_iter().map(Into::into).collect();
        if bounds.is_empty() || bounds.len() > 2 {
            return Err(build_err!(
                "between expects one or two bounds, got {}",
                bounds.len()
            ));
        }
        let mut operands = Vec::with_capacity(3);
        operands.push(self.clone());
        operands.extend(bounds);
        Ok(Expr::operator_with(TermType::Between, operands, options))
    }

    /// Pairs `{left, right}` of every combination for which the predicate
    /// holds.
    pub fn inner_join<F, R>(&self, other: impl Into<Expr>, predicate: F) -> Expr
    where
        F: FnOnce(Expr, Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(
            TermType::InnerJoin,
            vec![self.clone(), other.into(), Expr::func2(predicate)],
        )
    }

    /// Like [`Expr::inner_join`] but keeps left elements without a match.
    pub fn outer_join<F, R>(&self, other: impl Into<Expr>, predicate: F) -> Expr
    where
        F: FnOnce(Expr, Expr) -> R,
        R: Into<Expr>,
    {
        Expr::operator(
            TermType::OuterJoin,
            vec![self.clone(), other.into(), Expr::func2(predicate)],
        )
    }

    /// Join on equality of `left_field` with the `right_index` of `other`.
    pub fn eq_join(
        &self,
        left_field: impl Into<String>,
        other: impl Into<Expr>,
        right_index: impl Into<String>,
    ) -> Expr {
        Expr::operator(
            TermType::EqJoin,
            vec![
                self.clone(),
                Expr::literal(left_field.into()),
                other.into(),
                Expr::literal(right_index.into()),
            ],
        )
    }

    /// Merge the `left` and `right` halves of every join result.
    pub fn zip(&self) -> Expr {
        Expr::operator(TermType::Zip, vec![self.clone()])
    }
}
