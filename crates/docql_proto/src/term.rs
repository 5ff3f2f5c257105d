use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::datum::Datum;

/// Operator tags understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermType {
    Datum,
    MakeArray,
    MakeObject,
    Var,
    Func,
    Funcall,
    Javascript,
    Branch,

    Db,
    Table,
    Get,
    Between,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    And,
    Or,

    Add,
    Sub,
    Mul,
    Div,
    Mod,

    Append,
    Slice,
    Skip,
    Limit,
    Nth,
    GetField,
    Contains,
    Pluck,
    Without,
    Pick,
    Merge,
    Reduce,
    Map,
    Filter,
    ConcatMap,
    OrderBy,
    Asc,
    Desc,
    Distinct,
    Count,
    Union,

    InnerJoin,
    OuterJoin,
    EqJoin,
    Zip,
    GroupedMapReduce,
    GroupBy,

    Insert,
    Update,
    Replace,
    Delete,
    ForEach,

    DbCreate,
    DbDrop,
    DbList,
    TableCreate,
    TableDrop,
    TableList,
}

/// Minimum and (optional) maximum number of arguments for a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    const fn exact(n: usize) -> Self {
        Arity {
            min: n,
            max: Some(n),
        }
    }

    const fn range(min: usize, max: usize) -> Self {
        Arity {
            min,
            max: Some(max),
        }
    }

    const fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.is_none_or(|max| n <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

impl TermType {
    /// Number of positional arguments this term accepts.
    pub const fn arity(&self) -> Arity {
        use TermType::*;
        match self {
            Datum | DbList => Arity::exact(0),
            MakeArray | MakeObject => Arity::at_least(0),
            Var | Javascript | Db | Not | Distinct | Count | Zip | Delete | DbCreate
            | DbDrop => Arity::exact(1),
            Func => Arity::exact(2),
            Funcall => Arity::at_least(1),
            Branch => Arity::exact(3),
            Table | TableCreate | TableDrop => Arity::range(1, 2),
            TableList => Arity::range(0, 1),
            Get => Arity::exact(2),
            // Sequence plus one or two bounds.
            Between => Arity::range(2, 3),
            Eq | Ne | Lt | Le | Gt | Ge | And | Or | Add | Sub | Mul | Div | Mod => {
                Arity::exact(2)
            }
            Append | Skip | Limit | Nth | GetField | Merge | Map | Filter | ConcatMap
            | Union | Insert | Update | Replace | ForEach => Arity::exact(2),
            Slice => Arity::exact(3),
            Contains | Pluck | Without | Pick | OrderBy => Arity::at_least(2),
            Reduce => Arity::exact(3),
            Asc | Desc => Arity::exact(1),
            InnerJoin | OuterJoin => Arity::exact(3),
            EqJoin => Arity::exact(4),
            GroupedMapReduce => Arity::exact(5),
            GroupBy => Arity::exact(3),
        }
    }

    /// Returns true for terms that produce a relation the server reads from
    /// storage.
    pub const fn is_relation_source(&self) -> bool {
        matches!(
            self,
            TermType::Db | TermType::Table | TermType::Get | TermType::Between
        )
    }

    /// Returns true for terms that mutate stored documents.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            TermType::Insert
                | TermType::Update
                | TermType::Replace
                | TermType::Delete
                | TermType::ForEach
        )
    }

    /// Returns true for terms that modify the catalog (databases, tables).
    pub const fn is_admin(&self) -> bool {
        matches!(
            self,
            TermType::DbCreate | TermType::DbDrop | TermType::TableCreate | TermType::TableDrop
        )
    }

    /// Name of the term as written on the wire.
    pub fn as_str(&self) -> &'static str {
        use TermType::*;
        match self {
            Datum => "DATUM",
            MakeArray => "MAKE_ARRAY",
            MakeObject => "MAKE_OBJECT",
            Var => "VAR",
            Func => "FUNC",
            Funcall => "FUNCALL",
            Javascript => "JAVASCRIPT",
            Branch => "BRANCH",
            Db => "DB",
            Table => "TABLE",
            Get => "GET",
            Between => "BETWEEN",
            Eq => "EQ",
            Ne => "NE",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
            Not => "NOT",
            And => "AND",
            Or => "OR",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Append => "APPEND",
            Slice => "SLICE",
            Skip => "SKIP",
            Limit => "LIMIT",
            Nth => "NTH",
            GetField => "GET_FIELD",
            Contains => "CONTAINS",
            Pluck => "PLUCK",
            Without => "WITHOUT",
            Pick => "PICK",
            Merge => "MERGE",
            Reduce => "REDUCE",
            Map => "MAP",
            Filter => "FILTER",
            ConcatMap => "CONCAT_MAP",
            OrderBy => "ORDER_BY",
            Asc => "ASC",
            Desc => "DESC",
            Distinct => "DISTINCT",
            Count => "COUNT",
            Union => "UNION",
            InnerJoin => "INNER_JOIN",
            OuterJoin => "OUTER_JOIN",
            EqJoin => "EQ_JOIN",
            Zip => "ZIP",
            GroupedMapReduce => "GROUPED_MAP_REDUCE",
            GroupBy => "GROUP_BY",
            Insert => "INSERT",
            Update => "UPDATE",
            Replace => "REPLACE",
            Delete => "DELETE",
            ForEach => "FOR_EACH",
            DbCreate => "DB_CREATE",
            DbDrop => "DB_DROP",
            DbList => "DB_LIST",
            TableCreate => "TABLE_CREATE",
            TableDrop => "TABLE_DROP",
            TableList => "TABLE_LIST",
        }
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiled term.
///
/// `DATUM` terms carry their value in `datum`, everything else uses `args` and
/// `optargs`. A `DATUM` term without a `datum` field is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(rename = "type")]
    pub term_type: TermType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Term>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optargs: BTreeMap<String, Term>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Datum>,
}

impl Term {
    pub fn new(term_type: TermType, args: Vec<Term>) -> Self {
        Term {
            term_type,
            args,
            optargs: BTreeMap::new(),
            datum: None,
        }
    }

    pub fn datum(datum: impl Into<Datum>) -> Self {
        let datum = datum.into();
        Term {
            term_type: TermType::Datum,
            args: Vec::new(),
            optargs: BTreeMap::new(),
            datum: if datum.is_null() { None } else { Some(datum) },
        }
    }

    pub fn with_optarg(mut self, name: impl Into<String>, value: Term) -> Self {
        self.optargs.insert(name.into(), value);
        self
    }

    /// Value of a `DATUM` term.
    pub fn datum_value(&self) -> Option<Datum> {
        match self.term_type {
            TermType::Datum => Some(self.datum.clone().unwrap_or(Datum::Null)),
            _ => None,
        }
    }

    /// Walk this term and all of its descendants, depth first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Term)) {
        f(self);
        for arg in &self.args {
            arg.walk(f);
        }
        for opt in self.optargs.values() {
            opt.walk(f);
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(datum) = self.datum_value() {
            return write!(f, "{datum}");
        }

        write!(f, "{}(", self.term_type)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (name, opt) in &self.optargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={opt}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_json_omits_empty_fields() {
        let term = Term::new(TermType::Add, vec![Term::datum(1), Term::datum(2)]);
        assert_eq!(
            r#"{"type":"ADD","args":[{"type":"DATUM","datum":1.0},{"type":"DATUM","datum":2.0}]}"#,
            serde_json::to_string(&term).unwrap()
        );
    }

    #[test]
    fn null_datum_round_trips() {
        let term = Term::datum(Datum::Null);
        let s = serde_json::to_string(&term).unwrap();
        assert_eq!(r#"{"type":"DATUM"}"#, s);

        let parsed: Term = serde_json::from_str(&s).unwrap();
        assert_eq!(Some(Datum::Null), parsed.datum_value());
    }

    #[test]
    fn display_nested() {
        let term = Term::new(
            TermType::Update,
            vec![Term::new(TermType::Table, vec![Term::datum("t")])],
        )
        .with_optarg("atomic", Term::datum(false));
        assert_eq!(r#"UPDATE(TABLE("t"), atomic=false)"#, term.to_string());
    }

    #[test]
    fn arity_checks() {
        assert!(TermType::Between.arity().accepts(2));
        assert!(TermType::Between.arity().accepts(3));
        assert!(!TermType::Between.arity().accepts(4));
        assert!(TermType::MakeArray.arity().accepts(0));
        assert!(!TermType::Pluck.arity().accepts(1));
        assert_eq!("2 to 3", TermType::Between.arity().to_string());
    }
}
