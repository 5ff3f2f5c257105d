//! Conversions from host values into expressions.
//!
//! Arrays and objects whose elements are all constants collapse into a single
//! literal. As soon as one element is a computed expression the collection is
//! built with `MAKE_ARRAY` or `MAKE_OBJECT` instead.

use std::collections::{BTreeMap, HashMap};

use docql_error::{Result, build_err};
use docql_proto::{Datum, TermType};
use serde::Serialize;

use super::{Expr, ExprKind};

impl Expr {
    /// Build an array expression from a list of elements.
    pub fn array<I, T>(items: I) -> Expr
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        let items: Vec<Expr> = items.into_iter().map(Into::into).collect();
        let datums: Option<Vec<Datum>> = items.iter().map(|e| e.as_literal().cloned()).collect();
        match datums {
            Some(datums) => Expr::literal(Datum::Array(datums)),
            None => Expr::operator(TermType::MakeArray, items),
        }
    }

    /// Build an object expression from `(field, value)` pairs.
    ///
    /// When a field appears more than once the last value wins.
    pub fn object<I, K, V>(fields: I) -> Expr
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Expr>,
    {
        let fields: BTreeMap<String, Expr> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let datums: Option<BTreeMap<String, Datum>> = fields
            .iter()
            .map(|(k, v)| v.as_literal().map(|d| (k.clone(), d.clone())))
            .collect();
        match datums {
            Some(datums) => Expr::literal(Datum::Object(datums)),
            None => Expr::operator_with(TermType::MakeObject, Vec::new(), fields),
        }
    }

    /// Convert any serializable host value into a literal.
    ///
    /// Fails for values that have no document representation, such as maps
    /// with non-string keys.
    pub fn try_from_serialize<T>(value: &T) -> Result<Expr>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)
            .map_err(|e| build_err!("value cannot be used in a query: {e}"))?;
        Ok(Expr::literal(Datum::from(value)))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind(), ExprKind::Literal(_))
    }
}

impl From<Datum> for Expr {
    fn from(value: Datum) -> Self {
        Expr::literal(value)
    }
}

impl From<&Expr> for Expr {
    fn from(value: &Expr) -> Self {
        value.clone()
    }
}

impl From<serde_json::Value> for Expr {
    fn from(value: serde_json::Value) -> Self {
        Expr::literal(Datum::from(value))
    }
}

/// The host "nothing" value. Compiles to null.
impl From<()> for Expr {
    fn from(_: ()) -> Self {
        Expr::null()
    }
}

impl<T: Into<Expr>> From<Option<T>> for Expr {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Expr::null(),
        }
    }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(value: Vec<T>) -> Self {
        Expr::array(value)
    }
}

impl<T: Into<Expr>> From<BTreeMap<String, T>> for Expr {
    fn from(value: BTreeMap<String, T>) -> Self {
        Expr::object(value)
    }
}

impl<T: Into<Expr>> From<HashMap<String, T>> for Expr {
    fn from(value: HashMap<String, T>) -> Self {
        Expr::object(value)
    }
}

macro_rules! impl_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expr {
                fn from(value: $t) -> Self {
                    Expr::literal(Datum::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool, f32, f64, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, &str, String
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_array_collapses() {
        let e = Expr::array([1, 2, 3]);
        assert_eq!(
            Some(&Datum::from(vec![1, 2, 3])),
            e.as_literal()
        );
    }

    #[test]
    fn computed_element_builds_make_array() {
        let e = Expr::array([Expr::from(1), Expr::from(1).add(1)]);
        assert_eq!(Some(TermType::MakeArray), e.term_type());
        assert_eq!(2, e.operands().len());
    }

    #[test]
    fn object_last_field_wins() {
        let e = Expr::object([("a", 1), ("a", 2)]);
        let expected: Datum = serde_json::json!({"a": 2}).into();
        assert_eq!(Some(&expected), e.as_literal());
    }

    #[test]
    fn computed_field_builds_make_object() {
        let e = Expr::object([("a", Expr::from(1)), ("b", Expr::from(2).mul(3))]);
        assert_eq!(Some(TermType::MakeObject), e.term_type());
        assert!(e.operands().is_empty());
        assert_eq!(2, e.options().len());
    }

    #[test]
    fn nothing_is_null() {
        assert_eq!(Some(&Datum::Null), Expr::from(()).as_literal());
        assert_eq!(Some(&Datum::Null), Expr::from(None::<i32>).as_literal());
        assert_eq!(Some(&Datum::from(4)), Expr::from(Some(4)).as_literal());
    }

    #[test]
    fn serialize_struct() {
        #[derive(Serialize)]
        struct Row {
            id: i64,
            name: &'static str,
        }

        let e = Expr::try_from_serialize(&Row { id: 1, name: "x" }).unwrap();
        let expected: Datum = serde_json::json!({"id": 1, "name": "x"}).into();
        assert_eq!(Some(&expected), e.as_literal());
    }

    #[test]
    fn serialize_non_string_keys_fails() {
        let mut m = HashMap::new();
        m.insert((1, 2), 3);
        let err = Expr::try_from_serialize(&m).unwrap_err();
        assert_eq!(docql_error::ErrorKind::Build, err.kind());
    }
}
