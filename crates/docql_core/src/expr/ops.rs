//! Scalar operators, control flow, and local bindings.

use std::collections::HashSet;

use docql_error::{Result, build_err};
use docql_proto::TermType;

use super::Expr;

macro_rules! binary_ops {
    ($($(#[$meta:meta])* $name:ident => $tt:ident),* $(,)?) => {
        impl Expr {
            $(
                $(#[$meta])*
                pub fn $name(&self, other: impl Into<Expr>) -> Expr {
                    Expr::operator(TermType::$tt, vec![self.clone(), other.into()])
                }
            )*
        }
    };
}

binary_ops! {
    eq => Eq,
    ne => Ne,
    lt => Lt,
    le => Le,
    gt => Gt,
    ge => Ge,
    /// Logical and. Both operands must evaluate to booleans.
    and => And,
    /// Logical or. Both operands must evaluate to booleans.
    or => Or,
    /// Numeric addition. Also concatenates strings and arrays on the server.
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    modulo => Mod,
}

impl Expr {
    pub fn not(&self) -> Expr {
        Expr::operator(TermType::Not, vec![self.clone()])
    }
}

macro_rules! std_binary_op {
    ($trait:ident, $method:ident, $inherent:ident) => {
        impl<T: Into<Expr>> std::ops::$trait<T> for Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                Expr::$inherent(&self, rhs)
            }
        }

        impl<T: Into<Expr>> std::ops::$trait<T> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                Expr::$inherent(self, rhs)
            }
        }
    };
}

std_binary_op!(Add, add, add);
std_binary_op!(Sub, sub, sub);
std_binary_op!(Mul, mul, mul);
std_binary_op!(Div, div, div);
std_binary_op!(Rem, rem, modulo);

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::not(&self)
    }
}

impl std::ops::Not for &Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::not(self)
    }
}

/// Conditional expression. Evaluates `then` if `cond` is true, otherwise
/// `otherwise`.
pub fn branch(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
    Expr::operator(
        TermType::Branch,
        vec![cond.into(), then.into(), otherwise.into()],
    )
}

/// Server-side javascript snippet.
///
/// Javascript is opaque to the client and is never considered deterministic.
pub fn js(source: impl Into<String>) -> Expr {
    Expr::operator(TermType::Javascript, vec![Expr::literal(source.into())])
}

/// Names introduced by [`let_in`].
#[derive(Debug)]
pub struct LetScope {
    names: Vec<String>,
    params: Vec<Expr>,
}

impl LetScope {
    /// Reference to a variable introduced by the enclosing `let_in`.
    pub fn var(&self, name: &str) -> Result<Expr> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.params[idx].clone())
            .ok_or_else(|| build_err!("unknown let binding '{name}'"))
    }
}

/// Bind values to names for use in `body`.
///
/// Compiles to a call of a function whose parameters are the bound names. The
/// variables are only valid inside the expression returned from `body`.
pub fn let_in<I, K, V, F>(bindings: I, body: F) -> Result<Expr>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Expr>,
    F: FnOnce(&LetScope) -> Result<Expr>,
{
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut seen = HashSet::new();
    for (name, value) in bindings {
        let name = name.into();
        if !seen.insert(name.clone()) {
            return Err(build_err!("duplicate let binding '{name}'"));
        }
        names.push(name);
        values.push(value.into());
    }

    let func = Expr::func_named(&names, |params| {
        let scope = LetScope {
            names: names.clone(),
            params: params.to_vec(),
        };
        body(&scope)
    })?;

    let mut operands = Vec::with_capacity(values.len() + 1);
    operands.push(func);
    operands.extend(values);
    Ok(Expr::operator(TermType::Funcall, operands))
}
