use docql_error::{Result, build_err};
use docql_proto::{Datum, Term, TermType};
use tracing::warn;

use super::bind_context::{BindContext, BindScopeRef};
use crate::expr::{Expr, ExprKind};
use crate::outcome::atomicity::{Determinism, analyze};

/// Inputs to compilation that come from outside the expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    /// Database for tables referenced without one. If None the server's
    /// default is used.
    pub default_db: Option<String>,
    /// Value of the `atomic` option attached to every update and replace.
    pub atomic: bool,
}

impl Default for CompileContext {
    fn default() -> Self {
        CompileContext {
            default_db: None,
            atomic: true,
        }
    }
}

/// Compile an expression into a wire term.
///
/// Compilation is pure: the same expression and context always produce the
/// same term.
pub fn compile(expr: &Expr, ctx: &CompileContext) -> Result<Term> {
    let mut compiler = Compiler {
        ctx,
        bind: BindContext::new(),
    };
    let root = compiler.bind.root_scope_ref();
    compiler.compile_expr(expr, root)
}

#[derive(Debug)]
struct Compiler<'a> {
    ctx: &'a CompileContext,
    bind: BindContext,
}

impl Compiler<'_> {
    fn compile_expr(&mut self, expr: &Expr, scope: BindScopeRef) -> Result<Term> {
        match expr.kind() {
            ExprKind::Literal(datum) => {
                if !datum.is_finite() {
                    return Err(build_err!(
                        "Non-finite number cannot be sent to the server: {datum}"
                    ));
                }
                Ok(Term::datum(datum.clone()))
            }
            ExprKind::DbRef => {
                let args = self.compile_operands(expr, scope)?;
                Ok(Term::new(TermType::Db, args))
            }
            ExprKind::TableRef => {
                let mut args = self.compile_operands(expr, scope)?;
                if args.len() == 1 {
                    if let Some(db) = &self.ctx.default_db {
                        args.insert(0, Term::new(TermType::Db, vec![Term::datum(db.as_str())]));
                    }
                }
                Ok(Term::new(TermType::Table, args))
            }
            ExprKind::Var => match self.bind.resolve_var(scope, expr.node_id())? {
                Some(id) => Ok(Term::new(TermType::Var, vec![Term::datum(id.0)])),
                None => Err(build_err!(
                    "Variable used outside of the function that introduced it"
                )),
            },
            ExprKind::Function => self.compile_function(expr, scope),
            ExprKind::Operator(term_type) => self.compile_operator(*term_type, expr, scope),
        }
    }

    fn compile_operands(&mut self, expr: &Expr, scope: BindScopeRef) -> Result<Vec<Term>> {
        expr.operands()
            .iter()
            .map(|operand| self.compile_expr(operand, scope))
            .collect()
    }

    fn compile_function(&mut self, expr: &Expr, scope: BindScopeRef) -> Result<Term> {
        let (body, params) = expr
            .operands()
            .split_last()
            .ok_or_else(|| build_err!("Function without a body"))?;

        let fn_scope = self.bind.new_child_scope(scope);
        let mut ids = Vec::with_capacity(params.len());
        for param in params {
            let id = self.bind.bind_var(fn_scope, param.node_id())?;
            ids.push(Datum::from(id.0));
        }

        let body = self.compile_expr(body, fn_scope)?;
        Ok(Term::new(
            TermType::Func,
            vec![Term::datum(Datum::Array(ids)), body],
        ))
    }

    fn compile_operator(
        &mut self,
        term_type: TermType,
        expr: &Expr,
        scope: BindScopeRef,
    ) -> Result<Term> {
        let arity = term_type.arity();
        if !arity.accepts(expr.operands().len()) {
            return Err(build_err!(
                "{term_type} expects {arity} arguments, got {}",
                expr.operands().len()
            ));
        }

        let mut term = Term::new(term_type, self.compile_operands(expr, scope)?);
        for (name, option) in expr.options() {
            let compiled = self.compile_expr(option, scope)?;
            term.optargs.insert(name.clone(), compiled);
        }

        if matches!(term_type, TermType::Update | TermType::Replace) {
            term.optargs
                .insert("atomic".to_string(), Term::datum(self.ctx.atomic));

            if self.ctx.atomic {
                if let Some(body) = expr.operands().get(1) {
                    if let Determinism::NonDeterministic { reason } = analyze(body) {
                        warn!(
                            term = %term_type,
                            %reason,
                            "Atomic write body is not deterministic, the server will reject every row"
                        );
                    }
                }
            }
        }

        Ok(term)
    }
}
