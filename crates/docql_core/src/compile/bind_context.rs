use std::collections::HashMap;
use std::fmt;

use docql_error::{Result, build_err};

/// Reference to a scope in the bind context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindScopeRef {
    pub context_idx: usize,
}

/// Wire identifier of a bound variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u64);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VAR_{}", self.0)
    }
}

#[derive(Debug, Default)]
struct BindScope {
    /// Parent scope, None for the root.
    parent: Option<BindScopeRef>,
    /// Variables introduced by the function owning this scope, keyed by the
    /// identity of their placeholder node.
    vars: HashMap<usize, VarId>,
}

/// Tracks which variables are visible while compiling an expression.
///
/// Every function opens a child scope of the scope it appears in. Variable ids
/// are allocated from a counter local to a single compilation, so compiling
/// the same expression twice produces identical output.
#[derive(Debug)]
pub struct BindContext {
    /// Initialized with a single root scope that binds nothing.
    scopes: Vec<BindScope>,
    next_var: u64,
}

impl Default for BindContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BindContext {
    pub fn new() -> Self {
        BindContext {
            scopes: vec![BindScope::default()],
            next_var: 1,
        }
    }

    pub fn root_scope_ref(&self) -> BindScopeRef {
        BindScopeRef { context_idx: 0 }
    }

    /// Creates a new scope with `current` as its parent.
    pub fn new_child_scope(&mut self, current: BindScopeRef) -> BindScopeRef {
        let idx = self.scopes.len();
        self.scopes.push(BindScope {
            parent: Some(current),
            vars: HashMap::new(),
        });
        BindScopeRef { context_idx: idx }
    }

    /// Bind a placeholder in `scope`, returning its fresh id.
    pub fn bind_var(&mut self, scope: BindScopeRef, placeholder: usize) -> Result<VarId> {
        let id = VarId(self.next_var);
        let scope = self.get_scope_mut(scope)?;
        if scope.vars.insert(placeholder, id).is_some() {
            return Err(build_err!("variable bound twice in the same function"));
        }
        self.next_var += 1;
        Ok(id)
    }

    /// Find the id of a placeholder, searching from `scope` outwards.
    pub fn resolve_var(&self, scope: BindScopeRef, placeholder: usize) -> Result<Option<VarId>> {
        let mut current = Some(scope);
        while let Some(scope_ref) = current {
            let scope = self.get_scope(scope_ref)?;
            if let Some(id) = scope.vars.get(&placeholder) {
                return Ok(Some(*id));
            }
            current = scope.parent;
        }
        Ok(None)
    }

    fn get_scope(&self, bind_ref: BindScopeRef) -> Result<&BindScope> {
        self.scopes
            .get(bind_ref.context_idx)
            .ok_or_else(|| build_err!("missing bind scope: {}", bind_ref.context_idx))
    }

    fn get_scope_mut(&mut self, bind_ref: BindScopeRef) -> Result<&mut BindScope> {
        self.scopes
            .get_mut(bind_ref.context_idx)
            .ok_or_else(|| build_err!("missing bind scope: {}", bind_ref.context_idx))
    }
}
