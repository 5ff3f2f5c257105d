//! Compilation of expressions into wire terms.
//!
//! Functions get fresh variable ids from a [`BindContext`] at compile time,
//! which keeps the expression graph itself free of ids and lets one
//! expression be compiled any number of times.

pub mod bind_context;
pub mod compiler;

pub use bind_context::{BindContext, BindScopeRef, VarId};
pub use compiler::{CompileContext, compile};
