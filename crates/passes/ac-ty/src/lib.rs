//! Type resolution for Acorn
//!
//! This crate handles:
//! - Type representation and the implicit widening table
//! - Module-wide collection of structs, aliases, globals and signatures
//! - Checking of function bodies, one unit at a time
//! - The storage plan consumed by lowering

pub mod collect;
pub mod error;
pub mod resolve;
pub mod ty;

pub use collect::{literal_type, Declarations, FunctionItem, GlobalItem};
pub use error::TypeError;
pub use resolve::{FieldRef, ResolvedAst, ResolvedFunction, StructLiteralRef, TypeResolver};
pub use ty::{FieldDef, StructDef, StructId, Ty, TyDisplay};
