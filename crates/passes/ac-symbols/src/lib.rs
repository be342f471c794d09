//! Symbol table for Acorn
//!
//! Names are resolved in two layers. The [`ModuleIndex`] records every item of
//! every unit under its qualified name (`unit::name`) and is shared read-only
//! while units are resolved in parallel. Each unit then walks its own function
//! bodies with a [`SymbolTable`], a chain of lexical scopes rooted at the
//! unit's items.
//!
//! Both layers are generic over the type payload stored in each binding, so
//! the type resolver can keep its own type representation in the table.

pub mod error;
pub mod index;
pub mod scope;
pub mod table;

pub use error::SymbolError;
pub use index::ModuleIndex;
pub use scope::{Scope, ScopeEntry, ScopeId, ScopeKind, ScopeTree};
pub use table::SymbolTable;

use ac_intern::Symbol;
use ac_span::FileSpan;
use std::fmt;

/// Index of a compilation unit within its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnitId(pub u32);

/// Identifier of a binding, unique within the owning module
///
/// Items are numbered by the module index in declaration order. Locals are
/// numbered per unit, so a unit resolved on a worker thread allocates ids
/// without coordinating with the others.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum BindingId {
    /// Global or function
    Item(u32),
    /// Parameter or `let` binding
    Local {
        /// Unit the binding was declared in
        unit: UnitId,
        /// Position among the unit's locals
        index: u32,
    },
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(index) => write!(f, "item{index}"),
            Self::Local { unit, index } => write!(f, "u{}.l{index}", unit.0),
        }
    }
}

/// How a binding is stored
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum StorageKind {
    /// `let` binding inside a function body
    Local,
    /// Function parameter
    Parameter,
    /// Module-level global variable
    Global,
    /// Function item
    Function,
}

impl StorageKind {
    /// Whether the binding is a module item
    #[must_use]
    pub const fn is_item(self) -> bool {
        matches!(self, Self::Global | Self::Function)
    }
}

/// A declared name
#[derive(Debug, Clone, PartialEq)]
pub struct Binding<T> {
    /// Identifier
    pub id: BindingId,
    /// Unit the binding was declared in
    pub unit: UnitId,
    /// Name as written
    pub name: Symbol,
    /// Fully qualified name
    pub qualified: Symbol,
    /// Declared type
    pub ty: T,
    /// Storage kind
    pub storage: StorageKind,
    /// Declaration site
    pub span: FileSpan,
}
