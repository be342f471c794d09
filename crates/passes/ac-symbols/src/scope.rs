//! Scope tree for name resolution

use crate::BindingId;
use ac_intern::Symbol;
use ac_span::FileSpan;
use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

/// Unique identifier for a scope
pub type ScopeId = Idx<Scope>;

/// Kind of scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Unit-level scope holding the unit's items
    Unit,
    /// Function scope holding the parameters
    Function,
    /// Block scope (inside `{ }`)
    Block,
    /// Body of a `while` loop
    Loop,
}

/// A name bound in one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Binding the name refers to
    pub binding: BindingId,
    /// Where it was declared
    pub span: FileSpan,
}

/// A single scope in the scope tree
#[derive(Debug, Clone)]
pub struct Scope {
    /// Parent scope (None for the unit scope)
    pub parent: Option<ScopeId>,
    /// Kind of scope
    pub kind: ScopeKind,
    /// Function that owns this scope, set on function scopes
    pub owner: Option<Symbol>,
    entries: FxHashMap<Symbol, ScopeEntry>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, kind: ScopeKind, owner: Option<Symbol>) -> Self {
        Self {
            parent,
            kind,
            owner,
            entries: FxHashMap::default(),
        }
    }

    /// Looks a name up in this scope only
    #[must_use]
    pub fn get(&self, name: Symbol) -> Option<ScopeEntry> {
        self.entries.get(&name).copied()
    }

    /// Names declared directly in this scope
    pub fn names(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.entries.keys().copied()
    }
}

/// Scope tree for name resolution
///
/// Scopes are never freed while the tree lives; leaving a scope only moves
/// the cursor of the owning [`SymbolTable`](crate::SymbolTable) back to the
/// parent, which makes everything declared inside unreachable.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Arena<Scope>,
    /// Root scope
    pub root: ScopeId,
}

impl ScopeTree {
    /// Create a new scope tree with a unit scope
    #[must_use]
    pub fn new() -> Self {
        let mut scopes = Arena::new();
        let root = scopes.alloc(Scope::new(None, ScopeKind::Unit, None));
        Self { scopes, root }
    }

    /// Create a child scope
    pub fn create_child(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        owner: Option<Symbol>,
    ) -> ScopeId {
        self.scopes.alloc(Scope::new(Some(parent), kind, owner))
    }

    /// Define a name in a scope
    ///
    /// # Errors
    ///
    /// Returns the existing entry if the name is already defined in this
    /// scope. Outer scopes are not consulted, so shadowing is allowed.
    pub fn define(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        entry: ScopeEntry,
    ) -> Result<(), ScopeEntry> {
        let entries = &mut self.scopes[scope].entries;
        if let Some(existing) = entries.get(&name) {
            return Err(*existing);
        }
        entries.insert(name, entry);
        Ok(())
    }

    /// Resolve a name in a scope, walking up the scope chain
    #[must_use]
    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<ScopeEntry> {
        self.ancestors(scope)
            .find_map(|id| self.scopes[id].get(name))
    }

    /// Iterates from `scope` up to the root
    pub fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), |id| self.scopes[*id].parent)
    }

    /// Every name visible from `scope`
    #[must_use]
    pub fn visible_names(&self, scope: ScopeId) -> Vec<Symbol> {
        self.ancestors(scope)
            .flat_map(|id| self.scopes[id].names())
            .collect()
    }

    /// Whether a loop encloses `scope` without crossing a function boundary
    #[must_use]
    pub fn in_loop(&self, scope: ScopeId) -> bool {
        self.ancestors(scope)
            .map(|id| self.scopes[id].kind)
            .take_while(|kind| !matches!(kind, ScopeKind::Function | ScopeKind::Unit))
            .any(|kind| kind == ScopeKind::Loop)
    }

    /// Number of loop scopes between `scope` and its function scope
    #[must_use]
    pub fn loop_depth(&self, scope: ScopeId) -> u32 {
        self.ancestors(scope)
            .map(|id| self.scopes[id].kind)
            .take_while(|kind| !matches!(kind, ScopeKind::Function | ScopeKind::Unit))
            .filter(|kind| *kind == ScopeKind::Loop)
            .count() as u32
    }

    /// Function owning `scope`, if any
    #[must_use]
    pub fn owner(&self, scope: ScopeId) -> Option<Symbol> {
        self.ancestors(scope).find_map(|id| self.scopes[id].owner)
    }

    /// Get a scope by ID
    #[must_use]
    pub fn get_scope(&self, scope: ScopeId) -> &Scope {
        &self.scopes[scope]
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
