//! Lexically scoped symbol table for one unit

use crate::{
    Binding, BindingId, ModuleIndex, ScopeEntry, ScopeId, ScopeKind, ScopeTree, StorageKind,
    SymbolError, UnitId,
};
use ac_intern::{Interner, Symbol};
use ac_span::FileSpan;

/// Scope chain of one unit, rooted at the unit's items
#[derive(Debug)]
pub struct SymbolTable<'idx, T> {
    index: &'idx ModuleIndex<T>,
    unit: UnitId,
    tree: ScopeTree,
    current: ScopeId,
    locals: Vec<Binding<T>>,
}

impl<'idx, T> SymbolTable<'idx, T> {
    /// Creates the table for `unit`; its root scope holds the unit's items
    #[must_use]
    pub fn for_unit(index: &'idx ModuleIndex<T>, unit: UnitId) -> Self {
        let mut tree = ScopeTree::new();
        let root = tree.root;
        for item in index.unit_items(unit) {
            let entry = ScopeEntry {
                binding: item.id,
                span: item.span,
            };
            // The index already rejects duplicate item names within a unit.
            let defined = tree.define(root, item.name, entry);
            debug_assert!(defined.is_ok());
        }

        Self {
            index,
            unit,
            tree,
            current: root,
            locals: Vec::new(),
        }
    }

    fn interner(&self) -> &'idx Interner {
        self.index.interner()
    }

    /// Unit this table resolves
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Scope new declarations go into
    #[must_use]
    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    /// Pushes an empty scope linked to the current one
    pub fn enter_scope(&mut self, kind: ScopeKind) -> ScopeId {
        self.current = self.tree.create_child(self.current, kind, None);
        self.current
    }

    /// Pushes the parameter scope of function `name`
    pub fn enter_function(&mut self, name: Symbol) -> ScopeId {
        self.current = self
            .tree
            .create_child(self.current, ScopeKind::Function, Some(name));
        self.current
    }

    /// Pops the current scope
    pub fn exit_scope(&mut self) {
        let parent = self.tree.get_scope(self.current).parent;
        debug_assert!(parent.is_some(), "exit_scope called on the unit scope");
        if let Some(parent) = parent {
            self.current = parent;
        }
    }

    /// Declares a local or parameter in the current scope
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::DuplicateDeclaration` if the current scope
    /// already binds `name`. Bindings of enclosing scopes are shadowed.
    pub fn declare(
        &mut self,
        name: &str,
        ty: T,
        storage: StorageKind,
        span: FileSpan,
    ) -> Result<BindingId, SymbolError> {
        let interner = self.interner();
        let sym = interner.intern(name);
        let id = BindingId::Local {
            unit: self.unit,
            index: self.locals.len() as u32,
        };

        self.tree
            .define(self.current, sym, ScopeEntry { binding: id, span })
            .map_err(|existing| SymbolError::DuplicateDeclaration {
                name: name.to_string(),
                span,
                first: existing.span,
            })?;

        let unit_name = interner.resolve(&self.index.unit_name(self.unit));
        let qualified = match self.tree.owner(self.current) {
            Some(owner) => interner.qualify(&[unit_name, interner.resolve(&owner), name]),
            None => interner.qualify(&[unit_name, name]),
        };

        self.locals.push(Binding {
            id,
            unit: self.unit,
            name: sym,
            qualified,
            ty,
            storage,
            span,
        });
        Ok(id)
    }

    /// Resolves `name` from the current scope outward
    ///
    /// Names containing `::` are looked up in the module index instead.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::UnboundName` with spelling suggestions if no
    /// visible binding matches.
    pub fn resolve(&self, name: &str, span: FileSpan) -> Result<&Binding<T>, SymbolError> {
        if name.contains("::") {
            return self.index.lookup(name).ok_or_else(|| SymbolError::UnboundName {
                name: name.to_string(),
                span,
                suggestions: SymbolError::compute_suggestions(name, self.index.qualified_names()),
            });
        }

        let found = self
            .interner()
            .get(name)
            .and_then(|sym| self.tree.lookup(self.current, sym))
            .and_then(|entry| self.binding(entry.binding));

        found.ok_or_else(|| {
            let interner = self.interner();
            let visible = self.tree.visible_names(self.current);
            SymbolError::UnboundName {
                name: name.to_string(),
                span,
                suggestions: SymbolError::compute_suggestions(
                    name,
                    visible.iter().map(|sym| interner.resolve(sym)),
                ),
            }
        })
    }

    /// Looks up a binding by id
    #[must_use]
    pub fn binding(&self, id: BindingId) -> Option<&Binding<T>> {
        match id {
            BindingId::Item(_) => self.index.item(id),
            BindingId::Local { unit, index } if unit == self.unit => {
                self.locals.get(index as usize)
            }
            BindingId::Local { .. } => None,
        }
    }

    /// Whether a `while` body encloses the current scope
    #[must_use]
    pub fn in_loop(&self) -> bool {
        self.tree.in_loop(self.current)
    }

    /// Loop nesting depth of the current scope within its function
    #[must_use]
    pub fn loop_depth(&self) -> u32 {
        self.tree.loop_depth(self.current)
    }

    /// Locals declared so far, in declaration order
    #[must_use]
    pub fn locals(&self) -> &[Binding<T>] {
        &self.locals
    }

    /// Consumes the table and returns its locals for [`ModuleIndex::absorb`]
    #[must_use]
    pub fn into_locals(self) -> Vec<Binding<T>> {
        self.locals
    }
}
