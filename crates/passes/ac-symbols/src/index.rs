//! Module-level symbol index

use crate::{Binding, BindingId, SymbolError, StorageKind, UnitId};
use ac_intern::{Interner, Symbol};
use ac_span::FileSpan;
use indexmap::IndexMap;

/// Every declaration of a module keyed by fully qualified name
///
/// Items (`unit::name`) are declared during collection, before any unit is
/// resolved. Locals (`unit::function::name`) are absorbed after their unit has
/// been resolved; a function may shadow a name several times, so each
/// qualified local name maps to all of its bindings in declaration order.
#[derive(Debug, Clone)]
pub struct ModuleIndex<T> {
    interner: Interner,
    units: Vec<Symbol>,
    items: IndexMap<Symbol, Binding<T>>,
    locals: IndexMap<Symbol, Vec<Binding<T>>>,
}

impl<T> ModuleIndex<T> {
    /// Creates an empty index
    #[must_use]
    pub fn new(interner: Interner) -> Self {
        Self {
            interner,
            units: Vec::new(),
            items: IndexMap::new(),
            locals: IndexMap::new(),
        }
    }

    /// Interner shared by every unit of the module
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Registers a unit and returns its id
    pub fn add_unit(&mut self, name: &str) -> UnitId {
        let id = UnitId(self.units.len() as u32);
        self.units.push(self.interner.intern(name));
        id
    }

    /// Name of a registered unit
    #[must_use]
    pub fn unit_name(&self, unit: UnitId) -> Symbol {
        self.units[unit.0 as usize]
    }

    /// Looks up a unit by name
    #[must_use]
    pub fn unit_by_name(&self, name: &str) -> Option<UnitId> {
        let sym = self.interner.get(name)?;
        self.units
            .iter()
            .position(|unit| *unit == sym)
            .map(|idx| UnitId(idx as u32))
    }

    /// Declares a unit-level item
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::DuplicateDeclaration` if the unit already
    /// declares an item with that name.
    pub fn declare_item(
        &mut self,
        unit: UnitId,
        name: &str,
        ty: T,
        storage: StorageKind,
        span: FileSpan,
    ) -> Result<BindingId, SymbolError> {
        let unit_name = self.interner.resolve(&self.unit_name(unit)).to_string();
        let qualified = self.interner.qualify(&[&unit_name, name]);

        if let Some(existing) = self.items.get(&qualified) {
            return Err(SymbolError::DuplicateDeclaration {
                name: name.to_string(),
                span,
                first: existing.span,
            });
        }

        let id = BindingId::Item(self.items.len() as u32);
        let binding = Binding {
            id,
            unit,
            name: self.interner.intern(name),
            qualified,
            ty,
            storage,
            span,
        };
        self.items.insert(qualified, binding);
        Ok(id)
    }

    /// Looks up an item by qualified name
    #[must_use]
    pub fn lookup(&self, qualified: &str) -> Option<&Binding<T>> {
        let sym = self.interner.get(qualified)?;
        self.items.get(&sym)
    }

    /// Looks up an item by id
    #[must_use]
    pub fn item(&self, id: BindingId) -> Option<&Binding<T>> {
        match id {
            BindingId::Item(index) => self.items.get_index(index as usize).map(|(_, b)| b),
            BindingId::Local { .. } => None,
        }
    }

    /// All items in declaration order
    pub fn items(&self) -> impl Iterator<Item = &Binding<T>> {
        self.items.values()
    }

    /// Items declared by `unit`, in declaration order
    pub fn unit_items(&self, unit: UnitId) -> impl Iterator<Item = &Binding<T>> {
        self.items.values().filter(move |binding| binding.unit == unit)
    }

    /// Records the locals of a resolved unit
    pub fn absorb(&mut self, locals: impl IntoIterator<Item = Binding<T>>) {
        for binding in locals {
            self.locals.entry(binding.qualified).or_default().push(binding);
        }
    }

    /// Locals recorded under a qualified name, in declaration order
    #[must_use]
    pub fn locals(&self, qualified: &str) -> &[Binding<T>] {
        self.interner
            .get(qualified)
            .and_then(|sym| self.locals.get(&sym))
            .map_or(&[], Vec::as_slice)
    }

    /// Qualified names of every item, for suggestions
    pub fn qualified_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(|sym| self.interner.resolve(sym))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_item_reports_first_span() {
        let mut index = ModuleIndex::new(Interner::new());
        let unit = index.add_unit("main");
        let first = FileSpan::default();
        let second = FileSpan::new(ac_span::FileId(0), ac_span::Span::new(4, 8));

        index
            .declare_item(unit, "x", (), StorageKind::Global, first)
            .unwrap();
        let err = index
            .declare_item(unit, "x", (), StorageKind::Global, second)
            .unwrap_err();

        assert_eq!(
            err,
            SymbolError::DuplicateDeclaration {
                name: "x".into(),
                span: second,
                first,
            }
        );
    }

    #[test]
    fn test_same_name_in_two_units() {
        let mut index = ModuleIndex::new(Interner::new());
        let math = index.add_unit("math");
        let main = index.add_unit("main");

        let a = index
            .declare_item(math, "add", 1, StorageKind::Function, FileSpan::default())
            .unwrap();
        let b = index
            .declare_item(main, "add", 2, StorageKind::Function, FileSpan::default())
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(index.lookup("math::add").map(|b| b.ty), Some(1));
        assert_eq!(index.item(b).map(|b| b.unit), Some(main));
        assert_eq!(index.unit_items(math).count(), 1);
        assert_eq!(index.unit_by_name("main"), Some(main));
    }

    #[test]
    fn test_absorb_keeps_shadowed_locals() {
        let interner = Interner::new();
        let mut index: ModuleIndex<()> = ModuleIndex::new(interner.clone());
        let unit = index.add_unit("main");
        let qualified = interner.qualify(&["main", "f", "x"]);
        let local = |index| Binding {
            id: BindingId::Local { unit, index },
            unit,
            name: interner.intern("x"),
            qualified,
            ty: (),
            storage: StorageKind::Local,
            span: FileSpan::default(),
        };

        index.absorb([local(0), local(1)]);
        assert_eq!(index.locals("main::f::x").len(), 2);
        assert!(index.locals("main::f::y").is_empty());
    }
}
