//! Module-wide item collection
//!
//! Before any function body is checked, every unit's items are entered into
//! one [`Declarations`] table: struct names first, then type aliases, struct
//! fields, and finally the signatures of globals and functions. Bodies are
//! then checked against this table, possibly in parallel.

use crate::error::TypeError;
use crate::ty::{FieldDef, StructDef, StructId, Ty, TyDisplay};
use ac_ast::{FunctionDecl, GlobalDecl, Item, Literal, SourceUnit, StructDecl, TypeExpr};
use ac_intern::{Interner, Symbol};
use ac_span::FileSpan;
use ac_symbols::{BindingId, ModuleIndex, StorageKind, UnitId};
use indexmap::IndexMap;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

/// Signature and linkage of a function item
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionItem {
    /// Binding of the function in the module index
    pub binding: BindingId,
    /// Declaring unit
    pub unit: UnitId,
    /// Position of the declaration in its unit's item list
    pub item_index: usize,
    /// Qualified name (`unit::name`)
    pub name: String,
    /// Parameter types
    pub params: Vec<Ty>,
    /// Return type
    pub ret: Ty,
    /// Accepts extra arguments
    pub varargs: bool,
    /// Linker symbol requested through `@mangle_as`
    pub link_name: Option<String>,
    /// Declared without a body
    pub is_extern: bool,
    /// Declaration site
    pub span: FileSpan,
}

impl FunctionItem {
    /// Function type of the item
    #[must_use]
    pub fn ty(&self) -> Ty {
        Ty::function(self.params.clone(), self.ret.clone(), self.varargs)
    }
}

/// Global variable item
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalItem {
    /// Binding of the global in the module index
    pub binding: BindingId,
    /// Declaring unit
    pub unit: UnitId,
    /// Qualified name (`unit::name`)
    pub name: String,
    /// Declared type
    pub ty: Ty,
    /// Constant initializer
    pub init: Option<Literal>,
    /// Declaration site
    pub span: FileSpan,
}

/// Every item of a module, with resolved signatures
#[derive(Debug, Clone)]
pub struct Declarations {
    /// Module-level symbol index
    pub index: ModuleIndex<Ty>,
    /// Declared structs, indexed by [`StructId`]
    pub structs: Vec<StructDef>,
    /// Function items in declaration order
    pub functions: IndexMap<BindingId, FunctionItem>,
    /// Global items in declaration order
    pub globals: IndexMap<BindingId, GlobalItem>,
    types: FxHashMap<Symbol, Ty>,
    type_spans: FxHashMap<Symbol, FileSpan>,
    by_item: FxHashMap<(UnitId, usize), BindingId>,
    errors: Vec<Vec<TypeError>>,
}

impl Declarations {
    /// Collects the items of all `units`
    ///
    /// Unit `i` of the slice gets `UnitId(i)`. Errors are recorded per unit
    /// and reported again by [`TypeResolver::resolve`](crate::TypeResolver::resolve).
    #[must_use]
    pub fn collect(interner: &Interner, units: &[SourceUnit]) -> Self {
        let mut decls = Self {
            index: ModuleIndex::new(interner.clone()),
            structs: Vec::new(),
            functions: IndexMap::new(),
            globals: IndexMap::new(),
            types: FxHashMap::default(),
            type_spans: FxHashMap::default(),
            by_item: FxHashMap::default(),
            errors: vec![Vec::new(); units.len()],
        };
        let unit_ids: Vec<UnitId> = units
            .iter()
            .map(|unit| decls.index.add_unit(&unit.name))
            .collect();

        let mut collector = Collector {
            decls,
            aliases: IndexMap::new(),
            resolving: FxHashSet::default(),
        };
        collector.run(&unit_ids, units);

        let decls = collector.decls;
        debug!(
            "collected {} structs, {} functions, {} globals from {} units",
            decls.structs.len(),
            decls.functions.len(),
            decls.globals.len(),
            units.len()
        );
        decls
    }

    /// Collection errors of `unit`
    #[must_use]
    pub fn errors(&self, unit: UnitId) -> &[TypeError] {
        self.errors.get(unit.0 as usize).map_or(&[], Vec::as_slice)
    }

    /// Whether any unit failed collection
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|errors| !errors.is_empty())
    }

    /// Function declared at `item_index` of `unit`, unless it was rejected
    #[must_use]
    pub fn function_at(&self, unit: UnitId, item_index: usize) -> Option<&FunctionItem> {
        self.by_item
            .get(&(unit, item_index))
            .and_then(|binding| self.functions.get(binding))
    }

    /// Function item bound to `binding`
    #[must_use]
    pub fn function(&self, binding: BindingId) -> Option<&FunctionItem> {
        self.functions.get(&binding)
    }

    /// Global item bound to `binding`
    #[must_use]
    pub fn global(&self, binding: BindingId) -> Option<&GlobalItem> {
        self.globals.get(&binding)
    }

    /// Struct declaration
    #[must_use]
    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0 as usize]
    }

    /// Display adapter naming structs
    #[must_use]
    pub fn display<'a>(&'a self, ty: &'a Ty) -> TyDisplay<'a> {
        ty.display(&self.structs)
    }

    /// Resolves a type written inside `unit`
    ///
    /// # Errors
    ///
    /// Returns `TypeError::UnboundName` for an unknown type name.
    pub fn resolve_type(&self, unit: UnitId, expr: &TypeExpr) -> Result<Ty, TypeError> {
        lower_type_expr(expr, &mut |name, span| {
            self.lookup_type(unit, name)
                .ok_or_else(|| self.unbound_type(unit, name, span))
        })
    }

    fn qualify(&self, unit: UnitId, name: &str) -> String {
        if name.contains("::") {
            name.to_string()
        } else {
            let interner = self.index.interner();
            format!("{}::{name}", interner.resolve(&self.index.unit_name(unit)))
        }
    }

    fn lookup_type(&self, unit: UnitId, name: &str) -> Option<Ty> {
        if let Some(ty) = Ty::builtin(name) {
            return Some(ty);
        }
        let qualified = self.qualify(unit, name);
        let sym = self.index.interner().get(&qualified)?;
        self.types.get(&sym).cloned()
    }

    fn unbound_type(&self, unit: UnitId, name: &str, span: FileSpan) -> TypeError {
        let interner = self.index.interner();
        let prefix = format!("{}::", interner.resolve(&self.index.unit_name(unit)));
        let candidates: Vec<&str> = self
            .types
            .keys()
            .map(|sym| interner.resolve(sym))
            .map(|name| name.strip_prefix(&prefix).unwrap_or(name))
            .collect();
        TypeError::UnboundName {
            name: name.to_string(),
            span,
            suggestions: ac_symbols::SymbolError::compute_suggestions(name, candidates),
        }
    }
}

/// Type of a literal
///
/// # Errors
///
/// Returns `TypeError::TypeMismatch` for a width suffix no builtin type has
/// and for an integer that does not fit its signed width.
pub fn literal_type(literal: &Literal, span: FileSpan) -> Result<Ty, TypeError> {
    match literal {
        Literal::Int { value, bits } => match bits.unwrap_or(32) {
            bits @ (8 | 16 | 32 | 64) if int_fits(*value, bits) => Ok(Ty::Int { bits }),
            bits @ (8 | 16 | 32 | 64) => Err(TypeError::mismatch(
                format!("an integer that fits i{bits}"),
                value.to_string(),
                span,
            )),
            bits => Err(TypeError::mismatch("i8, i16, i32 or i64", format!("i{bits}"), span)),
        },
        Literal::Float { bits, .. } => match bits.unwrap_or(64) {
            bits @ (32 | 64) => Ok(Ty::Float { bits }),
            bits => Err(TypeError::mismatch("f32 or f64", format!("f{bits}"), span)),
        },
        Literal::Bool(_) => Ok(Ty::Bool),
        Literal::Unit => Ok(Ty::Unit),
        Literal::CString(_) => Ok(Ty::c_string()),
    }
}

fn int_fits(value: i64, bits: u8) -> bool {
    if bits >= 64 {
        return true;
    }
    let half = 1i64 << (bits - 1);
    (-half..half).contains(&value)
}

fn lower_type_expr(
    expr: &TypeExpr,
    named: &mut dyn FnMut(&str, FileSpan) -> Result<Ty, TypeError>,
) -> Result<Ty, TypeError> {
    match expr {
        TypeExpr::Named { name, span } => named(name, *span),
        TypeExpr::Pointer { pointee, .. } => Ok(Ty::ptr(lower_type_expr(pointee, named)?)),
        TypeExpr::Function {
            params,
            ret,
            varargs,
            ..
        } => {
            let params = params
                .iter()
                .map(|param| lower_type_expr(param, named))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = match ret {
                Some(ret) => lower_type_expr(ret, named)?,
                None => Ty::Unit,
            };
            Ok(Ty::function(params, ret, *varargs))
        }
    }
}

#[derive(Clone, Copy)]
struct PendingAlias<'a> {
    unit: UnitId,
    name: &'a str,
    ty: &'a TypeExpr,
    span: FileSpan,
}

struct Collector<'a> {
    decls: Declarations,
    aliases: IndexMap<Symbol, PendingAlias<'a>>,
    resolving: FxHashSet<Symbol>,
}

impl<'a> Collector<'a> {
    fn run(&mut self, unit_ids: &[UnitId], units: &'a [SourceUnit]) {
        let mut structs = Vec::new();

        for (&unit, source) in unit_ids.iter().zip(units) {
            for item in &source.items {
                match item {
                    Item::Struct(decl) => {
                        if let Some(id) = self.declare_struct(unit, decl) {
                            structs.push((unit, id, decl));
                        }
                    }
                    Item::TypeAlias(decl) => {
                        if let Some(sym) = self.declare_type_name(unit, &decl.name, decl.span) {
                            self.aliases.insert(
                                sym,
                                PendingAlias {
                                    unit,
                                    name: &decl.name,
                                    ty: &decl.ty,
                                    span: decl.span,
                                },
                            );
                        }
                    }
                    Item::Function(_) | Item::Global(_) => {}
                }
            }
        }

        let pending: Vec<Symbol> = self.aliases.keys().copied().collect();
        for sym in pending {
            self.resolve_alias(sym);
        }

        for &(unit, id, decl) in &structs {
            self.fill_struct(unit, id, decl);
        }
        let mut reported = FxHashSet::default();
        for &(unit, id, _) in &structs {
            if !reported.contains(&id) {
                reported.extend(self.check_struct_cycle(unit, id));
            }
        }

        for (&unit, source) in unit_ids.iter().zip(units) {
            for (item_index, item) in source.items.iter().enumerate() {
                match item {
                    Item::Global(decl) => self.declare_global(unit, decl),
                    Item::Function(decl) => self.declare_function(unit, item_index, decl),
                    Item::Struct(_) | Item::TypeAlias(_) => {}
                }
            }
        }
    }

    fn error(&mut self, unit: UnitId, error: TypeError) {
        self.decls.errors[unit.0 as usize].push(error);
    }

    fn declare_type_name(&mut self, unit: UnitId, name: &str, span: FileSpan) -> Option<Symbol> {
        let qualified = self.decls.qualify(unit, name);
        let sym = self.decls.index.interner().intern(&qualified);
        if let Some(first) = self.decls.type_spans.get(&sym) {
            let first = *first;
            self.error(
                unit,
                TypeError::DuplicateDeclaration {
                    name: name.to_string(),
                    span,
                    first,
                },
            );
            return None;
        }
        self.decls.type_spans.insert(sym, span);
        Some(sym)
    }

    fn declare_struct(&mut self, unit: UnitId, decl: &StructDecl) -> Option<StructId> {
        let sym = self.declare_type_name(unit, &decl.name, decl.span)?;
        let id = StructId(self.decls.structs.len() as u32);
        self.decls.structs.push(StructDef {
            name: self.decls.qualify(unit, &decl.name),
            fields: Vec::new(),
            span: decl.span,
        });
        self.decls.types.insert(sym, Ty::Aggregate(id));
        Some(id)
    }

    fn resolve_alias(&mut self, sym: Symbol) -> Ty {
        if let Some(ty) = self.decls.types.get(&sym) {
            return ty.clone();
        }
        let Some(alias) = self.aliases.get(&sym).copied() else {
            return Ty::Error;
        };
        if !self.resolving.insert(sym) {
            self.error(
                alias.unit,
                TypeError::CyclicType {
                    name: alias.name.to_string(),
                    span: alias.span,
                },
            );
            self.decls.types.insert(sym, Ty::Error);
            return Ty::Error;
        }

        let ty = self.lower(alias.unit, alias.ty);
        self.resolving.remove(&sym);
        // A cycle through this alias already recorded `Error` for it.
        self.decls.types.entry(sym).or_insert(ty).clone()
    }

    /// Lowers a type expression, resolving pending aliases on demand
    fn lower(&mut self, unit: UnitId, expr: &TypeExpr) -> Ty {
        let result = lower_type_expr(expr, &mut |name, span| {
            if let Some(ty) = self.decls.lookup_type(unit, name) {
                return Ok(ty);
            }
            let qualified = self.decls.qualify(unit, name);
            match self.decls.index.interner().get(&qualified) {
                Some(sym) if self.aliases.contains_key(&sym) => Ok(self.resolve_alias(sym)),
                _ => Err(self.decls.unbound_type(unit, name, span)),
            }
        });
        result.unwrap_or_else(|error| {
            self.error(unit, error);
            Ty::Error
        })
    }

    /// Lowers a type that must describe a storable value
    fn lower_value_type(&mut self, unit: UnitId, expr: &TypeExpr) -> Ty {
        let ty = self.lower(unit, expr);
        if ty.is_unit() {
            self.error(unit, TypeError::mismatch("a value type", "unit", expr.span()));
            return Ty::Error;
        }
        ty
    }

    fn fill_struct(&mut self, unit: UnitId, id: StructId, decl: &StructDecl) {
        let mut fields: Vec<FieldDef> = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            if let Some(first) = fields.iter().find(|f| f.name == field.name) {
                let first = first.span;
                self.error(
                    unit,
                    TypeError::DuplicateDeclaration {
                        name: field.name.clone(),
                        span: field.span,
                        first,
                    },
                );
                continue;
            }
            let ty = self.lower_value_type(unit, &field.ty);
            fields.push(FieldDef {
                name: field.name.clone(),
                ty,
                span: field.span,
            });
        }
        self.decls.structs[id.0 as usize].fields = fields;
    }

    /// Reports a struct that contains itself by value
    ///
    /// Returns every struct on the reported cycle so the other members are
    /// not reported again.
    fn check_struct_cycle(&mut self, unit: UnitId, id: StructId) -> Vec<StructId> {
        let reachable = self.reachable_by_value(id);
        if !reachable.contains(&id) {
            return Vec::new();
        }

        let def = &self.decls.structs[id.0 as usize];
        let error = TypeError::CyclicType {
            name: def.name.clone(),
            span: def.span,
        };
        self.error(unit, error);
        reachable
            .into_iter()
            .filter(|&member| self.reachable_by_value(member).contains(&id))
            .collect()
    }

    /// Structs nested by value in `id`, transitively
    fn reachable_by_value(&self, id: StructId) -> FxHashSet<StructId> {
        let mut stack = self.by_value_fields(id);
        let mut seen = FxHashSet::default();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.by_value_fields(next));
            }
        }
        seen
    }

    fn by_value_fields(&self, id: StructId) -> Vec<StructId> {
        self.decls.structs[id.0 as usize]
            .fields
            .iter()
            .filter_map(|field| match field.ty {
                Ty::Aggregate(inner) => Some(inner),
                _ => None,
            })
            .collect()
    }

    fn declare_global(&mut self, unit: UnitId, decl: &GlobalDecl) {
        let ty = self.lower_value_type(unit, &decl.ty);
        if let Some(init) = &decl.init {
            match literal_type(init, decl.span) {
                Ok(init_ty) if !init_ty.is_assignable_to(&ty) => {
                    let expected = self.decls.display(&ty).to_string();
                    let found = self.decls.display(&init_ty).to_string();
                    self.error(unit, TypeError::mismatch(expected, found, decl.span));
                }
                Ok(_) => {}
                Err(error) => self.error(unit, error),
            }
        }

        match self
            .decls
            .index
            .declare_item(unit, &decl.name, ty.clone(), StorageKind::Global, decl.span)
        {
            Ok(binding) => {
                let name = self.decls.qualify(unit, &decl.name);
                self.decls.globals.insert(
                    binding,
                    GlobalItem {
                        binding,
                        unit,
                        name,
                        ty,
                        init: decl.init.clone(),
                        span: decl.span,
                    },
                );
            }
            Err(error) => self.error(unit, error.into()),
        }
    }

    fn declare_function(&mut self, unit: UnitId, item_index: usize, decl: &FunctionDecl) {
        let params: Vec<Ty> = decl
            .params
            .iter()
            .map(|param| self.lower_value_type(unit, &param.ty))
            .collect();
        let ret = match &decl.return_type {
            Some(ret) => self.lower(unit, ret),
            None => Ty::Unit,
        };
        let varargs = decl.is_varargs();
        let ty = Ty::function(params.clone(), ret.clone(), varargs);

        match self
            .decls
            .index
            .declare_item(unit, &decl.name, ty, StorageKind::Function, decl.span)
        {
            Ok(binding) => {
                let name = self.decls.qualify(unit, &decl.name);
                self.decls.by_item.insert((unit, item_index), binding);
                self.decls.functions.insert(
                    binding,
                    FunctionItem {
                        binding,
                        unit,
                        item_index,
                        name,
                        params,
                        ret,
                        varargs,
                        link_name: decl.mangle_override().map(str::to_string),
                        is_extern: decl.is_extern(),
                        span: decl.span,
                    },
                );
            }
            Err(error) => self.error(unit, error.into()),
        }
    }
}
