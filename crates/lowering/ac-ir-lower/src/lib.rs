//! Typed AST → SSA IR lowering
//!
//! Lowering runs in two steps. [`declare_items`] reserves a module slot for
//! every struct, global and function of the module, so bodies can refer to
//! items defined in any unit. [`lower_unit`] then turns each checked function
//! body of a unit into a [`FunctionBody`]. Both assume the resolver accepted
//! the input; a violated assumption is a compiler bug and panics.

mod context;
pub mod types;

use ac_ast::Literal;
use ac_ir::{Constant, FuncId, FunctionBody, GlobalId, GlobalInit, LayoutId, ModuleBuilder, ModuleError};
use ac_span::FileSpan;
use ac_symbols::{BindingId, UnitId};
use ac_ty::{Declarations, ResolvedAst, ResolvedFunction, StructId, Ty};
use log::debug;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::context::LoweringContext;
pub use crate::types::{lower_sig, lower_type};

/// Module slot of every item, keyed the way the resolver refers to them
#[derive(Debug, Clone, Default)]
pub struct ItemMap {
    layouts: Vec<LayoutId>,
    functions: FxHashMap<BindingId, FuncId>,
    globals: FxHashMap<BindingId, GlobalId>,
}

impl ItemMap {
    /// Layout of a struct
    ///
    /// # Panics
    ///
    /// Panics if the struct was never declared.
    #[must_use]
    pub fn layout(&self, id: StructId) -> LayoutId {
        match self.layouts.get(id.0 as usize) {
            Some(layout) => *layout,
            None => panic!("COMPILER BUG: struct#{} has no layout", id.0),
        }
    }

    /// Slot of a function item
    #[must_use]
    pub fn function(&self, binding: BindingId) -> Option<FuncId> {
        self.functions.get(&binding).copied()
    }

    /// Slot of a global item
    #[must_use]
    pub fn global(&self, binding: BindingId) -> Option<GlobalId> {
        self.globals.get(&binding).copied()
    }
}

/// An item the module builder refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct DeclareError {
    /// Builder error
    pub error: ModuleError,
    /// Declaring unit
    pub unit: UnitId,
    /// Declaration site
    pub span: FileSpan,
}

/// Reserves module slots for every item in `decls`
///
/// Structs are declared first, in collection order, then globals, then
/// functions. Declarations must be free of collection errors.
///
/// # Errors
///
/// Returns every declaration the builder rejected, typically link symbol
/// clashes such as two units both defining `main`.
pub fn declare_items(
    decls: &Declarations,
    module: &mut ModuleBuilder,
) -> Result<ItemMap, Vec<DeclareError>> {
    let base = module.next_layout().0;
    let mut items = ItemMap {
        layouts: (0..decls.structs.len() as u32)
            .map(|offset| LayoutId(base + offset))
            .collect(),
        ..ItemMap::default()
    };
    let mut errors = Vec::new();

    for def in &decls.structs {
        let fields = def
            .fields
            .iter()
            .map(|field| lower_type(&field.ty, &items))
            .collect();
        if let Err(error) = module.declare_struct(&def.name, fields) {
            panic!("COMPILER BUG: collected struct rejected: {error}");
        }
    }

    for global in decls.globals.values() {
        let ty = lower_type(&global.ty, &items);
        let init = global_init(global.init.as_ref(), &global.ty);
        match module.declare_global(&global.name, ty, init) {
            Ok(id) => {
                items.globals.insert(global.binding, id);
            }
            Err(error) => errors.push(DeclareError {
                error,
                unit: global.unit,
                span: global.span,
            }),
        }
    }

    for function in decls.functions.values() {
        let sig = lower_sig(&function.params, &function.ret, function.varargs, &items);
        let declared = if function.is_extern {
            let bare = function
                .name
                .rsplit("::")
                .next()
                .unwrap_or(&function.name);
            let symbol = function.link_name.as_deref().unwrap_or(bare);
            module.declare_extern(&function.name, sig, symbol)
        } else if let Some(symbol) = &function.link_name {
            module.new_function_with_symbol(&function.name, sig, symbol)
        } else {
            module.new_function(&function.name, sig)
        };
        match declared {
            Ok(id) => {
                items.functions.insert(function.binding, id);
            }
            Err(error) => errors.push(DeclareError {
                error,
                unit: function.unit,
                span: function.span,
            }),
        }
    }

    if errors.is_empty() {
        Ok(items)
    } else {
        Err(errors)
    }
}

fn global_init(init: Option<&Literal>, ty: &Ty) -> GlobalInit {
    match init {
        None | Some(Literal::Unit) => GlobalInit::Zero,
        Some(Literal::Int { value, .. }) => GlobalInit::Const(Constant::Int(*value)),
        Some(Literal::Float { value, .. }) => {
            GlobalInit::Const(Constant::Float(types::float_constant(*value, ty)))
        }
        Some(Literal::Bool(value)) => GlobalInit::Const(Constant::Bool(*value)),
        Some(Literal::CString(text)) => GlobalInit::CString(text.clone()),
    }
}

/// Lowers one checked function
///
/// # Panics
///
/// Panics if the function was not declared through [`declare_items`] or the
/// resolver output is inconsistent.
#[must_use]
pub fn lower_function(
    decls: &Declarations,
    items: &ItemMap,
    resolved: &ResolvedAst<'_>,
    function: &ResolvedFunction,
) -> FunctionBody {
    let Some(body) = resolved.decl(function).and_then(|decl| decl.body.as_ref()) else {
        panic!("COMPILER BUG: function {} has no body", function.binding);
    };
    let Some(item) = decls.function(function.binding) else {
        panic!("COMPILER BUG: function {} was not collected", function.binding);
    };
    let sig = lower_sig(&item.params, &item.ret, item.varargs, items);

    let lowered = LoweringContext::new(items, function, body, &sig).lower_function();
    debug!(
        "lowered {}: {} blocks, {} instructions",
        item.name,
        lowered.blocks.len(),
        lowered.instruction_count()
    );
    lowered
}

/// Lowers every checked function of a unit, in declaration order
///
/// # Panics
///
/// Panics under the same conditions as [`lower_function`].
#[must_use]
pub fn lower_unit(
    decls: &Declarations,
    items: &ItemMap,
    resolved: &ResolvedAst<'_>,
) -> Vec<(FuncId, FunctionBody)> {
    resolved
        .functions
        .iter()
        .map(|function| {
            let Some(id) = items.function(function.binding) else {
                panic!("COMPILER BUG: function {} has no module slot", function.binding);
            };
            (id, lower_function(decls, items, resolved, function))
        })
        .collect()
}
