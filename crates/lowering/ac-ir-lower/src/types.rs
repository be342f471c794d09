//! Mapping of resolved types to IR types

use ac_ir::{FunctionSig, IrType};
use ac_ty::Ty;

use crate::ItemMap;

/// IR type of a resolved type
///
/// Unit maps to `void`; pointers and function values are both plain pointers.
///
/// # Panics
///
/// Panics on the error sentinel, which never survives a successful check.
#[must_use]
pub fn lower_type(ty: &Ty, items: &ItemMap) -> IrType {
    match ty {
        Ty::Int { bits } => IrType::Int(*bits),
        Ty::Float { bits } => IrType::Float(*bits),
        Ty::Bool => IrType::Bool,
        Ty::Unit => IrType::Void,
        Ty::Ptr(_) | Ty::Function { .. } => IrType::Ptr,
        Ty::Aggregate(id) => IrType::Struct(items.layout(*id)),
        Ty::Error => panic!("COMPILER BUG: error type reached lowering"),
    }
}

/// IR signature of a function type
#[must_use]
pub fn lower_sig(params: &[Ty], ret: &Ty, varargs: bool, items: &ItemMap) -> FunctionSig {
    FunctionSig::new(
        params.iter().map(|param| lower_type(param, items)).collect(),
        lower_type(ret, items),
    )
    .with_varargs(varargs)
}

/// Float constant rounded to the precision of `ty`
pub(crate) fn float_constant(value: f64, ty: &Ty) -> f64 {
    match ty {
        Ty::Float { bits: 32 } => f64::from(value as f32),
        _ => value,
    }
}
