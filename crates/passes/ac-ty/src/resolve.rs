//! Body checking
//!
//! [`TypeResolver::resolve`] walks every function body of one unit in a single
//! post-order pass. Besides the type of every expression it records what the
//! lowering engine needs to stay a straight translation: which binding each
//! name refers to, which implicit widenings to insert, which expressions never
//! complete, and which locals must live in memory.

use crate::collect::{literal_type, Declarations, FunctionItem};
use crate::error::TypeError;
use crate::ty::{StructId, Ty};
use ac_ast::{
    BinaryOp, Body, Expr, ExprId, FieldInit, FunctionDecl, Item, Literal, SourceUnit, Stmt, StmtId,
    TypeExpr, UnaryOp,
};
use ac_span::FileSpan;
use ac_symbols::{Binding, BindingId, ScopeKind, StorageKind, SymbolTable, UnitId};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

/// Field access resolved to a position in a struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    /// Struct being accessed
    pub struct_id: StructId,
    /// Field position in the struct layout
    pub index: usize,
    /// The base expression is a pointer to the struct
    pub through_pointer: bool,
}

/// Struct literal resolved against its declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLiteralRef {
    /// Struct being built
    pub struct_id: StructId,
    /// Layout position of each initializer, in source order
    pub positions: Vec<usize>,
}

/// Side tables of one checked function
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFunction {
    /// Binding of the function item
    pub binding: BindingId,
    /// Position of the declaration in the unit's item list
    pub item_index: usize,
    /// Parameter bindings in order
    pub params: Vec<BindingId>,
    /// Declared return type
    pub ret: Ty,
    /// Type of every expression, indexed by [`ExprId`]
    pub expr_types: Vec<Ty>,
    /// Binding each variable reference resolved to
    pub refs: FxHashMap<ExprId, BindingId>,
    /// Binding introduced by each `let`
    pub lets: FxHashMap<StmtId, BindingId>,
    /// Declared type of every parameter and local
    pub local_types: FxHashMap<BindingId, Ty>,
    /// Locals and parameters that need a stack slot
    pub memory_resident: FxHashSet<BindingId>,
    /// Widening to apply to an expression's value where it is used
    pub coercions: FxHashMap<ExprId, Ty>,
    /// Resolved field accesses
    pub fields: FxHashMap<ExprId, FieldRef>,
    /// Resolved struct literals
    pub struct_literals: FxHashMap<ExprId, StructLiteralRef>,
    /// Expressions after which control never continues
    pub diverging: FxHashSet<ExprId>,
    /// `while` loops whose condition is the literal `true`
    pub infinite_loops: FxHashSet<ExprId>,
}

impl ResolvedFunction {
    /// Type of an expression
    #[must_use]
    pub fn ty(&self, expr: ExprId) -> &Ty {
        &self.expr_types[expr.index()]
    }

    /// Whether control never continues after `expr`
    #[must_use]
    pub fn diverges(&self, expr: ExprId) -> bool {
        self.diverging.contains(&expr)
    }

    /// Type the value of `expr` must be widened to, if any
    #[must_use]
    pub fn coercion(&self, expr: ExprId) -> Option<&Ty> {
        self.coercions.get(&expr)
    }

    /// Whether `binding` lives in a stack slot
    #[must_use]
    pub fn is_memory_resident(&self, binding: BindingId) -> bool {
        self.memory_resident.contains(&binding)
    }
}

/// Checked unit, ready for lowering
#[derive(Debug, Clone)]
pub struct ResolvedAst<'a> {
    /// Unit id
    pub unit: UnitId,
    /// The unit's syntax tree
    pub source: &'a SourceUnit,
    /// Checked functions with bodies, in declaration order
    pub functions: Vec<ResolvedFunction>,
    /// Every parameter and local declared in the unit
    pub locals: Vec<Binding<Ty>>,
}

impl ResolvedAst<'_> {
    /// Declaration of a checked function
    #[must_use]
    pub fn decl(&self, function: &ResolvedFunction) -> Option<&FunctionDecl> {
        match self.source.items.get(function.item_index) {
            Some(Item::Function(decl)) => Some(decl),
            _ => None,
        }
    }
}

/// Checks the function bodies of a unit against module declarations
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver<'d> {
    decls: &'d Declarations,
}

impl<'d> TypeResolver<'d> {
    /// Creates a resolver over collected declarations
    #[must_use]
    pub fn new(decls: &'d Declarations) -> Self {
        Self { decls }
    }

    /// Checks every function body of `source`
    ///
    /// # Errors
    ///
    /// Returns every collection and body error of the unit, in source order
    /// per function. A unit with any error must not be lowered.
    pub fn resolve<'a>(
        &self,
        unit: UnitId,
        source: &'a SourceUnit,
    ) -> Result<ResolvedAst<'a>, Vec<TypeError>> {
        let mut errors = self.decls.errors(unit).to_vec();
        let mut table = SymbolTable::for_unit(&self.decls.index, unit);
        let mut functions = Vec::new();

        for (item_index, decl) in source.functions() {
            let Some(body) = &decl.body else {
                continue;
            };
            // Rejected duplicates have no item; their error is already recorded.
            let Some(item) = self.decls.function_at(unit, item_index) else {
                continue;
            };

            let mut checker = FunctionChecker::new(self.decls, &mut table, item, body);
            checker.check(decl);
            let (function, function_errors) = checker.finish();
            trace!(
                "checked {}: {} expressions, {} errors",
                item.name,
                body.exprs.len(),
                function_errors.len()
            );
            errors.extend(function_errors);
            functions.push(function);
        }

        if !errors.is_empty() {
            debug!("unit {} failed with {} errors", source.name, errors.len());
            return Err(errors);
        }
        Ok(ResolvedAst {
            unit,
            source,
            functions,
            locals: table.into_locals(),
        })
    }
}

/// Where an assignable expression stores its value
enum PlaceRoot {
    /// A local or parameter, possibly through fields of it
    Binding(BindingId),
    /// Memory reached through a pointer or a global
    Memory,
    /// Not a storage location
    NotAPlace,
}

struct LoopFrame {
    has_break: bool,
}

struct FunctionChecker<'d, 't, 'b> {
    decls: &'d Declarations,
    table: &'t mut SymbolTable<'d, Ty>,
    item: &'d FunctionItem,
    body: &'b Body,
    out: ResolvedFunction,
    errors: Vec<TypeError>,
    decl_depth: FxHashMap<BindingId, u32>,
    loops: Vec<LoopFrame>,
}

impl<'d, 't, 'b> FunctionChecker<'d, 't, 'b> {
    fn new(
        decls: &'d Declarations,
        table: &'t mut SymbolTable<'d, Ty>,
        item: &'d FunctionItem,
        body: &'b Body,
    ) -> Self {
        let out = ResolvedFunction {
            binding: item.binding,
            item_index: item.item_index,
            params: Vec::with_capacity(item.params.len()),
            ret: item.ret.clone(),
            expr_types: vec![Ty::Error; body.exprs.len()],
            refs: FxHashMap::default(),
            lets: FxHashMap::default(),
            local_types: FxHashMap::default(),
            memory_resident: FxHashSet::default(),
            coercions: FxHashMap::default(),
            fields: FxHashMap::default(),
            struct_literals: FxHashMap::default(),
            diverging: FxHashSet::default(),
            infinite_loops: FxHashSet::default(),
        };
        Self {
            decls,
            table,
            item,
            body,
            out,
            errors: Vec::new(),
            decl_depth: FxHashMap::default(),
            loops: Vec::new(),
        }
    }

    fn finish(self) -> (ResolvedFunction, Vec<TypeError>) {
        (self.out, self.errors)
    }

    fn unit(&self) -> UnitId {
        self.item.unit
    }

    fn show(&self, ty: &Ty) -> String {
        self.decls.display(ty).to_string()
    }

    fn mismatch(&mut self, expected: &Ty, found: &Ty, span: FileSpan) {
        let error = TypeError::mismatch(self.show(expected), self.show(found), span);
        self.errors.push(error);
    }

    fn span(&self, expr: ExprId) -> FileSpan {
        self.body[expr].span()
    }

    fn diverges(&self, expr: ExprId) -> bool {
        self.out.diverging.contains(&expr)
    }

    /// Records an implicit widening of `expr` from `from` to `to`
    fn coerce(&mut self, expr: ExprId, from: &Ty, to: &Ty) {
        if from.widens_to(to) {
            self.out.coercions.insert(expr, to.clone());
        }
    }

    /// Checks that `expr` of type `found` fits `expected` and records the widening
    ///
    /// A mismatch is reported at `site`, the node that demands the type.
    fn expect_assignable(&mut self, expr: ExprId, found: &Ty, expected: &Ty, site: FileSpan) {
        if found.is_assignable_to(expected) {
            self.coerce(expr, found, expected);
        } else {
            self.mismatch(expected, found, site);
        }
    }

    fn declare_local(
        &mut self,
        name: &str,
        ty: Ty,
        storage: StorageKind,
        span: FileSpan,
    ) -> Option<BindingId> {
        match self.table.declare(name, ty.clone(), storage, span) {
            Ok(binding) => {
                self.out.local_types.insert(binding, ty);
                self.decl_depth.insert(binding, self.table.loop_depth());
                Some(binding)
            }
            Err(error) => {
                self.errors.push(error.into());
                None
            }
        }
    }

    fn check(&mut self, decl: &FunctionDecl) {
        let name = self.decls.index.interner().intern(&decl.name);
        self.table.enter_function(name);

        let item = self.item;
        for (param, ty) in decl.params.iter().zip(&item.params) {
            if let Some(binding) =
                self.declare_local(&param.name, ty.clone(), StorageKind::Parameter, param.span)
            {
                self.out.params.push(binding);
            }
        }

        let root = self.body.root;
        let found = self.infer_expr(root);
        if !self.diverges(root) {
            let ret = self.item.ret.clone();
            if found.is_assignable_to(&ret) {
                self.coerce(root, &found, &ret);
            } else {
                // A non-unit function whose body can reach its end without a
                // value also lands here, with `found` being unit.
                let span = match &self.body[root] {
                    Expr::Block { tail: Some(tail), .. } => self.span(*tail),
                    _ => decl.span,
                };
                self.errors.push(TypeError::ReturnTypeMismatch {
                    expected: self.show(&ret),
                    found: self.show(&found),
                    span,
                });
            }
        }

        self.table.exit_scope();
    }

    fn infer_expr(&mut self, id: ExprId) -> Ty {
        let (ty, diverges) = self.infer_expr_kind(id);
        if diverges {
            self.out.diverging.insert(id);
        }
        self.out.expr_types[id.index()] = ty.clone();
        ty
    }

    #[allow(clippy::too_many_lines)]
    fn infer_expr_kind(&mut self, id: ExprId) -> (Ty, bool) {
        let body = self.body;
        match &body[id] {
            Expr::Literal { value, span } => match literal_type(value, *span) {
                Ok(ty) => (ty, false),
                Err(error) => {
                    self.errors.push(error);
                    (Ty::Error, false)
                }
            },

            Expr::Variable { name, span } => match self.table.resolve(name, *span) {
                Ok(binding) => {
                    let (binding_id, ty) = (binding.id, binding.ty.clone());
                    self.out.refs.insert(id, binding_id);
                    (ty, false)
                }
                Err(error) => {
                    self.errors.push(error.into());
                    (Ty::Error, false)
                }
            },

            Expr::Binary { op, lhs, rhs, span } => {
                let ty = self.infer_binary(*op, *lhs, *rhs, *span);
                let diverges = self.diverges(*lhs) || (!op.is_logical() && self.diverges(*rhs));
                (ty, diverges)
            }

            Expr::Unary { op, operand, .. } => {
                let ty = self.infer_unary(*op, *operand);
                (ty, self.diverges(*operand))
            }

            Expr::Call { callee, args, span } => {
                let ty = self.infer_call(*callee, args, *span);
                let diverges = self.diverges(*callee) || args.iter().any(|arg| self.diverges(*arg));
                (ty, diverges)
            }

            Expr::Assign { target, value, span } => {
                let target_ty = self.infer_expr(*target);
                let value_ty = self.infer_expr(*value);
                self.check_assignment_target(*target);
                self.expect_assignable(*value, &value_ty, &target_ty, *span);
                let diverges = self.diverges(*target) || self.diverges(*value);
                (target_ty, diverges)
            }

            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.infer_if(*condition, *then_branch, *else_branch),

            Expr::While { condition, body, .. } => {
                self.table.enter_scope(ScopeKind::Loop);
                self.loops.push(LoopFrame { has_break: false });
                let cond_ty = self.infer_expr(*condition);
                self.expect_bool(*condition, &cond_ty);
                self.infer_expr(*body);
                let frame = self.loops.pop();
                self.table.exit_scope();

                let infinite = matches!(
                    self.body[*condition],
                    Expr::Literal {
                        value: Literal::Bool(true),
                        ..
                    }
                );
                if infinite {
                    self.out.infinite_loops.insert(id);
                }
                let has_break = frame.is_some_and(|frame| frame.has_break);
                (Ty::Unit, (infinite || self.diverges(*condition)) && !has_break)
            }

            Expr::Block { stmts, tail, .. } => {
                self.table.enter_scope(ScopeKind::Block);
                let mut diverges = false;
                for stmt in stmts {
                    diverges |= self.check_stmt(*stmt);
                }
                let ty = match tail {
                    Some(tail) => {
                        let ty = self.infer_expr(*tail);
                        diverges |= self.diverges(*tail);
                        ty
                    }
                    None => Ty::Unit,
                };
                self.table.exit_scope();
                (ty, diverges)
            }

            Expr::Field { base, field, span } => {
                let base_ty = self.infer_expr(*base);
                let ty = self.infer_field(id, &base_ty, field, *span);
                (ty, self.diverges(*base))
            }

            Expr::StructLiteral { name, fields, span } => {
                let ty = self.infer_struct_literal(id, name, fields, *span);
                let diverges = fields.iter().any(|field| self.diverges(field.value));
                (ty, diverges)
            }

            Expr::Break { span } => {
                if self.table.in_loop() {
                    if let Some(frame) = self.loops.last_mut() {
                        frame.has_break = true;
                    }
                } else {
                    self.errors.push(TypeError::BreakOutsideLoop {
                        keyword: "break".into(),
                        span: *span,
                    });
                }
                (Ty::Unit, true)
            }

            Expr::Continue { span } => {
                if !self.table.in_loop() {
                    self.errors.push(TypeError::BreakOutsideLoop {
                        keyword: "continue".into(),
                        span: *span,
                    });
                }
                (Ty::Unit, true)
            }
        }
    }

    /// Checks a statement and returns whether control never continues past it
    fn check_stmt(&mut self, id: StmtId) -> bool {
        let body = self.body;
        match &body[id] {
            Stmt::Let {
                name,
                ty,
                init,
                span,
            } => {
                let annotated = ty.as_ref().map(|ty| self.resolve_annotation(ty));
                let init_ty = init.map(|init| (init, self.infer_expr(init)));

                let binding_ty = match (annotated, &init_ty) {
                    (Some(annotated), Some((init, init_ty))) => {
                        self.expect_assignable(*init, init_ty, &annotated, *span);
                        annotated
                    }
                    (Some(annotated), None) => annotated,
                    (None, Some((_, init_ty))) => init_ty.clone(),
                    (None, None) => {
                        self.errors.push(TypeError::mismatch(
                            "a type annotation or an initializer",
                            "neither",
                            *span,
                        ));
                        Ty::Error
                    }
                };

                // The initializer is checked before the name is in scope, so
                // `let x = x + 1;` reads the outer `x`.
                if let Some(binding) = self.declare_local(name, binding_ty, StorageKind::Local, *span) {
                    self.out.lets.insert(id, binding);
                }
                init.is_some_and(|init| self.diverges(init))
            }

            Stmt::Expr { expr, .. } => {
                self.infer_expr(*expr);
                self.diverges(*expr)
            }

            Stmt::Return { value, span } => {
                let ret = self.item.ret.clone();
                match value {
                    Some(value) => {
                        let found = self.infer_expr(*value);
                        if found.is_assignable_to(&ret) {
                            self.coerce(*value, &found, &ret);
                        } else {
                            self.errors.push(TypeError::ReturnTypeMismatch {
                                expected: self.show(&ret),
                                found: self.show(&found),
                                span: *span,
                            });
                        }
                    }
                    None if !ret.is_unit() && !ret.is_error() => {
                        self.errors.push(TypeError::ReturnTypeMismatch {
                            expected: self.show(&ret),
                            found: self.show(&Ty::Unit),
                            span: *span,
                        });
                    }
                    None => {}
                }
                true
            }
        }
    }

    fn resolve_annotation(&mut self, ty: &TypeExpr) -> Ty {
        match self.decls.resolve_type(self.unit(), ty) {
            Ok(ty) => ty,
            Err(error) => {
                self.errors.push(error);
                Ty::Error
            }
        }
    }

    fn expect_bool(&mut self, expr: ExprId, ty: &Ty) {
        if !matches!(ty, Ty::Bool | Ty::Error) {
            self.mismatch(&Ty::Bool, ty, self.span(expr));
        }
    }

    /// Unifies the operands of a binary operator whose operands must satisfy `accept`
    ///
    /// Errors are reported at `site`, the span of the whole binary expression.
    fn unify_operands(
        &mut self,
        lhs: (ExprId, &Ty),
        rhs: (ExprId, &Ty),
        accept: fn(&Ty) -> bool,
        what: &str,
        site: FileSpan,
    ) -> Ty {
        for (_, ty) in [lhs, rhs] {
            if !ty.is_error() && !accept(ty) {
                let error = TypeError::mismatch(what, self.show(ty), site);
                self.errors.push(error);
                return Ty::Error;
            }
        }

        match Ty::promote(lhs.1, rhs.1) {
            Some(common) => {
                self.coerce(lhs.0, lhs.1, &common);
                self.coerce(rhs.0, rhs.1, &common);
                common
            }
            None => {
                self.mismatch(lhs.1, rhs.1, site);
                Ty::Error
            }
        }
    }

    fn infer_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: FileSpan) -> Ty {
        let lhs_ty = self.infer_expr(lhs);
        let rhs_ty = self.infer_expr(rhs);

        if op.is_logical() {
            self.expect_bool(lhs, &lhs_ty);
            self.expect_bool(rhs, &rhs_ty);
            return Ty::Bool;
        }

        let operands = ((lhs, &lhs_ty), (rhs, &rhs_ty));
        if op.is_arithmetic() {
            self.unify_operands(operands.0, operands.1, Ty::is_numeric, "a numeric type", span)
        } else if op.is_bitwise() {
            self.unify_operands(operands.0, operands.1, Ty::is_int, "an integer type", span)
        } else {
            let common = if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                self.unify_operands(
                    operands.0,
                    operands.1,
                    |ty| ty.is_numeric() || matches!(ty, Ty::Bool | Ty::Ptr(_)),
                    "a numeric, boolean or pointer type",
                    span,
                )
            } else {
                self.unify_operands(operands.0, operands.1, Ty::is_numeric, "a numeric type", span)
            };
            if common.is_error() { Ty::Error } else { Ty::Bool }
        }
    }

    fn infer_unary(&mut self, op: UnaryOp, operand: ExprId) -> Ty {
        let ty = self.infer_expr(operand);
        if ty.is_error() {
            return Ty::Error;
        }
        let span = self.span(operand);
        match op {
            UnaryOp::Neg if ty.is_numeric() => ty,
            UnaryOp::Neg => {
                self.errors.push(TypeError::mismatch("a numeric type", self.show(&ty), span));
                Ty::Error
            }
            UnaryOp::Not if ty.is_int() || ty == Ty::Bool => ty,
            UnaryOp::Not => {
                self.errors
                    .push(TypeError::mismatch("bool or an integer type", self.show(&ty), span));
                Ty::Error
            }
            UnaryOp::Deref => match ty {
                Ty::Ptr(pointee) => *pointee,
                other => {
                    self.errors.push(TypeError::mismatch("a pointer", self.show(&other), span));
                    Ty::Error
                }
            },
            UnaryOp::AddrOf => {
                match self.place_root(operand) {
                    PlaceRoot::Binding(binding) => {
                        self.out.memory_resident.insert(binding);
                    }
                    PlaceRoot::Memory => {}
                    PlaceRoot::NotAPlace => {
                        self.errors.push(TypeError::NotAPlace { span });
                        return Ty::Error;
                    }
                }
                if ty.is_unit() {
                    self.errors.push(TypeError::mismatch("a value type", "unit", span));
                    return Ty::Error;
                }
                Ty::ptr(ty)
            }
        }
    }

    fn infer_call(&mut self, callee: ExprId, args: &[ExprId], span: FileSpan) -> Ty {
        let callee_ty = self.infer_expr(callee);
        let arg_tys: Vec<Ty> = args.iter().map(|arg| self.infer_expr(*arg)).collect();

        let Ty::Function {
            params,
            ret,
            varargs,
        } = &callee_ty
        else {
            if !callee_ty.is_error() {
                let error = TypeError::mismatch("a function", self.show(&callee_ty), self.span(callee));
                self.errors.push(error);
            }
            return Ty::Error;
        };

        if args.len() < params.len() || (!*varargs && args.len() > params.len()) {
            self.errors.push(TypeError::ArityMismatch {
                expected: params.len(),
                found: args.len(),
                span,
            });
        }

        for (idx, (arg, arg_ty)) in args.iter().zip(&arg_tys).enumerate() {
            match params.get(idx) {
                Some(param) => self.expect_assignable(*arg, arg_ty, param, self.span(*arg)),
                None if arg_ty.is_unit() => {
                    self.errors.push(TypeError::mismatch("a value type", "unit", self.span(*arg)));
                }
                None => {
                    // Extra arguments follow the C default argument promotions.
                    let promoted = match arg_ty {
                        Ty::Float { bits: 32 } => Ty::F64,
                        Ty::Int { bits } if *bits < 32 => Ty::I32,
                        Ty::Bool => Ty::I32,
                        _ => continue,
                    };
                    self.out.coercions.insert(*arg, promoted);
                }
            }
        }

        (**ret).clone()
    }

    /// Checks that an assignment target is a place and updates the storage plan
    fn check_assignment_target(&mut self, target: ExprId) {
        match self.place_root(target) {
            PlaceRoot::Binding(binding) => {
                if matches!(self.body[target], Expr::Variable { .. }) {
                    let declared_at = self.decl_depth.get(&binding).copied().unwrap_or(0);
                    if self.table.loop_depth() > declared_at {
                        self.out.memory_resident.insert(binding);
                    }
                } else {
                    self.out.memory_resident.insert(binding);
                }
            }
            PlaceRoot::Memory => {}
            PlaceRoot::NotAPlace => {
                let span = self.span(target);
                self.errors.push(TypeError::NotAPlace { span });
            }
        }
    }

    fn place_root(&self, expr: ExprId) -> PlaceRoot {
        match &self.body[expr] {
            Expr::Variable { .. } => match self.out.refs.get(&expr) {
                Some(binding) => match self.table.binding(*binding).map(|b| b.storage) {
                    Some(StorageKind::Local | StorageKind::Parameter) => PlaceRoot::Binding(*binding),
                    Some(StorageKind::Function) => PlaceRoot::NotAPlace,
                    Some(StorageKind::Global) | None => PlaceRoot::Memory,
                },
                // Unresolved; already reported.
                None => PlaceRoot::Memory,
            },
            Expr::Field { base, .. } => match self.out.ty(*base) {
                Ty::Ptr(_) | Ty::Error => PlaceRoot::Memory,
                _ => self.place_root(*base),
            },
            Expr::Unary {
                op: UnaryOp::Deref,
                ..
            } => PlaceRoot::Memory,
            _ => PlaceRoot::NotAPlace,
        }
    }

    fn infer_if(
        &mut self,
        condition: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    ) -> (Ty, bool) {
        let cond_ty = self.infer_expr(condition);
        self.expect_bool(condition, &cond_ty);
        let then_ty = self.infer_expr(then_branch);
        let Some(else_branch) = else_branch else {
            return (Ty::Unit, self.diverges(condition));
        };
        let else_ty = self.infer_expr(else_branch);

        let then_falls = !self.diverges(then_branch);
        let else_falls = !self.diverges(else_branch);
        let ty = match (then_falls, else_falls) {
            (true, true) => match Ty::promote(&then_ty, &else_ty) {
                Some(common) => {
                    self.coerce(then_branch, &then_ty, &common);
                    self.coerce(else_branch, &else_ty, &common);
                    common
                }
                None => {
                    self.mismatch(&then_ty, &else_ty, self.span(else_branch));
                    Ty::Error
                }
            },
            (true, false) => then_ty,
            (false, true) => else_ty,
            (false, false) => Ty::Unit,
        };
        (ty, self.diverges(condition) || (!then_falls && !else_falls))
    }

    fn infer_field(&mut self, id: ExprId, base_ty: &Ty, field: &str, span: FileSpan) -> Ty {
        let (struct_id, through_pointer) = match base_ty {
            Ty::Aggregate(struct_id) => (*struct_id, false),
            Ty::Ptr(pointee) => match **pointee {
                Ty::Aggregate(struct_id) => (struct_id, true),
                _ => return self.unknown_field(base_ty, field, span),
            },
            Ty::Error => return Ty::Error,
            _ => return self.unknown_field(base_ty, field, span),
        };

        let decls = self.decls;
        match decls.struct_def(struct_id).field(field) {
            Some((index, def)) => {
                self.out.fields.insert(
                    id,
                    FieldRef {
                        struct_id,
                        index,
                        through_pointer,
                    },
                );
                def.ty.clone()
            }
            None => self.unknown_field(base_ty, field, span),
        }
    }

    fn unknown_field(&mut self, ty: &Ty, field: &str, span: FileSpan) -> Ty {
        self.errors.push(TypeError::UnknownField {
            ty: self.show(ty),
            field: field.to_string(),
            span,
        });
        Ty::Error
    }

    fn infer_struct_literal(
        &mut self,
        id: ExprId,
        name: &str,
        fields: &[FieldInit],
        span: FileSpan,
    ) -> Ty {
        let value_tys: Vec<Ty> = fields.iter().map(|init| self.infer_expr(init.value)).collect();

        let ty = self.resolve_annotation(&TypeExpr::named(name, span));
        let struct_id = match ty {
            Ty::Aggregate(struct_id) => struct_id,
            Ty::Error => return Ty::Error,
            other => {
                self.errors.push(TypeError::mismatch("a struct", self.show(&other), span));
                return Ty::Error;
            }
        };

        let decls = self.decls;
        let def = decls.struct_def(struct_id);
        let mut positions = Vec::with_capacity(fields.len());
        let mut seen: FxHashMap<usize, FileSpan> = FxHashMap::default();
        for (init, value_ty) in fields.iter().zip(&value_tys) {
            let Some((index, field)) = def.field(&init.name) else {
                self.unknown_field(&Ty::Aggregate(struct_id), &init.name, init.span);
                continue;
            };
            if let Some(first) = seen.insert(index, init.span) {
                self.errors.push(TypeError::DuplicateDeclaration {
                    name: init.name.clone(),
                    span: init.span,
                    first,
                });
                continue;
            }
            self.expect_assignable(init.value, value_ty, &field.ty, init.span);
            positions.push(index);
        }

        for (index, field) in def.fields.iter().enumerate() {
            if !seen.contains_key(&index) {
                self.errors.push(TypeError::mismatch(
                    format!("an initializer for field `{}`", field.name),
                    "none",
                    span,
                ));
            }
        }

        self.out
            .struct_literals
            .insert(id, StructLiteralRef { struct_id, positions });
        Ty::Aggregate(struct_id)
    }
}
