//! Per-function lowering state

use ac_ast::{BinaryOp, Body, Expr, ExprId, FieldInit, Literal, Stmt, StmtId, UnaryOp};
use ac_ir::{
    BinOp, BlockId, Callee, CastKind, CmpOp, Constant, FunctionBody, FunctionBuilder, FunctionSig,
    IrType, UnOp, ValueId,
};
use ac_symbols::BindingId;
use ac_ty::{FieldRef, ResolvedFunction, Ty};
use indexmap::IndexMap;

use crate::types::{float_constant, lower_sig, lower_type};
use crate::ItemMap;

/// What a binding currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    /// SSA value
    Value(ValueId),
    /// Stack slot and the type stored in it
    Slot(ValueId, IrType),
    /// Unit-typed binding; nothing to hold
    Unit,
}

/// Result of lowering an expression that completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lowered {
    Value(ValueId),
    Unit,
}

type Env = IndexMap<BindingId, Bound>;

struct LoopTarget {
    header: BlockId,
    /// Created once the condition is lowered or on the first `break`
    exit: Option<BlockId>,
}

/// A branch that reaches a join point
struct Arm {
    block: BlockId,
    env: Env,
    value: Lowered,
    /// Still needs a jump to the join block
    open: bool,
}

/// Context for lowering one function body
///
/// Every `lower_*` method returns `None` when control does not continue past
/// the lowered code; the current block is then terminated.
pub(crate) struct LoweringContext<'ctx> {
    items: &'ctx ItemMap,
    function: &'ctx ResolvedFunction,
    body: &'ctx Body,
    builder: FunctionBuilder,
    env: Env,
    loops: Vec<LoopTarget>,
}

impl<'ctx> LoweringContext<'ctx> {
    pub(crate) fn new(
        items: &'ctx ItemMap,
        function: &'ctx ResolvedFunction,
        body: &'ctx Body,
        sig: &FunctionSig,
    ) -> Self {
        Self {
            items,
            function,
            body,
            builder: FunctionBuilder::new(sig),
            env: Env::default(),
            loops: Vec::new(),
        }
    }

    pub(crate) fn lower_function(mut self) -> FunctionBody {
        let function = self.function;
        for (index, binding) in function.params.iter().enumerate() {
            let value = self.builder.param(index);
            let ty = self.lower_type(self.local_type(*binding));
            let bound = if function.is_memory_resident(*binding) {
                let slot = self.builder.alloca(ty);
                self.builder.store(slot, value);
                Bound::Slot(slot, ty)
            } else {
                Bound::Value(value)
            };
            self.env.insert(*binding, bound);
        }

        let result = self.lower_expr(self.body.root);
        if !self.builder.is_terminated() {
            self.finish_body(result);
        }
        self.builder.finish()
    }

    fn finish_body(&mut self, result: Option<Lowered>) {
        let current = self.builder.current_block();
        if current != self.builder.entry_block() && self.builder.predecessors(current).is_empty() {
            self.builder.unreachable();
            return;
        }
        match (result, &self.function.ret) {
            (_, Ty::Unit) => self.builder.ret(None),
            (Some(Lowered::Value(value)), _) => self.builder.ret(Some(value)),
            _ => panic!(
                "COMPILER BUG: function {} reaches its end without a value",
                self.function.binding
            ),
        }
    }

    fn lower_type(&self, ty: &Ty) -> IrType {
        lower_type(ty, self.items)
    }

    fn local_type(&self, binding: BindingId) -> &'ctx Ty {
        match self.function.local_types.get(&binding) {
            Some(ty) => ty,
            None => panic!("COMPILER BUG: binding {binding} has no type"),
        }
    }

    fn binding_of(&self, expr: ExprId) -> BindingId {
        match self.function.refs.get(&expr) {
            Some(binding) => *binding,
            None => panic!("COMPILER BUG: unresolved variable at {}", expr.index()),
        }
    }

    fn field_ref(&self, expr: ExprId) -> FieldRef {
        match self.function.fields.get(&expr) {
            Some(field) => *field,
            None => panic!("COMPILER BUG: unresolved field access at {}", expr.index()),
        }
    }

    fn lower_expr(&mut self, id: ExprId) -> Option<Lowered> {
        match self.lower_expr_kind(id)? {
            Lowered::Value(value) => Some(Lowered::Value(self.coerce(id, value))),
            Lowered::Unit => Some(Lowered::Unit),
        }
    }

    fn lower_value(&mut self, id: ExprId) -> Option<ValueId> {
        match self.lower_expr(id)? {
            Lowered::Value(value) => Some(value),
            Lowered::Unit => panic!("COMPILER BUG: unit expression used as a value"),
        }
    }

    /// Applies the widening recorded for `id`, folding constants
    fn coerce(&mut self, id: ExprId, value: ValueId) -> ValueId {
        let Some(target) = self.function.coercion(id) else {
            return value;
        };
        let to = self.lower_type(target);
        match (self.builder.as_constant(value).cloned(), to) {
            (Some(Constant::Int(n)), IrType::Int(bits)) => self.builder.const_int(n, bits),
            (Some(Constant::Bool(b)), IrType::Int(bits)) => {
                self.builder.const_int(i64::from(b), bits)
            }
            (Some(Constant::Float(x)), IrType::Float(_)) => {
                self.builder.constant(Constant::Float(x), to)
            }
            (_, IrType::Int(_)) if self.builder.value_type(value) == IrType::Bool => {
                self.builder.cast(CastKind::ZExt, value, to)
            }
            (_, IrType::Int(_)) => self.builder.cast(CastKind::SExt, value, to),
            (_, IrType::Float(_)) => self.builder.cast(CastKind::FpExt, value, to),
            _ => panic!("COMPILER BUG: no widening to {to:?}"),
        }
    }

    fn lower_expr_kind(&mut self, id: ExprId) -> Option<Lowered> {
        let body = self.body;
        match &body[id] {
            Expr::Literal { value, .. } => Some(self.lower_literal(id, value)),
            Expr::Variable { .. } => Some(self.lower_variable(id)),
            Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, *lhs, *rhs),
            Expr::Unary { op, operand, .. } => self.lower_unary(id, *op, *operand),
            Expr::Call { callee, args, .. } => self.lower_call(*callee, args),
            Expr::Assign { target, value, .. } => self.lower_assign(*target, *value),
            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.lower_if(id, *condition, *then_branch, *else_branch),
            Expr::While {
                condition,
                body: loop_body,
                ..
            } => self.lower_while(id, *condition, *loop_body),
            Expr::Block { stmts, tail, .. } => self.lower_block(stmts, *tail),
            Expr::Field { base, .. } => self.lower_field(id, *base),
            Expr::StructLiteral { fields, .. } => self.lower_struct_literal(id, fields),
            Expr::Break { .. } => {
                let exit = self.loop_exit();
                self.builder.jump(exit);
                None
            }
            Expr::Continue { .. } => {
                let Some(target) = self.loops.last() else {
                    panic!("COMPILER BUG: continue outside of a loop");
                };
                let header = target.header;
                self.builder.jump(header);
                None
            }
        }
    }

    fn lower_literal(&mut self, id: ExprId, literal: &Literal) -> Lowered {
        let ty = self.function.ty(id);
        let value = match literal {
            Literal::Int { value, .. } => {
                let ir = self.lower_type(ty);
                self.builder.constant(Constant::Int(*value), ir)
            }
            Literal::Float { value, .. } => {
                let ir = self.lower_type(ty);
                self.builder
                    .constant(Constant::Float(float_constant(*value, ty)), ir)
            }
            Literal::Bool(value) => self.builder.const_bool(*value),
            Literal::Unit => return Lowered::Unit,
            Literal::CString(text) => self.builder.string(text),
        };
        Lowered::Value(value)
    }

    fn lower_variable(&mut self, id: ExprId) -> Lowered {
        let binding = self.binding_of(id);
        if let Some(bound) = self.env.get(&binding).copied() {
            return match bound {
                Bound::Value(value) => Lowered::Value(value),
                Bound::Slot(slot, ty) => Lowered::Value(self.builder.load(slot, ty)),
                Bound::Unit => Lowered::Unit,
            };
        }
        if let Some(function) = self.items.function(binding) {
            return Lowered::Value(self.builder.function_addr(function));
        }
        if let Some(global) = self.items.global(binding) {
            let ty = self.lower_type(self.function.ty(id));
            let addr = self.builder.global_addr(global);
            return Lowered::Value(self.builder.load(addr, ty));
        }
        panic!("COMPILER BUG: binding {binding} has no value")
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> Option<Lowered> {
        if op.is_logical() {
            return self.lower_logical(op, lhs, rhs);
        }
        let lhs = self.lower_value(lhs)?;
        let rhs = self.lower_value(rhs)?;
        let value = match op {
            BinaryOp::Add => self.builder.binary(BinOp::Add, lhs, rhs),
            BinaryOp::Sub => self.builder.binary(BinOp::Sub, lhs, rhs),
            BinaryOp::Mul => self.builder.binary(BinOp::Mul, lhs, rhs),
            BinaryOp::Div => self.builder.binary(BinOp::Div, lhs, rhs),
            BinaryOp::Rem => self.builder.binary(BinOp::Rem, lhs, rhs),
            BinaryOp::BitAnd => self.builder.binary(BinOp::And, lhs, rhs),
            BinaryOp::BitOr => self.builder.binary(BinOp::Or, lhs, rhs),
            BinaryOp::BitXor => self.builder.binary(BinOp::Xor, lhs, rhs),
            BinaryOp::Shl => self.builder.binary(BinOp::Shl, lhs, rhs),
            BinaryOp::Shr => self.builder.binary(BinOp::Shr, lhs, rhs),
            BinaryOp::Eq => self.builder.compare(CmpOp::Eq, lhs, rhs),
            BinaryOp::Ne => self.builder.compare(CmpOp::Ne, lhs, rhs),
            BinaryOp::Lt => self.builder.compare(CmpOp::Lt, lhs, rhs),
            BinaryOp::Le => self.builder.compare(CmpOp::Le, lhs, rhs),
            BinaryOp::Gt => self.builder.compare(CmpOp::Gt, lhs, rhs),
            BinaryOp::Ge => self.builder.compare(CmpOp::Ge, lhs, rhs),
            BinaryOp::And | BinaryOp::Or => unreachable!("logical operators branch"),
        };
        Some(Lowered::Value(value))
    }

    /// `a && b` and `a || b`: the right side runs only when it decides the result
    fn lower_logical(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> Option<Lowered> {
        let lhs = self.lower_value(lhs)?;
        let lhs_end = self.builder.current_block();
        let keys = self.env.len();
        let short_circuit = op == BinaryOp::Or;

        let rhs_block = self.builder.new_block();
        let merge = self.builder.new_block();
        if short_circuit {
            self.builder.branch(lhs, merge, rhs_block);
        } else {
            self.builder.branch(lhs, rhs_block, merge);
        }

        let short = self.builder.const_bool(short_circuit);
        let mut arms = vec![Arm {
            block: lhs_end,
            env: self.env.clone(),
            value: Lowered::Value(short),
            open: false,
        }];

        self.builder.switch_to(rhs_block);
        if let Some(value) = self.lower_value(rhs) {
            arms.push(Arm {
                block: self.builder.current_block(),
                env: self.env.clone(),
                value: Lowered::Value(value),
                open: true,
            });
        }

        self.join(merge, keys, &arms, Some(IrType::Bool))
    }

    fn lower_unary(&mut self, id: ExprId, op: UnaryOp, operand: ExprId) -> Option<Lowered> {
        let value = match op {
            UnaryOp::Neg => {
                let operand = self.lower_value(operand)?;
                self.builder.unary(UnOp::Neg, operand)
            }
            UnaryOp::Not => {
                let operand = self.lower_value(operand)?;
                self.builder.unary(UnOp::Not, operand)
            }
            UnaryOp::Deref => {
                let ptr = self.lower_value(operand)?;
                let ty = self.function.ty(id);
                if ty.is_unit() {
                    return Some(Lowered::Unit);
                }
                let ty = self.lower_type(ty);
                self.builder.load(ptr, ty)
            }
            UnaryOp::AddrOf => self.lower_place(operand)?,
        };
        Some(Lowered::Value(value))
    }

    fn lower_call(&mut self, callee: ExprId, args: &[ExprId]) -> Option<Lowered> {
        let Ty::Function {
            params,
            ret,
            varargs,
        } = self.function.ty(callee)
        else {
            panic!("COMPILER BUG: call through a non-function");
        };
        let sig = lower_sig(params, ret, *varargs, self.items);

        let target = match self.direct_callee(callee) {
            Some(function) => Callee::Direct(function),
            None => Callee::Indirect(self.lower_value(callee)?),
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_value(*arg)?);
        }

        Some(match self.builder.call(target, values, sig) {
            Some(value) => Lowered::Value(value),
            None => Lowered::Unit,
        })
    }

    fn direct_callee(&self, callee: ExprId) -> Option<ac_ir::FuncId> {
        match &self.body[callee] {
            Expr::Variable { .. } => {
                let binding = self.binding_of(callee);
                if self.env.contains_key(&binding) {
                    None
                } else {
                    self.items.function(binding)
                }
            }
            _ => None,
        }
    }

    fn lower_assign(&mut self, target: ExprId, value: ExprId) -> Option<Lowered> {
        let lowered = self.lower_expr(value)?;

        if let Expr::Variable { .. } = &self.body[target] {
            let binding = self.binding_of(target);
            match (self.env.get(&binding).copied(), lowered) {
                (Some(Bound::Value(_)), Lowered::Value(value)) => {
                    self.env.insert(binding, Bound::Value(value));
                }
                (Some(Bound::Slot(slot, _)), Lowered::Value(value)) => {
                    self.builder.store(slot, value);
                }
                (Some(_), _) => {}
                (None, Lowered::Value(value)) => {
                    let Some(global) = self.items.global(binding) else {
                        panic!("COMPILER BUG: assignment to {binding}, which is not a variable");
                    };
                    let addr = self.builder.global_addr(global);
                    self.builder.store(addr, value);
                }
                (None, Lowered::Unit) => {}
            }
            return Some(lowered);
        }

        let place = self.lower_place(target)?;
        if let Lowered::Value(value) = lowered {
            self.builder.store(place, value);
        }
        Some(lowered)
    }

    /// Address of a place expression
    fn lower_place(&mut self, expr: ExprId) -> Option<ValueId> {
        let body = self.body;
        match &body[expr] {
            Expr::Variable { .. } => {
                let binding = self.binding_of(expr);
                match self.env.get(&binding).copied() {
                    Some(Bound::Slot(slot, _)) => Some(slot),
                    Some(_) => panic!("COMPILER BUG: address of {binding}, which lives in a register"),
                    None => match self.items.global(binding) {
                        Some(global) => Some(self.builder.global_addr(global)),
                        None => panic!("COMPILER BUG: {binding} is not a place"),
                    },
                }
            }
            Expr::Field { base, .. } => {
                let field = self.field_ref(expr);
                let base_ptr = if field.through_pointer {
                    self.lower_value(*base)?
                } else {
                    self.lower_place(*base)?
                };
                let layout = self.items.layout(field.struct_id);
                Some(self.builder.field_addr(base_ptr, layout, field.index as u32))
            }
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
                ..
            } => self.lower_value(*operand),
            _ => panic!("COMPILER BUG: expression {} is not a place", expr.index()),
        }
    }

    /// Whether `expr` names memory, so its fields can be read in place
    fn is_memory_place(&self, expr: ExprId) -> bool {
        match &self.body[expr] {
            Expr::Variable { .. } => {
                let binding = self.binding_of(expr);
                match self.env.get(&binding) {
                    Some(bound) => matches!(bound, Bound::Slot(..)),
                    None => self.items.global(binding).is_some(),
                }
            }
            Expr::Field { base, .. } => {
                self.field_ref(expr).through_pointer || self.is_memory_place(*base)
            }
            Expr::Unary {
                op: UnaryOp::Deref,
                ..
            } => true,
            _ => false,
        }
    }

    fn lower_field(&mut self, id: ExprId, base: ExprId) -> Option<Lowered> {
        let field = self.field_ref(id);
        let ty = self.lower_type(self.function.ty(id));
        if self.is_memory_place(id) {
            let addr = self.lower_place(id)?;
            return Some(Lowered::Value(self.builder.load(addr, ty)));
        }
        let aggregate = self.lower_value(base)?;
        Some(Lowered::Value(self.builder.extract_field(
            aggregate,
            field.index as u32,
            ty,
        )))
    }

    fn lower_struct_literal(&mut self, id: ExprId, fields: &[FieldInit]) -> Option<Lowered> {
        let Some(literal) = self.function.struct_literals.get(&id) else {
            panic!("COMPILER BUG: unresolved struct literal at {}", id.index());
        };
        // Initializers run in source order; the aggregate takes layout order.
        let mut slots = vec![None; literal.positions.len()];
        for (init, position) in fields.iter().zip(&literal.positions) {
            slots[*position] = Some(self.lower_value(init.value)?);
        }
        let mut values = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(value) => values.push(value),
                None => panic!("COMPILER BUG: struct literal with a missing field"),
            }
        }
        let layout = self.items.layout(literal.struct_id);
        Some(Lowered::Value(self.builder.make_aggregate(layout, values)))
    }

    fn lower_if(
        &mut self,
        id: ExprId,
        condition: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    ) -> Option<Lowered> {
        let cond = self.lower_value(condition)?;
        let cond_end = self.builder.current_block();
        let keys = self.env.len();
        let before = self.env.clone();

        let then_block = self.builder.new_block();
        let (else_block, merge) = match else_branch {
            Some(_) => (self.builder.new_block(), None),
            None => {
                let merge = self.builder.new_block();
                (merge, Some(merge))
            }
        };
        self.builder.branch(cond, then_block, else_block);

        let mut arms = Vec::new();
        self.builder.switch_to(then_block);
        if let Some(value) = self.lower_expr(then_branch) {
            arms.push(Arm {
                block: self.builder.current_block(),
                env: self.env.clone(),
                value,
                open: true,
            });
        }
        self.env = before.clone();

        match else_branch {
            Some(else_branch) => {
                self.builder.switch_to(else_block);
                if let Some(value) = self.lower_expr(else_branch) {
                    arms.push(Arm {
                        block: self.builder.current_block(),
                        env: self.env.clone(),
                        value,
                        open: true,
                    });
                }
                self.env = before;
            }
            None => arms.push(Arm {
                block: cond_end,
                env: before,
                value: Lowered::Unit,
                open: false,
            }),
        }

        if arms.is_empty() {
            return None;
        }
        let merge = merge.unwrap_or_else(|| self.builder.new_block());
        let ty = self.function.ty(id);
        let result = (!ty.is_unit()).then(|| self.lower_type(ty));
        self.join(merge, keys, &arms, result)
    }

    /// Continues at `merge`, reached from every arm
    ///
    /// Bindings whose value differs between arms get a phi. With `result` set
    /// the arms' values are merged the same way.
    fn join(
        &mut self,
        merge: BlockId,
        keys: usize,
        arms: &[Arm],
        result: Option<IrType>,
    ) -> Option<Lowered> {
        for arm in arms.iter().filter(|arm| arm.open) {
            self.builder.switch_to(arm.block);
            self.builder.jump(merge);
        }
        self.builder.switch_to(merge);

        let mut env = arms[0].env.clone();
        env.truncate(keys);
        for index in 0..keys {
            let first = arms[0].env[index];
            if arms.iter().all(|arm| arm.env[index] == first) {
                continue;
            }
            let incoming: Vec<(BlockId, ValueId)> = arms
                .iter()
                .map(|arm| match arm.env[index] {
                    Bound::Value(value) => (arm.block, value),
                    other => panic!("COMPILER BUG: {other:?} rebound in a branch"),
                })
                .collect();
            let ty = self.builder.value_type(incoming[0].1);
            env[index] = Bound::Value(self.builder.phi(ty, incoming));
        }
        self.env = env;

        let Some(ty) = result else {
            return Some(Lowered::Unit);
        };
        let incoming: Vec<(BlockId, ValueId)> = arms
            .iter()
            .map(|arm| match arm.value {
                Lowered::Value(value) => (arm.block, value),
                Lowered::Unit => panic!("COMPILER BUG: unit arm in a valued join"),
            })
            .collect();
        let value = match incoming.as_slice() {
            [(_, single)] => *single,
            _ => self.builder.phi(ty, incoming),
        };
        Some(Lowered::Value(value))
    }

    fn lower_while(&mut self, id: ExprId, condition: ExprId, loop_body: ExprId) -> Option<Lowered> {
        let header = self.builder.new_block();
        self.builder.jump(header);
        self.builder.switch_to(header);
        let saved = self.env.clone();

        // The condition already belongs to the loop: `break` in it leaves this loop.
        self.loops.push(LoopTarget { header, exit: None });
        let body_block = if self.function.infinite_loops.contains(&id) {
            let body_block = self.builder.new_block();
            self.builder.jump(body_block);
            Some(body_block)
        } else if let Some(cond) = self.lower_value(condition) {
            let body_block = self.builder.new_block();
            let exit = self.loop_exit();
            self.builder.branch(cond, body_block, exit);
            Some(body_block)
        } else {
            None
        };

        if let Some(body_block) = body_block {
            self.builder.switch_to(body_block);
            if self.lower_expr(loop_body).is_some() {
                self.builder.jump(header);
            }
        }
        let exit = self.loops.pop().and_then(|target| target.exit);
        self.env = saved;

        let exit = exit?;
        self.builder.switch_to(exit);
        Some(Lowered::Unit)
    }

    fn loop_exit(&mut self) -> BlockId {
        let Some(target) = self.loops.last_mut() else {
            panic!("COMPILER BUG: break outside of a loop");
        };
        *target.exit.get_or_insert_with(|| self.builder.new_block())
    }

    fn lower_block(&mut self, stmts: &[StmtId], tail: Option<ExprId>) -> Option<Lowered> {
        let keys = self.env.len();
        let result = self.lower_block_contents(stmts, tail);
        self.env.truncate(keys);
        result
    }

    fn lower_block_contents(&mut self, stmts: &[StmtId], tail: Option<ExprId>) -> Option<Lowered> {
        for stmt in stmts {
            self.lower_stmt(*stmt)?;
        }
        match tail {
            Some(tail) => self.lower_expr(tail),
            None => Some(Lowered::Unit),
        }
    }

    fn lower_stmt(&mut self, id: StmtId) -> Option<()> {
        let body = self.body;
        match &body[id] {
            Stmt::Let { init, .. } => {
                let Some(binding) = self.function.lets.get(&id).copied() else {
                    panic!("COMPILER BUG: unresolved let at {}", id.0);
                };
                let value = match init {
                    Some(init) => Some(self.lower_expr(*init)?),
                    None => None,
                };
                let ty = self.local_type(binding);
                let bound = if ty.is_unit() {
                    Bound::Unit
                } else {
                    let ty = self.lower_type(ty);
                    let value = match value {
                        Some(Lowered::Value(value)) => Some(value),
                        _ => None,
                    };
                    if self.function.is_memory_resident(binding) {
                        let slot = self.builder.alloca(ty);
                        if let Some(value) = value {
                            self.builder.store(slot, value);
                        }
                        Bound::Slot(slot, ty)
                    } else {
                        Bound::Value(
                            value.unwrap_or_else(|| self.builder.constant(Constant::Zero, ty)),
                        )
                    }
                };
                self.env.insert(binding, bound);
                Some(())
            }
            Stmt::Expr { expr, .. } => self.lower_expr(*expr).map(|_| ()),
            Stmt::Return { value, .. } => {
                let result = match value {
                    Some(value) => self.lower_expr(*value)?,
                    None => Lowered::Unit,
                };
                match result {
                    Lowered::Value(value) => self.builder.ret(Some(value)),
                    Lowered::Unit => self.builder.ret(None),
                }
                None
            }
        }
    }
}
