//! Incremental construction of a function body

use la_arena::Arena;
use rustc_hash::FxHashMap;

use crate::{
    BasicBlock, BinOp, BlockId, Callee, CastKind, CmpOp, Constant, FuncId, FunctionBody,
    FunctionSig, GlobalId, InstKind, Instruction, IrType, LayoutId, Terminator, UnOp, ValueData,
    ValueId, ValueKind,
};

/// Builder for a single function body
///
/// Instructions are appended to the current block. Allocas always go to the
/// entry block ahead of any other instruction there.
pub struct FunctionBuilder {
    values: Arena<ValueData>,
    blocks: Arena<BasicBlock>,
    params: Vec<ValueId>,
    strings: Vec<String>,
    entry: BlockId,
    current: BlockId,
    allocas: usize,
    predecessors: FxHashMap<BlockId, Vec<BlockId>>,
}

impl FunctionBuilder {
    /// Creates a builder with an entry block and one value per parameter
    #[must_use]
    pub fn new(sig: &FunctionSig) -> Self {
        let mut values = Arena::new();
        let mut blocks = Arena::new();
        let entry = blocks.alloc(BasicBlock::default());

        let params = sig
            .params
            .iter()
            .zip(0u32..)
            .map(|(&ty, index)| {
                values.alloc(ValueData {
                    kind: ValueKind::Param(index),
                    ty,
                })
            })
            .collect();

        Self {
            values,
            blocks,
            params,
            strings: Vec::new(),
            entry,
            current: entry,
            allocas: 0,
            predecessors: FxHashMap::default(),
        }
    }

    /// Parameter value at `index`
    #[must_use]
    pub fn param(&self, index: usize) -> ValueId {
        self.params[index]
    }

    /// Entry block
    #[must_use]
    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Block receiving new instructions
    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Creates an empty block
    pub fn new_block(&mut self) -> BlockId {
        let block = self.blocks.alloc(BasicBlock::default());
        log::trace!("created block bb{}", crate::raw_index(block));
        block
    }

    /// Makes `block` the insertion point
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Whether the current block already has a terminator
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current].terminator.is_some()
    }

    /// Blocks that have a terminator targeting `block`
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map_or(&[], Vec::as_slice)
    }

    /// Type of a value
    #[must_use]
    pub fn value_type(&self, value: ValueId) -> IrType {
        self.values[value].ty
    }

    /// Constant payload of a value, if it is one
    #[must_use]
    pub fn as_constant(&self, value: ValueId) -> Option<&Constant> {
        match &self.values[value].kind {
            ValueKind::Const(constant) => Some(constant),
            _ => None,
        }
    }

    /// Inline constant of type `ty`
    pub fn constant(&mut self, constant: Constant, ty: IrType) -> ValueId {
        self.values.alloc(ValueData {
            kind: ValueKind::Const(constant),
            ty,
        })
    }

    /// Integer constant
    pub fn const_int(&mut self, value: i64, bits: u8) -> ValueId {
        self.constant(Constant::Int(value), IrType::Int(bits))
    }

    /// Boolean constant
    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.constant(Constant::Bool(value), IrType::Bool)
    }

    /// Address of a global
    pub fn global_addr(&mut self, global: GlobalId) -> ValueId {
        self.values.alloc(ValueData {
            kind: ValueKind::Global(global),
            ty: IrType::Ptr,
        })
    }

    /// Address of a function
    pub fn function_addr(&mut self, function: FuncId) -> ValueId {
        self.values.alloc(ValueData {
            kind: ValueKind::Function(function),
            ty: IrType::Ptr,
        })
    }

    /// Address of a new NUL-terminated string constant owned by this body
    pub fn string(&mut self, text: &str) -> ValueId {
        let index = u32::try_from(self.strings.len()).unwrap_or(u32::MAX);
        self.strings.push(text.to_owned());
        self.values.alloc(ValueData {
            kind: ValueKind::String(index),
            ty: IrType::Ptr,
        })
    }

    fn push(&mut self, kind: InstKind, ty: IrType) -> Option<ValueId> {
        debug_assert!(
            !self.is_terminated(),
            "instruction appended to terminated block"
        );
        let result = (ty != IrType::Void).then(|| {
            self.values.alloc(ValueData {
                kind: ValueKind::Result,
                ty,
            })
        });
        self.blocks[self.current]
            .insts
            .push(Instruction { kind, result });
        result
    }

    fn push_value(&mut self, kind: InstKind, ty: IrType) -> ValueId {
        match self.push(kind, ty) {
            Some(value) => value,
            None => panic!("COMPILER BUG: value instruction with void type"),
        }
    }

    /// Arithmetic or bitwise operation; the result has the operand type
    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.value_type(lhs);
        self.push_value(InstKind::Binary { op, lhs, rhs }, ty)
    }

    /// Comparison
    pub fn compare(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push_value(InstKind::Compare { op, lhs, rhs }, IrType::Bool)
    }

    /// Unary operation
    pub fn unary(&mut self, op: UnOp, operand: ValueId) -> ValueId {
        let ty = self.value_type(operand);
        self.push_value(InstKind::Unary { op, operand }, ty)
    }

    /// Widening conversion
    pub fn cast(&mut self, kind: CastKind, value: ValueId, to: IrType) -> ValueId {
        self.push_value(InstKind::Cast { kind, value }, to)
    }

    /// Call; yields a value unless the signature returns void
    pub fn call(&mut self, callee: Callee, args: Vec<ValueId>, sig: FunctionSig) -> Option<ValueId> {
        let ret = sig.ret;
        self.push(InstKind::Call { callee, args, sig }, ret)
    }

    /// Stack slot in the entry block
    pub fn alloca(&mut self, ty: IrType) -> ValueId {
        let result = self.values.alloc(ValueData {
            kind: ValueKind::Result,
            ty: IrType::Ptr,
        });
        self.blocks[self.entry].insts.insert(
            self.allocas,
            Instruction {
                kind: InstKind::Alloca { ty },
                result: Some(result),
            },
        );
        self.allocas += 1;
        result
    }

    /// Memory read
    pub fn load(&mut self, ptr: ValueId, ty: IrType) -> ValueId {
        self.push_value(InstKind::Load { ptr }, ty)
    }

    /// Memory write
    pub fn store(&mut self, ptr: ValueId, value: ValueId) {
        self.push(InstKind::Store { ptr, value }, IrType::Void);
    }

    /// Address of field `index` of the struct at `base`
    pub fn field_addr(&mut self, base: ValueId, layout: LayoutId, index: u32) -> ValueId {
        self.push_value(InstKind::FieldAddr { base, layout, index }, IrType::Ptr)
    }

    /// Field `index` of a struct value
    pub fn extract_field(&mut self, aggregate: ValueId, index: u32, ty: IrType) -> ValueId {
        self.push_value(InstKind::ExtractField { aggregate, index }, ty)
    }

    /// Struct value built from its fields
    pub fn make_aggregate(&mut self, layout: LayoutId, fields: Vec<ValueId>) -> ValueId {
        self.push_value(
            InstKind::MakeAggregate { layout, fields },
            IrType::Struct(layout),
        )
    }

    /// Phi at the current insertion point
    pub fn phi(&mut self, ty: IrType, incoming: Vec<(BlockId, ValueId)>) -> ValueId {
        self.push_value(InstKind::Phi { incoming }, ty)
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_some() {
            panic!("COMPILER BUG: block terminated twice");
        }
        block.terminator = Some(terminator);
        for target in terminator.successors() {
            let preds = self.predecessors.entry(target).or_default();
            if !preds.contains(&self.current) {
                preds.push(self.current);
            }
        }
    }

    /// Unconditional jump
    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump(target));
    }

    /// Conditional branch
    pub fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Return
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Return(value));
    }

    /// Marks the current block as unreachable
    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    /// Finishes the body
    ///
    /// # Panics
    ///
    /// Panics if a block was left without a terminator.
    #[must_use]
    pub fn finish(self) -> FunctionBody {
        for (id, block) in self.blocks.iter() {
            if block.terminator.is_none() {
                panic!(
                    "COMPILER BUG: block bb{} has no terminator",
                    crate::raw_index(id)
                );
            }
        }
        FunctionBody {
            values: self.values,
            blocks: self.blocks,
            params: self.params,
            strings: self.strings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_become_values() {
        let sig = FunctionSig::new(vec![IrType::Int(32), IrType::Ptr], IrType::Void);
        let builder = FunctionBuilder::new(&sig);
        assert_eq!(builder.value_type(builder.param(0)), IrType::Int(32));
        assert_eq!(builder.value_type(builder.param(1)), IrType::Ptr);
    }

    #[test]
    fn test_allocas_hoisted_to_entry() {
        let sig = FunctionSig::new(vec![], IrType::Void);
        let mut builder = FunctionBuilder::new(&sig);
        let one = builder.const_int(1, 32);
        let two = builder.const_int(2, 32);
        builder.binary(BinOp::Add, one, two);
        let next = builder.new_block();
        builder.jump(next);
        builder.switch_to(next);
        builder.alloca(IrType::Int(32));
        builder.ret(None);

        let body = builder.finish();
        let entry = body.entry().unwrap();
        assert!(matches!(
            body.blocks[entry].insts[0].kind,
            InstKind::Alloca { .. }
        ));
        assert!(body.blocks[next].insts.is_empty());
    }

    #[test]
    fn test_predecessors_tracked() {
        let sig = FunctionSig::new(vec![IrType::Bool], IrType::Void);
        let mut builder = FunctionBuilder::new(&sig);
        let then_block = builder.new_block();
        let else_block = builder.new_block();
        let merge = builder.new_block();
        let cond = builder.param(0);
        builder.branch(cond, then_block, else_block);
        builder.switch_to(then_block);
        builder.jump(merge);
        builder.switch_to(else_block);
        builder.jump(merge);

        assert_eq!(builder.predecessors(merge), &[then_block, else_block]);
        assert!(builder.predecessors(builder.entry_block()).is_empty());
    }

    #[test]
    fn test_void_call_has_no_result() {
        let sig = FunctionSig::new(vec![], IrType::Void);
        let mut builder = FunctionBuilder::new(&sig);
        let result = builder.call(Callee::Direct(FuncId(0)), vec![], sig.clone());
        assert!(result.is_none());
        builder.ret(None);
        assert_eq!(builder.finish().instruction_count(), 1);
    }

    #[test]
    fn test_strings_owned_by_body() {
        let sig = FunctionSig::new(vec![], IrType::Void);
        let mut builder = FunctionBuilder::new(&sig);
        builder.string("hello");
        builder.string("world");
        builder.ret(None);
        let body = builder.finish();
        assert_eq!(body.strings, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    #[should_panic(expected = "COMPILER BUG")]
    fn test_unterminated_block_panics() {
        let sig = FunctionSig::new(vec![], IrType::Void);
        let builder = FunctionBuilder::new(&sig);
        let _body = builder.finish();
    }
}
