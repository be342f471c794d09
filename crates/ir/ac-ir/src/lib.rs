//! SSA intermediate representation
//!
//! A [`Module`] owns functions, globals and struct layouts. Each function body
//! owns two arenas: values and basic blocks. Every value is produced exactly
//! once, either by an instruction, as a parameter, or as an inline constant or
//! address. Instructions live inside their block; the block ends in exactly
//! one [`Terminator`].
//!
//! Ids are arena indices handed out in increasing order, so building the same
//! function twice yields identical ids.

pub mod builder;
pub mod display;
pub mod module;

pub use builder::FunctionBuilder;
pub use module::{mangle, Function, Global, GlobalInit, Module, ModuleBuilder, ModuleError, StructLayout};

use la_arena::{Arena, Idx};
use serde::{Deserialize, Serialize};

/// Index of a function in its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// Index of a global in its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// Index of a struct layout in its module
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LayoutId(pub u32);

/// Value in a function body
pub type ValueId = Idx<ValueData>;

/// Basic block in a function body
pub type BlockId = Idx<BasicBlock>;

/// Raw position of an arena index, used for printing
#[must_use]
pub fn raw_index<T>(idx: Idx<T>) -> u32 {
    u32::from(idx.into_raw())
}

/// IR types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Integer of the given width
    Int(u8),
    /// Float of 32 or 64 bits
    Float(u8),
    /// One-bit boolean
    Bool,
    /// Opaque pointer
    Ptr,
    /// Named aggregate
    Struct(LayoutId),
    /// No value
    Void,
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionSig {
    /// Parameter types
    pub params: Vec<IrType>,
    /// Return type
    pub ret: IrType,
    /// Accepts extra arguments
    pub varargs: bool,
}

impl FunctionSig {
    /// Creates a signature
    #[must_use]
    pub fn new(params: Vec<IrType>, ret: IrType) -> Self {
        Self {
            params,
            ret,
            varargs: false,
        }
    }

    /// Marks the signature as accepting extra arguments
    #[must_use]
    pub fn with_varargs(mut self, varargs: bool) -> Self {
        self.varargs = varargs;
        self
    }
}

/// Inline constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer constant
    Int(i64),
    /// Float constant; 32-bit floats are stored widened
    Float(f64),
    /// Boolean constant
    Bool(bool),
    /// All-zero value of the value's type
    Zero,
}

/// What a value is
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// Result of an instruction
    Result,
    /// Function parameter
    Param(u32),
    /// Inline constant
    Const(Constant),
    /// Address of a global
    Global(GlobalId),
    /// Address of a function
    Function(FuncId),
    /// Address of a string constant owned by the body
    String(u32),
}

/// A value with its type
#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    /// Origin of the value
    pub kind: ValueKind,
    /// Type of the value
    pub ty: IrType,
}

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Signed division
    Div,
    /// Signed remainder
    Rem,
    /// Bitwise AND
    And,
    /// Bitwise OR
    Or,
    /// Bitwise XOR
    Xor,
    /// Left shift
    Shl,
    /// Arithmetic right shift
    Shr,
}

/// Comparison operators; integers compare signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    /// Arithmetic negation
    Neg,
    /// Logical or bitwise complement
    Not,
}

/// Widening conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    /// Sign-extend an integer
    SExt,
    /// Zero-extend an integer or boolean
    ZExt,
    /// Extend a float
    FpExt,
}

/// Call target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Function known at compile time
    Direct(FuncId),
    /// Function pointer value
    Indirect(ValueId),
}

/// Instruction kinds
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// Arithmetic or bitwise operation on two operands of the result type
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        lhs: ValueId,
        /// Right operand
        rhs: ValueId,
    },
    /// Comparison producing a bool
    Compare {
        /// Operator
        op: CmpOp,
        /// Left operand
        lhs: ValueId,
        /// Right operand
        rhs: ValueId,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnOp,
        /// Operand
        operand: ValueId,
    },
    /// Widening conversion to the result type
    Cast {
        /// Conversion
        kind: CastKind,
        /// Converted value
        value: ValueId,
    },
    /// Function call
    Call {
        /// Call target
        callee: Callee,
        /// Arguments in evaluation order
        args: Vec<ValueId>,
        /// Signature the call is made through
        sig: FunctionSig,
    },
    /// Stack slot, always placed in the entry block
    Alloca {
        /// Type stored in the slot
        ty: IrType,
    },
    /// Read memory
    Load {
        /// Address
        ptr: ValueId,
    },
    /// Write memory
    Store {
        /// Address
        ptr: ValueId,
        /// Stored value
        value: ValueId,
    },
    /// Address of a struct field
    FieldAddr {
        /// Address of the struct
        base: ValueId,
        /// Struct layout
        layout: LayoutId,
        /// Field position
        index: u32,
    },
    /// Field of a struct value
    ExtractField {
        /// Struct value
        aggregate: ValueId,
        /// Field position
        index: u32,
    },
    /// Builds a struct value from its fields in layout order
    MakeAggregate {
        /// Struct layout
        layout: LayoutId,
        /// Field values
        fields: Vec<ValueId>,
    },
    /// SSA merge of values from predecessor blocks
    Phi {
        /// Value per predecessor
        incoming: Vec<(BlockId, ValueId)>,
    },
}

/// An instruction with its optional result
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Operation
    pub kind: InstKind,
    /// Produced value
    pub result: Option<ValueId>,
}

/// Block terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump
    Jump(BlockId),
    /// Two-way branch on a bool
    Branch {
        /// Condition
        cond: ValueId,
        /// Target when true
        then_block: BlockId,
        /// Target when false
        else_block: BlockId,
    },
    /// Return from the function
    Return(Option<ValueId>),
    /// Control never gets here
    Unreachable,
}

impl Terminator {
    /// Blocks control may continue to
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Self::Jump(target) => vec![target],
            Self::Branch {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Self::Return(_) | Self::Unreachable => Vec::new(),
        }
    }
}

/// Basic block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    /// Instructions in order
    pub insts: Vec<Instruction>,
    /// Terminator; `None` only while the block is being built
    pub terminator: Option<Terminator>,
}

/// Lowered body of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBody {
    /// Value arena
    pub values: Arena<ValueData>,
    /// Block arena; the first block is the entry
    pub blocks: Arena<BasicBlock>,
    /// Parameter values in order
    pub params: Vec<ValueId>,
    /// NUL-terminated string constants used by the body
    pub strings: Vec<String>,
}

impl FunctionBody {
    /// Entry block
    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.iter().next().map(|(id, _)| id)
    }

    /// Type of a value
    #[must_use]
    pub fn value_type(&self, value: ValueId) -> IrType {
        self.values[value].ty
    }

    /// Number of instructions over all blocks
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.values().map(|block| block.insts.len()).sum()
    }
}
