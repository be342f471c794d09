//! Abstract syntax tree for Acorn
//!
//! The AST is produced by an external parser and handed to the core already
//! syntactically valid. Item declarations own their bodies; expressions and
//! statements of one function live in that function's [`Body`] and refer to
//! each other through [`ExprId`] / [`StmtId`] indices.
//!
//! Resolved types are never written into the tree. The type resolver records
//! them in a side table keyed by node id, so the tree stays immutable once the
//! parser has built it.

pub mod builder;

use ac_span::{FileId, FileSpan};
use serde::{Deserialize, Serialize};
use std::ops::Index;
use std::path::PathBuf;

pub use builder::BodyBuilder;

/// Index of an expression inside its [`Body`]
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExprId(pub u32);

/// Index of a statement inside its [`Body`]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StmtId(pub u32);

impl ExprId {
    /// Position in the body's expression table
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl StmtId {
    /// Position in the body's statement table
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One compilation unit (typically one source file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Unit name; also the first segment of every qualified item name
    pub name: String,
    /// File the spans of this unit point into
    #[serde(default)]
    pub file: FileId,
    /// Path of the original source text, used for rendering diagnostics
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Top-level declarations in source order
    pub items: Vec<Item>,
}

impl SourceUnit {
    /// Creates an empty unit
    #[must_use]
    pub fn new(name: impl Into<String>, file: FileId) -> Self {
        Self {
            name: name.into(),
            file,
            path: None,
            items: Vec::new(),
        }
    }

    /// Appends an item and returns `self` for chaining
    #[must_use]
    pub fn with_item(mut self, item: impl Into<Item>) -> Self {
        self.items.push(item.into());
        self
    }

    /// Function declarations in source order
    pub fn functions(&self) -> impl Iterator<Item = (usize, &FunctionDecl)> {
        self.items.iter().enumerate().filter_map(|(idx, item)| match item {
            Item::Function(function) => Some((idx, function)),
            _ => None,
        })
    }
}

/// Top-level declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// Function definition or external declaration
    Function(FunctionDecl),
    /// Global variable
    Global(GlobalDecl),
    /// Struct (named aggregate) declaration
    Struct(StructDecl),
    /// Type alias
    TypeAlias(TypeAliasDecl),
}

impl Item {
    /// Declared name of the item
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Function(decl) => &decl.name,
            Self::Global(decl) => &decl.name,
            Self::Struct(decl) => &decl.name,
            Self::TypeAlias(decl) => &decl.name,
        }
    }

    /// Source location of the item
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::Function(decl) => decl.span,
            Self::Global(decl) => decl.span,
            Self::Struct(decl) => decl.span,
            Self::TypeAlias(decl) => decl.span,
        }
    }
}

impl From<FunctionDecl> for Item {
    fn from(decl: FunctionDecl) -> Self {
        Self::Function(decl)
    }
}

impl From<GlobalDecl> for Item {
    fn from(decl: GlobalDecl) -> Self {
        Self::Global(decl)
    }
}

impl From<StructDecl> for Item {
    fn from(decl: StructDecl) -> Self {
        Self::Struct(decl)
    }
}

impl From<TypeAliasDecl> for Item {
    fn from(decl: TypeAliasDecl) -> Self {
        Self::TypeAlias(decl)
    }
}

/// Function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Function name
    pub name: String,
    /// Parameters in order
    pub params: Vec<Param>,
    /// Declared return type; `None` means unit
    #[serde(default)]
    pub return_type: Option<TypeExpr>,
    /// Body; `None` for an external declaration
    #[serde(default)]
    pub body: Option<Body>,
    /// Attributes such as `@varargs`
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Source location
    pub span: FileSpan,
}

impl FunctionDecl {
    /// Whether this function only declares an external symbol
    #[must_use]
    pub fn is_extern(&self) -> bool {
        self.body.is_none()
    }

    /// Whether the `@varargs` attribute is present
    #[must_use]
    pub fn is_varargs(&self) -> bool {
        self.attributes.iter().any(|attr| matches!(attr, Attribute::Varargs))
    }

    /// Linker name requested through `@mangle_as`, if any
    #[must_use]
    pub fn mangle_override(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            Attribute::MangleAs(name) => Some(name.as_str()),
            Attribute::Varargs => None,
        })
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: TypeExpr,
    /// Source location
    pub span: FileSpan,
}

/// Item attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    /// Function accepts extra arguments after its declared parameters
    Varargs,
    /// Use this exact linker symbol instead of the mangled name
    MangleAs(String),
}

/// Global variable declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    /// Global name
    pub name: String,
    /// Declared type
    pub ty: TypeExpr,
    /// Constant initializer; zero-initialized when absent
    #[serde(default)]
    pub init: Option<Literal>,
    /// Source location
    pub span: FileSpan,
}

/// Struct declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    /// Struct name
    pub name: String,
    /// Fields in layout order
    pub fields: Vec<FieldDecl>,
    /// Source location
    pub span: FileSpan,
}

/// Struct field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeExpr,
    /// Source location
    pub span: FileSpan,
}

/// `type Name = T;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    /// Alias name
    pub name: String,
    /// Aliased type
    pub ty: TypeExpr,
    /// Source location
    pub span: FileSpan,
}

/// Type as written in source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Builtin, struct or alias name, possibly `::`-qualified
    Named {
        /// Type name
        name: String,
        /// Source location
        span: FileSpan,
    },
    /// `*T`
    Pointer {
        /// Pointee type
        pointee: Box<TypeExpr>,
        /// Source location
        span: FileSpan,
    },
    /// `fn(T, U) -> R`
    Function {
        /// Parameter types
        params: Vec<TypeExpr>,
        /// Return type; `None` means unit
        ret: Option<Box<TypeExpr>>,
        /// Whether extra arguments are accepted
        #[serde(default)]
        varargs: bool,
        /// Source location
        span: FileSpan,
    },
}

impl TypeExpr {
    /// Shorthand for a named type
    #[must_use]
    pub fn named(name: impl Into<String>, span: FileSpan) -> Self {
        Self::Named {
            name: name.into(),
            span,
        }
    }

    /// Shorthand for a pointer type
    #[must_use]
    pub fn pointer(pointee: Self, span: FileSpan) -> Self {
        Self::Pointer {
            pointee: Box::new(pointee),
            span,
        }
    }

    /// Source location
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::Named { span, .. } | Self::Pointer { span, .. } | Self::Function { span, .. } => {
                *span
            }
        }
    }
}

/// Expressions and statements of one function
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    /// Expression table
    pub exprs: Vec<Expr>,
    /// Statement table
    pub stmts: Vec<Stmt>,
    /// Root expression; always a [`Expr::Block`]
    pub root: ExprId,
}

impl Body {
    /// Number of expressions in the body
    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Iterates over all expressions with their ids
    pub fn iter_exprs(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs
            .iter()
            .enumerate()
            .map(|(idx, expr)| (ExprId(idx as u32), expr))
    }
}

impl Index<ExprId> for Body {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }
}

impl Index<StmtId> for Body {
    type Output = Stmt;

    fn index(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal value
    Literal {
        /// Literal value
        value: Literal,
        /// Source location
        span: FileSpan,
    },
    /// Name reference, possibly `::`-qualified
    Variable {
        /// Referenced name
        name: String,
        /// Source location
        span: FileSpan,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: ExprId,
        /// Right operand
        rhs: ExprId,
        /// Source location
        span: FileSpan,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: ExprId,
        /// Source location
        span: FileSpan,
    },
    /// Function call
    Call {
        /// Callee expression
        callee: ExprId,
        /// Arguments, evaluated left to right
        args: Vec<ExprId>,
        /// Source location
        span: FileSpan,
    },
    /// `target = value`
    Assign {
        /// Place being written
        target: ExprId,
        /// Value being stored
        value: ExprId,
        /// Source location
        span: FileSpan,
    },
    /// `if` expression
    If {
        /// Condition
        condition: ExprId,
        /// Then branch
        then_branch: ExprId,
        /// Else branch
        else_branch: Option<ExprId>,
        /// Source location
        span: FileSpan,
    },
    /// `while` loop
    While {
        /// Loop condition, re-evaluated before every iteration
        condition: ExprId,
        /// Loop body
        body: ExprId,
        /// Source location
        span: FileSpan,
    },
    /// Block expression
    Block {
        /// Statements in order
        stmts: Vec<StmtId>,
        /// Trailing expression
        tail: Option<ExprId>,
        /// Source location
        span: FileSpan,
    },
    /// `base.field`
    Field {
        /// Aggregate (or pointer to aggregate)
        base: ExprId,
        /// Field name
        field: String,
        /// Source location
        span: FileSpan,
    },
    /// `Name { field: value, .. }`
    StructLiteral {
        /// Struct name
        name: String,
        /// Field initializers in source order
        fields: Vec<FieldInit>,
        /// Source location
        span: FileSpan,
    },
    /// `break`
    Break {
        /// Source location
        span: FileSpan,
    },
    /// `continue`
    Continue {
        /// Source location
        span: FileSpan,
    },
}

impl Expr {
    /// Source location
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::Literal { span, .. }
            | Self::Variable { span, .. }
            | Self::Binary { span, .. }
            | Self::Unary { span, .. }
            | Self::Call { span, .. }
            | Self::Assign { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::Block { span, .. }
            | Self::Field { span, .. }
            | Self::StructLiteral { span, .. }
            | Self::Break { span }
            | Self::Continue { span } => *span,
        }
    }
}

/// Field initializer inside a struct literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    /// Field name
    pub name: String,
    /// Initializer
    pub value: ExprId,
    /// Source location
    pub span: FileSpan,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name: ty = init;`
    Let {
        /// Bound name
        name: String,
        /// Type annotation
        ty: Option<TypeExpr>,
        /// Initializer
        init: Option<ExprId>,
        /// Source location
        span: FileSpan,
    },
    /// Expression statement
    Expr {
        /// Expression
        expr: ExprId,
        /// Source location
        span: FileSpan,
    },
    /// `return value;`
    Return {
        /// Returned value
        value: Option<ExprId>,
        /// Source location
        span: FileSpan,
    },
}

impl Stmt {
    /// Source location
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::Let { span, .. } | Self::Expr { span, .. } | Self::Return { span, .. } => *span,
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal; width defaults to 32 bits
    Int {
        /// Value
        value: i64,
        /// Explicit width suffix
        #[serde(default)]
        bits: Option<u8>,
    },
    /// Float literal; width defaults to 64 bits
    Float {
        /// Value
        value: f64,
        /// Explicit width suffix
        #[serde(default)]
        bits: Option<u8>,
    },
    /// `true` / `false`
    Bool(bool),
    /// `()`
    Unit,
    /// NUL-terminated C string
    CString(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

impl BinaryOp {
    /// `+ - * / %`
    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Rem)
    }

    /// `== != < <= > >=`
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// `&& ||`
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// `& | ^ << >>`
    #[must_use]
    pub const fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitAnd | Self::BitOr | Self::BitXor | Self::Shl | Self::Shr
        )
    }

    /// Source spelling
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
    /// `&`
    AddrOf,
    /// `*`
    Deref,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_span::Span;

    fn span() -> FileSpan {
        FileSpan::new(FileId(0), Span::new(0, 1))
    }

    #[test]
    fn test_attributes() {
        let decl = FunctionDecl {
            name: "printf".into(),
            params: vec![],
            return_type: Some(TypeExpr::named("i32", span())),
            body: None,
            attributes: vec![Attribute::Varargs, Attribute::MangleAs("printf".into())],
            span: span(),
        };
        assert!(decl.is_extern());
        assert!(decl.is_varargs());
        assert_eq!(decl.mangle_override(), Some("printf"));
    }

    #[test]
    fn test_unit_deserializes_from_parser_output() {
        let json = r#"{
            "name": "main",
            "items": [
                { "Global": {
                    "name": "counter",
                    "ty": { "Named": { "name": "i64", "span": { "file": 0, "span": { "start": 0, "end": 3 } } } },
                    "init": { "Int": { "value": 7 } },
                    "span": { "file": 0, "span": { "start": 0, "end": 20 } }
                } }
            ]
        }"#;
        let unit: SourceUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit.items.len(), 1);
        assert_eq!(unit.items[0].name(), "counter");
        assert!(matches!(
            &unit.items[0],
            Item::Global(GlobalDecl { init: Some(Literal::Int { value: 7, bits: None }), .. })
        ));
    }

    #[test]
    fn test_operator_classes_are_disjoint() {
        for op in [BinaryOp::Add, BinaryOp::Lt, BinaryOp::And, BinaryOp::Shl] {
            let classes = [
                op.is_arithmetic(),
                op.is_comparison(),
                op.is_logical(),
                op.is_bitwise(),
            ];
            assert_eq!(classes.iter().filter(|class| **class).count(), 1, "{op:?}");
        }
    }
}
