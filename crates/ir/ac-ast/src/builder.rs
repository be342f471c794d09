//! Programmatic construction of function bodies
//!
//! The parser lives outside this workspace, so tests and tools build trees by
//! hand. Every node created through [`BodyBuilder`] gets a distinct one-byte
//! span, which keeps diagnostics of hand-built trees deterministic and
//! distinguishable.

use crate::{
    BinaryOp, Body, Expr, ExprId, FieldInit, FunctionDecl, Literal, Param, Stmt, StmtId, TypeExpr,
    UnaryOp,
};
use ac_span::{FileId, FileSpan, Span};

/// Incremental builder for a [`Body`]
#[derive(Debug)]
pub struct BodyBuilder {
    file: FileId,
    next_offset: u32,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl BodyBuilder {
    /// Creates a builder whose spans point into `file`
    #[must_use]
    pub fn new(file: FileId) -> Self {
        Self {
            file,
            next_offset: 0,
            exprs: Vec::new(),
            stmts: Vec::new(),
        }
    }

    /// Hands out a fresh synthetic span
    pub fn span(&mut self) -> FileSpan {
        let start = self.next_offset;
        self.next_offset += 1;
        FileSpan::new(self.file, Span::new(start, start + 1))
    }

    /// Adds a raw expression
    pub fn expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    /// Adds a raw statement
    pub fn stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    /// Span of an already-built expression
    #[must_use]
    pub fn span_of(&self, id: ExprId) -> FileSpan {
        self.exprs[id.index()].span()
    }

    /// Span of an already-built statement
    #[must_use]
    pub fn stmt_span_of(&self, id: StmtId) -> FileSpan {
        self.stmts[id.index()].span()
    }

    /// Literal expression
    pub fn literal(&mut self, value: Literal) -> ExprId {
        let span = self.span();
        self.expr(Expr::Literal { value, span })
    }

    /// 32-bit integer literal
    pub fn int(&mut self, value: i64) -> ExprId {
        self.literal(Literal::Int { value, bits: None })
    }

    /// Integer literal with an explicit width
    pub fn int_sized(&mut self, value: i64, bits: u8) -> ExprId {
        self.literal(Literal::Int {
            value,
            bits: Some(bits),
        })
    }

    /// 64-bit float literal
    pub fn float(&mut self, value: f64) -> ExprId {
        self.literal(Literal::Float { value, bits: None })
    }

    /// Boolean literal
    pub fn bool(&mut self, value: bool) -> ExprId {
        self.literal(Literal::Bool(value))
    }

    /// C string literal
    pub fn cstr(&mut self, value: &str) -> ExprId {
        self.literal(Literal::CString(value.to_string()))
    }

    /// Name reference
    pub fn var(&mut self, name: &str) -> ExprId {
        let span = self.span();
        self.expr(Expr::Variable {
            name: name.to_string(),
            span,
        })
    }

    /// Binary operation
    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let span = self.span();
        self.expr(Expr::Binary { op, lhs, rhs, span })
    }

    /// Unary operation
    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        let span = self.span();
        self.expr(Expr::Unary { op, operand, span })
    }

    /// Call expression
    pub fn call(&mut self, callee: ExprId, args: Vec<ExprId>) -> ExprId {
        let span = self.span();
        self.expr(Expr::Call { callee, args, span })
    }

    /// Assignment expression
    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        let span = self.span();
        self.expr(Expr::Assign {
            target,
            value,
            span,
        })
    }

    /// `if` expression
    pub fn if_else(
        &mut self,
        condition: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    ) -> ExprId {
        let span = self.span();
        self.expr(Expr::If {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    /// `while` loop
    pub fn while_loop(&mut self, condition: ExprId, body: ExprId) -> ExprId {
        let span = self.span();
        self.expr(Expr::While {
            condition,
            body,
            span,
        })
    }

    /// Block expression
    pub fn block(&mut self, stmts: Vec<StmtId>, tail: Option<ExprId>) -> ExprId {
        let span = self.span();
        self.expr(Expr::Block { stmts, tail, span })
    }

    /// Field access
    pub fn field(&mut self, base: ExprId, field: &str) -> ExprId {
        let span = self.span();
        self.expr(Expr::Field {
            base,
            field: field.to_string(),
            span,
        })
    }

    /// Struct literal
    pub fn struct_literal(&mut self, name: &str, fields: Vec<(&str, ExprId)>) -> ExprId {
        let fields = fields
            .into_iter()
            .map(|(field, value)| FieldInit {
                name: field.to_string(),
                value,
                span: self.span(),
            })
            .collect();
        let span = self.span();
        self.expr(Expr::StructLiteral {
            name: name.to_string(),
            fields,
            span,
        })
    }

    /// `break`
    pub fn break_(&mut self) -> ExprId {
        let span = self.span();
        self.expr(Expr::Break { span })
    }

    /// `continue`
    pub fn continue_(&mut self) -> ExprId {
        let span = self.span();
        self.expr(Expr::Continue { span })
    }

    /// `let` statement
    pub fn let_(&mut self, name: &str, ty: Option<TypeExpr>, init: Option<ExprId>) -> StmtId {
        let span = self.span();
        self.stmt(Stmt::Let {
            name: name.to_string(),
            ty,
            init,
            span,
        })
    }

    /// Expression statement
    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        let span = self.span();
        self.stmt(Stmt::Expr { expr, span })
    }

    /// `return` statement
    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        let span = self.span();
        self.stmt(Stmt::Return { value, span })
    }

    /// Named type
    pub fn ty(&mut self, name: &str) -> TypeExpr {
        let span = self.span();
        TypeExpr::named(name, span)
    }

    /// Pointer type
    pub fn ptr_ty(&mut self, pointee: TypeExpr) -> TypeExpr {
        let span = self.span();
        TypeExpr::pointer(pointee, span)
    }

    /// Function parameter
    pub fn param(&mut self, name: &str, ty: TypeExpr) -> Param {
        Param {
            name: name.to_string(),
            ty,
            span: self.span(),
        }
    }

    /// Wraps `stmts` and `tail` into the root block and returns the body
    #[must_use]
    pub fn finish(mut self, stmts: Vec<StmtId>, tail: Option<ExprId>) -> Body {
        let root = self.block(stmts, tail);
        Body {
            exprs: self.exprs,
            stmts: self.stmts,
            root,
        }
    }

    /// Finishes the body and wraps it in a function declaration
    #[must_use]
    pub fn finish_function(
        mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Option<TypeExpr>,
        stmts: Vec<StmtId>,
        tail: Option<ExprId>,
    ) -> FunctionDecl {
        let span = self.span();
        FunctionDecl {
            name: name.to_string(),
            params,
            return_type,
            body: Some(self.finish(stmts, tail)),
            attributes: Vec::new(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_are_distinct() {
        let mut builder = BodyBuilder::new(FileId(3));
        let lhs = builder.int(1);
        let rhs = builder.int(2);
        assert_ne!(builder.span_of(lhs), builder.span_of(rhs));
        assert_eq!(builder.span_of(lhs).file, FileId(3));
    }

    #[test]
    fn test_finish_wraps_root_block() {
        let mut builder = BodyBuilder::new(FileId(0));
        let one = builder.int(1);
        let ret = builder.ret(Some(one));
        let body = builder.finish(vec![ret], None);

        assert_eq!(body.expr_count(), 2);
        match &body[body.root] {
            Expr::Block { stmts, tail, .. } => {
                assert_eq!(stmts, &vec![ret]);
                assert!(tail.is_none());
            }
            other => panic!("expected block root, got {other:?}"),
        }
    }
}
