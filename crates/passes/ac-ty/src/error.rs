//! Type errors

use ac_span::FileSpan;
use ac_symbols::SymbolError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors found while collecting items or checking function bodies
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum TypeError {
    /// Name is not bound in any visible scope
    #[error("cannot find `{name}` in this scope")]
    #[diagnostic(code(acorn::unbound_name))]
    UnboundName {
        /// The unresolved name
        name: String,
        /// Use site
        span: FileSpan,
        /// Similar visible names
        suggestions: Vec<String>,
    },

    /// Name declared twice in one scope
    #[error("`{name}` is declared more than once")]
    #[diagnostic(code(acorn::duplicate_declaration))]
    DuplicateDeclaration {
        /// The redeclared name
        name: String,
        /// Second declaration
        span: FileSpan,
        /// First declaration
        first: FileSpan,
    },

    /// Operand or value has the wrong type
    #[error("mismatched types: expected {expected}, found {found}")]
    #[diagnostic(code(acorn::type_mismatch))]
    TypeMismatch {
        /// What the context requires
        expected: String,
        /// What the expression has
        found: String,
        /// Offending expression
        span: FileSpan,
    },

    /// Call with the wrong number of arguments
    #[error("this function takes {expected} arguments but {found} were supplied")]
    #[diagnostic(code(acorn::arity_mismatch))]
    ArityMismatch {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
        /// Call site
        span: FileSpan,
    },

    /// Returned value disagrees with the declared return type
    #[error("function returns {expected} but this path yields {found}")]
    #[diagnostic(code(acorn::return_type_mismatch))]
    ReturnTypeMismatch {
        /// Declared return type
        expected: String,
        /// Type produced on this path
        found: String,
        /// Return statement, or the function when a path falls off the end
        span: FileSpan,
    },

    /// Field access on a type without that field
    #[error("no field `{field}` on type {ty}")]
    #[diagnostic(code(acorn::unknown_field))]
    UnknownField {
        /// Type of the accessed value
        ty: String,
        /// Requested field
        field: String,
        /// Access site
        span: FileSpan,
    },

    /// Assignment target or `&` operand does not denote a storage location
    #[error("expression is not a place")]
    #[diagnostic(
        code(acorn::not_a_place),
        help("only variables, fields of places and dereferences can be assigned or borrowed")
    )]
    NotAPlace {
        /// Offending expression
        span: FileSpan,
    },

    /// `break` or `continue` outside of a loop body
    #[error("`{keyword}` outside of a loop")]
    #[diagnostic(code(acorn::break_outside_loop))]
    BreakOutsideLoop {
        /// `break` or `continue`
        keyword: String,
        /// Offending expression
        span: FileSpan,
    },

    /// Type alias or by-value struct field that refers back to itself
    #[error("type `{name}` refers to itself")]
    #[diagnostic(code(acorn::cyclic_type))]
    CyclicType {
        /// Alias or struct name
        name: String,
        /// Declaration site
        span: FileSpan,
    },
}

impl TypeError {
    /// Primary location of the error
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::UnboundName { span, .. }
            | Self::DuplicateDeclaration { span, .. }
            | Self::TypeMismatch { span, .. }
            | Self::ArityMismatch { span, .. }
            | Self::ReturnTypeMismatch { span, .. }
            | Self::UnknownField { span, .. }
            | Self::NotAPlace { span }
            | Self::BreakOutsideLoop { span, .. }
            | Self::CyclicType { span, .. } => *span,
        }
    }

    /// Builds a `TypeMismatch`
    #[must_use]
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>, span: FileSpan) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }
}

impl From<SymbolError> for TypeError {
    fn from(error: SymbolError) -> Self {
        match error {
            SymbolError::UnboundName {
                name,
                span,
                suggestions,
            } => Self::UnboundName {
                name,
                span,
                suggestions,
            },
            SymbolError::DuplicateDeclaration { name, span, first } => {
                Self::DuplicateDeclaration { name, span, first }
            }
        }
    }
}
