//! Type representation

use ac_span::FileSpan;
use std::fmt;

/// Identity of a declared struct
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct StructId(pub u32);

/// Resolved type
///
/// Types compare structurally, except aggregates which compare by the
/// identity of their declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// Signed integer of 8, 16, 32 or 64 bits
    Int {
        /// Width in bits
        bits: u8,
    },
    /// Float of 32 or 64 bits
    Float {
        /// Width in bits
        bits: u8,
    },
    /// Boolean
    Bool,
    /// The empty value
    Unit,
    /// Pointer to a value of the inner type
    Ptr(Box<Ty>),
    /// Function type
    Function {
        /// Parameter types
        params: Vec<Ty>,
        /// Return type
        ret: Box<Ty>,
        /// Whether extra arguments are accepted
        varargs: bool,
    },
    /// Declared struct
    Aggregate(StructId),
    /// Type of an expression that already failed to check
    ///
    /// Unifies with everything, so one root cause yields one diagnostic.
    Error,
}

impl Ty {
    /// `i8`
    pub const I8: Self = Self::Int { bits: 8 };
    /// `i32`, the type of unsuffixed integer literals
    pub const I32: Self = Self::Int { bits: 32 };
    /// `i64`
    pub const I64: Self = Self::Int { bits: 64 };
    /// `f32`
    pub const F32: Self = Self::Float { bits: 32 };
    /// `f64`, the type of unsuffixed float literals
    pub const F64: Self = Self::Float { bits: 64 };

    /// Pointer to `pointee`
    #[must_use]
    pub fn ptr(pointee: Self) -> Self {
        Self::Ptr(Box::new(pointee))
    }

    /// Function type
    #[must_use]
    pub fn function(params: Vec<Self>, ret: Self, varargs: bool) -> Self {
        Self::Function {
            params,
            ret: Box::new(ret),
            varargs,
        }
    }

    /// Type of a C string literal
    #[must_use]
    pub fn c_string() -> Self {
        Self::ptr(Self::I8)
    }

    /// Looks up a builtin type by its surface name
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => Self::Int { bits: 8 },
            "i16" => Self::Int { bits: 16 },
            "i32" | "int" => Self::I32,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" | "float" => Self::F64,
            "bool" => Self::Bool,
            "void" | "unit" => Self::Unit,
            _ => return None,
        })
    }

    /// Whether this is an integer type
    #[must_use]
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int { .. })
    }

    /// Whether this is a float type
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float { .. })
    }

    /// Whether this is an integer or float type
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Whether this is the error sentinel
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Whether this is the unit type
    #[must_use]
    pub const fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Pointee of a pointer type
    #[must_use]
    pub fn pointee(&self) -> Option<&Self> {
        match self {
            Self::Ptr(pointee) => Some(pointee),
            _ => None,
        }
    }

    /// Whether `self` converts implicitly to the strictly wider `target`
    #[must_use]
    pub fn widens_to(&self, target: &Self) -> bool {
        match (self, target) {
            (Self::Int { bits: from }, Self::Int { bits: to })
            | (Self::Float { bits: from }, Self::Float { bits: to }) => from < to,
            _ => false,
        }
    }

    /// Whether a value of type `self` may be stored where `target` is expected
    #[must_use]
    pub fn is_assignable_to(&self, target: &Self) -> bool {
        self.is_error() || target.is_error() || self == target || self.widens_to(target)
    }

    /// Common type of two operands under the promotion table
    ///
    /// Returns `None` if neither operand converts to the other.
    #[must_use]
    pub fn promote(lhs: &Self, rhs: &Self) -> Option<Self> {
        if lhs.is_error() || rhs.is_error() {
            return Some(Self::Error);
        }
        if lhs == rhs || rhs.widens_to(lhs) {
            Some(lhs.clone())
        } else if lhs.widens_to(rhs) {
            Some(rhs.clone())
        } else {
            None
        }
    }

    /// Renders the type with struct names taken from `structs`
    #[must_use]
    pub fn display<'a>(&'a self, structs: &'a [StructDef]) -> TyDisplay<'a> {
        TyDisplay {
            ty: self,
            structs: Some(structs),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = TyDisplay {
            ty: self,
            structs: None,
        };
        fmt::Display::fmt(&display, f)
    }
}

/// Display adapter that knows struct names
#[derive(Debug, Clone, Copy)]
pub struct TyDisplay<'a> {
    ty: &'a Ty,
    structs: Option<&'a [StructDef]>,
}

impl TyDisplay<'_> {
    fn nested<'b>(&'b self, ty: &'b Ty) -> TyDisplay<'b> {
        TyDisplay {
            ty,
            structs: self.structs,
        }
    }
}

impl fmt::Display for TyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Ty::Int { bits } => write!(f, "i{bits}"),
            Ty::Float { bits } => write!(f, "f{bits}"),
            Ty::Bool => f.write_str("bool"),
            Ty::Unit => f.write_str("unit"),
            Ty::Ptr(pointee) => write!(f, "*{}", self.nested(pointee)),
            Ty::Function {
                params,
                ret,
                varargs,
            } => {
                f.write_str("fn(")?;
                for (idx, param) in params.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", self.nested(param))?;
                }
                if *varargs {
                    f.write_str(if params.is_empty() { "..." } else { ", ..." })?;
                }
                write!(f, ") -> {}", self.nested(ret))
            }
            Ty::Aggregate(id) => match self.structs.and_then(|s| s.get(id.0 as usize)) {
                Some(def) => f.write_str(&def.name),
                None => write!(f, "struct#{}", id.0),
            },
            Ty::Error => f.write_str("{error}"),
        }
    }
}

/// Declared struct
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    /// Qualified name
    pub name: String,
    /// Fields in layout order
    pub fields: Vec<FieldDef>,
    /// Declaration site
    pub span: FileSpan,
}

impl StructDef {
    /// Finds a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }
}

/// Struct field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: Ty,
    /// Declaration site
    pub span: FileSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_aliases() {
        assert_eq!(Ty::builtin("int"), Some(Ty::I32));
        assert_eq!(Ty::builtin("float"), Some(Ty::F64));
        assert_eq!(Ty::builtin("void"), Some(Ty::Unit));
        assert_eq!(Ty::builtin("string"), None);
    }

    #[test]
    fn test_promotion_table() {
        assert_eq!(Ty::promote(&Ty::I8, &Ty::I64), Some(Ty::I64));
        assert_eq!(Ty::promote(&Ty::F64, &Ty::F32), Some(Ty::F64));
        assert_eq!(Ty::promote(&Ty::I32, &Ty::F64), None);
        assert_eq!(Ty::promote(&Ty::Bool, &Ty::Bool), Some(Ty::Bool));
        assert_eq!(Ty::promote(&Ty::Error, &Ty::Bool), Some(Ty::Error));
    }

    #[test]
    fn test_assignability() {
        assert!(Ty::I32.is_assignable_to(&Ty::I64));
        assert!(!Ty::I64.is_assignable_to(&Ty::I32));
        assert!(!Ty::Bool.is_assignable_to(&Ty::I32));
        assert!(Ty::Error.is_assignable_to(&Ty::I32));
        assert!(Ty::ptr(Ty::I8).is_assignable_to(&Ty::c_string()));
        assert!(!Ty::ptr(Ty::I8).is_assignable_to(&Ty::ptr(Ty::I32)));
    }

    #[test]
    fn test_display_uses_struct_names() {
        let structs = vec![StructDef {
            name: "geo::Point".into(),
            fields: vec![],
            span: FileSpan::default(),
        }];
        let ty = Ty::function(vec![Ty::ptr(Ty::Aggregate(StructId(0)))], Ty::I32, true);
        assert_eq!(ty.display(&structs).to_string(), "fn(*geo::Point, ...) -> i32");
        assert_eq!(ty.to_string(), "fn(*struct#0, ...) -> i32");
    }
}
