//! Module assembly: declarations, definitions and symbol mangling

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{Constant, FuncId, FunctionBody, FunctionSig, GlobalId, IrType, LayoutId};

/// Prefix of every mangled symbol
pub const MANGLE_PREFIX: &str = "acorn_coded";

/// Errors raised while assembling a module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// A name or link symbol was declared twice
    #[error("`{name}` is declared more than once")]
    DuplicateDeclaration {
        /// The clashing name
        name: String,
    },

    /// `finish` was called while declared functions still lack bodies
    #[error("module is incomplete: no body for {}", missing.join(", "))]
    IncompleteModule {
        /// Functions without bodies, in declaration order
        missing: Vec<String>,
    },

    /// A function was given a second body
    #[error("function `{name}` already has a body")]
    AlreadyDefined {
        /// The function
        name: String,
    },

    /// A body was supplied for an external function
    #[error("external function `{name}` cannot have a body")]
    ExternDefinition {
        /// The function
        name: String,
    },
}

/// Struct layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Qualified struct name
    pub name: String,
    /// Field types in declaration order
    pub fields: Vec<IrType>,
}

/// Initial value of a global
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    /// All zeroes
    Zero,
    /// Scalar constant
    Const(Constant),
    /// Pointer to a NUL-terminated string
    CString(String),
}

/// Global variable
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Qualified source name
    pub name: String,
    /// Link symbol
    pub symbol: String,
    /// Stored type
    pub ty: IrType,
    /// Initial value
    pub init: GlobalInit,
}

/// Function declaration, with its body once defined
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Qualified source name
    pub name: String,
    /// Link symbol
    pub symbol: String,
    /// Signature
    pub sig: FunctionSig,
    /// Defined outside the module
    pub is_extern: bool,
    /// Lowered body
    pub body: Option<FunctionBody>,
}

/// Finished module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Struct layouts
    pub structs: Vec<StructLayout>,
    /// Globals
    pub globals: Vec<Global>,
    /// Functions in declaration order
    pub functions: Vec<Function>,
}

impl Module {
    /// Function by id
    #[must_use]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    /// Global by id
    #[must_use]
    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    /// Struct layout by id
    #[must_use]
    pub fn layout(&self, id: LayoutId) -> &StructLayout {
        &self.structs[id.0 as usize]
    }

    /// Function by qualified source name
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

/// Incrementally assembles a [`Module`]
///
/// Functions are declared before any body is lowered so calls can refer to
/// functions defined later. `finish` succeeds only once every non-external
/// function has a body.
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    structs: Vec<StructLayout>,
    globals: Vec<Global>,
    functions: Vec<Function>,
    names: FxHashSet<String>,
    symbols: FxHashSet<String>,
    struct_names: FxHashSet<String>,
    externs: FxHashMap<String, FuncId>,
}

impl ModuleBuilder {
    /// Creates an empty module
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            names: FxHashSet::default(),
            symbols: FxHashSet::default(),
            struct_names: FxHashSet::default(),
            externs: FxHashMap::default(),
        }
    }

    /// Module name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // Functions and globals share one namespace for source names and one for
    // link symbols.
    fn claim(&mut self, name: &str, symbol: &str) -> Result<(), ModuleError> {
        if self.names.contains(name) {
            return Err(ModuleError::DuplicateDeclaration {
                name: name.to_owned(),
            });
        }
        if self.symbols.contains(symbol) {
            return Err(ModuleError::DuplicateDeclaration {
                name: symbol.to_owned(),
            });
        }
        self.names.insert(name.to_owned());
        self.symbols.insert(symbol.to_owned());
        Ok(())
    }

    /// Id the next declared struct layout will get
    #[must_use]
    pub fn next_layout(&self) -> LayoutId {
        LayoutId(self.structs.len() as u32)
    }

    /// Declares a struct layout
    ///
    /// # Errors
    ///
    /// Fails if `name` is already declared.
    pub fn declare_struct(
        &mut self,
        name: &str,
        fields: Vec<IrType>,
    ) -> Result<LayoutId, ModuleError> {
        if !self.struct_names.insert(name.to_owned()) {
            return Err(ModuleError::DuplicateDeclaration {
                name: name.to_owned(),
            });
        }
        let id = LayoutId(self.structs.len() as u32);
        self.structs.push(StructLayout {
            name: name.to_owned(),
            fields,
        });
        log::debug!("declared struct {name} as layout {}", id.0);
        Ok(id)
    }

    /// Declares a global with its initial value
    ///
    /// # Errors
    ///
    /// Fails if `name` is already declared.
    pub fn declare_global(
        &mut self,
        name: &str,
        ty: IrType,
        init: GlobalInit,
    ) -> Result<GlobalId, ModuleError> {
        let symbol = mangle_safe(&format!("{MANGLE_PREFIX}::{name}"));
        self.claim(name, &symbol)?;
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.to_owned(),
            symbol,
            ty,
            init,
        });
        log::debug!("declared global {name}");
        Ok(id)
    }

    /// Declares a function to be defined later, under its mangled symbol
    ///
    /// A function whose item name is `main` keeps the plain symbol `main`.
    ///
    /// # Errors
    ///
    /// Fails if the name or resulting symbol is already declared.
    pub fn new_function(&mut self, name: &str, sig: FunctionSig) -> Result<FuncId, ModuleError> {
        let item = name.rsplit("::").next().unwrap_or(name);
        let symbol = if item == "main" {
            "main".to_owned()
        } else {
            mangle(name, &sig, &self.structs)
        };
        self.push_function(name, symbol, sig, false)
    }

    /// Declares a function to be defined later under an explicit symbol
    ///
    /// # Errors
    ///
    /// Fails if the name or symbol is already declared.
    pub fn new_function_with_symbol(
        &mut self,
        name: &str,
        sig: FunctionSig,
        symbol: &str,
    ) -> Result<FuncId, ModuleError> {
        self.push_function(name, symbol.to_owned(), sig, false)
    }

    /// Declares a function defined outside the module
    ///
    /// Several units may declare the same external symbol; declarations with
    /// an identical signature share one slot.
    ///
    /// # Errors
    ///
    /// Fails if the name is already declared, or the symbol is already used
    /// by a different function.
    pub fn declare_extern(
        &mut self,
        name: &str,
        sig: FunctionSig,
        symbol: &str,
    ) -> Result<FuncId, ModuleError> {
        if let Some(&existing) = self.externs.get(symbol) {
            if self.function(existing).sig == sig && self.names.insert(name.to_owned()) {
                log::debug!("{name} reuses external {symbol}");
                return Ok(existing);
            }
            return Err(ModuleError::DuplicateDeclaration {
                name: symbol.to_owned(),
            });
        }
        let id = self.push_function(name, symbol.to_owned(), sig, true)?;
        self.externs.insert(symbol.to_owned(), id);
        Ok(id)
    }

    fn push_function(
        &mut self,
        name: &str,
        symbol: String,
        sig: FunctionSig,
        is_extern: bool,
    ) -> Result<FuncId, ModuleError> {
        self.claim(name, &symbol)?;
        let id = FuncId(self.functions.len() as u32);
        log::debug!("declared function {name} as {symbol}");
        self.functions.push(Function {
            name: name.to_owned(),
            symbol,
            sig,
            is_extern,
            body: None,
        });
        Ok(id)
    }

    /// Declared function
    #[must_use]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    /// Declared struct layout
    #[must_use]
    pub fn layout(&self, id: LayoutId) -> &StructLayout {
        &self.structs[id.0 as usize]
    }

    /// Attaches a body to a declared function
    ///
    /// # Errors
    ///
    /// Fails if the function is external or already defined.
    pub fn define_function(&mut self, id: FuncId, body: FunctionBody) -> Result<(), ModuleError> {
        let function = &mut self.functions[id.0 as usize];
        if function.is_extern {
            return Err(ModuleError::ExternDefinition {
                name: function.name.clone(),
            });
        }
        if function.body.is_some() {
            return Err(ModuleError::AlreadyDefined {
                name: function.name.clone(),
            });
        }
        log::debug!(
            "defined {} with {} blocks",
            function.name,
            body.blocks.len()
        );
        function.body = Some(body);
        Ok(())
    }

    /// Finishes the module
    ///
    /// # Errors
    ///
    /// Fails with [`ModuleError::IncompleteModule`] if a declared function
    /// still has no body.
    pub fn finish(self) -> Result<Module, ModuleError> {
        let missing: Vec<String> = self
            .functions
            .iter()
            .filter(|function| !function.is_extern && function.body.is_none())
            .map(|function| function.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ModuleError::IncompleteModule { missing });
        }
        Ok(Module {
            name: self.name,
            structs: self.structs,
            globals: self.globals,
            functions: self.functions,
        })
    }
}

/// Link symbol for a function: the qualified name and signature, made safe
/// for assemblers
#[must_use]
pub fn mangle(name: &str, sig: &FunctionSig, structs: &[StructLayout]) -> String {
    let mut params: Vec<String> = sig
        .params
        .iter()
        .map(|ty| mangle_type(*ty, structs))
        .collect();
    if sig.varargs {
        params.push("...".to_owned());
    }
    let raw = format!(
        "{MANGLE_PREFIX}::{name}({})::{}",
        params.join(","),
        mangle_type(sig.ret, structs)
    );
    mangle_safe(&raw)
}

fn mangle_type(ty: IrType, structs: &[StructLayout]) -> String {
    match ty {
        IrType::Int(bits) => format!("i{bits}"),
        IrType::Float(bits) => format!("f{bits}"),
        IrType::Bool => "bool".to_owned(),
        IrType::Ptr => "ptr".to_owned(),
        IrType::Struct(id) => structs
            .get(id.0 as usize)
            .map_or_else(|| format!("struct{}", id.0), |layout| layout.name.clone()),
        IrType::Void => "void".to_owned(),
    }
}

fn mangle_safe(raw: &str) -> String {
    raw.replace('(', "_op_")
        .replace(')', "_cl_")
        .replace(',', "_sep_")
        .replace("...", "_va_")
        .replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionBuilder;

    fn empty_body(sig: &FunctionSig) -> FunctionBody {
        let mut builder = FunctionBuilder::new(sig);
        builder.ret(None);
        builder.finish()
    }

    #[test]
    fn test_mangle_function() {
        let sig = FunctionSig::new(vec![IrType::Int(32), IrType::Int(32)], IrType::Int(32));
        assert_eq!(
            mangle("main::add", &sig, &[]),
            "acorn_coded__main__add_op_i32_sep_i32_cl___i32"
        );
    }

    #[test]
    fn test_mangle_distinguishes_signatures() {
        let a = FunctionSig::new(vec![IrType::Int(32)], IrType::Void);
        let b = FunctionSig::new(vec![IrType::Int(64)], IrType::Void);
        assert_ne!(mangle("m::f", &a, &[]), mangle("m::f", &b, &[]));
    }

    #[test]
    fn test_main_keeps_plain_symbol() {
        let mut module = ModuleBuilder::new("test");
        let id = module
            .new_function("app::main", FunctionSig::new(vec![], IrType::Int(32)))
            .unwrap();
        assert_eq!(module.function(id).symbol, "main");
    }

    #[test]
    fn test_duplicate_global() {
        let mut module = ModuleBuilder::new("test");
        module
            .declare_global("m::g", IrType::Int(32), GlobalInit::Zero)
            .unwrap();
        let err = module
            .declare_global("m::g", IrType::Int(64), GlobalInit::Zero)
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::DuplicateDeclaration {
                name: "m::g".to_string()
            }
        );
    }

    #[test]
    fn test_two_mains_clash() {
        let mut module = ModuleBuilder::new("test");
        let sig = FunctionSig::new(vec![], IrType::Int(32));
        module.new_function("a::main", sig.clone()).unwrap();
        let err = module.new_function("b::main", sig).unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateDeclaration { name } if name == "main"));
    }

    #[test]
    fn test_shared_extern() {
        let mut module = ModuleBuilder::new("test");
        let sig = FunctionSig::new(vec![IrType::Ptr], IrType::Int(32));
        let a = module.declare_extern("a::puts", sig.clone(), "puts").unwrap();
        let b = module.declare_extern("b::puts", sig, "puts").unwrap();
        assert_eq!(a, b);

        let other = FunctionSig::new(vec![], IrType::Void);
        let err = module.declare_extern("c::puts", other, "puts").unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateDeclaration { name } if name == "puts"));
    }

    #[test]
    fn test_struct_names_separate_from_functions() {
        let mut module = ModuleBuilder::new("test");
        module.declare_struct("m::Point", vec![IrType::Int(32)]).unwrap();
        module
            .new_function("m::Point", FunctionSig::new(vec![], IrType::Void))
            .unwrap();
        assert!(module.declare_struct("m::Point", vec![]).is_err());
    }

    #[test]
    fn test_incomplete_module() {
        let mut module = ModuleBuilder::new("test");
        let sig = FunctionSig::new(vec![], IrType::Void);
        module.new_function("m::f", sig.clone()).unwrap();
        let g = module.new_function("m::g", sig.clone()).unwrap();
        module.declare_extern("m::puts", sig.clone(), "puts").unwrap();
        module.define_function(g, empty_body(&sig)).unwrap();

        let err = module.finish().unwrap_err();
        assert_eq!(
            err,
            ModuleError::IncompleteModule {
                missing: vec!["m::f".to_string()]
            }
        );
    }

    #[test]
    fn test_define_twice() {
        let mut module = ModuleBuilder::new("test");
        let sig = FunctionSig::new(vec![], IrType::Void);
        let f = module.new_function("m::f", sig.clone()).unwrap();
        module.define_function(f, empty_body(&sig)).unwrap();
        let err = module.define_function(f, empty_body(&sig)).unwrap_err();
        assert!(matches!(err, ModuleError::AlreadyDefined { .. }));
    }

    #[test]
    fn test_extern_cannot_be_defined() {
        let mut module = ModuleBuilder::new("test");
        let sig = FunctionSig::new(vec![], IrType::Void);
        let f = module.declare_extern("m::exit", sig.clone(), "exit").unwrap();
        let err = module.define_function(f, empty_body(&sig)).unwrap_err();
        assert!(matches!(err, ModuleError::ExternDefinition { .. }));
    }
}
