//! Textual form of a module
//!
//! The output follows LLVM assembly closely enough to be fed to `clang`.
//! Printing is deterministic: values are renumbered in definition order and
//! blocks are labelled by their arena position.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    raw_index, BinOp, Callee, CastKind, CmpOp, Constant, FunctionBody, GlobalInit, InstKind,
    Instruction, IrType, Module, Terminator, UnOp, ValueId, ValueKind,
};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        if !self.structs.is_empty() {
            writeln!(f)?;
        }
        for layout in &self.structs {
            let fields: Vec<String> = layout.fields.iter().map(|ty| self.type_name(*ty)).collect();
            writeln!(f, "%\"{}\" = type {{ {} }}", layout.name, fields.join(", "))?;
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for (index, global) in self.globals.iter().enumerate() {
            let init = match &global.init {
                GlobalInit::Zero => self.zero(global.ty),
                GlobalInit::Const(constant) => constant_text(constant, global.ty),
                GlobalInit::CString(text) => {
                    writeln!(
                        f,
                        "@.str.g{index} = private unnamed_addr constant {}",
                        string_literal(text)
                    )?;
                    format!("@.str.g{index}")
                }
            };
            writeln!(
                f,
                "@{} = global {} {init} ; {}",
                global.symbol,
                self.type_name(global.ty),
                global.name
            )?;
        }

        for (index, function) in self.functions.iter().enumerate() {
            let Some(body) = &function.body else { continue };
            for (n, text) in body.strings.iter().enumerate() {
                writeln!(
                    f,
                    "@.str.{index}.{n} = private unnamed_addr constant {}",
                    string_literal(text)
                )?;
            }
        }

        for (index, function) in self.functions.iter().enumerate() {
            writeln!(f)?;
            let ret = self.type_name(function.sig.ret);
            match &function.body {
                None => {
                    let mut params: Vec<String> =
                        function.sig.params.iter().map(|ty| self.type_name(*ty)).collect();
                    if function.sig.varargs {
                        params.push("...".to_owned());
                    }
                    writeln!(f, "declare {ret} @{}({})", function.symbol, params.join(", "))?;
                }
                Some(body) => {
                    writeln!(f, "; {}", function.name)?;
                    let printer = BodyPrinter::new(self, index, body);
                    let params: Vec<String> = body
                        .params
                        .iter()
                        .map(|param| printer.typed(*param))
                        .collect();
                    writeln!(f, "define {ret} @{}({}) {{", function.symbol, params.join(", "))?;
                    f.write_str(&printer.print())?;
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

impl Module {
    /// Name of a type as printed
    #[must_use]
    pub fn type_name(&self, ty: IrType) -> String {
        match ty {
            IrType::Int(bits) => format!("i{bits}"),
            IrType::Float(32) => "float".to_owned(),
            IrType::Float(_) => "double".to_owned(),
            IrType::Bool => "i1".to_owned(),
            IrType::Ptr => "ptr".to_owned(),
            IrType::Struct(id) => format!("%\"{}\"", self.layout(id).name),
            IrType::Void => "void".to_owned(),
        }
    }

    fn zero(&self, ty: IrType) -> String {
        match ty {
            IrType::Struct(_) => "zeroinitializer".to_owned(),
            other => constant_text(&Constant::Zero, other),
        }
    }
}

fn constant_text(constant: &Constant, ty: IrType) -> String {
    match (constant, ty) {
        (Constant::Int(value), _) => value.to_string(),
        (Constant::Float(value), _) => format!("0x{:016X}", value.to_bits()),
        (Constant::Bool(value), _) => value.to_string(),
        (Constant::Zero, IrType::Int(_)) => "0".to_owned(),
        (Constant::Zero, IrType::Float(_)) => format!("0x{:016X}", 0f64.to_bits()),
        (Constant::Zero, IrType::Bool) => "false".to_owned(),
        (Constant::Zero, IrType::Ptr) => "null".to_owned(),
        (Constant::Zero, IrType::Struct(_) | IrType::Void) => "zeroinitializer".to_owned(),
    }
}

fn string_literal(text: &str) -> String {
    let mut escaped = String::new();
    for byte in text.bytes() {
        if (byte.is_ascii_graphic() && byte != b'"' && byte != b'\\') || byte == b' ' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("\\{byte:02X}"));
        }
    }
    format!("[{} x i8] c\"{escaped}\\00\"", text.len() + 1)
}

struct BodyPrinter<'a> {
    module: &'a Module,
    body: &'a FunctionBody,
    function: usize,
    numbers: FxHashMap<ValueId, u32>,
}

impl<'a> BodyPrinter<'a> {
    fn new(module: &'a Module, function: usize, body: &'a FunctionBody) -> Self {
        let mut numbers = FxHashMap::default();
        let mut next = 0u32;
        for param in &body.params {
            numbers.insert(*param, next);
            next += 1;
        }
        for block in body.blocks.values() {
            for inst in &block.insts {
                if let Some(result) = inst.result {
                    numbers.insert(result, next);
                    next += 1;
                }
            }
        }

        Self {
            module,
            body,
            function,
            numbers,
        }
    }

    fn ty(&self, value: ValueId) -> IrType {
        self.body.values[value].ty
    }

    fn type_of(&self, value: ValueId) -> String {
        self.module.type_name(self.ty(value))
    }

    fn operand(&self, value: ValueId) -> String {
        let data = &self.body.values[value];
        match &data.kind {
            ValueKind::Result | ValueKind::Param(_) => match self.numbers.get(&value) {
                Some(number) => format!("%{number}"),
                None => format!("%v{}", raw_index(value)),
            },
            ValueKind::Const(constant) => constant_text(constant, data.ty),
            ValueKind::Global(id) => format!("@{}", self.module.global(*id).symbol),
            ValueKind::Function(id) => format!("@{}", self.module.function(*id).symbol),
            ValueKind::String(n) => format!("@.str.{}.{n}", self.function),
        }
    }

    fn typed(&self, value: ValueId) -> String {
        format!("{} {}", self.type_of(value), self.operand(value))
    }

    fn print(&self) -> String {
        let mut out = String::new();
        for (id, block) in self.body.blocks.iter() {
            out.push_str(&format!("bb{}:\n", raw_index(id)));
            for inst in &block.insts {
                out.push_str("  ");
                out.push_str(&self.instruction(inst));
                out.push('\n');
            }
            if let Some(terminator) = &block.terminator {
                out.push_str("  ");
                out.push_str(&self.terminator(terminator));
                out.push('\n');
            }
        }
        out
    }

    fn instruction(&self, inst: &Instruction) -> String {
        let lhs = inst
            .result
            .map(|result| format!("{} = ", self.operand(result)))
            .unwrap_or_default();
        let rhs = match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => {
                let float = matches!(self.ty(*lhs), IrType::Float(_));
                format!(
                    "{} {}, {}",
                    binary_name(*op, float),
                    self.typed(*lhs),
                    self.operand(*rhs)
                )
            }
            InstKind::Compare { op, lhs, rhs } => {
                let float = matches!(self.ty(*lhs), IrType::Float(_));
                let kind = if float { "fcmp" } else { "icmp" };
                format!(
                    "{kind} {} {}, {}",
                    compare_name(*op, float),
                    self.typed(*lhs),
                    self.operand(*rhs)
                )
            }
            InstKind::Unary { op, operand } => match (op, self.ty(*operand)) {
                (UnOp::Neg, IrType::Float(_)) => format!("fneg {}", self.typed(*operand)),
                (UnOp::Neg, _) => {
                    format!("sub {} 0, {}", self.type_of(*operand), self.operand(*operand))
                }
                (UnOp::Not, IrType::Bool) => format!("xor {}, true", self.typed(*operand)),
                (UnOp::Not, _) => format!("xor {}, -1", self.typed(*operand)),
            },
            InstKind::Cast { kind, value } => {
                let name = match kind {
                    CastKind::SExt => "sext",
                    CastKind::ZExt => "zext",
                    CastKind::FpExt => "fpext",
                };
                let to = inst
                    .result
                    .map(|result| self.type_of(result))
                    .unwrap_or_default();
                format!("{name} {} to {to}", self.typed(*value))
            }
            InstKind::Call { callee, args, sig } => {
                let ret = self.module.type_name(sig.ret);
                let fn_type = if sig.varargs {
                    let mut params: Vec<String> =
                        sig.params.iter().map(|ty| self.module.type_name(*ty)).collect();
                    params.push("...".to_owned());
                    format!("{ret} ({})", params.join(", "))
                } else {
                    ret
                };
                let target = match callee {
                    Callee::Direct(id) => format!("@{}", self.module.function(*id).symbol),
                    Callee::Indirect(value) => self.operand(*value),
                };
                let args: Vec<String> = args.iter().map(|arg| self.typed(*arg)).collect();
                format!("call {fn_type} {target}({})", args.join(", "))
            }
            InstKind::Alloca { ty } => format!("alloca {}", self.module.type_name(*ty)),
            InstKind::Load { ptr } => {
                let ty = inst
                    .result
                    .map(|result| self.type_of(result))
                    .unwrap_or_default();
                format!("load {ty}, {}", self.typed(*ptr))
            }
            InstKind::Store { ptr, value } => {
                format!("store {}, {}", self.typed(*value), self.typed(*ptr))
            }
            InstKind::FieldAddr {
                base,
                layout,
                index,
            } => format!(
                "getelementptr {}, {}, i32 0, i32 {index}",
                self.module.type_name(IrType::Struct(*layout)),
                self.typed(*base)
            ),
            InstKind::ExtractField { aggregate, index } => {
                format!("extractvalue {}, {index}", self.typed(*aggregate))
            }
            InstKind::MakeAggregate { layout, fields } => {
                return self.aggregate(inst, *layout, fields);
            }
            InstKind::Phi { incoming } => {
                let ty = inst
                    .result
                    .map(|result| self.type_of(result))
                    .unwrap_or_default();
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(block, value)| {
                        format!("[ {}, %bb{} ]", self.operand(*value), raw_index(*block))
                    })
                    .collect();
                format!("phi {ty} {}", arms.join(", "))
            }
        };
        format!("{lhs}{rhs}")
    }

    // Struct values are built by a chain of insertvalue, one per field.
    fn aggregate(&self, inst: &Instruction, layout: crate::LayoutId, fields: &[ValueId]) -> String {
        let ty = self.module.type_name(IrType::Struct(layout));
        let target = inst
            .result
            .map(|result| self.operand(result))
            .unwrap_or_default();
        if fields.is_empty() {
            return format!("{target} = freeze {ty} undef");
        }
        let stem = target.trim_start_matches('%');
        let mut lines = Vec::new();
        let mut previous = "undef".to_owned();
        for (index, field) in fields.iter().enumerate() {
            let name = if index + 1 == fields.len() {
                target.clone()
            } else {
                format!("%agg.{stem}.{index}")
            };
            lines.push(format!(
                "{name} = insertvalue {ty} {previous}, {}, {index}",
                self.typed(*field)
            ));
            previous = name;
        }
        lines.join("\n  ")
    }

    fn terminator(&self, terminator: &Terminator) -> String {
        match terminator {
            Terminator::Jump(target) => format!("br label %bb{}", raw_index(*target)),
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => format!(
                "br {}, label %bb{}, label %bb{}",
                self.typed(*cond),
                raw_index(*then_block),
                raw_index(*else_block)
            ),
            Terminator::Return(Some(value)) => format!("ret {}", self.typed(*value)),
            Terminator::Return(None) => "ret void".to_owned(),
            Terminator::Unreachable => "unreachable".to_owned(),
        }
    }
}

fn binary_name(op: BinOp, float: bool) -> &'static str {
    match (op, float) {
        (BinOp::Add, false) => "add",
        (BinOp::Add, true) => "fadd",
        (BinOp::Sub, false) => "sub",
        (BinOp::Sub, true) => "fsub",
        (BinOp::Mul, false) => "mul",
        (BinOp::Mul, true) => "fmul",
        (BinOp::Div, false) => "sdiv",
        (BinOp::Div, true) => "fdiv",
        (BinOp::Rem, false) => "srem",
        (BinOp::Rem, true) => "frem",
        (BinOp::And, _) => "and",
        (BinOp::Or, _) => "or",
        (BinOp::Xor, _) => "xor",
        (BinOp::Shl, _) => "shl",
        (BinOp::Shr, _) => "ashr",
    }
}

fn compare_name(op: CmpOp, float: bool) -> &'static str {
    match (op, float) {
        (CmpOp::Eq, false) => "eq",
        (CmpOp::Eq, true) => "oeq",
        (CmpOp::Ne, false) => "ne",
        (CmpOp::Ne, true) => "one",
        (CmpOp::Lt, false) => "slt",
        (CmpOp::Lt, true) => "olt",
        (CmpOp::Le, false) => "sle",
        (CmpOp::Le, true) => "ole",
        (CmpOp::Gt, false) => "sgt",
        (CmpOp::Gt, true) => "ogt",
        (CmpOp::Ge, false) => "sge",
        (CmpOp::Ge, true) => "oge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionBuilder, FunctionSig, ModuleBuilder};
    use expect_test::expect;

    #[test]
    fn test_print_add_function() {
        let mut module = ModuleBuilder::new("demo");
        let sig = FunctionSig::new(vec![IrType::Int(32)], IrType::Int(32));
        let id = module.new_function("demo::inc", sig.clone()).unwrap();
        let mut builder = FunctionBuilder::new(&sig);
        let x = builder.param(0);
        let one = builder.const_int(1, 32);
        let sum = builder.binary(BinOp::Add, x, one);
        builder.ret(Some(sum));
        module.define_function(id, builder.finish()).unwrap();

        let text = module.finish().unwrap().to_string();
        expect![[r#"
            ; ModuleID = 'demo'

            ; demo::inc
            define i32 @acorn_coded__demo__inc_op_i32_cl___i32(i32 %0) {
            bb0:
              %1 = add i32 %0, 1
              ret i32 %1
            }
        "#]]
        .assert_eq(&text);
    }

    #[test]
    fn test_print_varargs_call_and_strings() {
        let mut module = ModuleBuilder::new("demo");
        let printf_sig = FunctionSig::new(vec![IrType::Ptr], IrType::Int(32)).with_varargs(true);
        let printf = module
            .declare_extern("demo::printf", printf_sig.clone(), "printf")
            .unwrap();
        let sig = FunctionSig::new(vec![], IrType::Void);
        let id = module.new_function("demo::hello", sig.clone()).unwrap();
        let mut builder = FunctionBuilder::new(&sig);
        let text = builder.string("hi\n");
        let n = builder.const_int(7, 32);
        builder.call(Callee::Direct(printf), vec![text, n], printf_sig);
        builder.ret(None);
        module.define_function(id, builder.finish()).unwrap();

        let text = module.finish().unwrap().to_string();
        expect![[r#"
            ; ModuleID = 'demo'
            @.str.1.0 = private unnamed_addr constant [4 x i8] c"hi\0A\00"

            declare i32 @printf(ptr, ...)

            ; demo::hello
            define void @acorn_coded__demo__hello_op__cl___void() {
            bb0:
              %0 = call i32 (ptr, ...) @printf(ptr @.str.1.0, i32 7)
              ret void
            }
        "#]]
        .assert_eq(&text);
    }

    #[test]
    fn test_print_struct_and_globals() {
        let mut module = ModuleBuilder::new("demo");
        let point = module
            .declare_struct("demo::Point", vec![IrType::Int(32), IrType::Float(64)])
            .unwrap();
        module
            .declare_global("demo::origin", IrType::Struct(point), GlobalInit::Zero)
            .unwrap();
        module
            .declare_global("demo::count", IrType::Int(64), GlobalInit::Const(Constant::Int(3)))
            .unwrap();
        module
            .declare_global("demo::name", IrType::Ptr, GlobalInit::CString("acorn".into()))
            .unwrap();

        let text = module.finish().unwrap().to_string();
        expect![[r#"
            ; ModuleID = 'demo'

            %"demo::Point" = type { i32, double }

            @acorn_coded__demo__origin = global %"demo::Point" zeroinitializer ; demo::origin
            @acorn_coded__demo__count = global i64 3 ; demo::count
            @.str.g2 = private unnamed_addr constant [6 x i8] c"acorn\00"
            @acorn_coded__demo__name = global ptr @.str.g2 ; demo::name
        "#]]
        .assert_eq(&text);
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(string_literal("a\"b"), "[4 x i8] c\"a\\22b\\00\"");
        assert_eq!(string_literal(""), "[1 x i8] c\"\\00\"");
    }
}
