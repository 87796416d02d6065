//! Pretty-print helpers for instructions, terminators, functions, and modules.
//!
//! The output is accepted back by [`crate::modules::parser`].
use std::fmt::{Display, Formatter, Result};

use crate::{
    modules::{
        Function, Module,
        attributes::Attribute,
        instructions::KmInstr,
        metadata::{MetadataNode, MetadataValue},
        operand::{Label, Operand},
        symbol::{ExternalFunction, GlobalVariable},
        terminator::Terminator,
    },
    types::fmt_return_type,
};

/// String literal in the escape syntax the parser reads: `\\`, `\"`, `\n`,
/// `\t`, `\r` and `\u{..}` for the other control characters.
pub(crate) struct Quoted<'a>(pub &'a str);

impl Display for Quoted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "\"")?;
        for c in self.0.chars() {
            match c {
                '\\' => write!(f, "\\\\")?,
                '"' => write!(f, "\\\"")?,
                '\n' => write!(f, "\\n")?,
                '\t' => write!(f, "\\t")?,
                '\r' => write!(f, "\\r")?,
                c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
                c => write!(f, "{}", c)?,
            }
        }
        write!(f, "\"")
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "block_{}", self.0)
    }
}

impl Operand {
    /// Build a formatting helper that renders the operand using the given module for context.
    pub fn fmt<'a>(&'a self, module: &'a Module) -> impl Display + 'a {
        struct Fmt<'a> {
            operand: &'a Operand,
            module: &'a Module,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                match self.operand {
                    Operand::Reg(name) => write!(f, "%{}", name),
                    Operand::Imm(value) => write!(f, "{}", value),
                    Operand::Null => write!(f, "null"),
                    Operand::Func(ptr) => match self.module.function_name(ptr) {
                        Some(name) => write!(f, "@{}", name),
                        None => write!(f, "@<{}>", ptr.uuid()),
                    },
                    Operand::Global(uuid) => match self.module.get_global(*uuid) {
                        Some(global) => write!(f, "@{}", global.name),
                        None => write!(f, "@<{}>", uuid),
                    },
                }
            }
        }

        Fmt {
            operand: self,
            module,
        }
    }
}

impl KmInstr {
    /// Build a formatting helper that renders the instruction.
    pub fn fmt<'a>(&'a self, module: &'a Module) -> impl Display + 'a {
        struct Fmt<'a> {
            instr: &'a KmInstr,
            module: &'a Module,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                let module = self.module;
                match self.instr {
                    KmInstr::Invoke(invoke) => {
                        if let (Some(dest), Some(ty)) = (invoke.dest, invoke.ty) {
                            write!(f, "%{}: {} = ", dest, ty)?;
                        }
                        write!(f, "call {}(", invoke.function.fmt(module))?;
                        for (i, arg) in invoke.args.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", arg.fmt(module))?;
                        }
                        write!(f, ")")
                    }
                    KmInstr::IBinary(bin) => write!(
                        f,
                        "%{}: {} = {} {}, {}",
                        bin.dest,
                        bin.ty,
                        bin.op,
                        bin.lhs.fmt(module),
                        bin.rhs.fmt(module)
                    ),
                    KmInstr::MLoad(load) => write!(
                        f,
                        "%{}: {} = load {}",
                        load.dest,
                        load.ty,
                        load.addr.fmt(module)
                    ),
                    KmInstr::MStore(store) => write!(
                        f,
                        "store {}, {}",
                        store.value.fmt(module),
                        store.addr.fmt(module)
                    ),
                }
            }
        }

        Fmt {
            instr: self,
            module,
        }
    }
}

impl Terminator {
    pub fn fmt<'a>(&'a self, module: &'a Module) -> impl Display + 'a {
        struct Fmt<'a> {
            term: &'a Terminator,
            module: &'a Module,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                match self.term {
                    Terminator::Jump(jump) => write!(f, "jump {}", jump.target),
                    Terminator::CBranch(cbranch) => write!(
                        f,
                        "branch {}, {}, {}",
                        cbranch.cond.fmt(self.module),
                        cbranch.target_true,
                        cbranch.target_false
                    ),
                    Terminator::Ret(ret) => match &ret.value {
                        Some(value) => write!(f, "ret {}", value.fmt(self.module)),
                        None => write!(f, "ret void"),
                    },
                    Terminator::Unreachable => write!(f, "unreachable"),
                }
            }
        }

        Fmt { term: self, module }
    }
}

impl Function {
    pub fn fmt<'a>(&'a self, module: &'a Module) -> impl Display + 'a {
        struct Fmt<'a> {
            func: &'a Function,
            module: &'a Module,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                let func = self.func;
                write!(
                    f,
                    "define {} {} @{}(",
                    func.linkage,
                    fmt_return_type(func.return_type),
                    func.name
                )?;
                for (i, (name, ty)) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "%{}: {}", name, ty)?;
                }
                write!(f, ")")?;

                for attr in func.attributes.iter() {
                    match attr {
                        Attribute::Kind(kind) => write!(f, " {}", kind)?,
                        Attribute::String { key, value } if value.is_empty() => {
                            write!(f, " {}", Quoted(key))?
                        }
                        Attribute::String { key, value } => {
                            write!(f, " {}={}", Quoted(key), Quoted(value))?
                        }
                    }
                }

                writeln!(f, " {{")?;
                for bb in func.body.values() {
                    writeln!(f, "{}:", bb.label)?;
                    for instr in &bb.instructions {
                        writeln!(f, "    {}", instr.fmt(self.module))?;
                    }
                    writeln!(f, "    {}", bb.terminator.fmt(self.module))?;
                }
                write!(f, "}}")
            }
        }

        Fmt { func: self, module }
    }
}

impl Display for ExternalFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "declare {} @{}(", fmt_return_type(self.return_type), self.name)?;
        for (i, ty) in self.param_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ")")
    }
}

impl Display for GlobalVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "global {} {} @{}", self.linkage, self.ty, self.name)?;
        if let Some(init) = self.initializer {
            write!(f, " = {}", init)?;
        }
        Ok(())
    }
}

impl MetadataNode {
    pub fn fmt<'a>(&'a self, module: &'a Module) -> impl Display + 'a {
        struct Fmt<'a> {
            node: &'a MetadataNode,
            module: &'a Module,
        }

        impl Display for Fmt<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                write!(f, "!{{")?;
                for (i, value) in self.node.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match value {
                        MetadataValue::Symbol(symbol) => match self.module.symbol_name(symbol) {
                            Some(name) => write!(f, "@{}", name)?,
                            None => write!(f, "@<unresolved>")?,
                        },
                        MetadataValue::Str(s) => write!(f, "{}", Quoted(s))?,
                        MetadataValue::Int(v) => write!(f, "{}", v)?,
                    }
                }
                write!(f, "}}")
            }
        }

        Fmt { node: self, module }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "module {}", Quoted(&self.name))?;

        if !self.globals.is_empty() || !self.external_functions.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            writeln!(f, "{}", global)?;
        }
        for ext in &self.external_functions {
            writeln!(f, "{}", ext)?;
        }

        for func in &self.functions {
            writeln!(f)?;
            writeln!(f, "{}", func.fmt(self))?;
        }

        if !self.named_metadata.is_empty() {
            writeln!(f)?;
        }
        for md in &self.named_metadata {
            for node in &md.operands {
                writeln!(f, "!{} = {}", md.name, node.fmt(self))?;
            }
        }

        Ok(())
    }
}
