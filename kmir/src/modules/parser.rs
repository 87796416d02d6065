//! Textual form of modules.
//!
//! Parsing happens in two steps: chumsky parsers produce a raw syntax tree
//! where every reference is still a name, then [`lower`] resolves registers,
//! labels and symbols into a [`Module`]. Symbols may be referenced before
//! they are defined.
//!
//! ```text
//! module "kernels"
//!
//! declare i32 @__kmpc_target_init(ptr, ptr)
//! global external i32 @counter = 0
//!
//! define external void @foo(%env: ptr) optnone "key"="value" {
//! entry:
//!     %r: i32 = call @__kmpc_target_init(%env, null)
//!     ret void
//! }
//!
//! !nvvm.annotations = !{@foo, "kernel", 1}
//! ```
use std::{collections::BTreeMap, str::FromStr};

use chumsky::prelude::*;
use log::debug;
use smallvec::SmallVec;

use crate::{
    modules::{
        BasicBlock, Function, Module,
        attributes::{AttrKind, AttributeSet},
        instructions::{IBinary, IBinaryOp, Invoke, KmInstr, MLoad, MStore},
        metadata::{MetadataNode, MetadataValue},
        operand::{Label, Name, Operand},
        symbol::{ExternalFunction, FunctionPointer, GlobalVariable, Linkage, SymbolRef},
        terminator::{CBranch, Jump, Ret, Terminator},
    },
    types::Type,
    utils::Error,
};

type Extra<'src> = extra::Err<Rich<'src, char>>;

#[derive(Debug, Clone)]
enum RawOperand {
    Reg(String),
    Imm(i64),
    Null,
    Symbol(String),
}

#[derive(Debug, Clone)]
enum RawInstr {
    Call {
        dest: Option<(String, Type)>,
        callee: RawOperand,
        args: Vec<RawOperand>,
    },
    Binary {
        dest: (String, Type),
        op: IBinaryOp,
        lhs: RawOperand,
        rhs: RawOperand,
    },
    Load {
        dest: (String, Type),
        addr: RawOperand,
    },
    Store {
        value: RawOperand,
        addr: RawOperand,
    },
}

#[derive(Debug, Clone)]
enum RawTerminator {
    Jump(String),
    Branch(RawOperand, String, String),
    Ret(Option<RawOperand>),
    Unreachable,
}

#[derive(Debug, Clone)]
struct RawBlock {
    label: String,
    instructions: Vec<RawInstr>,
    terminator: RawTerminator,
}

#[derive(Debug, Clone)]
enum RawAttr {
    Kind(AttrKind),
    Str(String, String),
}

#[derive(Debug, Clone)]
struct RawFunction {
    linkage: Option<Linkage>,
    return_type: Option<Type>,
    name: String,
    params: Vec<(String, Type)>,
    attrs: Vec<RawAttr>,
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone)]
enum RawMeta {
    Symbol(String),
    Str(String),
    Int(i64),
}

#[derive(Debug, Clone)]
enum Item {
    Function(RawFunction),
    Declare {
        return_type: Option<Type>,
        name: String,
        params: Vec<Type>,
    },
    Global {
        linkage: Option<Linkage>,
        ty: Type,
        name: String,
        init: Option<i64>,
    },
    Metadata {
        name: String,
        values: Vec<RawMeta>,
    },
}

/// Whitespace and `;` line comments.
fn ws<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    let comment = just(';')
        .then(any().and_is(text::newline().not()).repeated())
        .ignored();

    choice((text::whitespace().at_least(1).ignored(), comment))
        .repeated()
        .ignored()
}

fn symbol_name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("symbol name")
}

fn int_literal<'src>() -> impl Parser<'src, &'src str, i64, Extra<'src>> + Clone {
    just('-')
        .or_not()
        .then(text::int(10))
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<i64>()
                .map_err(|e| Rich::custom(span, format!("invalid integer literal {}: {}", s, e)))
        })
        .labelled("integer literal")
}

fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    let unicode = text::digits(16)
        .at_least(1)
        .at_most(6)
        .to_slice()
        .delimited_by(just("u{"), just('}'))
        .try_map(|hex: &str, span| {
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Rich::custom(span, format!("invalid unicode escape `{}`", hex)))
        });

    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('"'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        unicode,
    )));

    none_of("\\\"")
        .or(escape)
        .repeated()
        .collect::<String>()
        .delimited_by(just('"'), just('"'))
        .labelled("string literal")
}

fn type_parser<'src>() -> impl Parser<'src, &'src str, Type, Extra<'src>> + Clone {
    text::ident()
        .try_map(|s: &str, span| {
            Type::from_str(s).map_err(|_| Rich::custom(span, format!("unknown type `{}`", s)))
        })
        .labelled("type")
}

fn maybe_type_parser<'src>() -> impl Parser<'src, &'src str, Option<Type>, Extra<'src>> + Clone {
    choice((just("void").to(None), type_parser().map(Some))).labelled("maybe type")
}

fn linkage_parser<'src>() -> impl Parser<'src, &'src str, Linkage, Extra<'src>> + Clone {
    text::ident()
        .try_map(|s: &str, span| {
            Linkage::from_str(s).map_err(|_| Rich::custom(span, format!("unknown linkage `{}`", s)))
        })
        .labelled("linkage")
}

fn operand_parser<'src>() -> impl Parser<'src, &'src str, RawOperand, Extra<'src>> + Clone {
    choice((
        just('%').ignore_then(symbol_name()).map(RawOperand::Reg),
        just('@').ignore_then(symbol_name()).map(RawOperand::Symbol),
        just("null").to(RawOperand::Null),
        int_literal().map(RawOperand::Imm),
    ))
    .labelled("operand")
}

fn instruction_parser<'src>() -> impl Parser<'src, &'src str, RawInstr, Extra<'src>> + Clone {
    let comma = just(',').padded_by(ws());

    let dest = just('%')
        .ignore_then(symbol_name())
        .then_ignore(just(':').padded_by(ws()))
        .then(type_parser())
        .then_ignore(just('=').padded_by(ws()));

    let args = operand_parser()
        .padded_by(ws())
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'));

    let call = dest
        .clone()
        .or_not()
        .then_ignore(just("call"))
        .then_ignore(ws())
        .then(operand_parser())
        .then_ignore(ws())
        .then(args)
        .map(|((dest, callee), args)| RawInstr::Call { dest, callee, args })
        .labelled("call");

    let load = dest
        .clone()
        .then_ignore(just("load"))
        .then_ignore(ws())
        .then(operand_parser())
        .map(|(dest, addr)| RawInstr::Load { dest, addr })
        .labelled("load");

    let binop = text::ident().try_map(|s: &str, span| {
        IBinaryOp::from_str(s).map_err(|_| Rich::custom(span, format!("unknown operation `{}`", s)))
    });

    let binary = dest
        .then(binop)
        .then_ignore(ws())
        .then(operand_parser())
        .then_ignore(comma.clone())
        .then(operand_parser())
        .map(|(((dest, op), lhs), rhs)| RawInstr::Binary { dest, op, lhs, rhs })
        .labelled("binary operation");

    let store = just("store")
        .ignore_then(ws())
        .ignore_then(operand_parser())
        .then_ignore(comma)
        .then(operand_parser())
        .map(|(value, addr)| RawInstr::Store { value, addr })
        .labelled("store");

    choice((call, load, binary, store)).labelled("instruction")
}

fn terminator_parser<'src>() -> impl Parser<'src, &'src str, RawTerminator, Extra<'src>> + Clone {
    let comma = just(',').padded_by(ws());

    choice((
        just("jump")
            .ignore_then(ws())
            .ignore_then(symbol_name())
            .map(RawTerminator::Jump),
        just("branch")
            .ignore_then(ws())
            .ignore_then(operand_parser())
            .then_ignore(comma.clone())
            .then(symbol_name())
            .then_ignore(comma)
            .then(symbol_name())
            .map(|((cond, t), f)| RawTerminator::Branch(cond, t, f)),
        just("ret")
            .ignore_then(ws())
            .ignore_then(choice((
                just("void").to(None),
                operand_parser().map(Some),
            )))
            .map(RawTerminator::Ret),
        just("unreachable").to(RawTerminator::Unreachable),
    ))
    .labelled("terminator")
}

fn block_parser<'src>() -> impl Parser<'src, &'src str, RawBlock, Extra<'src>> + Clone {
    symbol_name()
        .then_ignore(just(':'))
        .padded_by(ws())
        .then(
            instruction_parser()
                .padded_by(ws())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then(terminator_parser().padded_by(ws()))
        .map(|((label, instructions), terminator)| RawBlock {
            label,
            instructions,
            terminator,
        })
        .labelled("block")
}

fn attribute_parser<'src>() -> impl Parser<'src, &'src str, RawAttr, Extra<'src>> + Clone {
    choice((
        string_literal()
            .then(just('=').ignore_then(string_literal()).or_not())
            .map(|(key, value)| RawAttr::Str(key, value.unwrap_or_default())),
        text::ident().try_map(|s: &str, span| {
            AttrKind::from_str(s)
                .map(RawAttr::Kind)
                .map_err(|_| Rich::custom(span, format!("unknown attribute `{}`", s)))
        }),
    ))
    .labelled("attribute")
}

fn function_parser<'src>() -> impl Parser<'src, &'src str, RawFunction, Extra<'src>> + Clone {
    let params = just('%')
        .ignore_then(symbol_name())
        .then_ignore(just(':').padded_by(ws()))
        .then(type_parser())
        .padded_by(ws())
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'));

    just("define")
        .ignore_then(ws())
        .ignore_then(linkage_parser().then_ignore(ws()).or_not())
        .then(maybe_type_parser())
        .then_ignore(ws())
        .then(just('@').ignore_then(symbol_name()))
        .then(params)
        .then_ignore(ws())
        .then(
            attribute_parser()
                .then_ignore(ws())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then(
            block_parser()
                .repeated()
                .collect::<Vec<_>>()
                .padded_by(ws())
                .delimited_by(just('{'), just('}')),
        )
        .map(
            |(((((linkage, return_type), name), params), attrs), blocks)| RawFunction {
                linkage,
                return_type,
                name,
                params,
                attrs,
                blocks,
            },
        )
        .labelled("function definition")
}

fn item_parser<'src>() -> impl Parser<'src, &'src str, Item, Extra<'src>> + Clone {
    let declare = just("declare")
        .ignore_then(ws())
        .ignore_then(maybe_type_parser())
        .then_ignore(ws())
        .then(just('@').ignore_then(symbol_name()))
        .then(
            type_parser()
                .padded_by(ws())
                .separated_by(just(','))
                .collect::<Vec<_>>()
                .delimited_by(just('('), just(')')),
        )
        .map(|((return_type, name), params)| Item::Declare {
            return_type,
            name,
            params,
        })
        .labelled("declaration");

    let global = just("global")
        .ignore_then(ws())
        .ignore_then(linkage_parser().then_ignore(ws()).or_not())
        .then(type_parser())
        .then_ignore(ws())
        .then(just('@').ignore_then(symbol_name()))
        .then(
            just('=')
                .padded_by(ws())
                .ignore_then(int_literal())
                .or_not(),
        )
        .map(|(((linkage, ty), name), init)| Item::Global {
            linkage,
            ty,
            name,
            init,
        })
        .labelled("global variable");

    let meta_value = choice((
        just('@').ignore_then(symbol_name()).map(RawMeta::Symbol),
        string_literal().map(RawMeta::Str),
        int_literal().map(RawMeta::Int),
    ));

    let metadata = just('!')
        .ignore_then(symbol_name())
        .then_ignore(just('=').padded_by(ws()))
        .then_ignore(just('!'))
        .then(
            meta_value
                .padded_by(ws())
                .separated_by(just(','))
                .collect::<Vec<_>>()
                .delimited_by(just('{'), just('}')),
        )
        .map(|(name, values)| Item::Metadata { name, values })
        .labelled("named metadata");

    choice((
        function_parser().map(Item::Function),
        declare,
        global,
        metadata,
    ))
}

fn module_parser<'src>()
-> impl Parser<'src, &'src str, (Option<String>, Vec<Item>), Extra<'src>> + Clone {
    just("module")
        .ignore_then(ws())
        .ignore_then(string_literal())
        .or_not()
        .padded_by(ws())
        .then(item_parser().padded_by(ws()).repeated().collect::<Vec<_>>())
        .then_ignore(end())
}

/// Resolves the names of one function body.
struct FunctionScope<'a> {
    symbols: &'a BTreeMap<String, SymbolRef>,
    registers: BTreeMap<String, Name>,
    labels: BTreeMap<String, Label>,
}

impl FunctionScope<'_> {
    fn register(&mut self, name: &str) -> Name {
        let next = self.registers.len() as Name;
        *self.registers.entry(name.to_string()).or_insert(next)
    }

    fn label(&mut self, name: &str) -> Label {
        let next = Label(self.labels.len() as u32);
        *self.labels.entry(name.to_string()).or_insert(next)
    }

    fn symbol(&self, name: &str) -> Result<SymbolRef, Error> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnresolvedSymbol {
                name: name.to_string(),
            })
    }

    fn operand(&mut self, raw: &RawOperand) -> Result<Operand, Error> {
        Ok(match raw {
            RawOperand::Reg(name) => Operand::Reg(self.register(name)),
            RawOperand::Imm(value) => Operand::Imm(*value),
            RawOperand::Null => Operand::Null,
            RawOperand::Symbol(name) => match self.symbol(name)? {
                SymbolRef::Function(ptr) => Operand::Func(ptr),
                SymbolRef::Global(uuid) => Operand::Global(uuid),
            },
        })
    }

    fn instruction(&mut self, raw: &RawInstr) -> Result<KmInstr, Error> {
        Ok(match raw {
            RawInstr::Call { dest, callee, args } => {
                let function = self.operand(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.operand(arg))
                    .collect::<Result<SmallVec<Operand, 4>, _>>()?;
                let (dest, ty) = match dest {
                    Some((name, ty)) => (Some(self.register(name)), Some(*ty)),
                    None => (None, None),
                };
                KmInstr::Invoke(Invoke {
                    function,
                    args,
                    dest,
                    ty,
                })
            }
            RawInstr::Binary {
                dest: (name, ty),
                op,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(lhs)?;
                let rhs = self.operand(rhs)?;
                KmInstr::IBinary(IBinary {
                    dest: self.register(name),
                    ty: *ty,
                    op: *op,
                    lhs,
                    rhs,
                })
            }
            RawInstr::Load {
                dest: (name, ty),
                addr,
            } => {
                let addr = self.operand(addr)?;
                KmInstr::MLoad(MLoad {
                    dest: self.register(name),
                    ty: *ty,
                    addr,
                })
            }
            RawInstr::Store { value, addr } => KmInstr::MStore(MStore {
                value: self.operand(value)?,
                addr: self.operand(addr)?,
            }),
        })
    }

    fn terminator(&mut self, raw: &RawTerminator) -> Result<Terminator, Error> {
        Ok(match raw {
            RawTerminator::Jump(target) => Terminator::Jump(Jump {
                target: self.label(target),
            }),
            RawTerminator::Branch(cond, t, f) => Terminator::CBranch(CBranch {
                cond: self.operand(cond)?,
                target_true: self.label(t),
                target_false: self.label(f),
            }),
            RawTerminator::Ret(value) => Terminator::Ret(Ret {
                value: value.as_ref().map(|v| self.operand(v)).transpose()?,
            }),
            RawTerminator::Unreachable => Terminator::Unreachable,
        })
    }
}

/// Build the module content out of the raw items.
fn lower(module: &mut Module, items: Vec<Item>) -> Result<(), Error> {
    // Symbols first so bodies can reference anything declared in the file.
    let mut symbols: BTreeMap<String, SymbolRef> = BTreeMap::new();
    let mut pending = Vec::new();
    let mut metadata = Vec::new();

    for item in items {
        match item {
            Item::Function(raw) => {
                let mut function = Function::new(raw.name.clone(), Vec::new(), raw.return_type);
                function.body.clear();
                if let Some(linkage) = raw.linkage {
                    function.linkage = linkage;
                }
                symbols.insert(raw.name.clone(), SymbolRef::Function(function.pointer()));
                pending.push((function, raw));
            }
            Item::Declare {
                return_type,
                name,
                params,
            } => {
                let ext = ExternalFunction::new(name.clone(), params, return_type);
                let ptr = module.add_external_function(ext);
                symbols.insert(name, SymbolRef::Function(ptr));
            }
            Item::Global {
                linkage,
                ty,
                name,
                init,
            } => {
                let mut global = GlobalVariable::new(name.clone(), ty, init);
                if let Some(linkage) = linkage {
                    global.linkage = linkage;
                }
                let uuid = module.add_global(global);
                symbols.insert(name, SymbolRef::Global(uuid));
            }
            Item::Metadata { name, values } => metadata.push((name, values)),
        }
    }

    // Symbols already present in the module stay resolvable.
    for func in &module.functions {
        symbols
            .entry(func.name.clone())
            .or_insert(SymbolRef::Function(func.pointer()));
    }
    for ext in &module.external_functions {
        symbols
            .entry(ext.name.clone())
            .or_insert(SymbolRef::Function(FunctionPointer::External(ext.uuid)));
    }

    for (mut function, raw) in pending {
        let mut scope = FunctionScope {
            symbols: &symbols,
            registers: BTreeMap::new(),
            labels: BTreeMap::new(),
        };

        function.params = raw
            .params
            .iter()
            .map(|(name, ty)| (scope.register(name), *ty))
            .collect();

        let mut attributes = AttributeSet::new();
        for attr in &raw.attrs {
            match attr {
                RawAttr::Kind(kind) => {
                    attributes.add_kind(*kind);
                }
                RawAttr::Str(key, value) => {
                    attributes.add_string(key.clone(), value.clone());
                }
            }
        }
        function.attributes = attributes;

        // Blocks are numbered in textual order, the first one is the entry.
        for block in &raw.blocks {
            scope.label(&block.label);
        }
        for block in &raw.blocks {
            let label = scope.label(&block.label);
            let instructions = block
                .instructions
                .iter()
                .map(|instr| scope.instruction(instr))
                .collect::<Result<Vec<_>, _>>()?;
            let terminator = scope.terminator(&block.terminator)?;
            function.body.insert(
                label,
                BasicBlock {
                    label,
                    instructions,
                    terminator,
                },
            );
        }

        debug!(
            "Parsed function `{}` with {} block(s)",
            function.name,
            function.body.len()
        );
        module.add_function(function);
    }

    for (name, values) in metadata {
        let node = values
            .iter()
            .map(|value| {
                Ok(match value {
                    RawMeta::Symbol(symbol) => MetadataValue::Symbol(
                        symbols.get(symbol).copied().ok_or_else(|| Error::UnresolvedSymbol {
                            name: symbol.clone(),
                        })?,
                    ),
                    RawMeta::Str(s) => MetadataValue::Str(s.clone()),
                    RawMeta::Int(v) => MetadataValue::Int(*v),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        module
            .get_or_insert_named_metadata(&name)
            .add_operand(MetadataNode(node));
    }

    Ok(())
}

/// Parse `source` and append its content to `module`.
///
/// A `module "<name>"` header, when present, renames the module.
pub fn extend_module_from_string(module: &mut Module, source: &str) -> Result<(), Error> {
    let (name, items) = module_parser()
        .parse(source)
        .into_result()
        .map_err(|errs| Error::ParseError {
            message: errs
                .iter()
                .map(|e| format!("{e}"))
                .collect::<Vec<_>>()
                .join("; "),
        })?;

    if let Some(name) = name {
        module.name = name;
    }
    lower(module, items)
}

/// Parse a complete module.
pub fn parse_module(source: &str) -> Result<Module, Error> {
    let mut module = Module::default();
    extend_module_from_string(&mut module, source)?;
    Ok(module)
}
