use crate::error::{Error, FormatError, Result};
use crate::ir::{
    BinaryOperator, CastOp, CmpPredicate, Constant, ConstantExprKind, DataLayout, Function,
    FunctionAttrs, FunctionBuilder, InstKind, Module, Param, Type, Value,
};
use json::JsonValue;
use log::debug;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

type ParseResult<T> = std::result::Result<T, FormatError>;

/**
 * Reads a module from its JSON description. Functions are declared up front
 * so that calls may refer to functions defined later in the file.
 **/
pub struct ModuleLoader {
    module: Module,
    functions: HashMap<String, usize>,
}

/// Load a module from a JSON file.
pub fn load_module(file: &str) -> Result<Module> {
    let data = fs::read_to_string(file)?;
    parse_module(data.as_str()).map_err(Error::FormatError)
}

pub fn parse_module(data: &str) -> ParseResult<Module> {
    let d = json::parse(data).map_err(|e| FormatError::InvalidJson(e.to_string()))?;
    ModuleLoader::new(&d)?.load(&d)
}

fn field<'j>(v: &'j JsonValue, name: &'static str) -> ParseResult<&'j JsonValue> {
    match &v[name] {
        JsonValue::Null => Err(FormatError::MissingField(name)),
        x => Ok(x),
    }
}

fn str_field<'j>(v: &'j JsonValue, name: &'static str) -> ParseResult<&'j str> {
    field(v, name)?.as_str().ok_or(FormatError::MissingField(name))
}

fn usize_field(v: &JsonValue, name: &'static str) -> ParseResult<usize> {
    field(v, name)?.as_usize().ok_or(FormatError::MissingField(name))
}

fn parse_type(v: &JsonValue) -> ParseResult<Type> {
    if let Some(s) = v.as_str() {
        return match s {
            "void" => Ok(Type::Void),
            "float" => Ok(Type::Float),
            "double" => Ok(Type::Double),
            _ => s
                .strip_prefix('i')
                .and_then(|bits| bits.parse::<u32>().ok())
                .map(Type::Int)
                .ok_or_else(|| FormatError::UnknownType(s.to_string())),
        };
    }
    if v.has_key("ptr") {
        return Ok(Type::Pointer {
            pointee: Box::new(parse_type(&v["ptr"])?),
            addr_space: v["addrspace"].as_u32().unwrap_or(0),
        });
    }
    if let Some(name) = v["struct"].as_str() {
        return Ok(Type::Struct(name.to_string()));
    }
    if v.has_key("array") {
        return Ok(Type::Array(
            Box::new(parse_type(&v["array"])?),
            v["len"].as_u64().ok_or(FormatError::MissingField("len"))?,
        ));
    }
    Err(FormatError::UnknownType(v.dump()))
}

fn parse_value(v: &JsonValue) -> ParseResult<Value> {
    if let Some(s) = v.as_str() {
        return match s {
            "null" => Ok(Value::Constant(Constant::Null)),
            "undef" => Ok(Value::Constant(Constant::Undef)),
            "aggregate" => Ok(Value::Constant(Constant::Aggregate)),
            _ => Err(FormatError::InvalidValue(s.to_string())),
        };
    }
    let index = |key: &str| v[key].as_usize();
    if let Some(i) = index("arg") {
        Ok(Value::Argument(i))
    } else if let Some(i) = index("inst") {
        Ok(Value::Instruction(i))
    } else if let Some(x) = v["int"].as_i64() {
        Ok(Value::int(x))
    } else if let Some(x) = v["float"].as_f64() {
        Ok(Value::Constant(Constant::Float(x)))
    } else if let Some(i) = index("global") {
        Ok(Value::Constant(Constant::Global(i)))
    } else if let Some(i) = index("expr") {
        Ok(Value::Constant(Constant::Expr(i)))
    } else {
        Err(FormatError::InvalidValue(v.dump()))
    }
}

fn parse_values(v: &JsonValue) -> ParseResult<SmallVec<[Value; 4]>> {
    v.members().map(parse_value).collect()
}

fn mnemonic<T: FromStr>(op: &str) -> Option<T> {
    T::from_str(op).ok()
}

impl ModuleLoader {
    fn new(d: &JsonValue) -> ParseResult<ModuleLoader> {
        let mut module = Module::new(d["name"].as_str().unwrap_or("module"));
        module.data_layout = DataLayout::new(d["pointer_size"].as_u64().unwrap_or(8));
        for (name, fields) in d["structs"].entries() {
            let fields = fields.members().map(parse_type).collect::<ParseResult<Vec<_>>>()?;
            module.data_layout.define_struct(name, fields);
        }
        Ok(ModuleLoader {
            module,
            functions: HashMap::new(),
        })
    }

    fn load(mut self, d: &JsonValue) -> ParseResult<Module> {
        for g in d["globals"].members() {
            self.module
                .add_global(str_field(g, "name")?, parse_type(field(g, "type")?)?);
        }
        for e in d["constant_exprs"].members() {
            let op = str_field(e, "op")?;
            let kind = match op {
                "getelementptr" => ConstantExprKind::GetElementPtr,
                _ => ConstantExprKind::Cast(
                    mnemonic(op).ok_or_else(|| FormatError::UnknownOpcode(op.to_string()))?,
                ),
            };
            let operands = parse_values(&e["operands"])?.into_vec();
            // Operands may only reference globals and earlier expressions
            let defined = self.module.const_exprs.len();
            let dangling = operands.iter().find(|v| match v {
                Value::Constant(Constant::Global(g)) => *g >= self.module.globals.len(),
                Value::Constant(Constant::Expr(x)) => *x >= defined,
                Value::Constant(_) => false,
                Value::Argument(_) | Value::Instruction(_) => true,
            });
            if let Some(v) = dangling {
                return Err(FormatError::InvalidValue(format!(
                    "{:?} in constant expression {}",
                    v, defined
                )));
            }
            self.module.add_const_expr(kind, operands);
        }

        // Declare everything first, bodies may call forward
        let mut bodies = vec![];
        for f in d["functions"].members() {
            let name = str_field(f, "name")?;
            let params = f["params"]
                .members()
                .map(|p| {
                    Ok(Param {
                        name: p["name"].as_str().unwrap_or("").to_string(),
                        ty: parse_type(field(p, "type")?)?,
                    })
                })
                .collect::<ParseResult<Vec<_>>>()?;
            let ret_ty = match &f["ret"] {
                JsonValue::Null => Type::Void,
                t => parse_type(t)?,
            };
            let mut func = Function::declare(name, params, ret_ty);
            func.demangled = f["demangled"].as_str().map(|x| x.to_string());
            if f["noreturn"].as_bool().unwrap_or(false) {
                func.attrs = FunctionAttrs::NO_RETURN;
            }
            let idx = self.module.add_function(func);
            self.functions.insert(name.to_string(), idx);
            if f["blocks"].is_array() {
                bodies.push((idx, f));
            }
        }

        for (idx, f) in bodies {
            let func = self.load_body(idx, &f["blocks"])?;
            debug!(
                "Loaded {} with {} blocks and {} instructions",
                func.demangled_name(),
                func.basic_blocks.len(),
                func.instructions.len()
            );
            self.module.functions[idx] = func;
        }
        Ok(self.module)
    }

    fn load_body(&self, func_idx: usize, blocks: &JsonValue) -> ParseResult<Function> {
        let decl = &self.module.functions[func_idx];
        let mut b = FunctionBuilder::new(&decl.name, decl.params.clone(), decl.ret_ty.clone())
            .attrs(decl.attrs);
        if let Some(name) = &decl.demangled {
            b = b.demangled(name);
        }
        let ids = blocks
            .members()
            .map(|bb| b.block(bb["name"].as_str().unwrap_or("")))
            .collect::<Vec<_>>();
        let num_insts: usize = blocks.members().map(|bb| bb["instructions"].len()).sum();
        let mut idx = 0;
        for (bb, id) in blocks.members().zip(ids) {
            b.switch_to(id);
            for inst in bb["instructions"].members() {
                let ty = match &inst["type"] {
                    JsonValue::Null => Type::Void,
                    t => parse_type(t)?,
                };
                let kind = self.parse_inst(inst)?;
                self.check_operands(decl, (blocks.len(), num_insts), idx, &kind)?;
                idx += 1;
                match inst["name"].as_str() {
                    Some(name) => b.push_named(name, ty, kind),
                    None => b.push(ty, kind),
                };
            }
        }
        Ok(b.finish())
    }

    fn parse_inst(&self, inst: &JsonValue) -> ParseResult<InstKind> {
        let op = str_field(inst, "op")?;
        let value = |name| parse_value(field(inst, name)?);
        let block = |name| usize_field(inst, name);
        let kind = match op {
            "icmp" => {
                let pred = str_field(inst, "pred")?;
                InstKind::ICmp {
                    pred: mnemonic::<CmpPredicate>(pred)
                        .ok_or_else(|| FormatError::UnknownOpcode(pred.to_string()))?,
                    lhs: value("lhs")?,
                    rhs: value("rhs")?,
                }
            }
            "load" => InstKind::Load { ptr: value("ptr")? },
            "store" => InstKind::Store {
                value: value("value")?,
                ptr: value("ptr")?,
            },
            "getelementptr" => InstKind::GetElementPtr {
                base: value("base")?,
                indices: parse_values(&inst["indices"])?,
            },
            "extractvalue" => InstKind::ExtractValue {
                aggregate: value("aggregate")?,
                indices: inst["indices"]
                    .members()
                    .map(|i| i.as_u32().ok_or_else(|| FormatError::InvalidValue(i.dump())))
                    .collect::<ParseResult<_>>()?,
            },
            "extractelement" => InstKind::ExtractElement {
                vector: value("vector")?,
                index: value("index")?,
            },
            "call" => {
                let callee = str_field(inst, "callee")?;
                InstKind::Call {
                    callee: *self
                        .functions
                        .get(callee)
                        .ok_or_else(|| FormatError::UnknownFunction(callee.to_string()))?,
                    args: parse_values(&inst["args"])?,
                }
            }
            "phi" => InstKind::Phi {
                incoming: inst["incoming"]
                    .members()
                    .map(|e| Ok((usize_field(e, "block")?, parse_value(field(e, "value")?)?)))
                    .collect::<ParseResult<_>>()?,
            },
            "select" => InstKind::Select {
                cond: value("cond")?,
                on_true: value("on_true")?,
                on_false: value("on_false")?,
            },
            "alloca" => InstKind::Alloca {
                allocated: parse_type(field(inst, "allocated")?)?,
            },
            "br" if inst.has_key("cond") => InstKind::CondBr {
                cond: value("cond")?,
                on_true: block("on_true")?,
                on_false: block("on_false")?,
            },
            "br" => InstKind::Br {
                target: block("target")?,
            },
            "ret" => InstKind::Ret {
                value: match &inst["value"] {
                    JsonValue::Null => None,
                    v => Some(parse_value(v)?),
                },
            },
            "unreachable" => InstKind::Unreachable,
            _ => {
                if let Some(op) = mnemonic::<BinaryOperator>(op) {
                    InstKind::Binary {
                        op,
                        lhs: value("lhs")?,
                        rhs: value("rhs")?,
                    }
                } else if let Some(op) = mnemonic::<CastOp>(op) {
                    InstKind::Cast {
                        op,
                        operand: value("operand")?,
                    }
                } else {
                    return Err(FormatError::UnknownOpcode(op.to_string()));
                }
            }
        };
        Ok(kind)
    }

    // Every reference must stay inside its arena
    fn check_operands(&self, func: &Function, arena: (usize, usize), idx: usize, kind: &InstKind) -> ParseResult<()> {
        let (num_blocks, num_insts) = arena;
        let valid = |v: &Value| match v {
            Value::Argument(i) => *i < func.params.len(),
            Value::Instruction(i) => *i < num_insts,
            Value::Constant(Constant::Global(i)) => *i < self.module.globals.len(),
            Value::Constant(Constant::Expr(i)) => *i < self.module.const_exprs.len(),
            Value::Constant(_) => true,
        };
        let (values, blocks): (SmallVec<[Value; 4]>, SmallVec<[usize; 2]>) = match kind {
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => {
                (SmallVec::from_slice(&[*lhs, *rhs]), SmallVec::new())
            }
            InstKind::Cast { operand: v, .. }
            | InstKind::Load { ptr: v }
            | InstKind::ExtractValue { aggregate: v, .. } => (SmallVec::from_slice(&[*v]), SmallVec::new()),
            InstKind::Store { value, ptr } => (SmallVec::from_slice(&[*value, *ptr]), SmallVec::new()),
            InstKind::GetElementPtr { base, indices } => {
                let mut v = indices.clone();
                v.push(*base);
                (v, SmallVec::new())
            }
            InstKind::ExtractElement { vector, index } => {
                (SmallVec::from_slice(&[*vector, *index]), SmallVec::new())
            }
            InstKind::Call { args, .. } => (args.clone(), SmallVec::new()),
            InstKind::Phi { incoming } => (
                incoming.iter().map(|(_, v)| *v).collect(),
                incoming.iter().map(|(bb, _)| *bb).collect(),
            ),
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => (SmallVec::from_slice(&[*cond, *on_true, *on_false]), SmallVec::new()),
            InstKind::Ret { value } => (value.iter().copied().collect(), SmallVec::new()),
            InstKind::Br { target } => (SmallVec::new(), SmallVec::from_slice(&[*target])),
            InstKind::CondBr {
                cond,
                on_true,
                on_false,
            } => (SmallVec::from_slice(&[*cond]), SmallVec::from_slice(&[*on_true, *on_false])),
            InstKind::Alloca { .. } | InstKind::Unreachable => (SmallVec::new(), SmallVec::new()),
        };
        if let Some(v) = values.iter().copied().find(|v| !valid(v)) {
            return Err(FormatError::InvalidValue(format!(
                "{:?} in %{} of {}",
                v, idx, func.name
            )));
        }
        if let Some(bb) = blocks.iter().copied().find(|bb| *bb >= num_blocks) {
            return Err(FormatError::InvalidValue(format!(
                "block {} in %{} of {}",
                bb, idx, func.name
            )));
        }
        Ok(())
    }
}
