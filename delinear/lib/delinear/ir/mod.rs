mod builder;
mod dom;
pub mod instruction;
mod types;
mod value;

use bitflags::bitflags;
use smallvec::SmallVec;

pub use builder::FunctionBuilder;
pub use dom::{DomTree, CFG};
pub use instruction::{BinaryOperator, CastOp, CmpPredicate, InstKind, Instruction};
pub use types::{DataLayout, Type};
pub use value::{Constant, ConstantExpr, ConstantExprKind, Global, Value};

bitflags! {
    pub struct FunctionAttrs: u8 {
        const NO_RETURN = 0b0000_0001;
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/**
 * A basic block.
 * The parent (i.e., Function) owns the instruction arena and the BasicBlock
 * only stores the respective indices.
 **/
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub name: String,
    pub(crate) predecessors: SmallVec<[usize; 4]>,
    pub(crate) successors: SmallVec<[usize; 4]>,
    pub instructions: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Function {
    /** The link (mangled) name */
    pub name: String,
    pub demangled: Option<String>,
    pub params: Vec<Param>,
    pub ret_ty: Type,
    pub attrs: FunctionAttrs,
    pub basic_blocks: Vec<BasicBlock>,
    pub instructions: Vec<Instruction>,
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub const_exprs: Vec<ConstantExpr>,
    pub data_layout: DataLayout,
}

impl BasicBlock {
    pub const ENTRY_INDEX: usize = 0;

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn predecessors(&self) -> &[usize] {
        self.predecessors.as_slice()
    }

    pub fn successors(&self) -> &[usize] {
        self.successors.as_slice()
    }

    pub fn terminator<'a>(&self, parent: &'a Function) -> Option<&'a Instruction> {
        self.instructions
            .last()
            .map(|idx| &parent.instructions[*idx])
            .filter(|inst| inst.is_terminator())
    }
}

impl Function {
    /// Create a declaration, i.e. a function without a body.
    pub fn declare(name: &str, params: Vec<Param>, ret_ty: Type) -> Function {
        Function {
            name: name.to_string(),
            demangled: None,
            params,
            ret_ty,
            attrs: FunctionAttrs::empty(),
            basic_blocks: vec![],
            instructions: vec![],
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.basic_blocks.is_empty()
    }

    pub fn does_not_return(&self) -> bool {
        self.attrs.contains(FunctionAttrs::NO_RETURN)
    }

    /// The human-readable name, falling back to the link name when the
    /// producer of the module did not record one.
    pub fn demangled_name(&self) -> &str {
        self.demangled.as_deref().unwrap_or(self.name.as_str())
    }

    pub fn inst(&self, idx: usize) -> &Instruction {
        &self.instructions[idx]
    }

    /// The instruction behind `v`, if `v` is defined by one.
    pub fn def(&self, v: &Value) -> Option<&Instruction> {
        v.as_instruction().map(|idx| &self.instructions[idx])
    }

    /// The source-level name of a value, empty if it has none.
    pub fn value_name(&self, v: &Value) -> &str {
        match v {
            Value::Argument(idx) => self.params[*idx].name.as_str(),
            Value::Instruction(idx) => self.instructions[*idx].name.as_deref().unwrap_or(""),
            Value::Constant(_) => "",
        }
    }
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn add_function(&mut self, f: Function) -> usize {
        self.functions.push(f);
        self.functions.len() - 1
    }

    pub fn add_global(&mut self, name: &str, ty: Type) -> Value {
        self.globals.push(Global {
            name: name.to_string(),
            ty,
        });
        Value::Constant(Constant::Global(self.globals.len() - 1))
    }

    pub fn add_const_expr(&mut self, kind: ConstantExprKind, operands: Vec<Value>) -> Value {
        self.const_exprs.push(ConstantExpr { kind, operands });
        Value::Constant(Constant::Expr(self.const_exprs.len() - 1))
    }

    pub fn function_by_name(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    pub fn callee(&self, inst: &Instruction) -> Option<&Function> {
        inst.as_call().map(|(callee, _)| &self.functions[callee])
    }

    /// The type of `v` when used inside `func`.
    pub fn type_of(&self, func: &Function, v: &Value) -> Type {
        match v {
            Value::Argument(idx) => func.params[*idx].ty.clone(),
            Value::Instruction(idx) => func.instructions[*idx].ty.clone(),
            Value::Constant(c) => match c {
                Constant::Int(_) => Type::I64,
                Constant::Float(_) => Type::Double,
                Constant::Global(idx) => Type::ptr(self.globals[*idx].ty.clone()),
                Constant::Expr(idx) => {
                    let expr = &self.const_exprs[*idx];
                    match (expr.kind, expr.operands.first()) {
                        (ConstantExprKind::GetElementPtr, Some(base)) => {
                            let base_ty = self.type_of(func, base);
                            self.indexed_type(&base_ty, &expr.operands[1..])
                                .map(Type::ptr)
                                .unwrap_or(base_ty)
                        }
                        _ => Type::I64,
                    }
                }
                Constant::Null | Constant::Undef | Constant::Aggregate => Type::Void,
            },
        }
    }

    /// The element type reached by GEP indices applied to a pointer of type `ptr_ty`.
    pub fn indexed_type(&self, ptr_ty: &Type, indices: &[Value]) -> Option<Type> {
        let mut ty = ptr_ty.pointee()?.clone();
        for idx in indices.iter().skip(1) {
            ty = match ty {
                Type::Struct(ref name) => {
                    let field = idx.as_int()? as usize;
                    self.data_layout.struct_fields(name)?.get(field)?.clone()
                }
                Type::Array(elem, _) => *elem,
                _ => return None,
            };
        }
        Some(ty)
    }
}
