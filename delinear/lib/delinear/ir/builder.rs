use crate::ir::instruction::{BinaryOperator, CastOp, CmpPredicate, InstKind, Instruction};
use crate::ir::{BasicBlock, Function, FunctionAttrs, Param, Type, Value};
use smallvec::SmallVec;

/**
 * Builds a function block by block. Instructions are appended to the block
 * selected by `switch_to`; the CFG edges are derived from the terminators
 * when the function is finished.
 **/
pub struct FunctionBuilder {
    func: Function,
    current: Option<usize>,
}

impl FunctionBuilder {
    pub fn new(name: &str, params: Vec<Param>, ret_ty: Type) -> FunctionBuilder {
        FunctionBuilder {
            func: Function::declare(name, params, ret_ty),
            current: None,
        }
    }

    pub fn demangled(mut self, name: &str) -> FunctionBuilder {
        self.func.demangled = Some(name.to_string());
        self
    }

    pub fn attrs(mut self, attrs: FunctionAttrs) -> FunctionBuilder {
        self.func.attrs = attrs;
        self
    }

    /// Append a new, empty block and make it the insertion point.
    pub fn block(&mut self, name: &str) -> usize {
        self.func.basic_blocks.push(BasicBlock {
            name: name.to_string(),
            ..Default::default()
        });
        let id = self.func.basic_blocks.len() - 1;
        self.current = Some(id);
        id
    }

    pub fn switch_to(&mut self, bb: usize) {
        assert!(bb < self.func.basic_blocks.len());
        self.current = Some(bb);
    }

    pub fn push(&mut self, ty: Type, kind: InstKind) -> Value {
        self.push_inst(None, ty, kind)
    }

    pub fn push_named(&mut self, name: &str, ty: Type, kind: InstKind) -> Value {
        self.push_inst(Some(name.to_string()), ty, kind)
    }

    fn push_inst(&mut self, name: Option<String>, ty: Type, kind: InstKind) -> Value {
        let parent = self.current.expect("No insertion block");
        let idx = self.func.instructions.len();
        self.func.instructions.push(Instruction {
            parent,
            ty,
            name,
            kind,
        });
        self.func.basic_blocks[parent].instructions.push(idx);
        Value::Instruction(idx)
    }

    pub fn binary(&mut self, op: BinaryOperator, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.push(ty, InstKind::Binary { op, lhs, rhs })
    }

    pub fn icmp(&mut self, pred: CmpPredicate, lhs: Value, rhs: Value) -> Value {
        self.push(Type::I1, InstKind::ICmp { pred, lhs, rhs })
    }

    pub fn cast(&mut self, op: CastOp, ty: Type, operand: Value) -> Value {
        self.push(ty, InstKind::Cast { op, operand })
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Value {
        self.push(ty, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> Value {
        self.push(Type::Void, InstKind::Store { value, ptr })
    }

    pub fn alloca(&mut self, name: &str, allocated: Type) -> Value {
        let ty = Type::ptr(allocated.clone());
        self.push_named(name, ty, InstKind::Alloca { allocated })
    }

    pub fn gep(&mut self, ty: Type, base: Value, indices: &[Value]) -> Value {
        self.push(
            ty,
            InstKind::GetElementPtr {
                base,
                indices: SmallVec::from_slice(indices),
            },
        )
    }

    pub fn call(&mut self, callee: usize, ret_ty: Type, args: &[Value]) -> Value {
        self.push(
            ret_ty,
            InstKind::Call {
                callee,
                args: SmallVec::from_slice(args),
            },
        )
    }

    /// Create a phi without incoming edges; fill them in with `add_incoming`.
    pub fn phi(&mut self, ty: Type) -> Value {
        self.push(
            ty,
            InstKind::Phi {
                incoming: SmallVec::new(),
            },
        )
    }

    pub fn add_incoming(&mut self, phi: Value, bb: usize, v: Value) {
        let idx = phi.as_instruction().expect("Not an instruction");
        match &mut self.func.instructions[idx].kind {
            InstKind::Phi { incoming } => incoming.push((bb, v)),
            _ => panic!("Not a phi node"),
        }
    }

    pub fn br(&mut self, target: usize) -> Value {
        self.push(Type::Void, InstKind::Br { target })
    }

    pub fn cond_br(&mut self, cond: Value, on_true: usize, on_false: usize) -> Value {
        self.push(
            Type::Void,
            InstKind::CondBr {
                cond,
                on_true,
                on_false,
            },
        )
    }

    pub fn ret(&mut self, value: Option<Value>) -> Value {
        self.push(Type::Void, InstKind::Ret { value })
    }

    pub fn finish(mut self) -> Function {
        compute_edges(&mut self.func);
        self.func
    }
}

/**
 * Recompute the predecessor and successor lists from the block terminators.
 **/
pub(crate) fn compute_edges(func: &mut Function) {
    let succs = func
        .basic_blocks
        .iter()
        .map(|bb| {
            bb.terminator(func)
                .map(|t| t.successors())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();

    for bb in func.basic_blocks.iter_mut() {
        bb.predecessors.clear();
        bb.successors.clear();
    }
    for (bb_idx, targets) in succs.into_iter().enumerate() {
        for t in targets {
            if !func.basic_blocks[bb_idx].successors.contains(&t) {
                func.basic_blocks[bb_idx].successors.push(t);
            }
            if !func.basic_blocks[t].predecessors.contains(&bb_idx) {
                func.basic_blocks[t].predecessors.push(bb_idx);
            }
        }
    }
}
