use crate::analysis::loopinfo::latch_condition;
use crate::analysis::LoopAnalysis;
use crate::ir::{
    BinaryOperator, CastOp, CmpPredicate, Constant, Function, InstKind, Module, Type, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum SCEVExpr {
    Add(Vec<SCEVExprRef>),
    Mul(Vec<SCEVExprRef>),
    UDiv(Box<SCEVExprRef>, Box<SCEVExprRef>),
    SMax(Vec<SCEVExprRef>),
    UMax(Vec<SCEVExprRef>),
    AddRec(AddRec),
    ZExt(Box<SCEVExprRef>), // zero-extend
    SExt(Box<SCEVExprRef>), // signed-extend
    Trunc(Box<SCEVExprRef>),
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum SCEVExprRef {
    Expr(SCEVExpr),
    Constant(i64),
    // An IR value that has no closed form, e.g. a load or a call
    Unknown(Value),
    // Allocation size and ABI alignment of a type, in bytes
    SizeOf(Type),
    AlignOf(Type),
    CouldNotCompute,
}

/**
 * A polynomial recurrence `{operands[0],+,operands[1],+,...}` over the
 * iterations of one loop.
 **/
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct AddRec {
    pub(crate) operands: Vec<SCEVExprRef>,
    pub loop_info_id: usize,
}

pub struct ScalarEvolution<'a, 'b> {
    module: &'a Module,
    func: &'a Function,
    la: &'b LoopAnalysis<'a>,
    cache: RefCell<HashMap<Value, SCEVExprRef>>,
}

impl SCEVExpr {
    fn scev_type_id(&self) -> u32 {
        use SCEVExpr::*;
        match self {
            ZExt(_) => 4,
            SExt(_) => 5,
            Trunc(_) => 6,
            Add(_) => 7,
            Mul(_) => 8,
            UDiv(..) => 9,
            SMax(_) => 10,
            UMax(_) => 11,
            AddRec(_) => 12,
        }
    }
}

impl SCEVExprRef {
    fn new(expr: SCEVExpr) -> Self {
        SCEVExprRef::Expr(expr)
    }

    // Constants sort first, recurrences last
    fn scev_type_id(&self) -> u32 {
        match self {
            SCEVExprRef::Constant(_) => 0,
            SCEVExprRef::SizeOf(_) => 1,
            SCEVExprRef::AlignOf(_) => 2,
            SCEVExprRef::Unknown(_) => 3,
            SCEVExprRef::Expr(e) => e.scev_type_id(),
            SCEVExprRef::CouldNotCompute => 13,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SCEVExprRef::Constant(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_add_rec(&self) -> Option<&AddRec> {
        match self {
            SCEVExprRef::Expr(SCEVExpr::AddRec(ar)) => Some(ar),
            _ => None,
        }
    }

    pub fn is_could_not_compute(&self) -> bool {
        matches!(self, SCEVExprRef::CouldNotCompute)
    }
}

impl AddRec {
    pub fn is_affine(&self) -> bool {
        self.operands.len() == 2
    }

    pub fn get_start(&self) -> &SCEVExprRef {
        &self.operands[0]
    }

    /// The step of the recurrence, itself a recurrence of the same loop for
    /// non-affine expressions.
    pub fn get_step_recurrence(&self) -> SCEVExprRef {
        if self.is_affine() {
            self.operands[1].clone()
        } else {
            SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
                operands: self.operands[1..].to_vec(),
                loop_info_id: self.loop_info_id,
            }))
        }
    }
}

type Operands = fn(&SCEVExprRef) -> Option<&Vec<SCEVExprRef>>;

fn add_operands(e: &SCEVExprRef) -> Option<&Vec<SCEVExprRef>> {
    match e {
        SCEVExprRef::Expr(SCEVExpr::Add(x)) => Some(x),
        _ => None,
    }
}

fn mul_operands(e: &SCEVExprRef) -> Option<&Vec<SCEVExprRef>> {
    match e {
        SCEVExprRef::Expr(SCEVExpr::Mul(x)) => Some(x),
        _ => None,
    }
}

fn smax_operands(e: &SCEVExprRef) -> Option<&Vec<SCEVExprRef>> {
    match e {
        SCEVExprRef::Expr(SCEVExpr::SMax(x)) => Some(x),
        _ => None,
    }
}

fn umax_operands(e: &SCEVExprRef) -> Option<&Vec<SCEVExprRef>> {
    match e {
        SCEVExprRef::Expr(SCEVExpr::UMax(x)) => Some(x),
        _ => None,
    }
}

fn join(f: &mut Formatter<'_>, ops: &[SCEVExprRef], sep: &str) -> std::fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", op)?;
    }
    Ok(())
}

impl Display for SCEVExprRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SCEVExprRef::Constant(x) => write!(f, "{}", x),
            SCEVExprRef::Unknown(v) => match v {
                Value::Argument(i) => write!(f, "%arg{}", i),
                Value::Instruction(i) => write!(f, "%{}", i),
                Value::Constant(c) => write!(f, "{:?}", c),
            },
            SCEVExprRef::SizeOf(ty) => write!(f, "sizeof({})", ty),
            SCEVExprRef::AlignOf(ty) => write!(f, "alignof({})", ty),
            SCEVExprRef::CouldNotCompute => write!(f, "***COULDNOTCOMPUTE***"),
            SCEVExprRef::Expr(e) => match e {
                SCEVExpr::Add(ops) => {
                    write!(f, "(")?;
                    join(f, ops, " + ")?;
                    write!(f, ")")
                }
                SCEVExpr::Mul(ops) => {
                    write!(f, "(")?;
                    join(f, ops, " * ")?;
                    write!(f, ")")
                }
                SCEVExpr::UDiv(l, r) => write!(f, "({} /u {})", l, r),
                SCEVExpr::SMax(ops) | SCEVExpr::UMax(ops) => {
                    let name = if matches!(e, SCEVExpr::SMax(_)) {
                        "smax"
                    } else {
                        "umax"
                    };
                    write!(f, "({} ", name)?;
                    join(f, ops, ", ")?;
                    write!(f, ")")
                }
                SCEVExpr::AddRec(ar) => {
                    write!(f, "{{")?;
                    join(f, &ar.operands, ",+,")?;
                    write!(f, "}}<loop{}>", ar.loop_info_id)
                }
                SCEVExpr::ZExt(op) => write!(f, "(zext {})", op),
                SCEVExpr::SExt(op) => write!(f, "(sext {})", op),
                SCEVExpr::Trunc(op) => write!(f, "(trunc {})", op),
            },
        }
    }
}

impl<'a, 'b> ScalarEvolution<'a, 'b> {
    pub fn new(module: &'a Module, la: &'b LoopAnalysis<'a>) -> ScalarEvolution<'a, 'b> {
        ScalarEvolution {
            module,
            func: la.func,
            la,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn module(&self) -> &'a Module {
        self.module
    }

    pub fn func(&self) -> &'a Function {
        self.func
    }

    pub fn loops(&self) -> &'b LoopAnalysis<'a> {
        self.la
    }

    pub fn get_scev(&self, v: Value) -> SCEVExprRef {
        let cached = self.cache.borrow().get(&v).cloned();
        if let Some(cached) = cached {
            return cached;
        }

        let r = self
            .create_scev_value(&v)
            .unwrap_or(SCEVExprRef::Unknown(v));
        log::trace!("scev {:?} = {}", v, r);
        self.cache.borrow_mut().insert(v, r.clone());
        r
    }

    fn create_scev_value(&self, v: &Value) -> Option<SCEVExprRef> {
        let inst = match v {
            Value::Constant(Constant::Int(x)) => return Some(SCEVExprRef::Constant(*x)),
            Value::Instruction(idx) => self.func.inst(*idx),
            _ => return None,
        };
        match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => {
                let l = self.get_scev(*lhs);
                match op {
                    BinaryOperator::Add => Some(self.create_add_expr(&l, &self.get_scev(*rhs))),
                    BinaryOperator::Sub => Some(self.create_sub_expr(&l, &self.get_scev(*rhs))),
                    BinaryOperator::Mul => Some(self.create_mul_expr(&l, &self.get_scev(*rhs))),
                    BinaryOperator::UDiv => Some(self.create_udiv_expr(&l, &self.get_scev(*rhs))),
                    BinaryOperator::Shl => {
                        let amount = rhs.as_int().filter(|x| (0..63).contains(x))?;
                        Some(self.create_mul_expr(&l, &SCEVExprRef::Constant(1 << amount)))
                    }
                    _ => None,
                }
            }
            InstKind::Cast { op, operand } => {
                let scev = self.get_scev(*operand);
                match op {
                    CastOp::ZExt => Some(self.create_extend_expr(false, &scev)),
                    CastOp::SExt => Some(self.create_extend_expr(true, &scev)),
                    CastOp::Trunc => Some(self.create_trunc_expr(&scev)),
                    op if op.is_pointer_noop() => Some(scev),
                    _ => None,
                }
            }
            InstKind::GetElementPtr { base, indices } => self.create_scev_for_gep(base, indices),
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => self.create_node_from_select(cond, on_true, on_false),
            InstKind::Phi { .. } => self.create_add_rec_from_phi(v),
            _ => None,
        }
    }

    /**
     * Lower address arithmetic to `base + sum(index * sizeof(element))`, with
     * struct fields contributing their constant byte offset.
     **/
    fn create_scev_for_gep(&self, base: &Value, indices: &[Value]) -> Option<SCEVExprRef> {
        let mut terms = vec![self.get_scev(*base)];
        terms.extend(self.gep_offsets(base, indices)?);
        Some(self.create_add_expr_impl(&terms))
    }

    /// The byte offsets a GEP adds to its base, one term per index.
    fn gep_offsets(&self, base: &Value, indices: &[Value]) -> Option<Vec<SCEVExprRef>> {
        let base_ty = self.module.type_of(self.func, base);
        let mut ty = base_ty.pointee()?.clone();
        let mut terms = vec![];
        for (i, idx) in indices.iter().enumerate() {
            if i == 0 {
                let scaled =
                    self.create_mul_expr(&self.get_scev(*idx), &SCEVExprRef::SizeOf(ty.clone()));
                terms.push(scaled);
                continue;
            }
            ty = match ty {
                Type::Struct(ref name) => {
                    let field = idx.as_int()? as usize;
                    let offset = self.module.data_layout.struct_field_offset(name, field)?;
                    terms.push(SCEVExprRef::Constant(offset as i64));
                    self.module.data_layout.struct_fields(name)?.get(field)?.clone()
                }
                Type::Array(elem, _) => {
                    let scaled = self.create_mul_expr(
                        &self.get_scev(*idx),
                        &SCEVExprRef::SizeOf((*elem).clone()),
                    );
                    terms.push(scaled);
                    *elem
                }
                _ => return None,
            };
        }
        Some(terms)
    }

    // select (a > b), a, b  ==>  max(a, b)
    fn create_node_from_select(
        &self,
        cond: &Value,
        on_true: &Value,
        on_false: &Value,
    ) -> Option<SCEVExprRef> {
        let (pred, lhs, rhs) = match self.func.def(cond)?.kind {
            InstKind::ICmp { pred, lhs, rhs } => (pred, lhs, rhs),
            _ => return None,
        };
        let pred = if (*on_true, *on_false) == (lhs, rhs) {
            pred
        } else if (*on_true, *on_false) == (rhs, lhs) {
            pred.swapped()
        } else {
            return None;
        };
        let ops = [self.get_scev(*on_true), self.get_scev(*on_false)];
        match pred {
            CmpPredicate::Sgt | CmpPredicate::Sge => Some(self.create_max_expr(true, &ops)),
            CmpPredicate::Ugt | CmpPredicate::Uge => Some(self.create_max_expr(false, &ops)),
            _ => None,
        }
    }

    /// For the simplest case: PN = PHI(Start, OP(Self, LoopInvariant)) in a loop header,
/// where OP is an add, a sub or a GEP off the phi.
    fn create_add_rec_from_phi(&self, phi: &Value) -> Option<SCEVExprRef> {
        let inst = self.func.def(phi)?;
        let l = self.la.get_loop_for(inst.parent)?;
        if l.get_header() != Some(inst.parent) {
            return None;
        }
        let incoming = match &inst.kind {
            InstKind::Phi { incoming } if incoming.len() == 2 => incoming,
            _ => return None,
        };
        let (start, end) = match (l.contains(incoming[0].0), l.contains(incoming[1].0)) {
            (false, true) => (incoming[0].1, incoming[1].1),
            (true, false) => (incoming[1].1, incoming[0].1),
            _ => return None,
        };

        let accum = match self.func.def(&end)?.kind {
            InstKind::Binary {
                op: BinaryOperator::Add,
                lhs,
                rhs,
            } => {
                if lhs == *phi && l.is_loop_invariant(self.func, &rhs) {
                    self.get_scev(rhs)
                } else if rhs == *phi && l.is_loop_invariant(self.func, &lhs) {
                    self.get_scev(lhs)
                } else {
                    return None;
                }
            }
            InstKind::Binary {
                op: BinaryOperator::Sub,
                lhs,
                rhs,
            } if lhs == *phi && l.is_loop_invariant(self.func, &rhs) => {
                self.create_neg_expr(&self.get_scev(rhs))
            }
            // Pointer induction: p = phi(start, gep p, k...)
            InstKind::GetElementPtr { base, ref indices }
                if base == *phi && indices.iter().all(|idx| l.is_loop_invariant(self.func, idx)) =>
            {
                let offsets = self.gep_offsets(&base, indices)?;
                if offsets.is_empty() {
                    SCEVExprRef::Constant(0)
                } else {
                    self.create_add_expr_impl(&offsets)
                }
            }
            _ => return None,
        };

        let start = self.get_scev(start);
        Some(self.create_add_rec_expr(&start, &accum, l.id))
    }

    /**
     * True if `expr` has the same value on every iteration of `loop_id`. A
     * recurrence is invariant only in loops nested inside its own loop.
     **/
    pub fn is_loop_invariant(&self, expr: &SCEVExprRef, loop_id: usize) -> bool {
        match expr {
            SCEVExprRef::Constant(_)
            | SCEVExprRef::SizeOf(_)
            | SCEVExprRef::AlignOf(_)
            | SCEVExprRef::CouldNotCompute => true,
            SCEVExprRef::Unknown(v) => self.la.get_loop(loop_id).is_loop_invariant(self.func, v),
            SCEVExprRef::Expr(e) => match e {
                SCEVExpr::Add(ops) | SCEVExpr::Mul(ops) | SCEVExpr::SMax(ops) | SCEVExpr::UMax(ops) => {
                    ops.iter().all(|op| self.is_loop_invariant(op, loop_id))
                }
                SCEVExpr::UDiv(l, r) => {
                    self.is_loop_invariant(l, loop_id) && self.is_loop_invariant(r, loop_id)
                }
                SCEVExpr::ZExt(op) | SCEVExpr::SExt(op) | SCEVExpr::Trunc(op) => {
                    self.is_loop_invariant(op, loop_id)
                }
                SCEVExpr::AddRec(ar) => {
                    ar.loop_info_id != loop_id
                        && self.la.loop_contains(ar.loop_info_id, loop_id)
                        && ar.operands.iter().all(|op| self.is_loop_invariant(op, loop_id))
                }
            },
        }
    }

    /**
     * The number of times the back edge of the loop is taken, derived from the
     * compare feeding the latch branch. Only unit-step recurrences compared
     * against an invariant bound are understood.
     **/
    pub fn get_backedge_taken_count(&self, loop_id: usize) -> SCEVExprRef {
        let l = self.la.get_loop(loop_id);
        let (cmp, continues_on_true) = match latch_condition(l, self.func) {
            Some(x) => x,
            None => return SCEVExprRef::CouldNotCompute,
        };
        let (pred, lhs, rhs) = match cmp.kind {
            InstKind::ICmp { pred, lhs, rhs } => (pred, lhs, rhs),
            _ => return SCEVExprRef::CouldNotCompute,
        };
        let pred = if continues_on_true {
            pred
        } else {
            pred.inverse()
        };

        let is_unit_iv = |e: &SCEVExprRef| {
            e.as_add_rec()
                .filter(|ar| ar.loop_info_id == loop_id && ar.is_affine())
                .map_or(false, |ar| ar.operands[1].as_int() == Some(1))
        };
        let (l_scev, r_scev) = (self.get_scev(lhs), self.get_scev(rhs));
        let (pred, iv, bound) = if is_unit_iv(&l_scev) && self.is_loop_invariant(&r_scev, loop_id) {
            (pred, l_scev, r_scev)
        } else if is_unit_iv(&r_scev) && self.is_loop_invariant(&l_scev, loop_id) {
            (pred.swapped(), r_scev, l_scev)
        } else {
            return SCEVExprRef::CouldNotCompute;
        };
        let start = match iv.as_add_rec() {
            Some(ar) => ar.get_start().clone(),
            None => return SCEVExprRef::CouldNotCompute,
        };

        match pred {
            CmpPredicate::Slt | CmpPredicate::Ult | CmpPredicate::Ne => {
                self.create_sub_expr(&bound, &start)
            }
            CmpPredicate::Sle | CmpPredicate::Ule => {
                let diff = self.create_sub_expr(&bound, &start);
                self.create_add_expr(&diff, &SCEVExprRef::Constant(1))
            }
            _ => SCEVExprRef::CouldNotCompute,
        }
    }

    /// A constant upper bound of the backedge-taken count.
    pub fn get_max_backedge_taken_count(&self, loop_id: usize) -> SCEVExprRef {
        match self.get_backedge_taken_count(loop_id) {
            c @ SCEVExprRef::Constant(_) => c,
            _ => SCEVExprRef::CouldNotCompute,
        }
    }

    pub fn has_loop_invariant_backedge_taken_count(&self, loop_id: usize) -> bool {
        let count = self.get_backedge_taken_count(loop_id);
        !count.is_could_not_compute() && self.is_loop_invariant(&count, loop_id)
    }

    fn flatten_operands(ops: &[SCEVExprRef], should_recurse: Operands) -> Vec<SCEVExprRef> {
        let mut ret = Vec::new();
        for o in ops {
            match should_recurse(o) {
                Some(x) => ret.extend(x.iter().cloned()),
                None => ret.push(o.clone()),
            }
        }
        // sort by complexity to group similar expression types together
        ret.sort_by_key(|x| x.scev_type_id());
        ret
    }

    pub(crate) fn create_add_expr_impl(&self, addends: &[SCEVExprRef]) -> SCEVExprRef {
        let mut ops = Self::flatten_operands(addends, add_operands);
        if ops.iter().any(|x| x.is_could_not_compute()) {
            return SCEVExprRef::CouldNotCompute;
        }

        if let Some(x) = ops.get(0).and_then(|x| x.as_int()) {
            let mut sum = x;
            while let Some(y) = ops.get(1).and_then(|y| y.as_int()) {
                // found two constants, fold them together
                ops.remove(1);
                sum = sum.wrapping_add(y);
            }
            ops[0] = SCEVExprRef::Constant(sum);
            if sum == 0 {
                ops.remove(0);
            }
        }

        if ops.len() > 1 {
            // Two recurrences of the same loop add up operand-wise
            let recs = ops
                .iter()
                .enumerate()
                .filter_map(|(i, x)| x.as_add_rec().map(|ar| (i, ar.loop_info_id)))
                .collect::<Vec<_>>();
            for (n, (i, lid)) in recs.iter().enumerate() {
                if let Some((j, _)) = recs[n + 1..].iter().find(|(_, other)| other == lid) {
                    let merged = self.add_rec_operand_wise(&ops[*i], &ops[*j]);
                    let mut rest = ops.clone();
                    rest.remove(*j);
                    rest[*i] = merged;
                    return self.create_add_expr_impl(&rest);
                }
            }

            // Invariants fold into the start of a recurrence
            for (i, op) in ops.iter().enumerate() {
                let ar = match op.as_add_rec() {
                    Some(ar) => ar,
                    None => continue,
                };
                let invariant = ops
                    .iter()
                    .enumerate()
                    .all(|(j, x)| j == i || self.is_loop_invariant(x, ar.loop_info_id));
                if invariant {
                    let mut rest = ops.clone();
                    rest[i] = ar.get_start().clone();
                    let mut operands = ar.operands.clone();
                    operands[0] = self.create_add_expr_impl(&rest);
                    return SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
                        operands,
                        loop_info_id: ar.loop_info_id,
                    }));
                }
            }
        }

        match ops.len() {
            0 => SCEVExprRef::Constant(0),
            1 => ops.remove(0),
            _ => SCEVExprRef::new(SCEVExpr::Add(ops)),
        }
    }

    fn add_rec_operand_wise(&self, a: &SCEVExprRef, b: &SCEVExprRef) -> SCEVExprRef {
        let (a, b) = match (a.as_add_rec(), b.as_add_rec()) {
            (Some(a), Some(b)) => (a, b),
            _ => return SCEVExprRef::CouldNotCompute,
        };
        let len = a.operands.len().max(b.operands.len());
        let zero = SCEVExprRef::Constant(0);
        let operands = (0..len)
            .map(|i| {
                let x = a.operands.get(i).unwrap_or(&zero);
                let y = b.operands.get(i).unwrap_or(&zero);
                self.create_add_expr(x, y)
            })
            .collect();
        SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
            operands,
            loop_info_id: a.loop_info_id,
        }))
    }

    pub fn create_add_expr(&self, lhs: &SCEVExprRef, rhs: &SCEVExprRef) -> SCEVExprRef {
        self.create_add_expr_impl(&[lhs.clone(), rhs.clone()])
    }

    fn create_sub_expr(&self, lhs: &SCEVExprRef, rhs: &SCEVExprRef) -> SCEVExprRef {
        self.create_add_expr(lhs, &self.create_neg_expr(rhs))
    }

    fn create_neg_expr(&self, expr: &SCEVExprRef) -> SCEVExprRef {
        self.create_mul_expr(&SCEVExprRef::Constant(-1), expr)
    }

    pub(crate) fn create_mul_expr(&self, lhs: &SCEVExprRef, rhs: &SCEVExprRef) -> SCEVExprRef {
        let mut ops = Self::flatten_operands(&[lhs.clone(), rhs.clone()], mul_operands);
        if ops.iter().any(|x| x.is_could_not_compute()) {
            return SCEVExprRef::CouldNotCompute;
        }
        if ops.iter().any(|op| op.as_int() == Some(0)) {
            return SCEVExprRef::Constant(0);
        }

        // fold constants
        if let Some(x) = ops.get(0).and_then(|x| x.as_int()) {
            let mut product = x;
            while let Some(y) = ops.get(1).and_then(|y| y.as_int()) {
                ops.remove(1);
                product = product.wrapping_mul(y);
            }
            ops[0] = SCEVExprRef::Constant(product);
            // if the constant is 1, strip it out
            if product == 1 {
                ops.remove(0);
            }
        }

        // An invariant factor scales every operand of a recurrence
        if ops.len() > 1 {
            for (i, op) in ops.iter().enumerate() {
                let ar = match op.as_add_rec() {
                    Some(ar) => ar,
                    None => continue,
                };
                let invariant = ops
                    .iter()
                    .enumerate()
                    .all(|(j, x)| j == i || self.is_loop_invariant(x, ar.loop_info_id));
                if invariant {
                    let factors = ops
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, x)| x.clone())
                        .collect::<Vec<_>>();
                    let operands = ar
                        .operands
                        .iter()
                        .map(|x| {
                            factors
                                .iter()
                                .fold(x.clone(), |acc, f| self.create_mul_expr(&acc, f))
                        })
                        .collect();
                    return SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
                        operands,
                        loop_info_id: ar.loop_info_id,
                    }));
                }
            }
        }

        match ops.len() {
            0 => SCEVExprRef::Constant(1),
            1 => ops.remove(0),
            _ => SCEVExprRef::new(SCEVExpr::Mul(ops)),
        }
    }

    fn create_udiv_expr(&self, lhs: &SCEVExprRef, rhs: &SCEVExprRef) -> SCEVExprRef {
        match (lhs.as_int(), rhs.as_int()) {
            (Some(x), Some(y)) if y != 0 => SCEVExprRef::Constant(((x as u64) / (y as u64)) as i64),
            (_, Some(1)) => lhs.clone(),
            _ => SCEVExprRef::new(SCEVExpr::UDiv(Box::new(lhs.clone()), Box::new(rhs.clone()))),
        }
    }

    pub(crate) fn create_max_expr(&self, signed: bool, operands: &[SCEVExprRef]) -> SCEVExprRef {
        let nested: Operands = if signed { smax_operands } else { umax_operands };
        let mut ops = Self::flatten_operands(operands, nested);
        if let Some(x) = ops.get(0).and_then(|x| x.as_int()) {
            let mut m = x;
            while let Some(y) = ops.get(1).and_then(|y| y.as_int()) {
                ops.remove(1);
                m = if signed {
                    m.max(y)
                } else {
                    (m as u64).max(y as u64) as i64
                };
            }
            ops[0] = SCEVExprRef::Constant(m);
        }
        ops.dedup();
        match ops.len() {
            1 => ops.remove(0),
            _ if signed => SCEVExprRef::new(SCEVExpr::SMax(ops)),
            _ => SCEVExprRef::new(SCEVExpr::UMax(ops)),
        }
    }

    /// Extensions of constants fold, and extensions of a recurrence are pushed
    /// into its operands.
    pub(crate) fn create_extend_expr(&self, signed: bool, expr: &SCEVExprRef) -> SCEVExprRef {
        match expr {
            SCEVExprRef::Constant(_) | SCEVExprRef::CouldNotCompute => expr.clone(),
            SCEVExprRef::Expr(SCEVExpr::AddRec(ar)) => SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
                operands: ar
                    .operands
                    .iter()
                    .map(|op| self.create_extend_expr(signed, op))
                    .collect(),
                loop_info_id: ar.loop_info_id,
            })),
            _ if signed => SCEVExprRef::new(SCEVExpr::SExt(Box::new(expr.clone()))),
            _ => SCEVExprRef::new(SCEVExpr::ZExt(Box::new(expr.clone()))),
        }
    }

    fn create_trunc_expr(&self, expr: &SCEVExprRef) -> SCEVExprRef {
        match expr {
            SCEVExprRef::Constant(_) | SCEVExprRef::CouldNotCompute => expr.clone(),
            _ => SCEVExprRef::new(SCEVExpr::Trunc(Box::new(expr.clone()))),
        }
    }

    pub(crate) fn create_add_rec_expr(
        &self,
        start: &SCEVExprRef,
        accum: &SCEVExprRef,
        loop_id: usize,
    ) -> SCEVExprRef {
        SCEVExprRef::new(SCEVExpr::AddRec(AddRec {
            operands: vec![start.clone(), accum.clone()],
            loop_info_id: loop_id,
        }))
    }
}
