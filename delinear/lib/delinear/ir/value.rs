use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

#[derive(Copy, Clone, Debug)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Null,
    Undef,
    // Constant arrays, structs and vectors. Their contents are never inspected.
    Aggregate,
    // Index into the module's global table
    Global(usize),
    // Index into the module's constant expression arena
    Expr(usize),
}

/**
 * A reference to the definition of a value. It is okay to store multiple copies of the values since it is a reference.
 **/
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Argument(usize),
    Instruction(usize),
    Constant(Constant),
}

impl PartialEq<Self> for Constant {
    fn eq(&self, other: &Self) -> bool {
        use Constant::*;
        match (self, other) {
            (Int(x), Int(y)) => *x == *y,
            (Float(x), Float(y)) => x.to_bits() == y.to_bits(),
            (Null, Null) | (Undef, Undef) | (Aggregate, Aggregate) => true,
            (Global(x), Global(y)) => x == y,
            (Expr(x), Expr(y)) => x == y,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Constant::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int(x) => x.hash(state),
            Float(x) => x.to_bits().hash(state),
            Global(x) | Expr(x) => x.hash(state),
            Null | Undef | Aggregate => {}
        }
    }
}

impl Constant {
    fn rank(&self) -> (u8, u64) {
        use Constant::*;
        match self {
            Int(x) => (0, *x as u64),
            Float(x) => (1, x.to_bits()),
            Null => (2, 0),
            Undef => (3, 0),
            Aggregate => (4, 0),
            Global(x) => (5, *x as u64),
            Expr(x) => (6, *x as u64),
        }
    }
}

impl PartialOrd for Constant {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Constant {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Value {
    pub const fn int(v: i64) -> Value {
        Value::Constant(Constant::Int(v))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Constant(Constant::Int(x)) => Some(*x),
            _ => None,
        }
    }

    pub fn as_instruction(&self) -> Option<usize> {
        match self {
            Value::Instruction(idx) => Some(*idx),
            _ => None,
        }
    }
}

/**
 * A module-level global variable, e.g. the `offset` block-offset record.
 **/
#[derive(Clone, Debug)]
pub struct Global {
    pub name: String,
    pub ty: super::Type,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstantExprKind {
    GetElementPtr,
    Cast(super::instruction::CastOp),
}

/**
 * Constant expressions over globals, e.g. `getelementptr (@offset, 0, 1)`.
 **/
#[derive(Clone, PartialEq, Eq)]
pub struct ConstantExpr {
    pub kind: ConstantExprKind,
    pub operands: Vec<Value>,
}

impl Debug for ConstantExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} [", self.kind)?;
        for v in self.operands.iter() {
            write!(f, "{:?}, ", v)?;
        }
        write!(f, "]")
    }
}
