use crate::ir::{Type, Value};
use delinear_macros::Opcode;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Opcode)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Opcode)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Opcode)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    PtrToInt,
    IntToPtr,
    AddrSpaceCast,
}

/**
 * The operation of an instruction together with its operands.
 **/
#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOperator,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: CmpPredicate,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        op: CastOp,
        operand: Value,
    },
    Load {
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    GetElementPtr {
        base: Value,
        indices: SmallVec<[Value; 4]>,
    },
    ExtractValue {
        aggregate: Value,
        indices: SmallVec<[u32; 2]>,
    },
    ExtractElement {
        vector: Value,
        index: Value,
    },
    Call {
        // Index of the callee in the module's function table
        callee: usize,
        args: SmallVec<[Value; 4]>,
    },
    // Incoming values and the indices of the respective basic block
    Phi {
        incoming: SmallVec<[(usize, Value); 2]>,
    },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Alloca {
        allocated: Type,
    },
    Br {
        target: usize,
    },
    CondBr {
        cond: Value,
        on_true: usize,
        on_false: usize,
    },
    Ret {
        value: Option<Value>,
    },
    Unreachable,
}

#[derive(Clone, Debug)]
pub struct Instruction {
    // The basic block that the instruction belongs to
    pub parent: usize,
    pub ty: Type,
    pub name: Option<String>,
    pub kind: InstKind,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. } | InstKind::Unreachable
        )
    }

    pub fn successors(&self) -> SmallVec<[usize; 2]> {
        match &self.kind {
            InstKind::Br { target } => SmallVec::from_slice(&[*target]),
            InstKind::CondBr {
                on_true, on_false, ..
            } => SmallVec::from_slice(&[*on_true, *on_false]),
            _ => SmallVec::new(),
        }
    }

    pub fn as_call(&self) -> Option<(usize, &[Value])> {
        match &self.kind {
            InstKind::Call { callee, args } => Some((*callee, args.as_slice())),
            _ => None,
        }
    }

}

impl CmpPredicate {
    pub fn inverse(self) -> CmpPredicate {
        use CmpPredicate::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Ugt => Ule,
            Uge => Ult,
            Ult => Uge,
            Ule => Ugt,
            Sgt => Sle,
            Sge => Slt,
            Slt => Sge,
            Sle => Sgt,
        }
    }

    pub fn swapped(self) -> CmpPredicate {
        use CmpPredicate::*;
        match self {
            Eq => Eq,
            Ne => Ne,
            Ugt => Ult,
            Uge => Ule,
            Ult => Ugt,
            Ule => Uge,
            Sgt => Slt,
            Sge => Sle,
            Slt => Sgt,
            Sle => Sge,
        }
    }

    pub fn symbol(self) -> &'static str {
        use CmpPredicate::*;
        match self {
            Eq => " == ",
            Ne => " != ",
            Ugt | Sgt => " > ",
            Uge | Sge => " >= ",
            Ult | Slt => " < ",
            Ule | Sle => " <= ",
        }
    }
}

impl CastOp {
    /// Casts that only reinterpret a pointer without changing its value.
    pub fn is_pointer_noop(self) -> bool {
        matches!(self, CastOp::BitCast | CastOp::AddrSpaceCast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mnemonics() {
        assert_eq!("udiv", BinaryOperator::UDiv.to_string());
        assert_eq!(BinaryOperator::AShr, BinaryOperator::from_str("ashr").unwrap());
        assert_eq!(CastOp::AddrSpaceCast, CastOp::from_str("addrspacecast").unwrap());
        assert_eq!("sle", CmpPredicate::Sle.to_string());
        assert!(CmpPredicate::from_str("olt").is_err());
    }

    #[test]
    fn test_predicate_inverse() {
        use CmpPredicate::*;
        for p in [Eq, Ne, Ugt, Uge, Ult, Ule, Sgt, Sge, Slt, Sle] {
            assert_eq!(p, p.inverse().inverse());
            assert_eq!(p, p.swapped().swapped());
        }
        assert_eq!(Sge, Slt.inverse());
        assert_eq!(Sgt, Slt.swapped());
    }
}
