use crate::analysis::{SCEVExpr, SCEVExprRef, ScalarEvolution};
use crate::error::AnalysisError;
use crate::ir::{DataLayout, Value};

fn evaluate(scev: &SCEVExprRef, dl: &DataLayout) -> Result<u64, AnalysisError> {
    match scev {
        SCEVExprRef::Expr(SCEVExpr::Mul(ops)) => ops
            .iter()
            .try_fold(1u64, |acc, op| Ok(acc.wrapping_mul(evaluate(op, dl)?))),
        SCEVExprRef::SizeOf(ty) => Ok(dl.type_alloc_size(ty)),
        SCEVExprRef::AlignOf(ty) => Ok(dl.abi_alignment(ty)),
        SCEVExprRef::Unknown(_) => Ok(0),
        SCEVExprRef::Constant(x) => Ok(*x as u64),
        SCEVExprRef::Expr(SCEVExpr::ZExt(op)) => evaluate(op, dl),
        _ => Err(AnalysisError::unsupported("stride", scev.to_string())),
    }
}

/**
 * The byte distance between the addresses a pointer takes in two consecutive
 * iterations of its loop, or 0 when the pointer is not an affine recurrence.
 **/
pub fn get_stride(pointer: Value, se: &ScalarEvolution, dl: &DataLayout) -> Result<u64, AnalysisError> {
    match se.get_scev(pointer).as_add_rec() {
        Some(ar) if ar.is_affine() => evaluate(&ar.get_step_recurrence(), dl),
        _ => Ok(0),
    }
}

/// Size of the pointee, i.e. the stride of a dense walk over the elements.
pub fn get_unit_stride(pointer: Value, se: &ScalarEvolution, dl: &DataLayout) -> u64 {
    let ty = se.module().type_of(se.func(), &pointer);
    ty.pointee().map_or(0, |elem| dl.type_alloc_size(elem))
}

pub fn is_non_unit_stride(
    pointer: Value,
    se: &ScalarEvolution,
    dl: &DataLayout,
) -> Result<bool, AnalysisError> {
    let stride = get_stride(pointer, se, dl)?;
    Ok(stride != 0 && stride != get_unit_stride(pointer, se, dl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::LoopAnalysis;
    use crate::ir::{DomTree, Module, Type};
    use crate::tests::cfg;

    fn stride_of(k: i64) -> (u64, u64, bool) {
        strides(cfg::strided_loop(k))
    }

    fn strides((m, values): (Module, cfg::StridedValues)) -> (u64, u64, bool) {
        let func = m.functions.last().unwrap();
        let dom = DomTree::analyze(func);
        let mut la = LoopAnalysis::new(func);
        la.analyze(&dom);
        let se = ScalarEvolution::new(&m, &la);
        let dl = &m.data_layout;
        (
            get_stride(values.ptr, &se, dl).unwrap(),
            get_unit_stride(values.ptr, &se, dl),
            is_non_unit_stride(values.ptr, &se, dl).unwrap(),
        )
    }

    #[test]
    fn test_unit_stride() {
        assert_eq!((4, 4, false), stride_of(1));
    }

    #[test]
    fn test_non_unit_stride() {
        assert_eq!((12, 4, true), stride_of(3));
    }

    #[test]
    fn test_pointer_induction() {
        assert_eq!((12, 4, true), strides(cfg::pointer_walk(3)));
        assert_eq!((4, 4, false), strides(cfg::pointer_walk(1)));
    }

    #[test]
    fn test_not_a_recurrence() {
        let m = cfg::empty_kernel_module();
        let func = m.functions.last().unwrap();
        let dom = DomTree::analyze(func);
        let mut la = LoopAnalysis::new(func);
        la.analyze(&dom);
        let se = ScalarEvolution::new(&m, &la);
        assert_eq!(Ok(0), get_stride(Value::Argument(0), &se, &m.data_layout));
        assert_eq!(Ok(false), is_non_unit_stride(Value::Argument(0), &se, &m.data_layout));
    }

    #[test]
    fn test_evaluate_step() {
        let dl = DataLayout::default();
        let step = SCEVExprRef::Expr(SCEVExpr::Mul(vec![
            SCEVExprRef::Constant(2),
            SCEVExprRef::Expr(SCEVExpr::ZExt(Box::new(SCEVExprRef::SizeOf(Type::Double)))),
            SCEVExprRef::AlignOf(Type::I32),
        ]));
        assert_eq!(Ok(64), evaluate(&step, &dl));
        assert!(evaluate(&SCEVExprRef::CouldNotCompute, &dl).is_err());
    }
}
