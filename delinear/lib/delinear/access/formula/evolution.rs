use super::{FormulaBuilder, COULD_NOT_COMPUTE_MARKER};
use crate::analysis::{AddRec, Loop, SCEVExpr, SCEVExprRef, ScalarEvolution};
use crate::error::AnalysisError;
use crate::ir::InstKind;
use log::{debug, trace};

impl<'a> FormulaBuilder<'a> {
    /**
     * Render the scalar evolution of a value. Values without a closed form
     * are rendered by `value_formula`.
     **/
    pub fn evolution_formula(
        &mut self,
        scev: &SCEVExprRef,
        se: &ScalarEvolution,
        in_phi: bool,
    ) -> Result<String, AnalysisError> {
        let expr = match scev {
            SCEVExprRef::Unknown(v) => {
                trace!("Unknown");
                return self.value_formula(v, in_phi);
            }
            SCEVExprRef::Constant(x) => {
                trace!("Constant");
                return Ok(x.to_string());
            }
            SCEVExprRef::CouldNotCompute => {
                trace!("CouldNotCompute");
                return Ok(COULD_NOT_COMPUTE_MARKER.to_string());
            }
            SCEVExprRef::SizeOf(_) | SCEVExprRef::AlignOf(_) => {
                return Err(AnalysisError::unsupported("evolution", scev.to_string()));
            }
            SCEVExprRef::Expr(e) => e,
        };

        trace!("SCEV: {}", scev);
        match expr {
            SCEVExpr::UDiv(l, r) => {
                trace!("UDivExpr");
                let l = self.evolution_formula(l, se, in_phi)?;
                let r = self.evolution_formula(r, se, in_phi)?;
                Ok(format!("({}/{})", l, r))
            }
            SCEVExpr::AddRec(ar) => {
                trace!("AddRecExpr");
                self.add_rec_formula(ar, se, in_phi)
            }
            SCEVExpr::Mul(ops) => {
                trace!("MulExpr");
                let ops = self.evolution_formulas(ops.iter(), se, in_phi)?;
                Ok(format!("({})", ops.join(" * ")))
            }
            SCEVExpr::Add(ops) => {
                trace!("AddExpr");
                // Symbolic terms first, then non-negative and finally negative constants
                let rest = ops.iter().filter(|op| op.as_int().is_none());
                let pos = ops.iter().filter(|op| op.as_int().map_or(false, |x| x >= 0));
                let neg = ops.iter().filter(|op| op.as_int().map_or(false, |x| x < 0));
                let ops = self.evolution_formulas(rest.chain(pos).chain(neg), se, in_phi)?;
                Ok(format!("({})", ops.join(" + ")))
            }
            SCEVExpr::SMax(ops) => {
                let ops = self.evolution_formulas(ops.iter(), se, in_phi)?;
                Ok(format!("smax({})", ops.join(", ")))
            }
            SCEVExpr::UMax(ops) => {
                let ops = self.evolution_formulas(ops.iter(), se, in_phi)?;
                Ok(format!("umax({})", ops.join(", ")))
            }
            SCEVExpr::ZExt(op) | SCEVExpr::SExt(op) | SCEVExpr::Trunc(op) => {
                trace!("CastExpr");
                self.evolution_formula(op, se, in_phi)
            }
        }
    }

    fn evolution_formulas<'e>(
        &mut self,
        ops: impl Iterator<Item = &'e SCEVExprRef>,
        se: &ScalarEvolution,
        in_phi: bool,
    ) -> Result<Vec<String>, AnalysisError> {
        ops.map(|op| self.evolution_formula(op, se, in_phi)).collect()
    }

    /**
     * `{depth}<start : bound , step>`. The bound is the backedge-taken count
     * when it is known and loop invariant, otherwise the right-hand side of the
     * compare that controls the latch branch.
     **/
    fn add_rec_formula(
        &mut self,
        ar: &AddRec,
        se: &ScalarEvolution,
        in_phi: bool,
    ) -> Result<String, AnalysisError> {
        let l = se.loops().get_loop(ar.loop_info_id);
        let depth = l.depth();
        let step = ar.get_step_recurrence();

        let invariant = se.has_loop_invariant_backedge_taken_count(l.id);
        let count = if invariant {
            se.get_backedge_taken_count(l.id)
        } else {
            se.get_max_backedge_taken_count(l.id)
        };
        trace!("Inv:  {}", invariant);
        trace!("Comp: {}", count.is_could_not_compute());

        let start = self.evolution_formula(ar.get_start(), se, in_phi)?;
        let bound = if !invariant || count.is_could_not_compute() {
            debug!("Using loop latch block");
            self.latch_bound(l, se, in_phi)?
        } else {
            self.evolution_formula(&count, se, in_phi)?
        };
        let step = self.evolution_formula(&step, se, in_phi)?;
        Ok(format!("{{{}}}<{} : {} , {}>", depth, start, bound, step))
    }

    fn latch_bound(
        &mut self,
        l: &Loop,
        se: &ScalarEvolution,
        in_phi: bool,
    ) -> Result<String, AnalysisError> {
        let func = se.func();
        let depth = l.depth();
        let latch = l
            .get_loop_latch(func)
            .ok_or(AnalysisError::MissingLoopLatch { depth })?;
        let branch = func.basic_blocks[latch]
            .terminator(func)
            .ok_or(AnalysisError::MissingLoopExit { depth })?;
        let cond = match branch.kind {
            InstKind::CondBr { cond, .. } => cond,
            _ => return Err(AnalysisError::MissingLoopExit { depth }),
        };
        match func.def(&cond).map(|inst| &inst.kind) {
            Some(InstKind::ICmp { rhs, .. }) => self.value_formula(rhs, in_phi),
            _ => Err(AnalysisError::unsupported(
                "loop condition",
                format!("{:?} in latch of loop at depth {}", cond, depth),
            )),
        }
    }
}
