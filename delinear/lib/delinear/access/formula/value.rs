use super::{FormulaBuilder, MEM_MARKER, PHI_RECURSION_MARKER};
use crate::access::Axis;
use crate::error::AnalysisError;
use crate::ir::{BinaryOperator, Constant, Function, InstKind, Instruction, Value};
use log::trace;

fn binary_symbol(op: BinaryOperator) -> Option<&'static str> {
    use BinaryOperator::*;
    match op {
        UDiv | SDiv => Some(" / "),
        URem | SRem => Some(" % "),
        Shl => Some(" << "),
        Mul => Some(" * "),
        Add => Some(" + "),
        Sub => Some(" - "),
        And => Some(" ^ "),
        LShr | AShr | Or | Xor => None,
    }
}

// The first occurrence of "off" ends the name, e.g. `blk_off`
fn is_offset_param(name: &str) -> bool {
    name.len() >= 3 && name.find("off") == Some(name.len() - 3)
}

impl<'a> FormulaBuilder<'a> {
    /**
     * Render an IR value. `in_phi` is set once the walk went through a phi,
     * so that a phi reached again renders as a marker instead of recursing.
     **/
    pub fn value_formula(&mut self, v: &Value, in_phi: bool) -> Result<String, AnalysisError> {
        match v {
            Value::Argument(idx) => {
                trace!("Argument");
                Ok(format!("#PARAM:{}", self.func.params[*idx].name))
            }
            Value::Constant(c) => {
                trace!("Constant");
                self.constant_formula(c, in_phi)
            }
            Value::Instruction(idx) => self.instruction_formula(*idx, in_phi),
        }
    }

    fn instruction_formula(&mut self, idx: usize, in_phi: bool) -> Result<String, AnalysisError> {
        let func: &'a Function = self.func;
        let inst = func.inst(idx);
        trace!("Expr: %{} = {:?}", idx, inst.kind);

        if let Some(name) = self.index_register_formula(inst) {
            return Ok(name);
        }

        match &inst.kind {
            InstKind::ExtractValue { aggregate, indices } => {
                trace!("ExtractValueInst");
                if let Value::Argument(arg) = aggregate {
                    let param = &func.params[*arg];
                    let is_offset_struct = param
                        .ty
                        .struct_name()
                        .map_or(false, |name| name.contains(&self.table.offset_struct));
                    if is_offset_struct && is_offset_param(&param.name) {
                        let axis = indices
                            .first()
                            .and_then(|i| Axis::from_index(*i as i64))
                            .ok_or_else(|| {
                                AnalysisError::unsupported("extractvalue", format!("%{}", idx))
                            })?;
                        return Ok(format!("b_off.{}", axis));
                    }
                }
                self.value_formula(aggregate, in_phi)
            }
            InstKind::ExtractElement { .. } => {
                Err(AnalysisError::unsupported("extractelement", format!("%{}", idx)))
            }
            InstKind::GetElementPtr { base, .. } => {
                trace!("GetElementPtrInst");
                self.value_formula(base, in_phi)
            }
            InstKind::Call { callee, args } => {
                trace!("CallInst");
                let callee = &self.module.functions[*callee];
                if self.table.is_array_access(callee) {
                    Ok(MEM_MARKER.to_string())
                } else {
                    Ok(self.call_formula(callee, args))
                }
            }
            InstKind::Cast { operand, .. } => {
                trace!("CastInst");
                self.value_formula(operand, in_phi)
            }
            InstKind::Load { ptr } => {
                trace!("LoadInst");
                self.value_formula(ptr, in_phi)
            }
            // A stack slot contributes nothing
            InstKind::Alloca { .. } => Ok(String::new()),
            InstKind::Binary { op, lhs, rhs } => {
                trace!("BinaryOperator");
                let symbol = binary_symbol(*op).ok_or_else(|| {
                    AnalysisError::unsupported("operator", format!("%{} = {}", idx, op))
                })?;
                let l = self.value_formula(lhs, in_phi)?;
                let r = self.value_formula(rhs, in_phi)?;
                Ok(format!("({}{}{})", l, symbol, r))
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                trace!("ICmp");
                let l = self.value_formula(lhs, in_phi)?;
                let r = self.value_formula(rhs, in_phi)?;
                Ok(format!("({}{}{})", l, pred.symbol(), r))
            }
            InstKind::Phi { incoming } if !in_phi => {
                trace!("PHINode");
                let alternatives = incoming
                    .iter()
                    .map(|(_, v)| self.value_formula(v, true))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", alternatives.join(" | ")))
            }
            InstKind::Phi { .. } => {
                trace!("PHINode Rec");
                Ok(PHI_RECURSION_MARKER.to_string())
            }
            InstKind::Select { .. } => {
                Err(AnalysisError::unsupported("select", format!("%{}", idx)))
            }
            InstKind::Store { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. }
            | InstKind::Unreachable => {
                Err(AnalysisError::unsupported("instruction", format!("%{}", idx)))
            }
        }
    }

    /// Thread, block and block-size registers. Marks the grid axis as the
    /// mask policy dictates.
    fn index_register_formula(&mut self, inst: &Instruction) -> Option<String> {
        let callee = self.module.callee(inst)?;
        let reg = self.table.register(&callee.name)?;
        trace!("Index register {}", reg);
        self.mask |= self.policy.mask_of(reg);
        Some(reg.to_string())
    }

    fn call_formula(&self, callee: &Function, args: &[Value]) -> String {
        if !self.table.is_dim_accessor(callee) {
            return callee.demangled_name().to_string();
        }
        let dim = match args.get(1) {
            Some(Value::Constant(Constant::Int(x))) => (*x as u64).to_string(),
            Some(v) => self.func.value_name(v).to_string(),
            None => String::new(),
        };
        format!("dim({})", dim)
    }

    fn constant_formula(&mut self, c: &Constant, in_phi: bool) -> Result<String, AnalysisError> {
        match c {
            Constant::Int(x) => Ok(x.to_string()),
            Constant::Global(idx) => {
                let name = &self.module.globals[*idx].name;
                if self.table.is_offset_global(name) {
                    Ok("off".to_string())
                } else {
                    Ok(format!("#GLOBAL:{}", name))
                }
            }
            Constant::Expr(idx) => {
                let module = self.module;
                let expr = &module.const_exprs[*idx];
                match expr.operands.first() {
                    Some(op0 @ Value::Constant(Constant::Global(g)))
                        if self.table.is_offset_global(&module.globals[*g].name) =>
                    {
                        let mut ret = self.value_formula(op0, in_phi)?;
                        if expr.operands.len() == 3 {
                            let axis = expr.operands[2]
                                .as_int()
                                .and_then(Axis::from_index)
                                .ok_or_else(|| {
                                    AnalysisError::unsupported("constant", format!("{:?}", expr))
                                })?;
                            ret.push('.');
                            ret.push_str(&axis.to_string());
                        }
                        Ok(ret)
                    }
                    _ => expr
                        .operands
                        .iter()
                        .map(|op| self.value_formula(op, in_phi))
                        .collect(),
                }
            }
            Constant::Float(_) | Constant::Null | Constant::Undef | Constant::Aggregate => {
                Err(AnalysisError::unsupported("constant", format!("{:?}", c)))
            }
        }
    }
}
