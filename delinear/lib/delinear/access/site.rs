use crate::access::{BuiltinTable, DimensionFormula, FormulaBuilder, MaskPolicy};
use crate::analysis::ScalarEvolution;
use crate::error::AnalysisError;
use crate::ir::{CastOp, Function, InstKind, Module, Value};
use log::{debug, trace};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/**
 * The storage an array access goes through: either a stack slot holding a
 * copy of the array object, or a kernel parameter used directly.
 **/
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArrayHandle {
    // Instruction index of the alloca
    Slot(usize),
    Param(usize),
}

impl ArrayHandle {
    /// Strip no-op pointer casts and zero-offset address computations.
    pub fn resolve(func: &Function, v: &Value) -> Option<ArrayHandle> {
        let mut v = *v;
        loop {
            match v {
                Value::Argument(idx) => return Some(ArrayHandle::Param(idx)),
                Value::Constant(_) => return None,
                Value::Instruction(idx) => match &func.inst(idx).kind {
                    InstKind::Alloca { .. } => return Some(ArrayHandle::Slot(idx)),
                    InstKind::Cast { op, operand } if op.is_pointer_noop() => v = *operand,
                    InstKind::GetElementPtr { base, indices }
                        if indices.iter().all(|i| i.as_int() == Some(0)) =>
                    {
                        v = *base
                    }
                    _ => return None,
                },
            }
        }
    }

    pub fn name<'f>(&self, func: &'f Function) -> &'f str {
        match self {
            ArrayHandle::Slot(idx) => func.value_name(&Value::Instruction(*idx)),
            ArrayHandle::Param(idx) => func.params[*idx].name.as_str(),
        }
    }
}

/**
 * One element access `arr(i_0, ..., i_{n-1})`. Dimension 0 is the outermost,
 * i.e. the formula of the last index argument.
 **/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayAccess {
    // Instruction index of the access call
    pub site: usize,
    pub handle: ArrayHandle,
    pub array: String,
    pub loop_context: Option<usize>,
    pub dims: Vec<DimensionFormula>,
    pub is_write: bool,
}

impl ArrayAccess {
    pub fn dimension_count(&self) -> usize {
        self.dims.len()
    }
}

impl Display for ArrayAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.array)?;
        for d in self.dims.iter().rev() {
            write!(f, "[ {} ]", d)?;
        }
        Ok(())
    }
}

/// An access site that could not be rendered, with the dimensions finished before the failure.
#[derive(Debug)]
pub struct SiteFailure {
    pub site: usize,
    pub error: AnalysisError,
    pub built: Vec<String>,
}

impl Display for SiteFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "after")?;
        if self.built.is_empty() {
            return write!(f, " no dimension");
        }
        for d in self.built.iter() {
            write!(f, " [ {} ]", d)?;
        }
        Ok(())
    }
}

pub struct AccessExtractor<'a, 'b> {
    func: &'a Function,
    se: &'b ScalarEvolution<'a, 'b>,
    builder: FormulaBuilder<'a>,
    // Access calls whose result is stored to
    stored: BTreeSet<usize>,
}

impl<'a, 'b> AccessExtractor<'a, 'b> {
    pub fn new(
        module: &'a Module,
        table: &'a BuiltinTable,
        policy: MaskPolicy,
        se: &'b ScalarEvolution<'a, 'b>,
    ) -> AccessExtractor<'a, 'b> {
        let func = se.func();
        let stored = func
            .instructions
            .iter()
            .filter_map(|inst| match inst.kind {
                InstKind::Store { ptr, .. } => strip_address(func, ptr).as_instruction(),
                _ => None,
            })
            .collect();
        AccessExtractor {
            func,
            se,
            builder: FormulaBuilder::new(module, func, table, policy),
            stored,
        }
    }

    /**
     * Build the formulas of one access call. Index argument `i` describes
     * dimension `n - (i + 1)`.
     **/
    pub fn extract(
        &mut self,
        site: usize,
        loop_context: Option<usize>,
    ) -> Result<ArrayAccess, SiteFailure> {
        let fail = |error| SiteFailure {
            site,
            error,
            built: vec![],
        };
        let args = match &self.func.inst(site).kind {
            InstKind::Call { args, .. } if !args.is_empty() => args,
            _ => return Err(fail(AnalysisError::unsupported("access", format!("%{}", site)))),
        };
        let handle = ArrayHandle::resolve(self.func, &args[0]).ok_or_else(|| {
            fail(AnalysisError::UnmappedArray {
                array: format!("{:?}", args[0]),
            })
        })?;
        let array = handle.name(self.func).to_string();
        let n = args.len() - 1;
        debug!("Access to {} with {} dimensions at %{}", array, n, site);

        let mut dims = Vec::with_capacity(n);
        for idx in args[1..].iter() {
            let scev = self.se.get_scev(*idx);
            trace!("Index {:?}: {}", idx, scev);
            match self.builder.evolution_formula(&scev, self.se, false) {
                Ok(formula) => dims.push(self.builder.take(formula)),
                Err(error) => {
                    // Drop the axes collected by the failed dimension
                    self.builder.take(String::new());
                    return Err(SiteFailure {
                        site,
                        error,
                        built: dims.into_iter().map(|d| d.formula).collect(),
                    })
                }
            }
        }
        dims.reverse();

        Ok(ArrayAccess {
            site,
            handle,
            array,
            loop_context,
            dims,
            is_write: self.stored.contains(&site),
        })
    }
}

// The value an address is derived from, looking through casts and address arithmetic
pub(crate) fn strip_address(func: &Function, mut v: Value) -> Value {
    while let Some(inst) = func.def(&v) {
        v = match &inst.kind {
            InstKind::GetElementPtr { base, .. } => *base,
            InstKind::Cast {
                op: CastOp::BitCast | CastOp::AddrSpaceCast,
                operand,
            } => *operand,
            _ => break,
        };
    }
    v
}
