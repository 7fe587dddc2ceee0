// Grouping of access sites per array and the read/write provenance of the
// array storage.

use super::site::strip_address;
use crate::access::{ArrayAccess, ArrayHandle, BuiltinTable, GridAxisMask};
use crate::error::AnalysisError;
use crate::ir::{CastOp, Function, InstKind, Module, Value};
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/**
 * Which arrays are loaded from and stored to, and which kernel parameter
 * initializes each stack slot holding an array object.
 **/
#[derive(Debug, Default)]
pub struct Provenance {
    pub reads: BTreeSet<ArrayHandle>,
    pub writes: BTreeSet<ArrayHandle>,
    // slot -> parameter index
    pub args: BTreeMap<usize, usize>,
}

impl Provenance {
    pub fn analyze(module: &Module, table: &BuiltinTable, func: &Function) -> Provenance {
        let mut p = Provenance::default();
        for inst in func.instructions.iter() {
            match inst.kind {
                InstKind::Load { ptr } => {
                    if let Some(h) = Self::storage_source(module, table, func, ptr) {
                        p.reads.insert(h);
                    }
                }
                InstKind::Store { value, ptr } => {
                    if let Some(h) = Self::storage_source(module, table, func, ptr) {
                        p.writes.insert(h);
                    }
                    if let (Value::Argument(arg), Some(ArrayHandle::Slot(slot))) =
                        (value, Self::slot_source(module, table, func, ptr))
                    {
                        trace!("Slot %{} holds parameter {}", slot, arg);
                        p.args.insert(slot, arg);
                    }
                }
                _ => {}
            }
        }
        p
    }

    /// The parameter an array handle stands for.
    pub fn param_of(&self, handle: ArrayHandle) -> Option<usize> {
        match handle {
            ArrayHandle::Param(idx) => Some(idx),
            ArrayHandle::Slot(slot) => self.args.get(&slot).copied(),
        }
    }

    // A memory operand is array storage if it derives from a runtime call
    // returning a pointer into an array.
    fn storage_source(
        module: &Module,
        table: &BuiltinTable,
        func: &Function,
        ptr: Value,
    ) -> Option<ArrayHandle> {
        let base = strip_address(func, ptr);
        let inst = func.def(&base)?;
        let (callee, args) = inst.as_call()?;
        if !table.is_storage_call(&module.functions[callee]) {
            return None;
        }
        Self::slot_source(module, table, func, *args.first()?)
    }

    fn slot_source(
        module: &Module,
        table: &BuiltinTable,
        func: &Function,
        mut v: Value,
    ) -> Option<ArrayHandle> {
        loop {
            let inst = match v {
                Value::Argument(idx) => return Some(ArrayHandle::Param(idx)),
                Value::Instruction(idx) => func.inst(idx),
                Value::Constant(_) => return None,
            };
            v = match &inst.kind {
                InstKind::Alloca { .. } => return v.as_instruction().map(ArrayHandle::Slot),
                InstKind::Cast {
                    op: CastOp::BitCast,
                    operand,
                } => *operand,
                InstKind::Call { callee, args }
                    if table.is_addrspace_conversion(&module.functions[*callee]) =>
                {
                    *args.first()?
                }
                _ => return None,
            };
        }
    }
}

/**
 * Everything known about one array argument of a kernel.
 **/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PerArrayRecord {
    pub handle: ArrayHandle,
    pub array: String,
    pub arg_index: usize,
    pub dims: usize,
    // Union of the per-site masks, indexed by dimension
    pub masks: Vec<GridAxisMask>,
    pub is_read: bool,
    pub is_written: bool,
}

/**
 * The access sites of one function, grouped by the array they go through.
 **/
#[derive(Clone, Debug)]
pub struct FunctionAccessInfo {
    pub name: String,
    pub arrays: BTreeMap<ArrayHandle, Vec<ArrayAccess>>,
}

impl FunctionAccessInfo {
    pub fn new(func: &Function) -> FunctionAccessInfo {
        FunctionAccessInfo {
            name: func.demangled_name().to_string(),
            arrays: BTreeMap::new(),
        }
    }

    pub fn add_access(&mut self, access: ArrayAccess) {
        self.arrays.entry(access.handle).or_default().push(access);
    }

    pub fn accesses(&self) -> impl Iterator<Item = &ArrayAccess> + '_ {
        self.arrays.values().flatten()
    }

    /// Every site of an array must agree on its number of dimensions.
    fn check_consistent(accesses: &[ArrayAccess]) -> Result<usize, AnalysisError> {
        let first = accesses.first().ok_or_else(|| {
            AnalysisError::unsupported("array", "array without access sites".to_string())
        })?;
        let dims = first.dimension_count();
        match accesses.iter().find(|a| a.dimension_count() != dims) {
            Some(other) => Err(AnalysisError::InconsistentDimensionCount {
                array: first.array.clone(),
                site_a: first.site,
                dims_a: dims,
                site_b: other.site,
                dims_b: other.dimension_count(),
            }),
            None => Ok(dims),
        }
    }

    fn array_mask(accesses: &[ArrayAccess], dim: usize) -> GridAxisMask {
        accesses
            .iter()
            .filter_map(|a| a.dims.get(dim))
            .fold(GridAxisMask::empty(), |mask, d| mask | d.mask)
    }

    /**
     * Fold the sites of every array into one record. Arrays are ordered by
     * handle, which keeps the output stable across runs.
     **/
    pub fn aggregate(&self, provenance: &Provenance) -> Result<Vec<PerArrayRecord>, AnalysisError> {
        self.arrays
            .iter()
            .map(|(handle, accesses)| {
                let dims = Self::check_consistent(accesses)?;
                let array = accesses[0].array.clone();
                let arg_index = provenance
                    .param_of(*handle)
                    .ok_or_else(|| AnalysisError::UnmappedArray {
                        array: array.clone(),
                    })?;
                Ok(PerArrayRecord {
                    handle: *handle,
                    array,
                    arg_index,
                    dims,
                    masks: (0..dims).map(|d| Self::array_mask(accesses, d)).collect(),
                    is_read: provenance.reads.contains(handle),
                    is_written: provenance.writes.contains(handle),
                })
            })
            .collect()
    }
}

impl Display for FunctionAccessInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.name)?;
        for access in self.accesses() {
            writeln!(f, "\t{}", access)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DimensionFormula;

    fn access(site: usize, handle: ArrayHandle, masks: &[GridAxisMask]) -> ArrayAccess {
        ArrayAccess {
            site,
            handle,
            array: "a".to_string(),
            loop_context: None,
            dims: masks
                .iter()
                .map(|m| DimensionFormula {
                    formula: m.to_string(),
                    mask: *m,
                })
                .collect(),
            is_write: false,
        }
    }

    #[test]
    fn test_mask_union() {
        let h = ArrayHandle::Param(1);
        let mut info = FunctionAccessInfo {
            name: "k".to_string(),
            arrays: BTreeMap::new(),
        };
        info.add_access(access(3, h, &[GridAxisMask::X, GridAxisMask::empty()]));
        info.add_access(access(7, h, &[GridAxisMask::Z, GridAxisMask::Y]));
        let mut provenance = Provenance::default();
        provenance.writes.insert(h);

        let records = info.aggregate(&provenance).unwrap();
        assert_eq!(1, records.len());
        let r = &records[0];
        assert_eq!(1, r.arg_index);
        assert_eq!(2, r.dims);
        assert_eq!(vec![GridAxisMask::X | GridAxisMask::Z, GridAxisMask::Y], r.masks);
        for a in info.accesses() {
            for (d, dim) in a.dims.iter().enumerate() {
                assert!(r.masks[d].contains(dim.mask));
            }
        }
        assert!(!r.is_read);
        assert!(r.is_written);
    }

    #[test]
    fn test_inconsistent_dimensions() {
        let h = ArrayHandle::Slot(2);
        let mut info = FunctionAccessInfo {
            name: "k".to_string(),
            arrays: BTreeMap::new(),
        };
        info.add_access(access(4, h, &[GridAxisMask::X, GridAxisMask::Y]));
        info.add_access(access(9, h, &[GridAxisMask::X]));
        let mut provenance = Provenance::default();
        provenance.args.insert(2, 0);
        assert_eq!(
            Err(AnalysisError::InconsistentDimensionCount {
                array: "a".to_string(),
                site_a: 4,
                dims_a: 2,
                site_b: 9,
                dims_b: 1,
            }),
            info.aggregate(&provenance)
        );
    }

    #[test]
    fn test_unmapped_slot() {
        let mut info = FunctionAccessInfo {
            name: "k".to_string(),
            arrays: BTreeMap::new(),
        };
        info.add_access(access(4, ArrayHandle::Slot(2), &[GridAxisMask::X]));
        assert_eq!(
            Err(AnalysisError::UnmappedArray {
                array: "a".to_string()
            }),
            info.aggregate(&Provenance::default())
        );
    }

    #[test]
    fn test_provenance() {
        let (m, sites) = crate::tests::cfg::grid_kernel();
        let func = m.functions.last().unwrap();
        let table = BuiltinTable::nvptx();
        let p = Provenance::analyze(&m, &table, func);
        let slot = ArrayHandle::Slot(sites.slot);
        assert!(p.reads.contains(&slot));
        assert!(p.writes.contains(&slot));
        assert_eq!(Some(0), p.param_of(slot));
        assert_eq!(Some(3), p.param_of(ArrayHandle::Param(3)));
    }
}
