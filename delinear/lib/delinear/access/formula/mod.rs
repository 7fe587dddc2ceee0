// Rendering of index expressions into canonical textual formulas.
//
// Two interpreters share one builder: `value_formula` walks the IR expression
// tree of a value and `evolution_formula` walks its scalar evolution. Every use
// of a grid index register along the way is recorded in the builder's mask.

mod evolution;
mod value;

use crate::access::{BuiltinTable, GridAxisMask, MaskPolicy};
use crate::ir::{Function, Module};
use std::fmt::{Display, Formatter};

pub const MEM_MARKER: &str = "#MEM";
pub const PHI_RECURSION_MARKER: &str = "#PHIRECURSION";
pub const COULD_NOT_COMPUTE_MARKER: &str = "#EXPR";

/**
 * The formula of one array dimension together with the grid axes it depends on.
 **/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimensionFormula {
    pub formula: String,
    pub mask: GridAxisMask,
}

pub struct FormulaBuilder<'a> {
    module: &'a Module,
    func: &'a Function,
    table: &'a BuiltinTable,
    policy: MaskPolicy,
    mask: GridAxisMask,
}

impl<'a> FormulaBuilder<'a> {
    pub fn new(
        module: &'a Module,
        func: &'a Function,
        table: &'a BuiltinTable,
        policy: MaskPolicy,
    ) -> FormulaBuilder<'a> {
        FormulaBuilder {
            module,
            func,
            table,
            policy,
            mask: GridAxisMask::empty(),
        }
    }

    /// The grid axes seen so far.
    pub fn mask(&self) -> GridAxisMask {
        self.mask
    }

    /// Finish a dimension: pair the formula with the collected mask and reset the mask.
    pub fn take(&mut self, formula: String) -> DimensionFormula {
        let mask = std::mem::take(&mut self.mask);
        DimensionFormula { formula, mask }
    }
}

impl Display for DimensionFormula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.formula)
    }
}
