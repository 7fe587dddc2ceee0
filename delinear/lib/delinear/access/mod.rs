mod aggregate;
mod builtins;
pub mod formula;
mod site;

pub use aggregate::{FunctionAccessInfo, PerArrayRecord, Provenance};
pub use builtins::{Axis, BuiltinTable, GridAxisMask, IndexKind, IndexRegister, MaskPolicy};
pub use formula::{DimensionFormula, FormulaBuilder};
pub use site::{AccessExtractor, ArrayAccess, ArrayHandle, SiteFailure};
