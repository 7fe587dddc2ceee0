mod loopinfo;
mod scalar_evolution;
pub mod stride;

pub use loopinfo::{Loop, LoopAnalysis};
pub use scalar_evolution::{AddRec, SCEVExpr, SCEVExprRef, ScalarEvolution};
