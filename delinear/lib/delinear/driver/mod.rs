// Runs the access analysis over every kernel of a module and reports the
// per-array facts to the sinks.

mod sink;

pub use sink::{ArrayInfoSink, RecordingSink, SinkEvent};

use crate::access::{
    AccessExtractor, BuiltinTable, FunctionAccessInfo, MaskPolicy, PerArrayRecord, Provenance,
};
use crate::analysis::{LoopAnalysis, ScalarEvolution};
use crate::error::{AnalysisError, Error, Result};
use crate::ir::{DomTree, Function, Module};
use crate::support::diagnostic::{DiagnosticContext, Remark};
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, Default)]
pub struct AnalysisConfig {
    pub table: BuiltinTable,
    pub mask_policy: MaskPolicy,
    // Abort the run at the first kernel that cannot be analyzed
    pub fail_fast: bool,
}

/// Kernels are recognized by their demangled name only.
pub fn is_kernel_name(name: &str) -> bool {
    name.contains("_kernel(")
        || name.contains("_kernel<")
        || (name.contains("_kernel_") && !name.contains("_<") && !name.contains("_("))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum KernelStage {
    ExtractAccesses,
    // Slot-to-argument map together with the read and write sets
    Provenance,
    Aggregate,
    Report,
}

impl Display for KernelStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KernelStage::ExtractAccesses => "extract accesses",
            KernelStage::Provenance => "build provenance",
            KernelStage::Aggregate => "aggregate",
            KernelStage::Report => "report",
        };
        f.pad(s)
    }
}

/**
 * A kernel that could not be analyzed. Nothing of it reaches the sinks.
 **/
#[derive(Debug)]
pub struct KernelError {
    pub kernel: String,
    pub site: Option<usize>,
    pub error: AnalysisError,
    // The formulas built before the failure
    pub context: Option<String>,
}

impl KernelError {
    fn remark(&self) -> Remark {
        let r = Remark::kernel(&self.kernel, self.site, Error::AnalysisError(self.error.clone()));
        match &self.context {
            Some(ctx) => r.with_desc(ctx.clone()),
            None => r,
        }
    }
}

/**
 * The analysis result of one kernel entry point.
 **/
#[derive(Clone, Debug)]
pub struct KernelFunction {
    pub index: usize,
    // Link name, used as the kernel identity towards the sinks
    pub name: String,
    pub accesses: FunctionAccessInfo,
    pub arrays: Vec<PerArrayRecord>,
}

impl KernelFunction {
    /// One `set_array_dim_info` per axis present in a dimension's mask.
    pub fn report(&self, sink: &mut dyn ArrayInfoSink) {
        sink.reset(&self.name);
        for r in self.arrays.iter() {
            sink.set_array_info(&self.name, r.arg_index, r.dims, r.is_read, r.is_written);
            for (dim, mask) in r.masks.iter().enumerate() {
                for axis in mask.axes() {
                    sink.set_array_dim_info(&self.name, r.arg_index, dim, axis);
                }
            }
        }
    }
}

impl Display for KernelFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.accesses, f)
    }
}

pub struct Delinearizer<'a> {
    module: &'a Module,
    config: &'a AnalysisConfig,
    diag: &'a DiagnosticContext,
}

impl<'a> Delinearizer<'a> {
    pub fn new(
        module: &'a Module,
        config: &'a AnalysisConfig,
        diag: &'a DiagnosticContext,
    ) -> Delinearizer<'a> {
        Delinearizer {
            module,
            config,
            diag,
        }
    }

    /// Defined functions with a kernel name, in module order.
    pub fn kernels(&self) -> impl Iterator<Item = usize> + 'a {
        self.module
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_declaration() && is_kernel_name(f.demangled_name()))
            .map(|(idx, _)| idx)
    }

    fn stage(func: &Function, stage: KernelStage) {
        debug!("{}: {}", func.demangled_name(), stage);
    }

    pub fn analyze_kernel(&self, idx: usize) -> std::result::Result<KernelFunction, KernelError> {
        let module = self.module;
        let func = &module.functions[idx];
        let kernel_error = |site, error, context| KernelError {
            kernel: func.demangled_name().to_string(),
            site,
            error,
            context,
        };
        info!("Analyzing kernel {}", func.demangled_name());

        let dom = DomTree::analyze(func);
        let mut la = LoopAnalysis::new(func);
        la.analyze(&dom);
        let se = ScalarEvolution::new(module, &la);

        Self::stage(func, KernelStage::ExtractAccesses);
        let mut accesses = FunctionAccessInfo::new(func);
        let mut extractor =
            AccessExtractor::new(module, &self.config.table, self.config.mask_policy, &se);
        // Each block once, with its innermost loop as context
        for (bb_idx, bb) in func.basic_blocks.iter().enumerate() {
            let loop_context = la.get_loop_for(bb_idx).map(|l| l.id);
            for inst_idx in bb.instructions.iter() {
                let is_access = module
                    .callee(func.inst(*inst_idx))
                    .map_or(false, |callee| self.config.table.is_array_access(callee));
                if !is_access {
                    continue;
                }
                let access = extractor.extract(*inst_idx, loop_context).map_err(|failure| {
                    let context = failure.to_string();
                    kernel_error(Some(failure.site), failure.error, Some(context))
                })?;
                accesses.add_access(access);
            }
        }

        Self::stage(func, KernelStage::Provenance);
        let provenance = Provenance::analyze(module, &self.config.table, func);

        Self::stage(func, KernelStage::Aggregate);
        let arrays = accesses.aggregate(&provenance).map_err(|e| {
            let site = match e {
                AnalysisError::InconsistentDimensionCount { site_b, .. } => Some(site_b),
                _ => None,
            };
            kernel_error(site, e, None)
        })?;

        Ok(KernelFunction {
            index: idx,
            name: func.name.clone(),
            accesses,
            arrays,
        })
    }

    /**
     * Analyze every kernel and report it to each sink. A kernel that fails is
     * recorded as a remark and skipped, unless the configuration asks to stop.
     **/
    pub fn run(&self, sinks: &mut [&mut dyn ArrayInfoSink]) -> Result<Vec<KernelFunction>> {
        let mut kernels = vec![];
        for idx in self.kernels() {
            match self.analyze_kernel(idx) {
                Ok(k) => {
                    Self::stage(&self.module.functions[idx], KernelStage::Report);
                    for sink in sinks.iter_mut() {
                        k.report(&mut **sink);
                    }
                    kernels.push(k);
                }
                Err(e) => {
                    warn!("Skipping kernel {}: {}", e.kernel, e.error);
                    self.diag.record(e.remark());
                    if self.config.fail_fast {
                        return Err(Error::AnalysisError(e.error));
                    }
                }
            }
        }
        Ok(kernels)
    }
}
