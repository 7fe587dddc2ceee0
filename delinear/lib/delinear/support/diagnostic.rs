use crate::error::Error;
use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.pad("warning"),
            Severity::Error => f.pad("error"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct KernelLocation {
    pub(crate) kernel: String,
    // Instruction index of the offending access site, if any
    pub(crate) site: Option<usize>,
}

#[derive(Clone, Debug)]
pub enum Location {
    Kernel(KernelLocation),
    Module,
}

#[derive(Debug)]
pub struct Remark {
    pub(crate) loc: Location,
    pub(crate) severity: Severity,
    pub(crate) err: Error,
    pub(crate) desc: Option<String>,
}

#[derive(Debug, Default)]
pub struct DiagnosticContext {
    remarks: RefCell<Vec<Remark>>,
}

impl Remark {
    pub fn kernel(name: &str, site: Option<usize>, err: Error) -> Remark {
        Self {
            loc: Location::Kernel(KernelLocation {
                kernel: name.to_string(),
                site,
            }),
            severity: Severity::Warning,
            err,
            desc: None,
        }
    }

    pub fn module(err: Error, desc: Option<String>) -> Remark {
        Remark {
            loc: Location::Module,
            severity: Severity::Error,
            err,
            desc,
        }
    }

    pub fn with_desc(mut self, desc: String) -> Remark {
        self.desc = Some(desc);
        self
    }

    pub fn error(&self) -> &Error {
        &self.err
    }

    pub fn location(&self) -> &Location {
        &self.loc
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Kernel(KernelLocation {
                kernel,
                site: Some(site),
            }) => write!(f, "{}:%{}", kernel, site),
            Location::Kernel(KernelLocation { kernel, site: None }) => f.pad(kernel),
            Location::Module => f.pad("<module>"),
        }
    }
}

impl Display for Remark {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: [{}] ", self.loc, self.severity)?;
        Display::fmt(&self.err, f)?;
        if let Some(x) = &self.desc {
            write!(f, " {}", x)?;
        }
        Ok(())
    }
}

impl DiagnosticContext {
    pub fn record(&self, remark: Remark) {
        self.remarks.borrow_mut().push(remark);
    }

    pub fn remarks(&self) -> Vec<Remark> {
        self.remarks.take()
    }

    pub fn is_empty(&self) -> bool {
        self.remarks.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalysisError, FormatError};

    #[test]
    fn test_remark_locations() {
        let diag = DiagnosticContext::default();
        diag.record(Remark::module(
            Error::FormatError(FormatError::MissingField("name")),
            Some("in kernels.json".to_string()),
        ));
        diag.record(Remark::kernel(
            "add_kernel(int*)",
            Some(4),
            Error::AnalysisError(AnalysisError::MissingLoopLatch { depth: 2 }),
        ));
        assert!(!diag.is_empty());

        let remarks = diag.remarks();
        assert!(diag.is_empty());
        assert_eq!(2, remarks.len());
        assert!(matches!(remarks[0].location(), Location::Module));
        assert_eq!(
            "<module>: [error] Format error: missing field `name` in kernels.json",
            remarks[0].to_string()
        );
        assert!(remarks[1].to_string().starts_with("add_kernel(int*):%4: [warning] "));
    }
}
