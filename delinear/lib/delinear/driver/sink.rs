use crate::access::Axis;
use std::fmt::{Display, Formatter};

/**
 * Receives the facts discovered for each kernel. `reset` is called once per
 * kernel before any array facts of that kernel.
 **/
pub trait ArrayInfoSink {
    fn reset(&mut self, kernel: &str);
    fn set_array_info(&mut self, kernel: &str, arg_index: usize, dims: usize, is_read: bool, is_written: bool);
    fn set_array_dim_info(&mut self, kernel: &str, arg_index: usize, dim: usize, axis: Axis);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Reset {
        kernel: String,
    },
    ArrayInfo {
        kernel: String,
        arg_index: usize,
        dims: usize,
        is_read: bool,
        is_written: bool,
    },
    ArrayDimInfo {
        kernel: String,
        arg_index: usize,
        dim: usize,
        axis: Axis,
    },
}

/// Keeps every call in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn events(&self) -> &[SinkEvent] {
        self.events.as_slice()
    }

    pub fn array_info_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::ArrayInfo { .. }))
            .count()
    }

    pub fn dim_info_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::ArrayDimInfo { .. }))
            .count()
    }
}

impl ArrayInfoSink for RecordingSink {
    fn reset(&mut self, kernel: &str) {
        self.events.push(SinkEvent::Reset {
            kernel: kernel.to_string(),
        });
    }

    fn set_array_info(&mut self, kernel: &str, arg_index: usize, dims: usize, is_read: bool, is_written: bool) {
        self.events.push(SinkEvent::ArrayInfo {
            kernel: kernel.to_string(),
            arg_index,
            dims,
            is_read,
            is_written,
        });
    }

    fn set_array_dim_info(&mut self, kernel: &str, arg_index: usize, dim: usize, axis: Axis) {
        self.events.push(SinkEvent::ArrayDimInfo {
            kernel: kernel.to_string(),
            arg_index,
            dim,
            axis,
        });
    }
}

impl Display for SinkEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkEvent::Reset { kernel } => write!(f, "reset_info({});", kernel),
            SinkEvent::ArrayInfo {
                kernel,
                arg_index,
                dims,
                is_read,
                is_written,
            } => write!(
                f,
                "set_array_info({}, {}, {}, {}, {});",
                kernel, arg_index, dims, *is_read as u8, *is_written as u8
            ),
            SinkEvent::ArrayDimInfo {
                kernel,
                arg_index,
                dim,
                axis,
            } => write!(
                f,
                "set_array_dim_info({}, {}, {}, {});",
                kernel,
                arg_index,
                dim,
                axis.index()
            ),
        }
    }
}

impl Display for RecordingSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for e in self.events.iter() {
            writeln!(f, "{}", e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_sequence() {
        let mut sink = RecordingSink::default();
        sink.reset("_Z8k_kernelv");
        sink.set_array_info("_Z8k_kernelv", 1, 2, true, false);
        sink.set_array_dim_info("_Z8k_kernelv", 1, 0, Axis::Y);
        assert_eq!(1, sink.array_info_count());
        assert_eq!(1, sink.dim_info_count());
        assert_eq!(
            "reset_info(_Z8k_kernelv);\n\
             set_array_info(_Z8k_kernelv, 1, 2, 1, 0);\n\
             set_array_dim_info(_Z8k_kernelv, 1, 0, 1);\n",
            sink.to_string()
        );
    }
}
