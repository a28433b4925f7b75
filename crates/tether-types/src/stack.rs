use facet::Facet;
use std::sync::Arc;

use crate::InvariantError;

/// One captured call-stack frame.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackFrame {
    /// Absolute instruction pointer.
    pub ip: u64,
    /// Instruction pointer relative to the containing module's load base.
    pub rel_pc: Option<u64>,
    /// Path of the module containing `ip`.
    pub module_path: Option<String>,
    /// Demangled symbol name, when symbolization was requested and succeeded.
    pub symbol: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn from_ip(ip: u64) -> Self {
        Self {
            ip,
            rel_pc: None,
            module_path: None,
            symbol: None,
            file: None,
            line: None,
        }
    }
}

/// A non-empty captured call stack, innermost frame first.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    frames: Vec<StackFrame>,
}

impl Stack {
    pub fn new(frames: Vec<StackFrame>) -> Result<Self, InvariantError> {
        if frames.is_empty() {
            return Err(InvariantError::EmptyStackFrames);
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Stack attached to a sequence node.
#[derive(Debug, Clone, Default)]
pub enum StackSlot {
    /// Nothing was captured.
    #[default]
    Absent,
    /// Frames captured when the node was created.
    Captured(Arc<Stack>),
    /// An awaited ancestor already carries a stack; none was captured here.
    Inherited,
}

impl StackSlot {
    /// True for both a captured stack and the inherited marker.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    pub fn captured(&self) -> Option<&Stack> {
        match self {
            Self::Captured(stack) => Some(stack),
            Self::Absent | Self::Inherited => None,
        }
    }
}

impl From<Option<Stack>> for StackSlot {
    fn from(stack: Option<Stack>) -> Self {
        match stack {
            Some(stack) => Self::Captured(Arc::new(stack)),
            None => Self::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stacks_are_rejected() {
        let err = Stack::new(Vec::new()).expect_err("empty stack must fail");
        assert_eq!(err, InvariantError::EmptyStackFrames);
    }

    #[test]
    fn inherited_marker_counts_as_present() {
        assert!(StackSlot::Inherited.is_present());
        assert!(!StackSlot::Absent.is_present());
        assert!(StackSlot::Inherited.captured().is_none());

        let stack = Stack::new(vec![StackFrame::from_ip(0x1000)]).expect("one frame is enough");
        let slot = StackSlot::from(Some(stack.clone()));
        assert_eq!(slot.captured(), Some(&stack));
    }
}
