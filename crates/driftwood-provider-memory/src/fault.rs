//! Fault injection

use driftwood_provider::ProviderError;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Observe,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Observe => write!(f, "observe"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// A scripted failure for the next call of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Reject the call with a throttling error before doing anything
    Throttle,
    /// Reject the call with a network error before doing anything
    Network,
    /// Reject the call as invalid
    InvalidSpec(String),
    PermissionDenied,
    /// Perform the call, then report a network error as if the response
    /// were lost on the way back
    LoseResponse,
}

impl Fault {
    pub(crate) fn error(&self, operation: Operation) -> ProviderError {
        match self {
            Fault::Throttle => ProviderError::Throttled(format!("{} rate exceeded", operation)),
            Fault::Network | Fault::LoseResponse => {
                ProviderError::Network(format!("connection reset during {}", operation))
            }
            Fault::InvalidSpec(message) => ProviderError::InvalidSpec(message.clone()),
            Fault::PermissionDenied => {
                ProviderError::PermissionDenied(format!("{} is not allowed", operation))
            }
        }
    }

    /// Whether the side effect happens before the error is reported
    pub(crate) fn applies_effect(&self) -> bool {
        matches!(self, Fault::LoseResponse)
    }
}

/// Per-operation FIFO queues of pending faults.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    observe: VecDeque<Fault>,
    create: VecDeque<Fault>,
    update: VecDeque<Fault>,
    delete: VecDeque<Fault>,
}

impl FaultPlan {
    fn queue(&mut self, operation: Operation) -> &mut VecDeque<Fault> {
        match operation {
            Operation::Observe => &mut self.observe,
            Operation::Create => &mut self.create,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }

    pub(crate) fn push(&mut self, operation: Operation, fault: Fault, times: usize) {
        let queue = self.queue(operation);
        for _ in 0..times {
            queue.push_back(fault.clone());
        }
    }

    pub(crate) fn next(&mut self, operation: Operation) -> Option<Fault> {
        self.queue(operation).pop_front()
    }

    pub(crate) fn pending(&mut self, operation: Operation) -> usize {
        self.queue(operation).len()
    }
}
