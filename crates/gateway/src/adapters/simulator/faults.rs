//! Scripted failure injection for the simulated venue

use std::collections::VecDeque;

use crate::error::VenueError;

/// Venue operation a fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VenueOp {
    Submit,
    Cancel,
    Query,
}

/// A single injected misbehaviour
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail the call with this error without touching venue state
    Fail(VenueError),
    /// Apply the call, then report a timeout to the caller (lost ack)
    ApplyThenTimeout,
}

#[derive(Debug, Default)]
struct OpScript {
    queued: VecDeque<Fault>,
    always: Option<Fault>,
}

/// Per-operation fault queues. Queued faults are consumed one per call
/// before any persistent fault is considered.
#[derive(Debug, Default)]
pub(crate) struct FaultScript {
    submit: OpScript,
    cancel: OpScript,
    query: OpScript,
}

impl FaultScript {
    fn script_mut(&mut self, op: VenueOp) -> &mut OpScript {
        match op {
            VenueOp::Submit => &mut self.submit,
            VenueOp::Cancel => &mut self.cancel,
            VenueOp::Query => &mut self.query,
        }
    }

    pub(crate) fn push(&mut self, op: VenueOp, fault: Fault, times: usize) {
        let script = self.script_mut(op);
        for _ in 0..times {
            script.queued.push_back(fault.clone());
        }
    }

    pub(crate) fn set_always(&mut self, op: VenueOp, fault: Option<Fault>) {
        self.script_mut(op).always = fault;
    }

    pub(crate) fn next(&mut self, op: VenueOp) -> Option<Fault> {
        let script = self.script_mut(op);
        script.queued.pop_front().or_else(|| script.always.clone())
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
