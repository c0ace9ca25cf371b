//! Typed wizard events and the synchronous emitter
//!
//! Events are a closed enum; each variant maps to an [`EventKind`]
//! discriminant used for handler registration. Handlers run
//! synchronously, in registration order, at the point of emission.

use crate::types::{FormData, NavigationDirection, StepId};
use crate::validation::rules::ValidationErrors;
use std::collections::HashMap;
use std::fmt;

/// Discriminant identifying one event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The current step changed
    StepChange,
    /// A step was entered
    StepEnter,
    /// A step was left
    StepLeave,
    /// The working data changed
    DataChange,
    /// Validation of a step failed
    ValidationError,
    /// Validation of a step passed
    ValidationSuccess,
    /// The wizard completed
    Complete,
    /// The wizard was cancelled
    Cancel,
    /// The wizard was reset
    Reset,
    /// State was written to storage
    Persist,
    /// State was restored from storage
    Restore,
}

impl EventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StepChange => "step:change",
            EventKind::StepEnter => "step:enter",
            EventKind::StepLeave => "step:leave",
            EventKind::DataChange => "data:change",
            EventKind::ValidationError => "validation:error",
            EventKind::ValidationSuccess => "validation:success",
            EventKind::Complete => "complete",
            EventKind::Cancel => "cancel",
            EventKind::Reset => "reset",
            EventKind::Persist => "persist",
            EventKind::Restore => "restore",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wizard lifecycle event with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    /// The current step changed
    StepChange {
        /// The step that became current
        step: StepId,
        /// Direction of the move
        direction: NavigationDirection,
        /// The step that was current before the move
        prev_step: StepId,
    },
    /// A step was entered
    StepEnter {
        /// The entered step
        step: StepId,
        /// Direction of the move
        direction: NavigationDirection,
    },
    /// A step was left
    StepLeave {
        /// The departed step
        step: StepId,
        /// Direction of the move
        direction: NavigationDirection,
    },
    /// The working data changed
    DataChange {
        /// The full data after the change
        data: FormData,
        /// Names of the fields the mutation touched
        changed_fields: Vec<String>,
    },
    /// Validation of a step failed
    ValidationError {
        /// The validated step
        step: StepId,
        /// The failing fields and their messages
        errors: ValidationErrors,
    },
    /// Validation of a step passed
    ValidationSuccess {
        /// The validated step
        step: StepId,
    },
    /// The wizard completed
    Complete {
        /// The final data
        data: FormData,
    },
    /// The wizard was cancelled
    Cancel {
        /// The data at cancellation
        data: FormData,
        /// The step that was current
        step: StepId,
    },
    /// The wizard was reset to its initial state
    Reset,
    /// State was written to storage
    Persist {
        /// The persisted data
        data: FormData,
    },
    /// State was restored from storage
    Restore {
        /// The restored data
        data: FormData,
    },
}

impl WizardEvent {
    /// The discriminant of this event
    pub fn kind(&self) -> EventKind {
        match self {
            WizardEvent::StepChange { .. } => EventKind::StepChange,
            WizardEvent::StepEnter { .. } => EventKind::StepEnter,
            WizardEvent::StepLeave { .. } => EventKind::StepLeave,
            WizardEvent::DataChange { .. } => EventKind::DataChange,
            WizardEvent::ValidationError { .. } => EventKind::ValidationError,
            WizardEvent::ValidationSuccess { .. } => EventKind::ValidationSuccess,
            WizardEvent::Complete { .. } => EventKind::Complete,
            WizardEvent::Cancel { .. } => EventKind::Cancel,
            WizardEvent::Reset => EventKind::Reset,
            WizardEvent::Persist { .. } => EventKind::Persist,
            WizardEvent::Restore { .. } => EventKind::Restore,
        }
    }
}

/// Handle for removing a registered event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    once: bool,
    handler: Box<dyn Fn(&WizardEvent) + Send + Sync>,
}

/// Synchronous per-kind event handler registry
#[derive(Default)]
pub struct EventEmitter {
    handlers: HashMap<EventKind, Vec<Registration>>,
    next_id: u64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&'static str, usize> = self
            .handlers
            .iter()
            .map(|(kind, regs)| (kind.as_str(), regs.len()))
            .collect();
        f.debug_struct("EventEmitter").field("handlers", &counts).finish()
    }
}

impl EventEmitter {
    /// Create an emitter with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        kind: EventKind,
        once: bool,
        handler: Box<dyn Fn(&WizardEvent) + Send + Sync>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push(Registration { id, once, handler });
        id
    }

    /// Register a handler for one event kind
    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&WizardEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(kind, false, Box::new(handler))
    }

    /// Register a handler that is removed after its first invocation
    pub fn once(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&WizardEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(kind, true, Box::new(handler))
    }

    /// Remove a handler; unknown ids are ignored
    pub fn off(&mut self, kind: EventKind, id: HandlerId) {
        if let Some(regs) = self.handlers.get_mut(&kind) {
            regs.retain(|reg| reg.id != id);
        }
    }

    /// Invoke the handlers registered for the event's kind, in
    /// registration order, then drop any `once` handlers that fired
    pub fn emit(&mut self, event: &WizardEvent) {
        let kind = event.kind();
        tracing::trace!(event = kind.as_str(), "emitting wizard event");
        if let Some(regs) = self.handlers.get_mut(&kind) {
            for reg in regs.iter() {
                (reg.handler)(event);
            }
            regs.retain(|reg| !reg.once);
        }
    }

    /// Number of handlers for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Remove all handlers
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let mut emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            emitter.on(EventKind::Reset, move |_| {
                order.lock().unwrap().push(label);
            });
        }

        emitter.emit(&WizardEvent::Reset);
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn test_off_removes_only_that_handler() {
        let mut emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let keep = Arc::clone(&count);
        emitter.on(EventKind::Reset, move |_| {
            keep.fetch_add(1, Ordering::SeqCst);
        });
        let dropped = Arc::clone(&count);
        let id = emitter.on(EventKind::Reset, move |_| {
            dropped.fetch_add(10, Ordering::SeqCst);
        });

        emitter.off(EventKind::Reset, id);
        emitter.emit(&WizardEvent::Reset);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(EventKind::Reset), 1);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let mut emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        emitter.once(EventKind::Complete, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let event = WizardEvent::Complete {
            data: FormData::new(),
        };
        emitter.emit(&event);
        emitter.emit(&event);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(EventKind::Complete), 0);
    }

    #[test]
    fn test_handlers_only_receive_their_kind() {
        let mut emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        emitter.on(EventKind::StepEnter, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&WizardEvent::Reset);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        emitter.emit(&WizardEvent::StepEnter {
            step: StepId::from("a"),
            direction: NavigationDirection::Next,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut emitter = EventEmitter::new();
        emitter.on(EventKind::Reset, |_| {});
        emitter.on(EventKind::Complete, |_| {});
        emitter.clear();
        assert_eq!(emitter.listener_count(EventKind::Reset), 0);
        assert_eq!(emitter.listener_count(EventKind::Complete), 0);
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::StepChange.as_str(), "step:change");
        assert_eq!(EventKind::DataChange.as_str(), "data:change");
        assert_eq!(EventKind::ValidationError.as_str(), "validation:error");
        assert_eq!(EventKind::Persist.as_str(), "persist");
        let event = WizardEvent::StepLeave {
            step: StepId::from("a"),
            direction: NavigationDirection::Prev,
        };
        assert_eq!(event.kind(), EventKind::StepLeave);
    }
}
