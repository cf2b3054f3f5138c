//! Type-keyed handler table.

use std::collections::HashMap;
use std::fmt;

use prost_types::Any;
use seccheck_wire::envelope::type_name;
use seccheck_wire::{Event, FrameError};

/// Consumes one decoded event. Runs on the poll thread, so it must not block.
pub type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// What happened to an envelope handed to [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler consumed the event.
    Handled,
    /// No handler is registered for the event's type.
    Unhandled,
}

/// Maps message full names (`gvisor.syscall.Open`) to handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events named `name`, replacing any previous one.
    #[must_use]
    pub fn on(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Self {
        let _ = self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Whether a handler is registered for `name`.
    #[must_use]
    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Decodes `any` and runs the handler registered for its type.
    ///
    /// # Errors
    ///
    /// Returns an error if the type URL is malformed or the payload does not
    /// decode as the named message. Unknown types are not errors.
    pub fn dispatch(&self, any: &Any) -> Result<Dispatched, FrameError> {
        let name = type_name(any)?;
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!(name, "no callback registered for {name}");
            return Ok(Dispatched::Unhandled);
        };
        handler(&Event::decode(any)?);
        Ok(Dispatched::Handled)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher").field("handlers", &names).finish()
    }
}
