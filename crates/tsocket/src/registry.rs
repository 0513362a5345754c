//! One-shot registry of named event definitions.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::channel::{ResponseChannel, derive_response_channel};
use crate::event::EventDefinition;

/// Errors raised while registering events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Two definitions share a name.
    #[error("event '{name}' is defined more than once")]
    DuplicateName { name: String },
    /// An event name was empty.
    #[error("event names must not be empty")]
    EmptyName,
    /// The registry was already populated.
    #[error("events have already been registered")]
    AlreadyInitialized,
}

/// A definition together with its name and derived response channel.
#[derive(Debug)]
pub struct RegisteredEvent {
    name: String,
    channel: ResponseChannel,
    definition: EventDefinition,
}

impl RegisteredEvent {
    /// Event name clients send.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel on which failures for this event are reported.
    #[must_use]
    pub const fn channel(&self) -> &ResponseChannel {
        &self.channel
    }

    /// The registered definition.
    #[must_use]
    pub const fn definition(&self) -> &EventDefinition {
        &self.definition
    }
}

pub(crate) type EventTable = Arc<HashMap<String, Arc<RegisteredEvent>>>;

/// Name to definition map, populated exactly once.
///
/// Reads never lock: once populated the table is immutable and shared by
/// reference with every connection.
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: OnceCell<EventTable>,
}

impl EventRegistry {
    /// Creates an empty, unpopulated registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the registry with `definitions`.
    ///
    /// Either every definition is registered or none is.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AlreadyInitialized`] on a second call,
    /// [`RegistrationError::DuplicateName`] when two definitions share a name
    /// and [`RegistrationError::EmptyName`] for an empty name.
    pub fn register<I, N>(&self, definitions: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = (N, EventDefinition)>,
        N: Into<String>,
    {
        if self.events.get().is_some() {
            return Err(RegistrationError::AlreadyInitialized);
        }

        let mut table = HashMap::new();
        for (name, definition) in definitions {
            let name = name.into();
            if name.is_empty() {
                return Err(RegistrationError::EmptyName);
            }
            match table.entry(name) {
                Entry::Occupied(entry) => {
                    return Err(RegistrationError::DuplicateName {
                        name: entry.key().clone(),
                    });
                }
                Entry::Vacant(entry) => {
                    let name = entry.key().clone();
                    entry.insert(Arc::new(RegisteredEvent {
                        channel: derive_response_channel(&name),
                        name,
                        definition,
                    }));
                }
            }
        }

        self.events
            .set(Arc::new(table))
            .map_err(|_| RegistrationError::AlreadyInitialized)
    }

    /// Looks up the event registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredEvent>> {
        self.events.get()?.get(name).cloned()
    }

    /// Whether [`register`](Self::register) has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.events.get().is_some()
    }

    /// Number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.get().map_or(0, |events| events.len())
    }

    /// Whether no events are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .events
            .get()
            .map(|events| events.keys().cloned().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Shared table of every registered event; empty before registration.
    pub(crate) fn table(&self) -> EventTable {
        self.events.get().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::event::{HandlerError, define_event};
    use crate::schema::Shape;

    fn noop_event() -> EventDefinition {
        define_event(Shape::Any).handler(|_input, _ctx| async { Ok::<_, HandlerError>(()) })
    }

    #[fixture]
    fn registry() -> EventRegistry {
        EventRegistry::new()
    }

    #[rstest]
    fn registered_events_are_looked_up_by_name(registry: EventRegistry) {
        registry
            .register([("greet", noop_event()), ("chat", noop_event())])
            .expect("register");

        let greet = registry.lookup("greet").expect("greet registered");
        assert_eq!(greet.name(), "greet");
        assert_eq!(greet.channel(), &derive_response_channel("greet"));
        assert!(registry.lookup("ghost").is_none());
        assert_eq!(registry.names(), vec!["chat".to_owned(), "greet".to_owned()]);
    }

    #[rstest]
    fn duplicate_names_leave_the_registry_empty(registry: EventRegistry) {
        let error = registry
            .register([
                ("greet", noop_event()),
                ("chat", noop_event()),
                ("greet", noop_event()),
            ])
            .expect_err("duplicate greet");

        assert_eq!(
            error,
            RegistrationError::DuplicateName {
                name: "greet".into()
            }
        );
        assert!(!registry.is_initialized());
        assert!(registry.lookup("chat").is_none());
        assert!(registry.is_empty());
    }

    #[rstest]
    fn registration_happens_once(registry: EventRegistry) {
        registry.register([("greet", noop_event())]).expect("first");
        let error = registry
            .register([("chat", noop_event())])
            .expect_err("second registration");
        assert_eq!(error, RegistrationError::AlreadyInitialized);
        assert!(registry.lookup("chat").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    fn a_failed_registration_can_be_retried(registry: EventRegistry) {
        registry
            .register([("a", noop_event()), ("a", noop_event())])
            .expect_err("duplicate");
        registry.register([("a", noop_event())]).expect("retry");
        assert!(registry.lookup("a").is_some());
    }

    #[rstest]
    fn empty_names_are_rejected(registry: EventRegistry) {
        let error = registry
            .register([("", noop_event())])
            .expect_err("empty name");
        assert_eq!(error, RegistrationError::EmptyName);
    }

    #[rstest]
    fn empty_registration_still_initialises(registry: EventRegistry) {
        registry
            .register(Vec::<(String, EventDefinition)>::new())
            .expect("empty set");
        assert!(registry.is_initialized());
        assert!(registry.table().is_empty());
    }
}
