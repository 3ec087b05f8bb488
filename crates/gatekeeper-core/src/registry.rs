//! Event mapper registry.
//!
//! Every event type the eventstore writes or reads needs a mapper: a push
//! mapper turns a typed command payload into JSON, a filter mapper turns a
//! stored [`Event`] back into the caller's event union. The registry is
//! assembled once through [`EventRegistryBuilder`] and is immutable
//! afterwards, so it can be shared between tasks without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, EventstoreError};
use crate::event::{Event, EventType, TypedEvent};

type PushMapper<E> = Arc<dyn Fn(&E) -> Result<Option<Value>, BoxError> + Send + Sync>;
type FilterMapper<E> = Arc<dyn Fn(&Event) -> Result<E, BoxError> + Send + Sync>;

struct Mappers<E> {
    push: Option<PushMapper<E>>,
    filter: Option<FilterMapper<E>>,
}

impl<E> Default for Mappers<E> {
    fn default() -> Self {
        Self {
            push: None,
            filter: None,
        }
    }
}

/// Collects mappers before the registry is frozen.
pub struct EventRegistryBuilder<E> {
    mappers: HashMap<EventType, Mappers<E>>,
}

impl<E> Default for EventRegistryBuilder<E> {
    fn default() -> Self {
        Self {
            mappers: HashMap::new(),
        }
    }
}

impl<E: 'static> EventRegistryBuilder<E> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mapper that serializes `event_type` payloads.
    ///
    /// Registering again for the same type replaces the previous push mapper
    /// and leaves the filter mapper untouched.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` if `event_type` is empty.
    pub fn register_push_mapper<F>(
        mut self,
        event_type: impl Into<EventType>,
        mapper: F,
    ) -> Result<Self, EventstoreError>
    where
        F: Fn(&E) -> Result<Option<Value>, BoxError> + Send + Sync + 'static,
    {
        let event_type = checked(event_type.into())?;
        self.mappers.entry(event_type).or_default().push = Some(Arc::new(mapper));
        Ok(self)
    }

    /// Registers the mapper that decodes stored `event_type` events.
    ///
    /// Registering again for the same type replaces the previous filter
    /// mapper and leaves the push mapper untouched.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` if `event_type` is empty.
    pub fn register_filter_mapper<F>(
        mut self,
        event_type: impl Into<EventType>,
        mapper: F,
    ) -> Result<Self, EventstoreError>
    where
        F: Fn(&Event) -> Result<E, BoxError> + Send + Sync + 'static,
    {
        let event_type = checked(event_type.into())?;
        self.mappers.entry(event_type).or_default().filter = Some(Arc::new(mapper));
        Ok(self)
    }

    /// Registers both directions for a payload type `T` with a serde JSON
    /// representation.
    ///
    /// `wrap` lifts a decoded payload into the event union; `unwrap` picks the
    /// payload back out of it and returns `None` for any other variant. A
    /// payload serializing to `null` is stored without data, and a stored
    /// event without data is decoded from `null`.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` if `event_type` is empty.
    pub fn register_json<T>(
        self,
        event_type: impl Into<EventType>,
        wrap: fn(T) -> E,
        unwrap: fn(&E) -> Option<&T>,
    ) -> Result<Self, EventstoreError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let event_type = event_type.into();
        let push_type = event_type.clone();
        self.register_push_mapper(event_type.clone(), move |kind: &E| {
            let payload = unwrap(kind)
                .ok_or_else(|| format!("payload does not belong to event type {push_type}"))?;
            match serde_json::to_value(payload)? {
                Value::Null => Ok(None),
                value => Ok(Some(value)),
            }
        })?
        .register_filter_mapper(event_type, move |event: &Event| {
            let payload = event.payload.clone().unwrap_or(Value::Null);
            Ok(wrap(serde_json::from_value(payload)?))
        })
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> EventRegistry<E> {
        EventRegistry {
            mappers: self.mappers,
        }
    }
}

fn checked(event_type: EventType) -> Result<EventType, EventstoreError> {
    if event_type.is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "event type must not be empty".to_owned(),
        ));
    }
    Ok(event_type)
}

/// Immutable mapping from event types to their mappers.
pub struct EventRegistry<E> {
    mappers: HashMap<EventType, Mappers<E>>,
}

impl<E> EventRegistry<E> {
    /// Returns `true` if stored events of `event_type` can be decoded.
    #[must_use]
    pub fn has_filter_mapper(&self, event_type: &EventType) -> bool {
        self.mappers
            .get(event_type)
            .is_some_and(|mappers| mappers.filter.is_some())
    }

    /// Serializes a command payload through its push mapper.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Unimplemented` if no push mapper is
    /// registered and `EventstoreError::InvalidArgument` if the mapper fails
    /// or produces something other than a JSON object.
    pub fn push_payload(
        &self,
        event_type: &EventType,
        kind: &E,
    ) -> Result<Option<Value>, EventstoreError> {
        let mapper = self
            .mappers
            .get(event_type)
            .and_then(|mappers| mappers.push.as_ref())
            .ok_or_else(|| EventstoreError::Unimplemented(event_type.clone()))?;

        let payload = mapper(kind).map_err(|e| {
            EventstoreError::InvalidArgument(format!("unable to map {event_type} payload: {e}"))
        })?;
        match payload {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Object(_)) => Ok(Some(value)),
            Some(other) => Err(EventstoreError::InvalidArgument(format!(
                "payload of {event_type} must be a JSON object, got {other}"
            ))),
        }
    }

    /// Decodes a stored event through its filter mapper.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Unimplemented` if no filter mapper is
    /// registered and `EventstoreError::Unmarshal` if the mapper fails.
    pub fn map_event(&self, event: Event) -> Result<TypedEvent<E>, EventstoreError> {
        let mapper = self
            .mappers
            .get(&event.event_type)
            .and_then(|mappers| mappers.filter.as_ref())
            .ok_or_else(|| EventstoreError::Unimplemented(event.event_type.clone()))?;

        let kind = mapper(&event).map_err(|e| EventstoreError::Unmarshal {
            event_type: event.event_type.clone(),
            message: e.to_string(),
        })?;
        Ok(TypedEvent {
            metadata: event,
            kind,
        })
    }

    /// Decodes a batch of stored events, failing on the first error.
    ///
    /// # Errors
    ///
    /// See [`EventRegistry::map_event`].
    pub fn map_events(&self, events: Vec<Event>) -> Result<Vec<TypedEvent<E>>, EventstoreError> {
        events.into_iter().map(|event| self.map_event(event)).collect()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.mappers.keys().map(EventType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("EventRegistry")
            .field("event_types", &types)
            .finish()
    }
}
