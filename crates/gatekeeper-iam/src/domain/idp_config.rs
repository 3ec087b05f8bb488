//! Identity provider configurations of an org.
//!
//! Configurations share the org stream, so the write model narrows its
//! query to the events carrying its `idpConfigId`. Names are unique per
//! resource owner.

use serde::{Deserialize, Serialize};

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::TypedEvent;
use gatekeeper_core::model::{QueryReducer, Reducer, WriteModel};
use gatekeeper_core::registry::EventRegistryBuilder;
use gatekeeper_core::search_query::SearchQueryBuilder;
use gatekeeper_core::unique_constraint::UniqueConstraint;

use crate::domain::events::{IamEvent, ORG_AGGREGATE_TYPE};

/// Event type for a new configuration.
pub const IDP_CONFIG_ADDED_EVENT_TYPE: &str = "org.idp.config.added";
/// Event type for a renamed or reconfigured configuration.
pub const IDP_CONFIG_CHANGED_EVENT_TYPE: &str = "org.idp.config.changed";
/// Event type for a configuration taken out of service.
pub const IDP_CONFIG_DEACTIVATED_EVENT_TYPE: &str = "org.idp.config.deactivated";
/// Event type for a configuration put back into service.
pub const IDP_CONFIG_REACTIVATED_EVENT_TYPE: &str = "org.idp.config.reactivated";
/// Event type for a deleted configuration.
pub const IDP_CONFIG_REMOVED_EVENT_TYPE: &str = "org.idp.config.removed";

/// Unique constraint type for configuration names.
pub const IDP_CONFIG_NAME_UNIQUE_TYPE: &str = "idp_config_name";

/// Payload of `org.idp.config.added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigAdded {
    /// Configuration id.
    pub idp_config_id: String,
    /// Display name, unique per org.
    pub name: String,
    /// Users logging in through the provider are registered automatically.
    pub auto_register: bool,
}

/// Payload of `org.idp.config.changed`; absent fields are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigChanged {
    /// Configuration id.
    pub idp_config_id: String,
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New auto-register flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_register: Option<bool>,
}

/// Payload of `org.idp.config.deactivated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigDeactivated {
    /// Configuration id.
    pub idp_config_id: String,
}

/// Payload of `org.idp.config.reactivated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigReactivated {
    /// Configuration id.
    pub idp_config_id: String,
}

/// Payload of `org.idp.config.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpConfigRemoved {
    /// Configuration id.
    pub idp_config_id: String,
    /// Name at removal, released for reuse.
    pub name: String,
}

/// Identity provider configuration events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpConfigEvent {
    /// A configuration was added.
    Added(IdpConfigAdded),
    /// A configuration changed.
    Changed(IdpConfigChanged),
    /// A configuration was deactivated.
    Deactivated(IdpConfigDeactivated),
    /// A configuration was reactivated.
    Reactivated(IdpConfigReactivated),
    /// A configuration was removed.
    Removed(IdpConfigRemoved),
}

impl IdpConfigEvent {
    /// The configuration the event is about.
    #[must_use]
    pub fn idp_config_id(&self) -> &str {
        match self {
            Self::Added(e) => &e.idp_config_id,
            Self::Changed(e) => &e.idp_config_id,
            Self::Deactivated(e) => &e.idp_config_id,
            Self::Reactivated(e) => &e.idp_config_id,
            Self::Removed(e) => &e.idp_config_id,
        }
    }
}

/// Claims `name` within org `org_id`.
#[must_use]
pub fn add_name_constraint(org_id: &str, name: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        IDP_CONFIG_NAME_UNIQUE_TYPE,
        format!("{org_id}:{name}"),
        format!("identity provider {name} already exists"),
    )
}

/// Releases `name` within org `org_id`.
#[must_use]
pub fn remove_name_constraint(org_id: &str, name: &str) -> UniqueConstraint {
    UniqueConstraint::remove(IDP_CONFIG_NAME_UNIQUE_TYPE, format!("{org_id}:{name}"))
}

/// Registers the identity provider configuration mappers.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if an event type is empty.
pub fn register(
    builder: EventRegistryBuilder<IamEvent>,
) -> Result<EventRegistryBuilder<IamEvent>, EventstoreError> {
    builder
        .register_json(
            IDP_CONFIG_ADDED_EVENT_TYPE,
            |p| IamEvent::IdpConfig(IdpConfigEvent::Added(p)),
            |e| match e {
                IamEvent::IdpConfig(IdpConfigEvent::Added(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            IDP_CONFIG_CHANGED_EVENT_TYPE,
            |p| IamEvent::IdpConfig(IdpConfigEvent::Changed(p)),
            |e| match e {
                IamEvent::IdpConfig(IdpConfigEvent::Changed(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            IDP_CONFIG_DEACTIVATED_EVENT_TYPE,
            |p| IamEvent::IdpConfig(IdpConfigEvent::Deactivated(p)),
            |e| match e {
                IamEvent::IdpConfig(IdpConfigEvent::Deactivated(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            IDP_CONFIG_REACTIVATED_EVENT_TYPE,
            |p| IamEvent::IdpConfig(IdpConfigEvent::Reactivated(p)),
            |e| match e {
                IamEvent::IdpConfig(IdpConfigEvent::Reactivated(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            IDP_CONFIG_REMOVED_EVENT_TYPE,
            |p| IamEvent::IdpConfig(IdpConfigEvent::Removed(p)),
            |e| match e {
                IamEvent::IdpConfig(IdpConfigEvent::Removed(p)) => Some(p),
                _ => None,
            },
        )
}

/// Lifecycle state of a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdpConfigState {
    /// Never added.
    #[default]
    Unspecified,
    /// In service.
    Active,
    /// Out of service.
    Inactive,
    /// Deleted.
    Removed,
}

/// State of one identity provider configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IdpConfigWriteModel {
    /// Stream bookkeeping of the org.
    pub base: WriteModel<IamEvent>,
    /// Configuration id.
    pub idp_config_id: String,
    /// Current name.
    pub name: String,
    /// Current auto-register flag.
    pub auto_register: bool,
    /// Lifecycle state.
    pub state: IdpConfigState,
}

impl IdpConfigWriteModel {
    /// Creates an empty model for `idp_config_id` of org `org_id`.
    #[must_use]
    pub fn new(org_id: impl Into<String>, idp_config_id: impl Into<String>) -> Self {
        Self {
            base: WriteModel::new(org_id, ""),
            idp_config_id: idp_config_id.into(),
            name: String::new(),
            auto_register: false,
            state: IdpConfigState::Unspecified,
        }
    }

    /// Returns `true` unless the configuration was never added or is removed.
    #[must_use]
    pub fn exists(&self) -> bool {
        matches!(self.state, IdpConfigState::Active | IdpConfigState::Inactive)
    }

    fn recognizes(&self, event: &IamEvent) -> bool {
        match event {
            IamEvent::IdpConfig(config) => config.idp_config_id() == self.idp_config_id,
            IamEvent::Policy(_) | IamEvent::OrgDomain(_) | IamEvent::Member(_) => false,
        }
    }
}

impl Reducer<IamEvent> for IdpConfigWriteModel {
    fn append_events(&mut self, events: Vec<TypedEvent<IamEvent>>) {
        let events = events
            .into_iter()
            .filter(|event| self.recognizes(&event.kind))
            .collect();
        self.base.append_events(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        for event in self.base.events() {
            let IamEvent::IdpConfig(config) = &event.kind else {
                continue;
            };
            match config {
                IdpConfigEvent::Added(e) => {
                    self.name.clone_from(&e.name);
                    self.auto_register = e.auto_register;
                    self.state = IdpConfigState::Active;
                }
                IdpConfigEvent::Changed(e) => {
                    if let Some(name) = &e.name {
                        self.name.clone_from(name);
                    }
                    if let Some(auto_register) = e.auto_register {
                        self.auto_register = auto_register;
                    }
                }
                IdpConfigEvent::Deactivated(_) => self.state = IdpConfigState::Inactive,
                IdpConfigEvent::Reactivated(_) => self.state = IdpConfigState::Active,
                IdpConfigEvent::Removed(_) => self.state = IdpConfigState::Removed,
            }
        }
        self.base.reduce()
    }
}

impl QueryReducer<IamEvent> for IdpConfigWriteModel {
    fn query(&self) -> SearchQueryBuilder {
        let idp_config_id = self.idp_config_id.clone();
        self.base.query_with(ORG_AGGREGATE_TYPE, |q| {
            q.event_data(serde_json::json!({ "idpConfigId": idp_config_id }))
        })
    }

    fn processed_sequence(&self) -> u64 {
        self.base.processed_sequence
    }
}
