//! Organization domains.
//!
//! An org owns any number of domains. A domain must be verified before it
//! can become the org's primary domain; verification reserves it store-wide
//! through the `org_domain` unique constraint.

use serde::{Deserialize, Serialize};

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::TypedEvent;
use gatekeeper_core::model::{QueryReducer, Reducer, WriteModel};
use gatekeeper_core::registry::EventRegistryBuilder;
use gatekeeper_core::search_query::SearchQueryBuilder;
use gatekeeper_core::unique_constraint::UniqueConstraint;

use crate::domain::events::{IamEvent, ORG_AGGREGATE_TYPE};

/// Event type for a domain added to an org.
pub const ORG_DOMAIN_ADDED_EVENT_TYPE: &str = "org.domain.added";
/// Event type for a domain whose ownership was proven.
pub const ORG_DOMAIN_VERIFIED_EVENT_TYPE: &str = "org.domain.verified";
/// Event type for a domain becoming the org's primary domain.
pub const ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE: &str = "org.domain.primary.set";
/// Event type for a domain removed from an org.
pub const ORG_DOMAIN_REMOVED_EVENT_TYPE: &str = "org.domain.removed";

/// Unique constraint type reserving verified domains.
pub const ORG_DOMAIN_UNIQUE_TYPE: &str = "org_domain";

/// Payload of `org.domain.added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainAdded {
    /// The domain name.
    pub domain: String,
}

/// Payload of `org.domain.verified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainVerified {
    /// The domain name.
    pub domain: String,
}

/// Payload of `org.domain.primary.set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainPrimarySet {
    /// The domain name.
    pub domain: String,
}

/// Payload of `org.domain.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDomainRemoved {
    /// The domain name.
    pub domain: String,
}

/// Org domain lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgDomainEvent {
    /// A domain was added.
    Added(OrgDomainAdded),
    /// A domain was verified.
    Verified(OrgDomainVerified),
    /// A domain became primary.
    PrimarySet(OrgDomainPrimarySet),
    /// A domain was removed.
    Removed(OrgDomainRemoved),
}

impl OrgDomainEvent {
    /// The domain name the event is about.
    #[must_use]
    pub fn domain(&self) -> &str {
        match self {
            Self::Added(e) => &e.domain,
            Self::Verified(e) => &e.domain,
            Self::PrimarySet(e) => &e.domain,
            Self::Removed(e) => &e.domain,
        }
    }
}

/// Constraint reserving `domain` for the verifying org.
#[must_use]
pub fn add_domain_constraint(domain: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        ORG_DOMAIN_UNIQUE_TYPE,
        domain,
        format!("domain {domain} is already taken"),
    )
}

/// Releases the reservation of `domain`.
#[must_use]
pub fn remove_domain_constraint(domain: &str) -> UniqueConstraint {
    UniqueConstraint::remove(ORG_DOMAIN_UNIQUE_TYPE, domain)
}

/// Registers the org domain mappers.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if an event type is empty.
pub fn register(
    builder: EventRegistryBuilder<IamEvent>,
) -> Result<EventRegistryBuilder<IamEvent>, EventstoreError> {
    builder
        .register_json(
            ORG_DOMAIN_ADDED_EVENT_TYPE,
            |p| IamEvent::OrgDomain(OrgDomainEvent::Added(p)),
            |e| match e {
                IamEvent::OrgDomain(OrgDomainEvent::Added(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            ORG_DOMAIN_VERIFIED_EVENT_TYPE,
            |p| IamEvent::OrgDomain(OrgDomainEvent::Verified(p)),
            |e| match e {
                IamEvent::OrgDomain(OrgDomainEvent::Verified(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE,
            |p| IamEvent::OrgDomain(OrgDomainEvent::PrimarySet(p)),
            |e| match e {
                IamEvent::OrgDomain(OrgDomainEvent::PrimarySet(p)) => Some(p),
                _ => None,
            },
        )?
        .register_json(
            ORG_DOMAIN_REMOVED_EVENT_TYPE,
            |p| IamEvent::OrgDomain(OrgDomainEvent::Removed(p)),
            |e| match e {
                IamEvent::OrgDomain(OrgDomainEvent::Removed(p)) => Some(p),
                _ => None,
            },
        )
}

/// Lifecycle state of an org domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgDomainState {
    /// Never added.
    #[default]
    Unspecified,
    /// Added and not removed.
    Active,
    /// Removed; may be added again.
    Removed,
}

/// State of one domain of one org.
#[derive(Debug, Clone, PartialEq)]
pub struct OrgDomainWriteModel {
    /// Stream bookkeeping of the org.
    pub base: WriteModel<IamEvent>,
    /// The domain name.
    pub domain: String,
    /// Lifecycle state.
    pub state: OrgDomainState,
    /// Ownership has been proven.
    pub verified: bool,
    /// The domain is the org's primary domain.
    pub primary: bool,
}

impl OrgDomainWriteModel {
    /// Creates an empty model for `domain` of org `org_id`.
    #[must_use]
    pub fn new(org_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            base: WriteModel::new(org_id, ""),
            domain: domain.into(),
            state: OrgDomainState::Unspecified,
            verified: false,
            primary: false,
        }
    }

    /// Returns `true` while the domain belongs to the org.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.state == OrgDomainState::Active
    }

    /// Events about this domain, and every primary change of the org.
    fn recognizes(&self, event: &IamEvent) -> bool {
        match event {
            IamEvent::OrgDomain(OrgDomainEvent::PrimarySet(_)) => true,
            IamEvent::OrgDomain(e) => e.domain() == self.domain,
            IamEvent::Policy(_) | IamEvent::Member(_) | IamEvent::IdpConfig(_) => false,
        }
    }

    fn apply(&mut self, event: &OrgDomainEvent) {
        if let OrgDomainEvent::PrimarySet(e) = event {
            self.primary = e.domain == self.domain;
            return;
        }
        if event.domain() != self.domain {
            return;
        }
        match event {
            OrgDomainEvent::Added(_) => {
                self.state = OrgDomainState::Active;
                self.verified = false;
                self.primary = false;
            }
            OrgDomainEvent::Verified(_) => self.verified = true,
            OrgDomainEvent::Removed(_) => {
                self.state = OrgDomainState::Removed;
                self.verified = false;
                self.primary = false;
            }
            OrgDomainEvent::PrimarySet(_) => {}
        }
    }
}

impl Reducer<IamEvent> for OrgDomainWriteModel {
    fn append_events(&mut self, events: Vec<TypedEvent<IamEvent>>) {
        let events = events
            .into_iter()
            .filter(|event| self.recognizes(&event.kind))
            .collect();
        self.base.append_events(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let events: Vec<OrgDomainEvent> = self
            .base
            .events()
            .iter()
            .filter_map(|event| match &event.kind {
                IamEvent::OrgDomain(e) => Some(e.clone()),
                IamEvent::Policy(_) | IamEvent::Member(_) | IamEvent::IdpConfig(_) => None,
            })
            .collect();
        for event in &events {
            self.apply(event);
        }
        self.base.reduce()
    }
}

impl QueryReducer<IamEvent> for OrgDomainWriteModel {
    /// Events about this domain, plus every primary change of the org since
    /// another domain becoming primary demotes this one.
    fn query(&self) -> SearchQueryBuilder {
        let domain = self.domain.clone();
        let org_id = self.base.aggregate_id.clone();
        let processed = self.base.processed_sequence;
        self.base
            .query_with(ORG_AGGREGATE_TYPE, |q| {
                q.event_data(serde_json::json!({ "domain": domain }))
            })
            .add_query(move |q| {
                q.aggregate_types([ORG_AGGREGATE_TYPE])
                    .aggregate_ids([org_id])
                    .event_types([ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE])
                    .sequence_greater(processed)
            })
    }

    fn processed_sequence(&self) -> u64 {
        self.base.processed_sequence
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_test_support::stored_event;
    use serde_json::json;

    use super::*;
    use crate::domain::events::event_registry;

    fn typed(event_type: &str, sequence: u64, domain: &str) -> TypedEvent<IamEvent> {
        event_registry()
            .unwrap()
            .map_event(stored_event(
                "org",
                "org-1",
                "org-1",
                event_type,
                sequence,
                Some(json!({ "domain": domain })),
            ))
            .unwrap()
    }

    #[test]
    fn test_lifecycle_of_one_domain() {
        // Arrange
        let mut model = OrgDomainWriteModel::new("org-1", "a.com");
        model.append_events(vec![
            typed(ORG_DOMAIN_ADDED_EVENT_TYPE, 1, "a.com"),
            typed(ORG_DOMAIN_VERIFIED_EVENT_TYPE, 2, "a.com"),
            typed(ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE, 3, "a.com"),
        ]);

        // Act
        model.reduce().unwrap();

        // Assert
        assert!(model.exists());
        assert!(model.verified);
        assert!(model.primary);
        assert_eq!(model.base.processed_sequence, 3);
        assert_eq!(model.base.resource_owner, "org-1");
    }

    #[test]
    fn test_other_domain_becoming_primary_demotes() {
        let mut model = OrgDomainWriteModel::new("org-1", "a.com");
        model.append_events(vec![
            typed(ORG_DOMAIN_ADDED_EVENT_TYPE, 1, "a.com"),
            typed(ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE, 2, "a.com"),
            typed(ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE, 5, "b.com"),
        ]);

        model.reduce().unwrap();

        assert!(!model.primary);
    }

    #[test]
    fn test_events_of_other_domains_are_not_buffered() {
        // Arrange
        let mut model = OrgDomainWriteModel::new("org-1", "a.com");

        // Act
        model.append_events(vec![
            typed(ORG_DOMAIN_ADDED_EVENT_TYPE, 4, "b.com"),
            typed(ORG_DOMAIN_VERIFIED_EVENT_TYPE, 5, "b.com"),
        ]);
        model.reduce().unwrap();

        // Assert
        assert!(model.base.events().is_empty());
        assert_eq!(model.base.processed_sequence, 0);
        assert!(model.base.change_date.is_none());
        assert_eq!(model.state, OrgDomainState::Unspecified);
    }

    #[test]
    fn test_removal_resets_flags() {
        let mut model = OrgDomainWriteModel::new("org-1", "a.com");
        model.append_events(vec![
            typed(ORG_DOMAIN_ADDED_EVENT_TYPE, 1, "a.com"),
            typed(ORG_DOMAIN_VERIFIED_EVENT_TYPE, 2, "a.com"),
            typed(ORG_DOMAIN_REMOVED_EVENT_TYPE, 3, "a.com"),
        ]);

        model.reduce().unwrap();

        assert_eq!(model.state, OrgDomainState::Removed);
        assert!(!model.verified);
    }

    #[test]
    fn test_query_ors_domain_and_primary_changes() {
        let model = OrgDomainWriteModel::new("org-1", "a.com");

        let query = model.query().build().unwrap();

        assert_eq!(query.filters.len(), 2);
    }

    #[test]
    fn test_constraints_reserve_the_domain_name() {
        let add = add_domain_constraint("a.com");
        let remove = remove_domain_constraint("a.com");

        assert_eq!(add.unique_type, ORG_DOMAIN_UNIQUE_TYPE);
        assert_eq!(add.unique_field, "a.com");
        assert_eq!(remove.unique_field, "a.com");
    }
}
