//! Domain events for the IAM context.
//!
//! [`IamEvent`] is the closed union every IAM model folds. Each concrete
//! payload is registered under its textual event type by
//! [`event_registry`].

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::EventType;
use gatekeeper_core::registry::{EventRegistry, EventRegistryBuilder};

use crate::domain::idp_config::{self, IdpConfigEvent};
use crate::domain::member::{self, MemberEvent};
use crate::domain::org_domain::{self, OrgDomainEvent};
use crate::domain::policy::{
    self, LabelPolicy, LoginPolicy, OrgIamPolicy, PasswordAgePolicy, PasswordComplexityPolicy,
    PasswordLockoutPolicy, PolicyEvent,
};

/// Aggregate type of instance streams.
pub const INSTANCE_AGGREGATE_TYPE: &str = "instance";

/// Aggregate type of organization streams.
pub const ORG_AGGREGATE_TYPE: &str = "org";

/// Schema version stamped on every IAM event.
pub const AGGREGATE_VERSION: &str = "v1";

/// Level at which policies and members are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Instance-wide defaults.
    Instance,
    /// A single organization.
    Org,
}

impl Scope {
    /// The aggregate type of streams at this scope.
    #[must_use]
    pub fn aggregate_type(self) -> &'static str {
        match self {
            Self::Instance => INSTANCE_AGGREGATE_TYPE,
            Self::Org => ORG_AGGREGATE_TYPE,
        }
    }

    /// Builds a scope-prefixed event type, e.g. `org.member.added`.
    #[must_use]
    pub fn event_type(self, suffix: &str) -> EventType {
        EventType::new(format!("{}.{suffix}", self.aggregate_type()))
    }
}

/// Every event the IAM context writes or reads.
#[derive(Debug, Clone, PartialEq)]
pub enum IamEvent {
    /// A policy was added, changed or removed.
    Policy(PolicyEvent),
    /// An organization domain changed.
    OrgDomain(OrgDomainEvent),
    /// A membership changed.
    Member(MemberEvent),
    /// An identity provider configuration changed.
    IdpConfig(IdpConfigEvent),
}

/// Builds the registry mapping every IAM event type to its payload.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if an event type is empty.
pub fn event_registry() -> Result<EventRegistry<IamEvent>, EventstoreError> {
    let builder = EventRegistryBuilder::new();
    let builder = policy::register::<LabelPolicy>(builder)?;
    let builder = policy::register::<LoginPolicy>(builder)?;
    let builder = policy::register::<OrgIamPolicy>(builder)?;
    let builder = policy::register::<PasswordAgePolicy>(builder)?;
    let builder = policy::register::<PasswordComplexityPolicy>(builder)?;
    let builder = policy::register::<PasswordLockoutPolicy>(builder)?;
    let builder = org_domain::register(builder)?;
    let builder = member::register(builder)?;
    let builder = idp_config::register(builder)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use gatekeeper_test_support::stored_event;

    use super::*;
    use crate::domain::idp_config::{
        IDP_CONFIG_ADDED_EVENT_TYPE, IDP_CONFIG_CHANGED_EVENT_TYPE,
        IDP_CONFIG_DEACTIVATED_EVENT_TYPE, IDP_CONFIG_REACTIVATED_EVENT_TYPE,
        IDP_CONFIG_REMOVED_EVENT_TYPE, IdpConfigAdded, IdpConfigChanged, IdpConfigDeactivated,
        IdpConfigReactivated, IdpConfigRemoved,
    };
    use crate::domain::member::{MemberAdded, MemberChanged, MemberRemoved};
    use crate::domain::org_domain::{
        ORG_DOMAIN_ADDED_EVENT_TYPE, ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE,
        ORG_DOMAIN_REMOVED_EVENT_TYPE, ORG_DOMAIN_VERIFIED_EVENT_TYPE, OrgDomainAdded,
        OrgDomainPrimarySet, OrgDomainRemoved, OrgDomainVerified,
    };
    use crate::domain::policy::{
        ADDED, CHANGED, LabelPolicyChanges, LoginPolicyChanges, OrgIamPolicyChanges,
        PasswordAgePolicyChanges, PasswordComplexityPolicyChanges, PasswordLockoutPolicyChanges,
        PolicyChange, PolicySettings, REMOVED,
    };

    fn policy_events<P: PolicySettings>(
        policy: P,
        changes: P::Changes,
    ) -> Vec<(EventType, IamEvent)> {
        let mut events = Vec::new();
        for scope in [Scope::Instance, Scope::Org] {
            events.push((
                policy::event_type::<P>(scope, ADDED),
                IamEvent::Policy(P::wrap(PolicyChange::Added(policy.clone()))),
            ));
            events.push((
                policy::event_type::<P>(scope, CHANGED),
                IamEvent::Policy(P::wrap(PolicyChange::Changed(changes.clone()))),
            ));
        }
        events.push((
            policy::event_type::<P>(Scope::Org, REMOVED),
            IamEvent::Policy(P::wrap(PolicyChange::Removed)),
        ));
        events
    }

    fn every_event() -> Vec<(EventType, IamEvent)> {
        let mut events = Vec::new();
        events.extend(policy_events(
            LabelPolicy {
                primary_color: "#5469d4".to_owned(),
                background_color: "#fafafa".to_owned(),
                warn_color: "#cd3d56".to_owned(),
                font_color: "#000000".to_owned(),
                hide_login_name_suffix: true,
                disable_watermark: false,
            },
            LabelPolicyChanges {
                warn_color: Some("#ff0000".to_owned()),
                ..LabelPolicyChanges::default()
            },
        ));
        events.extend(policy_events(
            LoginPolicy {
                allow_username_password: true,
                allow_register: true,
                allow_external_idp: false,
                force_mfa: true,
                hide_password_reset: false,
                ignore_unknown_usernames: true,
                default_redirect_uri: "https://example.com/login".to_owned(),
            },
            LoginPolicyChanges {
                force_mfa: Some(false),
                default_redirect_uri: Some(String::new()),
                ..LoginPolicyChanges::default()
            },
        ));
        events.extend(policy_events(
            OrgIamPolicy {
                user_login_must_be_domain: true,
            },
            OrgIamPolicyChanges::default(),
        ));
        events.extend(policy_events(
            PasswordAgePolicy {
                max_age_days: 90,
                expire_warn_days: 7,
            },
            PasswordAgePolicyChanges {
                expire_warn_days: Some(0),
                ..PasswordAgePolicyChanges::default()
            },
        ));
        events.extend(policy_events(
            PasswordComplexityPolicy {
                min_length: 12,
                has_uppercase: true,
                has_lowercase: true,
                has_number: true,
                has_symbol: false,
            },
            PasswordComplexityPolicyChanges {
                has_symbol: Some(true),
                ..PasswordComplexityPolicyChanges::default()
            },
        ));
        events.extend(policy_events(
            PasswordLockoutPolicy {
                max_password_attempts: 5,
                show_lockout_failures: true,
            },
            PasswordLockoutPolicyChanges {
                max_password_attempts: Some(3),
                show_lockout_failures: Some(false),
            },
        ));

        let domain = || "a.com".to_owned();
        events.extend([
            (
                EventType::from(ORG_DOMAIN_ADDED_EVENT_TYPE),
                IamEvent::OrgDomain(OrgDomainEvent::Added(OrgDomainAdded { domain: domain() })),
            ),
            (
                EventType::from(ORG_DOMAIN_VERIFIED_EVENT_TYPE),
                IamEvent::OrgDomain(OrgDomainEvent::Verified(OrgDomainVerified {
                    domain: domain(),
                })),
            ),
            (
                EventType::from(ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE),
                IamEvent::OrgDomain(OrgDomainEvent::PrimarySet(OrgDomainPrimarySet {
                    domain: domain(),
                })),
            ),
            (
                EventType::from(ORG_DOMAIN_REMOVED_EVENT_TYPE),
                IamEvent::OrgDomain(OrgDomainEvent::Removed(OrgDomainRemoved { domain: domain() })),
            ),
        ]);

        for scope in [Scope::Instance, Scope::Org] {
            events.extend([
                (
                    member::added_event_type(scope),
                    IamEvent::Member(MemberEvent::Added(MemberAdded {
                        user_id: "user-1".to_owned(),
                        roles: vec!["OWNER".to_owned(), "VIEWER".to_owned()],
                    })),
                ),
                (
                    member::changed_event_type(scope),
                    IamEvent::Member(MemberEvent::Changed(MemberChanged {
                        user_id: "user-1".to_owned(),
                        roles: Vec::new(),
                    })),
                ),
                (
                    member::removed_event_type(scope),
                    IamEvent::Member(MemberEvent::Removed(MemberRemoved {
                        user_id: "user-1".to_owned(),
                    })),
                ),
            ]);
        }

        let idp = || "idp-1".to_owned();
        events.extend([
            (
                EventType::from(IDP_CONFIG_ADDED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Added(IdpConfigAdded {
                    idp_config_id: idp(),
                    name: "Google".to_owned(),
                    auto_register: true,
                })),
            ),
            (
                EventType::from(IDP_CONFIG_CHANGED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Changed(IdpConfigChanged {
                    idp_config_id: idp(),
                    name: Some("Workspace".to_owned()),
                    auto_register: None,
                })),
            ),
            (
                EventType::from(IDP_CONFIG_CHANGED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Changed(IdpConfigChanged {
                    idp_config_id: idp(),
                    name: None,
                    auto_register: None,
                })),
            ),
            (
                EventType::from(IDP_CONFIG_DEACTIVATED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Deactivated(IdpConfigDeactivated {
                    idp_config_id: idp(),
                })),
            ),
            (
                EventType::from(IDP_CONFIG_REACTIVATED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Reactivated(IdpConfigReactivated {
                    idp_config_id: idp(),
                })),
            ),
            (
                EventType::from(IDP_CONFIG_REMOVED_EVENT_TYPE),
                IamEvent::IdpConfig(IdpConfigEvent::Removed(IdpConfigRemoved {
                    idp_config_id: idp(),
                    name: "Workspace".to_owned(),
                })),
            ),
        ]);
        events
    }

    #[test]
    fn test_every_event_survives_push_and_filter_mapping() {
        // Arrange
        let registry = event_registry().unwrap();
        let events = every_event();

        // Act
        let decoded: Vec<IamEvent> = (1..)
            .zip(&events)
            .map(|(sequence, (event_type, event))| {
                let payload = registry.push_payload(event_type, event).unwrap();
                let stored = stored_event(
                    ORG_AGGREGATE_TYPE,
                    "org-1",
                    "org-1",
                    event_type.as_str(),
                    sequence,
                    payload,
                );
                registry.map_event(stored).unwrap().kind
            })
            .collect();

        // Assert
        for ((event_type, event), decoded) in events.iter().zip(&decoded) {
            assert_eq!(decoded, event, "{event_type} did not survive mapping");
        }
        let distinct: BTreeSet<&EventType> = events.iter().map(|(t, _)| t).collect();
        assert_eq!(distinct.len(), 45);
    }

    #[test]
    fn test_registry_covers_every_scope() {
        let registry = event_registry().unwrap();

        for event_type in [
            "instance.policy.label.added",
            "org.policy.password.complexity.removed",
            "org.domain.primary.set",
            "instance.member.changed",
            "org.member.removed",
            "org.idp.config.reactivated",
        ] {
            assert!(
                registry.has_filter_mapper(&EventType::from(event_type)),
                "missing mapper for {event_type}"
            );
        }
        assert!(!registry.has_filter_mapper(&EventType::from("instance.policy.label.removed")));
    }

    #[test]
    fn test_scope_prefixes_event_types() {
        assert_eq!(
            Scope::Instance.event_type("member.added").as_str(),
            "instance.member.added"
        );
        assert_eq!(Scope::Org.aggregate_type(), "org");
    }
}
