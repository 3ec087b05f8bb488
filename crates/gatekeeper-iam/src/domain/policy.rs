//! Policies: one generic reduction for every kind of policy.
//!
//! A policy kind is a settings struct implementing [`PolicySettings`]. All
//! kinds share the same lifecycle ([`PolicyChange`]), the same event type
//! layout (`{scope}.policy.{kind}.{added|changed|removed}`) and the same
//! write and read models. Instance-scope policies are the defaults an
//! organization inherits until it defines its own; only org-scope policies
//! can be removed.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::{EventType, TypedEvent};
use gatekeeper_core::model::{QueryReducer, ReadModel, Reducer, WriteModel};
use gatekeeper_core::registry::EventRegistryBuilder;
use gatekeeper_core::search_query::{Columns, SearchQueryBuilder};

use crate::domain::events::{IamEvent, Scope};

/// Event type suffix of a newly defined policy.
pub const ADDED: &str = "added";
/// Event type suffix of a policy update.
pub const CHANGED: &str = "changed";
/// Event type suffix of a removed org policy.
pub const REMOVED: &str = "removed";

/// Settings of one policy kind.
pub trait PolicySettings:
    Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Partial update; `None` fields are left untouched.
    type Changes: Debug
        + Clone
        + Default
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Kind segment of the event type, e.g. `password.complexity`.
    const KIND: &'static str;

    /// Lifts a change into the policy event union.
    fn wrap(change: PolicyChange<Self>) -> PolicyEvent;

    /// Picks this kind's change out of the union.
    fn unwrap(event: &PolicyEvent) -> Option<&PolicyChange<Self>>;

    /// Applies a partial update.
    fn apply(&mut self, changes: &Self::Changes);

    /// The update turning `self` into `target`, `None` if they are equal.
    fn diff(&self, target: &Self) -> Option<Self::Changes>;
}

/// Lifecycle of a policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyChange<T: PolicySettings> {
    /// The policy was defined.
    Added(T),
    /// Some settings changed.
    Changed(T::Changes),
    /// The policy was removed; the org falls back to the instance default.
    Removed,
}

/// The event type of `action` for policy kind `P` at `scope`.
#[must_use]
pub fn event_type<P: PolicySettings>(scope: Scope, action: &str) -> EventType {
    scope.event_type(&format!("policy.{}.{action}", P::KIND))
}

fn event_types<P: PolicySettings>(scope: Scope) -> Vec<EventType> {
    let mut types = vec![event_type::<P>(scope, ADDED), event_type::<P>(scope, CHANGED)];
    if scope == Scope::Org {
        types.push(event_type::<P>(scope, REMOVED));
    }
    types
}

macro_rules! policy_settings {
    (
        $(#[$meta:meta])*
        $name:ident / $changes:ident => $variant:ident, $kind:literal {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: $ty, )+
        }

        #[doc = concat!("Partial update of a [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $changes {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )+
        }

        impl PolicySettings for $name {
            type Changes = $changes;

            const KIND: &'static str = $kind;

            fn wrap(change: PolicyChange<Self>) -> PolicyEvent {
                PolicyEvent::$variant(change)
            }

            fn unwrap(event: &PolicyEvent) -> Option<&PolicyChange<Self>> {
                match event {
                    PolicyEvent::$variant(change) => Some(change),
                    _ => None,
                }
            }

            fn apply(&mut self, changes: &Self::Changes) {
                $(
                    if let Some(value) = &changes.$field {
                        self.$field = value.clone();
                    }
                )+
            }

            fn diff(&self, target: &Self) -> Option<Self::Changes> {
                let changes = $changes {
                    $( $field: (self.$field != target.$field).then(|| target.$field.clone()), )+
                };
                (changes != $changes::default()).then_some(changes)
            }
        }
    };
}

policy_settings! {
    /// Branding of the login and self-service pages.
    LabelPolicy / LabelPolicyChanges => Label, "label" {
        /// Primary color as a CSS hex value.
        primary_color: String,
        /// Background color as a CSS hex value.
        background_color: String,
        /// Warning color as a CSS hex value.
        warn_color: String,
        /// Font color as a CSS hex value.
        font_color: String,
        /// Hides the `@domain` suffix of login names.
        hide_login_name_suffix: bool,
        /// Hides the "powered by" watermark.
        disable_watermark: bool,
    }
}

policy_settings! {
    /// Which login methods are offered.
    LoginPolicy / LoginPolicyChanges => Login, "login" {
        /// Users may log in with username and password.
        allow_username_password: bool,
        /// Users may register themselves.
        allow_register: bool,
        /// Users may log in through external identity providers.
        allow_external_idp: bool,
        /// A second factor is required.
        force_mfa: bool,
        /// The password reset link is hidden.
        hide_password_reset: bool,
        /// Unknown usernames are not revealed as such.
        ignore_unknown_usernames: bool,
        /// Where to redirect when no application context exists.
        default_redirect_uri: String,
    }
}

policy_settings! {
    /// Organization-level login name rules.
    OrgIamPolicy / OrgIamPolicyChanges => OrgIam, "org.iam" {
        /// Login names must end with a verified org domain.
        user_login_must_be_domain: bool,
    }
}

policy_settings! {
    /// Password expiry.
    PasswordAgePolicy / PasswordAgePolicyChanges => PasswordAge, "password.age" {
        /// Days until a password expires, `0` for never.
        max_age_days: u64,
        /// Days before expiry the user is warned.
        expire_warn_days: u64,
    }
}

policy_settings! {
    /// Password strength requirements.
    PasswordComplexityPolicy / PasswordComplexityPolicyChanges => PasswordComplexity, "password.complexity" {
        /// Minimum number of characters.
        min_length: u64,
        /// Requires an uppercase letter.
        has_uppercase: bool,
        /// Requires a lowercase letter.
        has_lowercase: bool,
        /// Requires a digit.
        has_number: bool,
        /// Requires a symbol.
        has_symbol: bool,
    }
}

policy_settings! {
    /// Account lockout after failed attempts.
    PasswordLockoutPolicy / PasswordLockoutPolicyChanges => PasswordLockout, "password.lockout" {
        /// Failed password attempts before the account locks, `0` for never.
        max_password_attempts: u64,
        /// Tells the user how many attempts remain.
        show_lockout_failures: bool,
    }
}

/// Union over the policy kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyEvent {
    /// [`LabelPolicy`] lifecycle.
    Label(PolicyChange<LabelPolicy>),
    /// [`LoginPolicy`] lifecycle.
    Login(PolicyChange<LoginPolicy>),
    /// [`OrgIamPolicy`] lifecycle.
    OrgIam(PolicyChange<OrgIamPolicy>),
    /// [`PasswordAgePolicy`] lifecycle.
    PasswordAge(PolicyChange<PasswordAgePolicy>),
    /// [`PasswordComplexityPolicy`] lifecycle.
    PasswordComplexity(PolicyChange<PasswordComplexityPolicy>),
    /// [`PasswordLockoutPolicy`] lifecycle.
    PasswordLockout(PolicyChange<PasswordLockoutPolicy>),
}

fn added<P: PolicySettings>(event: &IamEvent) -> Option<&P> {
    match change::<P>(event) {
        Some(PolicyChange::Added(policy)) => Some(policy),
        _ => None,
    }
}

fn changed<P: PolicySettings>(event: &IamEvent) -> Option<&P::Changes> {
    match change::<P>(event) {
        Some(PolicyChange::Changed(changes)) => Some(changes),
        _ => None,
    }
}

fn removed<P: PolicySettings>(event: &IamEvent) -> Option<&()> {
    match change::<P>(event) {
        Some(PolicyChange::Removed) => Some(&()),
        _ => None,
    }
}

fn change<P: PolicySettings>(event: &IamEvent) -> Option<&PolicyChange<P>> {
    match event {
        IamEvent::Policy(policy) => P::unwrap(policy),
        IamEvent::OrgDomain(_) | IamEvent::Member(_) | IamEvent::IdpConfig(_) => None,
    }
}

/// Registers the mappers of policy kind `P` at both scopes.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if an event type is empty.
pub fn register<P: PolicySettings>(
    mut builder: EventRegistryBuilder<IamEvent>,
) -> Result<EventRegistryBuilder<IamEvent>, EventstoreError> {
    for scope in [Scope::Instance, Scope::Org] {
        builder = builder
            .register_json::<P>(
                event_type::<P>(scope, ADDED),
                |policy| IamEvent::Policy(P::wrap(PolicyChange::Added(policy))),
                added::<P>,
            )?
            .register_json::<P::Changes>(
                event_type::<P>(scope, CHANGED),
                |changes| IamEvent::Policy(P::wrap(PolicyChange::Changed(changes))),
                changed::<P>,
            )?;
    }
    builder.register_json::<()>(
        event_type::<P>(Scope::Org, REMOVED),
        |()| IamEvent::Policy(P::wrap(PolicyChange::Removed)),
        removed::<P>,
    )
}

/// Returns `true` for events of kind `P` at `scope`.
fn recognizes<P: PolicySettings>(scope: Scope, event: &TypedEvent<IamEvent>) -> bool {
    change::<P>(&event.kind).is_some() && event_types::<P>(scope).contains(event.event_type())
}

/// Folds policy events of kind `P` into `policy`.
fn fold<P: PolicySettings>(
    policy: &mut Option<P>,
    events: &[TypedEvent<IamEvent>],
) -> Result<(), EventstoreError> {
    for event in events {
        let Some(change) = change::<P>(&event.kind) else {
            continue;
        };
        match change {
            PolicyChange::Added(added) => *policy = Some(added.clone()),
            PolicyChange::Changed(changes) => match policy {
                Some(current) => current.apply(changes),
                None => {
                    return Err(EventstoreError::Internal(format!(
                        "{} policy changed before it was added (sequence {})",
                        P::KIND,
                        event.sequence()
                    )));
                }
            },
            PolicyChange::Removed => *policy = None,
        }
    }
    Ok(())
}

/// State of one policy used to decide commands.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyWriteModel<P: PolicySettings> {
    /// Stream bookkeeping.
    pub base: WriteModel<IamEvent>,
    /// Level the policy is defined at.
    pub scope: Scope,
    /// Current settings, `None` if undefined or removed.
    pub policy: Option<P>,
}

impl<P: PolicySettings> PolicyWriteModel<P> {
    /// Creates an empty model for the instance or org `aggregate_id`.
    #[must_use]
    pub fn new(scope: Scope, aggregate_id: impl Into<String>) -> Self {
        Self {
            base: WriteModel::new(aggregate_id, ""),
            scope,
            policy: None,
        }
    }
}

impl<P: PolicySettings> Reducer<IamEvent> for PolicyWriteModel<P> {
    fn append_events(&mut self, events: Vec<TypedEvent<IamEvent>>) {
        let scope = self.scope;
        self.base
            .append_events(events.into_iter().filter(|e| recognizes::<P>(scope, e)).collect());
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        fold(&mut self.policy, self.base.events())?;
        self.base.reduce()
    }
}

impl<P: PolicySettings> QueryReducer<IamEvent> for PolicyWriteModel<P> {
    fn query(&self) -> SearchQueryBuilder {
        let types = event_types::<P>(self.scope);
        self.base
            .query_with(self.scope.aggregate_type(), |q| q.event_types(types))
    }

    fn processed_sequence(&self) -> u64 {
        self.base.processed_sequence
    }
}

/// Projection of one policy served to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyReadModel<P: PolicySettings> {
    /// Stream bookkeeping.
    pub base: ReadModel<IamEvent>,
    /// Level the policy is defined at.
    pub scope: Scope,
    /// Current settings, `None` if undefined or removed.
    pub policy: Option<P>,
}

impl<P: PolicySettings> PolicyReadModel<P> {
    /// Creates an empty read model for the instance or org `aggregate_id`.
    #[must_use]
    pub fn new(scope: Scope, aggregate_id: impl Into<String>) -> Self {
        Self {
            base: ReadModel::new(aggregate_id),
            scope,
            policy: None,
        }
    }

    /// Creation date of the event that last added the policy.
    #[must_use]
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.base.creation_date
    }
}

impl<P: PolicySettings> Reducer<IamEvent> for PolicyReadModel<P> {
    fn append_events(&mut self, events: Vec<TypedEvent<IamEvent>>) {
        let scope = self.scope;
        self.base
            .append_events(events.into_iter().filter(|e| recognizes::<P>(scope, e)).collect());
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let last_added = self
            .base
            .events()
            .iter()
            .rev()
            .find(|e| added::<P>(&e.kind).is_some())
            .map(TypedEvent::creation_date);
        fold(&mut self.policy, self.base.events())?;
        self.base.reduce()?;
        if last_added.is_some() {
            self.base.creation_date = last_added;
        }
        Ok(())
    }
}

impl<P: PolicySettings> QueryReducer<IamEvent> for PolicyReadModel<P> {
    fn query(&self) -> SearchQueryBuilder {
        let aggregate_type = self.scope.aggregate_type();
        let aggregate_id = self.base.aggregate_id.clone();
        let processed = self.base.processed_sequence;
        let types = event_types::<P>(self.scope);
        SearchQueryBuilder::new(Columns::Event).add_query(move |q| {
            q.aggregate_types([aggregate_type])
                .aggregate_ids([aggregate_id])
                .event_types(types)
                .sequence_greater(processed)
        })
    }

    fn processed_sequence(&self) -> u64 {
        self.base.processed_sequence
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_core::search_query::{Field, Filter, FilterValue, Operation};
    use gatekeeper_test_support::{fixed_time, stored_event};
    use serde_json::json;

    use super::*;
    use crate::domain::events::event_registry;
    use crate::domain::org_domain::ORG_DOMAIN_ADDED_EVENT_TYPE;

    fn typed(
        scope: Scope,
        action: &str,
        sequence: u64,
        payload: Option<serde_json::Value>,
    ) -> TypedEvent<IamEvent> {
        let event_type = event_type::<PasswordComplexityPolicy>(scope, action);
        event_registry()
            .unwrap()
            .map_event(stored_event(
                scope.aggregate_type(),
                "org-1",
                "org-1",
                event_type.as_str(),
                sequence,
                payload,
            ))
            .unwrap()
    }

    #[test]
    fn test_event_type_layout() {
        assert_eq!(
            event_type::<PasswordComplexityPolicy>(Scope::Instance, ADDED).as_str(),
            "instance.policy.password.complexity.added"
        );
        assert_eq!(
            event_type::<OrgIamPolicy>(Scope::Org, REMOVED).as_str(),
            "org.policy.org.iam.removed"
        );
        assert_eq!(event_types::<LabelPolicy>(Scope::Instance).len(), 2);
        assert_eq!(event_types::<LabelPolicy>(Scope::Org).len(), 3);
    }

    #[test]
    fn test_diff_only_contains_changed_fields() {
        let current = PasswordComplexityPolicy {
            min_length: 8,
            has_uppercase: true,
            ..PasswordComplexityPolicy::default()
        };
        let target = PasswordComplexityPolicy {
            min_length: 12,
            ..current.clone()
        };

        let changes = current.diff(&target).unwrap();

        assert_eq!(
            changes,
            PasswordComplexityPolicyChanges {
                min_length: Some(12),
                ..PasswordComplexityPolicyChanges::default()
            }
        );
        assert!(current.diff(&current).is_none());
    }

    #[test]
    fn test_changes_serialize_sparsely() {
        let changes = PasswordComplexityPolicyChanges {
            has_symbol: Some(true),
            ..PasswordComplexityPolicyChanges::default()
        };

        assert_eq!(serde_json::to_value(&changes).unwrap(), json!({"hasSymbol": true}));
    }

    #[test]
    fn test_write_model_folds_lifecycle() {
        // Arrange
        let mut model = PolicyWriteModel::<PasswordComplexityPolicy>::new(Scope::Org, "org-1");
        model.append_events(vec![
            typed(Scope::Org, ADDED, 1, Some(json!({
                "minLength": 8,
                "hasUppercase": true,
                "hasLowercase": true,
                "hasNumber": false,
                "hasSymbol": false
            }))),
            typed(Scope::Org, CHANGED, 2, Some(json!({"hasNumber": true}))),
        ]);

        // Act
        model.reduce().unwrap();

        // Assert
        assert_eq!(
            model.policy,
            Some(PasswordComplexityPolicy {
                min_length: 8,
                has_uppercase: true,
                has_lowercase: true,
                has_number: true,
                has_symbol: false,
            })
        );
        assert_eq!(model.base.processed_sequence, 2);

        model.append_events(vec![typed(Scope::Org, REMOVED, 3, None)]);
        model.reduce().unwrap();
        assert!(model.policy.is_none());
    }

    #[test]
    fn test_changed_before_added_is_internal_error() {
        let mut model = PolicyWriteModel::<PasswordComplexityPolicy>::new(Scope::Instance, "inst");
        model.append_events(vec![typed(Scope::Instance, CHANGED, 1, Some(json!({"minLength": 4})))]);

        let result = model.reduce();

        match result {
            Err(EventstoreError::Internal(message)) => {
                assert!(message.contains("password.complexity"));
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[test]
    fn test_models_query_only_their_kind() {
        let write = PolicyWriteModel::<LoginPolicy>::new(Scope::Org, "org-1");
        let read = PolicyReadModel::<LoginPolicy>::new(Scope::Org, "org-1");

        let write_query = write.query().build().unwrap();
        let read_query = read.query().build().unwrap();

        let event_type_filter = Filter::new(
            Field::EventType,
            FilterValue::TextList(
                event_types::<LoginPolicy>(Scope::Org)
                    .iter()
                    .map(|t| t.as_str().to_owned())
                    .collect(),
            ),
            Operation::In,
        );
        assert!(write_query.filters[0].contains(&event_type_filter));
        assert!(read_query.filters[0].contains(&event_type_filter));
    }

    #[test]
    fn test_unrecognized_event_leaves_write_model_untouched() {
        // Arrange
        let mut model = PolicyWriteModel::<PasswordComplexityPolicy>::new(Scope::Org, "org-1");
        let foreign = |event_type: &str, sequence, payload| {
            event_registry()
                .unwrap()
                .map_event(stored_event("org", "org-1", "org-1", event_type, sequence, Some(payload)))
                .unwrap()
        };

        // Act
        model.append_events(vec![
            foreign(ORG_DOMAIN_ADDED_EVENT_TYPE, 5, json!({"domain": "a.com"})),
            foreign(
                event_type::<LoginPolicy>(Scope::Org, CHANGED).as_str(),
                6,
                json!({"forceMfa": true}),
            ),
            typed(Scope::Instance, CHANGED, 7, Some(json!({"hasSymbol": true}))),
        ]);

        // Assert
        assert!(model.base.events().is_empty());
        model.reduce().unwrap();
        assert_eq!(model.base.processed_sequence, 0);
        assert!(model.base.change_date.is_none());
        assert!(model.policy.is_none());
    }

    #[test]
    fn test_read_model_creation_date_follows_latest_add() {
        // Arrange
        let complexity = json!({
            "minLength": 8,
            "hasUppercase": false,
            "hasLowercase": false,
            "hasNumber": false,
            "hasSymbol": false
        });
        let mut model = PolicyReadModel::<PasswordComplexityPolicy>::new(Scope::Org, "org-1");
        model.append_events(vec![
            typed(Scope::Org, ADDED, 1, Some(complexity.clone())),
            typed(Scope::Org, REMOVED, 2, None),
        ]);
        model.reduce().unwrap();
        let first_added = model.creation_date();

        // Act
        model.append_events(vec![
            typed(Scope::Org, ADDED, 3, Some(complexity)),
            typed(Scope::Org, CHANGED, 4, Some(json!({"hasNumber": true}))),
        ]);
        model.reduce().unwrap();

        // Assert
        let readded = fixed_time() + chrono::Duration::seconds(3);
        assert_ne!(model.creation_date(), first_added);
        assert_eq!(model.creation_date(), Some(readded));
        assert_eq!(model.base.processed_sequence, 4);
        assert!(model.policy.is_some_and(|p| p.has_number));
    }
}
