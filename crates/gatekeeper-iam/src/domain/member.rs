//! Members: users granted roles on an instance or an org.

use serde::{Deserialize, Serialize};

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::{EventType, TypedEvent};
use gatekeeper_core::model::{QueryReducer, Reducer, WriteModel};
use gatekeeper_core::registry::EventRegistryBuilder;
use gatekeeper_core::search_query::SearchQueryBuilder;
use gatekeeper_core::unique_constraint::UniqueConstraint;

use crate::domain::events::{IamEvent, Scope};

/// Unique constraint type preventing a user from being added twice.
pub const MEMBER_UNIQUE_TYPE: &str = "member";

/// Payload of `{scope}.member.added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAdded {
    /// The member's user.
    pub user_id: String,
    /// Granted roles.
    pub roles: Vec<String>,
}

/// Payload of `{scope}.member.changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberChanged {
    /// The member's user.
    pub user_id: String,
    /// The complete new set of roles.
    pub roles: Vec<String>,
}

/// Payload of `{scope}.member.removed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemoved {
    /// The former member's user.
    pub user_id: String,
}

/// Membership events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    /// A user became a member.
    Added(MemberAdded),
    /// A member's roles changed.
    Changed(MemberChanged),
    /// A member was removed.
    Removed(MemberRemoved),
}

impl MemberEvent {
    /// The user the event is about.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Added(e) => &e.user_id,
            Self::Changed(e) => &e.user_id,
            Self::Removed(e) => &e.user_id,
        }
    }
}

/// `{scope}.member.added`
#[must_use]
pub fn added_event_type(scope: Scope) -> EventType {
    scope.event_type("member.added")
}

/// `{scope}.member.changed`
#[must_use]
pub fn changed_event_type(scope: Scope) -> EventType {
    scope.event_type("member.changed")
}

/// `{scope}.member.removed`
#[must_use]
pub fn removed_event_type(scope: Scope) -> EventType {
    scope.event_type("member.removed")
}

fn unique_field(aggregate_id: &str, user_id: &str) -> String {
    format!("{aggregate_id}:{user_id}")
}

/// Claims the membership of `user_id` on `aggregate_id`.
#[must_use]
pub fn add_member_constraint(aggregate_id: &str, user_id: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        MEMBER_UNIQUE_TYPE,
        unique_field(aggregate_id, user_id),
        format!("user {user_id} is already a member"),
    )
}

/// Releases the membership of `user_id` on `aggregate_id`.
#[must_use]
pub fn remove_member_constraint(aggregate_id: &str, user_id: &str) -> UniqueConstraint {
    UniqueConstraint::remove(MEMBER_UNIQUE_TYPE, unique_field(aggregate_id, user_id))
}

/// Registers the member mappers at both scopes.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if an event type is empty.
pub fn register(
    mut builder: EventRegistryBuilder<IamEvent>,
) -> Result<EventRegistryBuilder<IamEvent>, EventstoreError> {
    for scope in [Scope::Instance, Scope::Org] {
        builder = builder
            .register_json(
                added_event_type(scope),
                |p| IamEvent::Member(MemberEvent::Added(p)),
                |e| match e {
                    IamEvent::Member(MemberEvent::Added(p)) => Some(p),
                    _ => None,
                },
            )?
            .register_json(
                changed_event_type(scope),
                |p| IamEvent::Member(MemberEvent::Changed(p)),
                |e| match e {
                    IamEvent::Member(MemberEvent::Changed(p)) => Some(p),
                    _ => None,
                },
            )?
            .register_json(
                removed_event_type(scope),
                |p| IamEvent::Member(MemberEvent::Removed(p)),
                |e| match e {
                    IamEvent::Member(MemberEvent::Removed(p)) => Some(p),
                    _ => None,
                },
            )?;
    }
    Ok(builder)
}

/// State of one membership.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberWriteModel {
    /// Stream bookkeeping of the instance or org.
    pub base: WriteModel<IamEvent>,
    /// Level of the membership.
    pub scope: Scope,
    /// The member's user.
    pub user_id: String,
    /// Current roles, `None` while the user is not a member.
    pub roles: Option<Vec<String>>,
}

impl MemberWriteModel {
    /// Creates an empty model for `user_id` on `aggregate_id`.
    #[must_use]
    pub fn new(scope: Scope, aggregate_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base: WriteModel::new(aggregate_id, ""),
            scope,
            user_id: user_id.into(),
            roles: None,
        }
    }

    /// Returns `true` while the user is a member.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.roles.is_some()
    }

    /// Membership events of this user at this model's scope.
    fn recognizes(&self, event: &TypedEvent<IamEvent>) -> bool {
        let IamEvent::Member(member) = &event.kind else {
            return false;
        };
        let event_type = event.event_type();
        member.user_id() == self.user_id
            && (*event_type == added_event_type(self.scope)
                || *event_type == changed_event_type(self.scope)
                || *event_type == removed_event_type(self.scope))
    }
}

impl Reducer<IamEvent> for MemberWriteModel {
    fn append_events(&mut self, events: Vec<TypedEvent<IamEvent>>) {
        let events = events
            .into_iter()
            .filter(|event| self.recognizes(event))
            .collect();
        self.base.append_events(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        for event in self.base.events() {
            match &event.kind {
                IamEvent::Member(MemberEvent::Added(e)) => self.roles = Some(e.roles.clone()),
                IamEvent::Member(MemberEvent::Changed(e)) => self.roles = Some(e.roles.clone()),
                IamEvent::Member(MemberEvent::Removed(_)) => self.roles = None,
                IamEvent::Policy(_) | IamEvent::OrgDomain(_) | IamEvent::IdpConfig(_) => {}
            }
        }
        self.base.reduce()
    }
}

impl QueryReducer<IamEvent> for MemberWriteModel {
    fn query(&self) -> SearchQueryBuilder {
        let user_id = self.user_id.clone();
        self.base.query_with(self.scope.aggregate_type(), |q| {
            q.event_types([
                added_event_type(self.scope),
                changed_event_type(self.scope),
                removed_event_type(self.scope),
            ])
            .event_data(serde_json::json!({ "userId": user_id }))
        })
    }

    fn processed_sequence(&self) -> u64 {
        self.base.processed_sequence
    }
}

#[cfg(test)]
mod tests {
    use gatekeeper_core::search_query::{Field, FilterValue, Operation};
    use gatekeeper_test_support::stored_event;
    use serde_json::json;

    use super::*;
    use crate::domain::events::event_registry;

    fn typed(event_type: &EventType, sequence: u64, payload: serde_json::Value) -> TypedEvent<IamEvent> {
        event_registry()
            .unwrap()
            .map_event(stored_event(
                "instance",
                "inst-1",
                "inst-1",
                event_type.as_str(),
                sequence,
                Some(payload),
            ))
            .unwrap()
    }

    #[test]
    fn test_fold_added_changed_removed() {
        // Arrange
        let mut model = MemberWriteModel::new(Scope::Instance, "inst-1", "user-1");
        model.append_events(vec![
            typed(&added_event_type(Scope::Instance), 1, json!({"userId": "user-1", "roles": ["IAM_OWNER"]})),
            typed(&changed_event_type(Scope::Instance), 2, json!({"userId": "user-1", "roles": ["IAM_VIEWER"]})),
        ]);

        // Act
        model.reduce().unwrap();

        // Assert
        assert_eq!(model.roles, Some(vec!["IAM_VIEWER".to_owned()]));

        model.append_events(vec![typed(&removed_event_type(Scope::Instance), 3, json!({"userId": "user-1"}))]);
        model.reduce().unwrap();
        assert!(!model.exists());
        assert_eq!(model.base.processed_sequence, 3);
    }

    #[test]
    fn test_events_of_other_users_are_ignored() {
        let mut model = MemberWriteModel::new(Scope::Instance, "inst-1", "user-1");
        model.append_events(vec![typed(
            &added_event_type(Scope::Instance),
            1,
            json!({"userId": "user-2", "roles": ["IAM_OWNER"]}),
        )]);

        model.reduce().unwrap();

        assert!(!model.exists());
        assert_eq!(model.base.processed_sequence, 0);
    }

    #[test]
    fn test_members_of_the_other_scope_are_not_buffered() {
        // Arrange
        let mut model = MemberWriteModel::new(Scope::Org, "inst-1", "user-1");

        // Act
        model.append_events(vec![typed(
            &added_event_type(Scope::Instance),
            7,
            json!({"userId": "user-1", "roles": ["IAM_OWNER"]}),
        )]);

        // Assert
        assert!(model.base.events().is_empty());
        model.reduce().unwrap();
        assert!(!model.exists());
        assert!(model.base.change_date.is_none());
    }

    #[test]
    fn test_query_narrows_by_user_id() {
        let model = MemberWriteModel::new(Scope::Org, "org-1", "user-1");

        let query = model.query().build().unwrap();

        assert!(query.filters[0].contains(&gatekeeper_core::search_query::Filter::new(
            Field::EventData,
            FilterValue::Json(json!({"userId": "user-1"})),
            Operation::JsonContains,
        )));
    }

    #[test]
    fn test_constraint_is_scoped_to_aggregate() {
        let constraint = add_member_constraint("org-1", "user-1");

        assert_eq!(constraint.unique_field, "org-1:user-1");
        assert_eq!(remove_member_constraint("org-1", "user-1").unique_field, "org-1:user-1");
    }
}
