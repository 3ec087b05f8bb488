//! Query handlers for the IAM context.
//!
//! Each handler folds the relevant events into a model and returns a
//! read-only view. Absence is reported as `EventstoreError::NotFound`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::eventstore::Eventstore;
use gatekeeper_core::search_query::{Columns, SearchQueryBuilder};

use crate::domain::events::{IamEvent, ORG_AGGREGATE_TYPE, Scope};
use crate::domain::idp_config::{IdpConfigState, IdpConfigWriteModel};
use crate::domain::member::MemberWriteModel;
use crate::domain::org_domain::{
    ORG_DOMAIN_ADDED_EVENT_TYPE, ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE, ORG_DOMAIN_REMOVED_EVENT_TYPE,
    ORG_DOMAIN_VERIFIED_EVENT_TYPE, OrgDomainEvent, OrgDomainWriteModel,
};
use crate::domain::policy::{PolicyReadModel, PolicySettings};

/// Read-only view of a policy.
#[derive(Debug, Serialize)]
pub struct PolicyView<P> {
    /// The instance or org the policy was read from.
    pub aggregate_id: String,
    /// The settings.
    pub policy: P,
    /// `true` if an org inherits the instance default.
    pub is_default: bool,
    /// Sequence of the last policy event.
    pub sequence: u64,
    /// When the policy was first defined.
    pub creation_date: Option<DateTime<Utc>>,
    /// When the policy last changed.
    pub change_date: Option<DateTime<Utc>>,
}

async fn load_policy<P: PolicySettings>(
    scope: Scope,
    aggregate_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<Option<PolicyView<P>>, EventstoreError> {
    let mut model = PolicyReadModel::<P>::new(scope, aggregate_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    let creation_date = model.creation_date();
    Ok(model.policy.map(|policy| PolicyView {
        aggregate_id: aggregate_id.to_owned(),
        policy,
        is_default: scope == Scope::Instance,
        sequence: model.base.processed_sequence,
        creation_date,
        change_date: model.base.change_date,
    }))
}

/// Retrieves the policy of kind `P` defined at `scope` on `aggregate_id`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if no such policy is defined, and any
/// eventstore error.
pub async fn get_policy<P: PolicySettings>(
    scope: Scope,
    aggregate_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<PolicyView<P>, EventstoreError> {
    load_policy(scope, aggregate_id, eventstore)
        .await?
        .ok_or_else(|| EventstoreError::NotFound(format!("{} policy of {aggregate_id}", P::KIND)))
}

/// Retrieves the policy of kind `P` that applies to org `org_id`: its own
/// if defined, the instance default otherwise.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if neither the org nor the instance
/// defines the policy, and any eventstore error.
pub async fn effective_policy<P: PolicySettings>(
    instance_id: &str,
    org_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<PolicyView<P>, EventstoreError> {
    if let Some(view) = load_policy(Scope::Org, org_id, eventstore).await? {
        return Ok(view);
    }
    get_policy(Scope::Instance, instance_id, eventstore).await
}

/// Read-only view of an org domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgDomainView {
    /// The owning org.
    pub org_id: String,
    /// The domain name.
    pub domain: String,
    /// Ownership has been proven.
    pub verified: bool,
    /// The domain is the org's primary domain.
    pub primary: bool,
}

/// Retrieves one domain of an org.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the domain is not added, and any
/// eventstore error.
pub async fn get_org_domain(
    org_id: &str,
    domain: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<OrgDomainView, EventstoreError> {
    let mut model = OrgDomainWriteModel::new(org_id, domain);
    eventstore.filter_to_query_reducer(&mut model).await?;
    if !model.exists() {
        return Err(EventstoreError::NotFound(format!(
            "domain {domain} of org {org_id}"
        )));
    }
    Ok(OrgDomainView {
        org_id: org_id.to_owned(),
        domain: model.domain,
        verified: model.verified,
        primary: model.primary,
    })
}

/// Lists the current domains of an org, sorted by name.
///
/// # Errors
///
/// Returns any eventstore error.
pub async fn list_org_domains(
    org_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<Vec<OrgDomainView>, EventstoreError> {
    let query = SearchQueryBuilder::new(Columns::Event).add_query(|q| {
        q.aggregate_types([ORG_AGGREGATE_TYPE])
            .aggregate_ids([org_id])
            .event_types([
                ORG_DOMAIN_ADDED_EVENT_TYPE,
                ORG_DOMAIN_VERIFIED_EVENT_TYPE,
                ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE,
                ORG_DOMAIN_REMOVED_EVENT_TYPE,
            ])
    });

    let mut domains: BTreeMap<String, OrgDomainView> = BTreeMap::new();
    for event in eventstore.filter_events(&query).await? {
        let IamEvent::OrgDomain(event) = event.kind else {
            continue;
        };
        match event {
            OrgDomainEvent::Added(e) => {
                domains.insert(
                    e.domain.clone(),
                    OrgDomainView {
                        org_id: org_id.to_owned(),
                        domain: e.domain,
                        verified: false,
                        primary: false,
                    },
                );
            }
            OrgDomainEvent::Verified(e) => {
                if let Some(view) = domains.get_mut(&e.domain) {
                    view.verified = true;
                }
            }
            OrgDomainEvent::PrimarySet(e) => {
                for view in domains.values_mut() {
                    view.primary = view.domain == e.domain;
                }
            }
            OrgDomainEvent::Removed(e) => {
                domains.remove(&e.domain);
            }
        }
    }
    Ok(domains.into_values().collect())
}

/// Read-only view of a membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    /// The instance or org.
    pub aggregate_id: String,
    /// The member's user.
    pub user_id: String,
    /// Granted roles.
    pub roles: Vec<String>,
    /// When the membership last changed.
    pub change_date: Option<DateTime<Utc>>,
}

/// Retrieves the membership of `user_id` on `aggregate_id`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the user is not a member, and any
/// eventstore error.
pub async fn get_member(
    scope: Scope,
    aggregate_id: &str,
    user_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<MemberView, EventstoreError> {
    let mut model = MemberWriteModel::new(scope, aggregate_id, user_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    let Some(roles) = model.roles else {
        return Err(EventstoreError::NotFound(format!(
            "member {user_id} of {aggregate_id}"
        )));
    };
    Ok(MemberView {
        aggregate_id: aggregate_id.to_owned(),
        user_id: user_id.to_owned(),
        roles,
        change_date: model.base.change_date,
    })
}

/// Read-only view of an identity provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdpConfigView {
    /// The owning org.
    pub org_id: String,
    /// Configuration id.
    pub idp_config_id: String,
    /// Display name.
    pub name: String,
    /// Users are registered on first login.
    pub auto_register: bool,
    /// Active or inactive.
    pub state: IdpConfigState,
    /// When the configuration last changed.
    pub change_date: Option<DateTime<Utc>>,
}

/// Retrieves an identity provider configuration of an org.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if it was never added or is removed,
/// and any eventstore error.
pub async fn get_idp_config(
    org_id: &str,
    idp_config_id: &str,
    eventstore: &Eventstore<IamEvent>,
) -> Result<IdpConfigView, EventstoreError> {
    let mut model = IdpConfigWriteModel::new(org_id, idp_config_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    if !model.exists() {
        return Err(EventstoreError::NotFound(format!(
            "identity provider {idp_config_id}"
        )));
    }
    Ok(IdpConfigView {
        org_id: org_id.to_owned(),
        idp_config_id: model.idp_config_id,
        name: model.name,
        auto_register: model.auto_register,
        state: model.state,
        change_date: model.base.change_date,
    })
}
