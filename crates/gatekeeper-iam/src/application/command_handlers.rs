//! Command handlers for the IAM context.
//!
//! Every handler reads the head of the target stream, loads a write model,
//! decides, stages the resulting events on an [`Aggregate`] and pushes it
//! against that head. Write models only fold the events of their own
//! entity, so their processed sequence can lag behind the stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use gatekeeper_core::aggregate::Aggregate;
use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::EventCommand;
use gatekeeper_core::eventstore::Eventstore;
use gatekeeper_core::model::{Reducer, WriteModel};

use crate::domain::commands::{
    AddIdpConfig, AddMember, AddOrgDomain, AddPolicy, ChangeIdpConfig, ChangeMember, ChangePolicy,
    DeactivateIdpConfig, ReactivateIdpConfig, RemoveIdpConfig, RemoveMember, RemoveOrgDomain,
    RemoveOrgPolicy, SetPrimaryOrgDomain, VerifyOrgDomain,
};
use crate::domain::events::{AGGREGATE_VERSION, IamEvent, ORG_AGGREGATE_TYPE, Scope};
use crate::domain::idp_config::{
    self, IDP_CONFIG_ADDED_EVENT_TYPE, IDP_CONFIG_CHANGED_EVENT_TYPE,
    IDP_CONFIG_DEACTIVATED_EVENT_TYPE, IDP_CONFIG_REACTIVATED_EVENT_TYPE,
    IDP_CONFIG_REMOVED_EVENT_TYPE, IdpConfigAdded, IdpConfigChanged, IdpConfigDeactivated,
    IdpConfigEvent, IdpConfigReactivated, IdpConfigRemoved, IdpConfigState, IdpConfigWriteModel,
};
use crate::domain::member::{
    self, MemberAdded, MemberChanged, MemberEvent, MemberRemoved, MemberWriteModel,
};
use crate::domain::org_domain::{
    self, ORG_DOMAIN_ADDED_EVENT_TYPE, ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE,
    ORG_DOMAIN_REMOVED_EVENT_TYPE, ORG_DOMAIN_VERIFIED_EVENT_TYPE, OrgDomainAdded, OrgDomainEvent,
    OrgDomainPrimarySet, OrgDomainRemoved, OrgDomainVerified, OrgDomainWriteModel,
};
use crate::domain::policy::{
    self, ADDED, CHANGED, PolicyChange, PolicySettings, PolicyWriteModel, REMOVED,
};

/// Outcome of a successfully handled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDetails {
    /// Sequence of the last event of the changed stream.
    pub sequence: u64,
    /// Creation date of that event.
    pub change_date: DateTime<Utc>,
    /// Owner of the changed stream.
    pub resource_owner: String,
}

fn details(base: &WriteModel<IamEvent>) -> Result<ObjectDetails, EventstoreError> {
    let change_date = base.change_date.ok_or_else(|| {
        EventstoreError::Internal(format!("no events folded for {}", base.aggregate_id))
    })?;
    Ok(ObjectDetails {
        sequence: base.processed_sequence,
        change_date,
        resource_owner: base.resource_owner.clone(),
    })
}

fn owner(base: &WriteModel<IamEvent>) -> &str {
    if base.resource_owner.is_empty() {
        &base.aggregate_id
    } else {
        &base.resource_owner
    }
}

fn aggregate(
    base: &WriteModel<IamEvent>,
    aggregate_type: &str,
    expected_sequence: u64,
) -> Aggregate<IamEvent> {
    Aggregate::new(
        base.aggregate_id.clone(),
        aggregate_type,
        owner(base),
        AGGREGATE_VERSION,
        expected_sequence,
    )
}

async fn push<R>(
    eventstore: &Eventstore<IamEvent>,
    model: &mut R,
    aggregate: Aggregate<IamEvent>,
) -> Result<(), EventstoreError>
where
    R: Reducer<IamEvent> + Send,
{
    let events = eventstore.push_aggregates(vec![aggregate]).await?;
    model.append_events(events);
    model.reduce()
}

fn no_changes() -> EventstoreError {
    EventstoreError::InvalidArgument("no changes".to_owned())
}

// --- policies ---

async fn load_policy<P: PolicySettings>(
    eventstore: &Eventstore<IamEvent>,
    scope: Scope,
    aggregate_id: &str,
) -> Result<(PolicyWriteModel<P>, u64), EventstoreError> {
    let head = eventstore.stream_sequence(scope.aggregate_type(), aggregate_id).await?;
    let mut model = PolicyWriteModel::<P>::new(scope, aggregate_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    Ok((model, head))
}

/// Handles `AddPolicy`: defines a policy that does not exist yet.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` if the policy already exists,
/// and any eventstore error.
#[instrument(skip_all, fields(kind = P::KIND, aggregate_id = %command.aggregate_id), err)]
pub async fn handle_add_policy<P: PolicySettings>(
    command: &AddPolicy<P>,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) =
        load_policy::<P>(eventstore, command.scope, &command.aggregate_id).await?;
    if model.policy.is_some() {
        return Err(EventstoreError::InvalidArgument(format!(
            "{} policy already exists",
            P::KIND
        )));
    }

    let aggregate = aggregate(&model.base, command.scope.aggregate_type(), head).push_events([
        EventCommand::new(
            policy::event_type::<P>(command.scope, ADDED),
            IamEvent::Policy(P::wrap(PolicyChange::Added(command.policy.clone()))),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("policy added");
    details(&model.base)
}

/// Handles `ChangePolicy`: stores the difference to the current settings.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the policy does not exist,
/// `EventstoreError::InvalidArgument` if nothing would change, and any
/// eventstore error.
#[instrument(skip_all, fields(kind = P::KIND, aggregate_id = %command.aggregate_id), err)]
pub async fn handle_change_policy<P: PolicySettings>(
    command: &ChangePolicy<P>,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) =
        load_policy::<P>(eventstore, command.scope, &command.aggregate_id).await?;
    let Some(current) = &model.policy else {
        return Err(EventstoreError::NotFound(format!("{} policy", P::KIND)));
    };
    let changes = current.diff(&command.policy).ok_or_else(no_changes)?;

    let aggregate = aggregate(&model.base, command.scope.aggregate_type(), head).push_events([
        EventCommand::new(
            policy::event_type::<P>(command.scope, CHANGED),
            IamEvent::Policy(P::wrap(PolicyChange::Changed(changes))),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("policy changed");
    details(&model.base)
}

/// Handles `RemoveOrgPolicy` for policy kind `P`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the org has no such policy, and
/// any eventstore error.
#[instrument(skip_all, fields(kind = P::KIND, org_id = %command.org_id), err)]
pub async fn handle_remove_org_policy<P: PolicySettings>(
    command: &RemoveOrgPolicy,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_policy::<P>(eventstore, Scope::Org, &command.org_id).await?;
    if model.policy.is_none() {
        return Err(EventstoreError::NotFound(format!("{} policy", P::KIND)));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            policy::event_type::<P>(Scope::Org, REMOVED),
            IamEvent::Policy(P::wrap(PolicyChange::Removed)),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("org policy removed");
    details(&model.base)
}

// --- org domains ---

async fn load_org_domain(
    eventstore: &Eventstore<IamEvent>,
    org_id: &str,
    domain: &str,
) -> Result<(OrgDomainWriteModel, u64), EventstoreError> {
    if domain.trim().is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "domain must not be empty".to_owned(),
        ));
    }
    let head = eventstore.stream_sequence(ORG_AGGREGATE_TYPE, org_id).await?;
    let mut model = OrgDomainWriteModel::new(org_id, domain);
    eventstore.filter_to_query_reducer(&mut model).await?;
    Ok((model, head))
}

fn org_domain_not_found(model: &OrgDomainWriteModel) -> EventstoreError {
    EventstoreError::NotFound(format!(
        "domain {} of org {}",
        model.domain, model.base.aggregate_id
    ))
}

/// Handles `AddOrgDomain`.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` for an empty or already added
/// domain, and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, domain = %command.domain), err)]
pub async fn handle_add_org_domain(
    command: &AddOrgDomain,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_org_domain(eventstore, &command.org_id, &command.domain).await?;
    if model.exists() {
        return Err(EventstoreError::InvalidArgument(format!(
            "domain {} already added",
            command.domain
        )));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            ORG_DOMAIN_ADDED_EVENT_TYPE,
            IamEvent::OrgDomain(OrgDomainEvent::Added(OrgDomainAdded {
                domain: command.domain.clone(),
            })),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("org domain added");
    details(&model.base)
}

/// Handles `VerifyOrgDomain`: reserves the domain for the org.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the domain is not added,
/// `EventstoreError::InvalidArgument` if it is already verified,
/// `EventstoreError::UniqueConstraintViolation` if another org verified it,
/// and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, domain = %command.domain), err)]
pub async fn handle_verify_org_domain(
    command: &VerifyOrgDomain,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_org_domain(eventstore, &command.org_id, &command.domain).await?;
    if !model.exists() {
        return Err(org_domain_not_found(&model));
    }
    if model.verified {
        return Err(EventstoreError::InvalidArgument(format!(
            "domain {} already verified",
            command.domain
        )));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            ORG_DOMAIN_VERIFIED_EVENT_TYPE,
            IamEvent::OrgDomain(OrgDomainEvent::Verified(OrgDomainVerified {
                domain: command.domain.clone(),
            })),
            command.editor.clone(),
        )
        .with_unique_constraint(org_domain::add_domain_constraint(&command.domain)),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("org domain verified");
    details(&model.base)
}

/// Handles `SetPrimaryOrgDomain`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the domain is not added,
/// `EventstoreError::InvalidArgument` if it is unverified or already
/// primary, and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, domain = %command.domain), err)]
pub async fn handle_set_primary_org_domain(
    command: &SetPrimaryOrgDomain,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_org_domain(eventstore, &command.org_id, &command.domain).await?;
    if !model.exists() {
        return Err(org_domain_not_found(&model));
    }
    if !model.verified {
        return Err(EventstoreError::InvalidArgument(format!(
            "domain {} must be verified first",
            command.domain
        )));
    }
    if model.primary {
        return Err(EventstoreError::InvalidArgument(format!(
            "domain {} is already primary",
            command.domain
        )));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            ORG_DOMAIN_PRIMARY_SET_EVENT_TYPE,
            IamEvent::OrgDomain(OrgDomainEvent::PrimarySet(OrgDomainPrimarySet {
                domain: command.domain.clone(),
            })),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("primary org domain set");
    details(&model.base)
}

/// Handles `RemoveOrgDomain`; a verified domain is released for other orgs.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the domain is not added,
/// `EventstoreError::InvalidArgument` if it is the primary domain, and any
/// eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, domain = %command.domain), err)]
pub async fn handle_remove_org_domain(
    command: &RemoveOrgDomain,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_org_domain(eventstore, &command.org_id, &command.domain).await?;
    if !model.exists() {
        return Err(org_domain_not_found(&model));
    }
    if model.primary {
        return Err(EventstoreError::InvalidArgument(format!(
            "primary domain {} cannot be removed",
            command.domain
        )));
    }

    let mut removed = EventCommand::new(
        ORG_DOMAIN_REMOVED_EVENT_TYPE,
        IamEvent::OrgDomain(OrgDomainEvent::Removed(OrgDomainRemoved {
            domain: command.domain.clone(),
        })),
        command.editor.clone(),
    );
    if model.verified {
        removed = removed.with_unique_constraint(org_domain::remove_domain_constraint(&command.domain));
    }
    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([removed]);
    push(eventstore, &mut model, aggregate).await?;
    info!("org domain removed");
    details(&model.base)
}

// --- members ---

async fn load_member(
    eventstore: &Eventstore<IamEvent>,
    scope: Scope,
    aggregate_id: &str,
    user_id: &str,
) -> Result<(MemberWriteModel, u64), EventstoreError> {
    if user_id.trim().is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "user id must not be empty".to_owned(),
        ));
    }
    let head = eventstore
        .stream_sequence(scope.aggregate_type(), aggregate_id)
        .await?;
    let mut model = MemberWriteModel::new(scope, aggregate_id, user_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    Ok((model, head))
}

fn require_roles(roles: &[String]) -> Result<(), EventstoreError> {
    if roles.is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "a member needs at least one role".to_owned(),
        ));
    }
    Ok(())
}

fn member_not_found(model: &MemberWriteModel) -> EventstoreError {
    EventstoreError::NotFound(format!(
        "member {} of {}",
        model.user_id, model.base.aggregate_id
    ))
}

/// Handles `AddMember`.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` without roles or if the user is
/// already a member, `EventstoreError::UniqueConstraintViolation` if a
/// concurrent add won, and any eventstore error.
#[instrument(skip_all, fields(aggregate_id = %command.aggregate_id, user_id = %command.user_id), err)]
pub async fn handle_add_member(
    command: &AddMember,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    require_roles(&command.roles)?;
    let (mut model, head) = load_member(
        eventstore,
        command.scope,
        &command.aggregate_id,
        &command.user_id,
    )
    .await?;
    if model.exists() {
        return Err(EventstoreError::InvalidArgument(format!(
            "user {} is already a member",
            command.user_id
        )));
    }

    let aggregate = aggregate(&model.base, command.scope.aggregate_type(), head).push_events([
        EventCommand::new(
            member::added_event_type(command.scope),
            IamEvent::Member(MemberEvent::Added(MemberAdded {
                user_id: command.user_id.clone(),
                roles: command.roles.clone(),
            })),
            command.editor.clone(),
        )
        .with_unique_constraint(member::add_member_constraint(
            &command.aggregate_id,
            &command.user_id,
        )),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("member added");
    details(&model.base)
}

/// Handles `ChangeMember`: replaces the member's roles.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` without roles or if the roles
/// are unchanged, `EventstoreError::NotFound` if the user is not a member,
/// and any eventstore error.
#[instrument(skip_all, fields(aggregate_id = %command.aggregate_id, user_id = %command.user_id), err)]
pub async fn handle_change_member(
    command: &ChangeMember,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    require_roles(&command.roles)?;
    let (mut model, head) = load_member(
        eventstore,
        command.scope,
        &command.aggregate_id,
        &command.user_id,
    )
    .await?;
    let Some(current) = &model.roles else {
        return Err(member_not_found(&model));
    };
    let mut current = current.clone();
    let mut requested = command.roles.clone();
    current.sort_unstable();
    requested.sort_unstable();
    if current == requested {
        return Err(no_changes());
    }

    let aggregate = aggregate(&model.base, command.scope.aggregate_type(), head).push_events([
        EventCommand::new(
            member::changed_event_type(command.scope),
            IamEvent::Member(MemberEvent::Changed(MemberChanged {
                user_id: command.user_id.clone(),
                roles: command.roles.clone(),
            })),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("member changed");
    details(&model.base)
}

/// Handles `RemoveMember`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the user is not a member, and any
/// eventstore error.
#[instrument(skip_all, fields(aggregate_id = %command.aggregate_id, user_id = %command.user_id), err)]
pub async fn handle_remove_member(
    command: &RemoveMember,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) = load_member(
        eventstore,
        command.scope,
        &command.aggregate_id,
        &command.user_id,
    )
    .await?;
    if !model.exists() {
        return Err(member_not_found(&model));
    }

    let aggregate = aggregate(&model.base, command.scope.aggregate_type(), head).push_events([
        EventCommand::new(
            member::removed_event_type(command.scope),
            IamEvent::Member(MemberEvent::Removed(MemberRemoved {
                user_id: command.user_id.clone(),
            })),
            command.editor.clone(),
        )
        .with_unique_constraint(member::remove_member_constraint(
            &command.aggregate_id,
            &command.user_id,
        )),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("member removed");
    details(&model.base)
}

// --- identity provider configs ---

async fn load_idp_config(
    eventstore: &Eventstore<IamEvent>,
    org_id: &str,
    idp_config_id: &str,
) -> Result<(IdpConfigWriteModel, u64), EventstoreError> {
    if idp_config_id.trim().is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "identity provider id must not be empty".to_owned(),
        ));
    }
    let head = eventstore.stream_sequence(ORG_AGGREGATE_TYPE, org_id).await?;
    let mut model = IdpConfigWriteModel::new(org_id, idp_config_id);
    eventstore.filter_to_query_reducer(&mut model).await?;
    Ok((model, head))
}

fn load_existing(model: &IdpConfigWriteModel) -> Result<(), EventstoreError> {
    if model.exists() {
        Ok(())
    } else {
        Err(EventstoreError::NotFound(format!(
            "identity provider {}",
            model.idp_config_id
        )))
    }
}

fn require_name(name: &str) -> Result<(), EventstoreError> {
    if name.trim().is_empty() {
        return Err(EventstoreError::InvalidArgument(
            "identity provider name must not be empty".to_owned(),
        ));
    }
    Ok(())
}

/// Handles `AddIdpConfig`; the name is claimed for the org.
///
/// # Errors
///
/// Returns `EventstoreError::InvalidArgument` for an empty name or a reused
/// id, `EventstoreError::UniqueConstraintViolation` if the org already has
/// a configuration of that name, and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, idp_config_id = %command.idp_config_id), err)]
pub async fn handle_add_idp_config(
    command: &AddIdpConfig,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    require_name(&command.name)?;
    let (mut model, head) =
        load_idp_config(eventstore, &command.org_id, &command.idp_config_id).await?;
    if model.state != IdpConfigState::Unspecified {
        return Err(EventstoreError::InvalidArgument(format!(
            "identity provider {} already exists",
            command.idp_config_id
        )));
    }

    let org_id = model.base.aggregate_id.clone();
    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            IDP_CONFIG_ADDED_EVENT_TYPE,
            IamEvent::IdpConfig(IdpConfigEvent::Added(IdpConfigAdded {
                idp_config_id: command.idp_config_id.clone(),
                name: command.name.clone(),
                auto_register: command.auto_register,
            })),
            command.editor.clone(),
        )
        .with_unique_constraint(idp_config::add_name_constraint(&org_id, &command.name)),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("identity provider added");
    details(&model.base)
}

/// Handles `ChangeIdpConfig`; a rename swaps the name reservation.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the configuration does not exist,
/// `EventstoreError::InvalidArgument` for an empty name or if nothing would
/// change, `EventstoreError::UniqueConstraintViolation` if the new name is
/// taken, and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, idp_config_id = %command.idp_config_id), err)]
pub async fn handle_change_idp_config(
    command: &ChangeIdpConfig,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    require_name(&command.name)?;
    let (mut model, head) =
        load_idp_config(eventstore, &command.org_id, &command.idp_config_id).await?;
    load_existing(&model)?;

    let changed = IdpConfigChanged {
        idp_config_id: command.idp_config_id.clone(),
        name: (model.name != command.name).then(|| command.name.clone()),
        auto_register: (model.auto_register != command.auto_register)
            .then_some(command.auto_register),
    };
    if changed.name.is_none() && changed.auto_register.is_none() {
        return Err(no_changes());
    }

    let org_id = model.base.aggregate_id.clone();
    let mut event = EventCommand::new(
        IDP_CONFIG_CHANGED_EVENT_TYPE,
        IamEvent::IdpConfig(IdpConfigEvent::Changed(changed.clone())),
        command.editor.clone(),
    );
    if let Some(name) = &changed.name {
        event = event
            .with_unique_constraint(idp_config::remove_name_constraint(&org_id, &model.name))
            .with_unique_constraint(idp_config::add_name_constraint(&org_id, name));
    }
    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([event]);
    push(eventstore, &mut model, aggregate).await?;
    info!("identity provider changed");
    details(&model.base)
}

/// Handles `DeactivateIdpConfig`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the configuration does not exist,
/// `EventstoreError::InvalidArgument` if it is already inactive, and any
/// eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, idp_config_id = %command.idp_config_id), err)]
pub async fn handle_deactivate_idp_config(
    command: &DeactivateIdpConfig,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) =
        load_idp_config(eventstore, &command.org_id, &command.idp_config_id).await?;
    load_existing(&model)?;
    if model.state == IdpConfigState::Inactive {
        return Err(EventstoreError::InvalidArgument(format!(
            "identity provider {} is already inactive",
            command.idp_config_id
        )));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            IDP_CONFIG_DEACTIVATED_EVENT_TYPE,
            IamEvent::IdpConfig(IdpConfigEvent::Deactivated(IdpConfigDeactivated {
                idp_config_id: command.idp_config_id.clone(),
            })),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("identity provider deactivated");
    details(&model.base)
}

/// Handles `ReactivateIdpConfig`.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the configuration does not exist,
/// `EventstoreError::InvalidArgument` if it is already active, and any
/// eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, idp_config_id = %command.idp_config_id), err)]
pub async fn handle_reactivate_idp_config(
    command: &ReactivateIdpConfig,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) =
        load_idp_config(eventstore, &command.org_id, &command.idp_config_id).await?;
    load_existing(&model)?;
    if model.state == IdpConfigState::Active {
        return Err(EventstoreError::InvalidArgument(format!(
            "identity provider {} is already active",
            command.idp_config_id
        )));
    }

    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            IDP_CONFIG_REACTIVATED_EVENT_TYPE,
            IamEvent::IdpConfig(IdpConfigEvent::Reactivated(IdpConfigReactivated {
                idp_config_id: command.idp_config_id.clone(),
            })),
            command.editor.clone(),
        ),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("identity provider reactivated");
    details(&model.base)
}

/// Handles `RemoveIdpConfig`; the name becomes available again.
///
/// # Errors
///
/// Returns `EventstoreError::NotFound` if the configuration does not exist,
/// and any eventstore error.
#[instrument(skip_all, fields(org_id = %command.org_id, idp_config_id = %command.idp_config_id), err)]
pub async fn handle_remove_idp_config(
    command: &RemoveIdpConfig,
    eventstore: &Eventstore<IamEvent>,
) -> Result<ObjectDetails, EventstoreError> {
    let (mut model, head) =
        load_idp_config(eventstore, &command.org_id, &command.idp_config_id).await?;
    load_existing(&model)?;

    let org_id = model.base.aggregate_id.clone();
    let aggregate = aggregate(&model.base, ORG_AGGREGATE_TYPE, head).push_events([
        EventCommand::new(
            IDP_CONFIG_REMOVED_EVENT_TYPE,
            IamEvent::IdpConfig(IdpConfigEvent::Removed(IdpConfigRemoved {
                idp_config_id: command.idp_config_id.clone(),
                name: model.name.clone(),
            })),
            command.editor.clone(),
        )
        .with_unique_constraint(idp_config::remove_name_constraint(&org_id, &model.name)),
    ]);
    push(eventstore, &mut model, aggregate).await?;
    info!("identity provider removed");
    details(&model.base)
}
