//! Commands for the IAM context.

use gatekeeper_core::event::Editor;

use crate::domain::events::Scope;

/// Command to define a policy at instance or org level.
#[derive(Debug, Clone)]
pub struct AddPolicy<P> {
    /// Level the policy is defined at.
    pub scope: Scope,
    /// The instance or org identifier.
    pub aggregate_id: String,
    /// The settings.
    pub policy: P,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to replace the settings of an existing policy.
#[derive(Debug, Clone)]
pub struct ChangePolicy<P> {
    /// Level the policy is defined at.
    pub scope: Scope,
    /// The instance or org identifier.
    pub aggregate_id: String,
    /// The complete target settings.
    pub policy: P,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to drop an org policy, reverting the org to the instance default.
#[derive(Debug, Clone)]
pub struct RemoveOrgPolicy {
    /// The org identifier.
    pub org_id: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to add a domain to an org.
#[derive(Debug, Clone)]
pub struct AddOrgDomain {
    /// The org identifier.
    pub org_id: String,
    /// The domain name.
    pub domain: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to mark a domain as verified.
#[derive(Debug, Clone)]
pub struct VerifyOrgDomain {
    /// The org identifier.
    pub org_id: String,
    /// The domain name.
    pub domain: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to make a verified domain the org's primary domain.
#[derive(Debug, Clone)]
pub struct SetPrimaryOrgDomain {
    /// The org identifier.
    pub org_id: String,
    /// The domain name.
    pub domain: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to remove a domain from an org.
#[derive(Debug, Clone)]
pub struct RemoveOrgDomain {
    /// The org identifier.
    pub org_id: String,
    /// The domain name.
    pub domain: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to grant roles to a user who is not yet a member.
#[derive(Debug, Clone)]
pub struct AddMember {
    /// Level of the membership.
    pub scope: Scope,
    /// The instance or org identifier.
    pub aggregate_id: String,
    /// The user identifier.
    pub user_id: String,
    /// Granted roles; must not be empty.
    pub roles: Vec<String>,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to replace a member's roles.
#[derive(Debug, Clone)]
pub struct ChangeMember {
    /// Level of the membership.
    pub scope: Scope,
    /// The instance or org identifier.
    pub aggregate_id: String,
    /// The user identifier.
    pub user_id: String,
    /// The complete new set of roles; must not be empty.
    pub roles: Vec<String>,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to revoke a membership.
#[derive(Debug, Clone)]
pub struct RemoveMember {
    /// Level of the membership.
    pub scope: Scope,
    /// The instance or org identifier.
    pub aggregate_id: String,
    /// The user identifier.
    pub user_id: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to add an identity provider configuration to an org.
#[derive(Debug, Clone)]
pub struct AddIdpConfig {
    /// The org identifier.
    pub org_id: String,
    /// The new configuration's identifier.
    pub idp_config_id: String,
    /// Display name.
    pub name: String,
    /// Whether users are registered on first login.
    pub auto_register: bool,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to rename or reconfigure an identity provider configuration.
#[derive(Debug, Clone)]
pub struct ChangeIdpConfig {
    /// The org identifier.
    pub org_id: String,
    /// The configuration identifier.
    pub idp_config_id: String,
    /// Target name.
    pub name: String,
    /// Target auto-register flag.
    pub auto_register: bool,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to take an identity provider configuration out of service.
#[derive(Debug, Clone)]
pub struct DeactivateIdpConfig {
    /// The org identifier.
    pub org_id: String,
    /// The configuration identifier.
    pub idp_config_id: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to put an identity provider configuration back into service.
#[derive(Debug, Clone)]
pub struct ReactivateIdpConfig {
    /// The org identifier.
    pub org_id: String,
    /// The configuration identifier.
    pub idp_config_id: String,
    /// Who issues the command.
    pub editor: Editor,
}

/// Command to delete an identity provider configuration.
#[derive(Debug, Clone)]
pub struct RemoveIdpConfig {
    /// The org identifier.
    pub org_id: String,
    /// The configuration identifier.
    pub idp_config_id: String,
    /// Who issues the command.
    pub editor: Editor,
}
