//! Domain layer: event payloads, write models and commands.

pub mod commands;
pub mod events;
pub mod idp_config;
pub mod member;
pub mod org_domain;
pub mod policy;
