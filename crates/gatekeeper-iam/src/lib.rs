//! Gatekeeper IAM context.
//!
//! Policies, organization domains, members and identity provider
//! configurations, event sourced through `gatekeeper-core`. Build an
//! [`Eventstore`](gatekeeper_core::eventstore::Eventstore) with
//! [`domain::events::event_registry`] and pass it to the handlers in
//! [`application`].

pub mod application;
pub mod domain;
