//! Route access decisions
//!
//! A pure function over a route's policy and the session's logical view.
//! The checks run in a fixed order: guest-only routes first, then guest
//! access, then the login requirement, then the role requirement.

use crate::session::{Role, Session};

/// Where logged-in visitors are sent away from guest-only routes, and
/// where role mismatches land
pub const LANDING_ROUTE: &str = "/";
/// Where visitors without a session are sent
pub const LOGIN_ROUTE: &str = "/login";

/// Access requirements of a route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Only visitors without a session may enter
    pub only_unauthenticated: bool,
    /// Visitors without a session may enter
    pub allow_guest: bool,
    /// Logged-in visitors need one of these roles
    pub required_roles: Option<Vec<Role>>,
}

impl RoutePolicy {
    /// Any logged-in visitor
    pub fn logged_in() -> Self {
        RoutePolicy::default()
    }

    pub fn guest_only() -> Self {
        RoutePolicy {
            only_unauthenticated: true,
            ..RoutePolicy::default()
        }
    }

    pub fn guest_allowed() -> Self {
        RoutePolicy {
            allow_guest: true,
            ..RoutePolicy::default()
        }
    }

    pub fn roles<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        RoutePolicy {
            required_roles: Some(roles.into_iter().map(Into::into).collect()),
            ..RoutePolicy::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(&'static str),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

pub fn evaluate(policy: &RoutePolicy, logged_in: bool, role: &Role) -> GuardDecision {
    if policy.only_unauthenticated && logged_in {
        return GuardDecision::Redirect(LANDING_ROUTE);
    }
    if policy.allow_guest && !logged_in {
        return GuardDecision::Allow;
    }
    if !logged_in {
        return GuardDecision::Redirect(LOGIN_ROUTE);
    }
    if let Some(required) = &policy.required_roles {
        if !required.contains(role) {
            return GuardDecision::Redirect(LANDING_ROUTE);
        }
    }
    GuardDecision::Allow
}

/// [`evaluate`] against a session snapshot
pub fn evaluate_session(policy: &RoutePolicy, session: &Session) -> GuardDecision {
    evaluate(policy, session.logged_in, &session.role)
}
