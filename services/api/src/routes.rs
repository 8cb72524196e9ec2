//! Application route table, gated by the route guard

use auth::guard::{self, GuardDecision, RoutePolicy};
use auth::session::{ROLE_ADMIN, ROLE_USER, Session};
use tracing::debug;

/// Where first-login sessions are kept until the password is changed
pub const FORCE_PASSWORD_CHANGE_ROUTE: &str = "/force-change-password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    MyBorrows,
    ManageBooks,
    ManageAccounts,
    ManageSystems,
    Login,
    Profile,
    ForcePasswordChange,
}

/// A known route and its access policy; `None` is public
pub struct RouteEntry {
    pub path: &'static str,
    pub screen: Screen,
    pub policy: Option<RoutePolicy>,
}

/// Result of resolving a path for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Screen),
    Redirect(&'static str),
    NotFound,
}

pub fn route_table() -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            path: "/",
            screen: Screen::Home,
            policy: None,
        },
        RouteEntry {
            path: "/my-borrows",
            screen: Screen::MyBorrows,
            policy: Some(RoutePolicy::roles([ROLE_USER])),
        },
        RouteEntry {
            path: "/manage-books",
            screen: Screen::ManageBooks,
            policy: Some(RoutePolicy::roles([ROLE_ADMIN])),
        },
        RouteEntry {
            path: "/manage-accounts",
            screen: Screen::ManageAccounts,
            policy: Some(RoutePolicy::roles([ROLE_ADMIN])),
        },
        RouteEntry {
            path: "/manage-systems",
            screen: Screen::ManageSystems,
            policy: Some(RoutePolicy::roles([ROLE_ADMIN])),
        },
        RouteEntry {
            path: "/login",
            screen: Screen::Login,
            policy: Some(RoutePolicy {
                only_unauthenticated: true,
                allow_guest: true,
                required_roles: None,
            }),
        },
        RouteEntry {
            path: "/profile",
            screen: Screen::Profile,
            policy: Some(RoutePolicy::logged_in()),
        },
        RouteEntry {
            path: FORCE_PASSWORD_CHANGE_ROUTE,
            screen: Screen::ForcePasswordChange,
            policy: None,
        },
    ]
}

/// Decide what to show for `path` given the current session
pub fn resolve(path: &str, session: &Session) -> Navigation {
    if session.first_login && path != FORCE_PASSWORD_CHANGE_ROUTE {
        return Navigation::Redirect(FORCE_PASSWORD_CHANGE_ROUTE);
    }

    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    let Some(entry) = route_table().into_iter().find(|entry| entry.path == path) else {
        debug!("No route for {}", path);
        return Navigation::NotFound;
    };

    match &entry.policy {
        None => Navigation::Render(entry.screen),
        Some(policy) => match guard::evaluate_session(policy, session) {
            GuardDecision::Allow => Navigation::Render(entry.screen),
            GuardDecision::Redirect(to) => {
                debug!("Redirecting {} to {}", path, to);
                Navigation::Redirect(to)
            }
        },
    }
}
