//! Views of the CRM front-end and the navigation seam.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A navigable view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Bootstrap,
    Dashboard,
    Leads,
    Lead(String),
    Customers,
    Customer(String),
    Tasks,
    Users,
    Register,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Bootstrap => "/bootstrap".to_string(),
            Route::Dashboard => "/".to_string(),
            Route::Leads => "/leads".to_string(),
            Route::Lead(id) => format!("/leads/{id}"),
            Route::Customers => "/customers".to_string(),
            Route::Customer(id) => format!("/customers/{id}"),
            Route::Tasks => "/tasks".to_string(),
            Route::Users => "/users".to_string(),
            Route::Register => "/register".to_string(),
        }
    }

    /// Maps a view path back to its route. Query strings are ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let route = match segments.as_slice() {
            [] | ["dashboard"] => Route::Dashboard,
            ["login"] => Route::Login,
            ["bootstrap"] => Route::Bootstrap,
            ["register"] => Route::Register,
            ["leads"] => Route::Leads,
            ["leads", id] => Route::Lead((*id).to_string()),
            ["customers"] => Route::Customers,
            ["customers", id] => Route::Customer((*id).to_string()),
            ["tasks"] => Route::Tasks,
            ["users"] | ["auth", "users"] => Route::Users,
            _ => return None,
        };
        Some(route)
    }

    /// Whether the view needs a signed-in user.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login | Route::Bootstrap)
    }

    /// Whether the view is restricted to administrators.
    pub fn requires_admin(&self) -> bool {
        matches!(self, Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Receives navigation instructions (e.g. "go to login").
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only remembers where it was sent.
#[derive(Debug, Default)]
pub struct NavigationHistory {
    routes: Mutex<Vec<Route>>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for NavigationHistory {
    fn navigate(&self, route: Route) {
        tracing::debug!(route = %route, "navigate");
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}
