//! # Trigger Routes
//!
//! Maps event types to external endpoint paths. One route per event type;
//! routes mutate only through explicit enable/disable.

use crate::constants::{event_types, routes};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping from one event type to an external endpoint path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRoute {
    pub id: String,
    pub event_type: String,
    /// Path joined onto the configured target base URL
    pub target_path: String,
    pub enabled: bool,
    pub description: String,
}

impl TriggerRoute {
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        target_path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            target_path: target_path.into(),
            enabled: true,
            description: description.into(),
        }
    }
}

/// Route registry, keyed by event type (one route per type)
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<String, TriggerRoute>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the platform's standard routes
    pub fn with_default_routes() -> Self {
        let table = Self::new();
        table.insert(TriggerRoute::new(
            "user-registered",
            event_types::USER_REGISTERED,
            routes::USER_REGISTERED,
            "New user completed registration",
        ));
        table.insert(TriggerRoute::new(
            "lesson-completed",
            event_types::LESSON_COMPLETED,
            routes::LESSON_COMPLETED,
            "User finished a lesson",
        ));
        table.insert(TriggerRoute::new(
            "payment-success",
            event_types::PAYMENT_SUCCESS,
            routes::PAYMENT_SUCCESS,
            "Payment confirmed by the provider",
        ));
        table.insert(TriggerRoute::new(
            "course-completed",
            event_types::COURSE_COMPLETED,
            routes::COURSE_COMPLETED,
            "User finished all lessons of a course",
        ));
        table.insert(TriggerRoute::new(
            "user-inactive",
            event_types::USER_INACTIVE,
            routes::USER_INACTIVE,
            "User has been inactive past the threshold",
        ));
        table
    }

    /// Register a route, replacing any existing route for the same event type
    pub fn insert(&self, route: TriggerRoute) {
        self.routes
            .write()
            .insert(route.event_type.clone(), route);
    }

    /// Route for an event type, regardless of its enabled flag
    pub fn resolve(&self, event_type: &str) -> Option<TriggerRoute> {
        self.routes.read().get(event_type).cloned()
    }

    /// Flip a route's enabled flag by route id; returns false for unknown ids
    pub fn set_enabled(&self, route_id: &str, enabled: bool) -> bool {
        let mut routes = self.routes.write();
        for route in routes.values_mut() {
            if route.id == route_id {
                route.enabled = enabled;
                return true;
            }
        }
        false
    }

    /// Snapshot of all registered routes
    pub fn all(&self) -> Vec<TriggerRoute> {
        self.routes.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_cover_standard_events() {
        let table = RouteTable::with_default_routes();
        for event_type in [
            event_types::USER_REGISTERED,
            event_types::LESSON_COMPLETED,
            event_types::PAYMENT_SUCCESS,
            event_types::COURSE_COMPLETED,
            event_types::USER_INACTIVE,
        ] {
            let route = table.resolve(event_type).expect("route missing");
            assert!(route.enabled);
            assert!(route.target_path.starts_with("/webhook/"));
        }
    }

    #[test]
    fn one_route_per_event_type() {
        let table = RouteTable::new();
        table.insert(TriggerRoute::new("a", "x", "/one", ""));
        table.insert(TriggerRoute::new("b", "x", "/two", ""));

        assert_eq!(table.all().len(), 1);
        assert_eq!(table.resolve("x").unwrap().target_path, "/two");
    }

    #[test]
    fn disable_by_route_id() {
        let table = RouteTable::with_default_routes();
        assert!(table.set_enabled("payment-success", false));
        assert!(!table.resolve(event_types::PAYMENT_SUCCESS).unwrap().enabled);

        assert!(!table.set_enabled("no-such-route", false));
    }
}
