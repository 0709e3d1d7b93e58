//! # Event Dispatcher
//!
//! Maps domain events to delivery targets and hands them to the delivery
//! layer. The dispatcher performs no retry of its own; that responsibility
//! belongs entirely to the delivery client and the fallback orchestration
//! behind it. An event with no configured target, a disabled route, or a
//! disabled dispatcher is dropped, never queued for later retry.

use crate::config::{CachedSettings, EnvironmentPolicy};
use crate::constants::event_types;
use crate::delivery::Delivery;
use crate::events::routes::RouteTable;
use crate::events::types::{Event, EventIdentity};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct EventDispatcher {
    settings: Arc<CachedSettings>,
    routes: Arc<RouteTable>,
    delivery: Arc<dyn Delivery>,
    policy: Arc<EnvironmentPolicy>,
}

impl EventDispatcher {
    pub fn new(
        settings: Arc<CachedSettings>,
        routes: Arc<RouteTable>,
        delivery: Arc<dyn Delivery>,
        policy: Arc<EnvironmentPolicy>,
    ) -> Self {
        Self {
            settings,
            routes,
            delivery,
            policy,
        }
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Dispatch one event. Returns whether it was delivered (or simulated in
    /// mock mode); every failure mode degrades to `false`, never an error.
    pub async fn trigger_event(&self, event: Event) -> bool {
        let settings = match self.settings.current() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "Settings unavailable, dropping event");
                return false;
            }
        };

        if !settings.enabled {
            debug!(event_type = %event.event_type, "Dispatch disabled, dropping event");
            return false;
        }

        if self.policy.mock_enabled() {
            info!(
                event_type = %event.event_type,
                subject_id = %event.subject_id,
                "Mock mode, simulating successful delivery"
            );
            return true;
        }

        let route = match self.routes.resolve(&event.event_type) {
            Some(route) => route,
            None => {
                warn!(event_type = %event.event_type, "No route configured, dropping event");
                return false;
            }
        };
        if !route.enabled {
            debug!(
                event_type = %event.event_type,
                route_id = %route.id,
                "Route disabled, dropping event"
            );
            return false;
        }

        if settings.target_base_url.trim().is_empty() {
            warn!(event_type = %event.event_type, "No target base URL configured, dropping event");
            return false;
        }

        let url = format!(
            "{}{}",
            settings.target_base_url.trim_end_matches('/'),
            route.target_path
        );

        match self.delivery.send_event(&url, &event).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    event_type = %event.event_type,
                    error = %e,
                    "Event delivery failed"
                );
                false
            }
        }
    }

    pub async fn on_user_registered(
        &self,
        user_id: &str,
        identity: Option<EventIdentity>,
    ) -> bool {
        let mut event = Event::new(event_types::USER_REGISTERED, user_id);
        if let Some(identity) = identity {
            event = event.with_identity(identity);
        }
        self.trigger_event(event).await
    }

    pub async fn on_lesson_completed(&self, user_id: &str, lesson_id: i64, course_id: i64) -> bool {
        self.trigger_event(
            Event::new(event_types::LESSON_COMPLETED, user_id)
                .with_data("lessonId", lesson_id)
                .with_data("courseId", course_id),
        )
        .await
    }

    pub async fn on_payment_success(&self, user_id: &str, plan_id: &str, amount: i64) -> bool {
        self.trigger_event(
            Event::new(event_types::PAYMENT_SUCCESS, user_id)
                .with_data("planId", plan_id)
                .with_data("amount", amount),
        )
        .await
    }

    pub async fn on_course_completed(&self, user_id: &str, course_id: i64) -> bool {
        self.trigger_event(
            Event::new(event_types::COURSE_COMPLETED, user_id).with_data("courseId", course_id),
        )
        .await
    }

    pub async fn on_user_inactive(&self, user_id: &str, days_inactive: i64) -> bool {
        self.trigger_event(
            Event::new(event_types::USER_INACTIVE, user_id)
                .with_data("daysInactive", Value::from(days_inactive)),
        )
        .await
    }
}
