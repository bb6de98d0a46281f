//! lbgrid-api — REST API for the balancer scheduler.
//!
//! Provides axum route handlers for scheduling resources onto devices,
//! inspecting devices, and feeding device confirmations back in.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/resources` | Schedule a resource onto a device |
//! | DELETE | `/api/v1/resources/:id` | Release a resource |
//! | GET | `/api/v1/resources/:id/device` | Device serving a resource |
//! | GET | `/api/v1/devices` | List all devices |
//! | GET | `/api/v1/devices/:id` | Get device details |
//! | DELETE | `/api/v1/devices/:id` | Delete a device |
//! | POST | `/api/v1/devices/:id/confirm` | Report a device confirmation |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use lbgrid_scheduler::{BalancerScheduler, ControlChannel};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<BalancerScheduler>,
    pub control: ControlChannel,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/resources", post(handlers::schedule_resource))
        .route("/resources/{id}", axum::routing::delete(handlers::unschedule_resource))
        .route("/resources/{id}/device", get(handlers::get_resource_device))
        .route("/devices", get(handlers::list_devices))
        .route("/devices/{id}", get(handlers::get_device).delete(handlers::delete_device))
        .route("/devices/{id}/confirm", post(handlers::confirm_device))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
