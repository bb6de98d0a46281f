//! REST API handlers.
//!
//! Each handler goes through `BalancerScheduler` and returns JSON responses
//! in the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use lbgrid_scheduler::{ConfirmStatus, DeviceConfirmation, SchedulerError};
use lbgrid_state::{DeviceStatus, ResourceRef};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::NotFound(_) | SchedulerError::AssociationNotFound(_) => StatusCode::NOT_FOUND,
        SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
        SchedulerError::AssociationError(_) | SchedulerError::AlreadyAssociated(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn scheduler_error(err: SchedulerError) -> axum::response::Response {
    error_response(&err.to_string(), status_for(&err)).into_response()
}

// ── Resources ──────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct Placed {
    resource_id: String,
    device: lbgrid_state::BalancerDevice,
}

/// POST /api/v1/resources
///
/// A freshly created device is handed to its driver for provisioning.
pub async fn schedule_resource(
    State(state): State<ApiState>,
    Json(resource): Json<ResourceRef>,
) -> impl IntoResponse {
    if resource.id.trim().is_empty() || resource.tenant_id.trim().is_empty() {
        return error_response("id and tenant_id are required", StatusCode::BAD_REQUEST).into_response();
    }

    let device = match state.scheduler.schedule_device(&resource) {
        Ok(device) => device,
        Err(e) => return scheduler_error(e),
    };
    if device.status == DeviceStatus::PendingCreate {
        if let Err(e) = state.control.provision(&device).await {
            warn!(device_id = %device.id, error = %e, "provisioning was not dispatched");
        }
    }

    let placed = Placed {
        resource_id: resource.id,
        device,
    };
    (StatusCode::CREATED, ApiResponse::ok(placed)).into_response()
}

#[derive(serde::Serialize)]
struct Released {
    device_id: String,
    /// Whether the device was left empty and sent for teardown.
    teardown: bool,
}

/// DELETE /api/v1/resources/:id
pub async fn unschedule_resource(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    let device = match state.scheduler.delete_resource_association(&id) {
        Ok(device) => device,
        Err(e) => return scheduler_error(e),
    };
    let teardown = device.status == DeviceStatus::PendingDelete;
    if teardown {
        if let Err(e) = state.control.teardown(&device).await {
            warn!(device_id = %device.id, error = %e, "teardown was not dispatched");
        }
    }

    ApiResponse::ok(Released {
        device_id: device.id,
        teardown,
    })
    .into_response()
}

/// GET /api/v1/resources/:id/device
pub async fn get_resource_device(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.get_device_by_resource(&id) {
        Ok(device) => ApiResponse::ok(device).into_response(),
        Err(e) => scheduler_error(e),
    }
}

// ── Devices ────────────────────────────────────────────────────

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<ApiState>) -> impl IntoResponse {
    match state.scheduler.get_device_list() {
        Ok(devices) => ApiResponse::ok(devices).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/devices/:id
pub async fn get_device(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.get_device(&id) {
        Ok(device) => ApiResponse::ok(device).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// DELETE /api/v1/devices/:id
pub async fn delete_device(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.delete_device(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => ApiResponse::ok("absent").into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// Confirm request body.
#[derive(serde::Deserialize)]
pub struct ConfirmRequest {
    pub status: ConfirmStatus,
    #[serde(default)]
    pub management: Option<serde_json::Value>,
    #[serde(default)]
    pub message: String,
}

/// POST /api/v1/devices/:id/confirm
pub async fn confirm_device(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> impl IntoResponse {
    let confirmation = DeviceConfirmation {
        device_id: id,
        status: req.status,
        management: req.management,
        message: req.message,
    };
    match state.scheduler.apply_confirmation(&confirmation) {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => scheduler_error(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use lbgrid_core::{DriverIdentity, SchedulerConfig};
    use lbgrid_scheduler::{BalancerScheduler, ControlChannel, DriverRegistry, ExternalDriver};
    use lbgrid_state::DeviceStore;
    use tokio::sync::mpsc;

    fn test_state() -> ApiState {
        let mut registry = DriverRegistry::new();
        registry
            .register(Arc::new(ExternalDriver::new(DriverIdentity::haproxy())))
            .unwrap();
        let scheduler = BalancerScheduler::new(
            DeviceStore::open_in_memory().unwrap(),
            &SchedulerConfig::default(),
            &registry,
        )
        .unwrap();
        let (tx, _rx) = mpsc::channel(16);
        ApiState {
            scheduler: Arc::new(scheduler),
            control: ControlChannel::new(Arc::new(registry), tx),
        }
    }

    fn resource(id: &str) -> ResourceRef {
        ResourceRef::new(id, "t1", Some("s1"))
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(status_for(&SchedulerError::NotFound("d".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&SchedulerError::AssociationNotFound("r".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_for(&SchedulerError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&SchedulerError::AlreadyAssociated("r".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SchedulerError::AssociationError("lost".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&SchedulerError::Driver("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn schedule_resource_creates_device() {
        let state = test_state();
        let resp = schedule_resource(State(state.clone()), Json(resource("r1"))).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let device = state.scheduler.get_device_by_resource("r1").unwrap();
        assert_eq!(device.status, DeviceStatus::PendingCreate);
    }

    #[tokio::test]
    async fn schedule_resource_requires_ids() {
        let state = test_state();
        let resp = schedule_resource(State(state), Json(ResourceRef::new("", "t1", None))).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schedule_resource_twice_conflicts() {
        let state = test_state();
        state.scheduler.schedule(&resource("r1")).unwrap();

        let resp = schedule_resource(State(state), Json(resource("r1"))).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unschedule_unknown_resource() {
        let state = test_state();
        let resp = unschedule_resource(State(state), Path("nope".to_string())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unschedule_last_resource_drains_device() {
        let state = test_state();
        let device_id = state.scheduler.schedule(&resource("r1")).unwrap();

        let resp = unschedule_resource(State(state.clone()), Path("r1".to_string())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let device = state.scheduler.get_device(&device_id).unwrap();
        assert_eq!(device.status, DeviceStatus::PendingDelete);
    }

    #[tokio::test]
    async fn get_resource_device_without_association() {
        let state = test_state();
        let resp = get_resource_device(State(state), Path("nope".to_string())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_devices_empty() {
        let state = test_state();
        let resp = list_devices(State(state)).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_nonexistent_device() {
        let state = test_state();
        let resp = get_device(State(state), Path("nope".to_string())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_device_is_idempotent() {
        let state = test_state();
        let device_id = state.scheduler.schedule(&resource("r1")).unwrap();

        for _ in 0..2 {
            let resp = delete_device(State(state.clone()), Path(device_id.clone())).await;
            let resp = resp.into_response();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert!(state.scheduler.get_device_list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_activates_device() {
        let state = test_state();
        let device_id = state.scheduler.schedule(&resource("r1")).unwrap();

        let req = ConfirmRequest {
            status: ConfirmStatus::Ok,
            management: Some(serde_json::json!({"host": "10.0.0.9"})),
            message: String::new(),
        };
        let resp = confirm_device(State(state.clone()), Path(device_id.clone()), Json(req)).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let device = state.scheduler.get_device(&device_id).unwrap();
        assert_eq!(device.status, DeviceStatus::Active);
        assert_eq!(device.management["host"], "10.0.0.9");
    }

    #[tokio::test]
    async fn confirm_unknown_device() {
        let state = test_state();
        let req = ConfirmRequest {
            status: ConfirmStatus::Error,
            management: None,
            message: "boom".to_string(),
        };
        let resp = confirm_device(State(state), Path("nope".to_string()), Json(req)).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
