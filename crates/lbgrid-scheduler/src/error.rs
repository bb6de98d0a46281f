//! Scheduler error types.

use thiserror::Error;

use lbgrid_state::StateError;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No device can host the resource. Recovered inside the scheduler by
    /// provisioning; only the device manager's scope re-check surfaces it.
    #[error("no valid device found for resource {0}")]
    NoValidDevice(String),

    /// Lost a race against a concurrent change to the chosen device.
    #[error("error adding association: {0}")]
    AssociationError(String),

    #[error("resource already associated: {0}")]
    AlreadyAssociated(String),

    #[error("association was not found: {0}")]
    AssociationNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("driver {0} could not be found")]
    DriverNotFound(String),

    #[error("multiple drivers are configured for {0}")]
    DuplicateDriver(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("state store error: {0}")]
    State(StateError),
}

impl SchedulerError {
    /// Whether retrying the whole scheduling call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::AssociationError(_))
    }
}

impl From<StateError> for SchedulerError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => SchedulerError::NotFound(what),
            StateError::AssociationNotFound(resource_id) => {
                SchedulerError::AssociationNotFound(resource_id)
            }
            StateError::Validation(msg) => SchedulerError::Validation(msg),
            StateError::Association(msg) => SchedulerError::AssociationError(msg),
            StateError::Conflict(resource_id) => SchedulerError::AlreadyAssociated(resource_id),
            other => SchedulerError::State(other),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
