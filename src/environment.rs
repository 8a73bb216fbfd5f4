//! Environment capabilities consumed by the session controller.
//!
//! The host supplies these: a browser shell, a desktop window, or a test fake.

use crate::error::ProctorError;

/// Camera permission gate.
pub trait CameraAccess: Send {
    /// Ask for camera access. Denial is `PermissionDenied` and may be retried.
    fn request_access(&mut self) -> Result<(), ProctorError>;
}

/// Exclusive (full-viewport) display presentation.
///
/// Loss of exclusive mode is reported to the controller separately through
/// `SessionController::display_changed`.
pub trait ExclusiveDisplay: Send {
    fn enter_exclusive(&mut self) -> Result<(), ProctorError>;
    /// Leave exclusive mode. Calling it while not exclusive is a no-op.
    fn exit_exclusive(&mut self);
    fn is_exclusive(&self) -> bool;
}

/// Camera that always grants access, for hosts without a permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantedCamera;

impl CameraAccess for GrantedCamera {
    fn request_access(&mut self) -> Result<(), ProctorError> {
        Ok(())
    }
}
