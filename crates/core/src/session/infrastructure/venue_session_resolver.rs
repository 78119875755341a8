use std::collections::HashMap;
use std::sync::Arc;

use crate::session::domain::session::Session;
use crate::session::domain::session_resolver::{CameraContext, SessionResolver};
use crate::session::session_manager::SessionManager;

/// Resolves a camera to the active session at its venue.
///
/// The venue comes from the context itself when given, otherwise from the
/// camera-to-venue table.
pub struct VenueSessionResolver {
    manager: Arc<SessionManager>,
    cameras: HashMap<String, String>,
}

impl VenueSessionResolver {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            cameras: HashMap::new(),
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>, venue: impl Into<String>) -> Self {
        self.cameras.insert(camera_id.into(), venue.into());
        self
    }
}

impl SessionResolver for VenueSessionResolver {
    fn resolve_active_session(&self, camera: &CameraContext) -> Option<Session> {
        let venue = camera
            .venue
            .as_deref()
            .or_else(|| self.cameras.get(&camera.camera_id).map(String::as_str))?;
        self.manager.active_session_at(venue)
    }
}
