use crate::session::domain::session::Session;

/// Where a frame came from, for sessions resolved without an explicit id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraContext {
    pub camera_id: String,
    pub venue: Option<String>,
    pub department: Option<String>,
}

impl CameraContext {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            ..Self::default()
        }
    }
}

/// Finds the session a camera is currently filming, if any.
///
/// Backed by whatever timetable data the surrounding system has. `None` is
/// the normal answer outside class hours.
pub trait SessionResolver: Send + Sync {
    fn resolve_active_session(&self, camera: &CameraContext) -> Option<Session>;
}
