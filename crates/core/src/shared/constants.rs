pub const DEFAULT_PRESENT_THRESHOLD: f64 = 75.0;
pub const DEFAULT_PARTIAL_THRESHOLD: f64 = 50.0;
pub const DEFAULT_LATE_THRESHOLD: f64 = 25.0;

/// Cosine distance at or below which a normal-sized face counts as a match.
pub const DEFAULT_MATCH_DISTANCE_THRESHOLD: f64 = 0.45;
/// Extra distance granted to the smallest (most distant) faces.
pub const DEFAULT_DISTANCE_RELAXATION: f64 = 0.15;

pub const DEFAULT_QUALITY_FLOOR: f64 = 0.15;
/// Dense lecture halls top out around this many visible faces.
pub const DEFAULT_MAX_FACES_PER_FRAME: usize = 35;
pub const DEFAULT_CONTINUITY_BUFFER_SECS: f64 = 30.0;
/// One day. Larger buffers would credit a single sighting with a whole session.
pub const MAX_CONTINUITY_BUFFER_SECS: f64 = 86_400.0;
/// Used when a timetable slot carries no end time.
pub const DEFAULT_SESSION_MINUTES: i64 = 90;

pub const DEFAULT_MIN_FACE_SIZE: usize = 20;
pub const DEFAULT_MAX_FACE_SIZE: usize = 250;

/// Side length of the normalized face crop handed to the embedder.
pub const FACE_CROP_SIZE: usize = 100;

/// A student seen within this window counts as "currently detected".
pub const RECENT_DETECTION_WINDOW_SECS: i64 = 120;

pub const GALLERY_FORMAT_VERSION: u32 = 1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
