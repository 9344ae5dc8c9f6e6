//! Application constants

/// Separates the live-display section of a model reply from its JSON section
pub const REPORT_DELIMITER: &str = "---REPORT---";

/// Prefix attached to captured frames embedded in analysis results
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Maximum upload size for frames and report videos (200 MB)
pub const MAX_UPLOAD_SIZE: usize = 200 * 1024 * 1024;

/// Default page size for detection history
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for detection history
pub const MAX_PAGE_SIZE: i64 = 100;

/// Camera name used when a save request omits one
pub const DEFAULT_CAMERA_NAME: &str = "Live Camera";

/// Key value shipped in sample env files; treated as unset
pub const PLACEHOLDER_API_KEY: &str = "your-gemini-api-key-here";
