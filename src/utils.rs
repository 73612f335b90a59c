use chrono::Utc;
use uuid::Uuid;

/// Seconds since the Unix epoch, used for inode and superblock timestamps.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Random volume identifier for a freshly formatted image.
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}
