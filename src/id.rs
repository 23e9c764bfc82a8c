use uuid::Uuid;

/// Client-side id for new records. Time ordered so ids sort by creation.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Ids supplied by callers must be canonical UUID strings.
pub fn is_valid_id(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}
