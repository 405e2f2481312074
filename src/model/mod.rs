pub mod attendance;
pub mod permission;
pub mod presence;
pub mod role;
pub mod summary;
pub mod zone;

/// Identity assigned by the surrounding user directory.
pub type UserId = String;

pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
