pub mod attendance;
pub mod live;
pub mod permission;
pub mod presence;
pub mod report;
pub mod zone;
