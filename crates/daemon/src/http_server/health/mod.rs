pub mod liveness;
pub mod version;
