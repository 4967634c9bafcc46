pub mod daemon;
pub mod health;
pub mod version;
pub mod volume;

pub use daemon::Daemon;
pub use health::Health;
pub use version::Version;
pub use volume::Volume;
