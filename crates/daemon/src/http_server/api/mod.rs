pub mod client;
pub mod driver;
