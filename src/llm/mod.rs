pub mod azure;
pub mod provider;
pub mod types;
