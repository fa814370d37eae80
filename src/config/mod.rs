pub mod infra;

pub use infra::InfraConfig;
