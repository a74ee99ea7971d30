pub mod config;
pub mod error;
pub mod shutdown;
pub mod worker;
