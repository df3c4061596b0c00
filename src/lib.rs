pub mod application;
pub mod config;
pub mod infra;
