pub mod app_state;
pub mod config;
pub mod driver;
pub mod files;
pub mod hashing;
pub mod jobs;
pub mod service;
