pub mod api;
pub mod breaker;
pub mod config;
pub mod context;
pub mod db;
pub mod jobs;
pub mod model;
pub mod orchestrator;
pub mod settings;
