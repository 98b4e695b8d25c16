pub mod alerts;
pub mod api;
pub mod app;
pub mod classifier;
pub mod config;
pub mod display;
pub mod forwarder;
pub mod messages;
pub mod models;
pub mod outdoor;
pub mod persistence;
pub mod scheduler;
pub mod sensors;
pub mod singleton;
pub mod snapshot_cache;
pub mod telegram;
