// Library entry point for imgrank
// Exposes modules for testing and for the server binary

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;
