pub mod config;
pub mod connectors;
pub mod credentials;
pub mod database;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod utils;
pub mod web;
