pub mod agent;
pub mod backend;
pub mod config;
mod config_env;
pub mod connection_cache;
pub mod database;
pub mod dispatcher;
pub mod llm;
pub mod models;
pub mod session;
