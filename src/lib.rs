// src/lib.rs
pub mod api;
pub mod banner;
pub mod config;
pub mod database;
pub mod documents;
pub mod errors;
pub mod models;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod runner;
