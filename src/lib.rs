pub mod commands;
pub mod config;
pub mod convert;
pub mod hub;
pub mod models;
pub mod output;
