pub mod apply;
pub mod cli;
pub mod config;
pub mod manager;
pub mod service;
pub mod store;
