pub mod config;
pub mod hardware;
pub mod runner;
