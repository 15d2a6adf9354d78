pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod mpris;
pub mod resolver;
pub mod runtime;
pub mod store;
