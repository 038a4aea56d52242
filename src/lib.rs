pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod service;
pub mod shutdown;
pub mod startup;
pub mod status;
pub mod utils;
