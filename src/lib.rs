pub mod analytics;
pub mod cities;
pub mod config;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod forecast;
pub mod labels;
pub mod ml;
pub mod models;
pub mod online;
pub mod parser;
pub mod predict;
pub mod scheduler;
pub mod store;
pub mod trainer;
