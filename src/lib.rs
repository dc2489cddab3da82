pub mod api;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod invoice;
