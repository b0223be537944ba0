pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod grouping;
pub mod models;
pub mod services;
pub mod tasks;
