pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod files;
pub mod limiter;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;
