pub mod auth;
pub mod config;
pub mod dto;
pub mod errors;
pub mod images;
pub mod models;
pub mod notifier;
pub mod routes;
pub mod state;
pub mod storage;
