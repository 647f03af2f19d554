pub mod app;
pub mod auth;
pub mod config;
pub mod debounce;
pub mod error;
pub mod favorites;
pub mod listing;
pub mod models;
pub mod omdb;
pub mod storage;
pub mod theme;
