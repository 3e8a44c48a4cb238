pub mod app;
pub mod auth;
pub mod calendar;
pub mod client;
pub mod config;
pub mod entries;
pub mod error;
pub mod export;
pub mod photos;
pub mod state;
pub mod storage;
