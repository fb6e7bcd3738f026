pub mod app;
pub mod auth;
pub mod chat;
pub mod metrics;
pub mod proxy;
