pub mod backend_client;
pub mod chat_relay;
pub mod metrics;
