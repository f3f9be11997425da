// Adapters implementing the app ports
pub mod cache_store;
pub mod credential;
pub mod http_client;
