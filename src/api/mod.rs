pub mod auth;
pub mod client_ip;
pub mod error;
pub mod routes;
pub mod server;
pub mod usage;
