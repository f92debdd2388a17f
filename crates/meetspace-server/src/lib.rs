pub mod broadcast;
pub mod connections;
pub mod lifecycle;
pub mod registry;
pub mod relay;
pub mod server;

pub use lifecycle::{ConnectionState, Inbound, Lifecycle};
pub use registry::PeerRegistry;
pub use server::{start, ServerConfig, ServerHandle};
