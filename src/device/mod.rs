pub mod btle;
pub mod codec;
pub mod connection;
pub mod constants;
pub mod mock;
pub mod session;
pub mod transport;
pub mod types;
