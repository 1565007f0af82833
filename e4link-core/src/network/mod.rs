pub mod connection;

pub use connection::{Connection, ConnectionInfo, ConnectionSender, DEFAULT_PORT};
