//! Minimal Chrome DevTools Protocol client

pub mod connection;
pub mod transport;
pub mod types;

pub use connection::{Connection, Session};
pub use transport::Transport;
pub use types::{MouseButton, MouseEventType};
