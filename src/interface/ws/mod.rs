pub mod message;
mod session;

pub use session::{ws_handler, WsSettings};
