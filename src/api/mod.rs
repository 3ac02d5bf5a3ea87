//! API layer for bapvault
//!
//! Provides:
//! - JSON request/response messages
//! - Request dispatch onto the broker
//! - Native-messaging framing over stdin/stdout

pub mod handler;
pub mod messages;
pub mod native;

pub use handler::RequestHandler;
pub use messages::{WalletRequest, WireError, WireResponse};
pub use native::{read_frame, serve, write_frame};
