//! Transparent upstream interception.

pub mod detect;
pub mod extract;
pub mod handler;

pub use handler::proxy_handler;
