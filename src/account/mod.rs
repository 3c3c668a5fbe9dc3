mod client;
mod errors;

pub use client::{find_session_cookie, parse_heartbeat, Account};
pub use errors::AccountError;
