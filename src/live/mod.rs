pub mod api;
pub mod bootstrap;
pub mod codec;
mod errors;
pub mod models;
pub mod position;
pub mod session;

pub use api::{LiveApi, LiveApiClient};
pub use bootstrap::{extract_live_id, SessionBootstrap};
pub use codec::StreamCodec;
pub use errors::{CodecError, LiveError};
pub use models::{Comment, Element, PostAcknowledgement, StreamStatus, ThreadHandshakeAck};
pub use session::{LiveSession, SessionState};
