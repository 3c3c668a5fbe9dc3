mod directory;
mod errors;
mod lookup;
mod models;
mod storage;

pub use directory::SpeakerDirectory;
pub use errors::SpeakerError;
pub use lookup::{parse_user_info, SpeakerLookup, UserInfoClient};
pub use models::{Speaker, ANONYMOUS_NAME};
pub use storage::{SpeakerStore, SqliteSpeakerStore};
