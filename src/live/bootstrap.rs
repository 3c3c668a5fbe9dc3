use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::info;
use regex::Regex;
use tokio::sync::mpsc;

use crate::live::api::LiveApi;
use crate::live::errors::LiveError;
use crate::live::models::Comment;
use crate::live::session::LiveSession;
use crate::speaker::SpeakerDirectory;

static LIVE_ID: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"lv[0-9]+"));

/// Finds the `lv<digits>` id in a watch URL or a bare id.
pub fn extract_live_id(arg: &str) -> Result<String, LiveError> {
    let pattern = LIVE_ID
        .as_ref()
        .map_err(|e| LiveError::InvalidLiveId(format!("{} ({})", arg, e)))?;
    pattern
        .find(arg)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| LiveError::InvalidLiveId(arg.to_string()))
}

/// Fetches stream metadata and brings a [`LiveSession`] up to streaming.
pub struct SessionBootstrap {
    api: Arc<dyn LiveApi>,
    directory: Arc<SpeakerDirectory>,
    capacity: usize,
}

impl SessionBootstrap {
    pub fn new(api: Arc<dyn LiveApi>, directory: Arc<SpeakerDirectory>, capacity: usize) -> Self {
        Self {
            api,
            directory,
            capacity,
        }
    }

    pub async fn start(
        &self,
        live_id: &str,
        timeout: Duration,
    ) -> Result<(LiveSession, mpsc::Receiver<Comment>), LiveError> {
        let status = self.api.player_status(live_id).await?;

        let mut session = LiveSession::new(
            live_id,
            status,
            Arc::clone(&self.api),
            Arc::clone(&self.directory),
            self.capacity,
        );
        let comments = session.connect(timeout).await?;
        info!("Live session {} is streaming", live_id);

        Ok((session, comments))
    }
}
