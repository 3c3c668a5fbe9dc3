use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use crate::config::Endpoints;
use crate::live::errors::LiveError;
use crate::live::models::{RelayInfo, StreamInfo, StreamStatus, ViewerInfo};

/// Width of the fixed prefix in front of every post key body.
pub const POST_KEY_PREFIX_LEN: usize = 8;

/// The HTTP endpoints a live session depends on.
#[async_trait]
pub trait LiveApi: Send + Sync {
    async fn player_status(&self, live_id: &str) -> Result<StreamStatus, LiveError>;
    async fn post_key(&self, thread: i64, block: i64) -> Result<String, LiveError>;
}

pub struct LiveApiClient {
    client: Client,
    endpoints: Endpoints,
}

impl LiveApiClient {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl LiveApi for LiveApiClient {
    async fn player_status(&self, live_id: &str) -> Result<StreamStatus, LiveError> {
        let body = self
            .client
            .get(&self.endpoints.player_status)
            .query(&[("v", live_id)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let status = parse_player_status(&body)?;
        info!(
            "Player status for {}: \"{}\" on {} thread {}",
            live_id,
            status.stream.title,
            status.relay.endpoint(),
            status.relay.thread
        );
        Ok(status)
    }

    async fn post_key(&self, thread: i64, block: i64) -> Result<String, LiveError> {
        let body = self
            .client
            .get(&self.endpoints.post_key)
            .query(&[("thread", thread), ("block_no", block)])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        debug!("Post key response for thread {} block {}: {} bytes", thread, block, body.len());
        trim_post_key(&body)
    }
}

/// Drops the fixed-width prefix of a post key response.
pub fn trim_post_key(body: &[u8]) -> Result<String, LiveError> {
    if body.len() < POST_KEY_PREFIX_LEN {
        return Err(LiveError::PostKey(format!(
            "response is {} bytes, expected at least {}",
            body.len(),
            POST_KEY_PREFIX_LEN
        )));
    }

    String::from_utf8(body[POST_KEY_PREFIX_LEN..].to_vec())
        .map_err(|e| LiveError::PostKey(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct PlayerStatusDocument {
    #[serde(rename = "@status")]
    status: String,
    #[serde(default)]
    error: Option<ErrorBlock>,
    #[serde(default)]
    stream: StreamBlock,
    #[serde(default)]
    user: UserBlock,
    #[serde(default)]
    ms: MessageServerBlock,
}

#[derive(Debug, Deserialize)]
struct ErrorBlock {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamBlock {
    title: String,
    description: String,
    default_community: String,
    owner_id: i64,
    owner_name: String,
    start_time: i64,
    end_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserBlock {
    user_id: String,
    nickname: String,
    is_premium: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageServerBlock {
    addr: String,
    port: u16,
    thread: i64,
}

/// Decodes a player status document; anything but `status="ok"` is an error.
pub fn parse_player_status(body: &str) -> Result<StreamStatus, LiveError> {
    let doc: PlayerStatusDocument =
        quick_xml::de::from_str(body).map_err(|e| LiveError::StatusParse(e.to_string()))?;

    if doc.status != "ok" {
        return Err(LiveError::StatusNotOk {
            status: doc.status,
            code: doc.error.map(|e| e.code).unwrap_or_else(|| "unknown".to_string()),
        });
    }

    Ok(StreamStatus {
        stream: StreamInfo {
            title: doc.stream.title,
            description: doc.stream.description,
            community: doc.stream.default_community,
            owner_id: doc.stream.owner_id,
            owner_name: doc.stream.owner_name,
            start_time: doc.stream.start_time,
            end_time: doc.stream.end_time,
        },
        viewer: ViewerInfo {
            user_id: doc.user.user_id,
            name: doc.user.nickname,
            premium: doc.user.is_premium,
        },
        relay: RelayInfo {
            addr: doc.ms.addr,
            port: doc.ms.port,
            thread: doc.ms.thread,
        },
    })
}
