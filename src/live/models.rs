use serde::{Deserialize, Serialize};

use crate::speaker::Speaker;

/// Stream metadata fetched once before connecting to the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub stream: StreamInfo,
    pub viewer: ViewerInfo,
    pub relay: RelayInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub title: String,
    pub description: String,
    pub community: String,
    pub owner_id: i64,
    pub owner_name: String,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerInfo {
    pub user_id: String,
    pub name: String,
    pub premium: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfo {
    pub addr: String,
    pub port: u16,
    pub thread: i64,
}

impl RelayInfo {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// The relay's answer to the thread request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadHandshakeAck {
    pub result_code: i32,
    pub last_res: i64,
    pub ticket: String,
    pub server_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub thread: i64,
    pub no: i64,
    pub vpos: i64,
    pub date: i64,
    pub user_id: String,
    pub premium: i32,
    pub anonymity: bool,
    pub mail: String,
    pub ticket: String,
    pub post_key: Option<String>,
    /// Escaped body exactly as it appeared on the wire.
    pub body: String,
    /// Filled in after decode; never encoded back onto the wire.
    pub speaker: Option<Speaker>,
}

impl Comment {
    pub fn is_anonymous(&self) -> bool {
        match &self.speaker {
            Some(speaker) => !speaker.registered,
            None => self.anonymity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostAcknowledgement {
    pub status: i32,
    pub no: i64,
}

/// One complete inbound fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Handshake(ThreadHandshakeAck),
    Comment(Comment),
    PostAck(PostAcknowledgement),
}

/// Thread subscription sent right after dialing the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRequest {
    pub thread: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingComment {
    pub thread: i64,
    pub ticket: String,
    pub vpos: i64,
    pub post_key: String,
    pub user_id: String,
    pub premium: i32,
    pub mail: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Thread(ThreadRequest),
    Comment(OutgoingComment),
}

impl From<ThreadRequest> for Outbound {
    fn from(request: ThreadRequest) -> Self {
        Outbound::Thread(request)
    }
}

impl From<OutgoingComment> for Outbound {
    fn from(comment: OutgoingComment) -> Self {
        Outbound::Comment(comment)
    }
}
