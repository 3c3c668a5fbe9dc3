use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::speaker::errors::SpeakerError;
use crate::speaker::models::Speaker;

/// Display name the platform returns for ids that have no public profile.
const MISSING_NAME_SENTINEL: &str = "-";

/// Remote tier of the speaker directory.
#[async_trait]
pub trait SpeakerLookup: Send + Sync {
    async fn lookup(&self, id: i64) -> Result<Speaker, SpeakerError>;
}

pub struct UserInfoClient {
    client: Client,
    endpoint: String,
}

impl UserInfoClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SpeakerLookup for UserInfoClient {
    async fn lookup(&self, id: i64) -> Result<Speaker, SpeakerError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id", id)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!("User info response for {}: {} bytes", id, body.len());
        parse_user_info(id, &body)
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(rename = "@status", default)]
    status: Option<String>,
    #[serde(default)]
    user: Option<UserBlock>,
}

#[derive(Debug, Deserialize)]
struct UserBlock {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    nickname: Option<String>,
}

/// Decodes a user info document, mapping every "no such user" shape to `NotFound`.
pub fn parse_user_info(id: i64, body: &str) -> Result<Speaker, SpeakerError> {
    let response: UserInfoResponse =
        quick_xml::de::from_str(body).map_err(|e| SpeakerError::Parse(e.to_string()))?;

    if matches!(response.status.as_deref(), Some(status) if status != "ok") {
        return Err(SpeakerError::NotFound(id));
    }

    let user = response.user.ok_or(SpeakerError::NotFound(id))?;
    match (user.id, user.nickname) {
        (Some(found), Some(name)) if found == id && name != MISSING_NAME_SENTINEL => {
            Ok(Speaker::new(id, name))
        }
        _ => Err(SpeakerError::NotFound(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registered_user() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<response><user><id>12345</id><nickname>alice</nickname></user></response>"#;

        assert_eq!(parse_user_info(12345, body).unwrap(), Speaker::new(12345, "alice"));
    }

    #[test]
    fn accepts_status_attribute() {
        let body = r#"<nicovideo_user_response status="ok"><user><id>9</id><nickname>bob</nickname></user></nicovideo_user_response>"#;

        assert_eq!(parse_user_info(9, body).unwrap().name, "bob");
    }

    #[test]
    fn sentinel_name_is_not_found() {
        let body = "<response><user><id>12345</id><nickname>-</nickname></user></response>";

        assert!(matches!(parse_user_info(12345, body), Err(SpeakerError::NotFound(12345))));
    }

    #[test]
    fn id_mismatch_is_not_found() {
        let body = "<response><user><id>1</id><nickname>alice</nickname></user></response>";

        assert!(matches!(parse_user_info(2, body), Err(SpeakerError::NotFound(2))));
    }

    #[test]
    fn failed_status_is_not_found() {
        let body = r#"<nicovideo_user_response status="fail"><error><code>NOT_FOUND</code></error></nicovideo_user_response>"#;

        assert!(matches!(parse_user_info(5, body), Err(SpeakerError::NotFound(5))));
    }
}
