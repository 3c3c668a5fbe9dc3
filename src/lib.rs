pub mod account;
pub mod config;
pub mod live;
pub mod logging;
pub mod speaker;
pub mod terminal;

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::account::Account;
use crate::config::Config;
use crate::live::{extract_live_id, LiveApi, LiveApiClient, SessionBootstrap};
use crate::speaker::{SpeakerDirectory, SqliteSpeakerStore, UserInfoClient};

pub struct KomeClients {
    pub account: Account,
    pub api: Arc<dyn LiveApi>,
    pub directory: Arc<SpeakerDirectory>,
}

/// Logs in (or reuses the stored session) and wires up the platform clients.
pub async fn init(config: &mut Config) -> Result<KomeClients, Box<dyn std::error::Error + Send + Sync>> {
    let mut account = Account::new(config.session.as_deref(), config.endpoints.clone())?;
    account.ensure_session(config).await?;

    let store = SqliteSpeakerStore::open(config.database_path())?;
    let remote = UserInfoClient::new(account.http(), config.endpoints.user_info.clone());
    let directory = Arc::new(SpeakerDirectory::new(Arc::new(store), Arc::new(remote)));

    let api: Arc<dyn LiveApi> = Arc::new(LiveApiClient::new(account.http(), config.endpoints.clone()));

    Ok(KomeClients {
        account,
        api,
        directory,
    })
}

/// Joins the live stream named by `live` and hands it to the terminal until the operator quits.
pub async fn run(
    clients: KomeClients,
    config: &Config,
    live: &str,
    handshake_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let live_id = extract_live_id(live)?;
    let bootstrap = SessionBootstrap::new(clients.api, clients.directory, config.comment_buffer);
    let (session, comments) = bootstrap.start(&live_id, handshake_timeout).await?;

    terminal::run(Arc::new(session), comments).await;
    info!("Left {}", live_id);
    Ok(())
}
