use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogLevel;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to read input: {0}")]
    Prompt(#[source] io::Error),
}

/// Platform URLs used by the client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub player_status: String,
    pub post_key: String,
    pub user_info: String,
    pub login: String,
    pub heartbeat: String,
    pub cookie_domain: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            player_status: "http://watch.live.nicovideo.jp/api/getplayerstatus".to_string(),
            post_key: "http://live.nicovideo.jp/api/getpostkey".to_string(),
            user_info: "http://seiga.nicovideo.jp/api/user/info".to_string(),
            login: "https://secure.nicovideo.jp/secure/login?site=nicolive".to_string(),
            heartbeat: "http://live.nicovideo.jp/api/heartbeat".to_string(),
            cookie_domain: "http://nicovideo.jp".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub mail: Option<String>,
    pub password: Option<String>,
    pub session: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_comment_buffer")]
    pub comment_buffer: usize,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(skip)]
    dir: PathBuf,
}

fn default_handshake_timeout() -> u64 {
    5
}

fn default_comment_buffer() -> usize {
    1024
}

fn default_database() -> String {
    "user.sqlite".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mail: None,
            password: None,
            session: None,
            log_level: LogLevel::default(),
            handshake_timeout_secs: default_handshake_timeout(),
            comment_buffer: default_comment_buffer(),
            database: default_database(),
            endpoints: Endpoints::default(),
            dir: PathBuf::new(),
        }
    }
}

impl Config {
    const FILE_NAME: &'static str = "kome.conf";

    /// `$HOME/.config/kome`, or `.kome` when no home directory is set.
    pub fn default_dir() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".config").join("kome"),
            None => PathBuf::from(".kome"),
        }
    }

    /// Reads `kome.conf` from `dir`, writing a default one on first run.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            let config = Config {
                dir,
                ..Default::default()
            };
            config.save()?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw)?;
        config.dir = dir;
        Ok(config)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.dir.join(&self.database)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("kome.log")
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let toml = toml::to_string(self)?;
        let path = self.path();
        fs::write(&path, toml).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn set_session(&mut self, session: String) -> Result<(), ConfigError> {
        self.session = Some(session);
        self.save()
    }

    pub fn has_credentials(&self) -> bool {
        self.mail.is_some() && self.password.is_some()
    }

    pub fn prompt_for_missing_fields(&mut self) -> Result<(), ConfigError> {
        if self.has_credentials() {
            return Ok(());
        }

        if self.mail.is_none() {
            self.mail = Some(Self::prompt_input("Mail address: ")?);
        }
        if self.password.is_none() {
            print!("Password: ");
            io::stdout().flush().map_err(ConfigError::Prompt)?;
            self.password = Some(rpassword::read_password().map_err(ConfigError::Prompt)?);
        }

        self.save()
    }

    fn prompt_input(prompt: &str) -> Result<String, ConfigError> {
        print!("{}", prompt);
        io::stdout().flush().map_err(ConfigError::Prompt)?;
        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(ConfigError::Prompt)?;
        Ok(input.trim().to_string())
    }
}
