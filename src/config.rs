use std::env;

use crate::constants::*;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub session_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());

        port.parse::<u16>()
            .map_err(|_| format!("Invalid PORT value: {}", port))?;

        let data_path = env::var("DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());

        let session_secret =
            env::var("SESSION_SECRET").map_err(|_| "SESSION_SECRET must be set".to_string())?;

        if session_secret.len() < MIN_SESSION_SECRET_LENGTH {
            return Err(format!(
                "SESSION_SECRET must be at least {} characters",
                MIN_SESSION_SECRET_LENGTH
            ));
        }

        Ok(Self {
            host,
            port,
            data_path,
            session_secret,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
