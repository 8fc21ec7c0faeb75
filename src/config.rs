use std::path::{Path, PathBuf};

/// Runtime configuration, collected from the environment once at startup.
/// `.env` is loaded by `main` before this runs.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub history_limit: i64,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("AGORA_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        // Default to ~/.agora/agora.db like a well-behaved daemon.
        let db_path = std::env::var("AGORA_DB").map(PathBuf::from).unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            Path::new(&home).join(".agora").join("agora.db")
        });

        let history_limit = std::env::var("AGORA_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        Self {
            port,
            db_path,
            history_limit,
        }
    }
}
