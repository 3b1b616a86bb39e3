use std::path::PathBuf;

use crate::importer::SqliteStore;

/// Prefix of the keys holding Cursor composer (chat) sessions.
pub const DEFAULT_KEY_PREFIX: &str = "composerData:";

/// Everything one load needs.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub db_path: PathBuf,
    /// Empty means "all keys".
    pub key_prefix: String,
    pub snapshot: bool,
}

impl LoadConfig {
    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(&self.db_path).with_snapshot(self.snapshot)
    }
}

/// Cursor's global state database for the current user.
///
/// `config_dir` is `~/Library/Application Support` on macOS, `$XDG_CONFIG_HOME` on Linux
/// and `%APPDATA%` on Windows, which is where Cursor keeps its `User` directory.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Cursor/User/globalStorage/state.vscdb"))
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cursor-chat-export/config.toml"))
}
