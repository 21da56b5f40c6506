//! Server configuration (CLI flags with environment fallbacks).

use clap::Parser;

/// Name of the shared broadcast channel unless overridden.
pub const DEFAULT_GROUP: &str = "FamilyChat";

#[derive(Debug, Clone, Parser)]
#[command(name = "familychat-server", about = "Family chat server")]
pub struct ServerConfig {
    /// Address for the HTTP/WebSocket listener.
    #[arg(long, env = "FAMILYCHAT_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_addr: String,

    /// JSON file holding the full message history.
    #[arg(long, env = "FAMILYCHAT_MESSAGES", default_value = "messages.json")]
    pub messages_path: String,

    /// JSON file listing known users (`username`, `password`, `user_phone`).
    #[arg(long, env = "FAMILYCHAT_USERS", default_value = "users.json")]
    pub users_path: String,

    /// Identity of the group channel every connected user receives.
    #[arg(long, default_value = DEFAULT_GROUP)]
    pub group_name: String,

    /// Secret used to sign session cookies. A random one is generated if unset,
    /// which invalidates all sessions on restart.
    #[arg(long, env = "FAMILYCHAT_SESSION_SECRET")]
    pub session_secret: Option<String>,

    /// Mark session cookies `Secure` (set when served behind HTTPS).
    #[arg(long)]
    pub secure_cookies: bool,

    /// Directory of static pages to serve as a fallback (login, chat UI).
    #[arg(long)]
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            messages_path: "messages.json".to_string(),
            users_path: "users.json".to_string(),
            group_name: DEFAULT_GROUP.to_string(),
            session_secret: None,
            secure_cookies: false,
            static_dir: None,
        }
    }
}
