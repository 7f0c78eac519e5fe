use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;

/// Runtime configuration for the relay. Every knob is overridable from the
/// environment (or a `.env` file) as well as the command line.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Connection URL of the external session store
    #[arg(long, env, default_value = "redis://127.0.0.1:6379")]
    session_store_url: Option<String>,

    /// Name of the session cookie presented by browser clients
    #[arg(long, env, default_value = "sid")]
    pub session_cookie_name: String,

    /// Store key prefix under which session ids resolve to user ids
    #[arg(long, env, default_value = "session:")]
    pub session_key_prefix: String,

    /// Store key prefix under which hashed API keys resolve to key records
    #[arg(long, env, default_value = "apikey:")]
    pub api_key_prefix: String,

    /// The host interface to listen on for client stream connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: String,

    /// The host TCP port to listen on for client stream connections
    #[arg(short, long, env, default_value_t = 4800)]
    pub port: u16,

    /// The host interface to listen on for notification ingestion. Keep this
    /// on a loopback or otherwise internal interface: the ingest surface
    /// trusts its caller and is never exposed to browsers.
    #[arg(long, env, default_value = "127.0.0.1")]
    pub notify_interface: String,

    /// The host TCP port to listen on for notification ingestion
    #[arg(long, env, default_value_t = 4801)]
    pub notify_port: u16,

    /// Seconds between heartbeat comment frames on idle client streams
    #[arg(long, env, default_value_t = 60)]
    pub sse_keep_alive_secs: u64,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = parse_level_filter,
    )]
    pub log_level_filter: LevelFilter,
}

fn parse_level_filter(value: &str) -> Result<LevelFilter, String> {
    value
        .parse::<LevelFilter>()
        .map_err(|_| format!("invalid log level: {value}"))
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn session_store_url(&self) -> &str {
        self.session_store_url
            .as_ref()
            .expect("No session store URL provided")
    }

    pub fn set_session_store_url(mut self, session_store_url: String) -> Self {
        self.session_store_url = Some(session_store_url);
        self
    }
}
