//! parley CLI: run the chat relay proxy or talk to it

use clap::{Args, Parser, Subcommand};
use parley_engine::{ClientConfig, ProxyClient, ProxyConfig};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "parley=info";

/// Log file written in the temp dir while the TUI owns the terminal.
const LOG_FILE_NAME: &str = "parley.log";

/// Names a `KEY=value` file to load instead of searching for `.env`.
const ENV_FILE_VAR: &str = "PARLEY_ENV_FILE";

/// Minimal chat relay: an API proxy and a terminal client
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the proxy (for `chat` and `send`)
    #[arg(long, global = true, env = "PARLEY_PROXY_URL")]
    proxy_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy that forwards messages to the upstream API
    Serve(ServeArgs),

    /// Open the chat TUI (default when no command specified)
    Chat,

    /// Send one message through the proxy and print the reply
    Send {
        /// Message text
        message: String,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// JSON config file; flags and env vars override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "PARLEY_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Upstream chat-completion endpoint
    #[arg(long, env = "PARLEY_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Model identifier sent upstream
    #[arg(long, env = "PARLEY_MODEL")]
    model: Option<String>,

    /// Maximum output length sent upstream
    #[arg(long, env = "PARLEY_MAX_TOKENS")]
    max_tokens: Option<u32>,
}

impl ServeArgs {
    /// Load the config file (or defaults) and apply overrides.
    fn resolve(self) -> Result<ProxyConfig, parley_engine::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(upstream_url) = self.upstream_url {
            config.upstream_url = upstream_url;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }

        Ok(config)
    }
}

fn main() {
    // Before parsing, so `.env` can feed the `PARLEY_*` flags too.
    let env_file = std::env::var_os(ENV_FILE_VAR).map(PathBuf::from);
    let loaded = load_dotenv(env_file.as_deref());

    let cli = Cli::parse();

    let tui_mode = matches!(cli.command, None | Some(Commands::Chat));
    init_tracing(tui_mode);
    if let Some(path) = loaded {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client_config = client_config(cli.proxy_url);

    match cli.command {
        None | Some(Commands::Chat) => parley_tui::run_tui(&client_config).await,
        Some(Commands::Serve(args)) => cmd_serve(args).await,
        Some(Commands::Send { message }) => cmd_send(&client_config, &message).await,
    }
}

async fn cmd_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.resolve()?;
    // Refuse to start without a credential.
    let api_key = ProxyConfig::api_key_from_env()?;

    parley_engine::serve(&config, &api_key, shutdown_signal()).await?;
    Ok(())
}

async fn cmd_send(config: &ClientConfig, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = ProxyClient::new(config);
    let reply = client.send(message).await?;
    println!("{}", reply.content);
    Ok(())
}

fn client_config(proxy_url: Option<String>) -> ClientConfig {
    match proxy_url {
        Some(proxy_url) => ClientConfig { proxy_url },
        None => ClientConfig::default(),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Load `KEY=value` pairs into the process environment.
///
/// Reads `path` when given, otherwise the first `.env` found in the working
/// directory or its parents. Variables already set are not overridden. A
/// missing file is not an error.
fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    let result = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match result {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => {
            eprintln!("Warning: cannot load environment file: {e}");
            None
        }
    }
}

/// Install the fmt subscriber. In TUI mode logs go to a file so they do not
/// draw over the screen.
fn init_tracing(to_file: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if !to_file {
        builder.with_writer(std::io::stderr).init();
        return;
    }

    let path = std::env::temp_dir().join(LOG_FILE_NAME);
    match open_log_file(&path) {
        Ok(file) => builder
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init(),
        Err(e) => {
            // Printed before the TUI takes the screen; logging is off after.
            eprintln!("Warning: cannot open log file {}: {e}", path.display());
            builder.with_writer(io::sink).init();
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command_means_chat() {
        let cli = Cli::try_parse_from(["parley"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_send_takes_message_and_proxy_url() {
        let cli =
            Cli::try_parse_from(["parley", "send", "Hello", "--proxy-url", "http://proxy:9000"])
                .unwrap();

        assert_eq!(cli.proxy_url.as_deref(), Some("http://proxy:9000"));
        match cli.command {
            Some(Commands::Send { message }) => assert_eq!(message, "Hello"),
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_serve_flags_override_defaults() {
        let args = ServeArgs {
            listen_addr: Some("0.0.0.0:8080".into()),
            max_tokens: Some(256),
            ..ServeArgs::default()
        };

        let config = args.resolve().unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.model, ProxyConfig::default().model);
    }

    #[test]
    fn test_serve_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        let file_config = ProxyConfig {
            model: "from-file".into(),
            max_tokens: 42,
            ..ProxyConfig::default()
        };
        file_config.save(&path).unwrap();

        let args = ServeArgs {
            config: Some(path),
            model: Some("from-flag".into()),
            ..ServeArgs::default()
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.model, "from-flag");
        assert_eq!(config.max_tokens, 42);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = ServeArgs {
            config: Some(PathBuf::from("/nonexistent/parley/proxy.json")),
            ..ServeArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_client_config_falls_back_to_default() {
        assert_eq!(
            client_config(None).proxy_url,
            ClientConfig::default().proxy_url
        );
        assert_eq!(client_config(Some("http://x".into())).proxy_url, "http://x");
    }

    #[test]
    fn test_env_file_supplies_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "API_KEY=sk-from-env-file\n").unwrap();
        std::env::remove_var(parley_engine::API_KEY_ENV);

        assert_eq!(load_dotenv(Some(&path)), Some(path.clone()));
        assert_eq!(ProxyConfig::api_key_from_env().unwrap(), "sk-from-env-file");

        std::env::remove_var(parley_engine::API_KEY_ENV);
    }

    #[test]
    fn test_missing_env_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_dotenv(Some(&dir.path().join(".env"))), None);
    }

    #[test]
    fn test_open_log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);

        std::fs::write(&path, "first\n").unwrap();
        {
            use std::io::Write;
            let mut file = open_log_file(&path).unwrap();
            file.write_all(b"second\n").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_reports_bad_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(LOG_FILE_NAME);
        assert!(open_log_file(&path).is_err());
    }
}
