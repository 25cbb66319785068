use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info};
use tokio::net::TcpListener;

use flowgate::api::views::{PingView, ViewRegistry};
use flowgate::api::{self, AppState};
use flowgate::auth::MemorySessionStore;
use flowgate::bus::BusManager;
use flowgate::config::AppConfig;
use flowgate::registry::ConnectionRegistry;

const APP_NAME: &str = "flowgate";

#[derive(Debug, Parser)]
#[command(
    name = APP_NAME,
    about = "WebSocket bridge between browser sessions and the workflow worker bus",
    version
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Configuration directory (defaults to the platform config dir).
    #[arg(long, global = true, env = "FLOWGATE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Suppress all output.
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bridge server.
    Serve(ServeCommand),
    /// Inspect or initialize the configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Listen host override.
    #[arg(long)]
    host: Option<String>,

    /// Listen port override.
    #[arg(long)]
    port: Option<u16>,

    /// Worker bus URL override.
    #[arg(long)]
    bus_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration as TOML.
    Show,
    /// Write the default configuration file if missing.
    Init,
    /// Print the configuration file path.
    Path,
}

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config file: {}", ctx.paths.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

#[derive(Debug)]
struct AppPaths {
    config_file: PathBuf,
}

struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_dir = match &common.config_dir {
            Some(dir) => expand_path(dir.clone())?,
            None => default_config_dir()?,
        };
        let paths = AppPaths {
            config_file: config_dir.join("config.toml"),
        };
        let config = load_or_init_config(&paths)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn effective_log_level(&self) -> LevelFilter {
        let level = self
            .common
            .log_level
            .as_deref()
            .unwrap_or(&self.config.logging.level);
        match level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("flowgate={level},tower_http={level}")));

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let disable_color = env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(!disable_color))
                .try_init()
                .ok();
        }

        // log-crate compatibility for dependencies that have not moved to
        // tracing.
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting flowgate bridge...");

    let mut config = ctx.config.clone();
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if let Some(bus_url) = cmd.bus_url {
        config.bus.url = bus_url;
    }

    let sessions = Arc::new(MemorySessionStore::new());

    let (bus, manager) = BusManager::new(config.bus.clone());
    let registry = Arc::new(ConnectionRegistry::new(bus.clone()));
    tokio::spawn(manager.run(registry.clone()));
    info!("Bus manager started for {}", config.bus.url);

    let views = ViewRegistry::builder()
        .register("ping", Arc::new(PingView))
        .build();

    let state = AppState::new(registry, bus, sessions, views, config.clone());
    let router = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on http://{addr} (duplex endpoint at /ws)");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(&ctx.config)?;
            print!("{toml}");
            Ok(())
        }
        ConfigCommand::Init => {
            if ctx.paths.config_file.exists() {
                info!(
                    "config file already exists at {}",
                    ctx.paths.config_file.display()
                );
            } else {
                write_default_config(&ctx.paths.config_file)?;
                info!(
                    "wrote default config to {}",
                    ctx.paths.config_file.display()
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
    }
}

fn load_or_init_config(paths: &AppPaths) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        write_default_config(&paths.config_file)?;
    }

    let built = Config::builder()
        .set_default("debug", false)?
        .set_default("logging.level", "info")?
        .add_source(
            File::from(paths.config_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("FLOWGATE").separator("__"))
        .build()?;

    let config: AppConfig = built.try_deserialize()?;
    Ok(config)
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push('\n');
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path)
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}
