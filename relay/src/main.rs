use clap::{Parser, Subcommand};
use log::info;
use protocol::DEFAULT_PORT;
use relay::config::{RelayConfig, ServerConfig};
use relay::coordinator::Relay;
use relay::handlers::HandlerRegistry;
use relay::prober::query_status;
use relay::RelayError;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relays chat between game servers", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = "./config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the cross server chat (default)
    Start,
    /// Adds a server to the list of linked servers
    Add {
        /// Server IP address or hostname
        #[arg(short = 'H', long, default_value = "localhost")]
        host: String,
        /// Server port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Log file the server writes its console to
        #[arg(short, long)]
        filepath: PathBuf,
        /// RCON password of the server
        #[arg(short, long)]
        rcon_password: String,
    },
    /// Queries every configured server once and prints its status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    match args.command.unwrap_or(Command::Start) {
        Command::Start => start(&args.config).await?,
        Command::Add {
            host,
            port,
            filepath,
            rcon_password,
        } => {
            add_server(
                &args.config,
                ServerConfig {
                    host,
                    port,
                    filepath,
                    rcon_password,
                },
            )
            .await?
        }
        Command::Status => status(&args.config).await?,
    }

    Ok(())
}

async fn start(path: &Path) -> Result<(), RelayError> {
    let config = RelayConfig::load(path).await?;
    let relay = Relay::from_config(config, &HandlerRegistry::builtin())?;

    let handle = relay.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl+C: {}", e);
    }
    println!("Received Ctrl+C, shutting down...");

    handle.shutdown().await;
    Ok(())
}

async fn add_server(path: &Path, server: ServerConfig) -> Result<(), RelayError> {
    if !tokio::fs::try_exists(&server.filepath).await.unwrap_or(false) {
        return Err(RelayError::InvalidConfig(format!(
            "log file {} does not exist",
            server.filepath.display()
        )));
    }

    let mut config = RelayConfig::load_or_default(path).await?;
    let (host, port) = server.address();
    config.add_server(server)?;
    config.save(path).await?;

    info!("Saved {}", path.display());
    println!("Added server {}:{}", host, port);
    Ok(())
}

async fn status(path: &Path) -> Result<(), RelayError> {
    let config = RelayConfig::load(path).await?;

    for server in &config.servers {
        let (host, port) = server.address();
        match query_status(&host, port, config.timing.probe_timeout()).await {
            Ok(status) => {
                println!(
                    "{}:{}  {}  ({} players)",
                    host,
                    port,
                    status.hostname().unwrap_or("<unnamed>"),
                    status.players.len()
                );
                for player in &status.players {
                    println!("    {}", player);
                }
            }
            Err(e) => println!("{}:{}  unreachable: {}", host, port, e),
        }
    }

    Ok(())
}
