// Main entry point for the application

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use udpstream::client::{status_channel, Client, StatusEvent};
use udpstream::common::config::{ClientConfig, ConfigFile, ServerConfig};
use udpstream::server::Server;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "udpstream")]
#[command(about = "Stream files over UDP with playback-ready buffering", long_about = None)]
struct Cli {
    /// JSON config file; command-line flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve files from a directory
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Request one file and write it locally
    Fetch {
        /// File to request
        name: String,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Read filenames from stdin and stream each one, printing status lines
    Console {
        #[command(flatten)]
        client: ClientArgs,

        /// Also run a server in this process
        #[arg(long)]
        with_server: bool,

        #[command(flatten)]
        server: ServerArgs,
    },
}

#[derive(Args)]
struct ServerArgs {
    /// Bind address (default: 0.0.0.0:9999)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory requested names are resolved against (default: .)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Maximum concurrent transfer sessions
    #[arg(long)]
    workers: Option<usize>,

    /// Requests queued beyond the active sessions before new ones are refused
    #[arg(long)]
    backlog: Option<usize>,

    /// Smallest chunk size in bytes
    #[arg(long)]
    min_chunk: Option<usize>,

    /// Largest chunk size in bytes
    #[arg(long)]
    max_chunk: Option<usize>,

    /// Delay between chunks in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,
}

#[derive(Args)]
struct ClientArgs {
    /// Server address (default: 127.0.0.1:9999)
    #[arg(long)]
    server_addr: Option<SocketAddr>,

    /// Directory for received files (default: .)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Bytes to buffer before announcing playback-ready
    #[arg(long)]
    threshold: Option<u64>,

    /// How long to wait for the server's first reply, in milliseconds
    #[arg(long)]
    control_timeout_ms: Option<u64>,

    /// How long to wait between chunks, in milliseconds
    #[arg(long)]
    chunk_timeout_ms: Option<u64>,
}

impl ServerArgs {
    fn apply(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(root) = &self.root {
            config = config.with_root_dir(root.clone());
        }
        if let Some(workers) = self.workers {
            config = config.with_max_sessions(workers)?;
        }
        if let Some(backlog) = self.backlog {
            config = config.with_backlog(backlog)?;
        }
        if self.min_chunk.is_some() || self.max_chunk.is_some() {
            let min = self.min_chunk.unwrap_or(config.min_chunk);
            let max = self.max_chunk.unwrap_or(config.max_chunk);
            config = config.with_chunk_bounds(min, max)?;
        }
        if let Some(ms) = self.pacing_ms {
            config = config.with_pacing(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

impl ClientArgs {
    fn apply(&self, mut config: ClientConfig) -> Result<ClientConfig> {
        if let Some(addr) = self.server_addr {
            config.server_addr = addr;
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir.clone());
        }
        if let Some(threshold) = self.threshold {
            config = config.with_playback_threshold(threshold);
        }
        if let Some(ms) = self.control_timeout_ms {
            config = config.with_control_timeout(Duration::from_millis(ms))?;
        }
        if let Some(ms) = self.chunk_timeout_ms {
            config = config.with_chunk_timeout(Duration::from_millis(ms))?;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    match cli.command {
        Commands::Serve { server } => {
            let config = server.apply(file.server_config()?)?;
            run_server(config)?;
        }

        Commands::Fetch { name, client } => {
            let config = client.apply(file.client_config()?)?;
            run_fetch(config, &name)?;
        }

        Commands::Console { client, with_server, server } => {
            let client_config = client.apply(file.client_config()?)?;
            let server_config = if with_server {
                Some(server.apply(file.server_config()?)?)
            } else {
                None
            };
            run_console(client_config, server_config)?;
        }
    }

    Ok(())
}

fn run_server(config: ServerConfig) -> Result<()> {
    println!("=== UDP Streaming Server ===\n");
    println!("Server Configuration:");
    println!("  Address: {}", config.bind_addr);
    println!("  Root: {:?}", config.root_dir);
    println!("  Chunk size: {}..={} bytes", config.min_chunk, config.max_chunk);
    println!("  Pacing: {}ms", config.pacing.as_millis());
    println!("  Sessions: {} (backlog {})", config.max_sessions, config.backlog);

    let server = Server::bind(config)?;
    println!("\nListening on {}", server.local_addr()?);
    println!("Press Ctrl+C to stop\n");

    server.run()?;
    Ok(())
}

fn run_fetch(config: ClientConfig, name: &str) -> Result<()> {
    let client = Client::new(config);
    let (tx, rx) = status_channel();
    let handle = client.spawn_fetch(name.to_string(), tx);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    for event in rx.iter() {
        match &event {
            StatusEvent::Progress { .. } => spinner.set_message(event.to_string()),
            e if e.is_terminal() => spinner.finish_with_message(event.to_string()),
            _ => spinner.println(event.to_string()),
        }
    }

    match handle.join() {
        Ok(Ok(summary)) => {
            println!("  Output: {:?}", summary.output_path);
            println!("  Bytes: {} in {} chunks", summary.bytes, summary.chunks);
            println!("  BLAKE3: {}", summary.digest);
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("fetch thread panicked".into()),
    }
}

fn run_console(client_config: ClientConfig, server_config: Option<ServerConfig>) -> Result<()> {
    let mut server_thread = None;
    if let Some(config) = server_config {
        let server = Server::bind(config)?;
        println!("Embedded server listening on {}", server.local_addr()?);
        let shutdown = server.shutdown_handle();
        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || server.run())?;
        server_thread = Some((shutdown, handle));
    }

    let client = Client::new(client_config);
    let (tx, rx) = status_channel();

    let printer = thread::Builder::new()
        .name("status".to_string())
        .spawn(move || {
            for event in rx.iter() {
                println!("{}", event);
            }
        })?;

    println!("System: Enter the multimedia filename (e.g., 18.mp4). Ctrl+D to quit.");

    let mut fetches = Vec::new();
    for line in io::stdin().lock().lines() {
        let name = line?.trim().to_string();
        if name.is_empty() {
            continue;
        }
        fetches.push(client.spawn_fetch(name, tx.clone()));
    }

    for handle in fetches {
        // Outcomes were already reported on the status channel.
        let _ = handle.join();
    }
    drop(tx);
    let _ = printer.join();

    if let Some((shutdown, handle)) = server_thread {
        shutdown.store(true, Ordering::Relaxed);
        if let Ok(Err(e)) = handle.join() {
            eprintln!("Server error: {}", e);
        }
    }

    Ok(())
}
