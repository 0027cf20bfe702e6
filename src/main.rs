use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

use raftlet::config::{Config, TimingConfig};
use raftlet::network::{self, HttpTransport, RaftHttpServer};
use raftlet::raft::{NodeIdentity, RaftHandler, RaftNode};
use raftlet::storage::CsvLogStore;

#[derive(Parser)]
#[command(name = "raftlet")]
#[command(about = "Leader election and heartbeat node for a static cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a cluster member
    Node(NodeArgs),

    /// Show a running node's term, role and vote
    Status {
        /// RPC address of the node, e.g. 127.0.0.1:8001
        #[arg(long)]
        http: String,
    },
}

#[derive(Args)]
struct NodeArgs {
    /// JSON config file; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Unique ID for this node (>= 1)
    #[arg(short, long)]
    id: Option<u64>,

    /// Address to listen on
    #[arg(short, long)]
    address: Option<String>,

    /// Comma-separated list of peers (id=address)
    #[arg(short, long)]
    peers: Option<String>,

    /// Directory to store data
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    heartbeat_timeout_ms: Option<u64>,

    #[arg(long)]
    election_timeout_min_ms: Option<u64>,

    #[arg(long)]
    election_timeout_max_ms: Option<u64>,

    #[arg(long)]
    heartbeat_interval_ms: Option<u64>,

    #[arg(long)]
    rpc_timeout_ms: Option<u64>,
}

impl NodeArgs {
    fn resolve(self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => Config::default(),
        };

        let id = self.id.unwrap_or(cfg.node.id);
        let address = self.address.unwrap_or(cfg.node.address);
        cfg.node = NodeIdentity::new(id, &address);

        if let Some(peers) = &self.peers {
            cfg.set_peers(peers).context("parsing --peers")?;
        }
        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }

        let t: &mut TimingConfig = &mut cfg.timing;
        if let Some(v) = self.heartbeat_timeout_ms {
            t.heartbeat_timeout_ms = v;
        }
        if let Some(v) = self.election_timeout_min_ms {
            t.election_timeout_min_ms = v;
        }
        if let Some(v) = self.election_timeout_max_ms {
            t.election_timeout_max_ms = v;
        }
        if let Some(v) = self.heartbeat_interval_ms {
            t.heartbeat_interval_ms = v;
        }
        if let Some(v) = self.rpc_timeout_ms {
            t.rpc_timeout_ms = v;
        }

        Ok(cfg)
    }
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let cfg = args.resolve()?;

    // Bind before touching storage so an unusable address fails fast.
    let listen = network::resolve_listen_addr(&cfg.node.address)
        .with_context(|| format!("resolving listen address {}", cfg.node.address))?;
    let server = RaftHttpServer::bind(&listen)
        .with_context(|| format!("binding RPC listener on {listen}"))?;

    let log_path = cfg.log_path();
    let store = CsvLogStore::open(&log_path)
        .with_context(|| format!("opening log store {}", log_path.display()))?;

    let raft_config = cfg.into_raft_config();
    let transport = HttpTransport::new(raft_config.rpc_timeout());
    let node = RaftNode::start(&store, raft_config, transport).context("starting raft node")?;

    info!(
        "Node {} listening on {} with {} peers",
        node.id(),
        server.local_addr(),
        node.config().peers().count()
    );

    let handler: Arc<dyn RaftHandler> = node.clone();
    let server_task = tokio::spawn(server.serve(handler));

    tokio::select! {
        _ = node.run() => Ok(()),
        res = server_task => {
            res.context("RPC server task panicked")?
                .context("RPC server stopped")
        }
    }
}

async fn show_status(http: &str) -> Result<()> {
    let status = network::fetch_status(http)
        .await
        .with_context(|| format!("querying {http}"))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Node(args) => run_node(args).await,
        Command::Status { http } => show_status(&http).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}
