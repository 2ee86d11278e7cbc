//! Operator CLI
//!
//! Small front-end over the client library: fetch single keys and
//! inspect the bootstrapped topology of a running cluster.

use clap::{Parser, Subcommand};
use rokv::{Cluster, Error, Value};

/// rokv read-only store client.
#[derive(Parser)]
#[command(name = "rokv")]
#[command(about = "Client for a distributed read-only key-value store")]
#[command(version)]
struct Cli {
    /// Store URL, e.g. tcp://localhost:6666/catalog
    #[arg(long)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one key and print the decoded value
    Get {
        /// Key (UTF-8 string form)
        key: String,

        /// Treat the key as raw bytes instead of a record string
        #[arg(long)]
        bytes_key: bool,
    },

    /// Print the bootstrapped cluster topology
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let (cluster, store) = Cluster::open(&cli.url).await?;

    let outcome = run(&cluster, &store, cli.command).await;
    cluster.close().await;
    outcome
}

async fn run(cluster: &Cluster, store: &rokv::Store, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Get { key, bytes_key } => {
            let key = if bytes_key {
                Value::Bytes(key.into_bytes())
            } else {
                Value::from(key)
            };

            match store.get(&key).await {
                Ok(value) => println!("{}", value),
                Err(Error::KeyNotFound) => println!("(not found)"),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Info => {
            let topology = cluster
                .topology()
                .expect("connected cluster has a topology");
            println!("cluster: {}", topology.name);
            println!("partitions: {}", topology.partition_count());
            for node in topology.nodes() {
                println!(
                    "  node {} at {}:{} owns {} partitions",
                    node.id,
                    node.host,
                    node.port,
                    node.partitions.len()
                );
            }
        }
    }

    Ok(())
}
