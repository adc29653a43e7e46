//! Grafana operator entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use grafana_operator::{Grafana, OperatorBuilder};
use kube::CustomResourceExt;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "grafana-operator", version, about = "Kubernetes operator for Grafana instances")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the Grafana CRD as YAML
    Crd,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Only watch Grafana resources in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Namespace the operator runs in
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    operator_namespace: String,

    /// Seconds between periodic reconciles
    #[arg(long, default_value_t = 10)]
    requeue_seconds: u64,

    #[arg(long, default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Create the Grafana CRD if it is missing
    #[arg(long)]
    install_crd: bool,

    /// Read OpenShift routes when resolving the admin URL
    #[arg(long, env = "OPENSHIFT")]
    openshift: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Crd) => {
            print!("{}", serde_yaml::to_string(&Grafana::crd())?);
            Ok(())
        }
        None => run(cli.run).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let manager = OperatorBuilder::new()
        .watch_namespace(args.namespace)
        .operator_namespace(args.operator_namespace)
        .requeue_delay(Duration::from_secs(args.requeue_seconds))
        .health_addr(args.health_addr)
        .install_crd(args.install_crd)
        .openshift(args.openshift)
        .build()
        .await?;

    manager.run().await?;
    Ok(())
}
