//! Simple Operator - keeps a Deployment sized to each Simple resource

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use simple_operator::config::ReconcilerConfig;
use simple_operator::controller::{error_policy, reconcile, Context};
use simple_operator::crd::Simple;
use simple_operator::retry::{retry_with_backoff, RetryConfig};
use simple_operator::workload::{WorkloadTemplate, DEFAULT_IMAGE, DEFAULT_UPSTREAM};
use simple_operator::Error;

/// Simple Operator - scales the simple service to the size declared in Simple resources
#[derive(Parser, Debug)]
#[command(name = "simple-operator", version, about, long_about = None)]
struct Cli {
    /// Print the Simple CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Simple resources and the Deployments they own, and reconciles
    /// each Simple whenever either changes.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Only watch Simple resources in this namespace (default: all namespaces)
    #[arg(long, env = "SIMPLE_NAMESPACE")]
    namespace: Option<String>,

    /// Container image for the simple service
    #[arg(long, env = "SIMPLE_IMAGE", default_value = DEFAULT_IMAGE)]
    image: String,

    /// Upstream URL passed to the service as UPSTREAM
    #[arg(long, env = "SIMPLE_UPSTREAM", default_value = DEFAULT_UPSTREAM)]
    upstream: String,

    /// Seconds to wait after resizing a Deployment before inspecting its pods
    #[arg(long, default_value = "60")]
    resize_requeue_secs: u64,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, default_value = "5")]
    error_requeue_secs: u64,

    /// Seconds to wait before retrying a reconciliation that lost an update race
    #[arg(long, default_value = "1")]
    conflict_requeue_secs: u64,

    /// Install or update the Simple CRD before starting
    #[arg(long)]
    install_crd: bool,
}

impl ControllerArgs {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig::default()
            .template(WorkloadTemplate::new(&self.image, &self.upstream))
            .resize_requeue(Duration::from_secs(self.resize_requeue_secs))
            .error_requeue(Duration::from_secs(self.error_requeue_secs))
            .conflict_requeue(Duration::from_secs(self.conflict_requeue_secs))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", render_crd()?);
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::parse_from(["controller"])).await,
    }
}

/// Render the Simple CRD as YAML
fn render_crd() -> Result<String, Error> {
    serde_yaml::to_string(&Simple::crd())
        .map_err(|e| Error::serialization(format!("failed to serialize Simple CRD: {}", e)))
}

/// Install the Simple CRD using server-side apply
async fn ensure_crd_installed(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("simple-operator").force();

    crds.patch(Simple::crd_name(), &params, &Patch::Apply(&Simple::crd()))
        .await?;
    Ok(())
}

/// Run the Simple controller until a shutdown signal arrives
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("Simple operator starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crd {
        tracing::info!("Installing Simple CRD...");
        retry_with_backoff(
            &RetryConfig::startup(),
            "install_crd",
            Error::is_transient,
            || ensure_crd_installed(&client),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Simple CRD: {}", e))?;
    }

    let (simples, deployments): (Api<Simple>, Api<Deployment>) = match args.namespace {
        Some(ref ns) => {
            tracing::info!(namespace = %ns, "Watching a single namespace");
            (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            )
        }
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let ctx = Arc::new(
        Context::builder(client)
            .config(args.reconciler_config())
            .build(),
    );

    tracing::info!("Starting Simple controller");

    Controller::new(simples, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(simple = %obj, ?action, "Simple reconciliation completed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Simple reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Simple controller terminated");
    Ok(())
}
