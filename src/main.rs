//! mesh-installer - install or remove a service mesh from the command line

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing::info;

use mesh_installer::helm::DEFAULT_HELM_TIMEOUT;
use mesh_installer::{
    ClusterClients, Encryption, HelmCli, Install, InstallSpec, Installer, InstallerOptions,
    MeshInstaller, MeshType, Pipeline, SecretRef, overrides_for,
};

#[derive(Parser, Debug)]
#[command(name = "mesh-installer", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run pre-install hooks, deploy the chart, then run post-install hooks
    Install(ReleaseArgs),

    /// Remove the chart release and clean up after it
    Uninstall(ReleaseArgs),

    /// Print the rendered chart values for a request and exit
    Overrides(RequestArgs),

    /// Print the Install CRD manifest and exit
    Crd,
}

/// What to install
#[derive(Args, Debug)]
struct RequestArgs {
    /// Mesh product
    #[arg(long, env = "MESH_TYPE", value_enum)]
    mesh: Option<MeshType>,

    /// Enable mutual TLS
    #[arg(long)]
    tls: bool,

    /// Secret with the root certificates (`name` or `namespace/name`)
    #[arg(long, value_name = "NS/NAME", requires = "tls")]
    tls_secret: Option<SecretRef>,

    /// Namespace for the release, defaults to the product's namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Read the Install request from a YAML file; flags above override it
    #[arg(long, value_name = "PATH")]
    install_file: Option<PathBuf>,
}

/// Where and how to deploy
#[derive(Args, Debug)]
struct ReleaseArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Chart release name
    #[arg(long, env = "RELEASE_NAME")]
    release: String,

    /// Chart reference, overrides `spec.chartLocator` from the install file
    #[arg(long, env = "CHART")]
    chart: Option<String>,

    /// Cluster is OpenShift; grant SecurityContextConstraints where needed
    #[arg(long, env = "MESH_OPENSHIFT")]
    openshift: bool,

    /// Delete the product's CRDs after uninstall
    #[arg(long, env = "MESH_PURGE_CRDS")]
    purge_crds: bool,

    /// helm binary
    #[arg(long, env = "HELM_BIN", default_value = "helm")]
    helm: String,

    /// Seconds helm waits for the release to become ready
    #[arg(long, default_value_t = DEFAULT_HELM_TIMEOUT.as_secs())]
    timeout_secs: u64,
}

impl RequestArgs {
    /// Build the Install request from the file (if any) and flags
    fn to_install(&self, name: &str) -> Result<Install, Box<dyn std::error::Error>> {
        let mut install = match &self.install_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_yaml::from_str::<Install>(&raw)?
            }
            None => {
                let mesh = self
                    .mesh
                    .ok_or("--mesh is required unless --install-file is given")?;
                Install::new(name, InstallSpec::new(mesh))
            }
        };

        if let Some(mesh) = self.mesh {
            install.spec.mesh_type = mesh;
        }
        if self.tls {
            install.spec.encryption = Some(Encryption::tls(self.tls_secret.clone()));
        }
        if let Some(ns) = &self.namespace {
            install.spec.installation_namespace = Some(ns.clone());
        }
        Ok(install)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mesh_installer=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install(args) => run_release(args, false).await,
        Commands::Uninstall(args) => run_release(args, true).await,
        Commands::Overrides(args) => {
            let install = args.to_install("overrides")?;
            print!(
                "{}",
                overrides_for(install.spec.mesh_type, install.spec.encryption.as_ref())
            );
            Ok(())
        }
        Commands::Crd => {
            print!("{}", serde_yaml::to_string(&Install::crd())?);
            Ok(())
        }
    }
}

async fn run_release(args: ReleaseArgs, uninstall: bool) -> Result<(), Box<dyn std::error::Error>> {
    let install = args.request.to_install(&args.release)?;
    let mesh = install.spec.mesh_type;
    let chart = args
        .chart
        .clone()
        .or_else(|| install.spec.chart_locator.clone())
        .ok_or("--chart is required unless the install file sets spec.chartLocator")?;

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");
    let clients = ClusterClients::from_client(client, args.openshift);

    let options = InstallerOptions {
        purge_crds_on_uninstall: args.purge_crds,
        ..Default::default()
    };
    let installer = MeshInstaller::new(mesh, &clients, &options)?;
    let helm = HelmCli {
        binary: args.helm.clone(),
        wait: true,
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let pipeline = Pipeline::new(&installer, &helm, clients.role_bindings.as_ref());

    if uninstall {
        pipeline.uninstall(&install, &args.release, &chart).await?;
        info!(mesh = %mesh, release = %args.release, "Uninstall finished");
    } else {
        let release = pipeline.install(&install, &args.release, &chart).await?;
        info!(
            mesh = %mesh,
            release = %release.name,
            namespace = %release.namespace,
            crb = installer.crb_name(),
            "Install finished"
        );
    }
    Ok(())
}
