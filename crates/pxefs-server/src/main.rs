//! pxefs binary.
//!
//! Usage:
//!   # Serve every configured image over TFTP and NFS
//!   pxefs serve --config /etc/pxefs.json
//!
//!   # Unprivileged test run
//!   pxefs serve --config pxefs.json --tftp-bind 127.0.0.1:6969 --no-nfs
//!
//!   # Browse an image
//!   pxefs ls --config pxefs.json debian boot

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pxefs_server::{Config, Supervisor, build_namespace};

/// Network boot server for ISO images and directory trees.
#[derive(Parser, Debug)]
#[command(name = "pxefs", version)]
#[command(about = "Serve boot images over TFTP and NFS")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the TFTP and NFS servers
    Serve {
        /// Configuration file (object form or bare image array)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the TFTP bind address
        #[arg(long)]
        tftp_bind: Option<SocketAddr>,

        /// Override the NFS bind address
        #[arg(long)]
        nfs_bind: Option<SocketAddr>,

        /// Do not start the NFS server
        #[arg(long)]
        no_nfs: bool,
    },

    /// List a directory inside an image
    Ls {
        #[arg(short, long)]
        config: PathBuf,

        /// Image name
        image: String,

        /// Directory inside the image (default: top level)
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Serve {
            config,
            tftp_bind,
            nfs_bind,
            no_nfs,
        } => serve(config, tftp_bind, nfs_bind, no_nfs).await,
        Command::Ls {
            config,
            image,
            path,
        } => list(config, &image, &path).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    path: PathBuf,
    tftp_bind: Option<SocketAddr>,
    nfs_bind: Option<SocketAddr>,
    no_nfs: bool,
) -> Result<()> {
    let mut config = Config::load(&path)?;
    if let Some(addr) = tftp_bind {
        config.tftp.bind = addr;
    }
    if let Some(addr) = nfs_bind {
        config.nfs.bind = addr;
    }
    if no_nfs {
        config.nfs.enabled = false;
    }

    tracing::info!(
        config = %path.display(),
        images = config.images.len(),
        tftp = %config.tftp.bind,
        nfs = ?config.nfs.enabled.then_some(config.nfs.bind),
        "starting pxefs"
    );
    let supervisor = Supervisor::start(&config).await?;
    supervisor.wait().await
}

async fn list(path: PathBuf, image_name: &str, dir: &str) -> Result<()> {
    let config = Config::load(&path)?;
    let namespace = build_namespace(&config).await?;
    let registry = namespace.registry();
    let image = registry
        .by_name(image_name)
        .with_context(|| format!("no image named {image_name}"))?;

    let content = namespace.content();
    for child in content.list_children(image, dir)? {
        let entry = content.get_file_entry(image, &child)?;
        let kind = if entry.is_directory { 'd' } else { '-' };
        let modified: DateTime<Local> = entry.last_modified.into();
        println!(
            "{kind} {:>12} {} {}",
            entry.length,
            modified.format("%Y-%m-%d %H:%M"),
            entry.name
        );
    }

    if let Err(e) = content.destroy_all() {
        tracing::warn!(error = %e, "image teardown incomplete");
    }
    Ok(())
}
