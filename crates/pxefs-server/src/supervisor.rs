//! Server lifecycle: index every image, run the protocol servers, tear down.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use pxefs_kernel::{ContentDirectory, ImageRegistry, Namespace};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::tftp::TftpServer;

/// Build the namespace for a configuration: validate the catalog and
/// index every image.
///
/// Indexing reads whole images, so it runs on the blocking pool.
pub async fn build_namespace(config: &Config) -> anyhow::Result<Namespace> {
    let registry = ImageRegistry::new(config.images.clone()).context("invalid image catalog")?;
    let registry = Arc::new(registry);

    let images = Arc::clone(&registry);
    let content = tokio::task::spawn_blocking(move || ContentDirectory::init_all(images.images()))
        .await
        .context("indexing task panicked")?
        .context("failed to index images")?;
    info!(images = content.len(), "all images indexed");

    Ok(Namespace::new(registry, Arc::new(content)))
}

/// Release every image of `namespace`; failures are logged.
fn release(namespace: &Namespace) {
    match namespace.shared_content().destroy_all() {
        Ok(()) => info!("all images released"),
        Err(e) => warn!(error = %e, "image teardown incomplete"),
    }
}

/// Running TFTP and NFS workers sharing one namespace.
pub struct Supervisor {
    namespace: Namespace,
    cancel: CancellationToken,
    workers: JoinSet<(&'static str, std::io::Result<()>)>,
    tftp_addr: SocketAddr,
}

impl Supervisor {
    /// Index all images and start the servers.
    ///
    /// Returns once the TFTP socket is bound; fails before any server runs
    /// if the catalog is invalid or an image cannot be indexed.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let namespace = build_namespace(config).await?;
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();

        let bound = TftpServer::bind(
            config.tftp.bind,
            namespace.clone(),
            config.tftp.poll_interval(),
        )
        .await
        .and_then(|tftp| Ok((tftp.local_addr()?, tftp)));
        let (tftp_addr, tftp) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                release(&namespace);
                return Err(e)
                    .with_context(|| format!("failed to bind tftp socket {}", config.tftp.bind));
            }
        };
        let token = cancel.clone();
        workers.spawn(async move { ("tftp", tftp.run(token).await) });

        if config.nfs.enabled {
            Self::spawn_nfs(&mut workers, config, &namespace, &cancel);
        }

        Ok(Self {
            namespace,
            cancel,
            workers,
            tftp_addr,
        })
    }

    #[cfg(feature = "nfs")]
    fn spawn_nfs(
        workers: &mut JoinSet<(&'static str, std::io::Result<()>)>,
        config: &Config,
        namespace: &Namespace,
        cancel: &CancellationToken,
    ) {
        let (addr, namespace, token) = (config.nfs.bind, namespace.clone(), cancel.clone());
        workers.spawn(async move { ("nfs", crate::nfs::serve(addr, namespace, token).await) });
    }

    #[cfg(not(feature = "nfs"))]
    fn spawn_nfs(
        _workers: &mut JoinSet<(&'static str, std::io::Result<()>)>,
        _config: &Config,
        _namespace: &Namespace,
        _cancel: &CancellationToken,
    ) {
        warn!("nfs requested but this build has no nfs support");
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Bound TFTP address (useful when configured with port 0).
    pub fn tftp_addr(&self) -> SocketAddr {
        self.tftp_addr
    }

    /// Token that stops every worker when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until Ctrl-C, cancellation, or the first worker exits; then
    /// stop everything.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
            _ = self.cancel.cancelled() => info!("shutdown requested"),
            Some(joined) = self.workers.join_next() => Self::report(joined),
        }
        self.shutdown().await
    }

    /// Cancel the workers, join them, and release every image.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.cancel.cancel();
        while let Some(joined) = self.workers.join_next().await {
            Self::report(joined);
        }

        release(&self.namespace);
        Ok(())
    }

    fn report(joined: Result<(&'static str, std::io::Result<()>), tokio::task::JoinError>) {
        match joined {
            Ok((name, Ok(()))) => info!(server = name, "server exited"),
            Ok((name, Err(e))) => error!(server = name, error = %e, "server failed"),
            Err(e) => error!(error = %e, "server task panicked"),
        }
    }
}
