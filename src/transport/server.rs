//! TCP accept loop and the shared server context.
//!
//! One [`ServerContext`] owns the notification bus, the packet registries and the
//! codec catalogs. It is built explicitly and handed to every connection, so two
//! servers in the same process never share state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::config::CandleConfig;
use crate::core::codec::DataCodec;
use crate::core::frame::MAX_FRAME_SIZE;
use crate::core::identifier::Identifier;
use crate::error::Result;
use crate::event::EventBus;
use crate::protocol::v769;
use crate::registry::registries::PacketRegistries;
use crate::registry::Registry;
use crate::transport::connection::handle_connection;

/// Identifier of the registry holding one [`DataCodec`] per protocol version.
pub const DATA_CODECS_ID: Identifier = Identifier::from_static("candlemc", "data_codec");

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long shutdown waits for in-flight connections.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a connection needs to decode packets.
#[derive(Debug)]
pub struct ServerContext {
    pub bus: EventBus,
    pub registries: PacketRegistries,
    pub codecs: Registry<Arc<DataCodec>>,
    /// Version connections are decoded with.
    pub protocol_version: i32,
    pub max_packet_size: usize,
    cache_dir: Option<PathBuf>,
}

impl ServerContext {
    /// Context with every built-in protocol version registered and no cache
    /// persistence.
    pub fn new(bus: EventBus) -> Result<Self> {
        let registries = PacketRegistries::new(bus.clone());
        let codecs = Registry::new(DATA_CODECS_ID, bus.clone());

        let codec = v769::data_codec(bus.clone())?;
        codecs.register(codec.identifier().clone(), Arc::new(codec))?;
        registries.register(v769::packet_registry(bus.clone())?)?;

        Ok(Self {
            bus,
            registries,
            codecs,
            protocol_version: v769::PROTOCOL_VERSION,
            max_packet_size: MAX_FRAME_SIZE,
            cache_dir: None,
        })
    }

    /// Build the context described by `config`.
    ///
    /// With `persist_cache` on, each version's lookup cache is loaded from the
    /// cache directory and written back once the registries are ready.
    pub fn from_config(config: &CandleConfig) -> Result<Self> {
        let mut context = Self::new(EventBus::new(config.registry.event_workers))?;
        context.protocol_version = config.server.protocol_version;
        context.max_packet_size = config.server.max_packet_size;

        if config.registry.persist_cache {
            context.cache_dir = Some(PathBuf::from(&config.registry.cache_dir));
            context.load_caches();
            context.save_caches();
        }
        Ok(context)
    }

    pub fn codec_for(&self, version: i32) -> Option<Arc<DataCodec>> {
        self.codecs.get(&Identifier::versioned("codec", version))
    }

    /// `<cache_dir>/packet_registry_<version>.bin`, if persistence is enabled.
    pub fn cache_path(&self, version: i32) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("packet_registry_{version}.bin")))
    }

    pub fn load_caches(&self) {
        for version in self.registries.versions() {
            if let (Some(registry), Some(path)) = (
                self.registries.by_protocol_version(version),
                self.cache_path(version),
            ) {
                registry.load_cache_from_disk(&path);
            }
        }
    }

    pub fn save_caches(&self) {
        for version in self.registries.versions() {
            if let (Some(registry), Some(path)) = (
                self.registries.by_protocol_version(version),
                self.cache_path(version),
            ) {
                registry.save_cache_to_disk(&path);
            }
        }
    }
}

/// A bound listener plus the context its connections share.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Server {
    /// Bind `addr`. A bind failure is returned to the caller, which should treat
    /// it as fatal.
    #[instrument(skip(context))]
    pub async fn bind(addr: &str, context: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Server listening");
        Ok(Self { listener, context })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Serve until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until `shutdown_rx` yields (or its sender is dropped).
    ///
    /// Each accepted connection is handled on its own task. Accept errors are
    /// logged and the loop keeps going after [`ACCEPT_ERROR_BACKOFF`].
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    wait_for_connections(&active).await;
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let context = self.context.clone();
                            let active = active.clone();
                            active.fetch_add(1, Ordering::SeqCst);

                            tokio::spawn(async move {
                                handle_connection(stream, peer, context).await;
                                active.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => accept_backoff(&e).await,
                    }
                }
            }
        }
    }
}

/// Log a failed `accept` and pause, so a persistent error (e.g. EMFILE) does
/// not spin the loop.
async fn accept_backoff(e: &std::io::Error) {
    error!(error = %e, "Error accepting connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn wait_for_connections(active: &AtomicUsize) {
    let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
    tokio::pin!(deadline);

    loop {
        let connections = active.load(Ordering::SeqCst);
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }

        tokio::select! {
            _ = &mut deadline => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}
