//! TCP listener and accept loop.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use cinder_core::{spawn_db, DropPool};
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::connection;

/// Request-channel depth between connections and the db task. Large
/// enough to absorb pipelined bursts without stalling readers.
const DB_BUFFER: usize = 256;

/// Accept backlog.
const BACKLOG: u32 = 1024;

/// A bound server, not yet accepting.
pub struct Server {
    listener: TcpListener,
    pool: DropPool,
}

impl Server {
    /// Binds the listening socket (all interfaces, `SO_REUSEADDR`) and
    /// starts the destruction pool. Fails on bind/listen errors, which
    /// the caller turns into exit code 1.
    pub fn bind(config: &ServerConfig) -> std::io::Result<Server> {
        let config = config.clone().normalized();

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            config.port,
        )))?;
        let listener = socket.listen(BACKLOG)?;

        let pool = DropPool::new(config.threads);
        Ok(Server { listener, pool })
    }

    /// The address actually bound — resolves port 0 for tests.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` completes. Each accepted
    /// connection gets its own task holding a clone of the db handle.
    /// On shutdown, accepting stops and the destruction pool is
    /// drained and joined; connection tasks finish with the runtime.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let db = spawn_db(DB_BUFFER, Some(self.pool.handle()));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let db = db.clone();
                            tokio::spawn(async move {
                                if let Err(e) = connection::handle(stream, db).await {
                                    error!(%peer, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            // transient accept failures (EMFILE and
                            // friends) should not take the server down
                            error!("accept failed: {e}");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting");
                    break;
                }
            }
        }

        drop(self.listener);
        self.pool.shutdown();
    }
}
