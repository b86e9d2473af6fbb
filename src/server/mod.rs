use std::io;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;

use crate::config::Config;
use crate::console;
use crate::protocol::{self, AdminAction, ProtocolError, Reply, Request, ADMIN_MAGIC, IMAGING_MAGIC};
use crate::queue::QueueStore;
use crate::session::Session;

/// Intake state plus queue storage. Requests are handled strictly one at
/// a time, so two submissions can never interleave their queue writes.
pub struct QueueServer {
    store: QueueStore,
    intake_enabled: bool,
}

impl QueueServer {
    /// A new server starts with intake disabled; an admin has to open it
    /// for the night.
    pub fn new(store: QueueStore) -> Self {
        Self {
            store,
            intake_enabled: false,
        }
    }

    pub fn handle_request(&mut self, line: &str) -> Reply {
        match protocol::parse_request(line) {
            Ok(Request::Imaging(session)) => self.handle_imaging(session),
            Ok(Request::Admin(action)) => self.handle_admin(action),
            Err(e @ ProtocolError::Session(_)) => {
                warn!("Rejecting submission: {}", e);
                Reply::error(IMAGING_MAGIC, "invalid_session")
            }
            Err(e @ ProtocolError::UnknownMagic(_)) => {
                warn!("Rejecting message: {}", e);
                Reply::error(0, "unknown_magic")
            }
            Err(e) => {
                warn!("Rejecting message: {}", e);
                Reply::error(0, "invalid_message")
            }
        }
    }

    fn handle_imaging(&mut self, session: Session) -> Reply {
        if !self.intake_enabled {
            warn!(
                "Rejecting submission from {}: intake is disabled",
                session.user
            );
            return Reply::error(IMAGING_MAGIC, "intake_disabled");
        }
        match self.store.append(&session) {
            Ok(record) => {
                info!(
                    "Queued session {} from {} ({} targets)",
                    record.id,
                    record.session.user,
                    record.session.targets.len()
                );
                Reply::ack(IMAGING_MAGIC)
            }
            Err(e) => {
                error!("Could not persist submission: {}", e);
                Reply::error(IMAGING_MAGIC, "queue_error")
            }
        }
    }

    fn handle_admin(&mut self, action: AdminAction) -> Reply {
        match action {
            AdminAction::EnableIntake => {
                self.intake_enabled = true;
                info!("Intake enabled");
            }
            AdminAction::DisableIntake => {
                self.intake_enabled = false;
                info!("Intake disabled");
            }
            AdminAction::Unrecognized { kind, action } => {
                warn!(
                    "Ignoring unrecognized admin message type={:?} action={:?}",
                    kind, action
                );
            }
        }
        Reply::ack(ADMIN_MAGIC)
    }
}

/// Accepts submissions until interrupted. Connections are served one
/// after another on the accept loop itself.
pub async fn run_server(config: Config) -> io::Result<()> {
    let store = QueueStore::new(config.queue.base_folder, config.queue.name);
    let mut server = QueueServer::new(store);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Listening on {}", config.server.bind);
    info!("Intake is disabled until an admin enables it");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                if let Err(e) = serve_connection(&mut server, stream).await {
                    warn!("Connection from {} failed: {}", peer, e);
                }
            }
            _ = signal::ctrl_c() => {
                if confirm_shutdown().await {
                    info!("Shutting down");
                    return Ok(());
                }
                info!("Resuming");
            }
        }
    }
}

async fn serve_connection(server: &mut QueueServer, stream: TcpStream) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("<- {}", line);
        let reply = server.handle_request(&line);
        let mut encoded = serde_json::to_string(&reply).map_err(io::Error::other)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
    }
    Ok(())
}

async fn confirm_shutdown() -> bool {
    tokio::task::spawn_blocking(|| console::confirm("Stop accepting submissions and exit?"))
        .await
        .map(|confirmed| confirmed.unwrap_or(false))
        .unwrap_or(false)
}
