//! On-device agent hub.
//!
//! Running application instances embed a small agent that connects here over
//! WebSocket, introduces itself, and then applies the patches it is sent.
//! The hub is both the [`TargetProvider`] (connected agents are the live
//! targets) and the [`Deployer`] (patches travel over the agent's socket).
//!
//! ```text
//! agent --hello--> hub --welcome--> agent
//! hub --apply_patch{id}--> agent --patch_result{id}--> hub
//! ```

pub mod protocol;
pub mod server;

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::config::ConfigHandle;
use crate::push::{
    Deployer, PatchError, PatchRequest, PatchSession, PushSettings, Target, TargetProvider,
};

pub use protocol::{AgentError, AgentMessage};
pub use server::start_agent_server;

/// Read timeout while waiting on an agent; bounds how long a lock is held per poll.
const POLL: Duration = Duration::from_millis(50);
/// How long a fresh connection may take to send its hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

struct AgentConn {
    target: Target,
    ws: Mutex<WebSocket<TcpStream>>,
    alive: AtomicBool,
    next_request: AtomicU64,
}

impl AgentConn {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            crate::log!("agent"; "{} disconnected", self.target.label());
        }
    }
}

struct HubInner {
    agents: RwLock<Vec<Arc<AgentConn>>>,
    config: ConfigHandle,
}

/// Registry of connected agents. Cheap to clone.
#[derive(Clone)]
pub struct AgentHub {
    inner: Arc<HubInner>,
}

impl AgentHub {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            inner: Arc::new(HubInner {
                agents: RwLock::new(Vec::new()),
                config,
            }),
        }
    }

    /// Number of live agents, across all applications.
    pub fn len(&self) -> usize {
        self.inner
            .agents
            .read()
            .iter()
            .filter(|a| a.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete the WebSocket handshake and wait for the agent's hello.
    pub fn register(&self, stream: TcpStream) -> Result<Target, AgentError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(POLL))?;

        let mut ws =
            tungstenite::accept(stream).map_err(|e| AgentError::Handshake(e.to_string()))?;
        let target = read_hello(&mut ws)?;
        ws.send(Message::Text(AgentMessage::welcome().to_json()?.into()))?;

        let conn = Arc::new(AgentConn {
            target: target.clone(),
            ws: Mutex::new(ws),
            alive: AtomicBool::new(true),
            next_request: AtomicU64::new(1),
        });

        let mut agents = self.inner.agents.write();
        // A reconnecting agent replaces its stale entry
        for stale in agents.iter().filter(|a| same_instance(&a.target, &target)) {
            stale.alive.store(false, Ordering::Release);
        }
        agents.retain(|a| a.is_alive());
        agents.push(conn);
        crate::log!("agent"; "{} connected for {}", target.label(), target.application_id);
        Ok(target)
    }

    fn find(&self, target: &Target) -> Option<Arc<AgentConn>> {
        self.inner
            .agents
            .read()
            .iter()
            .find(|a| a.is_alive() && same_instance(&a.target, target))
            .cloned()
    }

    /// Detect closed agents between pushes. Stops once the hub is dropped.
    pub fn spawn_keepalive(&self) {
        let hub = Arc::downgrade(&self.inner);
        std::thread::spawn(move || keepalive_loop(hub));
    }
}

fn same_instance(a: &Target, b: &Target) -> bool {
    a.id == b.id && a.application_id == b.application_id
}

fn is_timeout(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Io(e)
        if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
}

fn read_hello(ws: &mut WebSocket<TcpStream>) -> Result<Target, AgentError> {
    let deadline = Instant::now() + HELLO_TIMEOUT;
    loop {
        match ws.read() {
            Ok(Message::Text(text)) => {
                return match AgentMessage::parse(&text)? {
                    AgentMessage::Hello {
                        device,
                        application_id,
                        api_level,
                        emulator,
                    } => {
                        let target = Target::new(device, application_id, api_level);
                        Ok(if emulator { target.emulator() } else { target })
                    }
                    other => Err(AgentError::UnexpectedMessage(format!("{other:?}"))),
                };
            }
            Ok(_) => {}
            Err(e) if is_timeout(&e) => {
                if Instant::now() >= deadline {
                    return Err(AgentError::HelloTimeout);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn keepalive_loop(hub: Weak<HubInner>) {
    loop {
        std::thread::sleep(KEEPALIVE_INTERVAL);
        let Some(hub) = hub.upgrade() else {
            break;
        };

        let agents: Vec<_> = hub.agents.read().clone();
        for conn in agents.iter().filter(|a| a.is_alive()) {
            // Busy agents are mid-push; the push notices failures itself
            let Some(mut ws) = conn.ws.try_lock() else {
                continue;
            };
            if ws.send(Message::Ping(Default::default())).is_err() {
                conn.mark_dead();
                continue;
            }
            match ws.read() {
                Ok(Message::Close(_)) => conn.mark_dead(),
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(_) => conn.mark_dead(),
            }
        }
        hub.agents.write().retain(|a| a.is_alive());
    }
}

impl TargetProvider for AgentHub {
    fn live_targets(&self, application_id: &str) -> Vec<Target> {
        self.inner
            .agents
            .read()
            .iter()
            .filter(|a| a.is_alive() && a.target.application_id == application_id)
            .map(|a| a.target.clone())
            .collect()
    }
}

impl Deployer for AgentHub {
    fn connect(&self, target: &Target) -> Result<Box<dyn PatchSession>, PatchError> {
        let conn = self.find(target).ok_or_else(|| PatchError::Connect {
            target: target.id.clone(),
            reason: "no agent connected".into(),
        })?;
        let timeout = PushSettings::from(&self.inner.config.load().push).timeout;
        Ok(Box::new(AgentSession { conn, timeout }))
    }
}

/// One push over an agent's socket.
struct AgentSession {
    conn: Arc<AgentConn>,
    timeout: Duration,
}

impl AgentSession {
    fn transport(&self, reason: impl ToString) -> PatchError {
        self.conn.mark_dead();
        PatchError::Transport {
            target: self.conn.target.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl PatchSession for AgentSession {
    fn apply_patch(&mut self, request: &PatchRequest) -> Result<(), PatchError> {
        let target = &self.conn.target;
        let id = self.conn.next_request.fetch_add(1, Ordering::Relaxed);
        let text = AgentMessage::ApplyPatch {
            id,
            patch: request.clone(),
        }
        .to_json()
        .map_err(|e| PatchError::Transport {
            target: target.id.clone(),
            reason: e.to_string(),
        })?;

        let mut ws = self.conn.ws.lock();
        if let Err(e) = ws.send(Message::Text(text.into())) {
            return Err(self.transport(e));
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match ws.read() {
                Ok(Message::Text(text)) => match AgentMessage::parse(&text) {
                    Ok(AgentMessage::PatchResult { id: reply, ok, error }) if reply == id => {
                        if ok {
                            crate::debug!("agent"; "{} applied {}", target.id, request.signature());
                            return Ok(());
                        }
                        return Err(PatchError::Rejected {
                            target: target.id.clone(),
                            artifact: request.signature(),
                            message: error.unwrap_or_else(|| "patch rejected".into()),
                        });
                    }
                    // Late reply to an earlier, timed out request
                    Ok(other) => crate::debug!("agent"; "{}: ignoring {:?}", target.id, other),
                    Err(e) => crate::debug!("agent"; "{}: {}", target.id, e),
                },
                Ok(Message::Close(_)) => return Err(self.transport("agent closed the connection")),
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(self.transport(e)),
            }

            if Instant::now() >= deadline {
                return Err(PatchError::Timeout {
                    target: target.id.clone(),
                    ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }

    fn is_usable(&self) -> bool {
        self.conn.is_alive()
    }
}

#[cfg(test)]
mod tests;
