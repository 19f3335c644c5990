//! WebSocket server the agents connect to.
//!
//! Each accepted connection is registered on its own thread so a slow
//! handshake never stalls the acceptor.

use std::net::{IpAddr, TcpListener};

use anyhow::Result;

use super::AgentHub;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Start accepting agents into `hub`. Returns the port actually bound.
pub fn start_agent_server(interface: IpAddr, base_port: u16, hub: AgentHub) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;
    hub.spawn_keepalive();

    std::thread::spawn(move || {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("agent"; "connection from {}", addr);
                    let hub = hub.clone();
                    std::thread::spawn(move || {
                        if let Err(e) = hub.register(stream) {
                            crate::log!("agent"; "rejected {}: {}", addr, e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    crate::log!("agent"; "accept error: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }
    });

    Ok(actual_port)
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind((interface, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind agent server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_port_in_use_moves_on() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let (_listener, actual) = try_bind_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, 10).unwrap();
        assert_ne!(actual, port);
    }
}
