//! UDP remote control
//!
//! Each datagram carries one text command (`next`, `prev`, an input
//! index or `exit`). The listener runs on the tokio runtime until the
//! switch terminates.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tsw_core::{ControlCommand, Coordinator, SwitchEvent};

/// Largest accepted command datagram
const MAX_DATAGRAM: usize = 1024;

/// Remote command listener
#[derive(Debug)]
pub struct RemoteControl {
    socket: UdpSocket,
    allowed: Vec<IpAddr>,
}

impl RemoteControl {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr, allowed: Vec<IpAddr>) -> io::Result<Self> {
        let remote = Self {
            socket: UdpSocket::bind(addr).await?,
            allowed,
        };
        info!("Listening for remote commands on {}", remote.local_addr()?);
        Ok(remote)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn is_allowed(&self, peer: &SocketAddr) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&peer.ip())
    }

    /// Serve commands until the switch terminates
    pub async fn run(self, switch: Arc<Coordinator>) {
        let mut events = switch.subscribe();
        if switch.is_terminating() {
            return;
        }
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.handle(&buf[..len], peer, &switch),
                    Err(e) => warn!("Remote control receive error: {}", e),
                },
                event = events.recv() => match event {
                    Ok(SwitchEvent::Terminating { .. }) | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                },
            }
        }
        debug!("Remote control stopped");
    }

    fn handle(&self, data: &[u8], peer: SocketAddr, switch: &Coordinator) {
        if !self.is_allowed(&peer) {
            warn!("Rejected remote command from {}", peer);
            return;
        }
        let text = String::from_utf8_lossy(data);
        match text.parse::<ControlCommand>() {
            Ok(command) => {
                debug!("Remote command '{}' from {}", command, peer);
                if let Err(e) = command.apply(switch) {
                    warn!("Remote command '{}' failed: {}", command, e);
                }
            }
            Err(e) => warn!("Remote command from {}: {}", peer, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_list() {
        let any = RemoteControl::bind("127.0.0.1:0".parse().unwrap(), Vec::new())
            .await
            .unwrap();
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert!(any.is_allowed(&peer));

        let local = RemoteControl::bind(
            "127.0.0.1:0".parse().unwrap(),
            vec!["127.0.0.1".parse().unwrap()],
        )
        .await
        .unwrap();
        assert!(!local.is_allowed(&peer));
        assert!(local.is_allowed(&"127.0.0.1:9".parse().unwrap()));
        assert_ne!(local.local_addr().unwrap().port(), 0);
    }
}
