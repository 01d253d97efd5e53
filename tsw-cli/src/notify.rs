//! Switch event reporting
//!
//! Logs every switch event and optionally forwards it as a JSON datagram
//! so that external tools can follow the switch.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tsw_core::{Coordinator, SwitchEvent};

/// Log events and send them to `target` until the switch terminates
pub async fn report_events(
    switch: Arc<Coordinator>,
    mut events: broadcast::Receiver<SwitchEvent>,
    target: Option<SocketAddr>,
) {
    let socket = match target {
        Some(addr) => match bind_for(addr).await {
            Ok(socket) => Some((socket, addr)),
            Err(e) => {
                warn!("Cannot send events to {}: {}", addr, e);
                None
            }
        },
        None => None,
    };

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("Event reporter missed {} events", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        log_event(&switch, &event);
        if let Some((socket, addr)) = &socket {
            match serde_json::to_vec(&event) {
                Ok(json) => {
                    if let Err(e) = socket.send_to(&json, addr).await {
                        warn!("Cannot send event to {}: {}", addr, e);
                    }
                }
                Err(e) => warn!("Cannot encode event: {}", e),
            }
        }
        if matches!(event, SwitchEvent::Terminating { .. }) {
            break;
        }
    }
    debug!("Event reporter stopped");
}

async fn bind_for(target: SocketAddr) -> std::io::Result<UdpSocket> {
    let local: SocketAddr = if target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    UdpSocket::bind(local).await
}

fn log_event(switch: &Coordinator, event: &SwitchEvent) {
    match event {
        SwitchEvent::CurrentChanged { from, to } => {
            let states = switch.input_states();
            let summary: Vec<String> = states
                .iter()
                .map(|s| format!("{}: {}", s.index, s.display()))
                .collect();
            info!("Input {} -> {} [{}]", from, to, summary.join(", "));
        }
        SwitchEvent::CycleCompleted { cycle } => info!("Completed input cycle {}", cycle),
        event if event.is_failure() => warn!("Switch event: {:?}", event),
        event => debug!("Switch event: {:?}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        let json = serde_json::to_string(&SwitchEvent::CurrentChanged { from: 0, to: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"current_changed","from":0,"to":2}"#);
    }
}
