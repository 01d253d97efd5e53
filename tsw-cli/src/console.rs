//! Interactive commands on standard input

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};
use tsw_core::{ControlCommand, Coordinator};

/// Read commands from stdin on a detached thread.
///
/// The thread ends at end of input or once the switch terminates.
pub fn spawn(switch: Arc<Coordinator>) -> io::Result<()> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console read error: {}", e);
                        break;
                    }
                };
                if switch.is_terminating() {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ControlCommand>() {
                    Ok(command) => {
                        if let Err(e) = command.apply(&switch) {
                            warn!("{}", e);
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
            debug!("Console closed");
        })?;
    Ok(())
}
