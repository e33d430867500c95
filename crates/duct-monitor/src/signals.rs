//! Forwarding of the wrapper's interrupt and terminate signals to the child

use duct_core::Result;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What to do on the Nth SIGINT received by the wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Pass SIGINT on and keep waiting
    Forward,
    /// The child ignored two interrupts; kill it
    Kill,
    /// Give up waiting and exit the wrapper
    Exit,
}

impl InterruptAction {
    pub fn for_count(count: u32) -> Self {
        match count {
            0..=2 => InterruptAction::Forward,
            3 => InterruptAction::Kill,
            _ => InterruptAction::Exit,
        }
    }
}

fn send(pid: u32, sig: Signal) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), sig) {
        warn!("Failed to send {} to PID {}: {}", sig, pid, e);
    }
}

/// Install SIGINT/SIGTERM handlers that relay to `pid` until aborted.
///
/// Handlers are installed before this returns, so signals arriving right
/// after launch are not lost.
pub fn spawn_signal_forwarder(pid: u32) -> Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let mut interrupts = 0u32;
        let mut terminated = false;

        loop {
            tokio::select! {
                Some(()) = sigint.recv() => {
                    interrupts += 1;
                    match InterruptAction::for_count(interrupts) {
                        InterruptAction::Forward => {
                            info!("Received SIGINT ({}), forwarding to PID {}", interrupts, pid);
                            send(pid, Signal::SIGINT);
                        }
                        InterruptAction::Kill => {
                            warn!("Received SIGINT ({}), killing PID {}", interrupts, pid);
                            send(pid, Signal::SIGKILL);
                        }
                        InterruptAction::Exit => {
                            warn!("Received SIGINT ({}), exiting without waiting for PID {}", interrupts, pid);
                            std::process::exit(1);
                        }
                    }
                }
                Some(()) = sigterm.recv(), if !terminated => {
                    terminated = true;
                    info!("Received SIGTERM, forwarding to PID {}", pid);
                    send(pid, Signal::SIGTERM);
                }
                else => break,
            }
        }
    }))
}
