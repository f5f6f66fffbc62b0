//! Signal receiver, installed inside simulator processes.
//!
//! The SIGHUP handler only raises a flag. The run loop calls `poll` between
//! slices of simulated time, which reads the message from this process's
//! segment and acknowledges it.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::message::SignalMessage;
use super::shm::SharedSegment;
use super::{segment_name, DONE};
use crate::error::SignalError;

static PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sighup(_signum: libc::c_int) {
    PENDING.store(true, Ordering::SeqCst);
}

/// Receives messages addressed to the current process.
#[derive(Debug)]
pub struct SignalReceiver {
    name: String,
}

impl SignalReceiver {
    /// Installs the SIGHUP handler for the current process.
    pub fn install() -> Result<Self, SignalError> {
        let handler = on_sighup as extern "C" fn(libc::c_int);
        // Safety: the handler only stores to an atomic, which is
        // async-signal-safe.
        let previous = unsafe { libc::signal(libc::SIGHUP, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(SignalError::Os {
                op: "signal",
                source: std::io::Error::last_os_error(),
            });
        }
        let name = segment_name(std::process::id() as i32);
        debug!(segment = %name, "signal receiver installed");
        Ok(Self { name })
    }

    /// Returns `true` if a notification arrived and has not been polled yet.
    pub fn pending(&self) -> bool {
        PENDING.load(Ordering::SeqCst)
    }

    /// Takes the pending message, if any, and acknowledges it.
    ///
    /// A notification without a readable segment is dropped with a warning.
    pub fn poll(&self) -> Result<Option<SignalMessage>, SignalError> {
        if !PENDING.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        let Some(mut segment) = SharedSegment::open(&self.name)? else {
            warn!(segment = %self.name, "SIGHUP received but no message segment exists");
            return Ok(None);
        };

        let text = segment.read_string();
        let message = SignalMessage::decode(&text);
        segment.write(DONE.as_bytes())?;
        let message = message?;
        debug!(id = message.id, "signal message received");
        Ok(Some(message))
    }
}
