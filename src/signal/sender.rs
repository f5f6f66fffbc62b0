//! Signal sender.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::message::create_message;
use super::shm::SharedSegment;
use super::{process_exists, segment_name, DONE};
use crate::error::SignalError;
use crate::settings::SignalSettings;

/// Delivers messages to running simulator processes.
#[derive(Debug, Clone)]
pub struct SignalSender {
    poll_interval: Duration,
    timeout: Duration,
}

impl SignalSender {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    pub fn from_settings(settings: &SignalSettings) -> Self {
        Self::new(settings.poll_interval(), settings.timeout())
    }

    /// Sends one message and blocks until the receiver acknowledges it.
    ///
    /// The payload is validated and serialized before any shared memory is
    /// touched. The segment is unlinked on every exit path once created.
    ///
    /// # Arguments
    ///
    /// * `pid` - Process id of the target simulator
    /// * `id` - Message id, dispatched as the hypercall code
    /// * `payload` - Optional JSON object with identifier keys
    pub fn send(&self, pid: i32, id: i64, payload: Option<&str>) -> Result<(), SignalError> {
        let message = create_message(id, payload)?;
        if pid <= 0 {
            return Err(SignalError::NoSuchProcess(pid));
        }
        let name = segment_name(pid);

        let result = self.deliver(pid, &name, &message);
        SharedSegment::unlink(&name)?;
        result
    }

    fn deliver(&self, pid: i32, name: &str, message: &str) -> Result<(), SignalError> {
        let mut segment = SharedSegment::create(name)?;
        segment.write(message.as_bytes())?;
        debug!(pid, segment = name, bytes = message.len(), "message written");

        // Safety: kill has no memory-safety preconditions.
        if unsafe { libc::kill(pid, libc::SIGHUP) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Err(SignalError::NoSuchProcess(pid));
            }
            return Err(SignalError::Os {
                op: "kill",
                source: err,
            });
        }

        let started = Instant::now();
        loop {
            if segment.read() == DONE.as_bytes() {
                info!(pid, "message acknowledged");
                return Ok(());
            }
            if !process_exists(pid) {
                return Err(SignalError::NoSuchProcess(pid));
            }
            if started.elapsed() >= self.timeout {
                return Err(SignalError::Timeout(self.timeout));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl Default for SignalSender {
    fn default() -> Self {
        Self::from_settings(&SignalSettings::default())
    }
}
