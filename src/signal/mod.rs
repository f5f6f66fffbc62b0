//! Out-of-band signal channel.
//!
//! A sender injects one JSON message into a running simulator process: it
//! writes the message into a 4096-byte POSIX shared memory segment named after
//! the target pid, raises SIGHUP, and polls until the receiver overwrites the
//! buffer with `done`.
//!
//! ```text
//! sender                                 simulator (pid)
//!   | shm_open shared_gem5_signal_mem_<pid>  |
//!   | zero-fill, write {"id":..,"payload":..}|
//!   | kill(pid, SIGHUP) -------------------> | flag set
//!   |                                        | poll(): read, parse
//!   | <------------------------------ "done" | write sentinel
//!   | shm_unlink                             |
//! ```

/// Message format and validation.
pub mod message;

/// Receiving side, installed in simulator processes.
pub mod receiver;

/// Sending side, used by the CLI.
pub mod sender;

/// POSIX shared memory segments.
pub mod shm;

pub use message::{create_message, parse_payload, validate_key, SignalMessage};
pub use receiver::SignalReceiver;
pub use sender::SignalSender;
pub use shm::SharedSegment;

/// Size of the shared buffer. Serialized messages must be strictly smaller.
pub const SHM_SIZE: usize = 4096;

/// Acknowledgement sentinel written by the receiver.
pub const DONE: &str = "done";

const SEGMENT_PREFIX: &str = "shared_gem5_signal_mem_";

/// Name of the segment addressed to `pid`.
pub fn segment_name(pid: i32) -> String {
    format!("{}{}", SEGMENT_PREFIX, pid)
}

/// Returns `true` if a process with this pid exists (zombies included).
pub fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Safety: signal 0 performs only the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
