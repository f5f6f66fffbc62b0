//! Process-table introspection and signalling.
//!
//! Reads `/proc/<pid>/stat` for the scheduler state and start time of a
//! simulator process and delivers job-control signals with `kill(2)`.

use std::fs;
use std::io;
use std::time::Duration;

/// Scheduler state of a process as reported by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Stopped,
    Zombie,
    Dead,
}

impl ProcState {
    fn from_code(code: char) -> Self {
        match code {
            'T' | 't' => ProcState::Stopped,
            'Z' => ProcState::Zombie,
            'X' | 'x' => ProcState::Dead,
            _ => ProcState::Running,
        }
    }

    /// Alive in the sense of being able to receive job-control signals.
    pub fn is_alive(self) -> bool {
        matches!(self, ProcState::Running | ProcState::Stopped)
    }
}

/// A snapshot of one process-table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcInfo {
    pub state: ProcState,
    /// Start time in clock ticks since boot.
    pub start_ticks: u64,
}

/// Reads the process-table entry of `pid`.
///
/// # Returns
///
/// `Ok(None)` if no such process exists.
pub fn probe(pid: i32) -> io::Result<Option<ProcInfo>> {
    if pid <= 0 {
        return Ok(None);
    }
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(text) => parse_stat(&text).map(Some).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("malformed stat for {}", pid))
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) if err.raw_os_error() == Some(libc::ESRCH) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Parses the contents of `/proc/<pid>/stat`.
///
/// The command name may contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_stat(text: &str) -> Option<ProcInfo> {
    let rest = &text[text.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // Field 22 (starttime); `state` was field 3.
    let start_ticks = fields.nth(18)?.parse().ok()?;
    Some(ProcInfo {
        state: ProcState::from_code(state),
        start_ticks,
    })
}

/// Wall-clock time elapsed since the process started.
pub fn runtime(info: &ProcInfo) -> io::Result<Duration> {
    let uptime = fs::read_to_string("/proc/uptime")?;
    let uptime: f64 = uptime
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/uptime"))?;
    let started = info.start_ticks as f64 / clock_ticks_per_second() as f64;
    Ok(Duration::from_secs_f64((uptime - started).max(0.0)))
}

fn clock_ticks_per_second() -> i64 {
    // Safety: sysconf has no memory-safety preconditions.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 {
        hz as i64
    } else {
        100
    }
}

/// Formats a duration as `[D day[s], ]H:MM:SS[.ffffff]`.
pub fn format_runtime(duration: Duration) -> String {
    let total = duration.as_secs();
    let micros = duration.subsec_micros();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if days > 0 {
        let unit = if days == 1 { "day" } else { "days" };
        out.push_str(&format!("{} {}, ", days, unit));
    }
    out.push_str(&format!("{}:{:02}:{:02}", hours, minutes, seconds));
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    out
}

/// Sends `signal` to `pid`.
pub fn send_signal(pid: i32, signal: libc::c_int) -> io::Result<()> {
    if pid <= 0 {
        return Err(io::Error::from_raw_os_error(libc::ESRCH));
    }
    // Safety: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stat_with_parenthesized_name() {
        let line = "4242 (gema (worker)) T 1 4242 4242 0 -1 4194560 120 0 0 0 3 1 0 0 20 0 1 0 987654 1000 200";
        let info = parse_stat(line).unwrap();
        assert_eq!(info.state, ProcState::Stopped);
        assert_eq!(info.start_ticks, 987654);
    }

    #[test]
    fn zombie_is_not_alive() {
        assert!(!ProcState::from_code('Z').is_alive());
        assert!(ProcState::from_code('S').is_alive());
    }

    #[test]
    fn runtime_format_matches_timedelta() {
        assert_eq!(format_runtime(Duration::from_secs(5)), "0:00:05");
        assert_eq!(
            format_runtime(Duration::from_micros(3_723_000_042)),
            "1:02:03.000042"
        );
        assert_eq!(
            format_runtime(Duration::from_secs(2 * 86_400 + 61)),
            "2 days, 0:01:01"
        );
    }

    #[test]
    fn probe_sees_current_process() {
        let info = probe(std::process::id() as i32).unwrap().unwrap();
        assert_eq!(info.state, ProcState::Running);
        assert!(runtime(&info).is_ok());
    }
}
