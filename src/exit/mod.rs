//! Exit-Event Dispatch.
//!
//! Every time the simulated workload stops the run loop, the engine reports an
//! `ExitStop`: a hypercall code, the raw cause string, an optional payload and
//! the tick at which it happened. The dispatcher translates the stop into an
//! `ExitCategory`, checks it against the expected execution order, records it,
//! and lets the handler registered for the code decide whether the run loop
//! ends.
//!
//! # Hypercall codes
//!
//! | Code | Category          | Default action                    |
//! |------|-------------------|-----------------------------------|
//! | 0    | classic           | per-cause script                  |
//! | 1    | kernel booted     | continue                          |
//! | 2    | after boot        | continue                          |
//! | 3    | after boot script | terminate                         |
//! | 4    | work begin        | reset stats, continue             |
//! | 5    | work end          | dump stats, continue              |
//! | 6    | scheduled tick    | terminate                         |
//! | 7    | checkpoint        | write `cpt.<tick>`, continue      |

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::DispatchError;

/// Dispatcher state machine and its builder.
pub mod dispatcher;

/// Handler trait, builtin handlers and the handler table.
pub mod handler;

/// Per-category exit scripts.
pub mod script;

pub use dispatcher::{Dispatcher, DispatcherBuilder, RunSummary};
pub use handler::{DispatchContext, ExitHandler, HandlerTable};
pub use script::{step, ExitScript, ScriptBook, ScriptStep, SimHandle, Step};

/// Classic exit causes, folded into hypercall code 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitEvent {
    Exit,
    Checkpoint,
    Fail,
    SwitchCpu,
    WorkBegin,
    WorkEnd,
    UserInterrupt,
    MaxTick,
    ScheduledTick,
    SimpointBegin,
    MaxInsts,
    KernelPanic,
    KernelOops,
}

impl ExitEvent {
    pub const ALL: [ExitEvent; 13] = [
        ExitEvent::Exit,
        ExitEvent::Checkpoint,
        ExitEvent::Fail,
        ExitEvent::SwitchCpu,
        ExitEvent::WorkBegin,
        ExitEvent::WorkEnd,
        ExitEvent::UserInterrupt,
        ExitEvent::MaxTick,
        ExitEvent::ScheduledTick,
        ExitEvent::SimpointBegin,
        ExitEvent::MaxInsts,
        ExitEvent::KernelPanic,
        ExitEvent::KernelOops,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExitEvent::Exit => "EXIT",
            ExitEvent::Checkpoint => "CHECKPOINT",
            ExitEvent::Fail => "FAIL",
            ExitEvent::SwitchCpu => "SWITCHCPU",
            ExitEvent::WorkBegin => "WORKBEGIN",
            ExitEvent::WorkEnd => "WORKEND",
            ExitEvent::UserInterrupt => "USER_INTERRUPT",
            ExitEvent::MaxTick => "MAX_TICK",
            ExitEvent::ScheduledTick => "SCHEDULED_TICK",
            ExitEvent::SimpointBegin => "SIMPOINT_BEGIN",
            ExitEvent::MaxInsts => "MAX_INSTS",
            ExitEvent::KernelPanic => "KERNEL_PANIC",
            ExitEvent::KernelOops => "KERNEL_OOPS",
        }
    }

    /// Translates a raw exit cause string reported by the engine.
    ///
    /// # Arguments
    ///
    /// * `cause` - The cause string exactly as the engine reported it
    ///
    /// # Returns
    ///
    /// The matching event, or `DispatchError::UnknownCause`.
    pub fn translate(cause: &str) -> Result<Self, DispatchError> {
        let event = match cause {
            "m5_workbegin instruction encountered" | "workbegin" => ExitEvent::WorkBegin,
            "m5_workend instruction encountered" | "workend" => ExitEvent::WorkEnd,
            "m5_exit instruction encountered" | "exiting with last active thread context" => {
                ExitEvent::Exit
            }
            "simulate() limit reached" => ExitEvent::MaxTick,
            "Tick exit reached" => ExitEvent::ScheduledTick,
            "switchcpu" => ExitEvent::SwitchCpu,
            "m5_fail instruction encountered" => ExitEvent::Fail,
            "checkpoint" => ExitEvent::Checkpoint,
            "user interrupt received" => ExitEvent::UserInterrupt,
            "simpoint starting point found" => ExitEvent::SimpointBegin,
            "a thread reached the max instruction count" => ExitEvent::MaxInsts,
            "Kernel panic in simulated system." => ExitEvent::KernelPanic,
            "Kernel oops in simulated system." => ExitEvent::KernelOops,
            other if other.ends_with("will terminate the simulation.\n") => ExitEvent::Exit,
            other => return Err(DispatchError::UnknownCause(other.to_string())),
        };
        Ok(event)
    }
}

impl fmt::Display for ExitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The category an exit is dispatched under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ExitCategory {
    Classic(ExitEvent),
    KernelBooted,
    AfterBoot,
    AfterBootScript,
    WorkBegin,
    WorkEnd,
    ScheduledTick,
    Checkpoint,
    /// A hypercall code outside the builtin range.
    Other(u32),
}

impl ExitCategory {
    /// Resolves the category of an exit stop.
    ///
    /// Code 0 translates the cause string; codes 1 through 7 map directly and
    /// any other code becomes `Other`.
    pub fn of(stop: &ExitStop) -> Result<Self, DispatchError> {
        Ok(match stop.code {
            0 => ExitCategory::Classic(ExitEvent::translate(&stop.cause)?),
            1 => ExitCategory::KernelBooted,
            2 => ExitCategory::AfterBoot,
            3 => ExitCategory::AfterBootScript,
            4 => ExitCategory::WorkBegin,
            5 => ExitCategory::WorkEnd,
            6 => ExitCategory::ScheduledTick,
            7 => ExitCategory::Checkpoint,
            code => ExitCategory::Other(code),
        })
    }

    /// The hypercall code handled for this category.
    pub fn code(self) -> u32 {
        match self {
            ExitCategory::Classic(_) => 0,
            ExitCategory::KernelBooted => 1,
            ExitCategory::AfterBoot => 2,
            ExitCategory::AfterBootScript => 3,
            ExitCategory::WorkBegin => 4,
            ExitCategory::WorkEnd => 5,
            ExitCategory::ScheduledTick => 6,
            ExitCategory::Checkpoint => 7,
            ExitCategory::Other(code) => code,
        }
    }
}

impl From<ExitEvent> for ExitCategory {
    fn from(event: ExitEvent) -> Self {
        ExitCategory::Classic(event)
    }
}

impl fmt::Display for ExitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCategory::Classic(event) => f.write_str(event.name()),
            ExitCategory::KernelBooted => f.write_str("hypercall:kernel_booted"),
            ExitCategory::AfterBoot => f.write_str("hypercall:after_boot"),
            ExitCategory::AfterBootScript => f.write_str("hypercall:after_boot_script"),
            ExitCategory::WorkBegin => f.write_str("hypercall:work_begin"),
            ExitCategory::WorkEnd => f.write_str("hypercall:work_end"),
            ExitCategory::ScheduledTick => f.write_str("hypercall:scheduled_tick"),
            ExitCategory::Checkpoint => f.write_str("hypercall:checkpoint"),
            ExitCategory::Other(code) => write!(f, "hypercall:{}", code),
        }
    }
}

/// Cause string reported for hypercall exits.
pub const HYPERCALL_CAUSE: &str = "m5_hypercall instruction encountered";

/// One stop of the engine's run loop.
#[derive(Clone, Debug, PartialEq)]
pub struct ExitStop {
    pub code: u32,
    pub cause: String,
    pub payload: BTreeMap<String, String>,
    pub tick: u64,
}

impl ExitStop {
    /// A classic exit identified only by its cause string.
    pub fn classic(cause: impl Into<String>, tick: u64) -> Self {
        Self {
            code: 0,
            cause: cause.into(),
            payload: BTreeMap::new(),
            tick,
        }
    }

    /// A hypercall exit carrying a payload.
    pub fn hypercall(code: u32, payload: BTreeMap<String, String>, tick: u64) -> Self {
        Self {
            code,
            cause: HYPERCALL_CAUSE.to_string(),
            payload,
            tick,
        }
    }
}
