//! Exit handlers.
//!
//! One handler per hypercall code. The table is built explicitly when the
//! dispatcher is constructed; callers can replace any entry before the run
//! starts.

use std::collections::BTreeMap;

use tracing::info;

use super::script::{ScriptBook, SimHandle};
use super::{ExitCategory, ExitStop};
use crate::error::DispatchError;

/// Everything a handler can see and touch while processing one exit.
pub struct DispatchContext<'a> {
    pub category: ExitCategory,
    pub stop: &'a ExitStop,
    pub scripts: &'a mut ScriptBook,
    pub sim: SimHandle<'a>,
}

/// Processes one exit and decides whether the run loop stops.
pub trait ExitHandler {
    /// Performs the side effects of the exit.
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError>;

    /// Returns `true` if the run loop should stop after the last `process`.
    fn should_terminate(&self) -> bool;
}

/// Code 0: defers to the script of the translated classic category.
#[derive(Default)]
pub struct ClassicHandler {
    terminate: bool,
}

impl ExitHandler for ClassicHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        self.terminate = match ctx.category {
            ExitCategory::Classic(event) => ctx.scripts.advance(event, &mut ctx.sim)?,
            _ => false,
        };
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        self.terminate
    }
}

/// Code 1.
pub struct KernelBootedHandler;

impl ExitHandler for KernelBootedHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        info!(tick = ctx.stop.tick, "kernel booted");
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        false
    }
}

/// Code 2.
pub struct AfterBootHandler;

impl ExitHandler for AfterBootHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        info!(tick = ctx.stop.tick, "after boot");
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        false
    }
}

/// Code 3.
pub struct AfterBootScriptHandler;

impl ExitHandler for AfterBootScriptHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        info!(tick = ctx.stop.tick, "after boot script finished");
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        true
    }
}

/// Code 4.
pub struct WorkBeginHandler;

impl ExitHandler for WorkBeginHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        info!(tick = ctx.stop.tick, "work begin; resetting stats");
        ctx.sim.engine.reset_stats()?;
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        false
    }
}

/// Code 5.
pub struct WorkEndHandler;

impl ExitHandler for WorkEndHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        info!(tick = ctx.stop.tick, "work end; dumping stats");
        ctx.sim.engine.dump_stats()?;
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        false
    }
}

/// Code 6. Stops the run and records why and when it was scheduled.
#[derive(Default)]
pub struct ScheduledTickHandler {
    justification: Option<String>,
    scheduled_at_tick: Option<String>,
}

impl ScheduledTickHandler {
    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn scheduled_at_tick(&self) -> Option<&str> {
        self.scheduled_at_tick.as_deref()
    }
}

impl ExitHandler for ScheduledTickHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        self.justification = ctx.stop.payload.get("justification").cloned();
        self.scheduled_at_tick = ctx.stop.payload.get("scheduled_at_tick").cloned();
        info!(
            tick = ctx.stop.tick,
            justification = self.justification.as_deref().unwrap_or("unspecified"),
            scheduled_at_tick = self.scheduled_at_tick.as_deref().unwrap_or("unspecified"),
            "scheduled tick exit"
        );
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        true
    }
}

/// Code 7. Writes `cpt.<tick>` under the checkpoint directory.
pub struct CheckpointHandler;

impl ExitHandler for CheckpointHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        let tick = ctx.sim.engine.current_tick();
        let dir = ctx.sim.checkpoint_dir.join(format!("cpt.{}", tick));
        info!(tick, dir = %dir.display(), "taking checkpoint");
        ctx.sim.engine.checkpoint(&dir)?;
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        false
    }
}

/// Handlers keyed by hypercall code.
pub struct HandlerTable {
    handlers: BTreeMap<u32, Box<dyn ExitHandler>>,
}

impl HandlerTable {
    /// The builtin handler for every code from 0 to 7.
    pub fn builtin() -> Self {
        let mut handlers: BTreeMap<u32, Box<dyn ExitHandler>> = BTreeMap::new();
        handlers.insert(0, Box::new(ClassicHandler::default()));
        handlers.insert(1, Box::new(KernelBootedHandler));
        handlers.insert(2, Box::new(AfterBootHandler));
        handlers.insert(3, Box::new(AfterBootScriptHandler));
        handlers.insert(4, Box::new(WorkBeginHandler));
        handlers.insert(5, Box::new(WorkEndHandler));
        handlers.insert(6, Box::new(ScheduledTickHandler::default()));
        handlers.insert(7, Box::new(CheckpointHandler));
        Self { handlers }
    }

    /// Replaces (or adds) the handler for `code`.
    pub fn set(&mut self, code: u32, handler: Box<dyn ExitHandler>) {
        self.handlers.insert(code, handler);
    }

    pub fn get_mut(&mut self, code: u32) -> Option<&mut (dyn ExitHandler + 'static)> {
        self.handlers.get_mut(&code).map(|h| h.as_mut())
    }

    pub fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        self.handlers.keys().copied()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::builtin()
    }
}
