//! Dispatcher state machine.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::handler::{DispatchContext, ExitHandler, HandlerTable};
use super::script::{ExitScript, ScriptBook, SimHandle};
use super::{ExitCategory, ExitEvent, ExitStop};
use crate::engine::Engine;
use crate::error::DispatchError;

/// Result of a completed run loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Raw cause string of the exit that ended the run.
    pub cause: String,
    /// Engine tick after the final exit was handled.
    pub tick: u64,
    /// Number of exits dispatched, including the final one.
    pub exits: usize,
}

/// Decides, for each exit the engine reports, whether the run continues.
pub struct Dispatcher {
    handlers: HandlerTable,
    scripts: ScriptBook,
    expected_order: Option<Vec<ExitCategory>>,
    history: Vec<(ExitCategory, u64)>,
    checkpoint_dir: PathBuf,
    last_cause: Option<String>,
}

impl Dispatcher {
    /// Starts building a dispatcher whose checkpoints default to `outdir`.
    pub fn builder(outdir: impl Into<PathBuf>) -> DispatcherBuilder {
        DispatcherBuilder::new(outdir)
    }

    /// Dispatches one exit.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine that produced the exit; handlers act on it
    /// * `stop` - The exit to dispatch
    ///
    /// # Returns
    ///
    /// `true` if the run loop should stop. A category that does not match the
    /// expected execution order is a protocol violation and is returned as an
    /// error before anything is recorded.
    pub fn dispatch(
        &mut self,
        engine: &mut dyn Engine,
        stop: &ExitStop,
    ) -> Result<bool, DispatchError> {
        let category = ExitCategory::of(stop)?;

        if let Some(order) = &self.expected_order {
            match order.get(self.history.len()) {
                Some(expected) if *expected == category => {}
                Some(expected) => {
                    return Err(DispatchError::UnexpectedExit {
                        expected: expected.to_string(),
                        found: category.to_string(),
                    })
                }
                None => {
                    return Err(DispatchError::OrderExhausted {
                        found: category.to_string(),
                    })
                }
            }
        }

        let code = category.code();
        let handler = self
            .handlers
            .get_mut(code)
            .ok_or(DispatchError::UnknownHandler(code))?;

        self.history.push((category, stop.tick));
        self.last_cause = Some(stop.cause.clone());

        let mut ctx = DispatchContext {
            category,
            stop,
            scripts: &mut self.scripts,
            sim: SimHandle {
                engine,
                checkpoint_dir: &self.checkpoint_dir,
            },
        };
        handler.process(&mut ctx)?;
        let terminate = handler.should_terminate();

        debug!(category = %category, tick = stop.tick, terminate, "exit dispatched");
        Ok(terminate)
    }

    /// Runs the engine until a handler asks to stop.
    pub fn run(&mut self, engine: &mut dyn Engine) -> Result<RunSummary, DispatchError> {
        loop {
            let stop = engine.run()?;
            if self.dispatch(&mut *engine, &stop)? {
                let summary = RunSummary {
                    cause: stop.cause,
                    tick: engine.current_tick(),
                    exits: self.history.len(),
                };
                info!(cause = %summary.cause, tick = summary.tick, "run loop finished");
                return Ok(summary);
            }
        }
    }

    /// Every dispatched exit with the tick it happened at, oldest first.
    pub fn history(&self) -> &[(ExitCategory, u64)] {
        &self.history
    }

    pub fn last_cause(&self) -> Option<&str> {
        self.last_cause.as_deref()
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}

/// Builder for `Dispatcher`.
pub struct DispatcherBuilder {
    handlers: HandlerTable,
    scripts: ScriptBook,
    expected_order: Option<Vec<ExitCategory>>,
    checkpoint_dir: PathBuf,
}

impl DispatcherBuilder {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            handlers: HandlerTable::builtin(),
            scripts: ScriptBook::builtin(),
            expected_order: None,
            checkpoint_dir: outdir.into(),
        }
    }

    /// Replaces the script for a classic exit category.
    pub fn on_exit_event(mut self, event: ExitEvent, script: ExitScript) -> Self {
        self.scripts.set(event, script);
        self
    }

    /// Requires exits to arrive exactly in this order.
    pub fn expected_order<I, C>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ExitCategory>,
    {
        self.expected_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Replaces the handler for a hypercall code.
    pub fn handler(mut self, code: u32, handler: impl ExitHandler + 'static) -> Self {
        self.handlers.set(code, Box::new(handler));
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
            scripts: self.scripts,
            expected_order: self.expected_order,
            history: Vec::new(),
            checkpoint_dir: self.checkpoint_dir,
            last_cause: None,
        }
    }
}
