//! Exit scripts.
//!
//! A script decides, one occurrence at a time, whether a classic exit category
//! ends the run. Scripts are cursors: each call to `advance` consumes one step
//! and a consumed step is never replayed.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use tracing::{debug, warn};

use super::ExitEvent;
use crate::engine::Engine;
use crate::error::DispatchError;

/// Access to the running simulation handed to script steps and handlers.
pub struct SimHandle<'a> {
    pub engine: &'a mut dyn Engine,
    pub checkpoint_dir: &'a Path,
}

/// A single script step. Returns `true` to terminate after this exit.
pub type Step = Box<dyn FnMut(&mut SimHandle<'_>) -> Result<bool, DispatchError>>;

type Generator = Box<dyn FnMut(&mut SimHandle<'_>) -> Option<Result<bool, DispatchError>>>;

/// Boxes a closure as a script step.
pub fn step<F>(f: F) -> Step
where
    F: FnMut(&mut SimHandle<'_>) -> Result<bool, DispatchError> + 'static,
{
    Box::new(f)
}

/// Outcome of advancing a script by one occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptStep {
    Continue,
    Terminate,
    /// The script has no steps left. Nothing was executed.
    Exhausted,
}

impl From<bool> for ScriptStep {
    fn from(terminate: bool) -> Self {
        if terminate {
            ScriptStep::Terminate
        } else {
            ScriptStep::Continue
        }
    }
}

pub enum ExitScript {
    /// Lazy sequence producing one decision per occurrence until it returns `None`.
    Generator(Generator),
    /// Ordered steps, one consumed per occurrence.
    Queue(VecDeque<Step>),
    /// A single step applied on every occurrence.
    Repeat(Step),
}

impl ExitScript {
    pub fn generator<F>(f: F) -> Self
    where
        F: FnMut(&mut SimHandle<'_>) -> Option<Result<bool, DispatchError>> + 'static,
    {
        ExitScript::Generator(Box::new(f))
    }

    pub fn sequence(steps: impl IntoIterator<Item = Step>) -> Self {
        ExitScript::Queue(steps.into_iter().collect())
    }

    pub fn repeat<F>(f: F) -> Self
    where
        F: FnMut(&mut SimHandle<'_>) -> Result<bool, DispatchError> + 'static,
    {
        ExitScript::Repeat(Box::new(f))
    }

    /// A finite script of plain decisions without side effects.
    pub fn decisions<I>(decisions: I) -> Self
    where
        I: IntoIterator<Item = bool>,
        I::IntoIter: 'static,
    {
        let mut iter = decisions.into_iter();
        Self::generator(move |_| iter.next().map(Ok))
    }

    /// Consumes the next step and runs it.
    pub fn advance(&mut self, sim: &mut SimHandle<'_>) -> Result<ScriptStep, DispatchError> {
        let decision = match self {
            ExitScript::Generator(next) => match next(sim) {
                Some(result) => result?,
                None => return Ok(ScriptStep::Exhausted),
            },
            ExitScript::Queue(steps) => match steps.pop_front() {
                Some(mut s) => s(sim)?,
                None => return Ok(ScriptStep::Exhausted),
            },
            ExitScript::Repeat(s) => s(sim)?,
        };
        Ok(decision.into())
    }

    /// Builtin behavior for a classic exit category.
    pub fn default_for(event: ExitEvent) -> Self {
        match event {
            ExitEvent::Exit
            | ExitEvent::Fail
            | ExitEvent::UserInterrupt
            | ExitEvent::MaxTick
            | ExitEvent::ScheduledTick
            | ExitEvent::MaxInsts
            | ExitEvent::KernelPanic
            | ExitEvent::KernelOops => Self::repeat(|_| Ok(true)),
            ExitEvent::Checkpoint => Self::repeat(|sim| {
                let dir = sim
                    .checkpoint_dir
                    .join(format!("cpt.{}", sim.engine.current_tick()));
                sim.engine.checkpoint(&dir)?;
                Ok(false)
            }),
            ExitEvent::WorkBegin | ExitEvent::SimpointBegin => Self::repeat(|sim| {
                sim.engine.reset_stats()?;
                Ok(false)
            }),
            ExitEvent::WorkEnd => Self::repeat(|sim| {
                sim.engine.dump_stats()?;
                Ok(false)
            }),
            ExitEvent::SwitchCpu => Self::repeat(|sim| {
                sim.engine.switch_processor()?;
                Ok(false)
            }),
        }
    }
}

/// Active script per classic exit category.
pub struct ScriptBook {
    scripts: HashMap<ExitEvent, ExitScript>,
}

impl ScriptBook {
    /// A book holding the builtin script of every category.
    pub fn builtin() -> Self {
        let scripts = ExitEvent::ALL
            .into_iter()
            .map(|event| (event, ExitScript::default_for(event)))
            .collect();
        Self { scripts }
    }

    /// Replaces the script for one category.
    pub fn set(&mut self, event: ExitEvent, script: ExitScript) {
        self.scripts.insert(event, script);
    }

    /// Advances the script for `event` and returns whether to terminate.
    ///
    /// An exhausted script is replaced permanently by the builtin one, which
    /// then decides this occurrence.
    pub fn advance(
        &mut self,
        event: ExitEvent,
        sim: &mut SimHandle<'_>,
    ) -> Result<bool, DispatchError> {
        let script = self
            .scripts
            .entry(event)
            .or_insert_with(|| ExitScript::default_for(event));
        match script.advance(sim)? {
            ScriptStep::Terminate => return Ok(true),
            ScriptStep::Continue => return Ok(false),
            ScriptStep::Exhausted => {}
        }

        warn!(
            event = %event,
            "exit script exhausted; falling back to the default behavior"
        );
        let mut fallback = ExitScript::default_for(event);
        let step = fallback.advance(sim)?;
        self.scripts.insert(event, fallback);
        debug!(event = %event, ?step, "default script applied");
        Ok(step == ScriptStep::Terminate)
    }
}

impl Default for ScriptBook {
    fn default() -> Self {
        Self::builtin()
    }
}
