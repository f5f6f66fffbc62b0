//! Integration tests for the exit-event dispatcher.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gema::engine::Engine;
use gema::error::DispatchError;
use gema::exit::{
    step, DispatchContext, Dispatcher, ExitCategory, ExitEvent, ExitHandler, ExitScript, ExitStop,
};

const M5_EXIT: &str = "m5_exit instruction encountered";
const M5_FAIL: &str = "m5_fail instruction encountered";
const WORKBEGIN: &str = "workbegin";
const WORKEND: &str = "workend";

/// Engine that replays a fixed list of stops and records side effects.
#[derive(Default)]
struct FakeEngine {
    stops: VecDeque<ExitStop>,
    tick: u64,
    checkpoints: Vec<PathBuf>,
    resets: usize,
    dumps: usize,
    switches: usize,
}

impl FakeEngine {
    fn new(stops: Vec<ExitStop>) -> Self {
        Self {
            stops: stops.into(),
            ..Self::default()
        }
    }

    fn classic(causes: &[&str]) -> Self {
        let stops = causes
            .iter()
            .enumerate()
            .map(|(i, cause)| ExitStop::classic(*cause, (i as u64 + 1) * 1000))
            .collect();
        Self::new(stops)
    }
}

impl Engine for FakeEngine {
    fn run(&mut self) -> io::Result<ExitStop> {
        let stop = self
            .stops
            .pop_front()
            .unwrap_or_else(|| ExitStop::classic("simulate() limit reached", self.tick + 1));
        self.tick = stop.tick;
        Ok(stop)
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn checkpoint(&mut self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)?;
        self.checkpoints.push(dir.to_path_buf());
        Ok(())
    }

    fn reset_stats(&mut self) -> io::Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn dump_stats(&mut self) -> io::Result<()> {
        self.dumps += 1;
        Ok(())
    }

    fn switch_processor(&mut self) -> io::Result<()> {
        self.switches += 1;
        Ok(())
    }
}

fn payload(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Tests that the default exit script terminates on the first exit.
#[test]
fn test_default_exit_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path()).build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.cause, M5_EXIT);
    assert_eq!(summary.exits, 1);
    assert_eq!(summary.tick, 1000);
    assert_eq!(dispatcher.last_cause(), Some(M5_EXIT));
}

/// Tests that an expected order is satisfied by a matching run.
#[test]
fn test_expected_order_matches() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_EXIT, M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::Exit, ExitScript::decisions([false, true]))
        .expected_order([ExitEvent::Exit, ExitEvent::Exit])
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 2);
    assert_eq!(
        dispatcher.history(),
        &[
            (ExitCategory::Classic(ExitEvent::Exit), 1000),
            (ExitCategory::Classic(ExitEvent::Exit), 2000)
        ]
    );
}

/// Tests that a mismatched category is rejected before it is recorded.
#[test]
fn test_expected_order_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_FAIL, M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .expected_order([ExitEvent::Exit, ExitEvent::Exit])
        .build();

    let err = dispatcher.run(&mut engine).unwrap_err();
    match err {
        DispatchError::UnexpectedExit { expected, found } => {
            assert_eq!(expected, "EXIT");
            assert_eq!(found, "FAIL");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dispatcher.history().is_empty());
}

/// Tests that exits beyond the expected order are a violation.
#[test]
fn test_expected_order_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_EXIT, M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::Exit, ExitScript::decisions([false, true]))
        .expected_order([ExitEvent::Exit])
        .build();

    assert!(matches!(
        dispatcher.run(&mut engine),
        Err(DispatchError::OrderExhausted { .. })
    ));
    assert_eq!(dispatcher.history().len(), 1);
}

/// Tests that an exhausted script falls back to the default behavior.
#[test]
fn test_exhausted_script_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[WORKBEGIN, WORKBEGIN, M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::WorkBegin, ExitScript::decisions([false]))
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 3);
    // The first workbegin is decided by the custom script, the second by the
    // builtin one, which resets the statistics.
    assert_eq!(engine.resets, 1);
}

/// Tests that sequence steps run in order and act on the engine.
#[test]
fn test_sequence_script_steps() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_EXIT, M5_EXIT, M5_EXIT]);
    let script = ExitScript::sequence([
        step(|sim| {
            sim.engine.switch_processor()?;
            Ok(false)
        }),
        step(|sim| {
            sim.engine.dump_stats()?;
            Ok(false)
        }),
    ]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::Exit, script)
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 3);
    assert_eq!(engine.switches, 1);
    assert_eq!(engine.dumps, 1);
}

/// Tests that a generator is pulled once per occurrence and decides each one.
#[test]
fn test_generator_script_is_lazy() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[M5_EXIT, M5_EXIT, M5_EXIT, M5_EXIT]);
    let pulls = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&pulls);
    let script = ExitScript::generator(move |sim| {
        counter.set(counter.get() + 1);
        if let Err(err) = sim.engine.dump_stats() {
            return Some(Err(err.into()));
        }
        Some(Ok(counter.get() == 3))
    });
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::Exit, script)
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 3);
    assert_eq!(summary.tick, 3000);
    assert_eq!(pulls.get(), 3);
    assert_eq!(engine.dumps, 3);
    assert_eq!(engine.stops.len(), 1);
}

/// Tests that a repeated callable handles every occurrence of its category.
#[test]
fn test_repeat_script_runs_every_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[WORKEND, WORKEND, WORKEND, M5_EXIT]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(
            ExitEvent::WorkEnd,
            ExitScript::repeat(|sim| {
                sim.engine.switch_processor()?;
                Ok(false)
            }),
        )
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 4);
    assert_eq!(summary.cause, M5_EXIT);
    assert_eq!(engine.switches, 3);
    assert_eq!(engine.dumps, 0);
}

/// Tests that once a queue runs dry its category keeps the default behavior.
#[test]
fn test_exhausted_queue_stays_on_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&[WORKBEGIN, WORKBEGIN, WORKBEGIN, M5_EXIT]);
    let script = ExitScript::sequence([step(|sim| {
        sim.engine.dump_stats()?;
        Ok(false)
    })]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .on_exit_event(ExitEvent::WorkBegin, script)
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 4);
    assert_eq!(engine.dumps, 1);
    // Second and third workbegin both reset the statistics.
    assert_eq!(engine.resets, 2);
    assert_eq!(
        &dispatcher.history()[..3],
        &[
            (ExitCategory::Classic(ExitEvent::WorkBegin), 1000),
            (ExitCategory::Classic(ExitEvent::WorkBegin), 2000),
            (ExitCategory::Classic(ExitEvent::WorkBegin), 3000)
        ]
    );
}

/// Tests the builtin work markers and the after-boot-script hypercall.
#[test]
fn test_hypercall_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(vec![
        ExitStop::hypercall(1, BTreeMap::new(), 10),
        ExitStop::hypercall(2, BTreeMap::new(), 20),
        ExitStop::hypercall(4, BTreeMap::new(), 30),
        ExitStop::hypercall(5, BTreeMap::new(), 40),
        ExitStop::hypercall(3, BTreeMap::new(), 50),
    ]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .expected_order([
            ExitCategory::KernelBooted,
            ExitCategory::AfterBoot,
            ExitCategory::WorkBegin,
            ExitCategory::WorkEnd,
            ExitCategory::AfterBootScript,
        ])
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 5);
    assert_eq!(summary.tick, 50);
    assert_eq!(engine.resets, 1);
    assert_eq!(engine.dumps, 1);
}

/// Tests that the checkpoint hypercall writes under the checkpoint directory.
#[test]
fn test_checkpoint_hypercall() {
    let dir = tempfile::tempdir().unwrap();
    let cpt_root = dir.path().join("checkpoints");
    let mut engine = FakeEngine::new(vec![
        ExitStop::hypercall(7, BTreeMap::new(), 1234),
        ExitStop::classic(M5_EXIT, 2000),
    ]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .checkpoint_dir(&cpt_root)
        .build();

    dispatcher.run(&mut engine).unwrap();
    assert_eq!(engine.checkpoints, vec![cpt_root.join("cpt.1234")]);
    assert!(cpt_root.join("cpt.1234").is_dir());
}

/// Tests that the scheduled-tick hypercall ends the run.
#[test]
fn test_scheduled_tick_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let stop = ExitStop::hypercall(
        6,
        payload(&[("justification", "warmup done"), ("scheduled_at_tick", "500")]),
        900,
    );
    let mut engine = FakeEngine::new(vec![stop, ExitStop::classic(M5_EXIT, 2000)]);
    let mut dispatcher = Dispatcher::builder(dir.path()).build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 1);
    assert_eq!(summary.tick, 900);
}

/// Tests that an unknown hypercall code is an error.
#[test]
fn test_unknown_hypercall_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(vec![ExitStop::hypercall(42, BTreeMap::new(), 5)]);
    let mut dispatcher = Dispatcher::builder(dir.path()).build();

    assert!(matches!(
        dispatcher.run(&mut engine),
        Err(DispatchError::UnknownHandler(42))
    ));
}

/// Handler counting occurrences and terminating on the second.
#[derive(Default)]
struct CountingHandler {
    seen: usize,
    notes: Vec<String>,
}

impl ExitHandler for CountingHandler {
    fn process(&mut self, ctx: &mut DispatchContext<'_>) -> Result<(), DispatchError> {
        self.seen += 1;
        if let Some(note) = ctx.stop.payload.get("note") {
            self.notes.push(note.clone());
        }
        Ok(())
    }

    fn should_terminate(&self) -> bool {
        self.seen >= 2 && self.notes.len() == self.seen
    }
}

/// Tests that a registered handler serves a new hypercall code.
#[test]
fn test_custom_handler_for_new_code() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::new(vec![
        ExitStop::hypercall(42, payload(&[("note", "first")]), 5),
        ExitStop::hypercall(42, payload(&[("note", "second")]), 6),
    ]);
    let mut dispatcher = Dispatcher::builder(dir.path())
        .handler(42, CountingHandler::default())
        .build();

    let summary = dispatcher.run(&mut engine).unwrap();
    assert_eq!(summary.exits, 2);
    assert_eq!(dispatcher.history()[1], (ExitCategory::Other(42), 6));
}

/// Tests that an unrecognized cause string is an error.
#[test]
fn test_unknown_cause() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = FakeEngine::classic(&["something odd"]);
    let mut dispatcher = Dispatcher::builder(dir.path()).build();

    assert!(matches!(
        dispatcher.run(&mut engine),
        Err(DispatchError::UnknownCause(_))
    ));
}
