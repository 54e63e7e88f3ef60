//! Property-based tests for nested progress reporting.
//!
//! Drives a monitor with random call sequences and checks it against a
//! plain stack model.

use proptest::prelude::*;
use std::sync::Arc;

use chrono::Utc;
use sessiond_core::NoopEventSink;
use sessiond_registry::{ProgressView, Session, TaskProgressMonitor};

#[derive(Debug, Clone)]
enum Op {
    Begin(String, u32),
    SubTask(String),
    Worked(u32),
    Done,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        ("[a-z]{1,8}", 1u32..1000).prop_map(|(name, total)| Op::Begin(name, total)),
        "[a-z]{1,8}".prop_map(Op::SubTask),
        (0u32..50).prop_map(Op::Worked),
        Just(Op::Done),
    ]
}

fn new_monitor() -> TaskProgressMonitor {
    let session = Session::interactive("progress".into(), Utc::now(), Arc::new(NoopEventSink));
    TaskProgressMonitor::new(Arc::new(session))
}

/// Apply `op` to the model stack the way the monitor is expected to.
fn apply(model: &mut Vec<ProgressView>, op: &Op) {
    match op {
        Op::Begin(name, total) => model.push(ProgressView {
            task: name.clone(),
            total_work: *total,
            worked: 0,
            sub_task: None,
        }),
        Op::SubTask(name) => {
            if let Some(top) = model.last_mut() {
                top.sub_task = Some(name.clone());
            }
        }
        Op::Worked(work) => {
            if let Some(top) = model.last_mut() {
                top.worked = top.worked.saturating_add(*work);
            }
        }
        Op::Done => {
            model.pop();
        }
    }
}

proptest! {
    /// The display always shows the innermost unfinished task as it stood.
    #[test]
    fn display_tracks_innermost_task(ops in prop::collection::vec(op(), 0..64)) {
        let mut monitor = new_monitor();
        let mut model: Vec<ProgressView> = Vec::new();

        for op in &ops {
            match op {
                Op::Begin(name, total) => monitor.begin_task(name, *total),
                Op::SubTask(name) => monitor.sub_task(name),
                Op::Worked(work) => monitor.worked(*work),
                Op::Done => monitor.done(),
            }
            apply(&mut model, op);

            prop_assert_eq!(monitor.depth(), model.len());
            prop_assert_eq!(monitor.sink().current(), model.last());
        }
    }

    /// Frame ids are the depth at which the frame was pushed.
    #[test]
    fn frame_ids_match_depth(depth in 1usize..20) {
        let mut monitor = new_monitor();
        for level in 0..depth {
            monitor.begin_task("nested", 1);
            prop_assert_eq!(monitor.current().map(|frame| frame.id), Some(level));
        }
        for level in (0..depth).rev() {
            prop_assert_eq!(monitor.current().map(|frame| frame.id), Some(level));
            monitor.done();
        }
        prop_assert!(monitor.current().is_none());
    }

    /// Extra `done` calls after the stack is empty change nothing.
    #[test]
    fn surplus_done_is_ignored(extra in 1usize..10) {
        let mut monitor = new_monitor();
        monitor.begin_task("only", 3);
        monitor.done();
        for _ in 0..extra {
            monitor.done();
        }
        prop_assert_eq!(monitor.depth(), 0);
        prop_assert!(monitor.sink().current().is_none());
    }
}
