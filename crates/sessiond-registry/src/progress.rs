//! Nested task progress reported to a session's client.
//!
//! A [`TaskProgressMonitor`] keeps a stack of task frames. Each
//! `begin_task` pushes a frame, `done` pops one and puts the frame beneath
//! back on the [`ProgressSink`] exactly as it stood, so finishing an inner
//! task never clobbers the outer task's display. Calls made with no active
//! task are traced and ignored.

use std::sync::Arc;

use tracing::trace;

use sessiond_core::SessionEvent;

use crate::session::Session;

/// Externally visible progress display.
pub trait ProgressSink {
    /// Start showing a task.
    fn begin_task(&mut self, name: &str, total_work: u32);

    /// Show a sub-task of the current task.
    fn sub_task(&mut self, name: &str);

    /// Add units of work to the current task.
    fn worked(&mut self, work: u32);

    /// Stop showing the current task.
    fn done(&mut self);
}

/// What a [`ProgressDisplay`] currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    /// Task name
    pub task: String,
    /// Total units of work
    pub total_work: u32,
    /// Units worked so far
    pub worked: u32,
    /// Active sub-task
    pub sub_task: Option<String>,
}

/// Default [`ProgressSink`] that just remembers the current task.
#[derive(Debug, Clone, Default)]
pub struct ProgressDisplay {
    current: Option<ProgressView>,
}

impl ProgressDisplay {
    /// The task on display, if any.
    pub fn current(&self) -> Option<&ProgressView> {
        self.current.as_ref()
    }
}

impl ProgressSink for ProgressDisplay {
    fn begin_task(&mut self, name: &str, total_work: u32) {
        self.current = Some(ProgressView {
            task: name.to_string(),
            total_work,
            worked: 0,
            sub_task: None,
        });
    }

    fn sub_task(&mut self, name: &str) {
        if let Some(view) = self.current.as_mut() {
            view.sub_task = Some(name.to_string());
        }
    }

    fn worked(&mut self, work: u32) {
        if let Some(view) = self.current.as_mut() {
            view.worked = view.worked.saturating_add(work);
        }
    }

    fn done(&mut self) {
        self.current = None;
    }
}

/// One task on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFrame {
    /// Frame id (depth at which it was pushed)
    pub id: usize,
    /// Task name
    pub name: String,
    /// Total units of work
    pub total_work: u32,
    /// Units worked so far
    pub worked: u32,
    /// Active sub-task
    pub sub_task: Option<String>,
}

impl TaskFrame {
    fn with_sub_task(&self, name: &str) -> Self {
        Self {
            sub_task: Some(name.to_string()),
            ..self.clone()
        }
    }

    fn with_worked(&self, work: u32) -> Self {
        Self {
            worked: self.worked.saturating_add(work),
            ..self.clone()
        }
    }
}

/// Progress monitor that mirrors nested tasks to a session as events.
#[derive(Debug)]
pub struct TaskProgressMonitor<S: ProgressSink = ProgressDisplay> {
    session: Arc<Session>,
    frames: Vec<TaskFrame>,
    sink: S,
}

impl TaskProgressMonitor<ProgressDisplay> {
    /// Create a monitor for `session` with a [`ProgressDisplay`] sink.
    pub fn new(session: Arc<Session>) -> Self {
        Self::with_sink(session, ProgressDisplay::default())
    }
}

impl<S: ProgressSink> TaskProgressMonitor<S> {
    /// Create a monitor for `session` driving `sink`.
    pub fn with_sink(session: Arc<Session>, sink: S) -> Self {
        Self {
            session,
            frames: Vec::new(),
            sink,
        }
    }

    /// The progress sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of active task frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost active task.
    pub fn current(&self) -> Option<&TaskFrame> {
        self.frames.last()
    }

    /// Push a new task frame.
    pub fn begin_task(&mut self, name: &str, total_work: u32) {
        self.sink.begin_task(name, total_work);
        let frame = TaskFrame {
            id: self.frames.len(),
            name: name.to_string(),
            total_work,
            worked: 0,
            sub_task: None,
        };
        self.session.notify(SessionEvent::TaskStarted {
            task_id: frame.id,
            name: frame.name.clone(),
            total_work,
        });
        self.frames.push(frame);
    }

    /// Enter a sub-task of the innermost task.
    pub fn sub_task(&mut self, name: &str) {
        let Some(top) = self.frames.pop() else {
            trace!(session_id = %self.session.id(), sub_task = name, "Progress sub task without start");
            return;
        };
        let frame = top.with_sub_task(name);
        self.sink.sub_task(name);
        self.session.notify(SessionEvent::SubTaskStarted {
            task_id: frame.id,
            name: name.to_string(),
        });
        self.frames.push(frame);
    }

    /// Report work on the innermost task.
    pub fn worked(&mut self, work: u32) {
        let Some(top) = self.frames.pop() else {
            trace!(session_id = %self.session.id(), work, "Progress info without start");
            return;
        };
        let frame = top.with_worked(work);
        self.sink.worked(work);
        self.session.notify(SessionEvent::TaskProgress {
            task_id: frame.id,
            worked: frame.worked,
            total_work: frame.total_work,
        });
        self.frames.push(frame);
    }

    /// Finish the innermost task and restore the one beneath it.
    pub fn done(&mut self) {
        let Some(finished) = self.frames.pop() else {
            trace!(session_id = %self.session.id(), "Progress ended without start");
            return;
        };
        self.session
            .notify(SessionEvent::TaskFinished { task_id: finished.id });
        self.sink.done();

        if let Some(outer) = self.frames.last() {
            self.sink.begin_task(&outer.name, outer.total_work);
            if let Some(sub_task) = &outer.sub_task {
                self.sink.sub_task(sub_task);
            }
            if outer.worked > 0 {
                self.sink.worked(outer.worked);
            }
        }
    }
}
