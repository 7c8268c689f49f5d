//! Running/stopped state, visibility-driven pausing and frame scheduling.
//!
//! The frame loop is cooperative: a running instance asks its
//! [`FrameScheduler`] for one more frame after finishing the current one.
//! Nothing is queued; a slow frame just delays the next request. Stopping
//! cancels the outstanding request synchronously, so no partial frame runs
//! after [`Lifecycle::stop`] returns.

use std::cell::RefCell;
use std::rc::Rc;

/// Host hook that delivers frames, typically tied to display refresh.
pub trait FrameScheduler {
    /// Ask for one frame to be delivered later.
    fn schedule_next_frame(&mut self);
    /// Withdraw the outstanding request, if any.
    fn cancel_scheduled(&mut self);
}

#[derive(Debug, Default)]
struct ManualState {
    pending: bool,
    requested: u64,
    cancelled: u64,
}

/// A scheduler driven by hand, for tests and headless rendering.
///
/// Clones share state, so one copy can live inside the instance while the
/// driver keeps another to see whether a frame is due.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    /// A scheduler with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if a frame was requested and not yet delivered or cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending
    }

    /// Deliver the pending request. Returns false if none was pending.
    pub fn fire(&self) -> bool {
        std::mem::take(&mut self.state.borrow_mut().pending)
    }

    /// Total frames requested so far.
    pub fn requested(&self) -> u64 {
        self.state.borrow().requested
    }

    /// Total requests withdrawn so far.
    pub fn cancelled(&self) -> u64 {
        self.state.borrow().cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn schedule_next_frame(&mut self) {
        let mut state = self.state.borrow_mut();
        state.pending = true;
        state.requested += 1;
    }

    fn cancel_scheduled(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.pending {
            state.pending = false;
            state.cancelled += 1;
        }
    }
}

/// Whether the frame loop is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

/// What a lifecycle call did, so the owner can update its clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

/// The running/stopped state machine.
///
/// Leaving the viewport stops a running instance and remembers that it was
/// running; coming back resumes it. An explicit [`stop`](Self::stop) clears
/// that memory, so a manually paused instance stays paused when it scrolls
/// back into view.
#[derive(Debug)]
pub struct Lifecycle {
    state: RunState,
    resume_on_visible: bool,
    visible: bool,
    frame_pending: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: RunState::Stopped,
            resume_on_visible: true,
            visible: true,
            frame_pending: false,
        }
    }
}

impl Lifecycle {
    /// Stopped and visible, with no frame outstanding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit start. Schedules the first frame.
    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) -> Transition {
        self.resume_on_visible = true;
        self.enter_running(scheduler)
    }

    /// Explicit stop. Cancels the pending frame and disables auto-resume.
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) -> Transition {
        self.resume_on_visible = false;
        self.enter_stopped(scheduler)
    }

    /// Viewport visibility changed.
    pub fn set_visible(&mut self, visible: bool, scheduler: &mut dyn FrameScheduler) -> Transition {
        if visible == self.visible {
            return Transition::Unchanged;
        }
        self.visible = visible;

        if visible {
            if self.state == RunState::Stopped && self.resume_on_visible {
                log::debug!("visible again, resuming");
                return self.enter_running(scheduler);
            }
            Transition::Unchanged
        } else {
            self.resume_on_visible = self.state == RunState::Running;
            self.enter_stopped(scheduler)
        }
    }

    /// Consume the pending frame. Returns true if a frame should be drawn now.
    pub fn take_frame(&mut self) -> bool {
        self.state == RunState::Running && std::mem::take(&mut self.frame_pending)
    }

    /// Ask for the next frame after finishing the current one.
    pub fn request_next(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.state == RunState::Running && !self.frame_pending {
            self.frame_pending = true;
            scheduler.schedule_next_frame();
        }
    }

    fn enter_running(&mut self, scheduler: &mut dyn FrameScheduler) -> Transition {
        if self.state == RunState::Running {
            return Transition::Unchanged;
        }
        self.state = RunState::Running;
        self.request_next(scheduler);
        Transition::Started
    }

    fn enter_stopped(&mut self, scheduler: &mut dyn FrameScheduler) -> Transition {
        if self.state == RunState::Stopped {
            return Transition::Unchanged;
        }
        self.state = RunState::Stopped;
        if std::mem::take(&mut self.frame_pending) {
            scheduler.cancel_scheduled();
        }
        Transition::Stopped
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Shorthand for `state() == RunState::Running`.
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Last visibility reported by the host. Starts out visible.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether becoming visible would start the loop again.
    pub fn resumes_on_visible(&self) -> bool {
        self.resume_on_visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_schedules_and_stop_cancels() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();

        assert_eq!(lifecycle.start(&mut scheduler), Transition::Started);
        assert!(scheduler.is_pending());

        assert_eq!(lifecycle.stop(&mut scheduler), Transition::Stopped);
        assert!(!scheduler.is_pending());
        assert_eq!(scheduler.cancelled(), 1);
        assert!(!lifecycle.take_frame());
    }

    #[test]
    fn double_start_schedules_once() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();

        lifecycle.start(&mut scheduler);
        assert_eq!(lifecycle.start(&mut scheduler), Transition::Unchanged);
        assert_eq!(scheduler.requested(), 1);
    }

    #[test]
    fn hidden_then_visible_resumes() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();
        lifecycle.start(&mut scheduler);

        assert_eq!(lifecycle.set_visible(false, &mut scheduler), Transition::Stopped);
        assert!(!scheduler.is_pending());

        assert_eq!(lifecycle.set_visible(true, &mut scheduler), Transition::Started);
        assert!(scheduler.is_pending());
    }

    #[test]
    fn manual_stop_is_not_undone_by_visibility() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();
        lifecycle.start(&mut scheduler);
        lifecycle.stop(&mut scheduler);

        lifecycle.set_visible(false, &mut scheduler);
        assert_eq!(lifecycle.set_visible(true, &mut scheduler), Transition::Unchanged);
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn manual_stop_while_hidden_is_not_undone_either() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();
        lifecycle.start(&mut scheduler);
        lifecycle.set_visible(false, &mut scheduler);
        lifecycle.stop(&mut scheduler);

        assert_eq!(lifecycle.set_visible(true, &mut scheduler), Transition::Unchanged);
        assert!(!lifecycle.is_running());
    }

    #[test]
    fn frames_are_taken_once_per_request() {
        let mut scheduler = ManualScheduler::new();
        let mut lifecycle = Lifecycle::new();
        lifecycle.start(&mut scheduler);

        assert!(lifecycle.take_frame());
        assert!(!lifecycle.take_frame());

        lifecycle.request_next(&mut scheduler);
        assert!(lifecycle.take_frame());
    }
}
