use std::time::Duration;

use crate::{
    foundation::{
        core::Clock,
        error::{FramecutError, FramecutResult},
    },
    video::media::{MediaElement, MediaEvent},
};

/// Targets this close to the current position count as already reached.
pub const SEEK_EPSILON: f64 = 0.01;

/// Default wall-clock budget for one seek.
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_millis(2500);

/// Why a seek ended in [`SeekState::Failed`].
#[derive(Clone, Debug, PartialEq)]
pub enum SeekFailure {
    /// No completion path fired before the deadline.
    Timeout,
    /// The element reported an error.
    Error(String),
}

/// Per-timestamp seek lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum SeekState {
    /// Not started.
    Idle,
    /// Seek issued. `landed` is set once `Seeked`/`LoadedData` fired (or the target was
    /// already current) and only a frame callback is outstanding.
    Seeking {
        /// Whether the playback position has reached the target.
        landed: bool,
    },
    /// Terminal: the current frame matches the target.
    Done,
    /// Terminal: the seek failed.
    Failed(SeekFailure),
}

impl SeekState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Single-shot seek state machine.
///
/// Every transition method returns `true` exactly when it performed the terminal transition;
/// once terminal, all further input is ignored.
#[derive(Clone, Debug)]
pub struct SeekMachine {
    target: f64,
    wait_for_frame: bool,
    state: SeekState,
}

impl SeekMachine {
    /// Machine for `target`. With `wait_for_frame`, completion also needs a frame callback.
    pub fn new(target: f64, wait_for_frame: bool) -> Self {
        Self {
            target,
            wait_for_frame,
            state: SeekState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SeekState {
        &self.state
    }

    /// Consume the machine, yielding its final state.
    pub fn into_state(self) -> SeekState {
        self.state
    }

    /// `Idle -> Seeking`, given the playback position before the seek was issued.
    ///
    /// Engines may never fire `Seeked` when the target equals the current position, so a
    /// target within [`SEEK_EPSILON`] takes the landed path straight away.
    pub fn begin(&mut self, current_time: f64) -> bool {
        if self.state != SeekState::Idle {
            return false;
        }
        self.state = SeekState::Seeking { landed: false };
        if (self.target - current_time).abs() < SEEK_EPSILON {
            return self.land();
        }
        false
    }

    /// Feed one element event.
    pub fn on_event(&mut self, event: &MediaEvent) -> bool {
        match (&self.state, event) {
            (SeekState::Seeking { .. }, MediaEvent::Seeked | MediaEvent::LoadedData) => {
                self.land()
            }
            (SeekState::Seeking { landed: true }, MediaEvent::FrameReady) => {
                self.finish(SeekState::Done)
            }
            (SeekState::Seeking { .. }, MediaEvent::Error(reason)) => {
                self.finish(SeekState::Failed(SeekFailure::Error(reason.clone())))
            }
            _ => false,
        }
    }

    /// The deadline elapsed.
    pub fn on_timeout(&mut self) -> bool {
        if matches!(self.state, SeekState::Seeking { .. }) {
            return self.finish(SeekState::Failed(SeekFailure::Timeout));
        }
        false
    }

    fn land(&mut self) -> bool {
        if self.wait_for_frame {
            self.state = SeekState::Seeking { landed: true };
            false
        } else {
            self.finish(SeekState::Done)
        }
    }

    fn finish(&mut self, terminal: SeekState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = terminal;
        true
    }
}

/// Move `element` to `target` and wait until its current frame reflects it.
///
/// Listeners are armed for the duration of the seek and disarmed exactly once, whichever
/// terminal transition happens first.
pub fn drive_seek(
    element: &mut dyn MediaElement,
    target: f64,
    clock: &dyn Clock,
    timeout: Duration,
) -> FramecutResult<()> {
    let mut machine = SeekMachine::new(target, element.supports_frame_callback());
    let start_time = element.current_time();
    let deadline = clock.now() + timeout;

    element.listen();
    if let Err(err) = element.seek(target) {
        element.unlisten();
        return Err(err);
    }

    let mut terminal = machine.begin(start_time);
    while !terminal {
        let now = clock.now();
        if now >= deadline {
            terminal = machine.on_timeout();
            break;
        }
        if let Some(event) = element.next_event(deadline - now) {
            terminal = machine.on_event(&event);
        }
    }
    element.unlisten();

    match machine.into_state() {
        SeekState::Done => Ok(()),
        SeekState::Failed(SeekFailure::Timeout) => Err(FramecutError::SeekTimeout {
            target,
            timeout_ms: timeout.as_millis() as u64,
        }),
        SeekState::Failed(SeekFailure::Error(reason)) => Err(FramecutError::seek(target, reason)),
        other => Err(FramecutError::seek(
            target,
            format!("seek ended in non-terminal state {other:?}"),
        )),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/seek.rs"]
mod tests;
