//! Session states and the report a finished session hands back.

use std::fmt;

use crate::resource::ResourceSpec;

/// State of a supervision session.
///
/// ```text
/// Idle → EnsuringResource → Running ─┬─► Done
///                              ▲      ├─► HandlingTimeout    ─┐
///                              │      ├─► HandlingPreemption ─┤
///                              │      ├─► HandlingError      ─┤
///                              └──────┴───────────────────────┘
///                                     └─► Fatal
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    EnsuringResource,
    Running,
    HandlingTimeout,
    HandlingPreemption,
    HandlingError,
    Done,
    Fatal,
}

impl SessionState {
    /// Returns a short stable label (snake_case).
    pub fn as_label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::EnsuringResource => "ensuring_resource",
            SessionState::Running => "running",
            SessionState::HandlingTimeout => "handling_timeout",
            SessionState::HandlingPreemption => "handling_preemption",
            SessionState::HandlingError => "handling_error",
            SessionState::Done => "done",
            SessionState::Fatal => "fatal",
        }
    }

    /// `true` for `Done` and `Fatal`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Fatal)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Summary of a session that ended in `Done`.
#[derive(Clone, Debug)]
pub struct SessionReport {
    /// The resource the job finished on.
    pub resource: ResourceSpec,
    /// Attempts launched, including the successful one.
    pub attempts: u32,
    /// Successful resource recreations.
    pub recreations: u32,
    /// Every state the session went through, in order.
    pub history: Vec<SessionState>,
}
