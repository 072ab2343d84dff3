mod plan;
mod progress;
mod resume;
mod service;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{BuildError, SessionError};
pub use plan::{SessionBuilder, SessionPlan, build_session, missed_question_ids};
pub use progress::SessionProgress;
pub use resume::{ResumeController, ResumeOffer, SessionEntry};
pub use service::{Advance, AnswerFeedback, PracticeSession, SessionState, SubmitOutcome};
pub use workflow::{AdvanceStep, AnswerStep, CheckpointStatus, CommitStatus, SessionLoopService};
