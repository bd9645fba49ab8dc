//! Wizard session entity
//!
//! A session walks a fixed sequence of [`WIZARD_STEPS`] steps. Each accepted
//! input is stored verbatim, mirrored into the conversation history together
//! with the assistant prompt for that step, and advances `current_step` by one.

use crate::ids::{ArtifactId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of steps in a wizard
pub const WIZARD_STEPS: u32 = 5;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// End user
    User,
    /// Wizard prompt
    Assistant,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker
    pub role: TurnRole,
    /// Message text
    pub message: String,
    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

/// Accumulated wizard data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepData {
    /// Raw user inputs, one per step taken
    pub user_inputs: Vec<String>,
    /// Alternating user/assistant turns
    pub conversation_history: Vec<ConversationTurn>,
}

/// Lifecycle state derived from a session at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No input taken yet (step 1)
    Created,
    /// Some steps answered
    InProgress,
    /// All steps answered (terminal)
    Complete,
    /// TTL elapsed before completion
    Expired,
}

/// Wizard session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: SessionId,
    /// Owning user
    pub owner: UserId,
    /// Wizard mode (document family being authored)
    pub mode: String,
    /// 1-based step about to be answered; exceeds [`WIZARD_STEPS`] once complete
    pub current_step: u32,
    /// Inputs and history
    pub step_data: StepData,
    /// Whether every step has been answered
    pub completed: bool,
    /// When the last step was answered
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
    /// Logical expiry instant
    pub expires_at: DateTime<Utc>,
    /// Artifact produced from this session, if any
    pub linked_artifact_id: Option<ArtifactId>,
    /// Optimistic concurrency version, bumped on every stored mutation
    pub version: u64,
}

impl Session {
    /// Create a fresh session at step 1
    #[must_use]
    pub fn new(
        owner: UserId,
        mode: impl Into<String>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: SessionId::new(),
            owner,
            mode: mode.into(),
            current_step: 1,
            step_data: StepData::default(),
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
            expires_at,
            linked_artifact_id: None,
            version: 0,
        }
    }

    /// Whether the TTL has elapsed at `now`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether `owner` owns this session
    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, owner: &UserId) -> bool {
        &self.owner == owner
    }

    /// Lifecycle state at `now`
    ///
    /// A complete session stays complete after its TTL elapses.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.completed {
            SessionState::Complete
        } else if self.is_expired(now) {
            SessionState::Expired
        } else if self.current_step <= 1 {
            SessionState::Created
        } else {
            SessionState::InProgress
        }
    }

    /// Steps left before completion
    #[inline]
    #[must_use]
    pub fn remaining_steps(&self) -> u32 {
        (WIZARD_STEPS + 1).saturating_sub(self.current_step)
    }

    /// Step index used to look up the prompt table (never past the last step)
    #[inline]
    #[must_use]
    pub fn prompt_step(&self) -> u32 {
        self.current_step.clamp(1, WIZARD_STEPS)
    }

    /// Record an accepted input and advance one step
    ///
    /// Callers must have checked the session is neither complete nor expired.
    /// Returns `true` when this input completed the wizard.
    pub fn record_input(
        &mut self,
        text: impl Into<String>,
        assistant_prompt: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let text = text.into();
        self.step_data.user_inputs.push(text.clone());
        self.step_data.conversation_history.push(ConversationTurn {
            role: TurnRole::User,
            message: text,
            timestamp: now,
        });
        self.step_data.conversation_history.push(ConversationTurn {
            role: TurnRole::Assistant,
            message: assistant_prompt.into(),
            timestamp: now,
        });

        self.current_step = self.current_step.saturating_add(1);
        self.updated_at = now;

        if self.current_step > WIZARD_STEPS && !self.completed {
            self.completed = true;
            self.completed_at = Some(now);
            return true;
        }
        false
    }

    /// Link a generated artifact
    pub fn link_artifact(&mut self, artifact_id: ArtifactId, now: DateTime<Utc>) {
        self.linked_artifact_id = Some(artifact_id);
        self.updated_at = now;
    }

    /// All inputs joined into one prompt, one input per line
    #[must_use]
    pub fn composite_prompt(&self) -> String {
        self.step_data.user_inputs.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn session_at(now: DateTime<Utc>) -> Session {
        Session::new(UserId::from("u1"), "sop", now, Duration::hours(24))
    }

    #[test]
    fn new_session_starts_at_step_one() {
        let now = Utc::now();
        let session = session_at(now);

        assert_eq!(session.current_step, 1);
        assert!(!session.completed);
        assert_eq!(session.expires_at, now + Duration::hours(24));
        assert_eq!(session.state(now), SessionState::Created);
        assert_eq!(session.remaining_steps(), 5);
    }

    #[test]
    fn five_inputs_complete_the_wizard() {
        let now = Utc::now();
        let mut session = session_at(now);

        for i in 0..4 {
            assert!(!session.record_input(format!("answer {i}"), "prompt", now));
            assert_eq!(session.state(now), SessionState::InProgress);
        }
        assert!(session.record_input("last", "prompt", now));

        assert!(session.completed);
        assert_eq!(session.current_step, 6);
        assert_eq!(session.completed_at, Some(now));
        assert_eq!(session.step_data.user_inputs.len(), 5);
        assert_eq!(session.step_data.conversation_history.len(), 10);
        assert_eq!(session.prompt_step(), WIZARD_STEPS);
        assert_eq!(session.remaining_steps(), 0);
    }

    #[test]
    fn history_alternates_roles() {
        let now = Utc::now();
        let mut session = session_at(now);
        session.record_input("hello", "What process?", now);

        let roles: Vec<_> = session
            .step_data
            .conversation_history
            .iter()
            .map(|t| t.role)
            .collect();
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Assistant]);
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let now = Utc::now();
        let session = session_at(now);

        assert!(!session.is_expired(session.expires_at));
        assert!(session.is_expired(session.expires_at + Duration::milliseconds(1)));
        assert_eq!(
            session.state(session.expires_at + Duration::seconds(1)),
            SessionState::Expired
        );
    }

    #[test]
    fn composite_prompt_joins_inputs() {
        let now = Utc::now();
        let mut session = session_at(now);
        session.record_input("Customer refund process", "p", now);
        session.record_input("Finance team", "p", now);
        assert_eq!(session.composite_prompt(), "Customer refund process\nFinance team");
    }

    proptest! {
        #[test]
        fn prop_step_never_decreases(inputs in proptest::collection::vec("[a-z]{1,8}", 0..12)) {
            let now = Utc::now();
            let mut session = session_at(now);
            let mut last = session.current_step;

            for input in inputs {
                if session.completed {
                    break;
                }
                session.record_input(input, "prompt", now);
                prop_assert!(session.current_step >= last);
                prop_assert_eq!(session.completed, session.current_step > WIZARD_STEPS);
                last = session.current_step;
            }
        }
    }
}
