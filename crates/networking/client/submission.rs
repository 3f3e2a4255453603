use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one atom submission.
///
/// ```text
/// CREATED -> SUBMITTING -> SUBMITTED -> STORED
///                                 \-> COLLISION | ILLEGAL_STATE
///                                   | UNSUITABLE_PEER | VALIDATION_ERROR
/// ```
///
/// `STORED` is the terminal success; the four failure codes are terminal too
/// and surface on the submission stream as `"<CODE>: <message>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Created,
    Submitting,
    Submitted,
    Stored,
    Collision,
    IllegalState,
    UnsuitablePeer,
    ValidationError,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Stored
                | SubmissionState::Collision
                | SubmissionState::IllegalState
                | SubmissionState::UnsuitablePeer
                | SubmissionState::ValidationError
        )
    }

    pub fn is_failure(&self) -> bool {
        self.is_terminal() && *self != SubmissionState::Stored
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            SubmissionState::Created => "CREATED",
            SubmissionState::Submitting => "SUBMITTING",
            SubmissionState::Submitted => "SUBMITTED",
            SubmissionState::Stored => "STORED",
            SubmissionState::Collision => "COLLISION",
            SubmissionState::IllegalState => "ILLEGAL_STATE",
            SubmissionState::UnsuitablePeer => "UNSUITABLE_PEER",
            SubmissionState::ValidationError => "VALIDATION_ERROR",
        };
        f.write_str(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_display() {
        for state in [
            SubmissionState::Created,
            SubmissionState::Submitting,
            SubmissionState::Submitted,
            SubmissionState::Stored,
            SubmissionState::Collision,
            SubmissionState::IllegalState,
            SubmissionState::UnsuitablePeer,
            SubmissionState::ValidationError,
        ] {
            let wire = serde_json::to_string(&state).expect("serialize");
            assert_eq!(wire, format!("\"{state}\""));
        }
    }

    #[test]
    fn only_the_documented_states_are_terminal() {
        assert!(!SubmissionState::Created.is_terminal());
        assert!(!SubmissionState::Submitting.is_terminal());
        assert!(!SubmissionState::Submitted.is_terminal());
        assert!(SubmissionState::Stored.is_terminal());
        assert!(!SubmissionState::Stored.is_failure());
        assert!(SubmissionState::Collision.is_failure());
        assert!(SubmissionState::ValidationError.is_failure());
    }
}
