use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Progress of one admin action on one withdrawal while the lock is held.
///
/// Only moves forward. `Completed` is sticky: once a payout succeeded, a late
/// failure report from a slower retry path must not overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Locked,
    Processing,
    Completed,
    Failed,
    Expired,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("lock already in status {0}")]
    Unchanged(LockStatus),

    #[error("illegal lock transition {from} -> {to}")]
    Illegal { from: LockStatus, to: LockStatus },
}

impl LockStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LockStatus::Completed | LockStatus::Failed | LockStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Locked => "locked",
            LockStatus::Processing => "processing",
            LockStatus::Completed => "completed",
            LockStatus::Failed => "failed",
            LockStatus::Expired => "expired",
        }
    }

    /// Validates `self -> next` and returns the status to store.
    pub fn transition(self, next: LockStatus) -> Result<LockStatus, TransitionError> {
        use LockStatus::*;

        if self == next {
            return Err(TransitionError::Unchanged(self));
        }

        let allowed = match (self, next) {
            (Locked, Processing | Completed | Failed | Expired) => true,
            (Processing, Completed | Failed | Expired) => true,
            // a late success may still land after a failure was recorded
            (Failed, Completed | Expired) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(TransitionError::Illegal {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LockStatus::*;
    use super::*;

    #[test]
    fn forward_path_is_accepted() {
        assert_eq!(Locked.transition(Processing), Ok(Processing));
        assert_eq!(Processing.transition(Completed), Ok(Completed));
        assert_eq!(Processing.transition(Failed), Ok(Failed));
        assert_eq!(Locked.transition(Completed), Ok(Completed));
    }

    #[test]
    fn completed_is_sticky() {
        for next in [Locked, Processing, Failed, Expired] {
            assert_eq!(
                Completed.transition(next),
                Err(TransitionError::Illegal {
                    from: Completed,
                    to: next
                })
            );
        }
    }

    #[test]
    fn failed_can_still_complete() {
        assert_eq!(Failed.transition(Completed), Ok(Completed));
        assert!(Failed.transition(Processing).is_err());
        assert!(Failed.transition(Locked).is_err());
    }

    #[test]
    fn same_status_is_unchanged() {
        assert_eq!(
            Processing.transition(Processing),
            Err(TransitionError::Unchanged(Processing))
        );
    }

    #[test]
    fn nothing_moves_backwards() {
        assert!(Processing.transition(Locked).is_err());
        assert!(Expired.transition(Processing).is_err());
        assert!(Expired.transition(Completed).is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Processing).unwrap(), "\"processing\"");
        assert_eq!(Completed.to_string(), "completed");
    }
}
