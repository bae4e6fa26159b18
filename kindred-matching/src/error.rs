use std::time::Duration;

use kindred_shared::errors::{AppError, ErrorCode};

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    /// Expected outcome of candidate selection; the user sits this cycle out.
    #[error("no eligible candidate this cycle")]
    NoEligibleCandidate,

    #[error("malformed score response: {0}")]
    MalformedScoreResponse(String),

    #[error("provider unavailable after retries: {0}")]
    ProviderTransient(String),

    #[error("provider rejected the request: {0}")]
    Provider(String),

    #[error("pair timed out after {0:?}")]
    PairTimeout(Duration),

    #[error("match not found")]
    MatchNotFound,

    #[error("profile not found")]
    ProfileNotFound,

    #[error("a different response was already recorded")]
    AlreadyResponded,

    #[error("caller is not a participant in this match")]
    UnauthorizedParticipant,

    #[error("the response window for this match has closed; use post-date feedback instead")]
    MatchExpired,

    #[error("match is not mutual")]
    NotMutual,

    #[error("post-date feedback already submitted")]
    OutcomeAlreadySubmitted,

    #[error("a run for week {0} is already in progress")]
    RunInProgress(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type MatchingResult<T> = Result<T, MatchingError>;

impl From<MatchingError> for AppError {
    fn from(err: MatchingError) -> Self {
        let message = err.to_string();
        match err {
            MatchingError::MatchNotFound => AppError::new(ErrorCode::MatchNotFound, message),
            MatchingError::ProfileNotFound => AppError::new(ErrorCode::ProfileNotFound, message),
            MatchingError::AlreadyResponded => AppError::new(ErrorCode::AlreadyResponded, message),
            MatchingError::UnauthorizedParticipant => {
                AppError::new(ErrorCode::NotMatchParticipant, message)
            }
            MatchingError::MatchExpired => AppError::new(ErrorCode::MatchExpired, message),
            MatchingError::NotMutual => AppError::new(ErrorCode::NotMutualMatch, message),
            MatchingError::OutcomeAlreadySubmitted => {
                AppError::new(ErrorCode::OutcomeAlreadySubmitted, message)
            }
            MatchingError::RunInProgress(_) => AppError::new(ErrorCode::RunInProgress, message),
            MatchingError::Validation(msg) => AppError::Validation(msg),
            MatchingError::ProviderTransient(_)
            | MatchingError::Provider(_)
            | MatchingError::MalformedScoreResponse(_)
            | MatchingError::PairTimeout(_) => {
                AppError::new(ErrorCode::ProviderUnavailable, message)
            }
            MatchingError::NoEligibleCandidate => AppError::not_found(message),
            MatchingError::Store(err) => AppError::Internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(err: MatchingError) -> ErrorCode {
        match AppError::from(err) {
            AppError::Known { code, .. } => code,
            other => panic!("expected a known error, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_errors_map_to_matching_codes() {
        assert_eq!(code_of(MatchingError::AlreadyResponded), ErrorCode::AlreadyResponded);
        assert_eq!(code_of(MatchingError::UnauthorizedParticipant), ErrorCode::NotMatchParticipant);
        assert_eq!(code_of(MatchingError::MatchExpired), ErrorCode::MatchExpired);
        assert_eq!(code_of(MatchingError::NotMutual), ErrorCode::NotMutualMatch);
    }

    #[test]
    fn store_errors_stay_internal() {
        let err = AppError::from(MatchingError::Store(anyhow::anyhow!("connection refused")));
        assert!(matches!(err, AppError::Internal(_)));
    }
}
