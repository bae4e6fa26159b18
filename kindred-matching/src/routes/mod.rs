pub mod health;
pub mod internal;
pub mod matches;
pub mod profiles;

use kindred_shared::errors::{AppError, AppResult, ErrorCode};
use validator::Validate;

pub(crate) fn validate_body<T: Validate>(body: &T) -> AppResult<()> {
    body.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}
