use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use peer_common::error::TeamsError;
use peer_common::store::{Assignment, AssignmentId, PersonId};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Teams(#[from] TeamsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,

            ApiError::Teams(err) => match err {
                TeamsError::AssignmentNotFound(_) => StatusCode::NOT_FOUND,
                TeamsError::InfeasibleRoster(_) => StatusCode::UNPROCESSABLE_ENTITY,
                TeamsError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
                TeamsError::ConnectionError { .. }
                | TeamsError::QueryError { .. }
                | TeamsError::MigrationError { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
        };

        (status, self.to_string()).into_response()
    }
}

/// Response to a create or update, carrying the outcome of the team
/// generation that (maybe) ran alongside it. A failed generation does not
/// fail the write; `rows_inserted` is 0 and `message` says why.
#[derive(Debug, Serialize)]
pub struct AssignmentSaved {
    pub assignment: Assignment,
    pub rows_inserted: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TeamsGenerated {
    pub assignment_id: AssignmentId,
    pub rows_inserted: u64,
}

#[derive(Debug, Serialize)]
pub struct TeamView {
    pub team_number: i32,
    pub members: Vec<MemberView>,
}

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub person_id: PersonId,
    pub fname: String,
    pub lname: String,
}

#[derive(Debug, Serialize)]
pub struct TeamRoster {
    pub assignment_id: AssignmentId,
    pub assignment_name: String,
    pub teams: Vec<TeamView>,
}
