use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use peer_common::error::TeamsError;
use peer_common::store::{Assignment, AssignmentId, NewAssignment};
use peer_common::teams;

use crate::api::{ApiError, AssignmentSaved, MemberView, TeamRoster, TeamView, TeamsGenerated};
use crate::router::AppState;

const DEFAULT_TEAM_SIZE: i16 = 3;

#[derive(Debug, Deserialize)]
pub struct AssignmentForm {
    pub name: String,
    pub description: String,
    pub date_assigned: NaiveDate,
    pub date_due: NaiveDate,
    pub team_size: Option<i16>,
}

impl AssignmentForm {
    fn validate(self) -> Result<NewAssignment, ApiError> {
        let name = self.name.trim().to_owned();
        let description = self.description.trim().to_owned();
        if name.is_empty() || description.is_empty() {
            return Err(ApiError::Validation(
                "please fill in all fields for the assignment".to_owned(),
            ));
        }

        let team_size = self.team_size.unwrap_or(DEFAULT_TEAM_SIZE);
        if team_size != 3 && team_size != 4 {
            return Err(ApiError::Validation(
                "team size must be 3 (default) or 4".to_owned(),
            ));
        }

        Ok(NewAssignment {
            name,
            description,
            date_assigned: self.date_assigned,
            date_due: self.date_due,
            team_size,
        })
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Assignment>>, ApiError> {
    Ok(Json(state.store.list_assignments().await?))
}

/// Create an assignment and always generate its initial partition. Per the
/// legacy behavior, a failed generation (e.g. an infeasible roster) does not
/// roll back the create; the response reports the failure instead.
pub async fn create(
    State(state): State<AppState>,
    Json(form): Json<AssignmentForm>,
) -> Result<(StatusCode, Json<AssignmentSaved>), ApiError> {
    let new = form.validate()?;
    let assignment = state.store.create_assignment(&new).await?;

    let (rows_inserted, message) =
        match teams::generate_teams(state.store.as_ref(), assignment.id).await {
            Ok(rows) => (
                rows,
                format!("assignment created and {rows} team assignment records generated"),
            ),
            Err(err) => {
                tracing::warn!(
                    assignment_id = assignment.id,
                    "assignment created, but error generating teams: {err}"
                );
                (
                    0,
                    format!("assignment created, but error generating teams: {err}"),
                )
            }
        };

    Ok((
        StatusCode::CREATED,
        Json(AssignmentSaved {
            assignment,
            rows_inserted,
            message,
        }),
    ))
}

/// Update an assignment. Once a partition exists, the stored team_size is
/// locked to its current value, and the partitioner only runs when no
/// partition exists yet (the idempotent re-trigger guard).
pub async fn update(
    State(state): State<AppState>,
    Path(assignment_id): Path<AssignmentId>,
    Json(form): Json<AssignmentForm>,
) -> Result<Json<AssignmentSaved>, ApiError> {
    let mut new = form.validate()?;

    let existing = state
        .store
        .get_assignment(assignment_id)
        .await?
        .ok_or(TeamsError::AssignmentNotFound(assignment_id))?;

    let has_partition = state.store.partition_exists(assignment_id).await?;
    if has_partition {
        new.team_size = existing.team_size;
    }

    let assignment = state
        .store
        .update_assignment(assignment_id, &new)
        .await?
        .ok_or(TeamsError::AssignmentNotFound(assignment_id))?;

    let (rows_inserted, message) = if has_partition {
        (0, "assignment updated".to_owned())
    } else {
        match teams::generate_teams(state.store.as_ref(), assignment_id).await {
            Ok(rows) => (
                rows,
                format!("assignment updated and {rows} team assignment records generated"),
            ),
            Err(err) => {
                tracing::warn!(
                    assignment_id,
                    "assignment updated, but error generating teams: {err}"
                );
                (
                    0,
                    format!("assignment updated, but error generating teams: {err}"),
                )
            }
        }
    };

    Ok(Json(AssignmentSaved {
        assignment,
        rows_inserted,
        message,
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(assignment_id): Path<AssignmentId>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_assignment(assignment_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TeamsError::AssignmentNotFound(assignment_id).into())
    }
}

/// The explicit regenerate action. Unlike create/update, a failure here is
/// the whole point of the request and surfaces as an error response.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(assignment_id): Path<AssignmentId>,
) -> Result<Json<TeamsGenerated>, ApiError> {
    let rows_inserted = teams::generate_teams(state.store.as_ref(), assignment_id).await?;

    Ok(Json(TeamsGenerated {
        assignment_id,
        rows_inserted,
    }))
}

pub async fn show_teams(
    State(state): State<AppState>,
    Path(assignment_id): Path<AssignmentId>,
) -> Result<Json<TeamRoster>, ApiError> {
    let assignment = state
        .store
        .get_assignment(assignment_id)
        .await?
        .ok_or(TeamsError::AssignmentNotFound(assignment_id))?;

    let rows = state.store.team_roster(assignment_id).await?;

    // Rows arrive ordered by team number, then name.
    let mut teams: Vec<TeamView> = Vec::new();
    for row in rows {
        let member = MemberView {
            person_id: row.person_id,
            fname: row.fname,
            lname: row.lname,
        };
        if teams
            .last()
            .map_or(true, |team| team.team_number != row.team_number)
        {
            teams.push(TeamView {
                team_number: row.team_number,
                members: Vec::new(),
            });
        }
        if let Some(team) = teams.last_mut() {
            team.members.push(member);
        }
    }

    Ok(Json(TeamRoster {
        assignment_id,
        assignment_name: assignment.name,
        teams,
    }))
}
