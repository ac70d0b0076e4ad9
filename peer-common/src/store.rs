use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{TeamsError, TeamsResult};

pub type AssignmentId = i64;
pub type PersonId = i64;

/// One (team number, person) tuple of a partition, before or after it is
/// written to the `team_assignments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TeamMember {
    pub team_number: i32,
    pub person_id: PersonId,
}

/// An assignment row. `team_size` is the instructor's stored preference (3 or
/// 4); the partitioner ignores it and computes the 3/4 split purely from the
/// roster size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: AssignmentId,
    pub name: String,
    pub description: String,
    pub date_assigned: NaiveDate,
    pub date_due: NaiveDate,
    pub team_size: i16,
}

/// Validated input for creating or updating an assignment.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub name: String,
    pub description: String,
    pub date_assigned: NaiveDate,
    pub date_due: NaiveDate,
    pub team_size: i16,
}

/// A membership row joined with the person's name, for display.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TeamMemberDetail {
    pub team_number: i32,
    pub person_id: PersonId,
    pub fname: String,
    pub lname: String,
}

/// Supplies the eligible (non-admin) student ids. Order is stable but
/// irrelevant to correctness: the partitioner re-shuffles the roster.
#[async_trait]
pub trait RosterProvider {
    async fn list_eligible_student_ids(&self) -> TeamsResult<Vec<PersonId>>;
}

#[async_trait]
pub trait AssignmentStore {
    async fn ping(&self) -> TeamsResult<()>;

    async fn assignment_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool>;
    async fn get_assignment(&self, assignment_id: AssignmentId)
        -> TeamsResult<Option<Assignment>>;
    async fn list_assignments(&self) -> TeamsResult<Vec<Assignment>>;
    async fn create_assignment(&self, new: &NewAssignment) -> TeamsResult<Assignment>;
    async fn update_assignment(
        &self,
        assignment_id: AssignmentId,
        new: &NewAssignment,
    ) -> TeamsResult<Option<Assignment>>;
    /// Returns false if no row existed. Membership rows cascade away with the
    /// assignment.
    async fn delete_assignment(&self, assignment_id: AssignmentId) -> TeamsResult<bool>;

    /// Whether a partition already exists for this assignment (the idempotent
    /// re-trigger guard on updates).
    async fn partition_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool>;

    /// Atomically replace the partition for an assignment: delete all existing
    /// membership rows, then insert the new ones, in a single transaction.
    /// On failure the prior partition (or absence thereof) is left untouched.
    /// Returns the number of rows inserted.
    async fn replace_partition(
        &self,
        assignment_id: AssignmentId,
        members: &[TeamMember],
    ) -> TeamsResult<u64>;

    async fn team_roster(&self, assignment_id: AssignmentId)
        -> TeamsResult<Vec<TeamMemberDetail>>;
}

/// The full store surface the service needs, as one object-safe bound.
pub trait Store: AssignmentStore + RosterProvider + Send + Sync {}

impl<T: AssignmentStore + RosterProvider + Send + Sync> Store for T {}

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(url: &str, max_connections: u32) -> TeamsResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|error| TeamsError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> TeamsResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| TeamsError::MigrationError { error })
    }
}

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> TeamsError + '_ {
    move |error| TeamsError::QueryError {
        command: command.to_owned(),
        error,
    }
}

#[async_trait]
impl RosterProvider for PgStore {
    async fn list_eligible_student_ids(&self) -> TeamsResult<Vec<PersonId>> {
        sqlx::query_scalar("SELECT id FROM persons WHERE is_admin = FALSE ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn ping(&self) -> TeamsResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| TeamsError::ConnectionError { error })?;

        Ok(())
    }

    async fn assignment_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM assignments WHERE id = $1)")
            .bind(assignment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    async fn get_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> TeamsResult<Option<Assignment>> {
        sqlx::query_as(
            "SELECT id, name, description, date_assigned, date_due, team_size
             FROM assignments WHERE id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    async fn list_assignments(&self) -> TeamsResult<Vec<Assignment>> {
        sqlx::query_as(
            "SELECT id, name, description, date_assigned, date_due, team_size
             FROM assignments ORDER BY date_assigned ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    async fn create_assignment(&self, new: &NewAssignment) -> TeamsResult<Assignment> {
        sqlx::query_as(
            "INSERT INTO assignments (name, description, date_assigned, date_due, team_size)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, name, description, date_assigned, date_due, team_size",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.date_assigned)
        .bind(new.date_due)
        .bind(new.team_size)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("INSERT"))
    }

    async fn update_assignment(
        &self,
        assignment_id: AssignmentId,
        new: &NewAssignment,
    ) -> TeamsResult<Option<Assignment>> {
        sqlx::query_as(
            "UPDATE assignments
             SET name = $1, description = $2, date_assigned = $3, date_due = $4, team_size = $5
             WHERE id = $6
             RETURNING id, name, description, date_assigned, date_due, team_size",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.date_assigned)
        .bind(new.date_due)
        .bind(new.team_size)
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("UPDATE"))
    }

    async fn delete_assignment(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(assignment_id)
            .execute(&self.pool)
            .await
            .map_err(query_error("DELETE"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn partition_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM team_assignments WHERE assignment_id = $1)")
            .bind(assignment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    async fn replace_partition(
        &self,
        assignment_id: AssignmentId,
        members: &[TeamMember],
    ) -> TeamsResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| TeamsError::ConnectionError { error })?;

        sqlx::query("DELETE FROM team_assignments WHERE assignment_id = $1")
            .bind(assignment_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error("DELETE"))?;

        let mut inserted = 0u64;
        for member in members {
            sqlx::query(
                "INSERT INTO team_assignments (assignment_id, team_number, person_id)
                 VALUES ($1, $2, $3)",
            )
            .bind(assignment_id)
            .bind(member.team_number)
            .bind(member.person_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error("INSERT"))?;

            inserted += 1;
        }

        // Rollback happens implicitly if the transaction is dropped before
        // this point: a concurrent reader sees either the whole old partition
        // or the whole new one.
        tx.commit().await.map_err(query_error("COMMIT"))?;

        Ok(inserted)
    }

    async fn team_roster(
        &self,
        assignment_id: AssignmentId,
    ) -> TeamsResult<Vec<TeamMemberDetail>> {
        sqlx::query_as(
            "SELECT ta.team_number, p.id AS person_id, p.fname, p.lname
             FROM team_assignments AS ta
             JOIN persons AS p ON ta.person_id = p.id
             WHERE ta.assignment_id = $1
             ORDER BY ta.team_number ASC, p.lname ASC, p.fname ASC",
        )
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }
}
