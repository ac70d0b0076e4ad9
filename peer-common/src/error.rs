use thiserror::Error;

/// Enumeration of errors for team generation and its persistence.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum TeamsError {
    #[error("assignment not found (id={0})")]
    AssignmentNotFound(i64),

    /// The roster cannot be split into teams of only 3 or 4. Raised for
    /// N < 3, N == 5, and N mod 3 == 2 with fewer than 8 students.
    #[error("cannot form teams of only size 3 or 4 with {0} students")]
    InfeasibleRoster(usize),

    /// The 3/4 split arithmetic produced a negative or non-divisible
    /// remainder. Should be unreachable once the feasibility check passed;
    /// kept distinct from `InfeasibleRoster` because it is a logic defect,
    /// not a user-facing condition.
    #[error("internal error computing 3/4 team split for {0} students")]
    InvariantViolation(usize),

    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },

    #[error("migrations failed with: {error}")]
    MigrationError { error: sqlx::migrate::MigrateError },

    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
}

pub type TeamsResult<T> = std::result::Result<T, TeamsError>;
