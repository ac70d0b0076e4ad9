//! In-memory test doubles for the store seams, so the partitioning and
//! handler paths can be exercised without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{TeamsError, TeamsResult};
use crate::store::{
    Assignment, AssignmentId, AssignmentStore, NewAssignment, PersonId, RosterProvider,
    TeamMember, TeamMemberDetail,
};

#[derive(Default)]
struct Inner {
    next_id: AssignmentId,
    assignments: HashMap<AssignmentId, Assignment>,
    // (id, fname, lname); ids are handed out 1..=N
    roster: Vec<(PersonId, String, String)>,
    partitions: HashMap<AssignmentId, Vec<TeamMember>>,
}

/// In-memory stand-in for `PgStore`. `replace_partition` honors the same
/// all-or-nothing contract as the transactional implementation: a simulated
/// failure leaves the prior partition in place.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_replace: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose roster holds `n` non-admin students with ids 1..=n.
    pub fn with_roster(n: usize) -> Self {
        let store = Self::new();
        store.set_roster(n);
        store
    }

    pub fn set_roster(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.roster = (1..=n as i64)
            .map(|id| (id, format!("Student{id}"), format!("Surname{id}")))
            .collect();
    }

    pub fn seed_assignment(&self, name: &str) -> Assignment {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let assignment = Assignment {
            id: inner.next_id,
            name: name.to_owned(),
            description: format!("{name} description"),
            date_assigned: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            date_due: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
            team_size: 3,
        };
        inner.assignments.insert(assignment.id, assignment.clone());
        assignment
    }

    /// Make the next `replace_partition` call fail mid-write.
    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    pub fn partition(&self, assignment_id: AssignmentId) -> Vec<TeamMember> {
        self.inner
            .lock()
            .unwrap()
            .partitions
            .get(&assignment_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RosterProvider for MemoryStore {
    async fn list_eligible_student_ids(&self) -> TeamsResult<Vec<PersonId>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .roster
            .iter()
            .map(|(id, _, _)| *id)
            .collect())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn ping(&self) -> TeamsResult<()> {
        Ok(())
    }

    async fn assignment_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .contains_key(&assignment_id))
    }

    async fn get_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> TeamsResult<Option<Assignment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .assignments
            .get(&assignment_id)
            .cloned())
    }

    async fn list_assignments(&self) -> TeamsResult<Vec<Assignment>> {
        let inner = self.inner.lock().unwrap();
        let mut assignments: Vec<Assignment> = inner.assignments.values().cloned().collect();
        assignments.sort_by(|a, b| (a.date_assigned, a.id).cmp(&(b.date_assigned, b.id)));
        Ok(assignments)
    }

    async fn create_assignment(&self, new: &NewAssignment) -> TeamsResult<Assignment> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let assignment = Assignment {
            id: inner.next_id,
            name: new.name.clone(),
            description: new.description.clone(),
            date_assigned: new.date_assigned,
            date_due: new.date_due,
            team_size: new.team_size,
        };
        inner.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn update_assignment(
        &self,
        assignment_id: AssignmentId,
        new: &NewAssignment,
    ) -> TeamsResult<Option<Assignment>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(assignment) = inner.assignments.get_mut(&assignment_id) else {
            return Ok(None);
        };
        assignment.name = new.name.clone();
        assignment.description = new.description.clone();
        assignment.date_assigned = new.date_assigned;
        assignment.date_due = new.date_due;
        assignment.team_size = new.team_size;
        Ok(Some(assignment.clone()))
    }

    async fn delete_assignment(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.assignments.remove(&assignment_id).is_some();
        if existed {
            inner.partitions.remove(&assignment_id);
        }
        Ok(existed)
    }

    async fn partition_exists(&self, assignment_id: AssignmentId) -> TeamsResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .partitions
            .contains_key(&assignment_id))
    }

    async fn replace_partition(
        &self,
        assignment_id: AssignmentId,
        members: &[TeamMember],
    ) -> TeamsResult<u64> {
        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            // The transaction never commits, so the stored partition stays.
            return Err(TeamsError::QueryError {
                command: "INSERT".to_owned(),
                error: sqlx::Error::PoolClosed,
            });
        }

        let mut inner = self.inner.lock().unwrap();
        inner.partitions.insert(assignment_id, members.to_vec());
        Ok(members.len() as u64)
    }

    async fn team_roster(
        &self,
        assignment_id: AssignmentId,
    ) -> TeamsResult<Vec<TeamMemberDetail>> {
        let inner = self.inner.lock().unwrap();
        let names: HashMap<PersonId, (String, String)> = inner
            .roster
            .iter()
            .map(|(id, fname, lname)| (*id, (fname.clone(), lname.clone())))
            .collect();

        let mut rows: Vec<TeamMemberDetail> = inner
            .partitions
            .get(&assignment_id)
            .map(|members| {
                members
                    .iter()
                    .map(|member| {
                        let (fname, lname) = names
                            .get(&member.person_id)
                            .cloned()
                            .unwrap_or_default();
                        TeamMemberDetail {
                            team_number: member.team_number,
                            person_id: member.person_id,
                            fname,
                            lname,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            (a.team_number, &a.lname, &a.fname).cmp(&(b.team_number, &b.lname, &b.fname))
        });
        Ok(rows)
    }
}
