//! Team partitioning: split a roster of N students into randomized teams of
//! exactly 3 or 4 members and persist the result atomically.
//!
//! Teams of 3 are preferred; teams of 4 exist only to absorb a remainder that
//! would otherwise strand a 1- or 2-person leftover. No other size is ever
//! produced.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::instrument;

use crate::error::{TeamsError, TeamsResult};
use crate::store::{AssignmentId, PersonId, Store, TeamMember};

/// How many teams of each permitted size a roster breaks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSizePlan {
    pub teams_of_three: usize,
    pub teams_of_four: usize,
}

impl TeamSizePlan {
    pub fn team_count(&self) -> usize {
        self.teams_of_three + self.teams_of_four
    }

    pub fn student_count(&self) -> usize {
        3 * self.teams_of_three + 4 * self.teams_of_four
    }
}

/// Decide the 3/4 split for a roster of `num_students`.
///
/// - N mod 3 == 0 -> all teams of 3
/// - N mod 3 == 1 -> one team of 4, rest 3s
/// - N mod 3 == 2 -> two teams of 4, rest 3s (requires N >= 8)
///
/// N < 3, N == 5, and N in {2, 5} via the remainder-2 rule are infeasible.
pub fn plan_team_sizes(num_students: usize) -> TeamsResult<TeamSizePlan> {
    if num_students < 3 {
        return Err(TeamsError::InfeasibleRoster(num_students));
    }
    if num_students == 5 {
        return Err(TeamsError::InfeasibleRoster(num_students));
    }

    let teams_of_four = match num_students % 3 {
        0 => 0,
        1 => 1,
        _ => {
            // Two teams of 4 absorb the +2 remainder, needing at least 8.
            if num_students < 8 {
                return Err(TeamsError::InfeasibleRoster(num_students));
            }
            2
        }
    };

    let remaining = num_students
        .checked_sub(4 * teams_of_four)
        .ok_or(TeamsError::InvariantViolation(num_students))?;
    if remaining % 3 != 0 {
        return Err(TeamsError::InvariantViolation(num_students));
    }

    Ok(TeamSizePlan {
        teams_of_three: remaining / 3,
        teams_of_four,
    })
}

/// Expand a plan into one size per team-number slot, in random order, so a
/// remainder never pins the size-4 teams to the lowest team numbers.
fn shuffled_size_list(plan: &TeamSizePlan, rng: &mut impl Rng) -> Vec<usize> {
    let mut sizes = Vec::with_capacity(plan.team_count());
    sizes.resize(plan.teams_of_four, 4);
    sizes.resize(plan.team_count(), 3);
    sizes.shuffle(rng);
    sizes
}

/// Build a full partition of the roster: plan the sizes, shuffle the roster
/// (Fisher-Yates over an owned copy, uniform over all permutations), then
/// consume students into teams numbered 1..T.
pub fn assign_members(roster: &[PersonId], rng: &mut impl Rng) -> TeamsResult<Vec<TeamMember>> {
    let plan = plan_team_sizes(roster.len())?;

    let mut shuffled = roster.to_vec();
    shuffled.shuffle(rng);

    let sizes = shuffled_size_list(&plan, rng);

    let mut members = Vec::with_capacity(roster.len());
    let mut students = shuffled.into_iter();
    for (slot, size) in sizes.iter().enumerate() {
        let team_number = (slot + 1) as i32;
        for _ in 0..*size {
            let person_id = students
                .next()
                .ok_or(TeamsError::InvariantViolation(roster.len()))?;
            members.push(TeamMember {
                team_number,
                person_id,
            });
        }
    }

    Ok(members)
}

/// Generate and persist a fresh partition for an assignment, replacing any
/// prior one. Feasibility is checked before any write, so an infeasible
/// roster leaves an existing partition untouched. Returns the number of
/// membership rows inserted (the roster size).
#[instrument(skip(store))]
pub async fn generate_teams(store: &dyn Store, assignment_id: AssignmentId) -> TeamsResult<u64> {
    if !store.assignment_exists(assignment_id).await? {
        return Err(TeamsError::AssignmentNotFound(assignment_id));
    }

    let roster = store.list_eligible_student_ids().await?;
    let members = assign_members(&roster, &mut rand::thread_rng())?;
    let teams = members.last().map_or(0, |m| m.team_number);

    let inserted = store.replace_partition(assignment_id, &members).await?;

    metrics::counter!("teams_partitions_generated_total").increment(1);
    tracing::info!(
        assignment_id,
        students = roster.len(),
        teams,
        inserted,
        "generated team partition"
    );

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap, HashSet};

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::test_utils::MemoryStore;

    fn roster(n: usize) -> Vec<PersonId> {
        (1..=n as i64).collect()
    }

    /// Sorted member sets per team, for comparing groupings across runs.
    fn grouping(members: &[TeamMember]) -> BTreeSet<Vec<PersonId>> {
        let mut teams: HashMap<i32, Vec<PersonId>> = HashMap::new();
        for member in members {
            teams.entry(member.team_number).or_default().push(member.person_id);
        }
        teams
            .into_values()
            .map(|mut ids| {
                ids.sort_unstable();
                ids
            })
            .collect()
    }

    #[test]
    fn plan_prefers_threes() {
        assert_eq!(
            plan_team_sizes(6).unwrap(),
            TeamSizePlan {
                teams_of_three: 2,
                teams_of_four: 0
            }
        );
        assert_eq!(
            plan_team_sizes(9).unwrap(),
            TeamSizePlan {
                teams_of_three: 3,
                teams_of_four: 0
            }
        );
    }

    #[test]
    fn plan_uses_fours_only_for_remainders() {
        // 7 = 3 + 4
        assert_eq!(
            plan_team_sizes(7).unwrap(),
            TeamSizePlan {
                teams_of_three: 1,
                teams_of_four: 1
            }
        );
        // 10 = 3 + 3 + 4
        assert_eq!(
            plan_team_sizes(10).unwrap(),
            TeamSizePlan {
                teams_of_three: 2,
                teams_of_four: 1
            }
        );
        // 8 = 4 + 4
        assert_eq!(
            plan_team_sizes(8).unwrap(),
            TeamSizePlan {
                teams_of_three: 0,
                teams_of_four: 2
            }
        );
        // 11 = 3 + 4 + 4
        assert_eq!(
            plan_team_sizes(11).unwrap(),
            TeamSizePlan {
                teams_of_three: 1,
                teams_of_four: 2
            }
        );
        // One team of 4 is fine on its own.
        assert_eq!(
            plan_team_sizes(4).unwrap(),
            TeamSizePlan {
                teams_of_three: 0,
                teams_of_four: 1
            }
        );
    }

    #[test]
    fn plan_rejects_infeasible_rosters() {
        for n in [0, 1, 2, 5] {
            match plan_team_sizes(n) {
                Err(TeamsError::InfeasibleRoster(got)) => assert_eq!(got, n),
                other => panic!("expected InfeasibleRoster for {n}, got {other:?}"),
            }
        }
    }

    #[test]
    fn plan_covers_all_feasible_sizes() {
        for n in (3..200).filter(|&n| n != 5) {
            let plan = plan_team_sizes(n).unwrap_or_else(|e| panic!("N={n}: {e}"));
            assert_eq!(plan.student_count(), n, "N={n}");
            assert!(plan.team_count() > 0, "N={n}");
        }
    }

    #[test]
    fn members_partition_the_roster_exactly() {
        for n in [3, 4, 6, 7, 8, 9, 10, 23, 100] {
            let roster = roster(n);
            let mut rng = StdRng::seed_from_u64(42);
            let members = assign_members(&roster, &mut rng).unwrap();

            assert_eq!(members.len(), n);
            let assigned: HashSet<PersonId> = members.iter().map(|m| m.person_id).collect();
            assert_eq!(assigned.len(), n, "N={n}: a student was duplicated");
            assert_eq!(
                assigned,
                roster.iter().copied().collect(),
                "N={n}: a student was omitted"
            );
        }
    }

    #[test]
    fn every_team_has_three_or_four_members() {
        for n in [3, 4, 6, 7, 8, 9, 10, 23, 100] {
            let roster = roster(n);
            let mut rng = StdRng::seed_from_u64(7);
            let members = assign_members(&roster, &mut rng).unwrap();

            let mut sizes: HashMap<i32, usize> = HashMap::new();
            for member in &members {
                *sizes.entry(member.team_number).or_default() += 1;
            }
            for (team, size) in &sizes {
                assert!(
                    *size == 3 || *size == 4,
                    "N={n}: team {team} has {size} members"
                );
            }

            // Team numbers are contiguous from 1.
            let teams: BTreeSet<i32> = sizes.keys().copied().collect();
            let expected: BTreeSet<i32> = (1..=sizes.len() as i32).collect();
            assert_eq!(teams, expected, "N={n}");
        }
    }

    #[test]
    fn assign_members_rejects_five_students() {
        let mut rng = StdRng::seed_from_u64(0);
        match assign_members(&roster(5), &mut rng) {
            Err(TeamsError::InfeasibleRoster(5)) => {}
            other => panic!("expected InfeasibleRoster(5), got {other:?}"),
        }
    }

    #[test]
    fn repeated_runs_differ() {
        // With 12 students there are thousands of distinct groupings, so 100
        // runs collapsing to a single one would indicate a broken shuffle.
        let roster = roster(12);
        let mut seen = HashSet::new();
        for seed in 0..100u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let members = assign_members(&roster, &mut rng).unwrap();
            seen.insert(grouping(&members));
        }
        assert!(seen.len() > 1, "100 runs all produced the same grouping");
    }

    #[test]
    fn size_four_slot_is_not_positionally_biased() {
        // For N=7 there is one team of 4; across seeds it must land on team 1
        // sometimes and team 2 other times.
        let roster = roster(7);
        let mut four_on_team: HashSet<i32> = HashSet::new();
        for seed in 0..100u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let members = assign_members(&roster, &mut rng).unwrap();
            let mut sizes: HashMap<i32, usize> = HashMap::new();
            for member in &members {
                *sizes.entry(member.team_number).or_default() += 1;
            }
            let (team, _) = sizes.iter().find(|(_, size)| **size == 4).unwrap();
            four_on_team.insert(*team);
        }
        assert_eq!(four_on_team.len(), 2, "size-4 team is stuck to one slot");
    }

    #[tokio::test]
    async fn generate_teams_inserts_one_row_per_student() {
        let store = MemoryStore::with_roster(10);
        let assignment = store.seed_assignment("Project 1");

        let inserted = generate_teams(&store, assignment.id).await.unwrap();

        assert_eq!(inserted, 10);
        let partition = store.partition(assignment.id);
        assert_eq!(partition.len(), 10);
    }

    #[tokio::test]
    async fn generate_teams_rejects_unknown_assignment() {
        let store = MemoryStore::with_roster(9);

        match generate_teams(&store, 999).await {
            Err(TeamsError::AssignmentNotFound(999)) => {}
            other => panic!("expected AssignmentNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn infeasible_roster_leaves_prior_partition_untouched() {
        let store = MemoryStore::with_roster(6);
        let assignment = store.seed_assignment("Project 1");

        generate_teams(&store, assignment.id).await.unwrap();
        let before = store.partition(assignment.id);

        // Shrink the roster below feasibility and try again.
        store.set_roster(5);
        match generate_teams(&store, assignment.id).await {
            Err(TeamsError::InfeasibleRoster(5)) => {}
            other => panic!("expected InfeasibleRoster(5), got {other:?}"),
        }

        assert_eq!(store.partition(assignment.id), before);
    }

    #[tokio::test]
    async fn regeneration_fully_replaces_the_partition() {
        let store = MemoryStore::with_roster(9);
        let assignment = store.seed_assignment("Project 1");

        generate_teams(&store, assignment.id).await.unwrap();
        generate_teams(&store, assignment.id).await.unwrap();

        // A merge would leave 18 rows; a replace leaves exactly 9, each
        // student exactly once.
        let partition = store.partition(assignment.id);
        assert_eq!(partition.len(), 9);
        let assigned: HashSet<PersonId> = partition.iter().map(|m| m.person_id).collect();
        assert_eq!(assigned.len(), 9);
    }

    #[tokio::test]
    async fn failed_write_rolls_back_to_prior_partition() {
        let store = MemoryStore::with_roster(6);
        let assignment = store.seed_assignment("Project 1");

        generate_teams(&store, assignment.id).await.unwrap();
        let before = store.partition(assignment.id);

        store.fail_next_replace();
        match generate_teams(&store, assignment.id).await {
            Err(TeamsError::QueryError { .. }) => {}
            other => panic!("expected QueryError, got {other:?}"),
        }

        assert_eq!(store.partition(assignment.id), before);
    }
}
