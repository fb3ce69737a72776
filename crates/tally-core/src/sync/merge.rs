//! Snapshot merge engine: the deterministic conflict-resolution core.
//!
//! `merge_snapshots` reconciles a local and a remote snapshot into one
//! converged snapshot. It is pure: inputs are never mutated, and merging the
//! same remote snapshot into an already-converged local snapshot is a no-op,
//! which is what makes unordered trigger interleaving safe.

use crate::clock::to_epoch_millis;
use crate::models::{Snapshot, Tournament};

/// Merge a local snapshot into a remote one.
///
/// Remote is the authoritative baseline. Local copies win only when strictly
/// newer; ties keep the copy already in the accumulating result. Tournaments
/// absent from remote are resurrected only by their owner (`current_user_id`),
/// and stale local copies belonging to a different account never leak in.
/// A final pass repairs tournament→session back-links.
#[must_use]
pub fn merge_snapshots(
    local: &Snapshot,
    remote: &Snapshot,
    current_user_id: Option<&str>,
) -> Snapshot {
    let mut merged = remote.clone();

    for (id, local_tournament) in &local.tournaments {
        if belongs_to_other_account(local_tournament, current_user_id) {
            // Incomplete sign-out cleanup left a foreign copy behind; it must
            // never enter the merged result, not even a "which is newer" contest.
            tracing::debug!(tournament_id = %id, "dropping tournament from another account");
            continue;
        }

        match merged.tournaments.get(id) {
            None => {
                if may_resurrect(local_tournament, current_user_id) {
                    merged
                        .tournaments
                        .insert(id.clone(), local_tournament.clone());
                } else {
                    tracing::debug!(
                        tournament_id = %id,
                        "dropping tournament deleted remotely by its owner"
                    );
                }
            }
            Some(existing) => {
                let local_at = to_epoch_millis(local_tournament.updated_at.as_ref());
                let existing_at = to_epoch_millis(existing.updated_at.as_ref());
                if local_at > existing_at {
                    merged
                        .tournaments
                        .insert(id.clone(), local_tournament.clone());
                }
            }
        }
    }

    for (id, local_session) in &local.sessions {
        match merged.sessions.get(id) {
            None => {
                merged.sessions.insert(id.clone(), local_session.clone());
            }
            Some(existing) => {
                let local_at = to_epoch_millis(local_session.updated_at.as_ref());
                let existing_at = to_epoch_millis(existing.updated_at.as_ref());
                if local_at > existing_at {
                    merged.sessions.insert(id.clone(), local_session.clone());
                }
            }
        }
    }

    repair_back_links(&mut merged);
    merged
}

/// A local copy whose member set excludes the current user, owned by someone
/// else, is residue from a previous account on this device.
fn belongs_to_other_account(tournament: &Tournament, current_user_id: Option<&str>) -> bool {
    let Some(uid) = current_user_id else {
        return false;
    };
    !tournament.is_member(uid)
        && tournament
            .owner_id
            .as_deref()
            .is_some_and(|owner| owner != uid)
}

/// Only the owner may repopulate a tournament the remote store no longer has.
/// Ownerless records predate ownership and are kept.
fn may_resurrect(tournament: &Tournament, current_user_id: Option<&str>) -> bool {
    match (&tournament.owner_id, current_user_id) {
        (None, _) => true,
        (Some(owner), Some(uid)) => owner == uid,
        (Some(_), None) => false,
    }
}

/// Append each surviving session's id to its parent's reference list when
/// missing. Runs after all entity-level decisions because it depends on the
/// final membership of the tournaments map, not the pre-merge one.
fn repair_back_links(merged: &mut Snapshot) {
    let links: Vec<(String, String)> = merged
        .sessions
        .values()
        .filter_map(|session| {
            session
                .tournament_id
                .clone()
                .map(|parent| (parent, session.id.clone()))
        })
        .collect();

    for (parent_id, session_id) in links {
        if let Some(parent) = merged.tournaments.get_mut(&parent_id) {
            if !parent.game_sessions.contains(&session_id) {
                parent.game_sessions.push(session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Stamp;
    use crate::models::GameSession;
    use pretty_assertions::assert_eq;

    fn tournament(id: &str, owner: Option<&str>, updated_at: Option<&str>) -> Tournament {
        let mut t = match owner {
            Some(owner) => Tournament::new("Cup", owner, None),
            None => {
                let mut t = Tournament::new("Cup", "placeholder", None);
                t.owner_id = None;
                t.member_ids.clear();
                t.member_roles.clear();
                t
            }
        };
        t.id = id.to_string();
        t.created_at = None;
        t.updated_at = updated_at.map(|s| Stamp::Text(s.to_string()));
        t
    }

    fn session(id: &str, tournament_id: Option<&str>, updated_at: Option<&str>) -> GameSession {
        let mut s = GameSession::new("Azul", "u1", tournament_id.map(Into::into));
        s.id = id.to_string();
        s.created_at = None;
        s.played_at = None;
        s.updated_at = updated_at.map(|v| Stamp::Text(v.to_string()));
        s
    }

    fn snapshot(tournaments: Vec<Tournament>, sessions: Vec<GameSession>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for t in tournaments {
            snapshot.insert_tournament(t);
        }
        for s in sessions {
            snapshot.insert_session(s);
        }
        snapshot
    }

    #[test]
    fn newer_local_copy_wins() {
        let local = snapshot(vec![tournament("t1", Some("u1"), Some("2024-02-01"))], vec![]);
        let remote = snapshot(vec![tournament("t1", Some("u1"), Some("2024-01-01"))], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(
            merged.tournaments["t1"].updated_at,
            Some(Stamp::Text("2024-02-01".into()))
        );
    }

    #[test]
    fn newer_remote_copy_wins() {
        let local = snapshot(vec![tournament("t1", Some("u1"), Some("2024-01-01"))], vec![]);
        let remote = snapshot(vec![tournament("t1", Some("u1"), Some("2024-02-01"))], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(
            merged.tournaments["t1"].updated_at,
            Some(Stamp::Text("2024-02-01".into()))
        );
    }

    #[test]
    fn equal_timestamps_keep_remote_copy() {
        let mut local_t = tournament("t1", Some("u1"), Some("2024-01-01"));
        local_t.name = "Local Name".into();
        let mut remote_t = tournament("t1", Some("u1"), Some("2024-01-01"));
        remote_t.name = "Remote Name".into();

        let merged = merge_snapshots(
            &snapshot(vec![local_t], vec![]),
            &snapshot(vec![remote_t], vec![]),
            Some("u1"),
        );
        assert_eq!(merged.tournaments["t1"].name, "Remote Name");
    }

    #[test]
    fn timestamp_less_local_copy_loses_to_stamped_remote() {
        let mut local_t = tournament("t1", Some("u1"), None);
        local_t.name = "Local Name".into();
        let mut remote_t = tournament("t1", Some("u1"), Some("2020-01-01"));
        remote_t.name = "Remote Name".into();

        let merged = merge_snapshots(
            &snapshot(vec![local_t], vec![]),
            &snapshot(vec![remote_t], vec![]),
            Some("u1"),
        );
        assert_eq!(merged.tournaments["t1"].name, "Remote Name");
    }

    #[test]
    fn owner_resurrects_locally_held_tournament() {
        let local = snapshot(vec![tournament("t2", Some("u2"), Some("2024-01-01"))], vec![]);
        let remote = Snapshot::default();

        let merged = merge_snapshots(&local, &remote, Some("u2"));
        assert!(merged.tournaments.contains_key("t2"));
    }

    #[test]
    fn non_owner_cannot_resurrect() {
        // u1's device still holds u2's tournament that u2 deleted server-side.
        // u1 is a member (it synced down once) but not the owner.
        let mut t2 = tournament("t2", Some("u2"), Some("2024-01-01"));
        t2.member_ids.push("u1".into());
        let local = snapshot(vec![t2], vec![]);

        let merged = merge_snapshots(&local, &Snapshot::default(), Some("u1"));
        assert!(!merged.tournaments.contains_key("t2"));
    }

    #[test]
    fn ownerless_legacy_record_is_kept() {
        let local = snapshot(vec![tournament("t3", None, Some("2024-01-01"))], vec![]);
        let merged = merge_snapshots(&local, &Snapshot::default(), Some("u1"));
        assert!(merged.tournaments.contains_key("t3"));
    }

    #[test]
    fn foreign_account_residue_never_leaks_in() {
        // Not a member, owned by someone else: skipped before any comparison,
        // even though the local copy is newer than the remote one.
        let local = snapshot(vec![tournament("t9", Some("u2"), Some("2024-06-01"))], vec![]);
        let remote = snapshot(vec![tournament("t9", Some("u2"), Some("2024-01-01"))], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(
            merged.tournaments["t9"].updated_at,
            Some(Stamp::Text("2024-01-01".into()))
        );
    }

    #[test]
    fn newer_local_session_wins() {
        let local = snapshot(vec![], vec![session("s1", None, Some("2024-02-01"))]);
        let remote = snapshot(vec![], vec![session("s1", None, Some("2024-01-01"))]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(
            merged.sessions["s1"].updated_at,
            Some(Stamp::Text("2024-02-01".into()))
        );
    }

    #[test]
    fn back_link_repair_appends_missing_reference() {
        let mut parent = tournament("t1", Some("u1"), Some("2024-01-01"));
        parent.game_sessions.clear();
        let local = snapshot(vec![], vec![session("s1", Some("t1"), Some("2024-01-01"))]);
        let remote = snapshot(vec![parent], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(merged.tournaments["t1"].game_sessions, vec!["s1"]);
    }

    #[test]
    fn back_link_repair_never_duplicates() {
        let mut parent = tournament("t1", Some("u1"), Some("2024-01-01"));
        parent.game_sessions = vec!["s1".into()];
        let local = snapshot(vec![], vec![session("s1", Some("t1"), Some("2024-01-01"))]);
        let remote = snapshot(vec![parent], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        let again = merge_snapshots(&merged, &remote, Some("u1"));
        assert_eq!(again.tournaments["t1"].game_sessions, vec!["s1"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let local = snapshot(
            vec![
                tournament("t1", Some("u1"), Some("2024-02-01")),
                tournament("t2", Some("u2"), Some("2024-03-01")),
            ],
            vec![session("s1", Some("t1"), Some("2024-02-01"))],
        );
        let remote = snapshot(
            vec![tournament("t1", Some("u1"), Some("2024-01-01"))],
            vec![session("s2", Some("t1"), Some("2024-01-15"))],
        );

        let once = merge_snapshots(&local, &remote, Some("u1"));
        let twice = merge_snapshots(&once, &remote, Some("u1"));
        assert_eq!(once, twice);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let local = snapshot(vec![], vec![session("s1", Some("t1"), Some("2024-02-01"))]);
        let remote = snapshot(vec![tournament("t1", Some("u1"), Some("2024-01-01"))], vec![]);
        let local_before = local.clone();
        let remote_before = remote.clone();

        let _ = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(local, local_before);
        assert_eq!(remote, remote_before);
    }

    // End-to-end scenario: offline device edited t1 and recorded s1; remote
    // still has the old copy with no sessions.
    #[test]
    fn interrupted_push_converges_with_back_link() {
        let mut local_t1 = tournament("t1", Some("u1"), Some("2024-02-01"));
        local_t1.game_sessions = vec!["s1".into()];
        let local = snapshot(
            vec![local_t1],
            vec![session("s1", Some("t1"), Some("2024-02-01"))],
        );
        let mut remote_t1 = tournament("t1", Some("u1"), Some("2024-01-01"));
        remote_t1.game_sessions.clear();
        let remote = snapshot(vec![remote_t1], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(
            merged.tournaments["t1"].updated_at,
            Some(Stamp::Text("2024-02-01".into()))
        );
        assert_eq!(merged.tournaments["t1"].game_sessions, vec!["s1"]);
        assert!(merged.sessions.contains_key("s1"));
    }

    // End-to-end scenario: two devices offline-created the same logical
    // tournament under different ids; both survive (no semantic dedup).
    #[test]
    fn same_logical_tournament_different_ids_both_survive() {
        let local = snapshot(vec![tournament("ta", Some("u1"), Some("2024-01-01"))], vec![]);
        let remote = snapshot(vec![tournament("tb", Some("u1"), Some("2024-01-02"))], vec![]);

        let merged = merge_snapshots(&local, &remote, Some("u1"));
        assert_eq!(merged.tournaments.len(), 2);
    }
}
