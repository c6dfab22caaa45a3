//! Single-winner resolution of conflict groups.

use std::cmp::Ordering;

use tracing::{debug, info};

use crate::error::ReconError;
use crate::model::{ClipCommand, ClipReport, ConflictGroup, RecordFailure, RecordId, Resolution};
use crate::store::AttributeStore;
use crate::value::FieldValue;

/// Rank a group and pick its winner.
///
/// Members are stably sorted by rank value; ties keep enumeration order.
/// Nulls are lowest when ascending and last when descending, so a null is
/// only ever the winner when the whole group is null, in which case the
/// first enumerated member wins.
pub fn resolve<F>(group: &ConflictGroup, rank: F, descending: bool) -> Result<Resolution, ReconError>
where
    F: Fn(&RecordId) -> Result<FieldValue, ReconError>,
{
    if group.members.len() < 2 {
        return Err(ReconError::EmptyGroup {
            group_id: group.group_id.clone(),
            members: group.members.len(),
        });
    }

    let mut ranked: Vec<(FieldValue, &RecordId)> = group
        .members
        .iter()
        .map(|id| Ok((rank(id)?, id)))
        .collect::<Result<_, ReconError>>()?;

    if descending {
        ranked.sort_by(|a, b| descending_nulls_last(&a.0, &b.0));
    } else {
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut iter = ranked.into_iter();
    let Some((winner_rank, winner)) = iter.next().map(|(v, id)| (v, id.clone())) else {
        return Err(ReconError::EmptyGroup {
            group_id: group.group_id.clone(),
            members: 0,
        });
    };
    let losers: Vec<RecordId> = iter.map(|(_, id)| id.clone()).collect();

    debug!(group = %group.group_id, winner = %winner, losers = losers.len(), "resolved group");

    Ok(Resolution {
        group_id: group.group_id.clone(),
        winner,
        winner_rank,
        losers,
    })
}

fn descending_nulls_last(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.cmp(a),
    }
}

/// Resolve every group against `rank_field` read from `store`.
pub fn resolve_all<S: AttributeStore + ?Sized>(
    groups: &[ConflictGroup],
    store: &S,
    rank_field: &str,
    descending: bool,
) -> Result<Vec<Resolution>, ReconError> {
    if !store.catalog().contains(rank_field) {
        return Err(ReconError::UnknownField {
            table: "records".into(),
            field: rank_field.to_string(),
        });
    }

    let resolutions = groups
        .iter()
        .map(|g| resolve(g, |id| store.read(id, rank_field), descending))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        groups = resolutions.len(),
        losers = resolutions.iter().map(|r| r.losers.len()).sum::<usize>(),
        "overlap resolution complete"
    );
    Ok(resolutions)
}

/// One clip per loser: loser shape minus winner shape, in group order.
pub fn clip_commands(resolutions: &[Resolution]) -> Vec<ClipCommand> {
    resolutions
        .iter()
        .flat_map(|r| {
            r.losers.iter().map(move |loser| ClipCommand {
                group_id: r.group_id.clone(),
                target: loser.clone(),
                subtract: r.winner.clone(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Geometry seam
// ---------------------------------------------------------------------------

/// Shape access and set-difference, supplied by an external geometry library.
pub trait GeometryEngine {
    type Shape;

    fn shape(&self, id: &RecordId) -> Result<Self::Shape, ReconError>;
    fn difference(&self, shape: &Self::Shape, subtract: &Self::Shape) -> Result<Self::Shape, ReconError>;
    fn set_shape(&mut self, id: &RecordId, shape: Self::Shape) -> Result<(), ReconError>;
}

/// Apply clips in order against the current shapes. A failed clip is
/// recorded and the remaining clips still run.
pub fn apply_clips<G: GeometryEngine>(engine: &mut G, commands: &[ClipCommand]) -> ClipReport {
    let mut report = ClipReport::default();
    for cmd in commands {
        let result = engine.shape(&cmd.subtract).and_then(|keep| {
            let old = engine.shape(&cmd.target)?;
            let clipped = engine.difference(&old, &keep)?;
            engine.set_shape(&cmd.target, clipped)
        });
        match result {
            Ok(()) => report.applied += 1,
            Err(e) => report.failures.push(RecordFailure {
                record: cmd.target.clone(),
                field: None,
                message: e.to_string(),
            }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(v: &[&str]) -> Vec<RecordId> {
        v.iter().map(|s| RecordId::from(*s)).collect()
    }

    fn ranks(pairs: &[(&str, FieldValue)]) -> HashMap<RecordId, FieldValue> {
        pairs.iter().map(|(k, v)| (RecordId::from(*k), v.clone())).collect()
    }

    fn run(group: &[&str], values: &HashMap<RecordId, FieldValue>, descending: bool) -> Resolution {
        let g = ConflictGroup::new("g1", ids(group));
        resolve(&g, |id| Ok(values[id].clone()), descending).unwrap()
    }

    #[test]
    fn ascending_picks_lowest_zone() {
        let v = ranks(&[
            ("1", FieldValue::Integer(5)),
            ("2", FieldValue::Integer(2)),
            ("3", FieldValue::Integer(8)),
        ]);
        let r = run(&["1", "2", "3"], &v, false);
        assert_eq!(r.winner, RecordId::from("2"));
        assert_eq!(r.winner_rank, FieldValue::Integer(2));
        assert_eq!(r.losers, ids(&["1", "3"]));
    }

    #[test]
    fn descending_picks_highest() {
        let v = ranks(&[
            ("1", FieldValue::Integer(5)),
            ("2", FieldValue::Integer(2)),
            ("3", FieldValue::Integer(8)),
        ]);
        let r = run(&["1", "2", "3"], &v, true);
        assert_eq!(r.winner, RecordId::from("3"));
        assert_eq!(r.losers, ids(&["1", "2"]));
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let v = ranks(&[
            ("a", FieldValue::Integer(4)),
            ("b", FieldValue::Integer(1)),
            ("c", FieldValue::Integer(4)),
            ("d", FieldValue::Integer(4)),
        ]);
        let r = run(&["c", "a", "b", "d"], &v, false);
        assert_eq!(r.winner, RecordId::from("b"));
        assert_eq!(r.losers, ids(&["c", "a", "d"]));

        let r = run(&["c", "a", "b", "d"], &v, true);
        assert_eq!(r.winner, RecordId::from("c"));
        assert_eq!(r.losers, ids(&["a", "d", "b"]));
    }

    #[test]
    fn nulls_never_win_unless_all_null() {
        let v = ranks(&[
            ("1", FieldValue::Null),
            ("2", FieldValue::Integer(9)),
            ("3", FieldValue::Integer(3)),
        ]);
        assert_eq!(run(&["1", "2", "3"], &v, false).winner, RecordId::from("3"));
        let desc = run(&["1", "2", "3"], &v, true);
        assert_eq!(desc.winner, RecordId::from("2"));
        assert_eq!(desc.losers, ids(&["3", "1"]));
    }

    #[test]
    fn all_null_falls_back_to_enumeration_order() {
        let v = ranks(&[("x", FieldValue::Null), ("y", FieldValue::Null), ("z", FieldValue::Null)]);
        for descending in [false, true] {
            let r = run(&["y", "x", "z"], &v, descending);
            assert_eq!(r.winner, RecordId::from("y"));
            assert_eq!(r.losers, ids(&["x", "z"]));
        }
    }

    #[test]
    fn undersized_group_rejected() {
        let g = ConflictGroup::new("lonely", ids(&["1"]));
        let err = resolve(&g, |_| Ok(FieldValue::Null), false).unwrap_err();
        assert_eq!(err, ReconError::EmptyGroup { group_id: "lonely".into(), members: 1 });
    }

    #[test]
    fn rank_read_errors_propagate() {
        let g = ConflictGroup::new("g", ids(&["1", "2"]));
        let err = resolve(&g, |id| Err(ReconError::UnknownRecord(id.0.clone())), false).unwrap_err();
        assert!(matches!(err, ReconError::UnknownRecord(_)));
    }

    #[test]
    fn clip_commands_subtract_winner() {
        let r = Resolution {
            group_id: "g".into(),
            winner: "2".into(),
            winner_rank: FieldValue::Integer(2),
            losers: ids(&["1", "3"]),
        };
        let cmds = clip_commands(&[r]);
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| c.subtract == RecordId::from("2")));
        assert_eq!(cmds[0].target, RecordId::from("1"));
    }

    /// 1-D interval stand-in for polygons.
    struct Intervals(HashMap<RecordId, (i32, i32)>);

    impl GeometryEngine for Intervals {
        type Shape = (i32, i32);

        fn shape(&self, id: &RecordId) -> Result<(i32, i32), ReconError> {
            self.0.get(id).copied().ok_or_else(|| ReconError::UnknownRecord(id.0.clone()))
        }

        fn difference(&self, s: &(i32, i32), cut: &(i32, i32)) -> Result<(i32, i32), ReconError> {
            if cut.0 <= s.0 && cut.1 >= s.1 {
                Ok((s.0, s.0))
            } else if cut.0 <= s.0 && cut.1 > s.0 {
                Ok((cut.1, s.1))
            } else if cut.0 < s.1 && cut.1 >= s.1 {
                Ok((s.0, cut.0))
            } else if cut.0 > s.0 && cut.1 < s.1 {
                Err(ReconError::Geometry("difference would split interval".into()))
            } else {
                Ok(*s)
            }
        }

        fn set_shape(&mut self, id: &RecordId, shape: (i32, i32)) -> Result<(), ReconError> {
            self.0.insert(id.clone(), shape);
            Ok(())
        }
    }

    #[test]
    fn apply_clips_trims_losers_and_reports_failures() {
        let mut geo = Intervals(
            [
                (RecordId::from("1"), (0, 10)),
                (RecordId::from("2"), (5, 15)),
                (RecordId::from("3"), (0, 20)),
            ]
            .into_iter()
            .collect(),
        );
        let cmds = vec![
            ClipCommand { group_id: "g".into(), target: "1".into(), subtract: "2".into() },
            ClipCommand { group_id: "g".into(), target: "3".into(), subtract: "2".into() },
            ClipCommand { group_id: "g".into(), target: "9".into(), subtract: "2".into() },
        ];
        let report = apply_clips(&mut geo, &cmds);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(geo.0[&RecordId::from("1")], (0, 5));
        assert_eq!(geo.0[&RecordId::from("3")], (0, 20));
        assert_eq!(geo.0[&RecordId::from("2")], (5, 15));
    }
}
