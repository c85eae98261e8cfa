//! Sensor prediction: walks over the track graph following the current
//! branch directions.

use super::topology::{Dist, NodeId, Track};
use super::train::Registry;

/// Walks forward from `node` to the next sensor or exit node.
///
/// The first hop always leaves along the ahead edge. Returns the node reached
/// and the accumulated distance. A node without outgoing edge (an exit) is
/// its own answer at distance 0.
pub fn find_next_sensor(track: &Track, node: NodeId) -> (NodeId, Dist) {
    let mut edge = match track.ahead_edge(node) {
        Some(e) => e,
        None => return (node, 0),
    };
    let mut dist = 0;
    loop {
        dist += edge.dist;
        let next = track.node(edge.dest);
        if next.is_sensor() || next.is_exit() {
            return (edge.dest, dist);
        }
        edge = match track.next_edge(edge.dest) {
            Some(e) => e,
            None => return (edge.dest, dist),
        };
    }
}

/// Next sensor of a train standing at `(node, offset)`. A train which has
/// not yet passed `node` will trigger it first.
pub fn predict_next_sensor_by_loc(track: &Track, node: NodeId, offset: i32) -> (NodeId, Dist) {
    if offset <= 0 {
        (node, 0)
    } else {
        find_next_sensor(track, node)
    }
}

/// Finds the train that most likely triggered `sensor`.
///
/// First by exact prediction, then by assuming the predicted sensor was
/// skipped. Ties go to the first train in registry order. Returns the
/// registry slot and the extra distance covered beyond the prediction.
pub fn predict_train_by_sensor(track: &Track, trains: &Registry, sensor: NodeId) -> Option<(usize, Dist)> {
    let exact = trains.iter().position(|t| t.next_sensor == Some(sensor));
    if let Some(slot) = exact {
        return Some((slot, 0));
    }

    for (slot, t) in trains.iter().enumerate() {
        if t.is_blocked {
            continue;
        }
        let expected = match t.next_sensor {
            Some(n) if track.node(n).is_sensor() => n,
            _ => continue,
        };
        let (after, dist) = find_next_sensor(track, expected);
        if after == sensor {
            debug!("train {} may have skipped {}", t.id, track.name(expected));
            return Some((slot, dist));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::layout::{load_track, parse_layout, tests::SIDING, TrackSet};
    use crate::railway::topology::BranchDir;

    #[test]
    fn next_sensor_follows_branch_status() {
        let mut track = parse_layout(SIDING).unwrap();
        let a1 = track.node_by_name("A1").unwrap();
        let a3 = track.node_by_name("A3").unwrap();
        let a5 = track.node_by_name("A5").unwrap();
        let ex2 = track.node_by_name("EX2").unwrap();
        let br1 = track.branch(1).unwrap();

        assert_eq!(find_next_sensor(&track, a1), (a3, 500));
        assert_eq!(find_next_sensor(&track, a3), (ex2, 50));
        assert_eq!(find_next_sensor(&track, ex2), (ex2, 0));
        track.set_branch(br1, BranchDir::Curved);
        assert_eq!(find_next_sensor(&track, a1), (a5, 450));
    }

    #[test]
    fn prediction_by_location() {
        let track = load_track(TrackSet::A).unwrap();
        for n in 0..track.len() {
            assert_eq!(predict_next_sensor_by_loc(&track, n, 0), (n, 0));
            assert_eq!(predict_next_sensor_by_loc(&track, n, -40), (n, 0));
            assert_eq!(predict_next_sensor_by_loc(&track, n, 1), find_next_sensor(&track, n));
        }
    }

    #[test]
    fn every_walk_ends_at_sensor_or_exit() {
        for set in &[TrackSet::A, TrackSet::B] {
            for dir in &[BranchDir::Straight, BranchDir::Curved] {
                let mut track = load_track(*set).unwrap();
                let branches: Vec<_> = track.branch_nodes().collect();
                for b in branches {
                    track.set_branch(b, *dir);
                }
                for n in 0..track.len() {
                    let (end, _) = find_next_sensor(&track, n);
                    let node = track.node(end);
                    assert!(node.is_sensor() || node.is_exit(), "{} -> {}", track.name(n), node.name);
                }
            }
        }
    }

    #[test]
    fn train_by_sensor_tie_break() {
        let track = load_track(TrackSet::A).unwrap();
        let mut trains = Registry::from_calibration();
        let a3 = track.node_by_name("A3").unwrap();
        let a5 = track.node_by_name("A5").unwrap();

        trains[3].next_sensor = Some(a3);
        trains[1].next_sensor = Some(a3);
        assert_eq!(predict_train_by_sensor(&track, &trains, a3), Some((1, 0)));

        // skipped a3
        assert_eq!(predict_train_by_sensor(&track, &trains, a5), Some((1, 595)));
        trains[1].is_blocked = true;
        assert_eq!(predict_train_by_sensor(&track, &trains, a5), Some((3, 595)));

        // exact match wins over an earlier skip candidate
        trains[4].next_sensor = Some(a5);
        trains[1].is_blocked = false;
        assert_eq!(predict_train_by_sensor(&track, &trains, a5), Some((4, 0)));

        let a1 = track.node_by_name("A1").unwrap();
        assert_eq!(predict_train_by_sensor(&track, &trains, a1), None);
    }
}
