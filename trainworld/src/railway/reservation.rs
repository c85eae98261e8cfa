//! Segment ownership as exchanged with the reservation server.
//!
//! A snapshot is fetched, mutated locally and pushed back in one round trip.
//! The server serializes round trips, so no locking happens here.

use smallvec::SmallVec;

use super::topology::{NodeId, SegmentId, Track};
use super::train::TrainId;

pub const SEGMENT_CAP: usize = 128;

#[derive(Debug, Fail, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[fail(display = "segment {} does not exist", _0)]
    UnknownSegment(SegmentId),
    #[fail(display = "segment {} is owned by train {}", segment, owner)]
    Owned { segment: SegmentId, owner: TrainId },
    #[fail(display = "train {} does not own segment {} (owner {:?})", train, segment, owner)]
    NotOwner { segment: SegmentId, train: TrainId, owner: Option<TrainId> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationSnapshot {
    owners: Vec<Option<TrainId>>,
}

impl Default for ReservationSnapshot {
    fn default() -> ReservationSnapshot {
        ReservationSnapshot { owners: vec![None; SEGMENT_CAP] }
    }
}

impl ReservationSnapshot {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn owner(&self, seg: SegmentId) -> Option<TrainId> {
        self.owners.get(seg).cloned().unwrap_or(None)
    }

    pub fn can_reserve(&self, train: TrainId, seg: SegmentId) -> bool {
        match self.owners.get(seg) {
            Some(&None) => true,
            Some(&Some(owner)) => owner == train,
            None => false,
        }
    }

    pub fn reserve(&mut self, train: TrainId, seg: SegmentId) -> Result<(), ReservationError> {
        if seg >= self.owners.len() {
            return Err(ReservationError::UnknownSegment(seg));
        }
        if !self.can_reserve(train, seg) {
            return Err(ReservationError::Owned { segment: seg, owner: self.owners[seg].unwrap_or(train) });
        }
        self.owners[seg] = Some(train);
        Ok(())
    }

    pub fn free(&mut self, train: TrainId, seg: SegmentId) -> Result<(), ReservationError> {
        match self.owners.get(seg) {
            None => Err(ReservationError::UnknownSegment(seg)),
            Some(&Some(owner)) if owner == train => {
                self.owners[seg] = None;
                Ok(())
            }
            Some(&owner) => Err(ReservationError::NotOwner { segment: seg, train, owner }),
        }
    }

    pub fn owned_by(&self, train: TrainId) -> SmallVec<[SegmentId; 8]> {
        self.owners
            .iter()
            .enumerate()
            .filter(|&(_, o)| *o == Some(train))
            .map(|(s, _)| s)
            .collect()
    }

    pub fn reserved(&self) -> SmallVec<[(SegmentId, TrainId); 8]> {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(s, o)| o.map(|t| (s, t)))
            .collect()
    }
}

/// Frees the segments a train leaves behind when passing `sensor`.
///
/// The second leave slot is only released when the train came from the
/// segment `last_sensor` entered.
pub fn free_behind(track: &Track,
                   train: TrainId,
                   last_sensor: Option<NodeId>,
                   sensor: NodeId,
                   snapshot: &mut ReservationSnapshot)
                   -> Result<(), ReservationError> {
    let node = track.node(sensor);
    if let Some(seg) = node.leave_seg[0] {
        debug!("train {} frees segment {} at {}", train, seg, node.name);
        snapshot.free(train, seg)?;
    }

    if let Some(seg) = node.leave_seg[1] {
        let came_from = last_sensor.and_then(|s| track.node(s).enter_seg[0]);
        if came_from == Some(seg) {
            debug!("train {} frees segment {} at {} (branch)", train, seg, node.name);
            snapshot.free(train, seg)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::layout::{parse_layout, tests::SIDING};

    #[test]
    fn free_only_touches_target_segment() {
        let mut snapshot = ReservationSnapshot::new();
        snapshot.reserve(24, 3).unwrap();
        snapshot.reserve(24, 4).unwrap();
        snapshot.reserve(58, 5).unwrap();

        let before = snapshot.clone();
        assert_eq!(snapshot.free(58, 3),
                   Err(ReservationError::NotOwner { segment: 3, train: 58, owner: Some(24) }));
        assert_eq!(snapshot, before);
        assert_eq!(snapshot.free(24, 7),
                   Err(ReservationError::NotOwner { segment: 7, train: 24, owner: None }));
        assert_eq!(snapshot, before);

        snapshot.free(24, 3).unwrap();
        assert_eq!(snapshot.owner(3), None);
        assert_eq!(snapshot.owner(4), Some(24));
        assert_eq!(snapshot.owner(5), Some(58));
        assert_eq!(&snapshot.reserved()[..], &[(4, 24), (5, 58)]);
    }

    #[test]
    fn reserve_conflicts() {
        let mut snapshot = ReservationSnapshot::new();
        snapshot.reserve(24, 0).unwrap();
        // reserving twice for the same train is fine
        snapshot.reserve(24, 0).unwrap();
        assert!(!snapshot.can_reserve(58, 0));
        assert_eq!(snapshot.reserve(58, 0), Err(ReservationError::Owned { segment: 0, owner: 24 }));
        assert_eq!(snapshot.reserve(58, SEGMENT_CAP), Err(ReservationError::UnknownSegment(SEGMENT_CAP)));
        assert_eq!(&snapshot.owned_by(24)[..], &[0]);
    }

    #[test]
    fn free_behind_branch_boundary() {
        let track = parse_layout(SIDING).unwrap();
        let a2 = track.node_by_name("A2").unwrap();
        let a1 = track.node_by_name("A1").unwrap();
        let a5 = track.node_by_name("A5").unwrap();

        let mut snapshot = ReservationSnapshot::new();
        snapshot.reserve(24, 1).unwrap();
        snapshot.reserve(24, 0).unwrap();

        // last sensor entered segment 1, so only the first leave slot is freed
        let mut s = snapshot.clone();
        free_behind(&track, 24, Some(a1), a5, &mut s).unwrap();
        assert_eq!(&s.owned_by(24)[..], &[0]);

        // last sensor entered segment 0: both are freed
        let mut s = snapshot.clone();
        free_behind(&track, 24, Some(a2), a5, &mut s).unwrap();
        assert!(s.owned_by(24).is_empty());

        // segment owned by someone else
        let mut s = ReservationSnapshot::new();
        s.reserve(58, 1).unwrap();
        assert!(free_behind(&track, 24, Some(a2), a5, &mut s).is_err());
    }
}
