use std::ops::{Index, IndexMut};

use super::topology::{Dist, NodeId, Track};
use crate::{Tick, Tid};

pub type TrainId = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpeedLevel {
    SevenDec,
    TenInc,
    FourteenInc,
    Zero,
}

impl SpeedLevel {
    pub fn from_speed(speed: u8) -> SpeedLevel {
        match speed & 15 {
            0 => SpeedLevel::Zero,
            1..=7 => SpeedLevel::SevenDec,
            8..=11 => SpeedLevel::TenInc,
            _ => SpeedLevel::FourteenInc,
        }
    }

    /// Calibration table column, `None` when stopped.
    pub fn index(self) -> Option<usize> {
        match self {
            SpeedLevel::SevenDec => Some(0),
            SpeedLevel::TenInc => Some(1),
            SpeedLevel::FourteenInc => Some(2),
            SpeedLevel::Zero => None,
        }
    }

}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn flip(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Offset correction applied when a location crosses between the
    /// coordinator's frame and the routing peer's frame.
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub fn from_char(c: char) -> Option<Direction> {
        match c {
            'f' | 'F' => Some(Direction::Forward),
            'b' | 'B' => Some(Direction::Backward),
            _ => None,
        }
    }
}

/// Measured kinematics of one locomotive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Calibration {
    /// mm/s per speed level.
    pub velocity: [u32; 3],
    /// mm travelled after a stop command, per speed level.
    pub stop_dist: [u32; 3],
    pub accel_slow: u32,
    pub accel_delay: u32,
    pub accel_dist: u32,
    pub decel_slow: u32,
}

pub const CALIBRATION: [(TrainId, Calibration); 5] = [
    (1, Calibration { velocity: [262, 405, 551], stop_dist: [361, 676, 1034],
                      accel_slow: 8, accel_delay: 245, accel_dist: 452, decel_slow: 10 }),
    (24, Calibration { velocity: [248, 423, 572], stop_dist: [332, 721, 1122],
                       accel_slow: 9, accel_delay: 260, accel_dist: 488, decel_slow: 11 }),
    (58, Calibration { velocity: [231, 388, 529], stop_dist: [298, 640, 986],
                       accel_slow: 7, accel_delay: 230, accel_dist: 410, decel_slow: 9 }),
    (74, Calibration { velocity: [279, 447, 605], stop_dist: [385, 752, 1190],
                       accel_slow: 10, accel_delay: 275, accel_dist: 503, decel_slow: 12 }),
    (78, Calibration { velocity: [219, 362, 490], stop_dist: [276, 598, 915],
                       accel_slow: 7, accel_delay: 220, accel_dist: 396, decel_slow: 9 }),
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub node: NodeId,
    pub offset: i32,
}

impl Location {
    pub fn new(node: NodeId, offset: i32) -> Location {
        Location { node, offset }
    }
}

#[derive(Clone, Debug)]
pub struct Train {
    pub id: TrainId,
    pub calibration: Calibration,
    pub speed_level: SpeedLevel,
    pub direction: Direction,
    pub loc: Option<Location>,
    pub via: Option<Location>,
    pub dest: Option<Location>,

    pub next_sensor: Option<NodeId>,
    pub next_sensor_tick: Tick,
    pub next_sensor_dist: Dist,
    pub last_sensor: Option<NodeId>,
    pub last_sensor_tick: Tick,

    pub is_blocked: bool,
    /// Hardware task whose acknowledgement of a reversal is still owed.
    pub reversing: Option<Tid>,
}

impl Train {
    pub fn new(id: TrainId, calibration: Calibration) -> Train {
        Train {
            id,
            calibration,
            speed_level: SpeedLevel::Zero,
            direction: Direction::Forward,
            loc: None,
            via: None,
            dest: None,
            next_sensor: None,
            next_sensor_tick: 0,
            next_sensor_dist: 0,
            last_sensor: None,
            last_sensor_tick: 0,
            is_blocked: false,
            reversing: None,
        }
    }

    pub fn velocity(&self) -> u32 {
        self.speed_level.index().map(|i| self.calibration.velocity[i]).unwrap_or(0)
    }

    pub fn stop_dist(&self) -> u32 {
        self.speed_level.index().map(|i| self.calibration.stop_dist[i]).unwrap_or(0)
    }

    /// Velocity and stop distance the routing peer should plan with: the
    /// current level, or the manual throttle level while stationary.
    pub fn cruise(&self) -> (u32, u32) {
        let i = self.speed_level.index().unwrap_or(1);
        (self.calibration.velocity[i], self.calibration.stop_dist[i])
    }

    pub fn is_moving(&self) -> bool {
        self.speed_level != SpeedLevel::Zero
    }

    pub fn has_dest(&self) -> bool {
        self.dest.is_some()
    }

    pub fn is_route_direct(&self) -> bool {
        self.via == self.dest
    }

    pub fn set_loc(&mut self, loc: Location) {
        self.loc = Some(loc);
    }

    pub fn set_via(&mut self, via: Option<Location>) {
        self.via = via;
    }

    pub fn set_dest(&mut self, dest: Option<Location>) {
        self.dest = dest;
    }

    /// Flips the travel direction and re-expresses the location in the new frame.
    pub fn reverse_direction(&mut self, track: &Track) {
        self.direction = self.direction.flip();
        if let Some(loc) = self.loc {
            let (node, offset) = track.reverse_location(loc.node, loc.offset);
            self.loc = Some(Location { node, offset });
        }
    }
}

/// All trains, in a fixed order allocated once.
#[derive(Clone, Debug)]
pub struct Registry {
    trains: Vec<Train>,
}

impl Registry {
    pub fn new(trains: Vec<Train>) -> Registry {
        Registry { trains }
    }

    pub fn from_calibration() -> Registry {
        Registry::new(CALIBRATION.iter().map(|&(id, c)| Train::new(id, c)).collect())
    }

    pub fn slot(&self, id: TrainId) -> Option<usize> {
        self.trains.iter().position(|t| t.id == id)
    }

    pub fn get(&self, id: TrainId) -> Option<&Train> {
        self.trains.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Train> {
        self.trains.iter()
    }

    pub fn ids(&self) -> Vec<TrainId> {
        self.trains.iter().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }
}

impl Index<usize> for Registry {
    type Output = Train;
    fn index(&self, slot: usize) -> &Train {
        &self.trains[slot]
    }
}

impl IndexMut<usize> for Registry {
    fn index_mut(&mut self, slot: usize) -> &mut Train {
        &mut self.trains[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::layout::{parse_layout, tests::SIDING};

    #[test]
    fn speed_levels() {
        assert_eq!(SpeedLevel::from_speed(0), SpeedLevel::Zero);
        assert_eq!(SpeedLevel::from_speed(16), SpeedLevel::Zero);
        assert_eq!(SpeedLevel::from_speed(5), SpeedLevel::SevenDec);
        assert_eq!(SpeedLevel::from_speed(10), SpeedLevel::TenInc);
        assert_eq!(SpeedLevel::from_speed(26), SpeedLevel::TenInc);
        assert_eq!(SpeedLevel::from_speed(14), SpeedLevel::FourteenInc);

        let mut t = Train::new(24, CALIBRATION[1].1);
        assert_eq!(t.velocity(), 0);
        assert_eq!(t.stop_dist(), 0);
        assert_eq!(t.cruise(), (423, 721));
        t.speed_level = SpeedLevel::FourteenInc;
        assert_eq!(t.velocity(), 572);
        assert_eq!(t.stop_dist(), 1122);
    }

    #[test]
    fn registry_order() {
        let r = Registry::from_calibration();
        assert_eq!(r.ids(), vec![1, 24, 58, 74, 78]);
        assert_eq!(r.slot(58), Some(2));
        assert_eq!(r.slot(2), None);
        assert_eq!(r[3].id, 74);
    }

    #[test]
    fn reverse_flips_frame() {
        let track = parse_layout(SIDING).unwrap();
        let a1 = track.node_by_name("A1").unwrap();
        let a4 = track.node_by_name("A4").unwrap();

        let mut t = Train::new(1, CALIBRATION[0].1);
        t.set_loc(Location::new(a1, 250));
        t.reverse_direction(&track);
        assert_eq!(t.direction, Direction::Backward);
        assert_eq!(t.loc, Some(Location::new(a4, 250)));
    }

    #[test]
    fn route_predicates() {
        let mut t = Train::new(1, CALIBRATION[0].1);
        assert!(!t.has_dest());
        assert!(t.is_route_direct());
        t.set_dest(Some(Location::new(4, 100)));
        assert!(!t.is_route_direct());
        t.set_via(Some(Location::new(4, 100)));
        assert!(t.is_route_direct());
    }
}
