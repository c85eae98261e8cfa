use smallvec::SmallVec;

use crate::input::layout::TrackSet;
use crate::railway::topology::{BranchDir, SensorNum, SwitchNum};
use crate::railway::train::{Direction, Location, Train, TrainId};
use crate::Tick;

pub const SPEED_MASK: u8 = 15;
pub const LIGHT_MASK: u8 = 16;

/// Train command that reverses the locomotive (speed 15 with lights).
pub const REVERSE_CMD: u8 = 31;

/// Speed part of a train command. `None` for commands outside the
/// speed/light range, which go to the hardware untouched.
pub fn speed_field(cmd: u8) -> Option<u8> {
    if cmd <= SPEED_MASK | LIGHT_MASK {
        Some(cmd & SPEED_MASK)
    } else {
        None
    }
}

/// Inbound requests handled by the world coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Msg {
    InitTrack(TrackSet),
    SetTrainLoc { train: TrainId, loc: Location, direction: Direction },
    SwitchCmd { dir: BranchDir, switch: SwitchNum },
    SensorTriggered { sensor: SensorNum, tick: Tick },
    SetDestination { train: TrainId, dest: Option<Location> },
    Reroute { train: TrainId },
    TrainCmd { cmd: u8, train: TrainId },
    ReverseCmd { train: TrainId },
    Depart { train: TrainId, via: Location },
    SetTrainBlocked { train: TrainId, blocked: bool },
    TrainStopped { train: TrainId },
}

impl Msg {
    pub fn train(&self) -> Option<TrainId> {
        use self::Msg::*;
        match *self {
            SetTrainLoc { train, .. }
            | SetDestination { train, .. }
            | Reroute { train }
            | TrainCmd { train, .. }
            | ReverseCmd { train }
            | Depart { train, .. }
            | SetTrainBlocked { train, .. }
            | TrainStopped { train } => Some(train),
            InitTrack(_) | SwitchCmd { .. } | SensorTriggered { .. } => None,
        }
    }
}

/// Reply codes for messages the coordinator refuses to handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reject {
    /// No track loaded yet, or a second InitTrack.
    Uninitialized,
    /// Speed 15 must go through ReverseCmd.
    ReverseBySpeed,
    /// Only the manual throttle value is allowed outside routing.
    ManualSpeed,
    UnknownTrain,
    /// Node, sensor or switch not present on the loaded track.
    UnknownTrack,
    /// The hardware has not acknowledged the train's last reversal.
    Reversing,
}

impl Reject {
    pub fn code(self) -> i32 {
        match self {
            Reject::Uninitialized => -1,
            Reject::ReverseBySpeed => -2,
            Reject::ManualSpeed => -3,
            Reject::UnknownTrain => -4,
            Reject::UnknownTrack => -5,
            Reject::Reversing => -6,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarklinCmd {
    Go,
    Stop,
    Train { cmd: u8, train: TrainId },
    Switch { dir: BranchDir, switch: SwitchNum },
    Reverse { train: TrainId },
    SolenoidOff,
    QuerySensors,
}

impl MarklinCmd {
    /// Bytes as written to the serial line.
    pub fn payload(&self) -> SmallVec<[i32; 2]> {
        use self::MarklinCmd::*;
        let mut p = SmallVec::new();
        match *self {
            Go => p.push(0x60),
            Stop => p.push(0x61),
            Train { cmd, train } => {
                p.push(cmd as i32);
                p.push(train as i32);
            }
            Switch { dir, switch } => {
                p.push(match dir {
                    BranchDir::Straight => 0x21,
                    BranchDir::Curved => 0x22,
                });
                p.push(switch as i32);
            }
            Reverse { train } => {
                p.push(REVERSE_CMD as i32);
                p.push(train as i32);
            }
            SolenoidOff => p.push(0x20),
            QuerySensors => p.push(0x85),
        }
        p
    }
}

/// Everything the routing peer needs to plan a route for one train.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KinematicSnapshot {
    pub train: TrainId,
    pub accel_slow: u32,
    pub accel_delay: u32,
    pub accel_dist: u32,
    pub decel_slow: u32,
    pub stop_dist: u32,
    pub velocity: u32,
    pub loc: Option<Location>,
    pub dest: Option<Location>,
    pub direction: Direction,
}

impl KinematicSnapshot {
    pub fn of(train: &Train) -> KinematicSnapshot {
        let (velocity, stop_dist) = train.cruise();
        let c = &train.calibration;
        KinematicSnapshot {
            train: train.id,
            accel_slow: c.accel_slow,
            accel_delay: c.accel_delay,
            accel_dist: c.accel_dist,
            decel_slow: c.decel_slow,
            stop_dist,
            velocity,
            loc: train.loc,
            dest: train.dest,
            direction: train.direction,
        }
    }

    /// The twelve integer wire fields. Offsets are shifted back by the
    /// direction sign, unknown locations are sent as node -1.
    pub fn fields(&self) -> [i32; 12] {
        let sign = self.direction.sign();
        let (loc_node, loc_off) = wire_loc(self.loc, sign);
        let (dest_node, dest_off) = wire_loc(self.dest, sign);
        [
            self.train as i32,
            self.accel_slow as i32,
            self.accel_delay as i32,
            self.accel_dist as i32,
            self.decel_slow as i32,
            self.stop_dist as i32,
            self.velocity as i32,
            loc_node,
            loc_off,
            dest_node,
            dest_off,
            sign,
        ]
    }
}

fn wire_loc(loc: Option<Location>, sign: i32) -> (i32, i32) {
    match loc {
        Some(l) => (l.node as i32, l.offset - sign),
        None => (-1, 0),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingMsg {
    TrackSet(TrackSet),
    SensorTriggered { sensor: SensorNum, tick: Tick, train: TrainId, next: Option<SensorNum> },
    Plan { reroute: bool, snapshot: KinematicSnapshot },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrainStatus {
    Stationary,
    Departed,
    PassedSensor,
    Blocked,
}

/// Failures reported to the display in place of a train id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    NoTrain,
    SkippedUnfreeable,
    TriggeredUnfreeable,
}

impl Diagnostic {
    pub fn code(self) -> i32 {
        match self {
            Diagnostic::NoTrain => -1,
            Diagnostic::SkippedUnfreeable => -2,
            Diagnostic::TriggeredUnfreeable => -3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predictor {
    Train(TrainId),
    Diagnostic(Diagnostic),
}

impl Predictor {
    pub fn code(self) -> i32 {
        match self {
            Predictor::Train(id) => id as i32,
            Predictor::Diagnostic(d) => d.code(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayMsg {
    Train {
        slot: usize,
        status: TrainStatus,
        loc: Option<Location>,
        via: Option<Location>,
        dest: Option<Location>,
    },
    Switch { dir: BranchDir, switch: SwitchNum },
    Predict {
        by: Predictor,
        sensor: String,
        tick: Tick,
        time_diff: i32,
        dist_diff: i32,
        avg_velocity: i32,
    },
}

impl DisplayMsg {
    pub fn diagnostic(d: Diagnostic, sensor: &str) -> DisplayMsg {
        DisplayMsg::Predict {
            by: Predictor::Diagnostic(d),
            sensor: sensor.to_string(),
            tick: 0,
            time_diff: 0,
            dist_diff: 0,
            avg_velocity: 0,
        }
    }

    pub fn prediction(train: TrainId, sensor: &str, tick: Tick) -> DisplayMsg {
        DisplayMsg::Predict {
            by: Predictor::Train(train),
            sensor: sensor.to_string(),
            tick,
            time_diff: 0,
            dist_diff: 0,
            avg_velocity: 0,
        }
    }
}

/// A message leaving the coordinator, tagged by the peer kind it is meant for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Marklin(MarklinCmd),
    Routing(RoutingMsg),
    Display(DisplayMsg),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::train::{Registry, SpeedLevel};

    #[test]
    fn marklin_bytes() {
        assert_eq!(&MarklinCmd::Go.payload()[..], &[0x60]);
        assert_eq!(&MarklinCmd::Train { cmd: 26, train: 24 }.payload()[..], &[26, 24]);
        assert_eq!(&MarklinCmd::Switch { dir: BranchDir::Curved, switch: 153 }.payload()[..], &[0x22, 153]);
        assert_eq!(&MarklinCmd::Reverse { train: 58 }.payload()[..], &[31, 58]);
    }

    #[test]
    fn kinematic_fields() {
        let mut trains = Registry::from_calibration();
        let t = &mut trains[1];
        t.direction = Direction::Backward;
        t.speed_level = SpeedLevel::SevenDec;
        t.set_loc(Location::new(4, 120));
        let f = KinematicSnapshot::of(t).fields();
        assert_eq!(f, [24, 9, 260, 488, 11, 332, 248, 4, 121, -1, 0, -1]);

        t.direction = Direction::Forward;
        t.set_dest(Some(Location::new(40, 0)));
        let f = KinematicSnapshot::of(t).fields();
        assert_eq!(&f[7..], &[4, 119, 40, -1, 1]);
    }

    #[test]
    fn msg_train_ids() {
        assert_eq!(Msg::ReverseCmd { train: 74 }.train(), Some(74));
        assert_eq!(Msg::SensorTriggered { sensor: 3, tick: 0 }.train(), None);
        assert_eq!(Reject::UnknownTrack.code(), -5);
    }

    #[test]
    fn speed_fields() {
        assert_eq!(speed_field(0), Some(0));
        assert_eq!(speed_field(26), Some(10));
        assert_eq!(speed_field(REVERSE_CMD), Some(15));
        assert_eq!(speed_field(32), None);
        assert_eq!(speed_field(64), None);
    }
}
