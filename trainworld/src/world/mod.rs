//! The world coordinator.
//!
//! Owns live train and track state, interprets sensor events and keeps the
//! reservation peer in sync with where trains actually are. Every request is
//! answered with a reply code before it is acted upon.

pub mod kernel;
pub mod message;

use self::kernel::Kernel;
use self::message::*;
use crate::input::layout::{load_track, LayoutError, TrackSet};
use crate::railway::prediction::{find_next_sensor, predict_next_sensor_by_loc, predict_train_by_sensor};
use crate::railway::reservation::{free_behind, ReservationError};
use crate::railway::topology::{BranchDir, NodeId, NodeKind, SensorNum, SwitchNum, Track};
use crate::railway::train::{Direction, Location, Registry, SpeedLevel, TrainId};
use crate::{Tick, Tid};

pub const WORLD: &str = "WORLD";
pub const MARKLIN_SERVER: &str = "MARKLIN";
pub const DISPLAY_SERVER: &str = "DISPLAY";
pub const ROUTING_SERVER: &str = "ROUTING";
pub const RESERVATION_SERVER: &str = "RESERVATION";

#[derive(Clone, Debug)]
pub struct Config {
    /// Ticks between a stop command and the assumed standstill.
    pub stop_delay: u32,
    /// The only non-zero speed accepted from senders other than routing.
    pub manual_speed: u8,
    /// Train command sent to every train when the track is loaded.
    pub init_speed_cmd: u8,
    /// Give up waiting for the routing peer after this many lookups.
    pub routing_poll_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            stop_delay: 400,
            manual_speed: 10,
            init_speed_cmd: 16,
            routing_poll_limit: None,
        }
    }
}

#[derive(Debug, Fail)]
pub enum WorldError {
    #[fail(display = "could not load track: {}", _0)]
    Layout(#[cause] LayoutError),
    #[fail(display = "peer {} is not registered", _0)]
    UnknownPeer(&'static str),
    #[fail(display = "train {} cannot reserve its start position: {}", train, cause)]
    UnreservableStart {
        train: TrainId,
        #[cause]
        cause: ReservationError,
    },
    #[fail(display = "unknown train {}", _0)]
    UnknownTrain(TrainId),
}

#[derive(Copy, Clone, Debug)]
struct Peers {
    marklin: Tid,
    display: Tid,
    routing: Tid,
}

#[derive(Debug)]
struct Loaded {
    set: TrackSet,
    track: Track,
    peers: Peers,
}

pub struct World<K: Kernel> {
    kernel: K,
    config: Config,
    trains: Registry,
    loaded: Option<Loaded>,
}

impl<K: Kernel> World<K> {
    pub fn new(kernel: K, config: Config) -> World<K> {
        World {
            kernel,
            config,
            trains: Registry::from_calibration(),
            loaded: None,
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn into_kernel(self) -> K {
        self.kernel
    }

    pub fn trains(&self) -> &Registry {
        &self.trains
    }

    pub fn track(&self) -> Option<&Track> {
        self.loaded.as_ref().map(|l| &l.track)
    }

    pub fn track_set(&self) -> Option<TrackSet> {
        self.loaded.as_ref().map(|l| l.set)
    }

    /// Serves requests until the kernel has none left or a fatal error occurs.
    pub fn run(&mut self) -> Result<(), WorldError> {
        self.kernel.register_as(WORLD);
        while let Some((sender, msg)) = self.kernel.receive() {
            self.step(sender, msg)?;
        }
        info!("world: no more requests");
        Ok(())
    }

    /// Handles one request. Returns the reply code sent to `sender`.
    pub fn step(&mut self, sender: Tid, msg: Msg) -> Result<i32, WorldError> {
        let code = match self.admit(sender, &msg) {
            Ok(()) => 0,
            Err(r) => r.code(),
        };
        self.kernel.reply(sender, code);
        if code != 0 {
            debug!("world: rejected {:?} from {} ({})", msg, sender, code);
            return Ok(code);
        }
        debug!("world: {:?} from {}", msg, sender);

        if let Msg::InitTrack(set) = msg {
            self.init(set)?;
            return Ok(0);
        }

        let World { ref mut kernel, ref config, ref mut trains, ref mut loaded } = *self;
        let loaded = match *loaded {
            Some(ref mut l) => l,
            None => return Ok(0),
        };
        let mut ctx = Context {
            kernel,
            config,
            trains,
            track: &mut loaded.track,
            peers: loaded.peers,
        };
        ctx.dispatch(sender, msg)?;
        Ok(0)
    }

    fn admit(&self, sender: Tid, msg: &Msg) -> Result<(), Reject> {
        let loaded = match (&self.loaded, msg) {
            (&None, &Msg::InitTrack(_)) => return Ok(()),
            (&Some(ref l), m) if !is_init(m) => l,
            _ => return Err(Reject::Uninitialized),
        };
        if let Some(id) = msg.train() {
            if self.trains.slot(id).is_none() {
                return Err(Reject::UnknownTrain);
            }
        }

        let track = &loaded.track;
        let on_track = |loc: &Location| loc.node < track.len();
        let known = match *msg {
            Msg::SetTrainLoc { ref loc, .. } => on_track(loc),
            Msg::SetDestination { dest: Some(ref loc), .. } => on_track(loc),
            Msg::Depart { ref via, .. } => on_track(via),
            Msg::SwitchCmd { switch, .. } => track.branch(switch).is_some(),
            Msg::SensorTriggered { sensor, .. } => track.has_sensor(sensor),
            _ => true,
        };
        if !known {
            return Err(Reject::UnknownTrack);
        }

        if let Msg::TrainCmd { cmd, train } = *msg {
            if let Some(speed) = speed_field(cmd) {
                if speed == 15 {
                    return Err(Reject::ReverseBySpeed);
                }
                if self.trains.get(train).map(|t| t.reversing.is_some()).unwrap_or(false) {
                    return Err(Reject::Reversing);
                }
                if speed != 0 && sender != loaded.peers.routing && speed != self.config.manual_speed {
                    return Err(Reject::ManualSpeed);
                }
            }
        }
        Ok(())
    }

    fn init(&mut self, set: TrackSet) -> Result<(), WorldError> {
        info!("world: loading track {:?}", set);
        let mut track = load_track(set).map_err(WorldError::Layout)?;
        let marklin = self.kernel.who_is(MARKLIN_SERVER).ok_or(WorldError::UnknownPeer(MARKLIN_SERVER))?;
        let display = self.kernel.who_is(DISPLAY_SERVER).ok_or(WorldError::UnknownPeer(DISPLAY_SERVER))?;

        self.kernel.send(marklin, Outbound::Marklin(MarklinCmd::Go));
        for id in self.trains.ids() {
            let cmd = MarklinCmd::Train { cmd: self.config.init_speed_cmd, train: id };
            self.kernel.send(marklin, Outbound::Marklin(cmd));
        }

        let branches: Vec<NodeId> = track.branch_nodes().collect();
        for (node, c) in branches.into_iter().zip(set.switch_init().chars()) {
            let switch = match track.node(node).kind {
                NodeKind::Branch(num, _) => num,
                _ => continue,
            };
            let dir = BranchDir::from_char(c).unwrap_or(BranchDir::Straight);
            track.set_branch(node, dir);
            self.kernel.send(marklin, Outbound::Marklin(MarklinCmd::Switch { dir, switch }));
            self.kernel.async_send(display, Outbound::Display(DisplayMsg::Switch { dir, switch }));
        }

        let mut polls = 0;
        let routing = loop {
            if let Some(tid) = self.kernel.who_is(ROUTING_SERVER) {
                break tid;
            }
            polls += 1;
            if self.config.routing_poll_limit.map(|limit| polls >= limit).unwrap_or(false) {
                return Err(WorldError::UnknownPeer(ROUTING_SERVER));
            }
        };
        debug!("world: routing found after {} lookups", polls);
        self.kernel.send(routing, Outbound::Routing(RoutingMsg::TrackSet(set)));

        self.loaded = Some(Loaded {
            set,
            track,
            peers: Peers { marklin, display, routing },
        });
        Ok(())
    }
}

fn saturate(v: i64) -> i32 {
    v.max(i64::from(i32::MIN)).min(i64::from(i32::MAX)) as i32
}

fn is_init(msg: &Msg) -> bool {
    match *msg {
        Msg::InitTrack(_) => true,
        _ => false,
    }
}

/// Disjoint borrows of the coordinator state while a track is loaded.
struct Context<'a, K: Kernel + 'a> {
    kernel: &'a mut K,
    config: &'a Config,
    trains: &'a mut Registry,
    track: &'a mut Track,
    peers: Peers,
}

impl<'a, K: Kernel + 'a> Context<'a, K> {
    fn dispatch(&mut self, sender: Tid, msg: Msg) -> Result<(), WorldError> {
        match msg {
            Msg::InitTrack(_) => {}
            Msg::SetTrainLoc { train, loc, direction } => {
                let slot = self.slot(train)?;
                self.on_set_train_loc(slot, loc, direction)?;
            }
            Msg::SwitchCmd { dir, switch } => self.on_switch(dir, switch),
            Msg::SensorTriggered { sensor, tick } => self.on_sensor_triggered(sensor, tick)?,
            Msg::SetDestination { train, dest } => {
                let slot = self.slot(train)?;
                self.on_set_destination(slot, dest, false);
            }
            Msg::Reroute { train } => {
                let slot = self.slot(train)?;
                self.on_set_destination(slot, None, true);
            }
            Msg::TrainCmd { cmd, train } => {
                let slot = self.slot(train)?;
                self.on_train_cmd(sender, slot, cmd);
            }
            Msg::ReverseCmd { train } => {
                let slot = self.slot(train)?;
                self.on_reverse(slot);
            }
            Msg::Depart { train, via } => {
                let slot = self.slot(train)?;
                self.on_depart(slot, via);
            }
            Msg::SetTrainBlocked { train, blocked } => {
                let slot = self.slot(train)?;
                debug!("train {} blocked: {}", train, blocked);
                self.trains[slot].is_blocked = blocked;
            }
            Msg::TrainStopped { train } => {
                let slot = self.slot(train)?;
                self.on_train_stopped(slot);
            }
        }
        Ok(())
    }

    fn slot(&self, train: TrainId) -> Result<usize, WorldError> {
        self.trains.slot(train).ok_or(WorldError::UnknownTrain(train))
    }

    fn reservation_server(&mut self) -> Result<Tid, WorldError> {
        self.kernel.who_is(RESERVATION_SERVER).ok_or(WorldError::UnknownPeer(RESERVATION_SERVER))
    }

    fn marklin(&mut self, cmd: MarklinCmd) {
        self.kernel.send(self.peers.marklin, Outbound::Marklin(cmd));
    }

    fn display(&mut self, msg: DisplayMsg) {
        self.kernel.async_send(self.peers.display, Outbound::Display(msg));
    }

    fn display_train(&mut self, slot: usize, status: TrainStatus) {
        let t = &self.trains[slot];
        let msg = DisplayMsg::Train { slot, status, loc: t.loc, via: t.via, dest: t.dest };
        self.display(msg);
    }

    fn display_prediction(&mut self, slot: usize) {
        let t = &self.trains[slot];
        let sensor = t.next_sensor.map(|n| self.track.name(n).to_string()).unwrap_or_default();
        let msg = DisplayMsg::prediction(t.id, &sensor, t.next_sensor_tick);
        self.display(msg);
    }

    fn emergency_stop(&mut self, diagnostic: Diagnostic, sensor: &str) {
        warn!("emergency stop at {}: {:?}", sensor, diagnostic);
        self.marklin(MarklinCmd::Stop);
        self.display(DisplayMsg::diagnostic(diagnostic, sensor));
    }

    /// Re-predicts the next sensor from the authoritative location.
    fn resync_prediction(&mut self, slot: usize) {
        let t = &mut self.trains[slot];
        if let Some(loc) = t.loc {
            let (next, dist) = predict_next_sensor_by_loc(self.track, loc.node, loc.offset);
            t.next_sensor = Some(next);
            t.next_sensor_dist = dist;
        }
    }

    fn on_set_train_loc(&mut self, slot: usize, loc: Location, direction: Direction) -> Result<(), WorldError> {
        let id = {
            let t = &mut self.trains[slot];
            t.set_loc(loc);
            t.direction = direction;
            t.next_sensor_tick = 0;
            t.id
        };
        self.resync_prediction(slot);
        info!("train {} placed at {}{:+} {:?}", id, self.track.name(loc.node), loc.offset, direction);

        let node = self.track.node(loc.node);
        let seg = if loc.offset <= 0 { node.leave_seg[0] } else { node.enter_seg[0] };
        let server = self.reservation_server()?;
        let pristine = self.kernel.fetch_reservations(server);
        let mut snapshot = pristine.clone();
        if let Some(seg) = seg {
            if let Err(cause) = snapshot.reserve(id, seg) {
                error!("train {} cannot reserve segment {}: {}", id, seg, cause);
                self.kernel.update_reservations(server, pristine);
                return Err(WorldError::UnreservableStart { train: id, cause });
            }
        }
        self.kernel.update_reservations(server, snapshot);

        self.display_train(slot, TrainStatus::Stationary);
        self.display_prediction(slot);
        Ok(())
    }

    fn on_switch(&mut self, dir: BranchDir, switch: SwitchNum) {
        if let Some(node) = self.track.branch(switch) {
            self.track.set_branch(node, dir);
        }
        self.marklin(MarklinCmd::Switch { dir, switch });
        self.display(DisplayMsg::Switch { dir, switch });
    }

    fn on_sensor_triggered(&mut self, sensor_num: SensorNum, tick: Tick) -> Result<(), WorldError> {
        let sensor = self.track.sensor(sensor_num);
        let name = self.track.name(sensor).to_string();

        let (slot, off_dist) = match predict_train_by_sensor(self.track, self.trains, sensor) {
            Some(m) => m,
            None => {
                warn!("no train expected at {}", name);
                self.emergency_stop(Diagnostic::NoTrain, &name);
                return Ok(());
            }
        };
        let (id, expected, mut last_sensor) = {
            let t = &self.trains[slot];
            (t.id, t.next_sensor, t.last_sensor)
        };

        let server = self.reservation_server()?;
        let pristine = self.kernel.fetch_reservations(server);
        let mut snapshot = pristine.clone();

        if let Some(skipped) = expected.filter(|&n| n != sensor) {
            info!("train {} skipped {}", id, self.track.name(skipped));
            if let Err(e) = free_behind(self.track, id, last_sensor, skipped, &mut snapshot) {
                warn!("cannot free behind skipped sensor: {}", e);
                self.kernel.update_reservations(server, pristine);
                self.emergency_stop(Diagnostic::SkippedUnfreeable, &name);
                return Ok(());
            }
            last_sensor = Some(skipped);
        }
        if let Err(e) = free_behind(self.track, id, last_sensor, sensor, &mut snapshot) {
            warn!("cannot free behind {}: {}", name, e);
            self.kernel.update_reservations(server, pristine);
            self.emergency_stop(Diagnostic::TriggeredUnfreeable, &name);
            return Ok(());
        }
        self.kernel.update_reservations(server, snapshot);

        let (next, time_diff, dist_diff, avg_velocity) = {
            let t = &mut self.trains[slot];
            let total_dist = i64::from(t.next_sensor_dist) + i64::from(off_dist);
            let total_tick = i64::from(tick) - i64::from(t.last_sensor_tick);
            let avg_velocity = if total_tick > 0 { total_dist * 100 / total_tick } else { 0 };
            let velocity = i64::from(t.velocity());
            let time_diff = i64::from(tick) - i64::from(t.next_sensor_tick);
            let dist_diff = velocity * time_diff / 100;

            let (next, dist) = find_next_sensor(self.track, sensor);
            t.next_sensor = Some(next);
            t.next_sensor_dist = dist;
            t.next_sensor_tick = if velocity > 0 {
                saturate(i64::from(tick) + i64::from(dist) * 100 / velocity)
            } else {
                0
            };
            t.last_sensor = Some(sensor);
            t.last_sensor_tick = tick;
            (next, saturate(time_diff), saturate(dist_diff), saturate(avg_velocity))
        };
        debug!("train {} at {} tick {}, next {} (time diff {}, dist diff {}, avg {})",
               id, name, tick, self.track.name(next), time_diff, dist_diff, avg_velocity);

        if self.track.node(next).is_sensor() {
            let (after, _) = find_next_sensor(self.track, next);
            let event = RoutingMsg::SensorTriggered {
                sensor: sensor_num,
                tick,
                train: id,
                next: self.track.node(after).sensor_num(),
            };
            self.kernel.send(self.peers.routing, Outbound::Routing(event));
        }

        let blocked: Vec<usize> = (0..self.trains.len()).filter(|&s| self.trains[s].is_blocked).collect();
        for b in blocked {
            self.on_set_destination(b, None, false);
        }

        let t = &self.trains[slot];
        let passed = DisplayMsg::Train {
            slot,
            status: TrainStatus::PassedSensor,
            loc: Some(Location::new(sensor, 0)),
            via: t.via,
            dest: t.dest,
        };
        let predict = DisplayMsg::Predict {
            by: Predictor::Train(id),
            sensor: self.track.name(next).to_string(),
            tick: t.next_sensor_tick,
            time_diff,
            dist_diff,
            avg_velocity,
        };
        self.display(passed);
        self.display(predict);
        Ok(())
    }

    fn on_set_destination(&mut self, slot: usize, dest: Option<Location>, reroute: bool) {
        let t = &mut self.trains[slot];
        if !reroute && dest.is_some() {
            t.set_dest(dest);
        }
        let snapshot = KinematicSnapshot::of(t);
        info!("train {} {} to {:?}", t.id, if reroute { "reroute" } else { "plan" }, t.dest);
        self.kernel.async_send(self.peers.routing, Outbound::Routing(RoutingMsg::Plan { reroute, snapshot }));
    }

    fn on_train_cmd(&mut self, sender: Tid, slot: usize, cmd: u8) {
        let id = self.trains[slot].id;
        if let Some(speed) = speed_field(cmd) {
            let t = &mut self.trains[slot];
            if speed == 0 {
                if t.is_moving() {
                    info!("stop train {}", id);
                    let me = self.kernel.my_tid();
                    self.kernel.delay_send(me, Msg::TrainStopped { train: id }, self.config.stop_delay);
                }
            } else if sender == self.peers.routing {
                t.is_blocked = false;
            }
            t.speed_level = SpeedLevel::from_speed(cmd);
            info!("train {} speed {} light {} at tick {}", id, speed, cmd & LIGHT_MASK != 0, self.kernel.time());
        }
        self.marklin(MarklinCmd::Train { cmd, train: id });
    }

    /// Flips a stopped train and tells the hardware. Until the hardware
    /// acknowledges, speed commands are refused and a further ReverseCmd
    /// only resends the command.
    fn on_reverse(&mut self, slot: usize) {
        let id = self.trains[slot].id;
        if self.trains[slot].reversing.is_some() {
            info!("train {}: resending reverse", id);
        } else {
            if self.trains[slot].is_moving() {
                debug!("train {} is moving, reverse ignored", id);
                return;
            }
            info!("reverse train {}", id);
            self.trains[slot].reverse_direction(self.track);
            self.resync_prediction(slot);
            self.trains[slot].reversing = Some(self.peers.marklin);
        }

        let marklin = self.peers.marklin;
        let ack = self.kernel.send(marklin, Outbound::Marklin(MarklinCmd::Reverse { train: id }));
        if ack < 0 {
            warn!("train {}: reverse not acknowledged by {} ({})", id, marklin, ack);
            return;
        }
        self.trains[slot].reversing = None;

        let status = if self.trains[slot].is_blocked { TrainStatus::Blocked } else { TrainStatus::Stationary };
        self.display_train(slot, status);
        self.trains[slot].next_sensor_tick = 0;
        self.display_prediction(slot);
    }

    fn on_depart(&mut self, slot: usize, via: Location) {
        let via = {
            let t = &mut self.trains[slot];
            let via = Location::new(via.node, via.offset + t.direction.sign());
            t.set_via(Some(via));
            via
        };
        self.display_train(slot, TrainStatus::Departed);
        self.trains[slot].set_loc(via);
        info!("train {} via {}{:+}", self.trains[slot].id, self.track.name(via.node), via.offset);
    }

    fn on_train_stopped(&mut self, slot: usize) {
        let t = &self.trains[slot];
        info!("train {} stopped", t.id);
        if !(t.has_dest() && t.is_route_direct()) {
            return;
        }
        if let Some(dest) = t.dest {
            info!("train {} arrived at {}{:+}", t.id, self.track.name(dest.node), dest.offset);
        }
        self.display_train(slot, TrainStatus::Stationary);

        let t = &mut self.trains[slot];
        t.set_via(None);
        t.set_dest(None);
        let before = t.next_sensor;
        self.resync_prediction(slot);
        if self.trains[slot].next_sensor != before {
            debug!("train {} prediction resynchronized", self.trains[slot].id);
        }
    }
}
