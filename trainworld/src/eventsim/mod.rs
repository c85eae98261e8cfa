//! Deterministic simulation of the world's surroundings.

pub mod kernel;
pub mod simulation;

use self::kernel::*;
use crate::input::layout::load_track;
use crate::input::script::{Script, ScriptCmd, ScriptError};
use crate::output::history::History;
use crate::railway::topology::{NodeId, Track};
use crate::railway::train::Location;
use crate::world::message::Msg;
use crate::world::{Config, World, WorldError};
use crate::{AppResult, Tick};

pub struct Simulation {
    world: World<SimKernel>,
}

impl Simulation {
    pub fn new(config: Config, routing_delay: usize) -> Simulation {
        Simulation { world: World::new(SimKernel::new(routing_delay), config) }
    }

    /// Schedules every script command at its tick. Names are resolved on the
    /// track selected by the script's first `init` line.
    pub fn load(&mut self, script: &Script) -> AppResult<()> {
        let set = script.track_set().ok_or(ScriptError::NoInit)?;
        let track = load_track(set)?;
        let kernel = self.world.kernel_mut();

        let mut t: Tick = 0;
        for &(line, ref cmd) in &script.commands {
            let (sender, msg) = match *cmd {
                ScriptCmd::Wait(dt) => {
                    t += dt as Tick;
                    continue;
                }
                ScriptCmd::Reserve { train, segment } => {
                    kernel.inject_reservation(train, segment, t);
                    continue;
                }
                ScriptCmd::Init(set) => (TERMINAL_TID, Msg::InitTrack(set)),
                ScriptCmd::Loc { train, ref node, offset, direction } => {
                    let loc = Location::new(resolve(&track, line, node)?, offset);
                    (TERMINAL_TID, Msg::SetTrainLoc { train, loc, direction })
                }
                ScriptCmd::Sensor(ref name) => {
                    let node = resolve(&track, line, name)?;
                    let sensor = track.node(node).sensor_num()
                        .ok_or_else(|| ScriptError::NotASensor(line, name.clone()))?;
                    (MARKLIN_TID, Msg::SensorTriggered { sensor, tick: t })
                }
                ScriptCmd::Switch { switch, dir } => (TERMINAL_TID, Msg::SwitchCmd { dir, switch }),
                ScriptCmd::Speed { train, cmd, routing } => {
                    let sender = if routing { ROUTING_TID } else { TERMINAL_TID };
                    (sender, Msg::TrainCmd { cmd, train })
                }
                ScriptCmd::Reverse(train) => (TERMINAL_TID, Msg::ReverseCmd { train }),
                ScriptCmd::Dest { train, ref node, offset } => {
                    let dest = Location::new(resolve(&track, line, node)?, offset);
                    (TERMINAL_TID, Msg::SetDestination { train, dest: Some(dest) })
                }
                ScriptCmd::Reroute(train) => (ROUTING_TID, Msg::Reroute { train }),
                ScriptCmd::Depart { train, ref node, offset } => {
                    let via = Location::new(resolve(&track, line, node)?, offset);
                    (ROUTING_TID, Msg::Depart { train, via })
                }
                ScriptCmd::Block { train, blocked } => (ROUTING_TID, Msg::SetTrainBlocked { train, blocked }),
            };
            kernel.inject_at(sender, msg, t);
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<(), WorldError> {
        self.world.run()
    }

    pub fn world(&self) -> &World<SimKernel> {
        &self.world
    }

    pub fn history(&self) -> &History {
        self.world.kernel().history()
    }
}

fn resolve(track: &Track, line: usize, name: &str) -> Result<NodeId, ScriptError> {
    track.node_by_name(name).ok_or_else(|| ScriptError::UnknownNode(line, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::script::parse_script;
    use crate::world::message::{MarklinCmd, RoutingMsg};

    #[test]
    fn scripted_run() {
        let script = parse_script("
init a
loc 24 A1 0 f
speed 24 10
wait 130
sensor A1
").unwrap();
        let mut sim = Simulation::new(Config::default(), 3);
        sim.load(&script).unwrap();
        sim.run().unwrap();

        let h = sim.history();
        assert_eq!(h.replies(), vec![0, 0, 0, 0]);
        assert!(h.marklin().contains(&MarklinCmd::Train { cmd: 10, train: 24 }));
        assert_eq!(sim.world().kernel().routing_lookups(), 4);
        let routing = h.routing();
        assert_eq!(routing.last(), Some(&RoutingMsg::SensorTriggered { sensor: 0, tick: 130, train: 24, next: Some(4) }));
    }

    #[test]
    fn bundled_scenarios() {
        let script = parse_script(include_str!("../../scenarios/track_a_run.txt")).unwrap();
        let mut sim = Simulation::new(Config::default(), 0);
        sim.load(&script).unwrap();
        sim.run().unwrap();
        let h = sim.history();
        assert!(h.replies().iter().all(|&c| c == 0));
        assert_eq!(h.marklin().last(), Some(&MarklinCmd::Stop));
        assert!(sim.world().kernel().reservations().owned_by(24).is_empty());

        let script = parse_script(include_str!("../../scenarios/bad_speed.txt")).unwrap();
        let mut sim = Simulation::new(Config::default(), 0);
        sim.load(&script).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.history().replies(), vec![0, 0, -3, -2, 0, 0, 0]);
    }

    #[test]
    fn unknown_names() {
        let mut sim = Simulation::new(Config::default(), 0);
        let script = parse_script("init b\nsensor XX9").unwrap();
        assert!(sim.load(&script).is_err());
        let script = parse_script("init b\nsensor BR1").unwrap();
        assert!(sim.load(&script).is_err());
        let script = parse_script("wait 3").unwrap();
        assert!(sim.load(&script).is_err());
    }
}
