use regex::Regex;

use crate::input::layout::TrackSet;
use crate::railway::topology::{BranchDir, SegmentId, SwitchNum};
use crate::railway::train::{Direction, TrainId};

#[derive(Debug)]
pub struct Script {
    /// Commands with their line numbers.
    pub commands: Vec<(usize, ScriptCmd)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCmd {
    Init(TrackSet),
    Wait(u32),
    Loc { train: TrainId, node: String, offset: i32, direction: Direction },
    Sensor(String),
    Switch { switch: SwitchNum, dir: BranchDir },
    /// A train command. `routing` marks it as sent by the routing peer.
    Speed { train: TrainId, cmd: u8, routing: bool },
    Reverse(TrainId),
    Dest { train: TrainId, node: String, offset: i32 },
    Reroute(TrainId),
    Depart { train: TrainId, node: String, offset: i32 },
    Block { train: TrainId, blocked: bool },
    /// Reservation made by the manual control path, bypassing the world.
    Reserve { train: TrainId, segment: SegmentId },
}

impl Script {
    /// The track set named by the first `init` line.
    pub fn track_set(&self) -> Option<TrackSet> {
        self.commands.iter().filter_map(|&(_, ref c)| match *c {
            ScriptCmd::Init(set) => Some(set),
            _ => None,
        }).next()
    }
}

#[derive(Debug, Fail)]
pub enum ScriptError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "error converting number on line {}", _0)]
    NumberError(usize),
    #[fail(display = "unrecognized script line {}: {}", _0, _1)]
    Unrecognized(usize, String),
    #[fail(display = "unknown node {} on line {}", _1, _0)]
    UnknownNode(usize, String),
    #[fail(display = "{} on line {} is not a sensor", _1, _0)]
    NotASensor(usize, String),
    #[fail(display = "script has no init line")]
    NoInit,
}

fn re(s: &str) -> Result<Regex, ScriptError> {
    Regex::new(s).map_err(|e| ScriptError::RegexError(format!("{:?}", e)))
}

/// Parses scenario scripts
///
/// * init a
/// * wait 100
/// * loc 24 A1 0 f
/// * sensor A3
/// * switch 153 C
/// * speed 24 10 [routing]
/// * reverse 24
/// * dest 24 E7 120
/// * reroute 24
/// * depart 24 A1 0
/// * block 24 1
/// * reserve 58 3
///
pub fn parse_script(input: &str) -> Result<Script, ScriptError> {
    let init_re = re(r"^\s*init\s+([aAbB])\s*$")?;
    let wait_re = re(r"^\s*wait\s+(\d+)\s*$")?;
    let loc_re = re(r"^\s*loc\s+(\d+)\s+(\w+)\s+(-?\d+)\s+([fbFB])\s*$")?;
    let sensor_re = re(r"^\s*sensor\s+(\w+)\s*$")?;
    let switch_re = re(r"^\s*switch\s+(\d+)\s+([SCsc])\s*$")?;
    let speed_re = re(r"^\s*speed\s+(\d+)\s+(\d+)(\s+routing)?\s*$")?;
    let reverse_re = re(r"^\s*reverse\s+(\d+)\s*$")?;
    let dest_re = re(r"^\s*(dest|depart)\s+(\d+)\s+(\w+)\s+(-?\d+)\s*$")?;
    let reroute_re = re(r"^\s*reroute\s+(\d+)\s*$")?;
    let block_re = re(r"^\s*block\s+(\d+)\s+([01])\s*$")?;
    let reserve_re = re(r"^\s*reserve\s+(\d+)\s+(\d+)\s*$")?;
    let skip_re = re(r"^\s*(#.*)?$")?;

    let mut commands = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let lineno = i + 1;
        let num = |s: &str| s.parse::<i64>().map_err(|_e| ScriptError::NumberError(lineno));

        if skip_re.is_match(line) {
            continue;
        }
        let cmd = if let Some(g) = init_re.captures(line) {
            ScriptCmd::Init(TrackSet::from_name(&g[1]).ok_or(ScriptError::NumberError(lineno))?)
        } else if let Some(g) = wait_re.captures(line) {
            ScriptCmd::Wait(num(&g[1])? as u32)
        } else if let Some(g) = loc_re.captures(line) {
            ScriptCmd::Loc {
                train: num(&g[1])? as TrainId,
                node: g[2].to_string(),
                offset: num(&g[3])? as i32,
                direction: g[4].chars().next().and_then(Direction::from_char)
                    .ok_or_else(|| ScriptError::Unrecognized(lineno, line.to_string()))?,
            }
        } else if let Some(g) = sensor_re.captures(line) {
            ScriptCmd::Sensor(g[1].to_string())
        } else if let Some(g) = switch_re.captures(line) {
            let dir = g[2].chars().next().and_then(BranchDir::from_char)
                .ok_or_else(|| ScriptError::Unrecognized(lineno, line.to_string()))?;
            ScriptCmd::Switch { switch: num(&g[1])? as SwitchNum, dir }
        } else if let Some(g) = speed_re.captures(line) {
            let cmd = num(&g[2])?;
            if cmd > 255 {
                return Err(ScriptError::NumberError(lineno));
            }
            ScriptCmd::Speed { train: num(&g[1])? as TrainId, cmd: cmd as u8, routing: g.get(3).is_some() }
        } else if let Some(g) = reverse_re.captures(line) {
            ScriptCmd::Reverse(num(&g[1])? as TrainId)
        } else if let Some(g) = dest_re.captures(line) {
            let train = num(&g[2])? as TrainId;
            let node = g[3].to_string();
            let offset = num(&g[4])? as i32;
            if &g[1] == "dest" {
                ScriptCmd::Dest { train, node, offset }
            } else {
                ScriptCmd::Depart { train, node, offset }
            }
        } else if let Some(g) = reroute_re.captures(line) {
            ScriptCmd::Reroute(num(&g[1])? as TrainId)
        } else if let Some(g) = block_re.captures(line) {
            ScriptCmd::Block { train: num(&g[1])? as TrainId, blocked: &g[2] == "1" }
        } else if let Some(g) = reserve_re.captures(line) {
            ScriptCmd::Reserve { train: num(&g[1])? as TrainId, segment: num(&g[2])? as SegmentId }
        } else {
            return Err(ScriptError::Unrecognized(lineno, line.to_string()));
        };
        commands.push((lineno, cmd));
    }

    Ok(Script { commands })
}
