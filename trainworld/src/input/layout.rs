use regex::Regex;
use std::collections::HashMap;

use crate::railway::reservation::SEGMENT_CAP;
use crate::railway::topology::*;

pub const TRACK_A: &str = include_str!("../../layouts/track_a.txt");
pub const TRACK_B: &str = include_str!("../../layouts/track_b.txt");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackSet {
    A,
    B,
}

impl TrackSet {
    pub fn layout(self) -> &'static str {
        match self {
            TrackSet::A => TRACK_A,
            TrackSet::B => TRACK_B,
        }
    }

    /// Initial direction of the 22 switches, in branch node order.
    pub fn switch_init(self) -> &'static str {
        match self {
            TrackSet::A => "SSCSCSSSSSCSSSSSSCSCSC",
            TrackSet::B => "SSSSCSSSSSCSSSSSSCSCCS",
        }
    }

    pub fn from_name(s: &str) -> Option<TrackSet> {
        match s {
            "a" | "A" => Some(TrackSet::A),
            "b" | "B" => Some(TrackSet::B),
            _ => None,
        }
    }
}

pub fn load_track(set: TrackSet) -> Result<Track, LayoutError> {
    parse_layout(set.layout())
}

#[derive(Debug, Fail)]
pub enum LayoutError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "unrecognized layout line {}: {}", _0, _1)]
    Unrecognized(usize, String),
    #[fail(display = "error converting number on line {}", _0)]
    NumberError(usize),
    #[fail(display = "unknown node name: {}", _0)]
    UnknownName(String),
    #[fail(display = "node {} declared twice", _0)]
    DuplicateName(String),
    #[fail(display = "node {} needs a sensor or switch number", _0)]
    MissingNumber(String),
    #[fail(display = "reverse of {} does not point back to it", _0)]
    AsymmetricReverse(String),
    #[fail(display = "sensor {} must be stored at index {}", _0, _1)]
    MisplacedSensor(String, usize),
    #[fail(display = "switch node {} must be stored at index {}", _0, _1)]
    MisplacedSwitch(String, usize),
    #[fail(display = "node {} cannot have a {} edge", _0, _1)]
    BadSlot(String, String),
    #[fail(display = "node {} has two {} edges", _0, _1)]
    DuplicateEdge(String, String),
    #[fail(display = "node {} is missing an outgoing edge", _0)]
    MissingEdge(String),
    #[fail(display = "edge {} -> {} has no reverse edge", _0, _1)]
    MissingReverseEdge(String, String),
    #[fail(display = "node {} refers to segment {} beyond capacity", _0, _1)]
    SegmentOutOfRange(String, usize),
}

struct NodeDecl {
    line: usize,
    name: String,
    kind: String,
    num: Option<usize>,
    reverse: String,
    enter_seg: [Option<SegmentId>; 2],
    leave_seg: [Option<SegmentId>; 2],
}

/// Parses the track layout format
///
/// * node A1 sensor 0 rev A2 enters 0 - leaves 1 -
/// * node BR1 branch 1 rev MR1 enters 13 13 leaves 13 13
/// * edge A1 ahead BR1 230
///
/// Nodes are stored in declaration order.
pub fn parse_layout(input: &str) -> Result<Track, LayoutError> {
    let node_re = Regex::new(r"(?x) ^ \s* node \s+ (?P<name>\w+) \s+
            (?P<kind>plain|sensor|branch|merge|entry|exit) (?: \s+ (?P<num>\d+) )? \s+
            rev \s+ (?P<rev>\w+) \s+
            enters \s+ (?P<e0>\d+|-) \s+ (?P<e1>\d+|-) \s+
            leaves \s+ (?P<l0>\d+|-) \s+ (?P<l1>\d+|-) \s* $")
        .map_err(|e| LayoutError::RegexError(format!("{:?}", e)))?;
    let edge_re = Regex::new(r"(?x) ^ \s* edge \s+ (?P<src>\w+) \s+
            (?P<slot>ahead|straight|curved) \s+ (?P<dst>\w+) \s+ (?P<dist>\d+) \s* $")
        .map_err(|e| LayoutError::RegexError(format!("{:?}", e)))?;
    let skip_re = Regex::new(r"^\s*(#.*)?$")
        .map_err(|e| LayoutError::RegexError(format!("{:?}", e)))?;

    let seg = |s: &str, line: usize| -> Result<Option<SegmentId>, LayoutError> {
        if s == "-" {
            Ok(None)
        } else {
            s.parse::<SegmentId>().map(Some).map_err(|_e| LayoutError::NumberError(line))
        }
    };

    let mut decls = Vec::new();
    let mut edge_decls = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;
        if skip_re.is_match(line) {
            continue;
        }
        if let Some(groups) = node_re.captures(line) {
            let num = match groups.name("num") {
                Some(m) => Some(m.as_str().parse::<usize>().map_err(|_e| LayoutError::NumberError(line_no))?),
                None => None,
            };
            decls.push(NodeDecl {
                line: line_no,
                name: groups["name"].to_string(),
                kind: groups["kind"].to_string(),
                num,
                reverse: groups["rev"].to_string(),
                enter_seg: [seg(&groups["e0"], line_no)?, seg(&groups["e1"], line_no)?],
                leave_seg: [seg(&groups["l0"], line_no)?, seg(&groups["l1"], line_no)?],
            });
            continue;
        }
        if let Some(groups) = edge_re.captures(line) {
            let dist = groups["dist"].parse::<Dist>().map_err(|_e| LayoutError::NumberError(line_no))?;
            edge_decls.push((groups["src"].to_string(),
                             groups["slot"].to_string(),
                             groups["dst"].to_string(),
                             dist));
            continue;
        }
        return Err(LayoutError::Unrecognized(line_no, line.to_string()));
    }

    let mut names: HashMap<String, NodeId> = HashMap::new();
    for (idx, d) in decls.iter().enumerate() {
        if names.insert(d.name.clone(), idx).is_some() {
            return Err(LayoutError::DuplicateName(d.name.clone()));
        }
    }
    let lookup = |name: &str| -> Result<NodeId, LayoutError> {
        names.get(name).cloned().ok_or_else(|| LayoutError::UnknownName(name.to_string()))
    };

    let mut nodes = Vec::with_capacity(decls.len());
    for d in decls.iter() {
        let need_num = || d.num.ok_or_else(|| LayoutError::MissingNumber(d.name.clone()));
        let kind = match d.kind.as_str() {
            "sensor" => NodeKind::Sensor(need_num()?),
            "branch" => NodeKind::Branch(need_num()?, BranchDir::Straight),
            "merge" => NodeKind::Merge(need_num()?),
            "entry" => NodeKind::Entry,
            "exit" => NodeKind::Exit,
            _ => NodeKind::Plain,
        };
        for s in d.enter_seg.iter().chain(d.leave_seg.iter()).filter_map(|s| *s) {
            if s >= SEGMENT_CAP {
                return Err(LayoutError::SegmentOutOfRange(d.name.clone(), s));
            }
        }
        trace!("layout line {}: node {} {:?}", d.line, d.name, kind);
        nodes.push(TrackNode {
            name: d.name.clone(),
            kind,
            reverse: lookup(&d.reverse)?,
            edges: [None, None],
            enter_seg: d.enter_seg,
            leave_seg: d.leave_seg,
        });
    }

    for (idx, n) in nodes.iter().enumerate() {
        if nodes[n.reverse].reverse != idx {
            return Err(LayoutError::AsymmetricReverse(n.name.clone()));
        }
    }

    let mut edges: Vec<TrackEdge> = Vec::with_capacity(edge_decls.len());
    for (src_name, slot_name, dst_name, dist) in edge_decls {
        let src = lookup(&src_name)?;
        let dest = lookup(&dst_name)?;
        let slot = match (slot_name.as_str(), nodes[src].kind) {
            (_, NodeKind::Exit) => None,
            ("curved", NodeKind::Branch(..)) => Some(1),
            ("curved", _) => None,
            _ => Some(DIR_AHEAD),
        };
        let slot = match slot {
            Some(slot) => slot,
            None => return Err(LayoutError::BadSlot(src_name, slot_name)),
        };
        if nodes[src].edges[slot].is_some() {
            return Err(LayoutError::DuplicateEdge(src_name, slot_name));
        }
        nodes[src].edges[slot] = Some(edges.len());
        edges.push(TrackEdge { reverse: 0, src, dest, dist });
    }

    for n in nodes.iter() {
        let missing = match n.kind {
            NodeKind::Exit => false,
            NodeKind::Branch(..) => n.edges.iter().any(|e| e.is_none()),
            _ => n.edges[DIR_AHEAD].is_none(),
        };
        if missing {
            return Err(LayoutError::MissingEdge(n.name.clone()));
        }
    }

    // The reverse of u -> v is v.reverse -> u.reverse.
    for e in 0..edges.len() {
        let (src, dest) = (edges[e].src, edges[e].dest);
        let from = &nodes[nodes[dest].reverse];
        let to = nodes[src].reverse;
        let reverse = from.edges
            .iter()
            .filter_map(|x| *x)
            .find(|&r| edges[r].dest == to && edges[r].dist == edges[e].dist);
        match reverse {
            Some(r) => edges[e].reverse = r,
            None => {
                return Err(LayoutError::MissingReverseEdge(nodes[src].name.clone(),
                                                           nodes[dest].name.clone()))
            }
        }
    }

    let branch_base = nodes.iter()
        .position(|n| match n.kind {
            NodeKind::Branch(..) => true,
            _ => false,
        })
        .unwrap_or(nodes.len());

    for (idx, n) in nodes.iter().enumerate() {
        match n.kind {
            NodeKind::Sensor(num) if num != idx => {
                return Err(LayoutError::MisplacedSensor(n.name.clone(), num));
            }
            NodeKind::Branch(num, _) => {
                match branch_index(branch_base, num) {
                    Some(expected) if expected == idx => {}
                    Some(expected) => return Err(LayoutError::MisplacedSwitch(n.name.clone(), expected)),
                    None => return Err(LayoutError::MissingNumber(n.name.clone())),
                }
            }
            NodeKind::Merge(num) => {
                match branch_index(branch_base, num) {
                    Some(expected) if expected + 1 == idx => {}
                    Some(expected) => return Err(LayoutError::MisplacedSwitch(n.name.clone(), expected + 1)),
                    None => return Err(LayoutError::MissingNumber(n.name.clone())),
                }
            }
            _ => {}
        }
    }

    Ok(Track::from_parts(nodes, edges, branch_base))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A sensor between an entry and switch 1, whose legs each pass one
    /// more sensor before ending. A5 also borders segment 0 on its second
    /// leave slot.
    pub const SIDING: &str = "
# siding
node A1 sensor 0 rev A2 enters 1 - leaves 0 -
node A2 sensor 1 rev A1 enters 0 - leaves 1 -
node A3 sensor 2 rev A4 enters 2 - leaves 1 -
node A4 sensor 3 rev A3 enters 1 - leaves 2 -
node A5 sensor 4 rev A6 enters 3 - leaves 1 0
node A6 sensor 5 rev A5 enters 1 - leaves 3 -
node BR1 branch 1 rev MR1 enters 1 1 leaves 1 1
node MR1 merge 1 rev BR1 enters 1 - leaves 1 -
node EN1 entry rev EX1 enters 0 - leaves 0 -
node EX1 exit rev EN1 enters - - leaves 0 -
node EN2 entry rev EX2 enters 2 - leaves 2 -
node EX2 exit rev EN2 enters - - leaves 2 -
node EN3 entry rev EX3 enters 3 - leaves 3 -
node EX3 exit rev EN3 enters - - leaves 3 -

edge EN1 ahead A1 100
edge A2 ahead EX1 100
edge A1 ahead BR1 200
edge MR1 ahead A2 200
edge BR1 straight A3 300
edge A4 ahead MR1 300
edge A3 ahead EX2 50
edge EN2 ahead A4 50
edge BR1 curved A5 250
edge A6 ahead MR1 250
edge A5 ahead EX3 60
edge EN3 ahead A6 60
";

    #[test]
    fn parse_siding() {
        let track = parse_layout(SIDING).unwrap();
        assert_eq!(track.len(), 14);
        assert_eq!(track.edges().len(), 12);
        assert_eq!(track.branch_base(), 6);
        assert_eq!(track.segment_count(), 4);
        let br1 = track.node_by_name("BR1").unwrap();
        assert_eq!(track.node(br1).kind, NodeKind::Branch(1, BranchDir::Straight));
    }

    #[test]
    fn reverse_links_are_involutions() {
        for set in &[TrackSet::A, TrackSet::B] {
            let track = load_track(*set).unwrap();
            for (i, n) in track.nodes().iter().enumerate() {
                assert_eq!(track.node(n.reverse).reverse, i);
            }
            for (i, e) in track.edges().iter().enumerate() {
                assert_eq!(track.edge(e.reverse).reverse, i);
                assert_eq!(track.edge(e.reverse).dist, e.dist);
            }
        }
    }

    #[test]
    fn fixed_layouts() {
        let a = load_track(TrackSet::A).unwrap();
        let b = load_track(TrackSet::B).unwrap();
        assert_eq!(a.len(), 144);
        assert_eq!(b.len(), 140);
        for track in &[a, b] {
            assert_eq!(track.branch_base(), 80);
            assert_eq!(track.branch_nodes().count(), 22);
            assert_eq!(track.name(track.branch(153).unwrap()), "BR153");
            assert_eq!(track.name(track.branch(18).unwrap()), "BR18");
            assert!(track.has_sensor(79));
            assert!(!track.has_sensor(80));
        }
    }

    #[test]
    fn rejects_broken_layouts() {
        let asym = "node A1 sensor 0 rev A2 enters - - leaves - -\n\
                    node A2 sensor 1 rev A2 enters - - leaves - -\n";
        match parse_layout(asym) {
            Err(LayoutError::AsymmetricReverse(ref n)) => assert_eq!(n, "A1"),
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }

        let curved = SIDING.replace("edge A1 ahead BR1 200", "edge A1 curved BR1 200");
        match parse_layout(&curved) {
            Err(LayoutError::BadSlot(..)) => {}
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }

        let no_reverse = SIDING.replace("edge MR1 ahead A2 200", "edge MR1 ahead A2 210");
        match parse_layout(&no_reverse) {
            Err(LayoutError::MissingReverseEdge(ref a, ref b)) => assert_eq!((a.as_str(), b.as_str()), ("A1", "BR1")),
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }

        let swapped = SIDING.replace("node A1 sensor 0", "node A1 sensor 2");
        match parse_layout(&swapped) {
            Err(LayoutError::MisplacedSensor(..)) => {}
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }

        match parse_layout("switch 1 S") {
            Err(LayoutError::Unrecognized(1, _)) => {}
            other => panic!("unexpected {:?}", other.map(|t| t.len())),
        }
    }
}
