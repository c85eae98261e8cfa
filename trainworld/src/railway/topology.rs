//! Static track graph.
//!
//! Nodes and edges live in two arenas and refer to each other by index.
//! Every physical location appears twice, once per travel direction, and
//! `reverse` links the two halves. Only branch status changes after loading.

pub type NodeId = usize;
pub type EdgeId = usize;
pub type SegmentId = usize;
pub type SensorNum = usize;
pub type SwitchNum = usize;

/// Edge length in millimetres.
pub type Dist = u32;

pub const DIR_AHEAD: usize = 0;

/// First switch number of the high numbering range (the centre crossovers).
pub const HIGH_SWITCH_BASE: SwitchNum = 153;
/// Number of switches in the low range (1..=18).
pub const LOW_SWITCH_COUNT: SwitchNum = 18;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchDir {
    Straight,
    Curved,
}

impl BranchDir {
    pub fn slot(self) -> usize {
        match self {
            BranchDir::Straight => 0,
            BranchDir::Curved => 1,
        }
    }

    pub fn from_char(c: char) -> Option<BranchDir> {
        match c {
            'S' | 's' => Some(BranchDir::Straight),
            'C' | 'c' => Some(BranchDir::Curved),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Plain,
    Sensor(SensorNum),
    Branch(SwitchNum, BranchDir),
    Merge(SwitchNum),
    Entry,
    Exit,
}

#[derive(Debug, Clone)]
pub struct TrackEdge {
    pub reverse: EdgeId,
    pub src: NodeId,
    pub dest: NodeId,
    pub dist: Dist,
}

#[derive(Debug, Clone)]
pub struct TrackNode {
    pub name: String,
    pub kind: NodeKind,
    pub reverse: NodeId,
    /// Outgoing edges indexed by `DIR_AHEAD`/straight and curved.
    pub edges: [Option<EdgeId>; 2],
    /// Segment entered when leaving along each outgoing edge.
    pub enter_seg: [Option<SegmentId>; 2],
    /// Segment left when passing this node. The second slot is only set on
    /// sensors bordering a block boundary at a branch.
    pub leave_seg: [Option<SegmentId>; 2],
}

impl TrackNode {
    pub fn sensor_num(&self) -> Option<SensorNum> {
        match self.kind {
            NodeKind::Sensor(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_sensor(&self) -> bool {
        self.sensor_num().is_some()
    }

    pub fn is_exit(&self) -> bool {
        self.kind == NodeKind::Exit
    }

    /// Edge slot a train takes when it leaves this node.
    pub fn out_slot(&self) -> usize {
        match self.kind {
            NodeKind::Branch(_, dir) => dir.slot(),
            _ => DIR_AHEAD,
        }
    }
}

/// Node index of the branch node of a switch, given the index of the first
/// branch node. Merge nodes follow their branch node directly.
pub fn branch_index(base: NodeId, switch: SwitchNum) -> Option<NodeId> {
    if switch >= HIGH_SWITCH_BASE {
        Some(base + 2 * (switch - HIGH_SWITCH_BASE + LOW_SWITCH_COUNT))
    } else if switch >= 1 {
        Some(base + 2 * (switch - 1))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    nodes: Vec<TrackNode>,
    edges: Vec<TrackEdge>,
    branch_base: NodeId,
}

impl Track {
    pub(crate) fn from_parts(nodes: Vec<TrackNode>, edges: Vec<TrackEdge>, branch_base: NodeId) -> Track {
        Track { nodes, edges, branch_base }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &TrackNode {
        &self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &TrackEdge {
        &self.edges[id]
    }

    pub fn nodes(&self) -> &[TrackNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TrackEdge] {
        &self.edges
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    /// Sensor nodes are stored at the index of their sensor number.
    pub fn sensor(&self, num: SensorNum) -> NodeId {
        num
    }

    pub fn has_sensor(&self, num: SensorNum) -> bool {
        num < self.nodes.len() && self.nodes[num].sensor_num() == Some(num)
    }

    /// Branch node of a switch, following the hardware numbering ranges.
    pub fn branch(&self, switch: SwitchNum) -> Option<NodeId> {
        let idx = branch_index(self.branch_base, switch)?;
        match self.nodes.get(idx).map(|n| n.kind) {
            Some(NodeKind::Branch(num, _)) if num == switch => Some(idx),
            _ => None,
        }
    }

    pub fn branch_base(&self) -> NodeId {
        self.branch_base
    }

    /// Branch nodes in node order.
    pub fn branch_nodes<'a>(&'a self) -> impl Iterator<Item = NodeId> + 'a {
        (self.branch_base..self.nodes.len())
            .step_by(2)
            .take_while(move |&i| match self.nodes[i].kind {
                NodeKind::Branch(..) => true,
                _ => false,
            })
    }

    pub fn set_branch(&mut self, node: NodeId, dir: BranchDir) {
        let n = &mut self.nodes[node];
        match n.kind {
            NodeKind::Branch(num, ref mut status) => {
                *status = dir;
                debug!("switch {} ({}) set to {:?}", num, n.name, dir);
            }
            ref k => panic!("Not a branch: {:?}", k),
        }
    }

    pub fn branch_status(&self, node: NodeId) -> Option<BranchDir> {
        match self.nodes[node].kind {
            NodeKind::Branch(_, dir) => Some(dir),
            _ => None,
        }
    }

    /// The edge a train currently leaves `node` along.
    pub fn next_edge(&self, node: NodeId) -> Option<&TrackEdge> {
        let n = &self.nodes[node];
        n.edges[n.out_slot()].map(|e| &self.edges[e])
    }

    pub fn ahead_edge(&self, node: NodeId) -> Option<&TrackEdge> {
        self.nodes[node].edges[DIR_AHEAD].map(|e| &self.edges[e])
    }

    pub fn segment_count(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.enter_seg.iter().chain(n.leave_seg.iter()))
            .filter_map(|s| *s)
            .max()
            .map(|s| s + 1)
            .unwrap_or(0)
    }

    /// Expresses `(node, offset)` in the frame of the opposite travel direction.
    pub fn reverse_location(&self, node: NodeId, offset: i32) -> (NodeId, i32) {
        if offset <= 0 {
            return (self.nodes[node].reverse, -offset);
        }
        let mut cur = node;
        let mut remaining = offset;
        loop {
            match self.next_edge(cur) {
                Some(e) => {
                    let d = e.dist as i32;
                    if remaining <= d {
                        return (self.nodes[e.dest].reverse, d - remaining);
                    }
                    remaining -= d;
                    cur = e.dest;
                }
                None => return (self.nodes[cur].reverse, -remaining),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::layout::{parse_layout, tests::SIDING};

    #[test]
    fn branch_numbering_ranges() {
        assert_eq!(branch_index(80, 1), Some(80));
        assert_eq!(branch_index(80, 18), Some(114));
        assert_eq!(branch_index(80, 153), Some(116));
        assert_eq!(branch_index(80, 156), Some(122));
        assert_eq!(branch_index(80, 0), None);
    }

    #[test]
    fn reverse_location_frames() {
        let track = parse_layout(SIDING).unwrap();
        let a1 = track.node_by_name("A1").unwrap();
        let a2 = track.node_by_name("A2").unwrap();
        let a3 = track.node_by_name("A3").unwrap();
        let a4 = track.node_by_name("A4").unwrap();
        let mr1 = track.node_by_name("MR1").unwrap();
        let en2 = track.node_by_name("EN2").unwrap();

        assert_eq!(track.reverse_location(a1, 0), (a2, 0));
        assert_eq!(track.reverse_location(a1, -30), (a2, 30));
        assert_eq!(track.reverse_location(a1, 200), (mr1, 0));
        assert_eq!(track.reverse_location(a1, 250), (a4, 250));
        // running past the end of the siding
        assert_eq!(track.reverse_location(a3, 80), (en2, -30));
    }

    #[test]
    fn switch_lookup_checks_kind() {
        let mut track = parse_layout(SIDING).unwrap();
        let br1 = track.branch(1).unwrap();
        assert_eq!(track.name(br1), "BR1");
        assert_eq!(track.branch(2), None);
        assert_eq!(track.branch_nodes().collect::<Vec<_>>(), vec![br1]);

        track.set_branch(br1, BranchDir::Curved);
        assert_eq!(track.branch_status(br1), Some(BranchDir::Curved));
        assert_eq!(track.next_edge(br1).map(|e| track.name(e.dest)), Some("A5"));
    }
}
