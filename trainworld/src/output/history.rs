use smallvec::SmallVec;

use crate::railway::topology::SegmentId;
use crate::railway::train::TrainId;
use crate::world::message::{DisplayMsg, MarklinCmd, Msg, Outbound, RoutingMsg};
use crate::{Tick, Tid};
use failure;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delivery {
    Await,
    NoWait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerLogEvent {
    Reply { to: Tid, code: i32 },
    Send { to: Tid, msg: Outbound, delivery: Delivery },
    Delayed { to: Tid, msg: Msg, ticks: u32 },
    /// Segments whose owner changed in a pushed-back snapshot.
    ReservationUpdate(SmallVec<[(SegmentId, Option<TrainId>); 4]>),
    ManualReservation { train: TrainId, segment: SegmentId, granted: bool },
}

#[derive(Debug, Default)]
pub struct History {
    pub events: Vec<(Tick, PeerLogEvent)>,
}

impl History {
    pub fn push(&mut self, t: Tick, ev: PeerLogEvent) {
        self.events.push((t, ev));
    }

    pub fn sent<'a>(&'a self) -> impl Iterator<Item = (&'a Outbound, Delivery)> + 'a {
        self.events.iter().filter_map(|&(_, ref ev)| match *ev {
            PeerLogEvent::Send { ref msg, delivery, .. } => Some((msg, delivery)),
            _ => None,
        })
    }

    pub fn marklin(&self) -> Vec<MarklinCmd> {
        self.sent().filter_map(|(m, _)| match *m {
            Outbound::Marklin(c) => Some(c),
            _ => None,
        }).collect()
    }

    pub fn routing(&self) -> Vec<RoutingMsg> {
        self.sent().filter_map(|(m, _)| match *m {
            Outbound::Routing(ref r) => Some(r.clone()),
            _ => None,
        }).collect()
    }

    pub fn display(&self) -> Vec<DisplayMsg> {
        self.sent().filter_map(|(m, _)| match *m {
            Outbound::Display(ref d) => Some(d.clone()),
            _ => None,
        }).collect()
    }

    pub fn replies(&self) -> Vec<i32> {
        self.events.iter().filter_map(|&(_, ref ev)| match *ev {
            PeerLogEvent::Reply { code, .. } => Some(code),
            _ => None,
        }).collect()
    }

    pub fn delayed(&self) -> Vec<(Tick, Msg, u32)> {
        self.events.iter().filter_map(|&(t, ref ev)| match *ev {
            PeerLogEvent::Delayed { ref msg, ticks, .. } => Some((t, msg.clone(), ticks)),
            _ => None,
        }).collect()
    }

    pub fn reservation_updates(&self) -> Vec<(SegmentId, Option<TrainId>)> {
        self.events.iter().filter_map(|&(_, ref ev)| match *ev {
            PeerLogEvent::ReservationUpdate(ref c) => Some(c.iter().cloned()),
            _ => None,
        }).flat_map(|c| c).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events recorded since `mark`, a previous value of `len()`.
    pub fn since(&self, mark: usize) -> History {
        History { events: self.events[mark..].to_vec() }
    }
}

/// Print one peer event per line on the following format:
/// `tick kind details`.
pub fn transcript(h: &History) -> Result<String, failure::Error> {
    use std::fmt::Write;
    let mut s = String::new();
    for &(t, ref ev) in &h.events {
        use self::PeerLogEvent::*;
        match *ev {
            Reply { to, code } => write!(s, "{} reply {} {}\n", t, to, code)?,
            Send { to, ref msg, delivery } => {
                let kind = match delivery {
                    Delivery::Await => "send",
                    Delivery::NoWait => "post",
                };
                match *msg {
                    Outbound::Marklin(ref c) => {
                        let bytes: Vec<String> = c.payload().iter().map(|b| b.to_string()).collect();
                        write!(s, "{} {} {} marklin {:?} [{}]\n", t, kind, to, c, bytes.join(" "))?
                    }
                    Outbound::Routing(ref r) => write!(s, "{} {} {} routing {:?}\n", t, kind, to, r)?,
                    Outbound::Display(ref d) => write!(s, "{} {} {} display {:?}\n", t, kind, to, d)?,
                }
            }
            Delayed { to, ref msg, ticks } => write!(s, "{} delay {} +{} {:?}\n", t, to, ticks, msg)?,
            ReservationUpdate(ref changes) => {
                let c: Vec<String> = changes.iter().map(|&(seg, owner)| match owner {
                    Some(o) => format!("{}={}", seg, o),
                    None => format!("{}=free", seg),
                }).collect();
                write!(s, "{} reservations {}\n", t, c.join(" "))?
            }
            ManualReservation { train, segment, granted } => {
                write!(s, "{} manual-reserve {} {} {}\n", t, train, segment,
                       if granted { "granted" } else { "refused" })?
            }
        }
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn transcript_lines() {
        let mut h = History::default();
        h.push(0, PeerLogEvent::Reply { to: 6, code: -1 });
        h.push(3, PeerLogEvent::Send {
            to: 2,
            msg: Outbound::Marklin(MarklinCmd::Train { cmd: 10, train: 24 }),
            delivery: Delivery::Await,
        });
        h.push(3, PeerLogEvent::ReservationUpdate(smallvec![(4, Some(24)), (5, None)]));
        let t = transcript(&h).unwrap();
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines, vec![
            "0 reply 6 -1",
            "3 send 2 marklin Train { cmd: 10, train: 24 } [10 24]",
            "3 reservations 4=24 5=free",
        ]);
        assert_eq!(h.marklin(), vec![MarklinCmd::Train { cmd: 10, train: 24 }]);
        assert_eq!(h.reservation_updates(), vec![(4, Some(24)), (5, None)]);
        assert_eq!(h.since(2).len(), 1);
    }
}
