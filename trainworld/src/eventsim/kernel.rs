use smallvec::SmallVec;

use super::simulation::Scheduler;
use crate::output::history::{Delivery, History, PeerLogEvent};
use crate::railway::reservation::ReservationSnapshot;
use crate::railway::topology::SegmentId;
use crate::railway::train::TrainId;
use crate::world::kernel::Kernel;
use crate::world::message::{Msg, Outbound};
use crate::world::{DISPLAY_SERVER, MARKLIN_SERVER, RESERVATION_SERVER, ROUTING_SERVER, WORLD};
use crate::{Tick, Tid};

pub const WORLD_TID: Tid = 1;
pub const MARKLIN_TID: Tid = 2;
pub const DISPLAY_TID: Tid = 3;
pub const ROUTING_TID: Tid = 4;
pub const RESERVATION_TID: Tid = 5;
pub const TERMINAL_TID: Tid = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A request arriving at the world.
    Deliver { sender: Tid, msg: Msg },
    /// A reservation made directly at the reservation peer.
    Reserve { train: TrainId, segment: SegmentId },
}

/// Single-process stand-in for the kernel and the world's peers.
///
/// Peers acknowledge sends with 0 unless told otherwise with `set_ack`. The
/// routing peer only shows up in the name server after `routing_delay`
/// lookups.
#[derive(Debug)]
pub struct SimKernel {
    scheduler: Scheduler<Event>,
    registered: Vec<(String, Tid)>,
    routing_delay: usize,
    routing_lookups: usize,
    reservations: ReservationSnapshot,
    round_trip_open: bool,
    acks: Vec<(Tid, i32)>,
    history: History,
}

impl SimKernel {
    pub fn new(routing_delay: usize) -> SimKernel {
        SimKernel {
            scheduler: Scheduler::default(),
            registered: Vec::new(),
            routing_delay,
            routing_lookups: 0,
            reservations: ReservationSnapshot::new(),
            round_trip_open: false,
            acks: Vec::new(),
            history: History::default(),
        }
    }

    /// Queues a request from `sender`, `dt` ticks from now.
    pub fn inject(&mut self, sender: Tid, msg: Msg, dt: u32) {
        self.scheduler.schedule(Event::Deliver { sender, msg }, dt);
    }

    pub fn inject_at(&mut self, sender: Tid, msg: Msg, time: Tick) {
        self.scheduler.schedule_at(Event::Deliver { sender, msg }, time);
    }

    pub fn inject_reservation(&mut self, train: TrainId, segment: SegmentId, time: Tick) {
        self.scheduler.schedule_at(Event::Reserve { train, segment }, time);
    }

    pub fn reservations(&self) -> &ReservationSnapshot {
        &self.reservations
    }

    pub fn reservations_mut(&mut self) -> &mut ReservationSnapshot {
        &mut self.reservations
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn routing_lookups(&self) -> usize {
        self.routing_lookups
    }

    /// Reply code the peer `to` answers awaited sends with from now on.
    pub fn set_ack(&mut self, to: Tid, code: i32) {
        self.acks.retain(|&(t, _)| t != to);
        if code != 0 {
            self.acks.push((to, code));
        }
    }

    fn log(&mut self, ev: PeerLogEvent) {
        let t = self.scheduler.time;
        self.history.push(t, ev);
    }
}

impl Kernel for SimKernel {
    fn my_tid(&self) -> Tid {
        WORLD_TID
    }

    fn register_as(&mut self, name: &str) {
        self.registered.push((name.to_string(), WORLD_TID));
    }

    fn who_is(&mut self, name: &str) -> Option<Tid> {
        match name {
            MARKLIN_SERVER => Some(MARKLIN_TID),
            DISPLAY_SERVER => Some(DISPLAY_TID),
            RESERVATION_SERVER => Some(RESERVATION_TID),
            ROUTING_SERVER => {
                self.routing_lookups += 1;
                if self.routing_lookups > self.routing_delay {
                    Some(ROUTING_TID)
                } else {
                    None
                }
            }
            WORLD => self.registered.iter().find(|&&(ref n, _)| n == name).map(|&(_, t)| t),
            _ => None,
        }
    }

    fn receive(&mut self) -> Option<(Tid, Msg)> {
        while let Some(ev) = self.scheduler.pop() {
            match ev {
                Event::Deliver { sender, msg } => return Some((sender, msg)),
                Event::Reserve { train, segment } => {
                    let granted = self.reservations.reserve(train, segment).is_ok();
                    debug!("manual reservation of {} for train {}: {}", segment, train, granted);
                    self.log(PeerLogEvent::ManualReservation { train, segment, granted });
                }
            }
        }
        None
    }

    fn reply(&mut self, to: Tid, code: i32) {
        self.log(PeerLogEvent::Reply { to, code });
    }

    fn send(&mut self, to: Tid, msg: Outbound) -> i32 {
        self.log(PeerLogEvent::Send { to, msg, delivery: Delivery::Await });
        self.acks.iter().find(|&&(t, _)| t == to).map(|&(_, code)| code).unwrap_or(0)
    }

    fn async_send(&mut self, to: Tid, msg: Outbound) {
        self.log(PeerLogEvent::Send { to, msg, delivery: Delivery::NoWait });
    }

    fn delay_send(&mut self, to: Tid, msg: Msg, ticks: u32) {
        self.log(PeerLogEvent::Delayed { to, msg: msg.clone(), ticks });
        self.scheduler.schedule(Event::Deliver { sender: WORLD_TID, msg }, ticks);
    }

    fn time(&self) -> Tick {
        self.scheduler.time
    }

    fn fetch_reservations(&mut self, server: Tid) -> ReservationSnapshot {
        if server != RESERVATION_TID {
            warn!("reservation fetch from task {}", server);
        }
        if self.round_trip_open {
            warn!("reservation round trip started twice");
        }
        self.round_trip_open = true;
        self.reservations.clone()
    }

    fn update_reservations(&mut self, server: Tid, snapshot: ReservationSnapshot) {
        if server != RESERVATION_TID || !self.round_trip_open {
            warn!("unexpected reservation update to task {}", server);
        }
        self.round_trip_open = false;
        let changes: SmallVec<[(SegmentId, Option<TrainId>); 4]> = (0..crate::railway::reservation::SEGMENT_CAP)
            .filter(|&s| self.reservations.owner(s) != snapshot.owner(s))
            .map(|s| (s, snapshot.owner(s)))
            .collect();
        self.reservations = snapshot;
        self.log(PeerLogEvent::ReservationUpdate(changes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::message::MarklinCmd;

    #[test]
    fn routing_registers_late() {
        let mut k = SimKernel::new(2);
        assert_eq!(k.who_is(ROUTING_SERVER), None);
        assert_eq!(k.who_is(ROUTING_SERVER), None);
        assert_eq!(k.who_is(ROUTING_SERVER), Some(ROUTING_TID));
        assert_eq!(k.routing_lookups(), 3);
        assert_eq!(k.who_is(WORLD), None);
        k.register_as(WORLD);
        assert_eq!(k.who_is(WORLD), Some(WORLD_TID));
    }

    #[test]
    fn delayed_delivery_and_manual_reservations() {
        let mut k = SimKernel::new(0);
        k.inject(TERMINAL_TID, Msg::ReverseCmd { train: 24 }, 10);
        k.inject_reservation(58, 3, 5);
        k.delay_send(WORLD_TID, Msg::TrainStopped { train: 24 }, 400);

        assert_eq!(k.receive(), Some((TERMINAL_TID, Msg::ReverseCmd { train: 24 })));
        assert_eq!(k.time(), 10);
        assert_eq!(k.reservations().owner(3), Some(58));
        assert_eq!(k.receive(), Some((WORLD_TID, Msg::TrainStopped { train: 24 })));
        assert_eq!(k.time(), 400);
        assert_eq!(k.receive(), None);
    }

    #[test]
    fn round_trip_records_changes() {
        let mut k = SimKernel::new(0);
        k.reservations_mut().reserve(1, 7).unwrap();
        let mut s = k.fetch_reservations(RESERVATION_TID);
        s.reserve(24, 2).unwrap();
        s.free(1, 7).unwrap();
        k.update_reservations(RESERVATION_TID, s);
        assert_eq!(k.history().reservation_updates(), vec![(2, Some(24)), (7, None)]);
        assert_eq!(k.reservations().owner(2), Some(24));
    }

    #[test]
    fn peers_ack_with_configured_code() {
        let mut k = SimKernel::new(0);
        assert_eq!(k.send(MARKLIN_TID, Outbound::Marklin(MarklinCmd::Go)), 0);
        k.set_ack(MARKLIN_TID, -1);
        assert_eq!(k.send(MARKLIN_TID, Outbound::Marklin(MarklinCmd::Go)), -1);
        assert_eq!(k.send(ROUTING_TID, Outbound::Marklin(MarklinCmd::Go)), 0);
        k.set_ack(MARKLIN_TID, 0);
        assert_eq!(k.send(MARKLIN_TID, Outbound::Marklin(MarklinCmd::Go)), 0);
    }
}
