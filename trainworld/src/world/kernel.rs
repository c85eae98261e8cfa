use super::message::{Msg, Outbound};
use crate::railway::reservation::ReservationSnapshot;
use crate::{Tick, Tid};

/// Kernel primitives the coordinator is written against.
///
/// `send` blocks until the receiver replies, `async_send` returns at once.
pub trait Kernel {
    fn my_tid(&self) -> Tid;
    fn register_as(&mut self, name: &str);
    /// One name-server lookup. `None` while the name is not registered.
    fn who_is(&mut self, name: &str) -> Option<Tid>;
    /// Blocks for the next request. `None` when no sender will ever send again.
    fn receive(&mut self) -> Option<(Tid, Msg)>;
    fn reply(&mut self, to: Tid, code: i32);
    fn send(&mut self, to: Tid, msg: Outbound) -> i32;
    fn async_send(&mut self, to: Tid, msg: Outbound);
    /// Delivers `msg` to `to` as if sent by the caller, `ticks` from now.
    fn delay_send(&mut self, to: Tid, msg: Msg, ticks: u32);
    fn time(&self) -> Tick;

    /// First half of a reservation round trip.
    fn fetch_reservations(&mut self, server: Tid) -> ReservationSnapshot;
    /// Second half. Must follow every fetch.
    fn update_reservations(&mut self, server: Tid, snapshot: ReservationSnapshot);
}
