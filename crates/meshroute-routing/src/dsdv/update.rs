//! Table advertisements: receiving updates, triggered and periodic sends

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, trace};

use meshroute_core::{Clock, DropReason, InterfaceInfo, NodeAddr, Transport, TransportError};

use super::DsdvEngine;
use crate::error::{RoutingError, RoutingResult};
use crate::messages::{ControlMessage, DsdvEntry, DsdvUpdate};
use crate::seqno::{is_poisoned, seq_newer};
use crate::table::{RouteFlag, RoutingTableEntry};
use crate::timer::Timer;

/// Step of the random spread added to every periodic interval
const PERIODIC_JITTER_STEP: Duration = Duration::from_micros(25);

/// Settling time blended from the previous value and the route's age
///
/// `factor` weighs the previous settling time; the rest goes to the time
/// since the route was last refreshed.
pub fn weighted_settling_time(previous: Duration, age: Duration, factor: f64) -> Duration {
    previous.mul_f64(factor) + age.mul_f64(1.0 - factor)
}

impl<C, X> DsdvEngine<C, X>
where
    C: Clock<Timer>,
    X: Transport,
{
    /// Handle a control frame received from neighbor `src`
    #[instrument(skip_all, fields(node = %self.local_address(), src = %src))]
    pub fn receive(&mut self, interface: u32, src: NodeAddr, payload: &[u8]) -> RoutingResult<()> {
        if !self.started {
            return Err(RoutingError::NotStarted);
        }
        let iface = self.interface(interface)?;
        if self.is_my_own_address(src) {
            trace!("Own update, ignoring");
            return Ok(());
        }
        let update = match ControlMessage::decode(payload) {
            Ok(ControlMessage::Update(update)) => update,
            Ok(other) => {
                debug!(kind = other.kind(), "Reactive-protocol message ignored by periodic engine");
                return Ok(());
            }
            Err(err) => {
                debug!(error = %err, "Malformed control message, dropping");
                return Ok(());
            }
        };
        trace!(entries = update.entries.len(), "Update received");

        for entry in update.entries {
            self.process_advertised(entry, iface, src);
        }

        let delay = if self.config.enable_route_aggregation && !self.advertised.is_empty() {
            self.config.route_aggregation_time
        } else {
            self.trigger_jitter()
        };
        self.schedule_triggered_update(delay);

        if self.config.enable_buffering {
            self.look_for_queued_packets();
        }
        Ok(())
    }

    fn process_advertised(&mut self, advertised: DsdvEntry, iface: InterfaceInfo, sender: NodeAddr) {
        let dst = advertised.destination;
        if self.is_my_own_address(dst) {
            trace!(seq_no = advertised.seq_no, "Update for own address, discarding");
            return;
        }
        let now = self.clock.now();
        let holddown = self.config.holddown_time();

        let Some(current) = self.table.lookup_route(dst).cloned() else {
            if is_poisoned(advertised.seq_no) {
                trace!(destination = %dst, "Unknown route advertised as broken, discarding");
                return;
            }
            debug!(destination = %dst, hops = advertised.hop_count, via = %sender, "New route");
            let mut entry = RoutingTableEntry::new(dst, sender, iface)
                .with_seq_no(advertised.seq_no, true)
                .with_hop_count(advertised.hop_count)
                .with_lifetime(holddown, now);
            entry.settling_time = self.config.settling_time;
            entry.changed = true;
            self.table.add_route(entry.clone());
            self.advertised.add_route(entry);
            self.notify_route_available(dst);
            return;
        };

        let mut staged = match self.advertised.lookup_route(dst) {
            Some(staged) => staged.clone(),
            None => {
                self.advertised.add_route(current.clone());
                current
            }
        };
        let settling = Timer::SettlingExpired(dst);

        if is_poisoned(advertised.seq_no) {
            if sender != staged.next_hop {
                if !self.timers.is_pending(settling) {
                    self.advertised.delete_route(dst);
                }
                trace!(destination = %dst, "Broken route reported by another neighbor, ignoring");
                return;
            }
            debug!(destination = %dst, seq_no = advertised.seq_no, "Route withdrawn by next hop");
            let dependents: Vec<RoutingTableEntry> = self
                .table
                .entries_with_next_hop(dst)
                .into_iter()
                .filter(|e| e.hop_count > 0)
                .cloned()
                .collect();
            self.table.delete_route(dst);
            staged.seq_no = advertised.seq_no;
            staged.changed = true;
            self.advertised.update(staged);
            self.notify_unreachable(dst);
            for mut dependent in dependents {
                let destination = dependent.destination;
                dependent.seq_no = dependent.seq_no.wrapping_add(1);
                dependent.changed = true;
                self.advertised.add_route(dependent);
                self.table.delete_route(destination);
                self.notify_unreachable(destination);
            }
            return;
        }

        if seq_newer(advertised.seq_no, staged.seq_no) {
            if self.timers.cancel(&self.clock, settling) {
                trace!(destination = %dst, "Newer sequence number, settling restarted");
            }
            let metric_changed = advertised.hop_count != staged.hop_count;
            self.refresh_staged(&mut staged, advertised, sender, iface);
            if metric_changed {
                let delay = self.settling_time_for(dst);
                staged.settling_time = delay;
                self.timers.schedule(&self.clock, delay, settling);
                trace!(destination = %dst, delay = ?delay, "Metric changed, waiting to settle");
                self.table.update(staged.clone());
            }
            self.advertised.update(staged);
        } else if advertised.seq_no == staged.seq_no {
            if advertised.hop_count < staged.hop_count {
                self.timers.cancel(&self.clock, settling);
                self.refresh_staged(&mut staged, advertised, sender, iface);
                let delay = self.settling_time_for(dst);
                staged.settling_time = delay;
                self.timers.schedule(&self.clock, delay, settling);
                debug!(destination = %dst, hops = advertised.hop_count, "Shorter route, waiting to settle");
                self.table.update(staged.clone());
                self.advertised.update(staged);
            } else if !self.timers.is_pending(settling) {
                if staged.next_hop == sender {
                    staged.set_lifetime(holddown, now);
                    staged.updated_at = now;
                    self.table.update(staged);
                }
                self.advertised.delete_route(dst);
            }
        } else if !self.timers.is_pending(settling) {
            trace!(destination = %dst, "Stale sequence number, discarding");
            self.advertised.delete_route(dst);
        }
    }

    /// Take over the advertised path and restart the entry's lifetime
    fn refresh_staged(
        &self,
        staged: &mut RoutingTableEntry,
        advertised: DsdvEntry,
        sender: NodeAddr,
        iface: InterfaceInfo,
    ) {
        let now = self.clock.now();
        staged.seq_no = advertised.seq_no;
        staged.valid_seq_no = true;
        staged.hop_count = advertised.hop_count;
        staged.next_hop = sender;
        staged.interface = iface;
        staged.flag = RouteFlag::Valid;
        staged.changed = true;
        staged.set_lifetime(self.config.holddown_time(), now);
        staged.updated_at = now;
    }

    /// Delay before a metric change to `dst` is advertised
    fn settling_time_for(&self, dst: NodeAddr) -> Duration {
        let Some(entry) = self.table.lookup_route(dst) else {
            return Duration::ZERO;
        };
        if !self.config.enable_wst {
            return entry.settling_time;
        }
        if entry.settling_time.is_zero() {
            return Duration::ZERO;
        }
        weighted_settling_time(
            entry.settling_time,
            entry.age(self.clock.now()),
            self.config.weighted_factor,
        )
    }

    /// Advertise every staged change that has settled
    pub(super) fn send_triggered_update(&mut self) -> RoutingResult<()> {
        let now = self.clock.now();
        let ready: Vec<RoutingTableEntry> = self
            .advertised
            .iter()
            .filter(|e| e.changed && !self.timers.is_pending(Timer::SettlingExpired(e.destination)))
            .cloned()
            .collect();
        if ready.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(ready.len() + 1);
        for mut staged in ready {
            let dst = staged.destination;
            entries.push(DsdvEntry {
                destination: dst,
                seq_no: staged.seq_no,
                hop_count: staged.hop_count.saturating_add(1),
            });
            staged.flag = RouteFlag::Valid;
            staged.changed = false;
            if !is_poisoned(staged.seq_no) {
                self.table.update(staged);
            }
            self.advertised.delete_route(dst);
        }

        let own_seq_no = self
            .table
            .lookup_route(self.local_address())
            .map(|e| e.seq_no)
            .unwrap_or(0);
        entries.push(DsdvEntry {
            destination: self.local_address(),
            seq_no: own_seq_no,
            hop_count: 1,
        });

        debug!(entries = entries.len(), at = %now, "Sending triggered update");
        self.broadcast_update(DsdvUpdate { entries })
    }

    /// Advertise the whole table and re-arm the periodic timer
    pub(super) fn send_periodic_update(&mut self) -> RoutingResult<()> {
        let removed = self.purge_with_cascade();
        self.merge_trigger_periodic_updates();

        let local = self.local_address();
        let mut entries = Vec::with_capacity(self.table.len() + removed.len());
        if let Some(own) = self.table.lookup_route_mut(local) {
            own.seq_no = own.seq_no.wrapping_add(2);
            entries.push(DsdvEntry {
                destination: local,
                seq_no: own.seq_no,
                hop_count: 1,
            });
        }
        entries.extend(
            self.table
                .iter()
                .filter(|e| e.hop_count > 0)
                .map(|e| DsdvEntry {
                    destination: e.destination,
                    seq_no: e.seq_no,
                    hop_count: e.hop_count.saturating_add(1),
                }),
        );
        entries.extend(removed.iter().map(|e| DsdvEntry {
            destination: e.destination,
            seq_no: e.seq_no.wrapping_add(1),
            hop_count: e.hop_count.saturating_add(1),
        }));

        debug!(entries = entries.len(), removed = removed.len(), "Sending periodic update");
        let result = self.broadcast_update(DsdvUpdate { entries });

        let spread = PERIODIC_JITTER_STEP * rand::rng().random_range(0..1000);
        self.timers.schedule(
            &self.clock,
            self.config.periodic_update_interval + spread,
            Timer::PeriodicUpdate,
        );
        result
    }

    /// Fold settled changes into the forwarding table before a full dump
    fn merge_trigger_periodic_updates(&mut self) {
        let settled: Vec<RoutingTableEntry> = self
            .advertised
            .iter()
            .filter(|e| e.changed && !self.timers.is_pending(Timer::SettlingExpired(e.destination)))
            .cloned()
            .collect();
        for mut staged in settled {
            let dst = staged.destination;
            if !is_poisoned(staged.seq_no) {
                staged.flag = RouteFlag::Valid;
                staged.changed = false;
                self.table.update(staged);
            }
            self.advertised.delete_route(dst);
        }
    }

    fn broadcast_update(&mut self, update: DsdvUpdate) -> RoutingResult<()> {
        let payload = ControlMessage::Update(update).encode()?;
        for iface in self.interfaces.clone() {
            match self.transport.send_broadcast(iface.index, payload.clone()) {
                Ok(()) => {}
                Err(TransportError::LinkDown(neighbor)) => {
                    debug!(neighbor = %neighbor, "Link down, update lost");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn notify_unreachable(&mut self, dst: NodeAddr) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_route_unreachable(dst, DropReason::LinkFailure);
        }
    }
}
