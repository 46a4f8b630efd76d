// Timer wheel (spec 4.4). A single countdown drives the whole core; each
// record carries its own `timer_count` (and `response_interval`) in ticks.
// The wheel only tracks the horizon (`min_count`) at which it must next
// fire; per-record bookkeeping lives on the record itself.

use crate::cache::record::{Record, RrId};
use crate::config::TIMER_COUNT_RANGE;

#[derive(Default)]
pub struct TimerWheel {
    min_count: Option<u32>,
}

impl TimerWheel {
    pub fn new() -> TimerWheel {
        TimerWheel { min_count: None }
    }

    pub fn min_count(&self) -> Option<u32> {
        self.min_count
    }

    // Deciding whether scheduling `timer_count` ticks out requires
    // reprogramming the wheel (spec 4.4, "Scheduling a record").
    pub fn needs_reprogram(&self, timer_count: u32) -> bool {
        match self.min_count {
            None => true,
            Some(current) => timer_count < current,
        }
    }

    pub fn reprogram(&mut self, timer_count: u32) {
        self.min_count = Some(match self.min_count {
            Some(current) => current.min(timer_count),
            None => timer_count,
        });
    }

    // Advances every record's `timer_count`, `response_interval`, and
    // `remaining_ticks` by `elapsed`, clamping at zero, and returns the ids
    // whose `timer_count` reached the action guard. `remaining_ticks`
    // monotonically decreases every tick regardless of refresh-stage
    // crossings (spec 4.6); `elapsed_time` grows every tick so peer-cache
    // eviction (spec 4.3) can pick a genuinely oldest record. Call
    // `recompute` afterwards to re-derive `min_count` for the next fire.
    pub fn advance<'a>(
        &mut self,
        records: impl Iterator<Item = (RrId, &'a mut Record)>,
        elapsed: u32,
    ) -> Vec<RrId> {
        let mut due = Vec::new();
        for (id, record) in records {
            record.timer_count = record.timer_count.saturating_sub(elapsed);
            record.response_interval = record.response_interval.saturating_sub(elapsed);
            record.remaining_ticks = record.remaining_ticks.map(|rem| rem.saturating_sub(elapsed));
            record.elapsed_time = record.elapsed_time.saturating_add(elapsed);
            if record.timer_count <= TIMER_COUNT_RANGE {
                due.push(id);
            }
        }
        due
    }

    // Recomputes `min_count` as the minimum of all positive `timer_count`
    // and `response_interval` values across the given records (spec 4.4).
    pub fn recompute<'a>(&mut self, records: impl Iterator<Item = &'a Record>) {
        let mut min: Option<u32> = None;
        for record in records {
            for candidate in [record.timer_count, record.response_interval] {
                if candidate > 0 {
                    min = Some(min.map_or(candidate, |m| m.min(candidate)));
                }
            }
        }
        self.min_count = min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pool::StringId;
    use crate::cache::record::{RdataVariant, RrFlags, RrState};
    use crate::wire::DnsClass;
    use std::net::Ipv4Addr;

    fn dummy_record(timer_count: u32) -> Record {
        Record {
            interface: 0,
            name: StringId(0),
            class: DnsClass::IN,
            state: RrState::Valid,
            flags: RrFlags::default(),
            ttl: 120,
            remaining_ticks: Some(1200),
            timer_count,
            response_interval: 0,
            retransmit_count: 0,
            retransmit_lifetime: 0,
            announcing_max_time: 0,
            conflict_count: 0,
            poof_count: 0,
            response_send_flag: false,
            rdata: RdataVariant::A(Ipv4Addr::new(1, 2, 3, 4)),
            elapsed_time: 0,
            count: 0,
        }
    }

    #[test]
    fn reprogram_tracks_the_smallest_requested_horizon() {
        let mut wheel = TimerWheel::new();
        assert!(wheel.needs_reprogram(100));
        wheel.reprogram(100);
        assert!(!wheel.needs_reprogram(150));
        assert!(wheel.needs_reprogram(50));
        wheel.reprogram(50);
        assert_eq!(wheel.min_count(), Some(50));
    }

    #[test]
    fn advance_reports_ids_that_crossed_the_guard() {
        let mut wheel = TimerWheel::new();
        let mut a = dummy_record(5);
        let mut b = dummy_record(1);
        let records: Vec<(RrId, &mut Record)> = vec![(RrId(0), &mut a), (RrId(1), &mut b)];
        let due = wheel.advance(records.into_iter(), 4);
        assert_eq!(a.timer_count, 1);
        assert_eq!(b.timer_count, 0);
        assert_eq!(due, vec![RrId(1)]);
    }
}
