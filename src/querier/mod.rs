// Querier FSM (spec 4.6): the outgoing query descriptor itself (state
// Query, held as a peer-arena RR per spec 4.6's opening line) and the
// cache-maintenance lifecycle of the peer answer records it populates
// (Valid -> Updating -> Delete / PoofDelete).

use rand::Rng;

use crate::cache::{Arena, RrId, RrState};
use crate::config::{
    MdnsConfig, POOF_MIN_COUNT, POOF_TIMER_COUNT_SECS, QUERY_FIRST_DELAY_MAX_MS,
    QUERY_FIRST_DELAY_MIN_MS, QUERY_MAX_TIMER_COUNT_SECS,
};

fn ms_to_ticks(ms: u64, periodic_rate: u32) -> u32 {
    (((ms * periodic_rate as u64) + 999) / 1000) as u32
}

fn secs_to_ticks(secs: u32, periodic_rate: u32) -> u32 {
    secs * periodic_rate
}

// Percent-of-TTL cache refresh points (spec 4.6); `retransmit_count` on the
// peer answer record is reused as the stage index into this table.
const REFRESH_STAGES: [u32; 4] = [80, 85, 90, 95];

#[derive(Default)]
pub struct QuerierOutcome {
    pub should_send: bool,
    pub evicted: bool,
}

// Starts (or restarts, for a continuous query) the outgoing query
// descriptor. First send is delayed a uniform [20, 120] ms; the
// retransmit interval then doubles each round, starting from >= 1 s and
// capped at QUERY_MAX_TIMER_COUNT (60 min).
pub fn start_query(arena: &mut Arena, id: RrId, config: &MdnsConfig, continuous: bool, rng: &mut impl Rng) {
    let record = arena.get_mut(id);
    record.state = RrState::Query;
    record.flags.continuous_query = continuous;
    record.retransmit_lifetime = secs_to_ticks(1, config.periodic_rate);
    let delay_ms = rng.gen_range(QUERY_FIRST_DELAY_MIN_MS..=QUERY_FIRST_DELAY_MAX_MS);
    record.timer_count = ms_to_ticks(delay_ms, config.periodic_rate);
}

pub fn on_query_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig) -> QuerierOutcome {
    let duplicate = arena.get(id).flags.duplicate_query;
    let record = arena.get_mut(id);
    // Duplicate-question suppression: the send is skipped but still
    // counts against timing (spec 4.6).
    let should_send = !duplicate;
    record.flags.duplicate_query = false;

    if !record.flags.continuous_query {
        record.state = RrState::Invalid;
        return QuerierOutcome {
            should_send,
            evicted: true,
        };
    }

    let cap = secs_to_ticks(QUERY_MAX_TIMER_COUNT_SECS, config.periodic_rate);
    record.retransmit_lifetime = (record.retransmit_lifetime * 2).min(cap);
    record.timer_count = record.retransmit_lifetime;
    QuerierOutcome {
        should_send,
        evicted: false,
    }
}

pub fn mark_duplicate_question(arena: &mut Arena, id: RrId) {
    arena.get_mut(id).flags.duplicate_query = true;
}

fn stage_ticks(ttl_ticks: u32, stage_percent: u32, rng: &mut impl Rng) -> u32 {
    let jitter_percent = rng.gen_range(0..=1u32);
    ((ttl_ticks as u64 * (stage_percent + jitter_percent) as u64) / 100) as u32
}

// First transition for a freshly learned peer record (spec 3,
// "Lifecycle"): Valid if ttl>0, else Delete with a 1 s grace.
pub fn on_first_receipt(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    let ttl = arena.get(id).ttl;
    if ttl == 0 {
        let record = arena.get_mut(id);
        record.state = RrState::Delete;
        record.timer_count = secs_to_ticks(1, config.periodic_rate);
        return;
    }
    schedule_next_refresh_stage(arena, id, config, 0, rng);
}

fn schedule_next_refresh_stage(
    arena: &mut Arena,
    id: RrId,
    config: &MdnsConfig,
    stage: usize,
    rng: &mut impl Rng,
) {
    let ttl = arena.get(id).ttl;
    let ttl_ticks = secs_to_ticks(ttl, config.periodic_rate);
    let record = arena.get_mut(id);
    record.state = RrState::Valid;
    record.remaining_ticks = Some(ttl_ticks);
    record.retransmit_count = stage as u32;
    if stage < REFRESH_STAGES.len() {
        record.timer_count = stage_ticks(ttl_ticks, REFRESH_STAGES[stage], rng);
    } else {
        record.timer_count = ttl_ticks;
    }
}

// Drives one timer fire for a peer answer record in Valid (crossing a
// refresh boundary) or Updating (no refresh arrived in time for the
// current boundary).
pub fn on_cache_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) -> QuerierOutcome {
    let state = arena.get(id).state;
    match state {
        RrState::Valid | RrState::Updating => {
            let stage = arena.get(id).retransmit_count as usize;
            if stage >= REFRESH_STAGES.len() {
                let record = arena.get_mut(id);
                record.state = RrState::Delete;
                return QuerierOutcome {
                    should_send: false,
                    evicted: false,
                };
            }
            let next_stage = stage + 1;
            schedule_next_refresh_stage(arena, id, config, next_stage, rng);
            let record = arena.get_mut(id);
            record.state = RrState::Updating;
            record.flags.updating = true;
            QuerierOutcome {
                should_send: true,
                evicted: false,
            }
        }
        RrState::Delete => {
            arena.delete(id);
            QuerierOutcome {
                should_send: false,
                evicted: true,
            }
        }
        RrState::PoofDelete => {
            arena.delete(id);
            QuerierOutcome {
                should_send: false,
                evicted: true,
            }
        }
        _ => QuerierOutcome::default(),
    }
}

// A matching answer arrived: cancel Updating, refresh the TTL horizon,
// clear the duplicate-question flag (spec 4.6).
pub fn on_answer_received(arena: &mut Arena, id: RrId, new_ttl: u32, config: &MdnsConfig, rng: &mut impl Rng) {
    arena.get_mut(id).ttl = new_ttl;
    arena.get_mut(id).flags.duplicate_query = false;
    arena.get_mut(id).flags.updating = false;
    arena.get_mut(id).poof_count = 0;
    schedule_next_refresh_stage(arena, id, config, 0, rng);
}

// Passive Observation Of Failures (spec 4.6). `config.periodic_rate`
// converts the POOF grace window into ticks.
pub fn observe_poof(arena: &mut Arena, id: RrId, config: &MdnsConfig) {
    let record = arena.get_mut(id);
    record.poof_count += 1;
    if record.poof_count >= POOF_MIN_COUNT && record.state == RrState::Valid {
        record.state = RrState::PoofDelete;
        record.timer_count = secs_to_ticks(POOF_TIMER_COUNT_SECS, config.periodic_rate);
    }
}

// Any observation of the expected answer during the grace window reverts
// PoofDelete back to Valid (spec 4.6).
pub fn revert_poof(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    if arena.get(id).state == RrState::PoofDelete {
        arena.get_mut(id).poof_count = 0;
        schedule_next_refresh_stage(arena, id, config, 0, rng);
    }
}

// Known-answer inclusion (spec 4.6): every Valid record in either arena
// matching (name, type, class) with remaining_ttl >= ttl/2 belongs in the
// outgoing query's Answer section.
pub fn collect_known_answers<'a>(
    arena: &'a Arena,
    interface: u32,
    name: crate::cache::pool::StringId,
    rr_type: crate::wire::DnsRRType,
    class: crate::wire::DnsClass,
    periodic_rate: u32,
) -> Vec<RrId> {
    arena
        .iter()
        .filter(|(_, r)| {
            let ttl_ticks = secs_to_ticks(r.ttl, periodic_rate);
            r.interface == interface
                && r.name == name
                && r.rr_type() == rr_type
                && r.class == class
                && r.state == RrState::Valid
                && r.remaining_ticks.map_or(false, |rem| rem * 2 >= ttl_ticks)
        })
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Arena, ArenaKind, InternMode, RdataVariant, RrFlags};
    use crate::wire::DnsClass;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::Ipv4Addr;

    fn new_peer(arena: &mut Arena, name: &str, ttl: u32) -> RrId {
        let name_id = arena.strings.intern(name.as_bytes(), InternMode::Name).unwrap();
        let rec = crate::cache::record::Record {
            interface: 0,
            name: name_id,
            class: DnsClass::IN,
            state: RrState::Invalid,
            flags: RrFlags {
                peer: true,
                ..Default::default()
            },
            ttl,
            remaining_ticks: None,
            timer_count: 0,
            response_interval: 0,
            retransmit_count: 0,
            retransmit_lifetime: 0,
            announcing_max_time: 0,
            conflict_count: 0,
            poof_count: 0,
            response_send_flag: false,
            rdata: RdataVariant::A(Ipv4Addr::new(192, 0, 2, 9)),
            elapsed_time: 0,
            count: 0,
        };
        arena.insert(rec).unwrap().0
    }

    #[test]
    fn first_receipt_with_positive_ttl_enters_valid() {
        let mut arena = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = StdRng::seed_from_u64(7);
        let id = new_peer(&mut arena, "printer.local", 120);
        on_first_receipt(&mut arena, id, &config, &mut rng);
        assert_eq!(arena.get(id).state, RrState::Valid);
        assert!(arena.get(id).timer_count > 0);
    }

    #[test]
    fn zero_ttl_enters_delete_with_one_second_grace() {
        let mut arena = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = StdRng::seed_from_u64(7);
        let id = new_peer(&mut arena, "printer.local", 0);
        on_first_receipt(&mut arena, id, &config, &mut rng);
        assert_eq!(arena.get(id).state, RrState::Delete);
    }

    #[test]
    fn answer_received_while_updating_returns_to_valid() {
        let mut arena = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = StdRng::seed_from_u64(7);
        let id = new_peer(&mut arena, "printer.local", 120);
        on_first_receipt(&mut arena, id, &config, &mut rng);
        arena.get_mut(id).state = RrState::Updating;
        on_answer_received(&mut arena, id, 120, &config, &mut rng);
        assert_eq!(arena.get(id).state, RrState::Valid);
    }

    #[test]
    fn poof_transitions_after_min_count_observations() {
        let mut arena = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = StdRng::seed_from_u64(7);
        let id = new_peer(&mut arena, "printer.local", 120);
        on_first_receipt(&mut arena, id, &config, &mut rng);
        for _ in 0..POOF_MIN_COUNT {
            observe_poof(&mut arena, id, &config);
        }
        assert_eq!(arena.get(id).state, RrState::PoofDelete);
    }

    #[test]
    fn known_answer_excludes_records_below_half_ttl() {
        let mut arena = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = StdRng::seed_from_u64(7);
        let id = new_peer(&mut arena, "printer.local", 100);
        on_first_receipt(&mut arena, id, &config, &mut rng);
        let name_id = arena.get(id).name;
        arena.get_mut(id).remaining_ticks = Some(10);
        let matches = collect_known_answers(
            &arena,
            0,
            name_id,
            crate::wire::DnsRRType::A,
            DnsClass::IN,
            config.periodic_rate,
        );
        assert!(matches.is_empty());

        arena.get_mut(id).remaining_ticks = Some(600);
        let matches = collect_known_answers(
            &arena,
            0,
            name_id,
            crate::wire::DnsRRType::A,
            DnsClass::IN,
            config.periodic_rate,
        );
        assert_eq!(matches, vec![id]);
    }
}
