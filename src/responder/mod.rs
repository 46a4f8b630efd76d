// Responder FSM (spec 4.5): per-authoritative-record probing, conflict
// resolution, announcing with exponential back-off, goodbye.

use rand::Rng;

use crate::cache::{Arena, InternMode, RdataVariant, RrId, RrState};
use crate::config::{
    MdnsConfig, CONFLICT_COUNT_MAX, GOODBYE_RETRANSMIT_COUNT, GOODBYE_TIMER_COUNT,
    PROBE_COUNT, PROBE_RETRANSMIT_COUNT, PROBE_WAIT_MAX_MS, RESPONSE_INTERVAL_SECS,
};
use crate::notify::ProbingState;
use crate::wire::DnsRRType;

fn ms_to_ticks(ms: u64, periodic_rate: u32) -> u32 {
    (((ms * periodic_rate as u64) + 999) / 1000) as u32
}

fn secs_to_ticks(secs: u32, periodic_rate: u32) -> u32 {
    secs * periodic_rate
}

#[derive(Default)]
pub struct ResponderOutcome {
    // Fired when a record finished probing (success or the configured
    // number of conflicts were exhausted).
    pub notify: Option<(String, ProbingState)>,
    // True if this timer fire should cause the core to multicast the
    // record's current announce/probe/goodbye payload.
    pub should_send: bool,
}

// Initial transition on interface-enable (spec 4.5 table).
pub fn enable(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    let unique = arena.get(id).flags.unique;
    let rr_type = arena.get(id).rr_type();
    if unique {
        start_probing(arena, id, config, rng);
    } else if rr_type == DnsRRType::PTR || rr_type == DnsRRType::NSEC {
        arena.get_mut(id).state = RrState::Valid;
    } else {
        start_announcing(arena, id, config);
    }
}

pub fn start_probing(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    let record = arena.get_mut(id);
    record.state = RrState::Probing;
    record.retransmit_count = PROBE_RETRANSMIT_COUNT;
    let jitter_ms = rng.gen_range(0..=PROBE_WAIT_MAX_MS);
    record.timer_count = ms_to_ticks(jitter_ms, config.periodic_rate);
}

pub fn start_announcing(arena: &mut Arena, id: RrId, config: &MdnsConfig) {
    let record = arena.get_mut(id);
    record.state = RrState::Announcing;
    record.retransmit_count = config.announcing_count;
    record.retransmit_lifetime = config.announcing_retrans_interval_ms as u32;
    record.announcing_max_time = config.announcing_max_time_secs;
    record.timer_count = 0;
}

// Drives one timer fire for a record in Probing/Announcing/Goodbye. The
// caller (event loop) is responsible for actually building and sending
// the wire packet when `should_send` is set; this function only owns FSM
// state transitions and counters.
pub fn on_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig) -> ResponderOutcome {
    let state = arena.get(id).state;
    match state {
        RrState::Probing => on_probe_timer(arena, id, config),
        RrState::Announcing => on_announce_timer(arena, id, config),
        RrState::Goodbye => on_goodbye_timer(arena, id, config),
        _ => ResponderOutcome::default(),
    }
}

fn on_probe_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig) -> ResponderOutcome {
    let record = arena.get_mut(id);
    record.retransmit_count -= 1;
    let finished = record.retransmit_count == 0;
    if finished {
        drop(record);
        start_announcing(arena, id, config);
        let rr_type = arena.get(id).rr_type();
        let notify_state = if rr_type == DnsRRType::SRV {
            ProbingState::ServiceRegisteredSuccess
        } else {
            ProbingState::HostRegisteredSuccess
        };
        return ResponderOutcome {
            notify: Some((String::new(), notify_state)),
            should_send: true,
        };
    }
    record.timer_count = ms_to_ticks(250, config.periodic_rate);
    ResponderOutcome {
        notify: None,
        should_send: true,
    }
}

fn on_announce_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig) -> ResponderOutcome {
    let record = arena.get_mut(id);
    if record.retransmit_count > 0 {
        record.retransmit_count -= 1;
        record.timer_count = ms_to_ticks(
            config.announcing_retrans_interval_ms,
            config.periodic_rate,
        );
        return ResponderOutcome {
            notify: None,
            should_send: true,
        };
    }

    if config.announcing_forever || record.announcing_max_time > 0 {
        record.retransmit_lifetime =
            (record.retransmit_lifetime * config.announcing_factor.max(1))
                .min(secs_to_ticks(config.announcing_period_interval_secs, config.periodic_rate));
        if !config.announcing_forever {
            record.announcing_max_time = record.announcing_max_time.saturating_sub(1);
        }
        record.timer_count = record.retransmit_lifetime;
        return ResponderOutcome {
            notify: None,
            should_send: true,
        };
    }

    record.state = RrState::Valid;
    record.timer_count = 0;
    ResponderOutcome::default()
}

fn on_goodbye_timer(arena: &mut Arena, id: RrId, config: &MdnsConfig) -> ResponderOutcome {
    let delete_flag = arena.get(id).flags.delete;
    let record = arena.get_mut(id);
    record.retransmit_count -= 1;
    if record.retransmit_count == 0 {
        record.state = if delete_flag {
            RrState::Invalid
        } else {
            RrState::Suspended
        };
        return ResponderOutcome {
            notify: None,
            should_send: true,
        };
    }
    record.timer_count = secs_to_ticks(GOODBYE_TIMER_COUNT, config.periodic_rate);
    ResponderOutcome {
        notify: None,
        should_send: true,
    }
}

// Goodbye: explicit delete, interface disable, or address change
// (spec 4.5). The NSEC pseudo-record is suspended rather than given a
// goodbye on interface disable (spec 9, resolved Open Question).
pub fn goodbye(arena: &mut Arena, id: RrId, config: &MdnsConfig, delete: bool) {
    if arena.get(id).rr_type() == DnsRRType::NSEC && !delete {
        arena.get_mut(id).state = RrState::Suspended;
        return;
    }
    let record = arena.get_mut(id);
    record.state = RrState::Goodbye;
    record.flags.delete = delete;
    record.retransmit_count = GOODBYE_RETRANSMIT_COUNT;
    record.ttl = 0;
    record.timer_count = 0;
    let _ = config;
}

// Conflict resolution during probing or serving (spec 4.5). Any answer
// matching our name+class, regardless of type, counts as a conflict.
// Returns `Some(RegisteredFailure)` once CONFLICT_COUNT_MAX is exceeded.
pub fn on_conflict(
    arena: &mut Arena,
    id: RrId,
    config: &MdnsConfig,
    rng: &mut impl Rng,
) -> Option<ProbingState> {
    let record = arena.get_mut(id);
    record.conflict_count += 1;
    if record.conflict_count > CONFLICT_COUNT_MAX {
        record.state = RrState::Invalid;
        return Some(ProbingState::RegisteredFailure);
    }
    rename_and_restart(arena, id, config, rng);
    None
}

// Appends " (2)" on the first conflict, or bumps the trailing digit on
// subsequent ones, to the host/service instance label only (spec 4.5) —
// the leading segment of the name, not the whole dotted FQDN — then
// rewrites every other record's PTR rdata / SRV target that referenced
// the renamed string.
fn rename_and_restart(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    let old_name_id = arena.get(id).name;
    let old_bytes = arena.strings.get(old_name_id).to_vec();
    let old_str = String::from_utf8_lossy(&old_bytes).into_owned();
    let (label, rest) = match old_str.find('.') {
        Some(idx) => (&old_str[..idx], &old_str[idx..]),
        None => (old_str.as_str(), ""),
    };
    let new_str = format!("{}{}", next_conflict_label(label), rest);
    let new_name_id = arena
        .strings
        .intern(new_str.as_bytes(), InternMode::Name)
        .expect("rename intern should not exceed bounded pool in practice");

    for (_, record) in arena.iter_mut() {
        let mut touched = false;
        if record.name == old_name_id {
            record.name = new_name_id;
            touched = true;
        }
        match &mut record.rdata {
            RdataVariant::Ptr(s) if *s == old_name_id => {
                *s = new_name_id;
                touched = true;
            }
            RdataVariant::Srv { target, .. } if *target == old_name_id => {
                *target = new_name_id;
                touched = true;
            }
            _ => {}
        }
        if touched {
            arena.strings.retain(new_name_id);
            arena.strings.release(old_name_id);
        }
    }

    start_probing(arena, id, config, rng);
}

// "printer" -> "printer (2)"; "printer (2)" -> "printer (3)".
fn next_conflict_label(name: &str) -> String {
    if let Some(open) = name.rfind(" (") {
        if let Some(close) = name[open..].find(')') {
            let digits = &name[open + 2..open + close];
            if let Ok(n) = digits.parse::<u32>() {
                return format!("{} ({})", &name[..open], n + 1);
            }
        }
    }
    format!("{} (2)", name)
}

// Serving queries (spec 4.5): computes the response delay in ticks for a
// record answering a question, honoring the 1 s minimum inter-response
// spacing.
pub fn schedule_response(
    arena: &mut Arena,
    id: RrId,
    config: &MdnsConfig,
    query_truncated: bool,
    rng: &mut impl Rng,
) {
    let unique = arena.get(id).flags.unique;
    let delay_ms = if query_truncated {
        rng.gen_range(400..=500)
    } else if unique {
        20
    } else {
        rng.gen_range(20..=120)
    };
    let record = arena.get_mut(id);
    let delay_ticks = ms_to_ticks(delay_ms, config.periodic_rate);
    let min_interval = secs_to_ticks(RESPONSE_INTERVAL_SECS, config.periodic_rate);
    record.timer_count = delay_ticks.max(record.response_interval);
    record.response_interval = record.timer_count + min_interval;
    record.response_send_flag = true;
}

// Rescue announcement (spec 4.5): a peer's cached copy of our record is
// about to expire (TTL observed in the wild is under half ours). Always
// uses shared-delay jitter, even for records flagged unique, since the
// point is to beat a stranger's cache timer rather than win a probe race.
pub fn schedule_rescue(arena: &mut Arena, id: RrId, config: &MdnsConfig, rng: &mut impl Rng) {
    let delay_ms = rng.gen_range(20..=120);
    let record = arena.get_mut(id);
    let delay_ticks = ms_to_ticks(delay_ms, config.periodic_rate);
    let min_interval = secs_to_ticks(RESPONSE_INTERVAL_SECS, config.periodic_rate);
    record.timer_count = delay_ticks.max(record.response_interval);
    record.response_interval = record.timer_count + min_interval;
    record.response_send_flag = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Arena, ArenaKind, RdataVariant, RrFlags};
    use crate::wire::DnsClass;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::net::Ipv4Addr;

    fn new_host(arena: &mut Arena, name: &str) -> RrId {
        let name_id = arena
            .strings
            .intern(name.as_bytes(), InternMode::Name)
            .unwrap();
        let rec = crate::cache::record::Record {
            interface: 0,
            name: name_id,
            class: DnsClass::IN,
            state: RrState::Invalid,
            flags: RrFlags {
                unique: true,
                ..Default::default()
            },
            ttl: 120,
            remaining_ticks: None,
            timer_count: 0,
            response_interval: 0,
            retransmit_count: 0,
            retransmit_lifetime: 0,
            announcing_max_time: 0,
            conflict_count: 0,
            poof_count: 0,
            response_send_flag: false,
            rdata: RdataVariant::A(Ipv4Addr::new(192, 0, 2, 5)),
            elapsed_time: 0,
            count: 0,
        };
        arena.insert(rec).unwrap().0
    }

    #[test]
    fn probing_runs_three_times_then_announces() {
        let mut arena = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("printer");
        let mut rng = StdRng::seed_from_u64(1);
        let id = new_host(&mut arena, "printer.local");
        enable(&mut arena, id, &config, &mut rng);
        assert_eq!(arena.get(id).state, RrState::Probing);

        on_timer(&mut arena, id, &config);
        assert_eq!(arena.get(id).state, RrState::Probing);
        on_timer(&mut arena, id, &config);
        assert_eq!(arena.get(id).state, RrState::Probing);
        let outcome = on_timer(&mut arena, id, &config);
        assert_eq!(arena.get(id).state, RrState::Announcing);
        assert!(outcome.notify.is_some());
    }

    #[test]
    fn conflict_renames_and_restarts_probing() {
        let mut arena = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("printer");
        let mut rng = StdRng::seed_from_u64(2);
        let id = new_host(&mut arena, "printer.local");
        enable(&mut arena, id, &config, &mut rng);

        let result = on_conflict(&mut arena, id, &config, &mut rng);
        assert!(result.is_none());
        assert_eq!(arena.get(id).state, RrState::Probing);
        assert_eq!(arena.strings.get(arena.get(id).name), b"printer (2).local");
    }

    #[test]
    fn exhausting_conflicts_fires_registered_failure() {
        let mut arena = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("printer");
        let mut rng = StdRng::seed_from_u64(3);
        let id = new_host(&mut arena, "printer.local");
        enable(&mut arena, id, &config, &mut rng);

        let mut last = None;
        for _ in 0..=CONFLICT_COUNT_MAX {
            last = on_conflict(&mut arena, id, &config, &mut rng);
        }
        assert_eq!(last, Some(ProbingState::RegisteredFailure));
        assert_eq!(arena.get(id).state, RrState::Invalid);
    }

    #[test]
    fn goodbye_sends_retransmits_then_invalidates() {
        let mut arena = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("printer");
        let id = new_host(&mut arena, "printer.local");
        arena.get_mut(id).state = RrState::Valid;
        goodbye(&mut arena, id, &config, true);
        assert_eq!(arena.get(id).state, RrState::Goodbye);

        for _ in 0..GOODBYE_RETRANSMIT_COUNT {
            on_timer(&mut arena, id, &config);
        }
        assert_eq!(arena.get(id).state, RrState::Invalid);
    }
}
