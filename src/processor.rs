// Packet processor (spec 4.7). Drives both FSMs from an incoming
// datagram; enforces the address/port filters, duplicate-question,
// known-answer, and duplicate-answer suppression.

use std::net::SocketAddr;

use log::{debug, trace, warn};
use rand::Rng;

use crate::cache::{Arena, FindMode, InternMode, RdataVariant, RrId, RrState};
use crate::config::MdnsConfig;
use crate::error::PacketRejection;
use crate::notify::{CacheArenaKind, CacheFullNotify, ServiceChangeNotify, ServiceChangeState};
use crate::wire::{DnsClass, DnsPacket, DnsRRType, DnsRecordData, DnsResourceRecord};
use crate::{querier, responder};

// Address/port gate (spec 4.7 step 1). `is_response` packets must arrive
// with the AA bit set; the multicast destination check is the caller's
// responsibility (it knows which socket the datagram arrived on).
pub fn gate_source(src: SocketAddr, packet: &DnsPacket) -> Result<(), PacketRejection> {
    if src.port() != crate::transport::MDNS_PORT {
        return Err(PacketRejection::UdpPortError);
    }
    if packet.flags.qr_bit && !packet.flags.aa_bit {
        return Err(PacketRejection::AuthError);
    }
    Ok(())
}

// A full string pool (spec 4.2 failure modes) is a reachable,
// spec-anticipated condition, not a programmer error: the offending
// record is dropped, the cache-full notification fires (spec 6), and the
// datagram keeps being processed.
fn intern_name(
    arena: &mut Arena,
    labels: &[String],
    cache_notify: &mut dyn CacheFullNotify,
    kind: CacheArenaKind,
) -> Option<crate::cache::StringId> {
    let joined = crate::wire::names::str_from_labels(labels);
    match arena.strings.intern(joined.as_bytes(), InternMode::Name) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("string pool exhausted, dropping record referencing name {}", joined);
            cache_notify.notify(arena.strings.pressure(), kind);
            None
        }
    }
}

fn intern_blob(
    arena: &mut Arena,
    blob: &str,
    cache_notify: &mut dyn CacheFullNotify,
    kind: CacheArenaKind,
) -> Option<crate::cache::StringId> {
    match arena.strings.intern(blob.as_bytes(), InternMode::Blob) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("string pool exhausted, dropping record with this rdata blob");
            cache_notify.notify(arena.strings.pressure(), kind);
            None
        }
    }
}

fn wire_rdata_to_variant(
    arena: &mut Arena,
    rdata: &DnsRecordData,
    cache_notify: &mut dyn CacheFullNotify,
    kind: CacheArenaKind,
) -> Option<RdataVariant> {
    match rdata {
        DnsRecordData::A(ip) => Some(RdataVariant::A(*ip)),
        DnsRecordData::AAAA(ip) => Some(RdataVariant::Aaaa(*ip)),
        DnsRecordData::PTR(name) => Some(RdataVariant::Ptr(intern_name(arena, name, cache_notify, kind)?)),
        DnsRecordData::TXT(kv) => Some(RdataVariant::Txt(intern_blob(arena, kv, cache_notify, kind)?)),
        DnsRecordData::SRV {
            priority,
            weight,
            port,
            target,
        } => Some(RdataVariant::Srv {
            priority: *priority,
            weight: *weight,
            port: *port,
            target: intern_name(arena, target, cache_notify, kind)?,
        }),
        DnsRecordData::NSEC {
            next_name,
            window,
            bitmap,
        } => Some(RdataVariant::Nsec {
            next_name: intern_name(arena, next_name, cache_notify, kind)?,
            window: *window,
            bitmap: bitmap.clone(),
        }),
        // CNAME/NS/MX/Other are read-only extensions the responder never
        // originates or caches (spec 6); they pass through parsing but are
        // not represented in the record store.
        _ => None,
    }
}

fn wire_rr_to_record(
    arena: &mut Arena,
    interface: u32,
    rr: &DnsResourceRecord,
    cache_notify: &mut dyn CacheFullNotify,
    kind: CacheArenaKind,
) -> Option<crate::cache::Record> {
    let rdata = wire_rdata_to_variant(arena, &rr.rdata, cache_notify, kind)?;
    let name = intern_name(arena, &rr.name, cache_notify, kind)?;
    Some(crate::cache::Record {
        interface,
        name,
        class: rr.class,
        state: RrState::Invalid,
        flags: crate::cache::RrFlags {
            peer: true,
            unique: rr.cache_flush,
            ..Default::default()
        },
        ttl: rr.ttl,
        remaining_ticks: None,
        timer_count: 0,
        response_interval: 0,
        retransmit_count: 0,
        retransmit_lifetime: 0,
        announcing_max_time: 0,
        conflict_count: 0,
        poof_count: 0,
        response_send_flag: false,
        rdata,
        elapsed_time: 0,
        count: 0,
    })
}

// Ingests a response answer into the peer cache (spec 4.7 step 3). Drops
// the record if its service type matches `service_ignore_mask`; otherwise
// inserts or refreshes it, then fires the service-change notification for
// a new, deleted, or updated SRV/A/AAAA mapping.
pub fn ingest_answer(
    peer: &mut Arena,
    config: &MdnsConfig,
    interface: u32,
    rr: &DnsResourceRecord,
    service_type_bit: u32,
    notifier: &mut dyn ServiceChangeNotify,
    cache_notify: &mut dyn CacheFullNotify,
    rng: &mut impl Rng,
) {
    if config.service_ignore_mask & service_type_bit != 0 {
        debug!("dropping ingested record: service type masked by service_ignore_mask");
        return;
    }

    let Some(mut record) = wire_rr_to_record(peer, interface, rr, cache_notify, CacheArenaKind::Peer) else {
        return;
    };

    if rr.ttl == 0 {
        // Goodbye: if we are holding this record, start its delete grace;
        // otherwise there is nothing to do.
        if let Some(id) = peer.find(
            interface,
            record.name,
            record.rr_type(),
            record.class,
            FindMode::All,
            Some(&record.rdata),
        ) {
            peer.get_mut(id).ttl = 0;
            peer.get_mut(id).state = RrState::Delete;
            peer.get_mut(id).timer_count = config.periodic_rate;
            if config.service_notify_mask & service_type_bit != 0
                && matches!(rr.rr_type(), DnsRRType::SRV | DnsRRType::A | DnsRRType::AAAA)
            {
                notifier.notify(&crate::wire::names::str_from_labels(&rr.name), ServiceChangeState::Deleted);
            }
        }
        return;
    }

    let existing = peer.find(
        interface,
        record.name,
        record.rr_type(),
        record.class,
        FindMode::All,
        Some(&record.rdata),
    );
    let is_update = existing.is_some();
    record.state = RrState::Invalid;
    let (id, _) = match peer.insert(record) {
        Ok(ok) => ok,
        Err(_) => {
            warn!("peer cache insert failed, dropping record");
            cache_notify.notify(peer.strings.pressure(), CacheArenaKind::Peer);
            return;
        }
    };

    if is_update {
        querier::on_answer_received(peer, id, rr.ttl, config, rng);
    } else {
        querier::on_first_receipt(peer, id, config, rng);
    }

    if config.service_notify_mask & service_type_bit != 0
        && matches!(rr.rr_type(), DnsRRType::SRV | DnsRRType::A | DnsRRType::AAAA)
    {
        let state = if is_update {
            ServiceChangeState::Updated
        } else {
            ServiceChangeState::Received
        };
        notifier.notify(&crate::wire::names::str_from_labels(&rr.name), state);
    }
}

// Duplicate-answer suppression for the responder (spec 4.5): an answer
// with TTL >= half the record's TTL seen in another response cancels a
// pending scheduled send for the matching local record.
pub fn suppress_duplicate_answer(
    local: &mut Arena,
    interface: u32,
    answer: &DnsResourceRecord,
    cache_notify: &mut dyn CacheFullNotify,
) {
    let Some(name) = intern_name(local, &answer.name, cache_notify, CacheArenaKind::Local) else {
        return;
    };
    if let Some(id) = local.find(interface, name, answer.rr_type(), answer.class, FindMode::All, None) {
        let record = local.get_mut(id);
        if record.response_send_flag && answer.ttl * 2 >= record.ttl {
            record.response_send_flag = false;
        }
    }
}

// Byte-level comparison between an already-interned local record's rdata
// and a freshly decoded wire answer's rdata, without interning the wire
// side (this is a read-only probe, not a cache insert).
fn rdata_matches_wire(arena: &Arena, ours: &RdataVariant, theirs: &DnsRecordData) -> bool {
    let names_match = |id: crate::cache::StringId, labels: &[String]| {
        let joined = crate::wire::names::str_from_labels(labels);
        arena.strings.get(id).eq_ignore_ascii_case(joined.as_bytes())
    };
    match (ours, theirs) {
        (RdataVariant::A(a), DnsRecordData::A(b)) => a == b,
        (RdataVariant::Aaaa(a), DnsRecordData::AAAA(b)) => a == b,
        (RdataVariant::Ptr(target), DnsRecordData::PTR(labels)) => names_match(*target, labels),
        (
            RdataVariant::Srv { priority, weight, port, target },
            DnsRecordData::SRV { priority: p2, weight: w2, port: port2, target: labels },
        ) => priority == p2 && weight == w2 && port == port2 && names_match(*target, labels),
        (RdataVariant::Txt(blob), DnsRecordData::TXT(kv)) => arena.strings.get(*blob) == kv.as_bytes(),
        (RdataVariant::Nsec { next_name, .. }, DnsRecordData::NSEC { next_name: labels, .. }) => {
            names_match(*next_name, labels)
        }
        _ => false,
    }
}

// Conflicting-response suppression (spec 4.5): another responder is
// multicasting our own record's rdata with a TTL under half of ours,
// meaning its cache of our record is about to expire. Schedule a rescue
// re-announcement rather than letting their copy lapse.
pub fn rescue_stale_peer_copy(
    local: &mut Arena,
    config: &MdnsConfig,
    interface: u32,
    answer: &DnsResourceRecord,
    cache_notify: &mut dyn CacheFullNotify,
    rng: &mut impl Rng,
) {
    let Some(name) = intern_name(local, &answer.name, cache_notify, CacheArenaKind::Local) else {
        return;
    };
    let candidates: Vec<RrId> = local
        .iter()
        .filter(|(_, r)| {
            r.interface == interface
                && r.name == name
                && r.rr_type() == answer.rr_type()
                && r.class == answer.class
                && matches!(r.state, RrState::Announcing | RrState::Valid)
        })
        .map(|(id, _)| id)
        .collect();
    for id in candidates {
        let record = local.get(id);
        if rdata_matches_wire(local, &record.rdata, &answer.rdata) && answer.ttl * 2 < record.ttl {
            trace!("peer holds a stale copy of our record, scheduling rescue announcement");
            responder::schedule_rescue(local, id, config, rng);
        }
    }
}

// Drives the responder's conflict/TTL logic for an answer arriving in a
// response packet, ahead of cache ingestion (spec 4.7 step 2).
pub fn check_responder_conflict(
    local: &mut Arena,
    config: &MdnsConfig,
    interface: u32,
    answer: &DnsResourceRecord,
    cache_notify: &mut dyn CacheFullNotify,
    rng: &mut impl Rng,
) {
    let Some(name) = intern_name(local, &answer.name, cache_notify, CacheArenaKind::Local) else {
        return;
    };
    let Some(id) = local.find(interface, name, answer.rr_type(), answer.class, FindMode::ExceptRdata, None) else {
        return;
    };
    if local.get(id).state != RrState::Probing {
        return;
    }
    trace!("conflicting answer observed during probing");
    responder::on_conflict(local, id, config, rng);
}

// Question-side handling for a query packet (spec 4.7 step 2, response
// bit unset): advances matching local records toward sending a reply, and
// increments POOF counters on matching peer records.
pub fn handle_question(
    local: &mut Arena,
    peer: &mut Arena,
    config: &MdnsConfig,
    interface: u32,
    question: &crate::wire::DnsQuestion,
    truncated: bool,
    cache_notify: &mut dyn CacheFullNotify,
    rng: &mut impl Rng,
) {
    if let Some(qname) = intern_name(local, &question.qname, &mut *cache_notify, CacheArenaKind::Local) {
        let local_matches: Vec<RrId> = local
            .iter()
            .filter(|(_, r)| {
                r.interface == interface
                    && r.name == qname
                    && (question.qtype == DnsRRType::ANY || r.rr_type() == question.qtype)
                    && (question.qclass == DnsClass::ANY || r.class == question.qclass)
                    && matches!(r.state, RrState::Valid | RrState::Announcing)
            })
            .map(|(id, _)| id)
            .collect();
        for id in local_matches {
            responder::schedule_response(local, id, config, truncated, rng);
        }
    }

    if let Some(peer_name) = intern_name(peer, &question.qname, cache_notify, CacheArenaKind::Peer) {
        let peer_matches: Vec<RrId> = peer
            .iter()
            .filter(|(_, r)| {
                r.interface == interface
                    && r.name == peer_name
                    && (question.qtype == DnsRRType::ANY || r.rr_type() == question.qtype)
                    && (question.qclass == DnsClass::ANY || r.class == question.qclass)
                    && r.state == RrState::Valid
            })
            .map(|(id, _)| id)
            .collect();
        for id in peer_matches {
            querier::observe_poof(peer, id, config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArenaKind;
    use crate::wire::DnsFlags;
    use std::net::Ipv4Addr;

    #[test]
    fn gate_rejects_non_mdns_source_port() {
        let packet = DnsPacket {
            id: 1,
            flags: DnsFlags::response(false),
            questions: vec![],
            answers: vec![],
            nameservers: vec![],
            addl_recs: vec![],
        };
        let src: SocketAddr = "192.0.2.1:9999".parse().unwrap();
        assert_eq!(gate_source(src, &packet), Err(PacketRejection::UdpPortError));
    }

    #[test]
    fn gate_rejects_response_without_aa() {
        let mut packet = DnsPacket {
            id: 1,
            flags: DnsFlags::response(false),
            questions: vec![],
            answers: vec![],
            nameservers: vec![],
            addl_recs: vec![],
        };
        packet.flags.aa_bit = false;
        let src: SocketAddr = "192.0.2.1:5353".parse().unwrap();
        assert_eq!(gate_source(src, &packet), Err(PacketRejection::AuthError));
    }

    #[test]
    fn ingest_creates_peer_record_and_notifies() {
        let mut peer = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = rand::thread_rng();
        let rr = DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 120,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 5)),
        };
        let mut seen = Vec::new();
        let mut notifier = |service: &str, state: ServiceChangeState| {
            seen.push((service.to_owned(), state));
        };
        let mut cache_notifier = |_: crate::notify::CacheState, _: CacheArenaKind| {};
        ingest_answer(&mut peer, &config, 0, &rr, 0, &mut notifier, &mut cache_notifier, &mut rng);
        assert_eq!(peer.live_count(), 1);
        assert_eq!(seen, vec![("printer.local".to_owned(), ServiceChangeState::Received)]);
    }

    #[test]
    fn goodbye_ttl_zero_marks_existing_record_for_delete() {
        let mut peer = Arena::new(ArenaKind::Peer, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = rand::thread_rng();
        let rr = DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 120,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 5)),
        };
        let mut notifier = |_: &str, _: ServiceChangeState| {};
        let mut cache_notifier = |_: crate::notify::CacheState, _: CacheArenaKind| {};
        ingest_answer(&mut peer, &config, 0, &rr, 0, &mut notifier, &mut cache_notifier, &mut rng);

        let mut goodbye_rr = rr.clone();
        goodbye_rr.ttl = 0;
        ingest_answer(&mut peer, &config, 0, &goodbye_rr, 0, &mut notifier, &mut cache_notifier, &mut rng);
        let (id, _) = peer.find(
            0,
            peer.strings.intern(b"printer.local", InternMode::Name).unwrap(),
            DnsRRType::A,
            DnsClass::IN,
            FindMode::ExceptRdata,
            None,
        ).map(|id| (id, ())).unwrap();
        assert_eq!(peer.get(id).state, RrState::Delete);
    }

    fn new_valid_local(local: &mut Arena, name: &str, ttl: u32) -> RrId {
        let name_id = local.strings.intern(name.as_bytes(), InternMode::Name).unwrap();
        let rec = crate::cache::record::Record {
            interface: 0,
            name: name_id,
            class: DnsClass::IN,
            state: RrState::Valid,
            flags: crate::cache::record::RrFlags::default(),
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
            rdata: RdataVariant::A(Ipv4Addr::new(192, 0, 2, 5)),
            elapsed_time: 0,
            count: 0,
        };
        local.insert(rec).unwrap().0
    }

    #[test]
    fn rescue_schedules_response_for_stale_peer_copy() {
        let mut local = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = rand::thread_rng();
        let mut cache_notifier = |_: crate::notify::CacheState, _: CacheArenaKind| {};
        let id = new_valid_local(&mut local, "printer.local", 120);

        let stale_answer = DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 50,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 5)),
        };
        rescue_stale_peer_copy(&mut local, &config, 0, &stale_answer, &mut cache_notifier, &mut rng);
        assert!(local.get(id).response_send_flag);
    }

    #[test]
    fn rescue_ignores_answer_with_healthy_ttl() {
        let mut local = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = rand::thread_rng();
        let mut cache_notifier = |_: crate::notify::CacheState, _: CacheArenaKind| {};
        let id = new_valid_local(&mut local, "printer.local", 120);

        let healthy_answer = DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 100,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 5)),
        };
        rescue_stale_peer_copy(&mut local, &config, 0, &healthy_answer, &mut cache_notifier, &mut rng);
        assert!(!local.get(id).response_send_flag);
    }

    #[test]
    fn rescue_ignores_mismatched_rdata() {
        let mut local = Arena::new(ArenaKind::Local, 8, 32);
        let config = MdnsConfig::default().with_host_name("host");
        let mut rng = rand::thread_rng();
        let mut cache_notifier = |_: crate::notify::CacheState, _: CacheArenaKind| {};
        let id = new_valid_local(&mut local, "printer.local", 120);

        let other_answer = DnsResourceRecord {
            name: vec!["printer".to_owned(), "local".to_owned()],
            class: DnsClass::IN,
            cache_flush: true,
            ttl: 10,
            rdata: DnsRecordData::A(Ipv4Addr::new(192, 0, 2, 9)),
        };
        rescue_stale_peer_copy(&mut local, &config, 0, &other_answer, &mut cache_notifier, &mut rng);
        assert!(!local.get(id).response_send_flag);
    }
}
