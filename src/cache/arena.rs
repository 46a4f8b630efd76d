// Record store (spec 4.3). Two arenas exist in the running core: local
// (authoritative) and peer (learned). Both share this implementation; the
// eviction-under-pressure policy differs per spec 4.3's "special case"
// paragraph, which only applies to the peer arena.

use crate::cache::pool::StringPool;
use crate::cache::record::{RdataVariant, Record, RrId, RrState};
use crate::error::{MdnsError, Result};
use crate::wire::{DnsClass, DnsRRType};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArenaKind {
    Local,
    Peer,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FindMode {
    // Match interface+name+type+class only; used by probing's conflict
    // check and by Insert's existence test.
    ExceptRdata,
    // Also require the rdata to match.
    All,
}

pub struct Arena {
    pub strings: StringPool,
    kind: ArenaKind,
    records: Vec<Option<Record>>,
    free: Vec<RrId>,
    max_slots: usize,
}

fn rdata_eq(a: &RdataVariant, b: &RdataVariant) -> bool {
    use RdataVariant::*;
    match (a, b) {
        (A(x), A(y)) => x == y,
        (Aaaa(x), Aaaa(y)) => x == y,
        (Ptr(x), Ptr(y)) => x == y,
        (
            Srv {
                priority: p1,
                weight: w1,
                port: port1,
                target: t1,
            },
            Srv {
                priority: p2,
                weight: w2,
                port: port2,
                target: t2,
            },
        ) => p1 == p2 && w1 == w2 && port1 == port2 && t1 == t2,
        (Txt(x), Txt(y)) => x == y,
        (
            Nsec {
                next_name: n1,
                window: w1,
                bitmap: b1,
            },
            Nsec {
                next_name: n2,
                window: w2,
                bitmap: b2,
            },
        ) => n1 == n2 && w1 == w2 && b1 == b2,
        _ => false,
    }
}

impl Arena {
    pub fn new(kind: ArenaKind, max_records: usize, max_string_slots: usize) -> Arena {
        Arena {
            strings: StringPool::new(max_string_slots),
            kind,
            records: Vec::new(),
            free: Vec::new(),
            max_slots: max_records,
        }
    }

    pub fn get(&self, id: RrId) -> &Record {
        self.records[id.0].as_ref().expect("get of dead record")
    }

    pub fn get_mut(&mut self, id: RrId) -> &mut Record {
        self.records[id.0].as_mut().expect("get_mut of dead record")
    }

    pub fn iter(&self) -> impl Iterator<Item = (RrId, &Record)> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().map(|r| (RrId(i), r)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RrId, &mut Record)> {
        self.records
            .iter_mut()
            .enumerate()
            .filter_map(|(i, r)| r.as_mut().map(|r| (RrId(i), r)))
    }

    pub fn find(
        &self,
        interface: u32,
        name: crate::cache::pool::StringId,
        rr_type: DnsRRType,
        class: DnsClass,
        mode: FindMode,
        rdata: Option<&RdataVariant>,
    ) -> Option<RrId> {
        self.iter()
            .find(|(_, r)| {
                r.interface == interface
                    && r.name == name
                    && r.class == class
                    && r.rr_type() == rr_type
                    && match mode {
                        FindMode::ExceptRdata => true,
                        FindMode::All => rdata.map_or(true, |want| rdata_eq(&r.rdata, want)),
                    }
            })
            .map(|(id, _)| id)
    }

    // Any-type conflict probe used by the responder during Probing (spec
    // 4.3: "During Probing, type mismatch is ignored").
    pub fn find_name_conflict(
        &self,
        interface: u32,
        name: crate::cache::pool::StringId,
        class: DnsClass,
        skip: RrId,
    ) -> Option<RrId> {
        self.iter()
            .find(|(id, r)| {
                *id != skip && r.interface == interface && r.name == name && r.class == class
            })
            .map(|(id, _)| id)
    }

    fn release_record_strings(&mut self, record: &Record) {
        self.strings.release(record.name);
        match &record.rdata {
            RdataVariant::Ptr(s) | RdataVariant::Txt(s) => self.strings.release(*s),
            RdataVariant::Srv { target, .. } => self.strings.release(*target),
            RdataVariant::Nsec { next_name, .. } => self.strings.release(*next_name),
            RdataVariant::A(_) | RdataVariant::Aaaa(_) => {}
        }
    }

    // Evicts the non-Query record with the oldest `elapsed_time`; only
    // meaningful for the peer arena (spec 4.3).
    fn evict_oldest(&mut self) -> Option<RrId> {
        let victim = self
            .iter()
            .filter(|(_, r)| r.state != RrState::Query)
            .min_by_key(|(_, r)| r.elapsed_time)
            .map(|(id, _)| id)?;
        self.delete(victim);
        Some(victim)
    }

    // Inserts a template record, or folds it into an existing match
    // (spec 4.3). Returns the slot id and whether a pre-existing record
    // was found.
    pub fn insert(&mut self, template: Record) -> Result<(RrId, bool)> {
        if let Some(id) = self.find(
            template.interface,
            template.name,
            template.rr_type(),
            template.class,
            FindMode::All,
            Some(&template.rdata),
        ) {
            // The existing record owns the canonical string references;
            // drop the template's own references before overwriting the
            // rest of its metadata.
            self.release_record_strings(&template);
            let existing = self.get_mut(id);
            let kept_name = existing.name;
            let kept_rdata = existing.rdata.clone();
            *existing = template;
            existing.name = kept_name;
            existing.rdata = kept_rdata;
            return Ok((id, true));
        }

        let id = if let Some(id) = self.free.pop() {
            self.records[id.0] = Some(template);
            id
        } else if self.records.len() < self.max_slots {
            self.records.push(Some(template));
            RrId(self.records.len() - 1)
        } else if self.kind == ArenaKind::Peer {
            if let Some(id) = self.evict_oldest() {
                self.records[id.0] = Some(template);
                id
            } else {
                return Err(MdnsError::Cache);
            }
        } else {
            return Err(MdnsError::Cache);
        };

        Ok((id, false))
    }

    pub fn delete(&mut self, id: RrId) {
        if let Some(record) = self.records[id.0].take() {
            self.release_record_strings(&record);
            self.free.push(id);
        }
    }

    pub fn live_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_alive(&self, id: RrId) -> bool {
        self.records.get(id.0).map_or(false, |slot| slot.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pool::InternMode;
    use std::net::Ipv4Addr;

    fn host_record(arena: &mut Arena, label: &str, addr: Ipv4Addr) -> Record {
        let name = arena.strings.intern(label.as_bytes(), InternMode::Name).unwrap();
        Record {
            interface: 0,
            name,
            class: DnsClass::IN,
            state: RrState::Valid,
            flags: Default::default(),
            ttl: 120,
            remaining_ticks: Some(1200),
            timer_count: 0,
            response_interval: 0,
            retransmit_count: 0,
            retransmit_lifetime: 0,
            announcing_max_time: 0,
            conflict_count: 0,
            poof_count: 0,
            response_send_flag: false,
            rdata: RdataVariant::A(addr),
            elapsed_time: 0,
            count: 0,
        }
    }

    #[test]
    fn insert_new_record_then_refresh_in_place() {
        let mut arena = Arena::new(ArenaKind::Local, 4, 16);
        let rec = host_record(&mut arena, "printer.local", Ipv4Addr::new(1, 2, 3, 4));
        let (id, present) = arena.insert(rec.clone()).unwrap();
        assert!(!present);

        let mut rec2 = host_record(&mut arena, "printer.local", Ipv4Addr::new(1, 2, 3, 4));
        rec2.ttl = 60;
        let (id2, present2) = arena.insert(rec2).unwrap();
        assert_eq!(id, id2);
        assert!(present2);
        assert_eq!(arena.get(id2).ttl, 60);
    }

    #[test]
    fn delete_releases_name_string() {
        let mut arena = Arena::new(ArenaKind::Local, 4, 16);
        let rec = host_record(&mut arena, "printer.local", Ipv4Addr::new(1, 2, 3, 4));
        let (id, _) = arena.insert(rec).unwrap();
        arena.delete(id);
        assert_eq!(arena.live_count(), 0);
        assert_eq!(arena.strings.live_count(), 0);
    }

    #[test]
    fn peer_arena_evicts_oldest_when_full() {
        let mut arena = Arena::new(ArenaKind::Peer, 1, 16);
        let mut first = host_record(&mut arena, "a.local", Ipv4Addr::new(1, 1, 1, 1));
        first.elapsed_time = 5;
        arena.insert(first).unwrap();

        let second = host_record(&mut arena, "b.local", Ipv4Addr::new(2, 2, 2, 2));
        let (id, present) = arena.insert(second).unwrap();
        assert!(!present);
        assert_eq!(arena.live_count(), 1);
        assert_eq!(arena.get(id).rdata, RdataVariant::A(Ipv4Addr::new(2, 2, 2, 2)));
    }

    #[test]
    fn local_arena_refuses_insert_when_full() {
        let mut arena = Arena::new(ArenaKind::Local, 1, 16);
        let first = host_record(&mut arena, "a.local", Ipv4Addr::new(1, 1, 1, 1));
        arena.insert(first).unwrap();
        let second = host_record(&mut arena, "b.local", Ipv4Addr::new(2, 2, 2, 2));
        assert!(arena.insert(second).is_err());
    }
}
