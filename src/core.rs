// Application core (spec 6, "Application interface (exposed)"). Owns both
// cache arenas, the timer wheel, and per-interface transports behind one
// mutex (spec 5: every entry point acquires this mutex for the duration of
// the call). `tick` folds "a timer fired" and "a packet arrived" into one
// cooperative step a caller drives explicitly, so the whole FSM is testable
// without real sleeps or sockets (spec A.4).

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::cache::{Arena, ArenaKind, FindMode, InternMode, RdataVariant, Record, RrFlags, RrId, RrState, StringId};
use crate::config::{MdnsConfig, DEFAULT_HOST_TTL_SECS, DEFAULT_SERVICE_TTL_SECS};
use crate::error::{MdnsError, Result};
use crate::interface::Interface;
use crate::notify::{
    CacheArenaKind, CacheFullNotify, NullCacheFullNotify, NullProbingNotify, NullServiceChangeNotify,
    ProbingNotify, ServiceChangeNotify, ServiceChangeState,
};
use crate::processor;
use crate::querier;
use crate::responder;
use crate::service::{self, ServiceDescriptor, ServiceInfo};
use crate::timer::TimerWheel;
use crate::transport::{MdnsSocket, UdpTransport, MDNS_GROUP_V4, MDNS_GROUP_V6, MDNS_PORT};
use crate::wire::{names, DnsClass, DnsFlags, DnsPacket, DnsQuestion, DnsRRType, DnsRecordData, DnsResourceRecord};

#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome {
    Created(ServiceInfo),
    AlreadyExists(ServiceInfo),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OneShotOutcome {
    Answer(ServiceInfo),
    AlreadyCached(ServiceInfo),
    TimedOut,
}

#[derive(Clone, Debug)]
enum WaiterAnswer {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    PtrTarget(String),
}

struct Waiter {
    id: u64,
    interface: u32,
    name: String,
    want_types: Vec<DnsRRType>,
    got: Vec<(DnsRRType, WaiterAnswer)>,
}

impl Waiter {
    fn satisfied(&self) -> bool {
        self.want_types
            .iter()
            .any(|wanted| self.got.iter().any(|(got, _)| got == wanted))
    }
}

struct CoreState {
    config: MdnsConfig,
    local: Arena,
    peer: Arena,
    timer: TimerWheel,
    interfaces: HashMap<u32, Interface>,
    rng: StdRng,
    probing_notify: Box<dyn ProbingNotify>,
    service_notify: Box<dyn ServiceChangeNotify>,
    cache_notify: Box<dyn CacheFullNotify>,
    // interface -> (host A record, host AAAA record), tracked so disable()
    // and address_change() can find the records to goodbye/replace without
    // a linear scan.
    host_records: HashMap<u32, (Option<RrId>, Option<RrId>)>,
    waiters: Vec<Waiter>,
}

/// The running mDNS core: one per host/daemon process (spec 2, "System
/// Overview"). Cheap to share across threads via `Arc` -- every method takes
/// `&self` and synchronizes internally.
pub struct Mdns {
    state: Mutex<CoreState>,
    cvar: Condvar,
    next_waiter_id: AtomicU64,
}

fn name_string(arena: &Arena, id: StringId) -> String {
    String::from_utf8_lossy(arena.strings.get(id)).into_owned()
}

impl Mdns {
    pub fn create(config: MdnsConfig) -> Result<Mdns> {
        config.validate()?;
        let local = Arena::new(
            ArenaKind::Local,
            config.local_cache_size as usize,
            (config.local_cache_size as usize) * 2,
        );
        let peer = Arena::new(
            ArenaKind::Peer,
            config.peer_cache_size as usize,
            (config.peer_cache_size as usize) * 2,
        );
        Ok(Mdns {
            state: Mutex::new(CoreState {
                config,
                local,
                peer,
                timer: TimerWheel::new(),
                interfaces: HashMap::new(),
                rng: StdRng::from_entropy(),
                probing_notify: Box::new(NullProbingNotify),
                service_notify: Box::new(NullServiceChangeNotify),
                cache_notify: Box::new(NullCacheFullNotify),
                host_records: HashMap::new(),
                waiters: Vec::new(),
            }),
            cvar: Condvar::new(),
            next_waiter_id: AtomicU64::new(1),
        })
    }

    pub fn set_probing_notify(&self, callback: impl ProbingNotify + 'static) {
        self.state.lock().unwrap().probing_notify = Box::new(callback);
    }

    pub fn set_service_change_notify(&self, callback: impl ServiceChangeNotify + 'static) {
        self.state.lock().unwrap().service_notify = Box::new(callback);
    }

    pub fn set_cache_full_notify(&self, callback: impl CacheFullNotify + 'static) {
        self.state.lock().unwrap().cache_notify = Box::new(callback);
    }

    // Binds real sockets for `interface` and registers the host's A/AAAA
    // records (spec 6, "Lifecycle"). `ipv6` carries the scope/interface
    // index multicast join needs alongside the address itself.
    pub fn enable(&self, interface: u32, ipv4: Option<Ipv4Addr>, ipv6: Option<(Ipv6Addr, u32)>) -> Result<()> {
        let mut transports: Vec<Box<dyn MdnsSocket>> = Vec::new();
        if let Some(addr) = ipv4 {
            transports.push(Box::new(UdpTransport::bind_ipv4(addr)?));
        }
        if ipv6.is_some() {
            let (_, scope) = ipv6.unwrap();
            transports.push(Box::new(UdpTransport::bind_ipv6(scope)?));
        }
        self.enable_with_transports(interface, ipv4, ipv6.map(|(addr, _)| addr), transports)
    }

    // Same as `enable`, but the caller supplies the transports directly --
    // the seam tests use to swap in an in-memory `MdnsSocket` (spec A.4).
    pub fn enable_with_transports(
        &self,
        interface: u32,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
        transports: Vec<Box<dyn MdnsSocket>>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.interfaces.contains_key(&interface) {
            return Err(MdnsError::AlreadyEnabled);
        }
        state.interfaces.insert(interface, Interface::new(interface, ipv4, ipv6, transports));

        let host_fqdn = service::host_fqdn(&state.config.host_name.clone(), &state.config.domain_name.clone());
        let mut a_id = None;
        let mut aaaa_id = None;
        if let Some(addr) = ipv4 {
            a_id = Some(insert_host_record(&mut state, interface, &host_fqdn, RdataVariant::A(addr))?);
        }
        if let Some(addr) = ipv6 {
            aaaa_id = Some(insert_host_record(&mut state, interface, &host_fqdn, RdataVariant::Aaaa(addr))?);
        }
        state.host_records.insert(interface, (a_id, aaaa_id));

        if let Some(id) = a_id {
            let CoreState { ref mut local, ref config, ref mut rng, .. } = *state;
            responder::enable(local, id, config, rng);
        }
        if let Some(id) = aaaa_id {
            let CoreState { ref mut local, ref config, ref mut rng, .. } = *state;
            responder::enable(local, id, config, rng);
        }
        info!("interface {} enabled", interface);
        Ok(())
    }

    // Goodbyes every local record on the interface and drops its sockets
    // (spec 6, "Lifecycle").
    pub fn disable(&self, interface: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.interfaces.contains_key(&interface) {
            return Err(MdnsError::NotEnabled);
        }
        goodbye_interface_records(&mut state, interface);
        state.host_records.remove(&interface);
        state.interfaces.remove(&interface);
        info!("interface {} disabled", interface);
        Ok(())
    }

    // Spec 6: "domain_name_set" is only legal before any local record
    // exists, since every authoritative name already carries the old
    // domain suffix baked in.
    pub fn domain_name_set(&self, domain_name: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.local.live_count() > 0 {
            return Err(MdnsError::Param);
        }
        let domain_name = domain_name.into();
        if domain_name.is_empty() {
            return Err(MdnsError::Param);
        }
        state.config.domain_name = domain_name;
        Ok(())
    }

    // Sends one goodbye (TTL=0) packet per local record across every
    // enabled interface and clears them immediately (spec 6,
    // "local_cache_clear"): unlike a single record's ordinary Goodbye FSM
    // path, this does not wait out the usual retransmit schedule, since the
    // caller is asking for the cache to be empty now, not eventually.
    pub fn local_cache_clear(&self) {
        let mut state = self.state.lock().unwrap();
        let interfaces: Vec<u32> = state.interfaces.keys().copied().collect();
        for interface in interfaces {
            goodbye_interface_records(&mut state, interface);
        }
    }

    // Zeroes the peer arena with no network side effect (spec 6,
    // "peer_cache_clear"): we simply stop claiming to know things, we never
    // announce their disappearance since we never owned them.
    pub fn peer_cache_clear(&self) {
        let mut state = self.state.lock().unwrap();
        let size = state.config.peer_cache_size as usize;
        state.peer = Arena::new(ArenaKind::Peer, size, size * 2);
    }

    // Registers a service instance (spec 6, "service_add"). Returns
    // `AlreadyExists` rather than an error when the identical instance is
    // already registered, matching the original's "informative non-error"
    // EXIST_SAME_SERVICE outcome.
    pub fn service_add(&self, descriptor: ServiceDescriptor) -> Result<AddOutcome> {
        if descriptor.instance_name.is_empty() || descriptor.service_type.is_empty() {
            return Err(MdnsError::Param);
        }
        let mut state = self.state.lock().unwrap();
        if !state.interfaces.contains_key(&descriptor.interface) {
            return Err(MdnsError::NotEnabled);
        }

        let domain = state.config.domain_name.clone();
        let host = service::host_fqdn(&state.config.host_name.clone(), &domain);
        let type_domain = service::type_domain(&descriptor.service_type, &domain);
        let instance = service::instance_fqdn(&descriptor.instance_name, &descriptor.service_type, &domain);

        if let Some(target_id) = state.local.strings.find(instance.as_bytes(), InternMode::Name) {
            if let Some(existing_ptr) = find_ptr_by_target(&state.local, descriptor.interface, &type_domain, target_id) {
                let info = resolve_instance(&state.local, existing_ptr, &domain, &descriptor.service_type);
                return Ok(AddOutcome::AlreadyExists(info));
            }
        }

        let ttl = if descriptor.ttl == 0 { DEFAULT_SERVICE_TTL_SECS } else { descriptor.ttl };

        let ptr_name = intern_local(&mut state, type_domain.as_bytes(), InternMode::Name)?;
        let ptr_target = intern_local(&mut state, instance.as_bytes(), InternMode::Name)?;
        let ptr_id = insert_authoritative(
            &mut state,
            descriptor.interface,
            ptr_name,
            RdataVariant::Ptr(ptr_target),
            ttl,
            false,
        )?;
        enable_record(&mut state, ptr_id);

        let srv_name = intern_local(&mut state, instance.as_bytes(), InternMode::Name)?;
        let srv_target = intern_local(&mut state, host.as_bytes(), InternMode::Name)?;
        let srv_id = insert_authoritative(
            &mut state,
            descriptor.interface,
            srv_name,
            RdataVariant::Srv {
                priority: descriptor.priority,
                weight: descriptor.weight,
                port: descriptor.port,
                target: srv_target,
            },
            ttl,
            descriptor.unique,
        )?;
        enable_record(&mut state, srv_id);

        let txt_name = intern_local(&mut state, instance.as_bytes(), InternMode::Name)?;
        let txt_blob = service::encode_txt(&descriptor.txt);
        let txt_value = intern_local(&mut state, txt_blob.as_bytes(), InternMode::Blob)?;
        let txt_id = insert_authoritative(
            &mut state,
            descriptor.interface,
            txt_name,
            RdataVariant::Txt(txt_value),
            ttl,
            descriptor.unique,
        )?;
        enable_record(&mut state, txt_id);

        if let Some(subtype) = &descriptor.subtype {
            let subtype_name_str = service::subtype_ptr_name(subtype, &descriptor.service_type, &domain);
            let subtype_name = intern_local(&mut state, subtype_name_str.as_bytes(), InternMode::Name)?;
            let subtype_target = intern_local(&mut state, instance.as_bytes(), InternMode::Name)?;
            let subtype_id = insert_authoritative(
                &mut state,
                descriptor.interface,
                subtype_name,
                RdataVariant::Ptr(subtype_target),
                ttl,
                false,
            )?;
            enable_record(&mut state, subtype_id);
        }

        bump_meta_ptr(&mut state, descriptor.interface, &domain, &type_domain)?;

        info!("service registered: {}", instance);
        let info = ServiceInfo {
            name: descriptor.instance_name.clone(),
            service_type: descriptor.service_type.clone(),
            domain,
            host,
            port: descriptor.port,
            priority: descriptor.priority,
            weight: descriptor.weight,
            txt: descriptor.txt.clone(),
            ipv4: None,
            ipv6: None,
        };
        Ok(AddOutcome::Created(info))
    }

    // Withdraws a previously registered service instance (spec 6,
    // "service_delete"). Every record walks its own Goodbye path; nothing
    // is torn down synchronously.
    pub fn service_delete(
        &self,
        interface: u32,
        instance_name: &str,
        service_type: &str,
        subtype: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let domain = state.config.domain_name.clone();
        let instance = service::instance_fqdn(instance_name, service_type, &domain);
        let Some(instance_id) = state.local.strings.find(instance.as_bytes(), InternMode::Name) else {
            return Err(MdnsError::NoRr);
        };

        let ids: Vec<RrId> = state
            .local
            .iter()
            .filter(|(_, r)| r.interface == interface && r.name == instance_id)
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Err(MdnsError::NoRr);
        }
        for id in ids {
            responder::goodbye(&mut state.local, id, &state.config, true);
        }

        if let Some(subtype) = subtype {
            let subtype_name_str = service::subtype_ptr_name(subtype, service_type, &domain);
            if let Some(subtype_name) = state.local.strings.find(subtype_name_str.as_bytes(), InternMode::Name) {
                if let Some(id) = state.local.find(interface, subtype_name, DnsRRType::PTR, DnsClass::IN, FindMode::ExceptRdata, None) {
                    responder::goodbye(&mut state.local, id, &state.config, true);
                }
            }
        }

        let type_domain = service::type_domain(service_type, &domain);
        if let Some(ptr_id) = find_ptr_by_target(&state.local, interface, &type_domain, instance_id) {
            responder::goodbye(&mut state.local, ptr_id, &state.config, true);
        }

        release_meta_ptr(&mut state, interface, &domain, &type_domain);
        Ok(())
    }

    // Starts (or notes as already running) a continuous query for
    // `(name, rr_type)` on `interface` (spec 6, "service_continuous_query").
    pub fn service_continuous_query(&self, interface: u32, name: &str, rr_type: DnsRRType) -> Result<QueryStartOutcome> {
        let mut state = self.state.lock().unwrap();
        if find_active_query(&state.peer, interface, name, rr_type).is_some() {
            return Ok(QueryStartOutcome::AlreadyRunning);
        }
        start_query_record(&mut state, interface, name, rr_type, true)?;
        Ok(QueryStartOutcome::Started)
    }

    pub fn service_query_stop(&self, interface: u32, name: &str, rr_type: DnsRRType) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(id) = find_active_query(&state.peer, interface, name, rr_type) else {
            return Err(MdnsError::NoRr);
        };
        state.peer.delete(id);
        Ok(())
    }

    // One-shot query (spec 6, "service_one_shot_query"): returns
    // immediately if the answer is already cached, otherwise blocks the
    // calling thread (releasing the core lock while waiting) until an
    // answer arrives or `timeout` elapses.
    pub fn service_one_shot_query(
        &self,
        interface: u32,
        name: &str,
        rr_type: DnsRRType,
        timeout: Duration,
    ) -> Result<OneShotOutcome> {
        {
            let state = self.state.lock().unwrap();
            if let Some(existing) = find_valid_answer(&state.peer, interface, name, rr_type) {
                let domain = state.config.domain_name.clone();
                let info = resolve_instance(&state.peer, existing, &domain, "");
                return Ok(OneShotOutcome::AlreadyCached(info));
            }
        }

        let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().unwrap();
            state.waiters.push(Waiter {
                id: waiter_id,
                interface,
                name: name.to_owned(),
                want_types: vec![rr_type],
                got: Vec::new(),
            });
            start_query_record(&mut state, interface, name, rr_type, false)?;
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(waiter) = state.waiters.iter().find(|w| w.id == waiter_id) {
                if waiter.satisfied() {
                    let domain = state.config.domain_name.clone();
                    let info = waiter_to_service_info(waiter, &domain);
                    state.waiters.retain(|w| w.id != waiter_id);
                    return Ok(OneShotOutcome::Answer(info));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                state.waiters.retain(|w| w.id != waiter_id);
                return Ok(OneShotOutcome::TimedOut);
            }
            let (guard, _) = self.cvar.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    // Resolves an already-learned (or freshly discovered) service instance
    // from the peer cache by position (spec 6, "service_lookup"); callers
    // iterate by bumping `index` until `NoMoreEntries`.
    pub fn service_lookup(&self, service_type: &str, domain: &str, index: usize) -> Result<ServiceInfo> {
        let state = self.state.lock().unwrap();
        let type_domain = service::type_domain(service_type, domain);
        let Some(name_id) = state.peer.strings.find(type_domain.as_bytes(), InternMode::Name) else {
            return Err(MdnsError::NoMoreEntries);
        };
        let mut ptrs: Vec<RrId> = state
            .peer
            .iter()
            .filter(|(_, r)| r.name == name_id && r.rr_type() == DnsRRType::PTR && r.state == RrState::Valid)
            .map(|(id, _)| id)
            .collect();
        ptrs.sort_by_key(|id| id.0);
        let Some(&ptr_id) = ptrs.get(index) else {
            return Err(MdnsError::NoMoreEntries);
        };
        Ok(resolve_instance(&state.peer, ptr_id, domain, service_type))
    }

    // Resolves a host name to its A/AAAA address(es) (spec 6,
    // "host_address_get"). Returns whichever family resolves first, and
    // both if they both arrive before `timeout`.
    pub fn host_address_get(
        &self,
        interface: u32,
        host_name: &str,
        timeout: Duration,
    ) -> Result<(Option<Ipv4Addr>, Option<Ipv6Addr>)> {
        let fqdn = {
            let state = self.state.lock().unwrap();
            service::host_fqdn(host_name, &state.config.domain_name.clone())
        };

        {
            let state = self.state.lock().unwrap();
            let cached_v4 = find_valid_answer(&state.peer, interface, &fqdn, DnsRRType::A)
                .map(|id| ipv4_of(&state.peer, id));
            let cached_v6 = find_valid_answer(&state.peer, interface, &fqdn, DnsRRType::AAAA)
                .map(|id| ipv6_of(&state.peer, id));
            if cached_v4.is_some() || cached_v6.is_some() {
                return Ok((cached_v4, cached_v6));
            }
        }

        let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock().unwrap();
            state.waiters.push(Waiter {
                id: waiter_id,
                interface,
                name: fqdn.clone(),
                want_types: vec![DnsRRType::A, DnsRRType::AAAA],
                got: Vec::new(),
            });
            start_query_record(&mut state, interface, &fqdn, DnsRRType::A, false)?;
            start_query_record(&mut state, interface, &fqdn, DnsRRType::AAAA, false)?;
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(waiter) = state.waiters.iter().find(|w| w.id == waiter_id) {
                if waiter.satisfied() {
                    let mut ipv4 = None;
                    let mut ipv6 = None;
                    for (_, answer) in &waiter.got {
                        match answer {
                            WaiterAnswer::Ipv4(ip) => ipv4 = Some(*ip),
                            WaiterAnswer::Ipv6(ip) => ipv6 = Some(*ip),
                            WaiterAnswer::PtrTarget(_) => {}
                        }
                    }
                    state.waiters.retain(|w| w.id != waiter_id);
                    return Ok((ipv4, ipv6));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                state.waiters.retain(|w| w.id != waiter_id);
                return Ok((None, None));
            }
            let (guard, _) = self.cvar.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    // Handles an interface's address changing underneath us (spec 6,
    // "ADDRESS_CHANGE"): goodbye the old host record, register and probe a
    // fresh one at the new address.
    pub fn address_change(&self, interface: u32, ipv4: Option<Ipv4Addr>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.interfaces.contains_key(&interface) {
            return Err(MdnsError::NotEnabled);
        }
        let old_ids = state.host_records.get(&interface).copied().unwrap_or((None, None));
        if let Some(id) = old_ids.0 {
            if state.local.is_alive(id) {
                responder::goodbye(&mut state.local, id, &state.config, false);
            }
        }

        if let Some(addr) = ipv4 {
            if let Some(iface_state) = state.interfaces.get_mut(&interface) {
                iface_state.ipv4 = Some(addr);
            }
            let domain = state.config.domain_name.clone();
            let host_name = state.config.host_name.clone();
            let fqdn = service::host_fqdn(&host_name, &domain);
            let new_id = insert_host_record(&mut state, interface, &fqdn, RdataVariant::A(addr))?;
            state.host_records.insert(interface, (Some(new_id), old_ids.1));
            enable_record(&mut state, new_id);
        }
        Ok(())
    }

    // Advances the FSMs by `elapsed` and drains any pending datagrams.
    // Deterministic and sleep-free: tests fast-forward by passing large
    // `Duration`s directly instead of waiting on a real clock (spec A.4).
    pub fn tick(&self, elapsed: Duration) {
        let mut state = self.state.lock().unwrap();
        drain_packets(&mut state);
        let ticks = (elapsed.as_secs_f64() * state.config.periodic_rate as f64).round() as u32;
        advance_timers(&mut state, ticks);
        drop(state);
        self.cvar.notify_all();
    }

    // Runs `tick` in a loop on a background thread until `shutdown` is set
    // (spec 6, "Concurrency model"). For real daemon use; tests drive
    // `tick` directly instead.
    pub fn spawn_worker(self: std::sync::Arc<Self>, shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let tick_interval = Duration::from_millis(100);
            while !shutdown.load(Ordering::Relaxed) {
                self.tick(tick_interval);
                std::thread::sleep(tick_interval);
            }
        })
    }
}

// Interns into the local string pool, firing the cache-full notification
// (spec 6) with the pool's current pressure if it is already at capacity.
fn intern_local(state: &mut CoreState, bytes: &[u8], mode: InternMode) -> Result<StringId> {
    match state.local.strings.intern(bytes, mode) {
        Ok(id) => Ok(id),
        Err(e) => {
            state.cache_notify.notify(state.local.strings.pressure(), CacheArenaKind::Local);
            Err(e)
        }
    }
}

fn insert_host_record(state: &mut CoreState, interface: u32, fqdn: &str, rdata: RdataVariant) -> Result<RrId> {
    let name = intern_local(state, fqdn.as_bytes(), InternMode::Name)?;
    insert_authoritative(state, interface, name, rdata, DEFAULT_HOST_TTL_SECS, true)
}

fn insert_authoritative(
    state: &mut CoreState,
    interface: u32,
    name: StringId,
    rdata: RdataVariant,
    ttl: u32,
    unique: bool,
) -> Result<RrId> {
    let record = Record {
        interface,
        name,
        class: DnsClass::IN,
        state: RrState::Invalid,
        flags: RrFlags { unique, ..Default::default() },
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
        rdata,
        elapsed_time: 0,
        count: 0,
    };
    match state.local.insert(record) {
        Ok((id, _)) => Ok(id),
        Err(e) => {
            state.cache_notify.notify(state.local.strings.pressure(), CacheArenaKind::Local);
            Err(e)
        }
    }
}

fn enable_record(state: &mut CoreState, id: RrId) {
    if state.local.get(id).state == RrState::Invalid {
        let CoreState { ref mut local, ref config, ref mut rng, .. } = *state;
        responder::enable(local, id, config, rng);
    }
}

fn find_ptr_by_target(local: &Arena, interface: u32, type_domain: &str, target: StringId) -> Option<RrId> {
    let name_id = local.strings.find(type_domain.as_bytes(), InternMode::Name)?;
    local.find(interface, name_id, DnsRRType::PTR, DnsClass::IN, FindMode::All, Some(&RdataVariant::Ptr(target)))
}

fn find_active_query(peer: &Arena, interface: u32, name: &str, rr_type: DnsRRType) -> Option<RrId> {
    let name_id = peer.strings.find(name.as_bytes(), InternMode::Name)?;
    peer.iter()
        .find(|(_, r)| r.interface == interface && r.name == name_id && r.rr_type() == rr_type && r.state == RrState::Query)
        .map(|(id, _)| id)
}

fn find_valid_answer(peer: &Arena, interface: u32, name: &str, rr_type: DnsRRType) -> Option<RrId> {
    let name_id = peer.strings.find(name.as_bytes(), InternMode::Name)?;
    peer.iter()
        .find(|(_, r)| r.interface == interface && r.name == name_id && r.rr_type() == rr_type && r.state == RrState::Valid)
        .map(|(id, _)| id)
}

fn ipv4_of(arena: &Arena, id: RrId) -> Ipv4Addr {
    match &arena.get(id).rdata {
        RdataVariant::A(ip) => *ip,
        _ => Ipv4Addr::UNSPECIFIED,
    }
}

fn ipv6_of(arena: &Arena, id: RrId) -> Ipv6Addr {
    match &arena.get(id).rdata {
        RdataVariant::Aaaa(ip) => *ip,
        _ => Ipv6Addr::UNSPECIFIED,
    }
}

// A placeholder record representing an outstanding query descriptor (spec
// 4.6: "the query itself is held as a peer-arena RR"). Its rdata is never
// inspected; only (interface, name, type, class) identify it.
fn placeholder_rdata(peer: &mut Arena, rr_type: DnsRRType) -> Result<RdataVariant> {
    Ok(match rr_type {
        DnsRRType::A => RdataVariant::A(Ipv4Addr::UNSPECIFIED),
        DnsRRType::AAAA => RdataVariant::Aaaa(Ipv6Addr::UNSPECIFIED),
        DnsRRType::SRV => RdataVariant::Srv {
            priority: 0,
            weight: 0,
            port: 0,
            target: peer.strings.intern(b"", InternMode::Name)?,
        },
        DnsRRType::TXT => RdataVariant::Txt(peer.strings.intern(b"", InternMode::Blob)?),
        _ => RdataVariant::Ptr(peer.strings.intern(b"", InternMode::Name)?),
    })
}

fn start_query_record(state: &mut CoreState, interface: u32, name: &str, rr_type: DnsRRType, continuous: bool) -> Result<RrId> {
    let name_id = match state.peer.strings.intern(name.as_bytes(), InternMode::Name) {
        Ok(id) => id,
        Err(e) => {
            state.cache_notify.notify(state.peer.strings.pressure(), CacheArenaKind::Peer);
            return Err(e);
        }
    };
    let rdata = match placeholder_rdata(&mut state.peer, rr_type) {
        Ok(rdata) => rdata,
        Err(e) => {
            state.cache_notify.notify(state.peer.strings.pressure(), CacheArenaKind::Peer);
            return Err(e);
        }
    };
    let record = Record {
        interface,
        name: name_id,
        class: DnsClass::IN,
        state: RrState::Invalid,
        flags: RrFlags { peer: true, continuous_query: continuous, ..Default::default() },
        ttl: 0,
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
    };
    let id = match state.peer.insert(record) {
        Ok((id, _)) => id,
        Err(e) => {
            state.cache_notify.notify(state.peer.strings.pressure(), CacheArenaKind::Peer);
            return Err(e);
        }
    };
    let CoreState { ref mut peer, ref config, ref mut rng, .. } = *state;
    querier::start_query(peer, id, config, continuous, rng);
    Ok(id)
}

// Reconstructs a user-facing `ServiceInfo` from a PTR record by walking its
// target's SRV/TXT/A/AAAA siblings (spec 6, "service_lookup"). Works
// against either arena: the local arena for `service_add`'s dedup check,
// the peer arena for a real lookup of a remote service.
fn resolve_instance(arena: &Arena, ptr_id: RrId, domain: &str, service_type: &str) -> ServiceInfo {
    let record = arena.get(ptr_id);
    let interface = record.interface;
    let target = match &record.rdata {
        RdataVariant::Ptr(t) => *t,
        _ => {
            return ServiceInfo {
                name: String::new(),
                service_type: service_type.to_owned(),
                domain: domain.to_owned(),
                host: String::new(),
                port: 0,
                priority: 0,
                weight: 0,
                txt: Vec::new(),
                ipv4: None,
                ipv6: None,
            }
        }
    };
    let instance_full = name_string(arena, target);
    let instance_name = instance_full.split('.').next().unwrap_or("").to_owned();

    let mut port = 0;
    let mut priority = 0;
    let mut weight = 0;
    let mut host = String::new();
    let mut txt = Vec::new();
    let mut host_id = None;
    for (_, r) in arena.iter() {
        if r.interface != interface || r.name != target {
            continue;
        }
        match &r.rdata {
            RdataVariant::Srv { priority: p, weight: w, port: pt, target: h } => {
                priority = *p;
                weight = *w;
                port = *pt;
                host = name_string(arena, *h);
                host_id = Some(*h);
            }
            RdataVariant::Txt(blob) => {
                txt = service::decode_txt(&String::from_utf8_lossy(arena.strings.get(*blob)));
            }
            _ => {}
        }
    }

    let mut ipv4 = None;
    let mut ipv6 = None;
    if let Some(h) = host_id {
        for (_, r) in arena.iter() {
            if r.interface != interface || r.name != h {
                continue;
            }
            match &r.rdata {
                RdataVariant::A(ip) => ipv4 = Some(*ip),
                RdataVariant::Aaaa(ip) => ipv6 = Some(*ip),
                _ => {}
            }
        }
    }

    ServiceInfo {
        name: instance_name,
        service_type: service_type.to_owned(),
        domain: domain.to_owned(),
        host,
        port,
        priority,
        weight,
        txt,
        ipv4,
        ipv6,
    }
}

fn waiter_to_service_info(waiter: &Waiter, domain: &str) -> ServiceInfo {
    let mut info = ServiceInfo {
        name: waiter.name.clone(),
        service_type: String::new(),
        domain: domain.to_owned(),
        host: String::new(),
        port: 0,
        priority: 0,
        weight: 0,
        txt: Vec::new(),
        ipv4: None,
        ipv6: None,
    };
    for (_, answer) in &waiter.got {
        match answer {
            WaiterAnswer::Ipv4(ip) => info.ipv4 = Some(*ip),
            WaiterAnswer::Ipv6(ip) => info.ipv6 = Some(*ip),
            WaiterAnswer::PtrTarget(target) => info.host = target.clone(),
        }
    }
    info
}

// Increments the meta-PTR refcount (spec 4.3, "special case"), creating the
// `_services._dns-sd._udp.<domain>` record the first time a type is seen on
// an interface.
fn bump_meta_ptr(state: &mut CoreState, interface: u32, domain: &str, type_domain: &str) -> Result<()> {
    let meta_name_str = service::meta_services_name(domain);
    let meta_name = intern_local(state, meta_name_str.as_bytes(), InternMode::Name)?;
    let target = intern_local(state, type_domain.as_bytes(), InternMode::Name)?;
    if let Some(id) = state.local.find(interface, meta_name, DnsRRType::PTR, DnsClass::IN, FindMode::All, Some(&RdataVariant::Ptr(target))) {
        state.local.get_mut(id).count += 1;
        state.local.strings.release(meta_name);
        state.local.strings.release(target);
        return Ok(());
    }
    let id = insert_authoritative(state, interface, meta_name, RdataVariant::Ptr(target), DEFAULT_SERVICE_TTL_SECS, false)?;
    state.local.get_mut(id).count = 1;
    enable_record(state, id);
    Ok(())
}

// Decrements the meta-PTR refcount, goodbyeing it once the last service of
// that type is withdrawn.
fn release_meta_ptr(state: &mut CoreState, interface: u32, domain: &str, type_domain: &str) {
    let meta_name_str = service::meta_services_name(domain);
    let Some(meta_name) = state.local.strings.find(meta_name_str.as_bytes(), InternMode::Name) else {
        return;
    };
    let Some(target) = state.local.strings.find(type_domain.as_bytes(), InternMode::Name) else {
        return;
    };
    if let Some(id) = state.local.find(interface, meta_name, DnsRRType::PTR, DnsClass::IN, FindMode::All, Some(&RdataVariant::Ptr(target))) {
        let remaining = {
            let record = state.local.get_mut(id);
            record.count = record.count.saturating_sub(1);
            record.count
        };
        if remaining == 0 {
            responder::goodbye(&mut state.local, id, &state.config, true);
        }
    }
}

fn goodbye_interface_records(state: &mut CoreState, interface: u32) {
    let ids: Vec<RrId> = state
        .local
        .iter()
        .filter(|(_, r)| r.interface == interface && r.state != RrState::Invalid)
        .map(|(id, _)| id)
        .collect();
    for id in ids {
        responder::goodbye(&mut state.local, id, &state.config, true);
        if let Some(packet) = build_goodbye_packet(&state.local, id) {
            send_multicast(&state.interfaces, interface, &packet);
        }
        state.local.delete(id);
    }
}

fn build_goodbye_packet(local: &Arena, id: RrId) -> Option<DnsPacket> {
    if !local.is_alive(id) {
        return None;
    }
    Some(build_announce_packet(local, id))
}

// Finds the records spec 4.5's "Additional records" rule attaches to an
// answer: SRV/TXT for a PTR's target, A/AAAA for an SRV's target, the
// sibling address family for an A/AAAA answer.
fn additional_records(local: &Arena, id: RrId) -> Vec<RrId> {
    let record = local.get(id);
    let interface = record.interface;
    let name = record.name;
    match &record.rdata {
        RdataVariant::Ptr(target) => local
            .iter()
            .filter(|(_, r)| r.interface == interface && r.name == *target && matches!(r.rr_type(), DnsRRType::SRV | DnsRRType::TXT))
            .map(|(id, _)| id)
            .collect(),
        RdataVariant::Srv { target, .. } => local
            .iter()
            .filter(|(_, r)| r.interface == interface && r.name == *target && matches!(r.rr_type(), DnsRRType::A | DnsRRType::AAAA))
            .map(|(id, _)| id)
            .collect(),
        RdataVariant::A(_) => local
            .iter()
            .filter(|(other, r)| *other != id && r.interface == interface && r.name == name && r.rr_type() == DnsRRType::AAAA)
            .map(|(id, _)| id)
            .collect(),
        RdataVariant::Aaaa(_) => local
            .iter()
            .filter(|(other, r)| *other != id && r.interface == interface && r.name == name && r.rr_type() == DnsRRType::A)
            .map(|(id, _)| id)
            .collect(),
        _ => Vec::new(),
    }
}

fn rdata_to_wire(arena: &Arena, rdata: &RdataVariant) -> DnsRecordData {
    match rdata {
        RdataVariant::A(ip) => DnsRecordData::A(*ip),
        RdataVariant::Aaaa(ip) => DnsRecordData::AAAA(*ip),
        RdataVariant::Ptr(s) => DnsRecordData::PTR(names::labels_from_str(&name_string(arena, *s))),
        RdataVariant::Srv { priority, weight, port, target } => DnsRecordData::SRV {
            priority: *priority,
            weight: *weight,
            port: *port,
            target: names::labels_from_str(&name_string(arena, *target)),
        },
        RdataVariant::Txt(s) => DnsRecordData::TXT(name_string(arena, *s)),
        RdataVariant::Nsec { next_name, window, bitmap } => DnsRecordData::NSEC {
            next_name: names::labels_from_str(&name_string(arena, *next_name)),
            window: *window,
            bitmap: bitmap.clone(),
        },
    }
}

fn rr_to_wire(arena: &Arena, id: RrId) -> DnsResourceRecord {
    let record = arena.get(id);
    DnsResourceRecord {
        name: names::labels_from_str(&name_string(arena, record.name)),
        class: record.class,
        cache_flush: record.flags.unique,
        ttl: record.ttl,
        rdata: rdata_to_wire(arena, &record.rdata),
    }
}

fn build_probe_packet(local: &Arena, id: RrId) -> DnsPacket {
    let record = local.get(id);
    let qname = names::labels_from_str(&name_string(local, record.name));
    let question = DnsQuestion { qname, qtype: DnsRRType::ANY, qclass: DnsClass::IN, unicast_response: false };
    let authority: Vec<DnsResourceRecord> = local
        .iter()
        .filter(|(_, r)| r.interface == record.interface && r.name == record.name && r.state == RrState::Probing)
        .map(|(other_id, _)| rr_to_wire(local, other_id))
        .collect();
    DnsPacket {
        id: 0,
        flags: DnsFlags::query(),
        questions: vec![question],
        answers: Vec::new(),
        nameservers: authority,
        addl_recs: Vec::new(),
    }
}

fn build_announce_packet(local: &Arena, id: RrId) -> DnsPacket {
    let addl: Vec<DnsResourceRecord> = additional_records(local, id).into_iter().map(|aid| rr_to_wire(local, aid)).collect();
    DnsPacket {
        id: 0,
        flags: DnsFlags::response(false),
        questions: Vec::new(),
        answers: vec![rr_to_wire(local, id)],
        nameservers: Vec::new(),
        addl_recs: addl,
    }
}

fn build_refresh_query_packet(peer: &Arena, id: RrId) -> DnsPacket {
    let record = peer.get(id);
    let qname = names::labels_from_str(&name_string(peer, record.name));
    let question = DnsQuestion { qname, qtype: record.rr_type(), qclass: DnsClass::IN, unicast_response: false };
    DnsPacket {
        id: 0,
        flags: DnsFlags::query(),
        questions: vec![question],
        answers: Vec::new(),
        nameservers: Vec::new(),
        addl_recs: Vec::new(),
    }
}

// Builds an outgoing query for a Query-state descriptor record, with known
// answers from both arenas folded into the Answer section (spec 4.6).
fn build_query_packet(peer: &Arena, local: &Arena, id: RrId, periodic_rate: u32) -> DnsPacket {
    let record = peer.get(id);
    let qtype = record.rr_type();
    let qname = names::labels_from_str(&name_string(peer, record.name));
    let question = DnsQuestion { qname, qtype, qclass: DnsClass::IN, unicast_response: false };

    let mut answers = Vec::new();
    for known_id in querier::collect_known_answers(peer, record.interface, record.name, qtype, DnsClass::IN, periodic_rate) {
        if known_id != id {
            answers.push(rr_to_wire(peer, known_id));
        }
    }
    if let Some(local_name) = local.strings.find(peer.strings.get(record.name), InternMode::Name) {
        for known_id in querier::collect_known_answers(local, record.interface, local_name, qtype, DnsClass::IN, periodic_rate) {
            answers.push(rr_to_wire(local, known_id));
        }
    }

    DnsPacket {
        id: 0,
        flags: DnsFlags::query(),
        questions: vec![question],
        answers,
        nameservers: Vec::new(),
        addl_recs: Vec::new(),
    }
}

fn send_multicast(interfaces: &HashMap<u32, Interface>, interface: u32, packet: &DnsPacket) {
    let Some(iface) = interfaces.get(&interface) else {
        return;
    };
    let bytes = match packet.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to encode outgoing mDNS packet: {}", e);
            return;
        }
    };
    for transport in &iface.transports {
        if iface.ipv4.is_some() {
            let _ = transport.send_to(&bytes, (MDNS_GROUP_V4, MDNS_PORT).into());
        }
        if iface.ipv6.is_some() {
            let _ = transport.send_to(&bytes, (MDNS_GROUP_V6, MDNS_PORT).into());
        }
    }
}

// Derives the service-type mask bit for an ingested answer (spec 6,
// "service_ignore_mask"/"service_notify_mask"). A PTR's owner name is
// `<type>.<domain>`; an SRV/TXT's is `<instance>.<type>.<domain>`. Either
// way the type is the trailing pair of underscore-prefixed labels. Plain
// host A/AAAA records carry no service type and are never masked.
fn service_type_bit_for_answer(answer: &DnsResourceRecord) -> u32 {
    let underscored: Vec<&String> = answer.name.iter().filter(|l| l.starts_with('_')).collect();
    if underscored.len() >= 2 {
        let service_type = format!("{}.{}", underscored[underscored.len() - 2], underscored[underscored.len() - 1]);
        service::service_type_bit(&service_type)
    } else {
        0
    }
}

fn drain_packets(state: &mut CoreState) {
    let interface_ids: Vec<u32> = state.interfaces.keys().copied().collect();
    for interface in interface_ids {
        for _ in 0..256 {
            let datagram = {
                let Some(iface) = state.interfaces.get(&interface) else { break };
                let mut received = None;
                for transport in &iface.transports {
                    match transport.recv() {
                        Ok(Some(d)) => {
                            received = Some(d);
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => warn!("transport recv error on interface {}: {}", interface, e),
                    }
                }
                received
            };
            match datagram {
                Some(d) => handle_datagram(state, interface, d),
                None => break,
            }
        }
    }
}

fn handle_datagram(state: &mut CoreState, interface: u32, datagram: crate::transport::ReceivedDatagram) {
    let packet = match DnsPacket::from_bytes(&datagram.bytes) {
        Ok(p) => p,
        Err(e) => {
            debug!("dropping malformed mDNS packet from {}: {}", datagram.src, e);
            return;
        }
    };
    if let Err(rejection) = processor::gate_source(datagram.src, &packet) {
        debug!("dropping packet from {}: {}", datagram.src, rejection);
        return;
    }

    if !packet.flags.qr_bit {
        for question in &packet.questions {
            processor::handle_question(
                &mut state.local,
                &mut state.peer,
                &state.config,
                interface,
                question,
                packet.flags.tc_bit,
                &mut *state.cache_notify,
                &mut state.rng,
            );
            mark_duplicate_questions(state, interface, question);
        }
        for answer in &packet.answers {
            processor::suppress_duplicate_answer(&mut state.local, interface, answer, &mut *state.cache_notify);
        }
    } else {
        for answer in &packet.answers {
            processor::check_responder_conflict(&mut state.local, &state.config, interface, answer, &mut *state.cache_notify, &mut state.rng);
            processor::suppress_duplicate_answer(&mut state.local, interface, answer, &mut *state.cache_notify);
            processor::rescue_stale_peer_copy(
                &mut state.local,
                &state.config,
                interface,
                answer,
                &mut *state.cache_notify,
                &mut state.rng,
            );
            let type_bit = service_type_bit_for_answer(answer);
            processor::ingest_answer(
                &mut state.peer,
                &state.config,
                interface,
                answer,
                type_bit,
                &mut *state.service_notify,
                &mut *state.cache_notify,
                &mut state.rng,
            );
            wake_waiters(state, interface, answer);
        }
    }
}

fn mark_duplicate_questions(state: &mut CoreState, interface: u32, question: &DnsQuestion) {
    if question.unicast_response {
        return;
    }
    let qname = names::str_from_labels(&question.qname);
    let Some(name_id) = state.peer.strings.find(qname.as_bytes(), InternMode::Name) else {
        return;
    };
    let matches: Vec<RrId> = state
        .peer
        .iter()
        .filter(|(_, r)| {
            r.interface == interface
                && r.name == name_id
                && r.class == question.qclass
                && r.state == RrState::Query
                && r.rr_type() == question.qtype
        })
        .map(|(id, _)| id)
        .collect();
    for id in matches {
        querier::mark_duplicate_question(&mut state.peer, id);
    }
}

fn wake_waiters(state: &mut CoreState, interface: u32, answer: &DnsResourceRecord) {
    let name = names::str_from_labels(&answer.name);
    let rr_type = answer.rr_type();
    let entry = match &answer.rdata {
        DnsRecordData::A(ip) => Some(WaiterAnswer::Ipv4(*ip)),
        DnsRecordData::AAAA(ip) => Some(WaiterAnswer::Ipv6(*ip)),
        DnsRecordData::PTR(target) => Some(WaiterAnswer::PtrTarget(names::str_from_labels(target))),
        _ => None,
    };
    let Some(entry) = entry else {
        return;
    };
    for waiter in state.waiters.iter_mut() {
        if waiter.interface == interface && waiter.name.eq_ignore_ascii_case(&name) && waiter.want_types.contains(&rr_type) {
            if !waiter.got.iter().any(|(t, _)| *t == rr_type) {
                waiter.got.push((rr_type, entry.clone()));
            }
        }
    }
}

fn process_local_due(state: &mut CoreState, id: RrId) {
    let interface = state.local.get(id).interface;
    let pre_state = state.local.get(id).state;
    match pre_state {
        RrState::Probing | RrState::Announcing | RrState::Goodbye => {
            let outcome = responder::on_timer(&mut state.local, id, &state.config);
            if let Some((_, notify_state)) = outcome.notify {
                let fqdn = name_string(&state.local, state.local.get(id).name);
                state.probing_notify.notify(&fqdn, notify_state);
            }
            if outcome.should_send {
                let packet = match pre_state {
                    RrState::Probing => build_probe_packet(&state.local, id),
                    _ => build_announce_packet(&state.local, id),
                };
                send_multicast(&state.interfaces, interface, &packet);
            }
            if state.local.is_alive(id) && state.local.get(id).state == RrState::Invalid {
                state.local.delete(id);
            }
        }
        RrState::Valid if state.local.get(id).response_send_flag => {
            state.local.get_mut(id).response_send_flag = false;
            let packet = build_announce_packet(&state.local, id);
            send_multicast(&state.interfaces, interface, &packet);
        }
        _ => {}
    }
}

fn process_peer_due(state: &mut CoreState, id: RrId) {
    let interface = state.peer.get(id).interface;
    let pre_state = state.peer.get(id).state;
    let fqdn = name_string(&state.peer, state.peer.get(id).name);

    if pre_state == RrState::Query {
        let outcome = querier::on_query_timer(&mut state.peer, id, &state.config);
        if outcome.should_send {
            let packet = build_query_packet(&state.peer, &state.local, id, state.config.periodic_rate);
            send_multicast(&state.interfaces, interface, &packet);
        }
        if outcome.evicted && state.peer.is_alive(id) {
            state.peer.delete(id);
        }
        return;
    }

    let outcome = querier::on_cache_timer(&mut state.peer, id, &state.config, &mut state.rng);
    if outcome.should_send {
        let packet = build_refresh_query_packet(&state.peer, id);
        send_multicast(&state.interfaces, interface, &packet);
    }
    if outcome.evicted {
        if state.peer.is_alive(id) {
            state.peer.delete(id);
        }
        state.service_notify.notify(&fqdn, ServiceChangeState::Deleted);
    }
}

fn advance_timers(state: &mut CoreState, ticks: u32) {
    if ticks == 0 {
        return;
    }
    let local_due = state.timer.advance(state.local.iter_mut(), ticks);
    let peer_due = state.timer.advance(state.peer.iter_mut(), ticks);

    for id in local_due {
        if state.local.is_alive(id) {
            process_local_due(state, id);
        }
    }
    for id in peer_due {
        if state.peer.is_alive(id) {
            process_peer_due(state, id);
        }
    }

    state.timer.recompute(state.local.iter().map(|(_, r)| r).chain(state.peer.iter().map(|(_, r)| r)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct FakeSocket {
        inbox: StdMutex<VecDeque<(Vec<u8>, SocketAddr)>>,
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl FakeSocket {
        fn new() -> FakeSocket {
            FakeSocket { inbox: StdMutex::new(VecDeque::new()), sent: StdMutex::new(Vec::new()) }
        }
    }

    impl MdnsSocket for FakeSocket {
        fn send_to(&self, bytes: &[u8], _dst: SocketAddr) -> Result<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn recv(&self) -> Result<Option<crate::transport::ReceivedDatagram>> {
            Ok(self
                .inbox
                .lock()
                .unwrap()
                .pop_front()
                .map(|(bytes, src)| crate::transport::ReceivedDatagram { bytes, src }))
        }
    }

    fn test_mdns(host_name: &str) -> Mdns {
        let config = MdnsConfig::default()
            .with_host_name(host_name)
            .with_local_cache_size(64)
            .with_peer_cache_size(64);
        Mdns::create(config).unwrap()
    }

    #[test]
    fn enabling_an_interface_probes_then_announces_host_record() {
        let mdns = test_mdns("printer");
        mdns.enable_with_transports(0, Some(Ipv4Addr::new(192, 0, 2, 5)), None, vec![Box::new(FakeSocket::new())])
            .unwrap();
        // Three probes at ~250ms apart clear probing well within 1.5s; full
        // announcing (two retransmits ~1s apart) needs roughly twice that,
        // so this window reliably lands mid-announce regardless of the
        // probe's random start jitter.
        for _ in 0..5 {
            mdns.tick(Duration::from_millis(300));
        }
        let state = mdns.state.lock().unwrap();
        let id = state.host_records.get(&0).unwrap().0.unwrap();
        assert_eq!(state.local.get(id).state, RrState::Announcing);
    }

    #[test]
    fn service_add_then_delete_round_trips_meta_ptr_refcount() {
        let mdns = test_mdns("printer");
        mdns.enable_with_transports(0, Some(Ipv4Addr::new(192, 0, 2, 5)), None, vec![Box::new(FakeSocket::new())])
            .unwrap();

        let descriptor_a = ServiceDescriptor {
            instance_name: "Foo".to_owned(),
            service_type: "_http._tcp".to_owned(),
            subtype: None,
            txt: vec![("path".to_owned(), "/index".to_owned())],
            ttl: 0,
            priority: 0,
            weight: 0,
            port: 80,
            unique: true,
            interface: 0,
        };
        let outcome = mdns.service_add(descriptor_a.clone()).unwrap();
        assert!(matches!(outcome, AddOutcome::Created(_)));

        let again = mdns.service_add(descriptor_a.clone()).unwrap();
        assert!(matches!(again, AddOutcome::AlreadyExists(_)));

        let descriptor_b = ServiceDescriptor {
            instance_name: "Bar".to_owned(),
            service_type: "_http._tcp".to_owned(),
            subtype: None,
            txt: Vec::new(),
            ttl: 0,
            priority: 0,
            weight: 0,
            port: 81,
            unique: true,
            interface: 0,
        };
        mdns.service_add(descriptor_b).unwrap();

        {
            let state = mdns.state.lock().unwrap();
            let meta_name = state.local.strings.find(b"_services._dns-sd._udp.local", InternMode::Name).unwrap();
            let target = state.local.strings.find(b"_http._tcp.local", InternMode::Name).unwrap();
            let id = state
                .local
                .find(0, meta_name, DnsRRType::PTR, DnsClass::IN, FindMode::All, Some(&RdataVariant::Ptr(target)))
                .unwrap();
            assert_eq!(state.local.get(id).count, 2);
        }

        mdns.service_delete(0, "Foo", "_http._tcp", None).unwrap();

        let state = mdns.state.lock().unwrap();
        let meta_name = state.local.strings.find(b"_services._dns-sd._udp.local", InternMode::Name).unwrap();
        let target = state.local.strings.find(b"_http._tcp.local", InternMode::Name).unwrap();
        let id = state
            .local
            .find(0, meta_name, DnsRRType::PTR, DnsClass::IN, FindMode::All, Some(&RdataVariant::Ptr(target)))
            .unwrap();
        assert_eq!(state.local.get(id).count, 1);
    }

    #[test]
    fn host_address_get_returns_already_cached_answer() {
        let mdns = test_mdns("host");
        mdns.enable_with_transports(0, Some(Ipv4Addr::new(192, 0, 2, 5)), None, vec![Box::new(FakeSocket::new())])
            .unwrap();
        {
            let mut state = mdns.state.lock().unwrap();
            let name = state.peer.strings.intern(b"printer.local", InternMode::Name).unwrap();
            let rec = Record {
                interface: 0,
                name,
                class: DnsClass::IN,
                state: RrState::Valid,
                flags: RrFlags { peer: true, ..Default::default() },
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
                rdata: RdataVariant::A(Ipv4Addr::new(192, 0, 2, 9)),
                elapsed_time: 0,
                count: 0,
            };
            state.peer.insert(rec).unwrap();
        }
        let (ipv4, ipv6) = mdns.host_address_get(0, "printer", Duration::from_millis(50)).unwrap();
        assert_eq!(ipv4, Some(Ipv4Addr::new(192, 0, 2, 9)));
        assert_eq!(ipv6, None);
    }

    #[test]
    fn disabling_an_interface_invalidates_its_local_records() {
        let mdns = test_mdns("printer");
        mdns.enable_with_transports(0, Some(Ipv4Addr::new(192, 0, 2, 5)), None, vec![Box::new(FakeSocket::new())])
            .unwrap();
        mdns.disable(0).unwrap();
        let state = mdns.state.lock().unwrap();
        assert_eq!(state.local.live_count(), 0);
        assert!(!state.interfaces.contains_key(&0));
    }
}
