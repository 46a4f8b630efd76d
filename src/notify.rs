// Application notifications (spec 6, "Notifications"; spec 9, "Global
// mutable state"). The teacher's C ancestor wires these through one
// file-scope instance pointer; here callers register plain closures and
// the core holds them for the lifetime of the instance, so no global state
// is needed at all.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProbingState {
    HostRegisteredSuccess,
    ServiceRegisteredSuccess,
    RegisteredFailure,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ServiceChangeState {
    Received,
    Deleted,
    Updated,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CacheState {
    Fragmented,
    Full,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CacheArenaKind {
    Local,
    Peer,
}

pub trait ProbingNotify: Send {
    fn notify(&mut self, name: &str, state: ProbingState);
}

pub trait ServiceChangeNotify: Send {
    fn notify(&mut self, service: &str, state: ServiceChangeState);
}

pub trait CacheFullNotify: Send {
    fn notify(&mut self, state: CacheState, arena: CacheArenaKind);
}

impl<F: FnMut(&str, ProbingState) + Send> ProbingNotify for F {
    fn notify(&mut self, name: &str, state: ProbingState) {
        self(name, state)
    }
}

impl<F: FnMut(&str, ServiceChangeState) + Send> ServiceChangeNotify for F {
    fn notify(&mut self, service: &str, state: ServiceChangeState) {
        self(service, state)
    }
}

impl<F: FnMut(CacheState, CacheArenaKind) + Send> CacheFullNotify for F {
    fn notify(&mut self, state: CacheState, arena: CacheArenaKind) {
        self(state, arena)
    }
}

// No-op defaults so `Mdns::create` can be called without registering every
// callback up front.
pub(crate) struct NullProbingNotify;
impl ProbingNotify for NullProbingNotify {
    fn notify(&mut self, _name: &str, _state: ProbingState) {}
}

pub(crate) struct NullServiceChangeNotify;
impl ServiceChangeNotify for NullServiceChangeNotify {
    fn notify(&mut self, _service: &str, _state: ServiceChangeState) {}
}

pub(crate) struct NullCacheFullNotify;
impl CacheFullNotify for NullCacheFullNotify {
    fn notify(&mut self, _state: CacheState, _arena: CacheArenaKind) {}
}
