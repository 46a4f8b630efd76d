// String pool (spec 4.2). The spec describes a byte arena with HEAD/TAIL
// words and a `[count:u16][length:u16]` slot trailer; per spec 9 ("Pointer-
// into-arena data model") we keep the refcount-on-intern/release contract
// and the bounded-capacity failure mode but represent a slot by a typed
// index rather than a raw offset, with the arena (a slab of slots) as the
// sole owner of the bytes.

use std::collections::HashMap;

use crate::error::{MdnsError, Result};
use crate::notify::CacheState;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InternMode {
    // Case-insensitive match (DNS names).
    Name,
    // Byte-exact match (TXT blobs and other opaque data).
    Blob,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StringId(pub(crate) usize);

struct Slot {
    bytes: Vec<u8>,
    mode: InternMode,
    count: u16,
}

pub struct StringPool {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    // name -> slot index, keyed by the case-folded bytes so Intern can find
    // an existing equal slot in O(1) instead of O(n).
    name_index: HashMap<Vec<u8>, usize>,
    blob_index: HashMap<Vec<u8>, usize>,
    max_slots: usize,
}

fn fold(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|b| if b.is_ascii_uppercase() { b | 0x20 } else { *b })
        .collect()
}

impl StringPool {
    pub fn new(max_slots: usize) -> StringPool {
        StringPool {
            slots: Vec::new(),
            free: Vec::new(),
            name_index: HashMap::new(),
            blob_index: HashMap::new(),
            max_slots,
        }
    }

    fn index_key(bytes: &[u8], mode: InternMode) -> Vec<u8> {
        match mode {
            InternMode::Name => fold(bytes),
            InternMode::Blob => bytes.to_vec(),
        }
    }

    fn index_for(&mut self, mode: InternMode) -> &mut HashMap<Vec<u8>, usize> {
        match mode {
            InternMode::Name => &mut self.name_index,
            InternMode::Blob => &mut self.blob_index,
        }
    }

    // Finds an existing equal slot and bumps its refcount, or allocates a
    // new one (reusing a free slot before growing the arena).
    pub fn intern(&mut self, bytes: &[u8], mode: InternMode) -> Result<StringId> {
        let key = Self::index_key(bytes, mode);
        if let Some(&idx) = self.index_for(mode).get(&key) {
            let slot = self.slots[idx].as_mut().expect("indexed slot must be live");
            slot.count += 1;
            return Ok(StringId(idx));
        }

        let idx = if let Some(idx) = self.free.pop() {
            idx
        } else {
            if self.slots.len() >= self.max_slots {
                return Err(MdnsError::Cache);
            }
            self.slots.push(None);
            self.slots.len() - 1
        };

        self.slots[idx] = Some(Slot {
            bytes: bytes.to_vec(),
            mode,
            count: 1,
        });
        self.index_for(mode).insert(key, idx);
        Ok(StringId(idx))
    }

    // Read-only lookup: finds an existing equal slot without bumping its
    // refcount. Used where a caller needs to test "is this name already
    // interned here" without creating a reference it would have to remember
    // to release (e.g. known-answer collection across the other arena's
    // pool, spec 4.6).
    pub fn find(&self, bytes: &[u8], mode: InternMode) -> Option<StringId> {
        let key = Self::index_key(bytes, mode);
        match mode {
            InternMode::Name => self.name_index.get(&key).map(|&idx| StringId(idx)),
            InternMode::Blob => self.blob_index.get(&key).map(|&idx| StringId(idx)),
        }
    }

    pub fn retain(&mut self, id: StringId) {
        let slot = self.slots[id.0].as_mut().expect("retain of dead slot");
        slot.count += 1;
    }

    // Decrements the refcount; reclaims the slot once it reaches zero.
    pub fn release(&mut self, id: StringId) {
        let is_dead = {
            let slot = self.slots[id.0].as_mut().expect("release of dead slot");
            slot.count -= 1;
            slot.count == 0
        };
        if is_dead {
            let slot = self.slots[id.0].take().expect("checked above");
            let key = Self::index_key(&slot.bytes, slot.mode);
            self.index_for(slot.mode).remove(&key);
            self.free.push(id.0);
        }
    }

    pub fn get(&self, id: StringId) -> &[u8] {
        &self.slots[id.0].as_ref().expect("get of dead slot").bytes
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    // How full the arena is, used by the arena to pick a cache-full
    // notification severity when interning fails (spec 4.2).
    pub fn pressure(&self) -> CacheState {
        if self.slots.len() < self.max_slots {
            CacheState::Fragmented
        } else {
            CacheState::Full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_equal_names_shares_a_slot_case_insensitively() {
        let mut pool = StringPool::new(16);
        let a = pool.intern(b"Printer.local", InternMode::Name).unwrap();
        let b = pool.intern(b"printer.LOCAL", InternMode::Name).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn blob_mode_is_byte_exact() {
        let mut pool = StringPool::new(16);
        let a = pool.intern(b"Foo", InternMode::Blob).unwrap();
        let b = pool.intern(b"foo", InternMode::Blob).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn release_to_zero_frees_the_slot_for_reuse() {
        let mut pool = StringPool::new(1);
        let a = pool.intern(b"only-one-fits", InternMode::Blob).unwrap();
        assert!(pool.intern(b"second", InternMode::Blob).is_err());
        pool.release(a);
        let b = pool.intern(b"second", InternMode::Blob).unwrap();
        assert_eq!(pool.get(b), b"second");
    }

    #[test]
    fn find_looks_up_without_bumping_refcount() {
        let mut pool = StringPool::new(4);
        let a = pool.intern(b"printer.local", InternMode::Name).unwrap();
        let b = pool.find(b"PRINTER.LOCAL", InternMode::Name).unwrap();
        assert_eq!(a, b);
        pool.release(a);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn retain_adds_a_reference_requiring_two_releases() {
        let mut pool = StringPool::new(4);
        let a = pool.intern(b"shared", InternMode::Blob).unwrap();
        pool.retain(a);
        pool.release(a);
        assert_eq!(pool.get(a), b"shared");
        pool.release(a);
        // Pool still reports the name_index cleared; interning again gives
        // a fresh slot rather than reusing stale refcount state.
        let b = pool.intern(b"shared", InternMode::Blob).unwrap();
        assert_eq!(pool.get(b), b"shared");
    }
}
