//! Identity allocation for entries that do not exist remotely yet

use std::collections::{HashMap, HashSet};
use std::fmt;

type Generator = Box<dyn FnMut() -> String + Send>;

/// Hands out fresh entry ids
///
/// An id supplied by the edited tree is never reused for a create: it is
/// treated as provisional and mapped to a generated id, the same provisional
/// id always mapping to the same generated one within a build. Reserved ids,
/// such as the ones already present in the space, are never generated.
pub struct IdAllocator {
    generate: Generator,
    by_provisional: HashMap<String, String>,
    issued: HashSet<String>,
    reserved: HashSet<String>,
}

impl IdAllocator {
    /// Allocator producing UUID v4 ids
    pub fn new() -> Self {
        Self::with_generator(|| uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_generator(generate: impl FnMut() -> String + Send + 'static) -> Self {
        Self {
            generate: Box::new(generate),
            by_provisional: HashMap::new(),
            issued: HashSet::new(),
            reserved: HashSet::new(),
        }
    }

    /// Mark ids as taken so the generator never hands them out
    pub fn reserve<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(ids.into_iter().map(Into::into));
    }

    /// Fresh id for a provisional one. The provisional id itself is never
    /// returned, even when it happens to look like a generated id.
    pub fn allocate(&mut self, provisional: Option<&str>) -> String {
        if let Some(fresh) = provisional.and_then(|id| self.by_provisional.get(id)) {
            return fresh.clone();
        }

        let mut fresh = (self.generate)();
        while self.issued.contains(&fresh) || self.reserved.contains(&fresh) {
            fresh = (self.generate)();
        }
        self.issued.insert(fresh.clone());
        if let Some(id) = provisional {
            self.by_provisional.insert(id.to_string(), fresh.clone());
        }
        fresh
    }

    /// Id for a create: keeps an id this allocator issued, allocates otherwise
    pub fn id_for_create(&mut self, id: Option<&str>) -> String {
        match id {
            Some(id) if self.issued.contains(id) => id.to_string(),
            provisional => self.allocate(provisional),
        }
    }

    pub fn is_issued(&self, id: &str) -> bool {
        self.issued.contains(id)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("issued", &self.issued.len())
            .field("reserved", &self.reserved.len())
            .finish()
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... generator
pub fn sequential(prefix: &str) -> impl FnMut() -> String + Send + 'static {
    let prefix = prefix.to_string();
    let mut next = 0u64;
    move || {
        next += 1;
        format!("{}-{}", prefix, next)
    }
}
