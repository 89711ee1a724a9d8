//! Bookkeeping of issued fetches. Requests are marked inactive on completion and never removed.

#![forbid(unsafe_code)]

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::ResourceId;

/// Opaque token identifying one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub id: RequestId,
    pub resource: ResourceId,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: FxHashMap<RequestId, PollRequest>,
    active: usize,
}

impl RequestTracker {
    pub fn new() -> Self { Self::default() }

    /// Record a fetch for `resource` as in flight.
    pub fn begin(&mut self, resource: &str) -> RequestId {
        let id = RequestId::new();
        self.requests.insert(id, PollRequest { id, resource: resource.to_string(), active: true });
        self.active += 1;
        id
    }

    /// Mark a request complete. Returns false when it was unknown or already inactive.
    pub fn finish(&mut self, id: RequestId) -> bool {
        match self.requests.get_mut(&id) {
            Some(req) if req.active => {
                req.active = false;
                self.active -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn any_active(&self) -> bool { self.active > 0 }
    pub fn active_count(&self) -> usize { self.active }
    pub fn len(&self) -> usize { self.requests.len() }
    pub fn is_empty(&self) -> bool { self.requests.is_empty() }
    pub fn get(&self, id: RequestId) -> Option<&PollRequest> { self.requests.get(&id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_keeps_finished_requests() {
        let mut t = RequestTracker::new();
        let a = t.begin("model-a");
        let b = t.begin("model-a/versions");
        assert_ne!(a, b);
        assert_eq!(t.active_count(), 2);

        assert!(t.finish(a));
        assert!(!t.finish(a));
        assert!(t.any_active());
        assert!(t.finish(b));
        assert!(!t.any_active());

        assert_eq!(t.len(), 2);
        let req = t.get(a).unwrap();
        assert!(!req.active);
        assert_eq!(req.resource, "model-a");
        assert!(!t.finish(RequestId::new()));
    }
}
