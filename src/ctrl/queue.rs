use crate::ctrl::request::Request;

/// Stable name for a queued request. Survives removal of other entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReqHandle(u64);

/// Bounded insertion-order request queue.
#[derive(Debug)]
pub struct RequestQueue {
    entries: Vec<(ReqHandle, Request)>,
    capacity: usize,
    next_handle: u64,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_handle: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `req`, handing it back when the queue is already full.
    pub fn push(&mut self, req: Request) -> Result<ReqHandle, Request> {
        if self.is_full() {
            return Err(req);
        }
        let handle = ReqHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, req));
        Ok(handle)
    }

    fn position(&self, handle: ReqHandle) -> Option<usize> {
        // handles are issued in increasing order and never reordered
        self.entries.binary_search_by_key(&handle, |(h, _)| *h).ok()
    }

    pub fn get(&self, handle: ReqHandle) -> Option<&Request> {
        self.position(handle).map(|pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, handle: ReqHandle) -> Option<&mut Request> {
        self.position(handle).map(move |pos| &mut self.entries[pos].1)
    }

    pub fn remove(&mut self, handle: ReqHandle) -> Option<Request> {
        self.position(handle).map(|pos| self.entries.remove(pos).1)
    }

    pub fn front(&self) -> Option<ReqHandle> {
        self.entries.first().map(|(h, _)| *h)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (ReqHandle, &Request)> {
        self.entries.iter().map(|(h, r)| (*h, r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ReqHandle, &mut Request)> {
        self.entries.iter_mut().map(|(h, r)| (*h, r))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrl::request::ReqKind;

    fn req(addr: u64) -> Request {
        Request::new(addr, ReqKind::Read, 0)
    }

    #[test]
    fn push_fails_exactly_at_capacity() {
        let mut q = RequestQueue::new(2);
        assert!(q.push(req(0)).is_ok());
        assert!(q.push(req(1)).is_ok());
        let rejected = q.push(req(2)).expect_err("queue should be full");
        assert_eq!(rejected.addr, 2);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn handles_survive_removal_of_others() {
        let mut q = RequestQueue::new(4);
        let a = q.push(req(10)).unwrap();
        let b = q.push(req(20)).unwrap();
        let c = q.push(req(30)).unwrap();
        assert_eq!(q.remove(b).map(|r| r.addr), Some(20));
        assert_eq!(q.get(a).map(|r| r.addr), Some(10));
        assert_eq!(q.get(c).map(|r| r.addr), Some(30));
        assert!(q.get(b).is_none());
        assert!(q.remove(b).is_none());
        let d = q.push(req(40)).unwrap();
        let order: Vec<_> = q.iter().map(|(h, _)| h).collect();
        assert_eq!(order, vec![a, c, d]);
    }
}
