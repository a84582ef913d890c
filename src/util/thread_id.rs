use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

/// A process-unique id for the calling thread. Ids are never reused, even after
/// the thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    pub fn current() -> ThreadId {
        thread_local! {
            static ID: ThreadId = ThreadId(new_id());
        }
        ID.with(|id| *id)
    }

    pub fn as_u64(&self) -> NonZeroU64 {
        self.0
    }
}

fn new_id() -> NonZeroU64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    NonZeroU64::new(id).expect("thread id counter overflow")
}
