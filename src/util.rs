pub mod sleep_lock;
pub mod thread_id;

pub use self::sleep_lock::{SleepLock, SleepLockGuard};

#[cfg(test)]
pub fn assert_send_sync<T: ?Sized + Send + Sync>() {}
