use crate::error::ApiError;
use std::sync::atomic::{AtomicBool, Ordering};

/// The "pending" flag of a mutation.
///
/// Only one holder at a time; a second `begin` while a guard is alive fails
/// before anything is sent.
#[derive(Debug, Default)]
pub struct PendingFlag {
    pending: AtomicBool,
}

impl PendingFlag {
    pub fn new() -> Self {
        PendingFlag::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn begin(&self) -> Result<PendingGuard<'_>, ApiError> {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ApiError::SubmissionPending)?;
        Ok(PendingGuard { flag: self })
    }
}

/// Clears the flag when dropped, on success and on error alike.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    flag: &'a PendingFlag,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flag.pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_rejected_while_pending() {
        let flag = PendingFlag::new();
        let guard = flag.begin().unwrap();
        assert!(flag.is_pending());
        assert_eq!(flag.begin().unwrap_err(), ApiError::SubmissionPending);
        drop(guard);
        assert!(!flag.is_pending());
        assert!(flag.begin().is_ok());
    }
}
