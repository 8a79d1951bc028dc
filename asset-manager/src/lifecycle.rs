//! Bank lifecycle manager: registration requests may come from any thread,
//! and are applied to the store on the control thread's tick.

use crossbeam_queue::SegQueue;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::bank::SoundBank;
use crate::handle::BankHandle;
use crate::store::SoundBankStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankRequest {
    Register(PathBuf),
    Unregister(PathBuf),
}

/// What one `tick` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub registered: usize,
    pub unregistered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct BankLifecycleManager {
    requests: SegQueue<BankRequest>,
}

impl BankLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_register(&self, path: impl Into<PathBuf>) {
        self.requests.push(BankRequest::Register(path.into()));
    }

    pub fn request_unregister(&self, path: impl Into<PathBuf>) {
        self.requests.push(BankRequest::Unregister(path.into()));
    }

    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// Apply queued requests in submission order. A request that fails is
    /// logged and dropped; the remaining requests are still processed.
    pub fn tick(&self, store: &mut SoundBankStore) -> TickSummary {
        let mut summary = TickSummary::default();
        while let Some(req) = self.requests.pop() {
            match req {
                BankRequest::Register(path) => match SoundBank::open(&path) {
                    Ok(bank) => {
                        let sounds = bank.len();
                        let handle = bank.handle();
                        if store.insert_bank(bank).is_some() {
                            debug!(path = %path.display(), "re-registered bank replaces previous instance");
                        }
                        info!(path = %path.display(), bank = %handle, sounds, "bank registered");
                        summary.registered += 1;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "bank registration dropped");
                        summary.failed += 1;
                    }
                },
                BankRequest::Unregister(path) => {
                    let handle = BankHandle::from_path(&path);
                    if store.remove_bank(handle).is_some() {
                        info!(path = %path.display(), bank = %handle, "bank unregistered");
                        summary.unregistered += 1;
                    } else {
                        debug!(path = %path.display(), "unregister for unknown bank ignored");
                    }
                }
            }
        }
        summary
    }
}
