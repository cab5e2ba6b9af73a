//! Collective communication between ranks.
//!
//! The distribution engine needs two collectives: a root-to-all broadcast
//! and a barrier. `CollectiveChannel` exposes them over raw bytes; typed
//! values go through `broadcast`, which serializes with `serde_json`.

use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Rank that plans work and reads the sample.
pub const ROOT: usize = 0;

pub trait CollectiveChannel: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Deliver the root's `payload` to every rank. Non-root ranks pass `None`.
    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, AppError>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), AppError>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }
}

/// Broadcast a typed value from the root. The root must pass `Some`.
pub fn broadcast<T>(channel: &dyn CollectiveChannel, value: Option<&T>) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned,
{
    let payload = match (channel.is_root(), value) {
        (true, Some(v)) => Some(
            serde_json::to_vec(v).map_err(|e| AppError::runtime(format!("Failed to encode broadcast: {e}")))?,
        ),
        (true, None) => return Err(AppError::runtime("Root rank has nothing to broadcast.")),
        (false, _) => None,
    };
    let bytes = channel.broadcast_bytes(payload)?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::runtime(format!("Failed to decode broadcast: {e}")))
}

/// The only rank of a non-MPI run. Collectives are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl CollectiveChannel for SingleRank {
    fn rank(&self) -> usize {
        ROOT
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, AppError> {
        payload.ok_or_else(|| AppError::runtime("Root rank has nothing to broadcast."))
    }

    fn barrier(&self) -> Result<(), AppError> {
        Ok(())
    }
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slot: Mutex<Option<Vec<u8>>>,
}

/// In-process ranks (one per thread) sharing a barrier and a broadcast slot.
#[derive(Clone)]
pub struct LocalGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Create `size` connected ranks; hand one to each thread.
    pub fn create(size: usize) -> Vec<LocalGroup> {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size.max(1)),
            slot: Mutex::new(None),
        });
        (0..size)
            .map(|rank| LocalGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl std::fmt::Debug for LocalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGroup")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl CollectiveChannel for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, AppError> {
        if self.is_root() {
            let payload = payload.ok_or_else(|| AppError::runtime("Root rank has nothing to broadcast."))?;
            *self.shared.slot.lock() = Some(payload);
        }
        self.shared.barrier.wait();
        let bytes = self.shared.slot.lock().clone();
        // Keep the root from overwriting the slot before everyone has read it.
        self.shared.barrier.wait();
        bytes.ok_or_else(|| AppError::runtime("Broadcast slot was empty."))
    }

    fn barrier(&self) -> Result<(), AppError> {
        self.shared.barrier.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_rank_broadcast_returns_the_value() {
        let value: Vec<usize> = broadcast(&SingleRank, Some(&vec![1, 2, 3])).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert!(SingleRank.barrier().is_ok());
    }

    #[test]
    fn local_group_broadcast_reaches_every_rank() {
        let handles: Vec<_> = LocalGroup::create(4)
            .into_iter()
            .map(|channel| {
                thread::spawn(move || {
                    let mine = format!("rank-{}", channel.rank());
                    let first: String = broadcast(&channel, Some(&mine)).unwrap();
                    channel.barrier().unwrap();
                    let second: u32 = broadcast(&channel, channel.is_root().then_some(&7)).unwrap();
                    (first, second)
                })
            })
            .collect();

        for h in handles {
            let (first, second) = h.join().unwrap();
            assert_eq!(first, "rank-0");
            assert_eq!(second, 7);
        }
    }

    #[test]
    fn root_without_value_is_an_error() {
        let err = broadcast::<u32>(&SingleRank, None).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
