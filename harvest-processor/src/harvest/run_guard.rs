//! Single-run guard
//!
//! The ids of running harvest processes are recorded under `active_pids`.
//! A run refuses to start while any recorded process is still alive and
//! removes its own id when it finishes. Ids of dead processes (crashed
//! runs) are discarded on acquisition.

use harvest_common::{Error, KeyedStore, Result};
use tracing::{info, warn};

pub const ACTIVE_PIDS_KEY: &str = "active_pids";

pub struct RunGuard {
    store: KeyedStore,
    pid: u32,
}

impl RunGuard {
    /// Register the current process as the active run
    pub async fn acquire(store: &KeyedStore) -> Result<Self> {
        Self::acquire_as(store, std::process::id()).await
    }

    /// Register `pid` as the active run
    pub async fn acquire_as(store: &KeyedStore, pid: u32) -> Result<Self> {
        let recorded: Vec<u32> = store.get_by_key(ACTIVE_PIDS_KEY).await?.unwrap_or_default();

        let (alive, stale): (Vec<u32>, Vec<u32>) = recorded
            .into_iter()
            .filter(|p| *p != pid)
            .partition(|p| process_alive(*p));

        if !stale.is_empty() {
            warn!(pids = ?stale, "Discarding pids of finished runs");
        }
        if !alive.is_empty() {
            return Err(Error::AlreadyRunning(alive));
        }

        store.set_by_key(ACTIVE_PIDS_KEY, &vec![pid]).await?;
        info!(pid, "Run guard acquired");

        Ok(Self {
            store: store.clone(),
            pid,
        })
    }

    /// Remove this run's pid
    pub async fn release(self) -> Result<()> {
        let recorded: Vec<u32> = self.store.get_by_key(ACTIVE_PIDS_KEY).await?.unwrap_or_default();
        let remaining: Vec<u32> = recorded.into_iter().filter(|p| *p != self.pid).collect();
        self.store.set_by_key(ACTIVE_PIDS_KEY, &remaining).await?;
        info!(pid = self.pid, "Run guard released");
        Ok(())
    }
}

/// Whether a process with `pid` exists
fn process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(true)
    }

    #[cfg(not(unix))]
    {
        warn!(pid, "Cannot check process liveness on this platform, assuming finished");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Linux caps pids well below this
    const DEAD_PID: u32 = 4_000_000_000;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = KeyedStore::in_memory().await.unwrap();

        let guard = RunGuard::acquire(&store).await.unwrap();
        let pids: Vec<u32> = store.get_by_key(ACTIVE_PIDS_KEY).await.unwrap().unwrap();
        assert_eq!(pids, vec![std::process::id()]);

        guard.release().await.unwrap();
        let pids: Vec<u32> = store.get_by_key(ACTIVE_PIDS_KEY).await.unwrap().unwrap();
        assert!(pids.is_empty());
    }

    #[tokio::test]
    async fn test_live_run_blocks_acquisition() {
        let store = KeyedStore::in_memory().await.unwrap();
        // The test process itself is the live run
        store
            .set_by_key(ACTIVE_PIDS_KEY, &vec![std::process::id()])
            .await
            .unwrap();

        let result = RunGuard::acquire_as(&store, DEAD_PID - 1).await;

        assert!(matches!(result, Err(Error::AlreadyRunning(pids)) if pids == vec![std::process::id()]));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dead_pids_are_discarded() {
        let store = KeyedStore::in_memory().await.unwrap();
        store.set_by_key(ACTIVE_PIDS_KEY, &vec![DEAD_PID]).await.unwrap();

        let guard = RunGuard::acquire(&store).await.unwrap();

        let pids: Vec<u32> = store.get_by_key(ACTIVE_PIDS_KEY).await.unwrap().unwrap();
        assert_eq!(pids, vec![std::process::id()]);
        guard.release().await.unwrap();
    }
}
