//! C7: session pool — binds stateless HTTP requests to authenticated
//! line-protocol sessions (spec §4.7).
//!
//! Grounded on `original_source/webcit-ng/server/ctdlclient.c` (the
//! original connects a UDS client per HTTP worker) and on the design
//! note in spec §9: "pointer-heavy intrusive linked lists... re-architect
//! as an ordered sequence of records with stable indices; acquire/release
//! operate on index under a mutex". The teacher's `PresenceTracker`
//! (`Arc<Mutex<HashMap<...>>>`, never held across I/O) is the concurrency
//! idiom this follows.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct PoolRecord {
    pub bound: bool,
    /// Base64 `user:password` exactly as received, or empty for anonymous.
    pub auth: String,
    pub whoami: Option<String>,
    pub current_room: Option<String>,
    pub last_access: u64,
    pub num_requests_handled: u64,
    pub room_mtime: i64,
    /// `true` once this record has a live line-protocol connection behind
    /// it (modeled here; the actual UDS socket is owned by the caller
    /// that dials it, per §4.7's "liveness: on acquire... send NOOP").
    pub connected: bool,
}

impl PoolRecord {
    fn new(auth: &str) -> Self {
        PoolRecord {
            bound: true,
            auth: auth.to_string(),
            whoami: None,
            current_room: None,
            last_access: now_secs(),
            num_requests_handled: 0,
            room_mtime: 0,
            connected: false,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A handle into the pool's record list; released on `Drop` so that an
/// early return or panic during request handling cannot leak a bound slot.
pub struct PoolLease {
    pool: Arc<SessionPoolInner>,
    pub index: usize,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

struct SessionPoolInner {
    records: Mutex<Vec<PoolRecord>>,
}

impl SessionPoolInner {
    fn release(&self, index: usize) {
        let mut records = self.records.lock().unwrap();
        if let Some(r) = records.get_mut(index) {
            r.bound = false;
        }
    }
}

/// A record unused for longer than this is treated as dead on the next
/// acquire (spec §4.7's liveness probe, approximated without a real
/// socket round trip — see `DESIGN.md`'s "HTTP gateway topology" entry).
const STALE_AFTER_SECS: u64 = 120;

#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<SessionPoolInner>,
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPool {
    pub fn new() -> Self {
        SessionPool {
            inner: Arc::new(SessionPoolInner {
                records: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Acquire algorithm (spec §4.7): under one mutex, scan for the first
    /// unbound record whose `auth` matches; otherwise allocate a new one.
    /// The mutex is held only across the scan/bind, never across I/O. A
    /// matching record idle for more than `STALE_AFTER_SECS` is treated
    /// as if its liveness probe had failed and is handed back as freshly
    /// unconnected, per spec §4.7 ("if either fails, close the socket and
    /// treat the record as new").
    pub fn acquire(&self, auth: &str) -> PoolLease {
        let mut records = self.inner.records.lock().unwrap();
        if let Some(pos) = records
            .iter()
            .position(|r| !r.bound && r.auth == auth)
        {
            let now = now_secs();
            if records[pos].connected && now.saturating_sub(records[pos].last_access) > STALE_AFTER_SECS {
                records[pos].connected = false;
                records[pos].whoami = None;
            }
            records[pos].bound = true;
            records[pos].last_access = now;
            records[pos].num_requests_handled += 1;
            return PoolLease {
                pool: self.inner.clone(),
                index: pos,
            };
        }
        records.push(PoolRecord::new(auth));
        let index = records.len() - 1;
        PoolLease {
            pool: self.inner.clone(),
            index,
        }
    }

    pub fn with_record<R>(&self, lease: &PoolLease, f: impl FnOnce(&mut PoolRecord) -> R) -> R {
        let mut records = self.inner.records.lock().unwrap();
        f(&mut records[lease.index])
    }

    /// Mark a record's connection dead so the next acquire reconnects
    /// (spec §4.7 "liveness: ... if either fails, close the socket and
    /// treat the record as new").
    pub fn invalidate(&self, lease: &PoolLease) {
        self.with_record(lease, |r| {
            r.connected = false;
            r.whoami = None;
        });
    }

    /// Re-encode `auth` under the server's canonical username form after a
    /// successful login, so subsequent acquires match by canonical form.
    pub fn canonicalize_auth(&self, lease: &PoolLease, canonical_auth: String, whoami: String) {
        self.with_record(lease, |r| {
            r.auth = canonical_auth;
            r.whoami = Some(whoami);
            r.connected = true;
        });
    }

    pub fn record_count(&self) -> usize {
        self.inner.records.lock().unwrap().len()
    }

    pub fn bound_count(&self) -> usize {
        self.inner.records.lock().unwrap().iter().filter(|r| r.bound).count()
    }

    #[cfg(test)]
    fn backdate(&self, lease: &PoolLease, seconds_ago: u64) {
        self.with_record(lease, |r| {
            r.connected = true;
            r.whoami = Some("backdated".to_string());
            r.last_access = r.last_access.saturating_sub(seconds_ago);
        });
    }
}
