//! Credential session
//!
//! Holds the user's local secret in memory for a fixed 30 minutes. The secret
//! gates every sensitive operation and doubles as the snapshot encryption key,
//! so it is never hashed, persisted or logged.
//!
//! Expiry is enforced twice: a cancellable timer task clears the secret when
//! the TTL elapses, and every read re-checks the deadline under the same lock
//! as the comparison, so a late timer can never let a stale secret verify.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Lifetime of an armed secret
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Default)]
struct SessionState {
    secret: Option<Zeroizing<String>>,
    expires_at: Option<Instant>,
    timer: Option<CancellationToken>,

    /// Bumped on every arm/disarm so a superseded timer cannot clear a newer secret
    generation: u64,
}

impl SessionState {
    fn clear(&mut self) {
        self.secret = None;
        self.expires_at = None;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Self-clear if the deadline has passed; true if a live secret remains
    fn check_live(&mut self) -> bool {
        match self.expires_at {
            Some(deadline) if Instant::now() < deadline => self.secret.is_some(),
            Some(_) => {
                debug!("Session secret expired on read");
                self.clear();
                false
            }
            None => false,
        }
    }
}

/// In-memory session secret with a fixed expiry
pub struct CredentialSession {
    state: Arc<Mutex<SessionState>>,
    ttl: Duration,
}

impl Default for CredentialSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            ttl: SESSION_TTL,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    /// Store a secret and (re)start the expiry timer
    ///
    /// Replaces any prior secret; the previous timer is cancelled so only one
    /// is ever live. Outside a Tokio runtime no timer is spawned and expiry
    /// is enforced on read only.
    pub fn arm(&self, secret: &str) {
        let mut state = self.lock();
        state.clear();

        let generation = state.generation;
        let token = CancellationToken::new();
        state.secret = Some(Zeroizing::new(secret.to_string()));
        state.expires_at = Some(Instant::now() + self.ttl);
        state.timer = Some(token.clone());
        drop(state);

        let weak = Arc::downgrade(&self.state);
        let ttl = self.ttl;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(ttl) => expire(weak, generation),
                    }
                });
            }
            Err(_) => debug!("No runtime, session expiry checked on read only"),
        }

        info!("Session armed for {} minutes", self.ttl.as_secs() / 60);
    }

    /// Clear the secret and cancel the timer; idempotent
    pub fn disarm(&self) {
        let mut state = self.lock();
        let was_armed = state.secret.is_some();
        state.clear();
        if was_armed {
            info!("Session disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().check_live()
    }

    /// Exact-match check against the live secret
    ///
    /// Expiry check and comparison happen under one lock with no suspension
    /// point in between.
    pub fn verify(&self, candidate: &str) -> bool {
        let mut state = self.lock();
        if !state.check_live() {
            return false;
        }
        state
            .secret
            .as_ref()
            .map(|secret| constant_time_eq(secret.as_bytes(), candidate.as_bytes()))
            .unwrap_or(false)
    }

    /// Time left before the secret expires
    pub fn remaining(&self) -> Option<Duration> {
        let mut state = self.lock();
        if !state.check_live() {
            return None;
        }
        state
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for CredentialSession {
    fn drop(&mut self) {
        self.lock().clear();
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    // Every mutation ends in a full clear or a full arm
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn expire(weak: Weak<Mutex<SessionState>>, generation: u64) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    let mut state = lock_state(&state);
    if state.generation == generation && state.secret.is_some() {
        state.clear();
        info!("Session secret expired");
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
