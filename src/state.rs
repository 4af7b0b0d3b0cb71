//! Application auth state and one-shot UI effects.
//!
//! `AuthStateBroadcaster` is the single transition authority for
//! [`AppState`]: the session core and the use cases ask for transitions
//! through the [`AuthNotifier`] capability, and everyone else observes.
//!
//! Two streams with different replay semantics:
//! - state: `tokio::sync::watch` - every subscriber immediately sees the
//!   latest value, then every change
//! - effects: `tokio::sync::broadcast` - fire-and-forget; subscribers
//!   only see effects emitted after they subscribed

use tokio::sync::{broadcast, watch};

/// Effects buffered for slow consumers before the oldest is dropped
const EFFECT_CHANNEL_CAPACITY: usize = 8;

/// Message shown to the user when the server rejects the refresh token
pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Session expired";

/// Coarse application auth state. Exactly one value is live at a time.
///
/// Transitions: `Bootstrapping` resolves to either other state once at
/// startup; afterwards the state cycles between `Authenticated` and
/// `Unauthenticated` for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    Bootstrapping,
    Unauthenticated,
    Authenticated { user_id: Option<String> },
}

/// One-shot message for the UI layer. Not state: consumers that are not
/// listening when it fires simply miss it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEffect {
    ShowMessage(String),
}

/// Capability through which the session core requests state transitions
/// without depending on the presentation-facing broadcaster type.
pub trait AuthNotifier: Send + Sync {
    fn set_authenticated(&self, user_id: Option<String>);
    fn set_unauthenticated(&self, message: Option<&str>);
    fn emit_message(&self, message: &str);
}

/// Holds the current [`AppState`] and publishes changes and effects.
/// Clone is cheap - both channel handles are Arc-backed.
#[derive(Clone)]
pub struct AuthStateBroadcaster {
    state_tx: watch::Sender<AppState>,
    effect_tx: broadcast::Sender<AppEffect>,
}

impl AuthStateBroadcaster {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(AppState::Bootstrapping);
        let (effect_tx, _) = broadcast::channel(EFFECT_CHANNEL_CAPACITY);
        Self {
            state_tx,
            effect_tx,
        }
    }

    /// Subscribe to state changes. The receiver observes the current
    /// value immediately and every change thereafter.
    pub fn state(&self) -> watch::Receiver<AppState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> AppState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to one-shot effects. No replay.
    pub fn effects(&self) -> broadcast::Receiver<AppEffect> {
        self.effect_tx.subscribe()
    }

    /// Writes the new state, skipping notification when it equals the
    /// current one so repeated identical transitions stay silent.
    fn transition(&self, next: AppState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

impl Default for AuthStateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthNotifier for AuthStateBroadcaster {
    fn set_authenticated(&self, user_id: Option<String>) {
        self.transition(AppState::Authenticated { user_id });
    }

    fn set_unauthenticated(&self, message: Option<&str>) {
        self.transition(AppState::Unauthenticated);
        if let Some(message) = message {
            self.emit_message(message);
        }
    }

    fn emit_message(&self, message: &str) {
        // Send fails only when nobody is listening, which is fine for a
        // fire-and-forget effect.
        let _ = self
            .effect_tx
            .send(AppEffect::ShowMessage(message.to_string()));
    }
}
