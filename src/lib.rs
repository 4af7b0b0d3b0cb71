//! authkeeper - client-side authentication session core.
//!
//! Owns access/refresh tokens for a networked application, decides when
//! to refresh them, guarantees that concurrent requests never trigger
//! duplicate refresh calls, and republishes a single consistent auth
//! state to all observers.
//!
//! The pieces, leaves first:
//! - [`store::TokenStore`]: durable, encrypted persistence for token
//!   material (OS keychain by default)
//! - [`api::AuthClient`]: the refresh/login/logout network calls, kept
//!   free of bearer injection so a refresh can never recurse
//! - [`auth::TokenSessionManager`]: the core - staleness judgment and
//!   single-flight refresh coordination
//! - [`state::AuthStateBroadcaster`]: the observable app auth state and
//!   one-shot UI effects
//! - [`usecase`]: Bootstrap / Login / Logout orchestration
//!
//! [`compose::SessionStack`] wires everything together explicitly.

pub mod api;
pub mod auth;
pub mod compose;
pub mod config;
pub mod models;
pub mod state;
pub mod store;
pub mod usecase;

pub use api::{AuthClient, AuthError, AuthGateway, RefreshGateway};
pub use auth::TokenSessionManager;
pub use compose::SessionStack;
pub use config::Config;
pub use models::TokenPair;
pub use state::{AppEffect, AppState, AuthNotifier, AuthStateBroadcaster};
pub use store::{KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use usecase::{BootstrapOutcome, BootstrapUseCase, LoginUseCase, LogoutUseCase};
