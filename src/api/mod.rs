//! Network collaborators for the session core.
//!
//! This module provides:
//! - `AuthClient`: reqwest-based implementation of the login/logout and
//!   refresh endpoints, speaking the backend's JSON response envelope
//! - `RefreshGateway` / `AuthGateway`: trait seams the core and use
//!   cases depend on
//! - `AuthError`: the classified failure taxonomy for every remote call
//!
//! The refresh path is deliberately isolated: `AuthClient` performs no
//! automatic bearer injection, so refreshing can never recurse.

pub mod client;
pub mod envelope;
pub mod error;
pub mod gateway;

pub use client::AuthClient;
pub use error::AuthError;
pub use gateway::{AuthGateway, RefreshGateway};
