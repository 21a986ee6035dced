//! Authentication module for managing the user session lifecycle.
//!
//! This module provides:
//! - `SessionController`: login, registration, logout, hydrate and silent refresh
//! - `SessionStore`: persistence of the session record (file, keychain or memory)
//! - `SessionError`: the error kinds surfaced to the UI
//!
//! Registration never logs the user in; a separate `login` is required.

pub mod controller;
pub mod error;
pub mod session;
pub mod store;
pub mod validation;

pub use controller::SessionController;
pub use error::{AuthOperation, SessionError};
pub use session::{SessionData, SessionSnapshot, User, UserId};
pub use store::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};
