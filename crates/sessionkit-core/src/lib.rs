//! Client-side authentication session library.
//!
//! - [`auth`]: the session controller, credential store and error taxonomy
//! - [`api`]: the auth service client and the bearer-token transport
//! - [`inactivity`]: the inactivity countdown and forced logout
//! - [`config`]: configuration loading
//!
//! A typical embedding:
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use sessionkit_core::{Config, SessionController};
//!
//! let config = Config::load()?;
//! let controller = SessionController::from_config(&config, config.session_store()?)?;
//! if !controller.hydrate().await {
//!     controller.login("test@example.com", "123456").await?;
//! }
//! let profile: serde_json::Value = controller.transport().get("/profile").await?;
//! # let _ = profile;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod inactivity;

pub use api::{ApiError, ApiRequest, TokenTransport};
pub use auth::{SessionController, SessionError, User};
pub use config::Config;
pub use inactivity::{InactivityState, MonitorSnapshot};
