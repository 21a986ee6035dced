//! HTTP layer: the auth service client and the token transport.
//!
//! Auth endpoints (`/auth/login`, `/auth/refresh`, ...) go through
//! `HttpAuthService` directly. Everything else goes through
//! `TokenTransport`, which attaches the bearer token and performs
//! a single-flight refresh on 401.

pub mod error;
pub mod service;
pub mod transport;

pub use error::ApiError;
pub use service::{
    AuthService, HttpAuthService, LoginResponse, MessageResponse, RefreshResponse, UserResponse,
};
pub use transport::{
    ApiRequest, CurrentTokenProvider, RefreshCallback, RefreshFailure, TokenSlot, TokenTransport,
};
