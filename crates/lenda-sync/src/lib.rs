//! Offline-first sync layer for the Lenda client
//!
//! Drives the session lifecycle against the remote service and serves
//! domain data cache-first with stale fallback, so the app stays usable
//! on bad networks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod background;
pub mod cache;
pub mod cancel;
pub mod mock;
pub mod orchestrator;
pub mod repositories;

pub use api::{
    ApiResponse, ChangeTicket, LoginGrant, OtpChallenge, RemoteApi, TokenRefresh, VerifiedOtp,
};
pub use auth::{AuthSessionManager, SessionConfig, SessionState};
pub use background::{RefreshWorkerConfig, RefreshWorkerReport, TokenRefreshWorker};
pub use cache::{CachePolicy, DomainCache, Fetched, Freshness};
pub use cancel::CancelToken;
pub use lenda_core::{Error, Result};
pub use mock::MockRemoteApi;
pub use orchestrator::SyncOrchestrator;
pub use repositories::{
    LoanRepository, PaymentRepository, ProfileRepository, DEFAULT_PROFILE_TTL_MS,
};
