//! Device-grant login, credential storage, and failed-attempt lockout.

pub mod client;
pub mod device_code;
pub mod error;
pub mod rate_guard;
pub mod service;
pub mod store;
pub mod token;

pub use client::DeviceAuthClient;
pub use device_code::{
    wait_for_authorization, DeviceErrorCode, DeviceFlow, DevicePoll, DeviceSession, PollSchedule,
    DEFAULT_SLOW_DOWN_STEP,
};
pub use error::AuthError;
pub use rate_guard::{RateDecision, RateGuard, RatePolicy};
pub use service::{AuthService, LoginPrompt, LogoutReport};
pub use store::{
    CredentialSource, CredentialStore, CredentialStoreConfig, FileCredentialStore,
    ResolvedCredential,
};
pub use token::Credential;
