//! VidaShield REST client.
//!
//! Wires the [`vidashield_cache::RequestCache`] to a bearer-authenticated
//! `reqwest` client and exposes the backend's resources as typed services.

pub mod access;
pub mod alerts;
pub mod api_client;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod key;
pub mod telemetry;
pub mod users;

pub use access::{evaluate, AccessApi, AccessDecision, AccessResource, Role};
pub use alerts::{AlertFilters, AlertsApi};
pub use api_client::RestClient;
pub use auth::{ProviderSession, SessionStore, TokenProvider};
pub use config::{ClientConfig, ConfigError};
pub use dashboard::DashboardApi;
pub use error::{ClientError, ClientResult};
pub use key::ResourceKey;
pub use users::{UserFilters, UsersApi};
