//! Client registration and consent brokering
//!
//! Clients register by submitting a signed envelope; the signature is checked
//! against a key the client publishes at its own key-discovery URL
//! (trust on first use). Consent queries are validated and forwarded to the
//! consent decision service.

pub mod api;
pub mod config;
pub mod consents;
pub mod envelope;
pub mod keys;
pub mod registry;
pub mod storage;
pub mod validation;

pub use api::{router, AppState};
pub use config::Config;
pub use consents::{ConsentQueryProxy, ConsentService, HttpConsentService};
pub use envelope::{SignatureVerifier, SignedEnvelope, Verified, VerifyError};
pub use keys::{CachingKeyResolver, HttpKeyResolver, KeyError, KeyResolver, PublicKey};
pub use registry::{ClientRegistry, RegistrationError, RegistrationPayload};
pub use storage::{Client, ClientStore, FileClientStore, MemoryClientStore, StoreError, UpsertOutcome};
pub use validation::{FieldError, ValidationError};
