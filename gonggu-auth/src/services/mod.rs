//! Services layer: credential/profile store access, session handling,
//! Kakao OAuth and security events.

pub mod access;
pub mod backend;
pub mod error;
pub mod firebase;
pub mod firestore;
pub mod kakao;
pub mod keys;
pub mod memory;
pub mod provisioning;
pub mod session;
pub mod webhook;

pub use access::{AccessGuard, AuthSignal, GuardView};
pub use backend::{AuthBackend, NicknameClaim};
pub use error::AuthError;
pub use firebase::{FirebaseBackend, FirebaseEndpoints};
pub use kakao::{KakaoClient, KakaoEndpoints, KakaoError};
pub use keys::{KeySetCache, KeySetFormat};
pub use memory::MemoryBackend;
pub use session::{OwnerSessionIssuer, SessionVerifier, VerifiedSession, SESSION_COOKIE_NAME};
pub use webhook::{WebhookError, WebhookVerifier};
