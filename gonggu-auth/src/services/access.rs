//! Role gate for pages outside the admin area.
//!
//! The UI layer feeds sign-in state through a `watch` channel and renders
//! whatever `GuardView` the guard publishes. Access is only ever granted
//! after the profile has been loaded and its role checked.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::middleware::admin_guard::is_admin_path;
use crate::models::{satisfies, Profile, Role};
use crate::services::backend::AuthBackend;

pub const DEFAULT_FALLBACK: Duration = Duration::from_secs(3);

/// Sign-in state as reported by the client SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    Pending,
    SignedOut,
    SignedIn { uid: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardView {
    Loading,
    /// No sign-in state arrived in time. Nothing is rendered as granted.
    Idle,
    /// The admin area is protected by the server-side route guard instead.
    Bypassed,
    Granted(Profile),
    Redirect(String),
}

#[derive(Clone)]
pub struct AccessGuard {
    backend: Arc<dyn AuthBackend>,
    allowed_roles: Arc<Vec<Role>>,
    fallback: Duration,
}

impl AccessGuard {
    pub fn new(backend: Arc<dyn AuthBackend>, allowed_roles: Vec<Role>) -> Self {
        Self {
            backend,
            allowed_roles: Arc::new(allowed_roles),
            fallback: DEFAULT_FALLBACK,
        }
    }

    pub fn with_fallback(mut self, fallback: Duration) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn applies_to(path: &str) -> bool {
        !is_admin_path(path)
    }

    /// View for a settled sign-in state; `None` while still pending.
    pub async fn decide(&self, path: &str, signal: &AuthSignal) -> Option<GuardView> {
        match signal {
            AuthSignal::Pending => None,
            AuthSignal::SignedOut => Some(GuardView::Redirect(format!(
                "/login?returnUrl={}",
                urlencoding::encode(path)
            ))),
            AuthSignal::SignedIn { uid } => Some(match self.backend.get_profile(uid).await {
                Ok(Some(profile)) if !profile.is_enabled() => {
                    tracing::info!(uid = %uid, status = ?profile.account_status, "Account not enabled");
                    GuardView::Redirect("/".to_string())
                }
                Ok(Some(profile)) if satisfies(profile.role, &self.allowed_roles) => {
                    GuardView::Granted(profile)
                }
                Ok(Some(profile)) => {
                    tracing::info!(uid = %uid, role = %profile.role, path = %path, "Role not allowed");
                    GuardView::Redirect("/".to_string())
                }
                Ok(None) => {
                    tracing::warn!(uid = %uid, "Signed in without a profile");
                    GuardView::Redirect("/".to_string())
                }
                Err(e) => {
                    tracing::error!(uid = %uid, error = %e, "Failed to load profile for access check");
                    GuardView::Redirect("/".to_string())
                }
            }),
        }
    }

    /// Watch `identity` for `path` and publish views until either side of
    /// the channel goes away.
    pub fn spawn(
        &self,
        path: impl Into<String>,
        mut identity: watch::Receiver<AuthSignal>,
    ) -> watch::Receiver<GuardView> {
        let path = path.into();
        if !Self::applies_to(&path) {
            let (_tx, rx) = watch::channel(GuardView::Bypassed);
            return rx;
        }

        let (tx, rx) = watch::channel(GuardView::Loading);
        let guard = self.clone();

        tokio::spawn(async move {
            let fallback = tokio::time::sleep(guard.fallback);
            tokio::pin!(fallback);
            let mut settled = false;
            let mut fallback_fired = false;

            let initial = identity.borrow_and_update().clone();
            if let Some(view) = guard.decide(&path, &initial).await {
                settled = true;
                tx.send_replace(view);
            }

            loop {
                tokio::select! {
                    _ = &mut fallback, if !settled && !fallback_fired => {
                        fallback_fired = true;
                        tracing::debug!(path = %path, "No sign-in state yet, stopping loading");
                        tx.send_replace(GuardView::Idle);
                    }
                    changed = identity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let signal = identity.borrow_and_update().clone();
                        if let Some(view) = guard.decide(&path, &signal).await {
                            settled = true;
                            tx.send_replace(view);
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        rx
    }
}
