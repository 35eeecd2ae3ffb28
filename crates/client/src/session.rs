//! Authentication lifecycle.
//!
//! [`SessionStore`] owns the bearer credential and the authenticated
//! identity. It is the only writer of the persisted credential, and every
//! transition it makes is published on a `watch` channel as a
//! [`SessionSignal`] so dependents (the cart) can follow along.
//!
//! # Epochs
//!
//! Each authentication period gets a new epoch number. Login, logout, forced
//! logout and a successful startup validation all bump it. A response is
//! applied only if the epoch it was issued under is still current, so a slow
//! call that straddles a logout can never resurrect the old session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use shopfront_core::{
    Credential, Email, Identity, LoginRequest, ProfileUpdate, SessionStatus, SignupRequest,
};

use crate::api::{ApiError, RemoteApi};
use crate::error::{Operation, StoreError, clear_sentry_user, set_sentry_user};
use crate::storage::CredentialStorage;

/// Authentication transition published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSignal {
    pub status: SessionStatus,
    pub epoch: u64,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub identity: Option<Identity>,
    pub has_credential: bool,
    pub epoch: u64,
}

#[derive(Default)]
struct SessionState {
    status: SessionStatus,
    credential: Option<Credential>,
    identity: Option<Identity>,
    epoch: u64,
}

impl SessionState {
    const fn signal(&self) -> SessionSignal {
        SessionSignal {
            status: self.status,
            epoch: self.epoch,
        }
    }

    fn authenticate(&mut self, credential: Credential, identity: Identity) {
        self.credential = Some(credential);
        self.identity = Some(identity);
        self.status = SessionStatus::Authenticated;
        self.epoch += 1;
    }

    /// Drop credential and identity. Returns `false` if already signed out.
    fn sign_out(&mut self) -> bool {
        let changed = self.status != SessionStatus::Unauthenticated
            || self.credential.is_some()
            || self.identity.is_some();

        self.credential = None;
        self.identity = None;
        if changed {
            self.status = SessionStatus::Unauthenticated;
            self.epoch += 1;
        }
        changed
    }
}

// =============================================================================
// SessionStore
// =============================================================================

/// Owner of the authentication lifecycle.
///
/// Cheaply cloneable via `Arc`; clones share state.
pub struct SessionStore<A> {
    inner: Arc<SessionInner<A>>,
}

impl<A> Clone for SessionStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SessionInner<A> {
    api: A,
    storage: Arc<dyn CredentialStorage>,
    /// Held across credential file writes; taken before `state`.
    persist: Mutex<()>,
    state: Mutex<SessionState>,
    signal: watch::Sender<SessionSignal>,
}

impl<A: RemoteApi> SessionStore<A> {
    /// Create a store in the `Initializing` state. Call
    /// [`initialize`](Self::initialize) before anything else.
    pub fn new(api: A, storage: Arc<dyn CredentialStorage>) -> Self {
        let (signal, _) = watch::channel(SessionSignal::default());

        Self {
            inner: Arc::new(SessionInner {
                api,
                storage,
                persist: Mutex::new(()),
                state: Mutex::new(SessionState::default()),
                signal,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self) -> MutexGuard<'_, ()> {
        self.inner
            .persist
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.inner.signal.send_replace(state.signal());
    }

    pub(crate) fn api(&self) -> &A {
        &self.inner.api
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current authentication status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// The authenticated identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state().identity.clone()
    }

    /// Returns `true` while a validated session is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// Returns `true` if the signed-in account is a seller.
    #[must_use]
    pub fn is_seller(&self) -> bool {
        self.state()
            .identity
            .as_ref()
            .is_some_and(Identity::is_seller)
    }

    /// Consistent view of status, identity and epoch.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            status: state.status,
            identity: state.identity.clone(),
            has_credential: state.credential.is_some(),
            epoch: state.epoch,
        }
    }

    /// Receive every authentication transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSignal> {
        self.inner.signal.subscribe()
    }

    /// Credential and epoch of the active session, if authenticated.
    pub(crate) fn authorization(&self) -> Option<(Credential, u64)> {
        let state = self.state();
        match (&state.status, &state.credential) {
            (SessionStatus::Authenticated, Some(credential)) => {
                Some((credential.clone(), state.epoch))
            }
            _ => None,
        }
    }

    /// Returns `true` if `epoch` is the active authenticated epoch.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        let state = self.state();
        state.status == SessionStatus::Authenticated && state.epoch == epoch
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Restore the session persisted by an earlier run.
    ///
    /// Without a stored credential the session becomes `Unauthenticated`.
    /// With one, the credential is validated by fetching the profile; a
    /// rejected credential is discarded and `Ok(None)` is returned, since
    /// an expired token at startup is routine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionChanged`] if a login or logout happened
    /// while the profile request was in flight.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<Option<Identity>, StoreError> {
        if self.is_authenticated() {
            return self.fetch_profile().await.map(Some);
        }

        let stored = match self.inner.storage.load() {
            Ok(credential) => credential.filter(|credential| !credential.is_blank()),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted credential");
                None
            }
        };

        let Some(credential) = stored else {
            debug!("No persisted credential");
            let mut state = self.state();
            if state.sign_out() {
                self.publish(&state);
            }
            return Ok(None);
        };

        {
            let mut state = self.state();
            state.status = SessionStatus::Initializing;
            state.credential = Some(credential);
            self.publish(&state);
        }

        match self.fetch_profile().await {
            Ok(identity) => Ok(Some(identity)),
            Err(StoreError::Remote { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Validate the current credential by fetching the profile.
    ///
    /// On success the identity is (re)loaded and the session is
    /// `Authenticated`. On any failure the credential is treated as invalid
    /// and the session is signed out.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a credential,
    /// [`StoreError::Remote`] if the profile call fails, or
    /// [`StoreError::SessionChanged`] if the session moved on meanwhile.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<Identity, StoreError> {
        let (credential, epoch) = {
            let state = self.state();
            (state.credential.clone(), state.epoch)
        };

        let Some(credential) = credential else {
            self.logout();
            return Err(StoreError::NotAuthenticated);
        };

        match self.inner.api.profile(&credential).await {
            Ok(identity) => {
                {
                    let mut state = self.state();
                    if state.epoch != epoch || state.credential.is_none() {
                        debug!(epoch, "Discarding profile from a superseded session");
                        return Err(StoreError::SessionChanged);
                    }

                    if state.status == SessionStatus::Authenticated {
                        state.identity = Some(identity.clone());
                    } else {
                        state.authenticate(credential, identity.clone());
                    }
                    self.publish(&state);
                }

                set_sentry_user(&identity);
                info!(user_id = %identity.id, "Session validated");
                Ok(identity)
            }
            Err(source) => {
                warn!(error = %source, "Profile fetch failed, discarding credential");
                self.force_logout(epoch);
                Err(StoreError::remote(Operation::FetchProfile, source))
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// On success the credential is persisted and the session becomes
    /// `Authenticated` under a new epoch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Remote`] if the server rejects the login and
    /// [`StoreError::Storage`] if the credential cannot be persisted. The
    /// existing session is left untouched in both cases.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: Email, password: SecretString) -> Result<Identity, StoreError> {
        let request = LoginRequest { email, password };

        let response = self
            .inner
            .api
            .login(&request)
            .await
            .map_err(|source| StoreError::reported(Operation::Login, source))?;

        if response.token.trim().is_empty() {
            return Err(StoreError::reported(
                Operation::Login,
                ApiError::Parse("login response carried an empty token".to_string()),
            ));
        }

        let credential = Credential::new(response.token);
        let identity = response.user;

        {
            let _persist = self.persist();
            self.inner.storage.store(&credential)?;

            let mut state = self.state();
            state.authenticate(credential, identity.clone());
            self.publish(&state);
        }

        set_sentry_user(&identity);
        info!(user_id = %identity.id, "Signed in");
        Ok(identity)
    }

    /// Create an account. Does not sign the caller in.
    ///
    /// Returns the record the server created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Remote`] if the server rejects the signup.
    #[instrument(skip_all, fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: &SignupRequest) -> Result<Value, StoreError> {
        let record = self
            .inner
            .api
            .signup(request)
            .await
            .map_err(|source| StoreError::reported(Operation::Register, source))?;

        info!("Account registered");
        Ok(record)
    }

    /// Sign out: forget the persisted credential, the identity and the
    /// session. Safe to call when already signed out.
    pub fn logout(&self) {
        let _persist = self.persist();
        self.clear_persisted();

        let mut state = self.state();
        self.sign_out_locked(&mut state);
    }

    /// Sign out only if `epoch` is still the session's epoch.
    fn force_logout(&self, epoch: u64) {
        let _persist = self.persist();
        if self.state().epoch != epoch {
            debug!(epoch, "Session already replaced, keeping it");
            return;
        }
        self.clear_persisted();

        let mut state = self.state();
        if state.epoch == epoch {
            self.sign_out_locked(&mut state);
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.inner.storage.clear() {
            error!(error = %e, "Failed to remove persisted credential");
        }
    }

    fn sign_out_locked(&self, state: &mut SessionState) {
        if state.sign_out() {
            self.publish(state);
            clear_sentry_user();
            info!("Signed out");
        }
    }

    /// Edit profile fields and merge the server's answer into the identity.
    ///
    /// # Errors
    ///
    /// If the server's answer cannot be merged, the change has still been
    /// applied remotely, so the identity is re-fetched instead.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::Remote`] if the update (or the re-fetch) fails, and
    /// [`StoreError::SessionChanged`] if the session moved on meanwhile.
    #[instrument(skip_all)]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Identity, StoreError> {
        let (credential, epoch) = self.authorization().ok_or(StoreError::NotAuthenticated)?;

        let fields = self
            .inner
            .api
            .update_profile(&credential, update)
            .await
            .map_err(|source| StoreError::reported(Operation::UpdateProfile, source))?;

        let merged = {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!(epoch, "Discarding profile update from a superseded session");
                return Err(StoreError::SessionChanged);
            }
            let Some(current) = state.identity.as_ref() else {
                return Err(StoreError::SessionChanged);
            };

            match current.merged_with(&fields) {
                Ok(merged) => {
                    state.identity = Some(merged.clone());
                    self.publish(&state);
                    Some(merged)
                }
                Err(e) => {
                    warn!(error = %e, "Profile update answer did not merge, re-fetching profile");
                    None
                }
            }
        };

        match merged {
            Some(identity) => Ok(identity),
            None => self.fetch_profile().await,
        }
    }
}
