//! Cached view of the server-held cart.
//!
//! The server is authoritative. Every mutation is sent to the remote API and
//! followed by a full re-fetch; the local snapshot is never patched from the
//! request itself.
//!
//! The snapshot is tagged with the session epoch it was fetched under. A
//! snapshot from any other epoch is invisible, and responses that arrive
//! after the session changed are dropped, so one user's cart can never show
//! up in another user's session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use shopfront_core::{
    CartItem, CartSnapshot, CartTotals, Credential, PricingPolicy, ProductId, QuantityChange,
};

use crate::api::RemoteApi;
use crate::error::{Operation, StoreError, add_breadcrumb};
use crate::session::SessionStore;

#[derive(Default)]
struct CartState {
    snapshot: CartSnapshot,
    /// Session epoch `snapshot` belongs to.
    epoch: Option<u64>,
    /// Refreshes in flight.
    loading: usize,
}

fn lock(state: &Mutex<CartState>) -> MutexGuard<'_, CartState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a refresh as in flight for as long as it lives.
struct LoadingGuard<'a> {
    state: &'a Mutex<CartState>,
}

impl<'a> LoadingGuard<'a> {
    fn new(state: &'a Mutex<CartState>) -> Self {
        lock(state).loading += 1;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.loading = state.loading.saturating_sub(1);
    }
}

// =============================================================================
// CartStore
// =============================================================================

/// Client-side cache of the signed-in user's cart.
///
/// Cheaply cloneable via `Arc`; clones share state.
pub struct CartStore<A> {
    inner: Arc<CartInner<A>>,
}

impl<A> Clone for CartStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartInner<A> {
    session: SessionStore<A>,
    state: Mutex<CartState>,
}

impl<A: RemoteApi> CartStore<A> {
    /// An empty cart bound to `session`.
    #[must_use]
    pub fn new(session: SessionStore<A>) -> Self {
        Self {
            inner: Arc::new(CartInner {
                session,
                state: Mutex::new(CartState::default()),
            }),
        }
    }

    /// The session this cart follows.
    #[must_use]
    pub fn session(&self) -> &SessionStore<A> {
        &self.inner.session
    }

    // Lock order: cart state first, then session state.
    fn state(&self) -> MutexGuard<'_, CartState> {
        lock(&self.inner.state)
    }

    fn authorize(&self) -> Result<(Credential, u64), StoreError> {
        self.inner
            .session
            .authorization()
            .ok_or(StoreError::NotAuthenticated)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The cached cart of the current session. Empty when signed out or
    /// before the first fetch.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        let state = self.state();
        match state.epoch {
            Some(epoch) if self.inner.session.is_current(epoch) => state.snapshot.clone(),
            _ => CartSnapshot::empty(),
        }
    }

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.snapshot().items
    }

    /// Unit count as reported by the server.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.snapshot().count
    }

    /// Returns `true` while a refresh is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().loading > 0
    }

    /// Sum of unit price times quantity over the cached lines.
    #[must_use]
    pub fn compute_subtotal(&self) -> Decimal {
        self.snapshot().subtotal()
    }

    /// Shipping, tax and total for the cached lines under `policy`.
    #[must_use]
    pub fn totals(&self, policy: &PricingPolicy) -> CartTotals {
        policy.totals(&self.snapshot().items)
    }

    /// Forget the cached cart.
    pub fn reset(&self) {
        let mut state = self.state();
        state.snapshot = CartSnapshot::empty();
        state.epoch = None;
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Re-fetch items and count from the server.
    ///
    /// Both requests run concurrently. Each successful half is applied even
    /// if the other fails; on failure the previous value of that half stays.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::SessionChanged`] if the session changed while the
    /// requests were in flight (nothing is applied), or
    /// [`StoreError::Remote`] with the first failure.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<CartSnapshot, StoreError> {
        let (credential, epoch) = self.authorize()?;
        let api = self.inner.session.api();

        let (items, count) = {
            let _loading = LoadingGuard::new(&self.inner.state);
            tokio::join!(api.cart_items(&credential), api.cart_count(&credential))
        };

        let mut state = self.state();
        if !self.inner.session.is_current(epoch) {
            debug!(epoch, "Discarding cart from a previous session");
            return Err(StoreError::SessionChanged);
        }
        if state.epoch != Some(epoch) {
            state.snapshot = CartSnapshot::empty();
            state.epoch = Some(epoch);
        }

        let items_error = match items {
            Ok(items) => {
                state.snapshot.items = items;
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch cart items");
                Some(e)
            }
        };
        let count_error = match count {
            Ok(count) => {
                state.snapshot.count = count;
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch cart count");
                Some(e)
            }
        };

        if let Some(source) = items_error.or(count_error) {
            let err = StoreError::remote(Operation::RefreshCart, source);
            err.capture();
            return Err(err);
        }

        debug!(
            lines = state.snapshot.items.len(),
            count = state.snapshot.count,
            "Cart refreshed"
        );
        Ok(state.snapshot.clone())
    }

    /// Add `quantity` units of a product, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::InvalidQuantity`] for zero, or [`StoreError::Remote`]
    /// if the server rejects the change. The snapshot is untouched on error.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartSnapshot, StoreError> {
        let (credential, _) = self.authorize()?;
        if quantity == 0 {
            return Err(StoreError::InvalidQuantity);
        }

        let quantity_label = quantity.to_string();
        add_breadcrumb(
            "cart",
            "Add to cart",
            Some(&[
                ("product_id", product_id.as_str()),
                ("quantity", quantity_label.as_str()),
            ]),
        );

        self.inner
            .session
            .api()
            .add_to_cart(&credential, product_id, quantity)
            .await
            .map_err(|source| StoreError::reported(Operation::AddToCart, source))?;

        Ok(self.refresh_after_mutation().await)
    }

    /// Raise or lower the quantity of a line, then re-fetch.
    ///
    /// A decrement that would take a known line below one unit is refused
    /// locally; use [`remove_item`](Self::remove_item) instead.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session,
    /// [`StoreError::InvalidQuantity`] for a zero change,
    /// [`StoreError::QuantityFloor`] for a decrement below one, or
    /// [`StoreError::Remote`] if the server rejects the change.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_item_quantity(
        &self,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<CartSnapshot, StoreError> {
        let (credential, _) = self.authorize()?;
        if change.amount() == 0 {
            return Err(StoreError::InvalidQuantity);
        }

        let snapshot = self.snapshot();
        if let Some(line) = snapshot.line(product_id)
            && change.apply_to(line.quantity).is_none()
        {
            return Err(StoreError::QuantityFloor {
                product_id: product_id.clone(),
            });
        }

        add_breadcrumb(
            "cart",
            "Update cart item",
            Some(&[("product_id", product_id.as_str())]),
        );

        self.inner
            .session
            .api()
            .update_cart_item(&credential, product_id, change)
            .await
            .map_err(|source| StoreError::reported(Operation::UpdateCartItem, source))?;

        Ok(self.refresh_after_mutation().await)
    }

    /// Remove a product's line, then re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session or
    /// [`StoreError::Remote`] if the server rejects the removal.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<CartSnapshot, StoreError> {
        let (credential, _) = self.authorize()?;

        add_breadcrumb(
            "cart",
            "Remove from cart",
            Some(&[("product_id", product_id.as_str())]),
        );

        self.inner
            .session
            .api()
            .remove_from_cart(&credential, product_id)
            .await
            .map_err(|source| StoreError::reported(Operation::RemoveFromCart, source))?;

        Ok(self.refresh_after_mutation().await)
    }

    /// Empty the cart on the server and locally. No re-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session or
    /// [`StoreError::Remote`] if the server refuses; the snapshot is kept.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<CartSnapshot, StoreError> {
        let (credential, epoch) = self.authorize()?;

        add_breadcrumb("cart", "Clear cart", None);

        self.inner
            .session
            .api()
            .flush_cart(&credential)
            .await
            .map_err(|source| StoreError::reported(Operation::ClearCart, source))?;

        let mut state = self.state();
        if self.inner.session.is_current(epoch) {
            state.snapshot = CartSnapshot::empty();
            state.epoch = Some(epoch);
        }
        Ok(CartSnapshot::empty())
    }

    /// The mutation itself succeeded; a failed re-fetch only leaves the
    /// snapshot stale.
    async fn refresh_after_mutation(&self) -> CartSnapshot {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "Re-fetch after cart mutation failed");
        }
        self.snapshot()
    }

    // =========================================================================
    // Session coupling
    // =========================================================================

    /// Bring the cart in line with the session: fetch when a new
    /// authenticated session has no snapshot yet, reset when signed out.
    ///
    /// # Errors
    ///
    /// Returns the error of the triggered refresh.
    pub async fn sync_with_session(&self) -> Result<(), StoreError> {
        let Some((_, epoch)) = self.inner.session.authorization() else {
            self.reset();
            return Ok(());
        };

        let cached = self.state().epoch;
        if cached == Some(epoch) {
            return Ok(());
        }
        self.refresh().await.map(drop)
    }

    /// Follow session transitions in a background task until the session
    /// store is dropped.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let cart = self.clone();
        let mut signal = self.inner.session.subscribe();

        tokio::spawn(async move {
            loop {
                let current = *signal.borrow_and_update();
                debug!(status = %current.status, epoch = current.epoch, "Session changed");

                if let Err(e) = cart.sync_with_session().await {
                    warn!(error = %e, "Cart sync after session change failed");
                }

                if signal.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use shopfront_core::SessionStatus;

    use super::*;
    use crate::storage::MemoryCredentialStorage;
    use crate::testing::{
        CASE, Endpoint, HEADPHONES, PHONE, StubApi, email, password, session_with, signed_in,
    };

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let api = Arc::new(StubApi::new());
        let (session, _) = session_with(&api, MemoryCredentialStorage::new());
        session.initialize().await.unwrap();
        let cart = CartStore::new(session);
        let product = ProductId::new(PHONE);

        assert!(matches!(cart.refresh().await, Err(StoreError::NotAuthenticated)));
        assert!(matches!(
            cart.add_item(&product, 1).await,
            Err(StoreError::NotAuthenticated)
        ));
        assert!(matches!(
            cart.update_item_quantity(&product, QuantityChange::Increment(1))
                .await,
            Err(StoreError::NotAuthenticated)
        ));
        assert!(matches!(
            cart.remove_item(&product).await,
            Err(StoreError::NotAuthenticated)
        ));
        assert!(matches!(cart.clear().await, Err(StoreError::NotAuthenticated)));
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_item_reflects_server_state() {
        let api = Arc::new(StubApi::new());
        let cart = CartStore::new(signed_in(&api).await);

        let snapshot = cart.add_item(&ProductId::new(PHONE), 2).await.unwrap();

        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].quantity, 2);
        assert_eq!(snapshot.count, 2);
        assert_eq!(cart.snapshot(), snapshot);
        assert_eq!(api.calls(Endpoint::CartItems), 1);
        assert_eq!(api.calls(Endpoint::CartCount), 1);
    }

    #[tokio::test]
    async fn test_add_item_rejects_zero_quantity() {
        let api = Arc::new(StubApi::new());
        let cart = CartStore::new(signed_in(&api).await);

        let err = cart.add_item(&ProductId::new(PHONE), 0).await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidQuantity));
        assert_eq!(api.calls(Endpoint::AddToCart), 0);
    }

    #[tokio::test]
    async fn test_failed_add_keeps_snapshot() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(CASE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        let before = cart.refresh().await.unwrap();

        let err = cart
            .add_item(&ProductId::new("p-missing"), 1)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Product not found");
        assert_eq!(cart.snapshot(), before);
        assert_eq!(api.calls(Endpoint::CartItems), 1);
    }

    #[tokio::test]
    async fn test_subtotal_and_totals() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        api.seed_cart(HEADPHONES, 2);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();

        assert_eq!(cart.compute_subtotal(), Decimal::from(1797));
        assert_eq!(cart.count(), 3);

        let totals = cart.totals(&PricingPolicy::default());
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::new(194_076, 2));
    }

    #[tokio::test]
    async fn test_refresh_follows_server_prices() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(CASE, 2);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();

        api.set_price(CASE, Decimal::from(15));
        cart.refresh().await.unwrap();

        assert_eq!(cart.compute_subtotal(), Decimal::from(30));
    }

    #[tokio::test]
    async fn test_decrement_below_one_is_refused_locally() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(CASE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();
        let product = ProductId::new(CASE);

        let err = cart
            .update_item_quantity(&product, QuantityChange::Decrement(1))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::QuantityFloor { .. }));
        assert_eq!(api.calls(Endpoint::UpdateCartItem), 0);
        assert_eq!(cart.snapshot().line(&product).unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_increment_then_decrement() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(CASE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();
        let product = ProductId::new(CASE);

        let snapshot = cart
            .update_item_quantity(&product, QuantityChange::Increment(2))
            .await
            .unwrap();
        assert_eq!(snapshot.line(&product).unwrap().quantity, 3);

        let snapshot = cart
            .update_item_quantity(&product, QuantityChange::Decrement(1))
            .await
            .unwrap();
        assert_eq!(snapshot.line(&product).unwrap().quantity, 2);
        assert_eq!(api.cart_quantity(CASE), Some(2));
    }

    #[tokio::test]
    async fn test_remove_item() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        api.seed_cart(CASE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();

        let snapshot = cart.remove_item(&ProductId::new(PHONE)).await.unwrap();

        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].product_id.as_str(), CASE);
        assert_eq!(snapshot.count, 1);
    }

    #[tokio::test]
    async fn test_clear_does_not_refetch() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        cart.refresh().await.unwrap();

        let snapshot = cart.clear().await.unwrap();

        assert!(snapshot.is_empty());
        assert!(cart.snapshot().is_empty());
        assert_eq!(api.calls(Endpoint::CartItems), 1);
        assert_eq!(api.cart_quantity(PHONE), None);
    }

    #[tokio::test]
    async fn test_failed_clear_keeps_snapshot() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        let before = cart.refresh().await.unwrap();

        api.fail(Endpoint::FlushCart);
        let err = cart.clear().await.unwrap_err();

        assert_eq!(err.user_message(), "Failed to clear cart");
        assert_eq!(cart.snapshot(), before);
    }

    #[tokio::test]
    async fn test_partial_refresh_failure_keeps_previous_items() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        let cart = CartStore::new(signed_in(&api).await);
        let before = cart.refresh().await.unwrap();

        api.seed_cart(CASE, 4);
        api.fail(Endpoint::CartItems);
        let err = cart.refresh().await.unwrap_err();

        assert!(matches!(
            err,
            StoreError::Remote {
                operation: Operation::RefreshCart,
                ..
            }
        ));
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items, before.items);
        assert_eq!(snapshot.count, 5);
        assert!(!cart.is_loading());

        api.recover(Endpoint::CartItems);
        assert_eq!(cart.refresh().await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_logout_hides_cart_immediately() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        let session = signed_in(&api).await;
        let cart = CartStore::new(session.clone());
        cart.refresh().await.unwrap();

        session.logout();

        assert!(cart.snapshot().is_empty());
        assert_eq!(cart.compute_subtotal(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_response_after_logout_is_discarded() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(PHONE, 1);
        let session = signed_in(&api).await;
        let cart = CartStore::new(session.clone());

        let hold = api.hold_next(Endpoint::CartItems);
        let pending = tokio::spawn({
            let cart = cart.clone();
            async move { cart.refresh().await }
        });
        hold.started.notified().await;
        assert!(cart.is_loading());

        session.logout();
        hold.release.notify_one();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(StoreError::SessionChanged)));
        assert!(cart.snapshot().is_empty());
        assert!(!cart.is_loading());

        // The next user never sees the previous cart either
        session.login(email(), password()).await.unwrap();
        api.fail(Endpoint::CartItems);
        let _ = cart.refresh().await;
        assert!(cart.items().is_empty());
    }

    #[tokio::test]
    async fn test_watch_session_follows_login_and_logout() {
        let api = Arc::new(StubApi::new());
        api.seed_cart(HEADPHONES, 1);
        let (session, _) = session_with(&api, MemoryCredentialStorage::new());
        let cart = CartStore::new(session.clone());
        let watcher = cart.watch_session();

        session.initialize().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);

        session.login(email(), password()).await.unwrap();
        eventually(|| cart.count() == 1).await;

        session.logout();
        eventually(|| api.calls(Endpoint::CartItems) == 1 && cart.snapshot().is_empty()).await;

        watcher.abort();
    }
}
