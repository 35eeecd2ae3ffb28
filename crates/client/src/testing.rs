//! In-process fake of the storefront backend for store tests.
//!
//! Holds one account, a small catalog and that account's cart. Tokens are
//! issued at login and can be revoked to simulate expiry. Any endpoint can be
//! made to fail or to park until released.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::Notify;

use shopfront_core::{
    CartItem, CartLineId, Credential, Email, Identity, LoginRequest, ProductId, ProfileUpdate,
    QuantityChange, Role, SignupRequest, UserId,
};

use crate::api::{ApiError, LoginResponse, RemoteApi};
use crate::session::SessionStore;
use crate::storage::{CredentialStorage, MemoryCredentialStorage};

pub const EMAIL: &str = "jane@example.com";
pub const PASSWORD: &str = "hunter22";

pub const PHONE: &str = "p-phone";
pub const HEADPHONES: &str = "p-headphones";
pub const CASE: &str = "p-case";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Signup,
    Profile,
    UpdateProfile,
    CartItems,
    CartCount,
    AddToCart,
    UpdateCartItem,
    RemoveFromCart,
    FlushCart,
}

/// Signals for a parked request: `started` fires once the request arrives,
/// `release` lets it finish.
#[derive(Clone, Default)]
pub struct Hold {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

struct Product {
    name: String,
    brand: String,
    price: Decimal,
}

struct Backend {
    identity: Identity,
    tokens: HashSet<String>,
    issued: u32,
    registered: HashSet<String>,
    catalog: HashMap<ProductId, Product>,
    cart: Vec<CartItem>,
    failing: HashSet<Endpoint>,
    calls: HashMap<Endpoint, usize>,
    holds: HashMap<Endpoint, Hold>,
    /// Appended to every profile update answer.
    profile_extra: Map<String, Value>,
}

pub struct StubApi {
    backend: Mutex<Backend>,
}

fn api_error(status: u16, message: &str) -> ApiError {
    ApiError::Api {
        status,
        message: Some(message.to_string()),
    }
}

impl StubApi {
    pub fn new() -> Self {
        Self::with_role(Role::Buyer)
    }

    pub fn seller() -> Self {
        Self::with_role(Role::Seller)
    }

    fn with_role(role: Role) -> Self {
        let identity = Identity {
            id: UserId::new("u-1"),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: Email::parse(EMAIL).unwrap_or_else(|e| panic!("{e}")),
            role,
            profile_image: None,
            phone: None,
            address: None,
        };

        let catalog = [
            (PHONE, "iPhone 15 Pro", "Apple", Decimal::from(999)),
            (HEADPHONES, "WH-1000XM5", "Sony", Decimal::from(399)),
            (CASE, "Silicone Case", "Apple", Decimal::from(20)),
        ]
        .into_iter()
        .map(|(id, name, brand, price)| {
            (
                ProductId::new(id),
                Product {
                    name: name.to_string(),
                    brand: brand.to_string(),
                    price,
                },
            )
        })
        .collect();

        Self {
            backend: Mutex::new(Backend {
                identity,
                tokens: HashSet::new(),
                issued: 0,
                registered: HashSet::from([EMAIL.to_string()]),
                catalog,
                cart: Vec::new(),
                failing: HashSet::new(),
                calls: HashMap::new(),
                holds: HashMap::new(),
                profile_extra: Map::new(),
            }),
        }
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `endpoint` answer a bare 500 until [`recover`](Self::recover) is called.
    pub fn fail(&self, endpoint: Endpoint) {
        self.backend().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.backend().failing.remove(&endpoint);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.backend().calls.get(&endpoint).copied().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.backend().calls.values().sum()
    }

    /// Issue a token as a previous run's login would have.
    pub fn issue_token(&self) -> Credential {
        let mut backend = self.backend();
        backend.issued += 1;
        let token = format!("token-{}", backend.issued);
        backend.tokens.insert(token.clone());
        Credential::new(token)
    }

    pub fn is_valid_token(&self, token: &str) -> bool {
        self.backend().tokens.contains(token)
    }

    /// Expire every issued token.
    pub fn revoke_tokens(&self) {
        self.backend().tokens.clear();
    }

    /// Park the next request to `endpoint`.
    pub fn hold_next(&self, endpoint: Endpoint) -> Hold {
        let hold = Hold::default();
        self.backend().holds.insert(endpoint, hold.clone());
        hold
    }

    /// Put `quantity` units of `product` in the cart, server side.
    pub fn seed_cart(&self, product: &str, quantity: u32) {
        let mut backend = self.backend();
        let product_id = ProductId::new(product);
        let Some(line) = backend.line_for(&product_id) else {
            panic!("unknown product {product}");
        };
        backend.cart.push(CartItem { quantity, ..line });
    }

    /// Change a catalog price, server side.
    pub fn set_price(&self, product: &str, price: Decimal) {
        let mut backend = self.backend();
        let product_id = ProductId::new(product);
        if let Some(entry) = backend.catalog.get_mut(&product_id) {
            entry.price = price;
        }
        for item in &mut backend.cart {
            if item.product_id == product_id {
                item.unit_price = price;
            }
        }
    }

    /// Add `fields` to every profile update answer from now on.
    pub fn extend_profile_answer(&self, fields: Map<String, Value>) {
        self.backend().profile_extra.extend(fields);
    }

    pub fn cart_quantity(&self, product: &str) -> Option<u32> {
        self.backend()
            .cart
            .iter()
            .find(|item| item.product_id.as_str() == product)
            .map(|item| item.quantity)
    }

    /// Count the call, then apply failure injection and token checks.
    fn enter(&self, endpoint: Endpoint, credential: Option<&Credential>) -> Result<(), ApiError> {
        let mut backend = self.backend();
        *backend.calls.entry(endpoint).or_default() += 1;

        if backend.failing.contains(&endpoint) {
            return Err(ApiError::Api {
                status: 500,
                message: None,
            });
        }
        if let Some(credential) = credential
            && !backend.tokens.contains(credential.expose_secret())
        {
            return Err(api_error(401, "Unauthorized"));
        }
        Ok(())
    }

    async fn pause(&self, endpoint: Endpoint) {
        let hold = self.backend().holds.remove(&endpoint);
        if let Some(hold) = hold {
            hold.started.notify_one();
            hold.release.notified().await;
        }
    }
}

impl Backend {
    fn line_for(&self, product_id: &ProductId) -> Option<CartItem> {
        self.catalog.get(product_id).map(|product| CartItem {
            line_id: CartLineId::new(format!("line-{product_id}")),
            product_id: product_id.clone(),
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity: 0,
            brand: product.brand.clone(),
            image_ref: None,
        })
    }
}

impl RemoteApi for StubApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.enter(Endpoint::Login, None)?;
        self.pause(Endpoint::Login).await;

        let user = {
            let backend = self.backend();
            if request.email.as_str() != backend.identity.email.as_str()
                || request.password.expose_secret() != PASSWORD
            {
                return Err(api_error(401, "Invalid email or password"));
            }
            backend.identity.clone()
        };

        let token = self.issue_token();
        Ok(LoginResponse {
            token: token.expose_secret().to_string(),
            user,
        })
    }

    async fn signup(&self, request: &SignupRequest) -> Result<Value, ApiError> {
        self.enter(Endpoint::Signup, None)?;
        self.pause(Endpoint::Signup).await;

        let mut backend = self.backend();
        if !backend.registered.insert(request.email.as_str().to_string()) {
            return Err(api_error(409, "User already exists"));
        }

        let mut record = match serde_json::to_value(request) {
            Ok(Value::Object(record)) => record,
            _ => return Err(ApiError::Parse("unserializable signup".to_string())),
        };
        record.remove("password");
        record.insert(
            "_id".to_string(),
            Value::String(format!("u-{}", backend.registered.len())),
        );
        Ok(Value::Object(record))
    }

    async fn profile(&self, credential: &Credential) -> Result<Identity, ApiError> {
        self.enter(Endpoint::Profile, Some(credential))?;
        self.pause(Endpoint::Profile).await;
        Ok(self.backend().identity.clone())
    }

    async fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> Result<Map<String, Value>, ApiError> {
        self.enter(Endpoint::UpdateProfile, Some(credential))?;
        self.pause(Endpoint::UpdateProfile).await;

        let mut backend = self.backend();
        let identity = &mut backend.identity;
        if let Some(first_name) = &update.first_name {
            identity.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &update.last_name {
            identity.last_name.clone_from(last_name);
        }
        if update.phone.is_some() {
            identity.phone.clone_from(&update.phone);
        }
        if update.address.is_some() {
            identity.address.clone_from(&update.address);
        }

        let mut fields = match serde_json::to_value(update) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        fields.insert(
            "_id".to_string(),
            Value::String(identity.id.as_str().to_string()),
        );
        fields.extend(backend.profile_extra.clone());
        Ok(fields)
    }

    async fn cart_items(&self, credential: &Credential) -> Result<Vec<CartItem>, ApiError> {
        self.enter(Endpoint::CartItems, Some(credential))?;
        self.pause(Endpoint::CartItems).await;
        Ok(self.backend().cart.clone())
    }

    async fn cart_count(&self, credential: &Credential) -> Result<u32, ApiError> {
        self.enter(Endpoint::CartCount, Some(credential))?;
        self.pause(Endpoint::CartCount).await;
        Ok(self.backend().cart.iter().map(|item| item.quantity).sum())
    }

    async fn add_to_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::AddToCart, Some(credential))?;
        self.pause(Endpoint::AddToCart).await;

        if quantity == 0 {
            return Err(api_error(400, "Quantity must be at least 1"));
        }
        let mut backend = self.backend();
        if let Some(item) = backend
            .cart
            .iter_mut()
            .find(|item| &item.product_id == product_id)
        {
            item.quantity += quantity;
            return Ok(());
        }
        let line = backend
            .line_for(product_id)
            .ok_or_else(|| api_error(404, "Product not found"))?;
        backend.cart.push(CartItem { quantity, ..line });
        Ok(())
    }

    async fn update_cart_item(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        change: QuantityChange,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::UpdateCartItem, Some(credential))?;
        self.pause(Endpoint::UpdateCartItem).await;

        let mut backend = self.backend();
        let item = backend
            .cart
            .iter_mut()
            .find(|item| &item.product_id == product_id)
            .ok_or_else(|| api_error(404, "Item not in cart"))?;
        item.quantity = change
            .apply_to(item.quantity)
            .ok_or_else(|| api_error(400, "Quantity cannot be less than 1"))?;
        Ok(())
    }

    async fn remove_from_cart(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.enter(Endpoint::RemoveFromCart, Some(credential))?;
        self.pause(Endpoint::RemoveFromCart).await;

        let mut backend = self.backend();
        let before = backend.cart.len();
        backend.cart.retain(|item| &item.product_id != product_id);
        if backend.cart.len() == before {
            return Err(api_error(404, "Item not in cart"));
        }
        Ok(())
    }

    async fn flush_cart(&self, credential: &Credential) -> Result<(), ApiError> {
        self.enter(Endpoint::FlushCart, Some(credential))?;
        self.pause(Endpoint::FlushCart).await;
        self.backend().cart.clear();
        Ok(())
    }
}

pub fn email() -> Email {
    Email::parse(EMAIL).unwrap_or_else(|e| panic!("{e}"))
}

pub fn password() -> SecretString {
    SecretString::from(PASSWORD.to_string())
}

/// A session over `api` that persists into `storage`.
pub fn session_with(
    api: &Arc<StubApi>,
    storage: MemoryCredentialStorage,
) -> (SessionStore<Arc<StubApi>>, Arc<MemoryCredentialStorage>) {
    let storage = Arc::new(storage);
    let session = SessionStore::new(
        Arc::clone(api),
        Arc::clone(&storage) as Arc<dyn CredentialStorage>,
    );
    (session, storage)
}

/// A session that has completed startup and signed in.
pub async fn signed_in(api: &Arc<StubApi>) -> SessionStore<Arc<StubApi>> {
    let (session, _) = session_with(api, MemoryCredentialStorage::new());
    session
        .initialize()
        .await
        .unwrap_or_else(|e| panic!("initialize: {e}"));
    session
        .login(email(), password())
        .await
        .unwrap_or_else(|e| panic!("login: {e}"));
    session
}
