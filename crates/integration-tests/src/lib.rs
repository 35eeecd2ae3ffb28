//! Integration tests for Shopfront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```
//!
//! No external services are needed. [`FakeBackend`] serves an in-memory
//! storefront API with `axum` on an ephemeral localhost port, and the tests
//! drive the real `reqwest` client and both stores against it.
//!
//! # Test Categories
//!
//! - `http_api` - Wire format of every endpoint
//! - `session_flow` - Login, restore across restarts, expiry, profile edits
//! - `cart_flow` - Cart mutations, totals and user switching

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use shopfront_client::{ApiConfig, HttpApi};

pub const BUYER_EMAIL: &str = "jane@example.com";
pub const BUYER_PASSWORD: &str = "hunter22";
pub const SELLER_EMAIL: &str = "sam@example.com";
pub const SELLER_PASSWORD: &str = "sellerpass";

pub const PHONE: &str = "p-phone";
pub const HEADPHONES: &str = "p-headphones";
pub const CASE: &str = "p-case";

// =============================================================================
// Backend state
// =============================================================================

#[derive(Debug, Clone)]
struct Account {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    role: String,
    phone: Option<String>,
    address: Option<String>,
}

impl Account {
    fn to_json(&self) -> Value {
        json!({
            "_id": self.id,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "email": self.email,
            "role": self.role,
            "phone": self.phone,
            "address": self.address,
        })
    }
}

struct Product {
    name: &'static str,
    brand: &'static str,
    /// Sent verbatim in cart listings.
    price: Value,
}

struct Line {
    product_id: String,
    quantity: u32,
}

struct Backend {
    /// Keyed by email.
    accounts: HashMap<String, Account>,
    /// Token to account email.
    tokens: HashMap<String, String>,
    catalog: HashMap<&'static str, Product>,
    /// Keyed by account id.
    carts: HashMap<String, Vec<Line>>,
    fail_cart_reads: bool,
}

impl Backend {
    fn seeded() -> Self {
        let accounts = [
            ("u-1", "Jane", "Doe", BUYER_EMAIL, BUYER_PASSWORD, "buyer"),
            ("u-2", "Sam", "Seller", SELLER_EMAIL, SELLER_PASSWORD, "seller"),
        ]
        .into_iter()
        .map(|(id, first_name, last_name, email, password, role)| {
            (
                email.to_string(),
                Account {
                    id: id.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    role: role.to_string(),
                    phone: None,
                    address: None,
                },
            )
        })
        .collect();

        let catalog = HashMap::from([
            (
                PHONE,
                Product {
                    name: "iPhone 15 Pro",
                    brand: "Apple",
                    price: json!(999),
                },
            ),
            (
                HEADPHONES,
                Product {
                    name: "WH-1000XM5",
                    brand: "Sony",
                    price: json!(399),
                },
            ),
            (
                CASE,
                Product {
                    name: "Silicone Case",
                    brand: "Apple",
                    price: json!(20),
                },
            ),
        ]);

        Self {
            accounts,
            tokens: HashMap::new(),
            catalog,
            carts: HashMap::new(),
            fail_cart_reads: false,
        }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Account, Response> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.tokens.get(token))
            .and_then(|email| self.accounts.get(email))
            .cloned()
            .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }

    fn cart_json(&self, account: &Account) -> Vec<Value> {
        self.carts
            .get(&account.id)
            .into_iter()
            .flatten()
            .filter_map(|line| {
                let product = self.catalog.get(line.product_id.as_str())?;
                Some(json!({
                    "_id": format!("line-{}-{}", account.id, line.product_id),
                    "productId": line.product_id,
                    "productName": product.name,
                    "price": product.price,
                    "quantity": line.quantity,
                    "brand": product.brand,
                    "image": format!("/images/{}.png", line.product_id),
                }))
            })
            .collect()
    }
}

type SharedBackend = Arc<Mutex<Backend>>;

fn lock(backend: &SharedBackend) -> MutexGuard<'_, Backend> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(backend): State<SharedBackend>, Json(body): Json<LoginBody>) -> Response {
    let mut backend = lock(&backend);
    let Some(account) = backend
        .accounts
        .get(&body.email)
        .filter(|account| account.password == body.password)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid email or password");
    };

    let token = Uuid::new_v4().to_string();
    backend.tokens.insert(token.clone(), account.email.clone());
    Json(json!({ "token": token, "user": account.to_json() })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    role: String,
}

async fn signup(State(backend): State<SharedBackend>, Json(body): Json<SignupBody>) -> Response {
    let mut backend = lock(&backend);
    if backend.accounts.contains_key(&body.email) {
        return error(StatusCode::CONFLICT, "User already exists");
    }

    let account = Account {
        id: format!("u-{}", backend.accounts.len() + 1),
        first_name: body.first_name,
        last_name: body.last_name,
        email: body.email.clone(),
        password: body.password,
        role: body.role,
        phone: None,
        address: None,
    };
    let record = account.to_json();
    backend.accounts.insert(body.email, account);
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn profile(State(backend): State<SharedBackend>, headers: HeaderMap) -> Response {
    let backend = lock(&backend);
    match backend.authenticate(&headers) {
        Ok(account) => Json(account.to_json()).into_response(),
        Err(response) => response,
    }
}

async fn update_profile(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(fields): Json<Map<String, Value>>,
) -> Response {
    let mut backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let Some(stored) = backend.accounts.get_mut(&account.email) else {
        return error(StatusCode::NOT_FOUND, "User not found");
    };

    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
    if let Some(first_name) = text("firstName") {
        stored.first_name = first_name;
    }
    if let Some(last_name) = text("lastName") {
        stored.last_name = last_name;
    }
    if let Some(phone) = text("phone") {
        stored.phone = Some(phone);
    }
    if let Some(address) = text("address") {
        stored.address = Some(address);
    }

    let mut changed = fields.clone();
    changed.insert("_id".to_string(), Value::String(stored.id.clone()));
    Json(Value::Object(changed)).into_response()
}

async fn cart_list(State(backend): State<SharedBackend>, headers: HeaderMap) -> Response {
    let backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    if backend.fail_cart_reads {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({ "items": backend.cart_json(&account) })).into_response()
}

async fn cart_count(State(backend): State<SharedBackend>, headers: HeaderMap) -> Response {
    let backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    if backend.fail_cart_reads {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let count: u32 = backend
        .carts
        .get(&account.id)
        .into_iter()
        .flatten()
        .map(|line| line.quantity)
        .sum();
    Json(json!({ "count": count })).into_response()
}

#[derive(Deserialize)]
struct AddBody {
    quantity: u32,
}

async fn add_to_cart(
    State(backend): State<SharedBackend>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Response {
    let mut backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    if !backend.catalog.contains_key(product_id.as_str()) {
        return error(StatusCode::NOT_FOUND, "Product not found");
    }
    if body.quantity == 0 {
        return error(StatusCode::BAD_REQUEST, "Quantity must be at least 1");
    }

    let cart = backend.carts.entry(account.id).or_default();
    match cart.iter_mut().find(|line| line.product_id == product_id) {
        Some(line) => line.quantity += body.quantity,
        None => cart.push(Line {
            product_id,
            quantity: body.quantity,
        }),
    }
    Json(json!({ "message": "Added to cart" })).into_response()
}

#[derive(Deserialize)]
struct UpdateBody {
    inc: Option<u32>,
    dec: Option<u32>,
}

async fn update_cart_item(
    State(backend): State<SharedBackend>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> Response {
    let mut backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let Some(line) = backend
        .carts
        .get_mut(&account.id)
        .and_then(|cart| cart.iter_mut().find(|line| line.product_id == product_id))
    else {
        return error(StatusCode::NOT_FOUND, "Item not in cart");
    };

    match (body.inc, body.dec) {
        (Some(inc), None) => line.quantity += inc,
        (None, Some(dec)) if dec < line.quantity => line.quantity -= dec,
        (None, Some(_)) => {
            return error(StatusCode::BAD_REQUEST, "Quantity cannot be less than 1");
        }
        _ => return error(StatusCode::BAD_REQUEST, "Send exactly one of inc or dec"),
    }
    Json(json!({ "message": "Cart updated" })).into_response()
}

async fn remove_from_cart(
    State(backend): State<SharedBackend>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    let cart = backend.carts.entry(account.id).or_default();
    let before = cart.len();
    cart.retain(|line| line.product_id != product_id);
    if cart.len() == before {
        return error(StatusCode::NOT_FOUND, "Item not in cart");
    }
    Json(json!({ "message": "Removed from cart" })).into_response()
}

async fn flush_cart(State(backend): State<SharedBackend>, headers: HeaderMap) -> Response {
    let mut backend = lock(&backend);
    let account = match backend.authenticate(&headers) {
        Ok(account) => account,
        Err(response) => return response,
    };
    backend.carts.remove(&account.id);
    Json(json!({ "message": "Cart cleared" })).into_response()
}

fn router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/api/v1/user/login", post(login))
        .route("/api/v1/user/signup", post(signup))
        .route("/api/v1/user/profile/", get(profile))
        .route("/api/v1/user/profile/name", put(update_profile))
        .route("/api/v3/user/cart/list", get(cart_list))
        .route("/api/v3/user/cart/item/count", get(cart_count))
        .route("/api/v3/product/add/cart/{product_id}", post(add_to_cart))
        .route("/api/v3/user/cart/{product_id}/update", post(update_cart_item))
        .route(
            "/api/v3/product/delete/cart/{product_id}",
            post(remove_from_cart),
        )
        .route("/api/v3/user/cart/flush", delete(flush_cart))
        .with_state(backend)
}

// =============================================================================
// FakeBackend
// =============================================================================

/// In-memory storefront API listening on `127.0.0.1`.
///
/// The server task is aborted when the handle is dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    backend: SharedBackend,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend seeded with a buyer, a seller and a small catalog.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let backend = Arc::new(Mutex::new(Backend::seeded()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Failed to read local address");

        let app = router(Arc::clone(&backend));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake backend stopped");
        });

        Self {
            addr,
            backend,
            server,
        }
    }

    /// Base URL the client should be configured with.
    ///
    /// # Panics
    ///
    /// Never in practice; the address always forms a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).expect("Invalid fake backend URL")
    }

    /// A real HTTP client pointed at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn api(&self) -> HttpApi {
        HttpApi::new(&ApiConfig::new(self.base_url())).expect("Failed to build HTTP client")
    }

    /// Log in directly and return the raw token.
    pub fn issue_token(&self, email: &str) -> String {
        let token = Uuid::new_v4().to_string();
        lock(&self.backend)
            .tokens
            .insert(token.clone(), email.to_string());
        token
    }

    /// Invalidate every issued token.
    pub fn expire_tokens(&self) {
        lock(&self.backend).tokens.clear();
    }

    /// Make the cart list and count endpoints answer 500 with no body.
    pub fn fail_cart_reads(&self, fail: bool) {
        lock(&self.backend).fail_cart_reads = fail;
    }

    /// Put units of a product in an account's cart, server side.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a known account.
    pub fn seed_cart(&self, email: &str, product_id: &str, quantity: u32) {
        let mut backend = lock(&self.backend);
        let account_id = backend
            .accounts
            .get(email)
            .map(|account| account.id.clone())
            .expect("Unknown account");
        backend.carts.entry(account_id).or_default().push(Line {
            product_id: product_id.to_string(),
            quantity,
        });
    }

    /// Replace the price the cart listing reports for a product.
    ///
    /// # Panics
    ///
    /// Panics if `product_id` is not in the catalog.
    pub fn set_price(&self, product_id: &str, price: Value) {
        lock(&self.backend)
            .catalog
            .get_mut(product_id)
            .expect("Unknown product")
            .price = price;
    }

    /// Server-side quantity of a product in an account's cart.
    #[must_use]
    pub fn cart_quantity(&self, email: &str, product_id: &str) -> Option<u32> {
        let backend = lock(&self.backend);
        let account = backend.accounts.get(email)?;
        backend
            .carts
            .get(&account.id)?
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.quantity)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
