//! Shopfront CLI - Sign in and manage a storefront cart from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the password may also come from SHOPFRONT_PASSWORD)
//! shopfront login -e jane@example.com -p hunter22
//!
//! # Show the signed-in account
//! shopfront whoami
//!
//! # Work with the cart
//! shopfront cart add p-123 --quantity 2
//! shopfront cart dec p-123
//! shopfront cart totals
//!
//! # Sign out
//! shopfront logout
//! ```
//!
//! # Commands
//!
//! - `login`, `logout`, `whoami` - Session lifecycle
//! - `register` - Create an account
//! - `profile update` - Edit profile fields
//! - `cart list|add|inc|dec|remove|clear|totals` - Cart management

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopfront_client::ClientConfig;
use shopfront_core::{ProfileUpdate, QuantityChange, Role, SignupForm};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CliError, Context};

#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about = "Shopfront storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "SHOPFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored credential
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Create a new account
    Register {
        /// First name
        #[arg(long)]
        first_name: String,

        /// Last name
        #[arg(long)]
        last_name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long, env = "SHOPFRONT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Password again
        #[arg(long, env = "SHOPFRONT_CONFIRM_PASSWORD", hide_env_values = true)]
        confirm_password: String,

        /// Account role (`buyer`, `seller`)
        #[arg(short, long, default_value = "buyer")]
        role: Role,
    },
    /// Manage the signed-in profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Change one or more profile fields
    Update {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        address: Option<String>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart lines
    List,
    /// Add a product
    Add {
        /// Product ID
        product_id: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Raise the quantity of a line
    Inc {
        /// Product ID
        product_id: String,

        #[arg(short, long, default_value_t = 1)]
        by: u32,
    },
    /// Lower the quantity of a line (never below 1)
    Dec {
        /// Product ID
        product_id: String,

        #[arg(short, long, default_value_t = 1)]
        by: u32,
    },
    /// Remove a line
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Empty the cart
    Clear,
    /// Show subtotal, shipping, tax and total
    Totals,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfront=info,shopfront_client=warn".into());

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            tracing::error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), CliError> {
    let ctx = Context::connect(config).await?;

    match cli.command {
        Commands::Login { email, password } => {
            commands::session::login(&ctx, email, password).await?;
        }
        Commands::Logout => commands::session::logout(&ctx),
        Commands::Whoami => commands::session::whoami(&ctx),
        Commands::Register {
            first_name,
            last_name,
            email,
            password,
            confirm_password,
            role,
        } => {
            let form = SignupForm {
                first_name,
                last_name,
                email,
                password: password.into(),
                confirm_password: confirm_password.into(),
                role,
            };
            commands::session::register(&ctx, form).await?;
        }
        Commands::Profile { action } => match action {
            ProfileAction::Update {
                first_name,
                last_name,
                phone,
                address,
            } => {
                let update = ProfileUpdate {
                    first_name,
                    last_name,
                    phone,
                    address,
                };
                commands::session::update_profile(&ctx, &update).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list(&ctx).await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&ctx, &product_id, quantity).await?,
            CartAction::Inc { product_id, by } => {
                commands::cart::adjust(&ctx, &product_id, QuantityChange::Increment(by)).await?;
            }
            CartAction::Dec { product_id, by } => {
                commands::cart::adjust(&ctx, &product_id, QuantityChange::Decrement(by)).await?;
            }
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, &product_id).await?,
            CartAction::Clear => commands::cart::clear(&ctx).await?,
            CartAction::Totals => commands::cart::totals(&ctx).await?,
        },
    }
    Ok(())
}
