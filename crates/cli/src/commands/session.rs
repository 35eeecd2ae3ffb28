//! Session commands: login, logout, whoami, register, profile update.

use secrecy::SecretString;
use tracing::info;

use shopfront_core::{LoginForm, ProfileUpdate, SignupForm};

use super::{CliError, Context};

/// Sign in and report the cart the account already holds.
pub async fn login(ctx: &Context, email: String, password: String) -> Result<(), CliError> {
    let request = LoginForm {
        email,
        password: SecretString::from(password),
    }
    .into_request()?;

    let identity = ctx.session.login(request.email, request.password).await?;
    info!("Signed in as {} <{}>", identity.full_name(), identity.email);

    match ctx.cart.refresh().await {
        Ok(snapshot) if !snapshot.is_empty() => {
            info!("Your cart holds {} item(s)", snapshot.count);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("{}", e.user_message()),
    }
    Ok(())
}

pub fn logout(ctx: &Context) {
    let was_signed_in = ctx.session.is_authenticated();
    ctx.session.logout();
    ctx.cart.reset();

    if was_signed_in {
        info!("Signed out");
    } else {
        info!("Not signed in");
    }
}

pub fn whoami(ctx: &Context) {
    match ctx.session.identity() {
        Some(identity) => {
            info!("{} <{}>", identity.full_name(), identity.email);
            info!("Role: {}", identity.role);
            if let Some(phone) = &identity.phone {
                info!("Phone: {phone}");
            }
            if let Some(address) = &identity.address {
                info!("Address: {address}");
            }
        }
        None => info!("Not signed in"),
    }
}

/// Create an account. The caller still has to sign in afterwards.
pub async fn register(ctx: &Context, form: SignupForm) -> Result<(), CliError> {
    let request = form.into_request()?;
    ctx.session.register(&request).await?;
    info!(
        "Account created for {}. Sign in with `shopfront login -e {}`",
        request.email, request.email
    );
    Ok(())
}

pub async fn update_profile(ctx: &Context, update: &ProfileUpdate) -> Result<(), CliError> {
    ctx.require_session()?;
    if update.is_empty() {
        return Err(CliError::InvalidArgument(
            "Nothing to update: pass at least one field".to_string(),
        ));
    }

    let identity = ctx.session.update_profile(update).await?;
    info!("Profile updated for {}", identity.full_name());
    Ok(())
}
