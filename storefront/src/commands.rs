//! One function per subcommand. Each returns the text to print.

use anyhow::{anyhow, bail, Result};
use storefront_api::endpoints::users::ProductSummary;
use storefront_api::{ApiError, Request};
use storefront_auth::{AuthContext, AuthError, SessionPhase, UserProfile};

pub const SESSION_ENDED: &str = "Your session has ended. Run `storefront login` to sign in again.";
pub const NOT_SIGNED_IN: &str = "Not signed in. Run `storefront login` first.";

pub async fn login(context: &AuthContext, email: &str, password: &str) -> Result<String> {
    match context.sign_in(email, password).await {
        Ok(profile) => Ok(format!(
            "Signed in as {} <{}> ({} active listings)",
            profile.name, profile.email, profile.active_listing_count
        )),
        Err(AuthError::InvalidCredentials(message)) => bail!("Login failed: {}", message),
        Err(e) => Err(anyhow!(e).context("Login failed")),
    }
}

pub async fn logout(context: &AuthContext) -> Result<String> {
    if context.phase() == SessionPhase::Unauthenticated {
        return Ok("Not signed in".to_string());
    }
    context.sign_out().await?;
    Ok("Signed out".to_string())
}

pub async fn whoami(context: &AuthContext) -> Result<String> {
    let profile = require_profile(context)?;

    let mut lines = vec![format!("{} <{}>", profile.name, profile.email)];
    if let Some(tel) = &profile.tel {
        lines.push(format!("Phone: {}", tel));
    }
    lines.push(format!("Active listings: {}", profile.active_listing_count));
    Ok(lines.join("\n"))
}

/// List the user's products and reconcile the cached active count with them.
pub async fn listings(context: &AuthContext) -> Result<String> {
    let profile = require_profile(context)?;

    let products = context
        .client()
        .send(Request::users().products())
        .await
        .map_err(|e| session_error(context, e))?;

    let active = products.iter().filter(|product| product.is_active).count();
    let delta = i64::try_from(active)? - i64::from(profile.active_listing_count);
    if delta != 0 {
        tracing::info!(delta, "Cached active listing count out of date");
        context
            .update_active_listing_count(i32::try_from(delta)?)
            .await?;
    }

    if products.is_empty() {
        return Ok("No listings yet".to_string());
    }

    let mut lines: Vec<String> = products.iter().map(format_listing).collect();
    lines.push(format!("{} active of {}", active, products.len()));
    Ok(lines.join("\n"))
}

fn require_profile(context: &AuthContext) -> Result<UserProfile> {
    context.profile().ok_or_else(|| anyhow!(NOT_SIGNED_IN))
}

/// A request failure that ended the session reads as "log in again".
fn session_error(context: &AuthContext, error: ApiError) -> anyhow::Error {
    if context.phase() == SessionPhase::Unauthenticated {
        tracing::warn!(%error, "Session ended during command");
        anyhow!(SESSION_ENDED)
    } else {
        anyhow!(error)
    }
}

fn format_listing(product: &ProductSummary) -> String {
    let mut flags = Vec::new();
    if product.is_new {
        flags.push("new");
    }
    if !product.is_active {
        flags.push("inactive");
    }

    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!("{:<12} {:<30} {:>12}{}", product.id, product.name, format_price(product.price), flags)
}

/// Format a price in cents as reais.
pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}R$ {},{:02}", sign, cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(5990), "R$ 59,90");
        assert_eq!(format_price(120_000), "R$ 1200,00");
        assert_eq!(format_price(5), "R$ 0,05");
        assert_eq!(format_price(-250), "-R$ 2,50");
    }

    #[test]
    fn test_format_listing_flags() {
        let product = ProductSummary {
            id: "p1".to_string(),
            name: "Tênis".to_string(),
            price: 5990,
            is_new: true,
            is_active: false,
        };
        assert!(format_listing(&product).ends_with("[new, inactive]"));
    }
}
