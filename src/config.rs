//! Runtime configuration from environment variables.
//!
//! Everything has a sensible default so `vouchsafe check CODE` works out of
//! the box. The storefront endpoints are plain fields rather than constants
//! so library consumers can point the engine at a staging host.

use std::path::PathBuf;

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Launch the browser without a visible window. Defaults to headful
    /// because the storefront's bot checks pass far more often with a
    /// real window; set `VOUCHSAFE_HEADLESS=true` for server use.
    pub headless: bool,
    /// Persistent Chromium profile directory. Keeping the profile between
    /// runs preserves login cookies, which the wishlist scan depends on.
    pub profile_dir: PathBuf,
    /// Explicit Chromium binary path, if the user set one.
    pub chromium_path: Option<PathBuf>,
    /// Write PNG snapshots of the page when a step fails.
    pub snapshots: bool,
    pub storefront: Storefront,
}

/// Storefront endpoints. Paths are joined onto `base_url` as-is.
#[derive(Debug, Clone)]
pub struct Storefront {
    pub base_url: String,
    pub cart_path: String,
    /// Collection page used to source a filler item when the cart is empty.
    pub fallback_collection_path: String,
    pub wishlist_path: String,
    /// Cart API endpoint the voucher apply call POSTs to, relative to the
    /// page origin.
    pub apply_voucher_path: String,
}

impl Config {
    /// Build a config from `VOUCHSAFE_*` environment variables, with
    /// defaults for everything that is unset.
    pub fn from_env() -> Self {
        let profile_dir = match std::env::var("VOUCHSAFE_PROFILE_DIR") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => default_profile_dir(),
        };

        let chromium_path = std::env::var("VOUCHSAFE_CHROMIUM_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            headless: env_flag("VOUCHSAFE_HEADLESS").unwrap_or(false),
            profile_dir,
            chromium_path,
            snapshots: env_flag("VOUCHSAFE_SNAPSHOTS").unwrap_or(true),
            storefront: Storefront::from_env(),
        }
    }
}

impl Storefront {
    fn from_env() -> Self {
        let base_url = std::env::var("VOUCHSAFE_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://www.sheinindia.in".to_string());

        Self {
            base_url,
            cart_path: "/cart".to_string(),
            fallback_collection_path: "/c/sverse-5939-37961".to_string(),
            wishlist_path: "/wishlist".to_string(),
            apply_voucher_path: "/api/cart/apply-voucher".to_string(),
        }
    }

    pub fn cart_url(&self) -> String {
        format!("{}{}", self.base_url, self.cart_path)
    }

    pub fn fallback_collection_url(&self) -> String {
        format!("{}{}", self.base_url, self.fallback_collection_path)
    }

    pub fn wishlist_url(&self) -> String {
        format!("{}{}", self.base_url, self.wishlist_path)
    }
}

impl Default for Storefront {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse a boolean environment flag. Accepts 1/true/yes and 0/false/no.
fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn default_profile_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".vouchsafe")
        .join("profile")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_urls() {
        let store = Storefront {
            base_url: "https://shop.example".to_string(),
            cart_path: "/cart".to_string(),
            fallback_collection_path: "/c/filler-1".to_string(),
            wishlist_path: "/wishlist".to_string(),
            apply_voucher_path: "/api/cart/apply-voucher".to_string(),
        };
        assert_eq!(store.cart_url(), "https://shop.example/cart");
        assert_eq!(store.wishlist_url(), "https://shop.example/wishlist");
        assert_eq!(
            store.fallback_collection_url(),
            "https://shop.example/c/filler-1"
        );
    }

    #[test]
    fn test_default_base_url_has_no_trailing_slash() {
        let store = Storefront::default();
        assert!(!store.base_url.ends_with('/'));
        assert!(store.cart_url().contains("/cart"));
    }
}
