//! Access scope resolution.
//!
//! The upstream session layer authenticates callers; this module turns the
//! resulting [`Identity`] into a [`Scope`] once per request. A request that
//! carries no identity never reaches storage or the provider.

pub mod extract;

use std::sync::Arc;

use crate::domain::{Identity, Scope};
use crate::error::AppError;
use crate::persistence::WalletDirectory;

pub use extract::{ApiQuery, Caller, IDENTITY_ID_HEADER, IDENTITY_ROLE_HEADER};

/// Resolves identities into query scopes.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    directory: Arc<dyn WalletDirectory>,
}

impl ScopeResolver {
    /// Creates a resolver backed by the wallet directory.
    #[must_use]
    pub fn new(directory: Arc<dyn WalletDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves the scope for `identity`, optionally narrowed to
    /// `requested_wallet`.
    ///
    /// Regular users are restricted to their own wallets. Administrators may
    /// name any wallet but must name one, since every provider query needs a
    /// wallet.
    ///
    /// # Errors
    ///
    /// - [`AppError::Unauthorized`] when there is no identity.
    /// - [`AppError::Forbidden`] when a user names a wallet they do not own,
    ///   or an administrator names none.
    /// - [`AppError::Persistence`] when the wallet lookup fails.
    pub async fn resolve(
        &self,
        identity: Option<&Identity>,
        requested_wallet: Option<&str>,
    ) -> Result<Scope, AppError> {
        let identity = identity.ok_or(AppError::Unauthorized)?;
        let requested = requested_wallet
            .map(str::trim)
            .filter(|wallet| !wallet.is_empty());

        if identity.is_elevated() {
            return requested
                .map(|wallet| Scope::AnyWallet {
                    wallet_address: wallet.to_string(),
                })
                .ok_or_else(|| {
                    AppError::Forbidden(
                        "administrator queries require an explicit walletAddress".to_string(),
                    )
                });
        }

        let wallets = self.directory.wallets_of(&identity.id).await?;
        let selected = match requested {
            Some(wallet) => Some(
                wallets
                    .iter()
                    .find(|own| own.eq_ignore_ascii_case(wallet))
                    .cloned()
                    .ok_or_else(|| {
                        AppError::Forbidden("wallet is outside the caller's scope".to_string())
                    })?,
            ),
            None => None,
        };

        Ok(Scope::OwnWallets {
            user_id: identity.id.clone(),
            wallets,
            selected,
        })
    }
}

/// Requires an administrator identity.
///
/// # Errors
///
/// Returns [`AppError::Unauthorized`] without an identity and
/// [`AppError::Forbidden`] for regular users.
pub fn require_elevated(identity: Option<&Identity>) -> Result<&Identity, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    if !identity.is_elevated() {
        return Err(AppError::Forbidden(
            "administrator role required".to_string(),
        ));
    }
    Ok(identity)
}
