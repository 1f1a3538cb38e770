//! Query scope derived from an identity.

use super::identity::UserId;

/// Wallets and users a caller may read.
///
/// Resolved once per request by the scope resolver and threaded through
/// every provider and storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A regular user: their own transactions and wallets only.
    OwnWallets {
        /// The caller.
        user_id: UserId,
        /// Wallets associated with the caller.
        wallets: Vec<String>,
        /// Optional narrowing to one of `wallets`.
        selected: Option<String>,
    },
    /// An administrator querying one explicit wallet across all users.
    AnyWallet {
        /// Wallet the administrator asked for.
        wallet_address: String,
    },
}

impl Scope {
    /// The single wallet the scope is pinned to, if any.
    #[must_use]
    pub fn wallet_address(&self) -> Option<&str> {
        match self {
            Self::OwnWallets { selected, .. } => selected.as_deref(),
            Self::AnyWallet { wallet_address } => Some(wallet_address),
        }
    }

    /// Returns `true` when wallet selection bypasses ownership.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        matches!(self, Self::AnyWallet { .. })
    }

    /// Owning user the scope is restricted to, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::OwnWallets { user_id, .. } => Some(user_id),
            Self::AnyWallet { .. } => None,
        }
    }

    /// Wallets that a reconciliation for this scope should cover.
    #[must_use]
    pub fn sync_targets(&self) -> Vec<String> {
        match self {
            Self::OwnWallets {
                selected: Some(wallet),
                ..
            } => vec![wallet.clone()],
            Self::OwnWallets { wallets, .. } => wallets.clone(),
            Self::AnyWallet { wallet_address } => vec![wallet_address.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_wallets_scope_is_restricted() {
        let scope = Scope::OwnWallets {
            user_id: UserId::new("u1"),
            wallets: vec!["0xa".to_string(), "0xb".to_string()],
            selected: None,
        };
        assert!(!scope.is_unrestricted());
        assert_eq!(scope.wallet_address(), None);
        assert_eq!(scope.user_id(), Some(&UserId::new("u1")));
        assert_eq!(scope.sync_targets().len(), 2);
    }

    #[test]
    fn selected_wallet_narrows_sync_targets() {
        let scope = Scope::OwnWallets {
            user_id: UserId::new("u1"),
            wallets: vec!["0xa".to_string(), "0xb".to_string()],
            selected: Some("0xb".to_string()),
        };
        assert_eq!(scope.sync_targets(), vec!["0xb".to_string()]);
        assert_eq!(scope.wallet_address(), Some("0xb"));
    }

    #[test]
    fn any_wallet_scope_is_unrestricted() {
        let scope = Scope::AnyWallet {
            wallet_address: "0xabc".to_string(),
        };
        assert!(scope.is_unrestricted());
        assert_eq!(scope.user_id(), None);
        assert_eq!(scope.wallet_address(), Some("0xabc"));
    }
}
