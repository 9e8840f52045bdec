//! Access control guard: credential resolution and per-operation
//! authorization.
//!
//! The bootstrap admin is an explicit, configuration-supplied
//! principal checked before the persisted-user lookup. It keeps the
//! system reachable with an empty user table without special-casing
//! spread across layers.

use sqlx::SqlitePool;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::user;

mod password;
mod session;

pub(crate) use password::{generate_salt, hash_password, verify_password};
pub use session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Customer => "customer",
        }
    }

    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid role: {0}")]
pub struct InvalidRoleError(String);

impl FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "customer" => Ok(Self::Customer),
            _ => Err(InvalidRoleError(s.to_string())),
        }
    }
}

/// The resolved identity behind a request: who they are and what
/// they may do. Recomputed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Configuration-supplied super-admin identity, valid regardless of
/// the persisted user table.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// An operation a principal wants to perform, carrying the owning
/// identity where self-service rules apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<'a> {
    ListCustomers,
    ReadCustomer { owner_email: &'a str },
    MutateCustomer,
    DeleteCustomer { owner_email: &'a str },
    ManageUsers,
    ReadProducts,
    MutateProducts,
    AdjustStock,
    CreateOrder,
    ReadOrders,
    ChangeOrderStatus,
    DeleteOrder,
    InitiatePayment { owner_email: &'a str },
    ManageCrmNotes,
    ViewStatistics,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Could not validate credentials")]
    Unauthenticated,
    #[error("Admin privileges required")]
    Forbidden,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<user::UserError> for AccessError {
    fn from(err: user::UserError) -> Self {
        match err {
            user::UserError::Database(e) => Self::Database(e),
            _ => Self::Unauthenticated,
        }
    }
}

/// Resolves bearer credentials to principals and enforces the
/// authorization rules. Constructed once at startup.
#[derive(Debug, Clone)]
pub struct Guard {
    pool: SqlitePool,
    bootstrap: BootstrapAdmin,
}

impl Guard {
    pub fn new(pool: SqlitePool, bootstrap: BootstrapAdmin) -> Self {
        Self { pool, bootstrap }
    }

    /// Verifies a login and mints a bearer session.
    ///
    /// The bootstrap admin branch is checked first and does not touch
    /// the user table; everything else must match a persisted user's
    /// salted hash.
    #[tracing::instrument(skip(self, password), level = tracing::Level::DEBUG)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AccessError> {
        if email == self.bootstrap.email && password == self.bootstrap.password {
            info!(email, "Bootstrap admin login");
            return Ok(session::issue(&self.pool, email, Role::Admin).await?);
        }

        let Some(account) = user::find_by_email(&self.pool, email).await? else {
            debug!(email, "Login for unknown user");
            return Err(AccessError::Unauthenticated);
        };

        if !verify_password(&account.password_salt, password, &account.password_hash) {
            warn!(email, "Login with wrong password");
            return Err(AccessError::Unauthenticated);
        }

        Ok(session::issue(&self.pool, &account.email, account.role).await?)
    }

    /// Resolves a bearer credential to a [`Principal`].
    pub async fn authenticate(&self, credential: &str) -> Result<Principal, AccessError> {
        let Some(session) = session::load(&self.pool, credential).await? else {
            return Err(AccessError::Unauthenticated);
        };

        if session.is_expired() {
            debug!(email = %session.email, "Expired session");
            session::revoke(&self.pool, credential).await?;
            return Err(AccessError::Unauthenticated);
        }

        // The bootstrap admin session stays valid without a user row.
        if session.email == self.bootstrap.email {
            return Ok(Principal {
                email: session.email,
                role: Role::Admin,
            });
        }

        // Everyone else must still exist in the user table: deleting
        // a user invalidates their outstanding sessions.
        let Some(account) = user::find_by_email(&self.pool, &session.email).await? else {
            return Err(AccessError::Unauthenticated);
        };

        Ok(Principal {
            email: account.email,
            role: account.role,
        })
    }

    /// Enforces the per-operation authorization rules.
    ///
    /// Admins may do everything. A customer is limited to their own
    /// profile and payments, order creation, and catalog/order reads.
    pub fn authorize(
        &self,
        principal: &Principal,
        operation: &Operation<'_>,
    ) -> Result<(), AccessError> {
        if principal.is_admin() {
            return Ok(());
        }

        let allowed = match operation {
            Operation::ReadProducts | Operation::CreateOrder | Operation::ReadOrders => true,
            Operation::ReadCustomer { owner_email }
            | Operation::DeleteCustomer { owner_email }
            | Operation::InitiatePayment { owner_email } => *owner_email == principal.email,
            Operation::ListCustomers
            | Operation::MutateCustomer
            | Operation::ManageUsers
            | Operation::MutateProducts
            | Operation::AdjustStock
            | Operation::ChangeOrderStatus
            | Operation::DeleteOrder
            | Operation::ManageCrmNotes
            | Operation::ViewStatistics => false,
        };

        if allowed {
            Ok(())
        } else {
            debug!(email = %principal.email, ?operation, "Operation forbidden");
            Err(AccessError::Forbidden)
        }
    }

    /// Invalidates a session token.
    pub async fn logout(&self, credential: &str) -> Result<(), AccessError> {
        session::revoke(&self.pool, credential).await?;
        Ok(())
    }

    /// Drops expired sessions; suitable for a periodic sweep.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AccessError> {
        Ok(session::purge_expired(&self.pool).await?)
    }
}
