use std::sync::Arc;

use prep_core::model::{AccountId, AccountSummary, Registration, User};
use storage::repository::{AccountRepository, StorageError};

use crate::error::AccountServiceError;

/// Registration, sign-in and the admin account view.
#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
}

impl AccountService {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Register a regular account.
    ///
    /// # Errors
    ///
    /// Returns `AccountServiceError::Account` for invalid input and
    /// `AccountServiceError::Storage(StorageError::DuplicateEmail)` if the email is taken.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AccountSummary, AccountServiceError> {
        self.create(email, username, password, false).await
    }

    /// Register an administrator account on behalf of `actor`.
    ///
    /// Without an actor only the first administrator can be created, while no
    /// account holds the admin flag.
    ///
    /// # Errors
    ///
    /// Returns `AccountServiceError::NotAdmin` if `actor` is not an administrator,
    /// or if `actor` is `None` and an administrator already exists. Otherwise the
    /// same as [`AccountService::register`].
    pub async fn register_admin(
        &self,
        actor: Option<&AccountSummary>,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AccountSummary, AccountServiceError> {
        match actor {
            Some(actor) => ensure_admin(actor)?,
            None => {
                let accounts = self.accounts.list_accounts().await?;
                if accounts.iter().any(|a| a.is_admin) {
                    tracing::warn!("admin registration without an administrator rejected");
                    return Err(AccountServiceError::NotAdmin);
                }
            }
        }
        self.create(email, username, password, true).await
    }

    async fn create(
        &self,
        email: &str,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<AccountSummary, AccountServiceError> {
        let registration = Registration::new(email, username, password)?;
        let summary = self.accounts.create_account(&registration, is_admin).await?;
        tracing::info!(account = %summary.id, is_admin, "account registered");
        Ok(summary)
    }

    /// # Errors
    ///
    /// Returns `AccountServiceError::NotAuthenticated` for unknown emails or wrong passwords.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSummary, AccountServiceError> {
        match self.accounts.authenticate(email, password).await {
            Ok(summary) => Ok(summary),
            Err(StorageError::InvalidCredentials) => {
                tracing::debug!("sign-in rejected");
                Err(AccountServiceError::NotAuthenticated)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A throwaway identity whose progress lives only in the current process.
    #[must_use]
    pub fn guest(&self) -> User {
        User::guest()
    }

    /// Load the signed-in account with its history and checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `AccountServiceError::NotAuthenticated` if the account no longer exists.
    pub async fn current_user(&self, id: AccountId) -> Result<User, AccountServiceError> {
        self.accounts
            .get_account(id)
            .await?
            .ok_or(AccountServiceError::NotAuthenticated)
    }

    /// List every registered account.
    ///
    /// # Errors
    ///
    /// Returns `AccountServiceError::NotAdmin` unless `actor` is an administrator.
    pub async fn list_accounts(
        &self,
        actor: &AccountSummary,
    ) -> Result<Vec<AccountSummary>, AccountServiceError> {
        ensure_admin(actor)?;
        Ok(self.accounts.list_accounts().await?)
    }

    /// Delete a regular account with all of its progress.
    ///
    /// # Errors
    ///
    /// Returns `AccountServiceError::NotAdmin` unless `actor` is an administrator,
    /// `CannotDeleteSelf`/`CannotDeleteAdmin` for protected targets, and
    /// `Storage(StorageError::NotFound)` for unknown ids.
    pub async fn delete_account(
        &self,
        actor: &AccountSummary,
        target: AccountId,
    ) -> Result<(), AccountServiceError> {
        ensure_admin(actor)?;
        if actor.id == target {
            return Err(AccountServiceError::CannotDeleteSelf);
        }
        let user = self
            .accounts
            .get_account(target)
            .await?
            .ok_or(StorageError::NotFound)?;
        if user.is_admin {
            return Err(AccountServiceError::CannotDeleteAdmin);
        }
        self.accounts.delete_account(target).await?;
        tracing::info!(actor = %actor.id, account = %target, "account deleted");
        Ok(())
    }
}

fn ensure_admin(actor: &AccountSummary) -> Result<(), AccountServiceError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AccountServiceError::NotAdmin)
    }
}
