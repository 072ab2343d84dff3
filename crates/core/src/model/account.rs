use thiserror::Error;

use crate::model::ids::AccountId;
use crate::model::result::TestResult;
use crate::model::saved_state::SavedState;

/// Display name used for accounts that only live for the current process.
pub const GUEST_USERNAME: &str = "Guest";

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccountError {
    #[error("email address is not valid: {0}")]
    InvalidEmail(String),

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
}

/// Validated sign-up request.
///
/// An empty username falls back to the local part of the email address.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    email: String,
    username: String,
    password: String,
}

impl Registration {
    /// # Errors
    ///
    /// Returns `AccountError::InvalidEmail` for addresses without a local part and a
    /// domain, and `AccountError::PasswordTooShort` for passwords under six characters.
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AccountError> {
        let email = email.into().trim().to_owned();
        let Some((local, domain)) = email.split_once('@') else {
            return Err(AccountError::InvalidEmail(email));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(AccountError::InvalidEmail(email));
        }

        let password = password.into();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::PasswordTooShort);
        }

        let username = username.into().trim().to_owned();
        let username = if username.is_empty() {
            local.to_owned()
        } else {
            username
        };

        Ok(Self {
            email,
            username,
            password,
        })
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Account listing row for the admin view; carries no history or checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: AccountId,
    pub email: Option<String>,
    pub username: String,
    pub is_admin: bool,
}

/// The signed-in account with its history and resumable checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: AccountId,
    pub email: Option<String>,
    pub username: String,
    pub is_admin: bool,
    pub is_guest: bool,
    /// Completed results, oldest first.
    pub history: Vec<TestResult>,
    pub saved_state: Option<SavedState>,
}

impl User {
    /// A throwaway account whose progress is never written to a shared store.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            id: AccountId::generate(),
            email: None,
            username: GUEST_USERNAME.to_owned(),
            is_admin: false,
            is_guest: true,
            history: Vec::new(),
            saved_state: None,
        }
    }

    #[must_use]
    pub fn from_summary(
        summary: AccountSummary,
        history: Vec<TestResult>,
        saved_state: Option<SavedState>,
    ) -> Self {
        Self {
            id: summary.id,
            email: summary.email,
            username: summary.username,
            is_admin: summary.is_admin,
            is_guest: false,
            history,
            saved_state,
        }
    }

    #[must_use]
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_defaults_to_email_local_part() {
        let reg = Registration::new("ada@example.com", "  ", "secret1").unwrap();
        assert_eq!(reg.username(), "ada");
        assert_eq!(reg.email(), "ada@example.com");
    }

    #[test]
    fn rejects_bad_email_and_short_password() {
        assert!(matches!(
            Registration::new("no-at-sign", "x", "secret1"),
            Err(AccountError::InvalidEmail(_))
        ));
        assert!(matches!(
            Registration::new("@example.com", "x", "secret1"),
            Err(AccountError::InvalidEmail(_))
        ));
        assert_eq!(
            Registration::new("a@b.c", "x", "123").unwrap_err(),
            AccountError::PasswordTooShort
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let reg = Registration::new("a@b.c", "ann", "hunter22").unwrap();
        assert!(!format!("{reg:?}").contains("hunter22"));
    }

    #[test]
    fn guest_is_flagged() {
        let guest = User::guest();
        assert!(guest.is_guest);
        assert!(!guest.is_admin);
        assert_eq!(guest.username, GUEST_USERNAME);
    }
}
