//! The auth flow controller: the one stateful object behind every handler.
//!
//! Owns the ordering of each operation (validate, hash, store, notify, mint)
//! and the policy decisions that cut across them:
//! - lookups that found nothing still burn a hash so login timing stays flat
//! - wrong password and unknown address collapse into one error
//! - email delivery is awaited but never fails the request; a saved token
//!   whose email bounced is a logged partial state, not an error
//! - sessions are minted at signup, login, and federated login; verification
//!   gates the login path only
//!
//! Everything reaches persistence through the injected [`CredentialStore`]
//! and the outside world through the injected [`Mailer`].

use std::sync::Arc;

use crate::account::store::CredentialStore;
use crate::account::{normalize_email, Account, AccountDraft};
use crate::error::AuthError;
use crate::mailer::{self, Mailer};
use crate::password;
use crate::session::SessionIssuer;
use crate::token::{self, epoch_secs};

/// A successful authentication: the account plus a freshly minted session.
#[derive(Debug)]
pub struct SignedIn {
    pub account: Account,
    pub session: String,
}

/// Outcome of a federated login; `created` distinguishes first contact from
/// a merge onto an existing account.
#[derive(Debug)]
pub struct FederatedLogin {
    pub account: Account,
    pub session: String,
    pub created: bool,
}

pub struct AuthFlow {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    sessions: SessionIssuer,
    client_base_url: String,
}

impl AuthFlow {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        sessions: SessionIssuer,
        client_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            sessions,
            client_base_url: client_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create an unverified account, mail the verification code, and sign the
    /// caller in. The pending code does not block the fresh session; it only
    /// gates future logins.
    pub async fn register(
        &self,
        email: &str,
        password_plain: &str,
        name: &str,
    ) -> Result<SignedIn, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password_plain.is_empty() || name.trim().is_empty() {
            return Err(AuthError::MissingFields);
        }

        // Friendly pre-check; the store's unique constraint is the backstop.
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash = password::hash(password_plain)?;
        let code = token::mint_verification_code();
        let expires_at = epoch_secs() + token::VERIFICATION_CODE_TTL_SECS;

        let draft = AccountDraft::credentials(&email, password_hash, name, code.clone(), expires_at);
        let account = self.store.create(draft).await?;
        let session = self.sessions.mint(&account.id)?;

        if let Err(err) =
            mailer::send_verification_email(self.mailer.as_ref(), &account.email, &account.name, &code)
                .await
        {
            tracing::warn!(error = ?err, email = %account.email, "verification email failed to send");
        }

        tracing::info!(account_id = %account.id, email = %account.email, "account registered");
        Ok(SignedIn { account, session })
    }

    /// Mint a fresh verification code for an unverified account. The old
    /// code stops working the moment the new one is saved.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let mut account = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        if account.is_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let code = token::mint_verification_code();
        account.set_verification_token(code.clone(), epoch_secs() + token::VERIFICATION_CODE_TTL_SECS);
        let account = self.store.save(&account).await?;

        if let Err(err) =
            mailer::send_verification_email(self.mailer.as_ref(), &account.email, &account.name, &code)
                .await
        {
            tracing::warn!(error = ?err, email = %account.email, "verification email failed to send");
        }

        tracing::info!(account_id = %account.id, "verification code reissued");
        Ok(())
    }

    /// Redeem a verification code. Consumption is atomic in the store, so a
    /// code verifies at most one account exactly once.
    pub async fn verify_email(&self, code: &str) -> Result<Account, AuthError> {
        let account = self
            .store
            .consume_verification_token(code.trim(), epoch_secs())
            .await?
            .ok_or(AuthError::InvalidVerificationCode)?;

        if let Err(err) =
            mailer::send_welcome_email(self.mailer.as_ref(), &account.email, &account.name).await
        {
            tracing::warn!(error = ?err, email = %account.email, "welcome email failed to send");
        }

        tracing::info!(account_id = %account.id, "email verified");
        Ok(account)
    }

    /// Password login. Unknown address, wrong password, and password-less
    /// (federated) accounts all answer with the same error.
    pub async fn login(&self, email: &str, password_plain: &str) -> Result<SignedIn, AuthError> {
        let account = match self.store.find_by_email(email).await? {
            Some(account) => account,
            None => {
                password::dummy_verify(password_plain);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let password_ok = match account.password_hash.as_deref() {
            Some(hash) => password::verify(password_plain, hash),
            None => {
                password::dummy_verify(password_plain);
                false
            }
        };
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_verified {
            return Err(AuthError::EmailNotVerified {
                account_id: account.id,
            });
        }

        let mut account = account;
        account.last_login = epoch_secs();
        let account = self.store.save(&account).await?;
        let session = self.sessions.mint(&account.id)?;

        tracing::info!(account_id = %account.id, "login");
        Ok(SignedIn { account, session })
    }

    /// Login with an already-extracted federated profile. An existing account
    /// under the same address is logged in as-is (the identity merge);
    /// otherwise a verified, password-less account is created.
    pub async fn federated_login(
        &self,
        email: &str,
        name: &str,
        picture: Option<String>,
    ) -> Result<FederatedLogin, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || name.trim().is_empty() {
            return Err(AuthError::MissingFederatedInfo);
        }

        if let Some(mut account) = self.store.find_by_email(&email).await? {
            account.last_login = epoch_secs();
            let account = self.store.save(&account).await?;
            let session = self.sessions.mint(&account.id)?;
            tracing::info!(account_id = %account.id, "federated login onto existing account");
            return Ok(FederatedLogin {
                account,
                session,
                created: false,
            });
        }

        let account = self
            .store
            .create(AccountDraft::federated(&email, name, picture))
            .await?;
        let session = self.sessions.mint(&account.id)?;

        if let Err(err) =
            mailer::send_welcome_email(self.mailer.as_ref(), &account.email, &account.name).await
        {
            tracing::warn!(error = ?err, email = %account.email, "welcome email failed to send");
        }

        tracing::info!(account_id = %account.id, email = %account.email, "federated account created");
        Ok(FederatedLogin {
            account,
            session,
            created: true,
        })
    }

    /// Mint a reset token and mail the reset link. Only credentials accounts
    /// have a password to reset; federated accounts answer as not found so
    /// they never grow a hash.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let mut account = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        if account.password_hash.is_none() {
            tracing::debug!(account_id = %account.id, "reset requested for password-less account");
            return Err(AuthError::AccountNotFound);
        }

        let reset_token = token::mint_reset_token();
        account.set_reset_token(reset_token.clone(), epoch_secs() + token::RESET_TOKEN_TTL_SECS);
        let account = self.store.save(&account).await?;

        let link = format!("{}/reset-password/{reset_token}", self.client_base_url);
        if let Err(err) = mailer::send_reset_email(self.mailer.as_ref(), &account.email, &link).await
        {
            tracing::warn!(error = ?err, email = %account.email, "reset email failed to send");
        }

        tracing::info!(account_id = %account.id, "password reset issued");
        Ok(())
    }

    /// Redeem a reset token: install the new password and clear the token in
    /// one store operation, then confirm by mail.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let new_hash = password::hash(new_password)?;
        let account = self
            .store
            .consume_reset_token(reset_token.trim(), &new_hash, epoch_secs())
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        if let Err(err) =
            mailer::send_reset_success_email(self.mailer.as_ref(), &account.email, &account.name)
                .await
        {
            tracing::warn!(error = ?err, email = %account.email, "reset confirmation email failed to send");
        }

        tracing::info!(account_id = %account.id, "password reset completed");
        Ok(())
    }

    /// Validate a session token and load its account. Signature and embedded
    /// expiry are the only session checks; the account load catches records
    /// that vanished after issuance.
    pub async fn check_session(&self, session_token: &str) -> Result<Account, AuthError> {
        let claims = self.sessions.verify(session_token)?;
        self.store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AuthError> {
        Ok(self.store.list().await?)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
