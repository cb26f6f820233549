//! Phone-verification challenge bookkeeping
//!
//! [`PhoneVerifier`] issues 6-digit challenges against an account's
//! phone number and checks them under the account lock. Delivery is
//! behind the [`SmsGateway`] trait; the challenge is stored *before*
//! delivery is attempted, so a broken gateway degrades to handing the
//! code back to the caller instead of failing the operation.

use crate::core::ledger_store::LedgerStore;
use crate::types::account::AccountId;
use crate::types::error::LedgerError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Challenges expire this long after being issued
const CODE_VALIDITY_MINUTES: i64 = 10;

/// Outbound SMS delivery
///
/// Implementations only deliver; the verifier keeps the challenge and
/// does the comparison itself.
pub trait SmsGateway: Send + Sync {
    fn send_code(&self, phone: &str, code: &str) -> Result<(), String>;
}

/// Outcome of issuing a verification code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeDelivery {
    /// The gateway accepted the message
    Delivered,
    /// The gateway failed; the code is still active and is returned so
    /// the caller can surface it through another channel
    Undelivered { code: String, error: String },
}

/// Phone-verification workflow over the ledger store
pub struct PhoneVerifier {
    store: Arc<LedgerStore>,
    gateway: Arc<dyn SmsGateway>,
}

impl PhoneVerifier {
    pub fn new(store: Arc<LedgerStore>, gateway: Arc<dyn SmsGateway>) -> Self {
        PhoneVerifier { store, gateway }
    }

    /// Issue a fresh challenge for the account's phone number
    ///
    /// Overwrites any previous challenge. The challenge is stored
    /// before delivery is attempted.
    ///
    /// # Errors
    ///
    /// - `NoPhoneNumber` if the account has no phone on file
    /// - `PhoneAlreadyVerified` if verification already succeeded
    #[instrument(name = "phone_verifier.send_code", skip(self), err)]
    pub fn send_code(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<CodeDelivery, LedgerError> {
        let cell = self.store.handle(account)?;
        let mut row = cell.lock()?;
        let Some(phone) = row.phone_number.clone() else {
            return Err(LedgerError::NoPhoneNumber { account });
        };
        if row.phone_verified {
            return Err(LedgerError::PhoneAlreadyVerified { account });
        }

        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        row.verification_code = Some(code.clone());
        row.verification_sent_at = Some(now);
        drop(row);

        match self.gateway.send_code(&phone, &code) {
            Ok(()) => Ok(CodeDelivery::Delivered),
            Err(error) => {
                warn!(account, %error, "verification SMS delivery failed");
                Ok(CodeDelivery::Undelivered { code, error })
            }
        }
    }

    /// Check a submitted code against the stored challenge
    ///
    /// # Errors
    ///
    /// - `NoVerificationPending` without an outstanding challenge
    /// - `ExpiredVerificationCode` past the validity window; the
    ///   challenge is cleared
    /// - `InvalidVerificationCode` on a mismatch; the challenge stays
    ///   so the holder may retype it
    #[instrument(name = "phone_verifier.verify", skip(self, code), err)]
    pub fn verify(
        &self,
        account: AccountId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let cell = self.store.handle(account)?;
        let mut row = cell.lock()?;
        if row.phone_verified {
            return Err(LedgerError::PhoneAlreadyVerified { account });
        }
        let (Some(stored), Some(sent_at)) =
            (row.verification_code.clone(), row.verification_sent_at)
        else {
            return Err(LedgerError::NoVerificationPending { account });
        };

        if now - sent_at > Duration::minutes(CODE_VALIDITY_MINUTES) {
            row.verification_code = None;
            row.verification_sent_at = None;
            return Err(LedgerError::ExpiredVerificationCode { account });
        }
        if stored != code {
            return Err(LedgerError::InvalidVerificationCode { account });
        }

        row.phone_verified = true;
        row.verification_code = None;
        row.verification_sent_at = None;
        Ok(())
    }
}
