//! Platform and backend authenticators consumed by the session lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LockResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiometricKind {
    FaceId,
    Fingerprint,
    Iris,
}

/// Result of a biometric prompt, kept coarse enough for UI messaging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiometricOutcome {
    Success,
    /// The user dismissed the prompt.
    Cancelled,
    /// The biometric did not match.
    Failed,
    /// No biometric hardware.
    NotAvailable,
    /// Hardware present, nothing enrolled.
    NotEnrolled,
    /// The platform locked biometrics after repeated failures.
    LockedOut,
}

impl BiometricOutcome {
    pub fn is_success(self) -> bool {
        self == BiometricOutcome::Success
    }
}

/// Platform biometric prompt.
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn supported_kinds(&self) -> Vec<BiometricKind>;

    async fn authenticate(&self, prompt: &str) -> BiometricOutcome;
}

/// Backend account re-authentication, used as the password oracle.
#[async_trait]
pub trait AccountAuthenticator: Send + Sync {
    /// `Ok(false)` for a wrong password; `Err` only when the check itself
    /// could not be performed.
    async fn reauthenticate(&self, password: &str) -> LockResult<bool>;
}

/// Stand-in for devices without biometric hardware.
pub struct NoBiometrics;

#[async_trait]
impl BiometricAuthenticator for NoBiometrics {
    async fn is_available(&self) -> bool {
        false
    }

    async fn supported_kinds(&self) -> Vec<BiometricKind> {
        Vec::new()
    }

    async fn authenticate(&self, _prompt: &str) -> BiometricOutcome {
        BiometricOutcome::NotAvailable
    }
}
