use std::{fmt, str::FromStr};

use log::error;
use serde::Deserialize;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self).map_err(|e| {
            error!("invalid session id {s:?}: {e}");
        })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    PasswordTooShort,
    EmailTaken,
    InvalidCredentials,
    MissingField,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PasswordTooShort => "Password must be at least 6 characters long.",
            Self::EmailTaken => "An account with this email already exists.",
            Self::InvalidCredentials => "Invalid email or password.",
            Self::MissingField => "Username, email and password are required.",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PasswordTooShort => "PASSWORD_TOO_SHORT",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingField => "MISSING_FIELD",
        }
    }
}

impl SignUp {
    /// Checks that can be made without looking at the stored users.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.trim().is_empty() || self.email.trim().is_empty() {
            return Err(AuthError::MissingField);
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }

        Ok(())
    }
}
