use thiserror::Error;

/// Precise internal failure kinds. The HTTP boundary collapses all of these
/// into a uniform unauthorized response (see `crate::error::AppError`); the
/// distinctions exist so orchestration code can react differently, e.g.
/// treating reuse of a rotated token as a theft signal.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username, inactive account, or wrong password. Callers can
    /// never tell which.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password too short")]
    PasswordTooShort,

    /// Token did not parse as a JWT at all.
    #[error("malformed token")]
    MalformedToken,

    /// Well-formed token, wrong signature.
    #[error("bad token signature")]
    BadSignature,

    /// Valid signature, `exp` in the past.
    #[error("token expired")]
    ExpiredToken,

    /// Refresh token is absent, revoked, rotated, or expired in the store.
    /// Deliberately merged: "stolen and already used" must look the same as
    /// "never existed".
    #[error("refresh token is not active")]
    TokenNotActive,

    /// An access token presented where a refresh token was expected, or the
    /// other way around.
    #[error("wrong token kind")]
    WrongTokenKind,

    #[error("internal error: {0}")]
    Internal(String),
}
