//! Login credentials.

/// Longest accepted username or password, in bytes (the wire field adds a NUL).
pub const MAX_FIELD_LEN: usize = 31;

/// Errors from validating a credential field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The field is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
    /// The field is longer than [`MAX_FIELD_LEN`].
    #[error("{field} is {len} bytes, the limit is {MAX_FIELD_LEN}")]
    TooLong {
        /// `"username"` or `"password"`.
        field: &'static str,
        /// Actual length.
        len: usize,
    },
    /// The field contains a NUL byte, which would cut it short on the wire.
    #[error("{0} must not contain NUL bytes")]
    EmbeddedNul(&'static str),
}

/// Check a field that may still be empty (while the user is typing).
pub fn check_field(field: &'static str, value: &[u8]) -> Result<(), CredentialError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(CredentialError::TooLong {
            field,
            len: value.len(),
        });
    }
    if value.contains(&0) {
        return Err(CredentialError::EmbeddedNul(field));
    }
    Ok(())
}

/// A validated username/password pair, ready to be encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl Credentials {
    /// Validate both fields: 1 to [`MAX_FIELD_LEN`] bytes, no NUL.
    pub fn new(
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> Result<Self, CredentialError> {
        let username = username.into();
        let password = password.into();

        for (field, value) in [("username", &username), ("password", &password)] {
            if value.is_empty() {
                return Err(CredentialError::Empty(field));
            }
            check_field(field, value)?;
        }

        Ok(Self { username, password })
    }

    /// Username bytes, without terminator.
    pub fn username(&self) -> &[u8] {
        &self.username
    }

    /// Password bytes, without terminator.
    pub fn password(&self) -> &[u8] {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}
