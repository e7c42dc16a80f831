//! Static upstream credentials.

use std::fmt;

/// Username/password pair attached to every upstream request body.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// API username.
    pub username: String,
    /// API password.
    pub password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
