use std::fmt;

use url::Url;

use ca_core::{Error, Result};

/// Server location and login for a WebDAV provider
///
/// The base URL carries scheme, host, port and the root path of the WebDAV
/// share, e.g. `https://cloud.example.com/remote.php/webdav`.
#[derive(Clone, PartialEq, Eq)]
pub struct WebDavCredential {
    base_url: Url,
    username: String,
    password: String,
}

impl WebDavCredential {
    pub fn new(base_url: Url, username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported URL scheme '{}', expected http or https",
                base_url.scheme()
            )));
        }
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(Error::Config(format!("'{base_url}' is not a valid base URL")));
        }
        Ok(Self {
            base_url,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Parse the base URL from text
    pub fn from_url(url: &str, username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(url).map_err(|e| Error::Config(format!("invalid URL '{url}': {e}")))?;
        Self::new(base_url, username, password)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for WebDavCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavCredential")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
