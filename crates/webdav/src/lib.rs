//! ca-webdav: WebDAV backend for cloud-access
//!
//! Implements `ca_core::CloudProvider` on top of a WebDAV share. The request
//! path is layered:
//! - [`WebDavClient`] turns storage operations into WebDAV requests
//! - [`RedirectFollower`] follows redirects, stripping credentials across origins
//! - [`AuthenticatingTransport`] talks HTTP through reqwest and answers
//!   Basic/Digest challenges
//!
//! Each layer only sees the [`HttpTransport`] trait, so tests can swap any of
//! them for a mock.

pub mod auth;
pub mod client;
pub mod credential;
pub mod http;
pub mod propfind;
pub mod provider;
pub mod redirect;
pub mod transport;

pub use auth::Authenticator;
pub use client::WebDavClient;
pub use credential::WebDavCredential;
pub use crate::http::{DavRequest, DavResponse, HttpTransport, Origin, RequestBody, ResponseBody};
pub use provider::WebDavCloudProvider;
pub use redirect::{MAX_REDIRECTS, RedirectFollower};
pub use transport::{AuthenticatingTransport, WebDavTransport, build_transport};
