//! HTTP authentication
//!
//! Answers `WWW-Authenticate` challenges with Basic or Digest credentials and
//! remembers the negotiated scheme per origin, so later requests to the same
//! server authenticate up front instead of paying for another 401 round trip.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use http::{HeaderMap, HeaderValue, header};
use rand::RngCore;
use sha2::{Digest as _, Sha256};

use crate::credential::WebDavCredential;
use crate::http::{DavRequest, Origin};

/// One challenge out of a `WWW-Authenticate` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Challenge {
    /// Lowercased scheme name
    pub scheme: String,
    /// Auth parameters with lowercased keys
    pub params: HashMap<String, String>,
}

/// Split a `WWW-Authenticate` value into its challenges
///
/// A header may carry several challenges (`Digest realm="a", Basic realm="a"`),
/// so a bare token not followed by `=` starts a new one.
pub(crate) fn parse_challenges(value: &str) -> Vec<Challenge> {
    let mut challenges: Vec<Challenge> = Vec::new();
    let mut rest = value;

    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        if rest.is_empty() {
            break;
        }

        let end = rest
            .find(|c: char| c == ',' || c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let token = &rest[..end];
        let after = rest[end..].trim_start();

        if let Some(value_part) = after.strip_prefix('=') {
            let (param, remaining) = parse_param_value(value_part.trim_start());
            if let Some(current) = challenges.last_mut() {
                current.params.insert(token.to_ascii_lowercase(), param);
            }
            rest = remaining;
        } else {
            challenges.push(Challenge {
                scheme: token.to_ascii_lowercase(),
                params: HashMap::new(),
            });
            rest = after;
        }
    }

    challenges
}

/// Read a token or quoted-string, returning it and the unparsed remainder
fn parse_param_value(input: &str) -> (String, &str) {
    let Some(quoted) = input.strip_prefix('"') else {
        let end = input.find(',').unwrap_or(input.len());
        return (input[..end].trim().to_string(), &input[end..]);
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, &quoted[idx + 1..]),
            c => value.push(c),
        }
    }
    // unterminated quote, take what is there
    (value, "")
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl DigestAlgorithm {
    fn parse(name: Option<&str>) -> Option<Self> {
        match name.map(str::to_ascii_uppercase).as_deref() {
            None | Some("MD5") => Some(Self::Md5),
            Some("MD5-SESS") => Some(Self::Md5Sess),
            Some("SHA-256") => Some(Self::Sha256),
            Some("SHA-256-SESS") => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session(self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }

    fn hash(self, input: &str) -> String {
        match self {
            Self::Md5 | Self::Md5Sess => format!("{:x}", md5::compute(input.as_bytes())),
            Self::Sha256 | Self::Sha256Sess => hex::encode(Sha256::digest(input.as_bytes())),
        }
    }
}

/// Server nonce state negotiated for one origin
#[derive(Debug)]
struct DigestSession {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    /// `true` when the server offered `qop=auth`
    qop_auth: bool,
    nonce_count: AtomicU32,
}

impl DigestSession {
    fn from_challenge(challenge: &Challenge) -> Option<Self> {
        let nonce = challenge.params.get("nonce")?.clone();
        let algorithm = DigestAlgorithm::parse(challenge.params.get("algorithm").map(String::as_str))?;
        let qop_auth = match challenge.params.get("qop") {
            None => false,
            Some(qop) => {
                if !qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    // only auth-int on offer, which needs the entity body hash
                    return None;
                }
                true
            }
        };

        Some(Self {
            realm: challenge.params.get("realm").cloned().unwrap_or_default(),
            nonce,
            opaque: challenge.params.get("opaque").cloned(),
            algorithm,
            qop_auth,
            nonce_count: AtomicU32::new(0),
        })
    }

    fn authorization(&self, username: &str, password: &str, request: &DavRequest) -> String {
        let mut uri = request.url.path().to_string();
        if let Some(query) = request.url.query() {
            uri.push('?');
            uri.push_str(query);
        }

        let nc = format!("{:08x}", self.nonce_count.fetch_add(1, Ordering::Relaxed) + 1);
        let cnonce = client_nonce();
        let h = |input: String| self.algorithm.hash(&input);

        let mut ha1 = h(format!("{username}:{}:{password}", self.realm));
        if self.algorithm.is_session() {
            ha1 = h(format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = h(format!("{}:{uri}", request.method));
        let response = if self.qop_auth {
            h(format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            h(format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username={}, realm={}, nonce={}, uri={}, response=\"{response}\", algorithm={}",
            quote(username),
            quote(&self.realm),
            quote(&self.nonce),
            quote(&uri),
            self.algorithm.name()
        );
        if self.qop_auth {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque={}", quote(opaque)));
        }
        header
    }
}

/// 128 random bits, hex encoded
fn client_nonce() -> String {
    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    hex::encode(nonce)
}

/// Scheme remembered for an origin after a successful negotiation
#[derive(Debug, Clone)]
enum NegotiatedScheme {
    Basic,
    Digest(Arc<DigestSession>),
}

impl NegotiatedScheme {
    fn name(&self) -> &'static str {
        match self {
            NegotiatedScheme::Basic => "basic",
            NegotiatedScheme::Digest(_) => "digest",
        }
    }
}

/// Answers authentication challenges for one credential
///
/// Credentials are only ever offered to the origin of the credential's base
/// URL; a redirect to another host gets no `Authorization` header.
pub struct Authenticator {
    username: String,
    password: String,
    origin: Origin,
    cache: DashMap<Origin, NegotiatedScheme>,
}

impl Authenticator {
    pub fn new(credential: &WebDavCredential) -> Self {
        Self {
            username: credential.username().to_string(),
            password: credential.password().to_string(),
            origin: Origin::of(credential.base_url()),
            cache: DashMap::new(),
        }
    }

    /// Authorization for `request` from the scheme cached for its origin
    pub fn cached_authorization(&self, request: &DavRequest) -> Option<HeaderValue> {
        let origin = Origin::of(&request.url);
        let scheme = self.cache.get(&origin)?.clone();
        self.authorization_for(&scheme, request)
    }

    /// Answer a 401 response, caching the chosen scheme for the origin
    ///
    /// The first challenge in server order that is Basic or a usable Digest
    /// wins. Returns `None` when nothing can be answered.
    pub fn respond_to_challenge(&self, request: &DavRequest, headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = Origin::of(&request.url);
        if origin != self.origin {
            tracing::debug!(%origin, "Not offering credentials to foreign origin");
            return None;
        }

        let scheme = headers
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_challenges)
            .find_map(|challenge| match challenge.scheme.as_str() {
                "basic" => Some(NegotiatedScheme::Basic),
                "digest" => match DigestSession::from_challenge(&challenge) {
                    Some(session) => Some(NegotiatedScheme::Digest(Arc::new(session))),
                    None => {
                        tracing::warn!(params = ?challenge.params.keys(), "Unsupported digest challenge");
                        None
                    }
                },
                _ => None,
            });

        let Some(scheme) = scheme else {
            tracing::debug!(%origin, "No supported authentication challenge");
            return None;
        };

        tracing::debug!(%origin, scheme = scheme.name(), "Negotiated authentication scheme");
        let authorization = self.authorization_for(&scheme, request);
        self.cache.insert(origin, scheme);
        authorization
    }

    /// Scheme cached for an origin
    pub fn cached_scheme(&self, origin: &Origin) -> Option<&'static str> {
        self.cache.get(origin).map(|s| s.name())
    }

    fn authorization_for(&self, scheme: &NegotiatedScheme, request: &DavRequest) -> Option<HeaderValue> {
        let value = match scheme {
            NegotiatedScheme::Basic => {
                let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
                format!("Basic {token}")
            }
            NegotiatedScheme::Digest(session) => {
                session.authorization(&self.username, &self.password, request)
            }
        };

        match HeaderValue::from_str(&value) {
            Ok(mut header) => {
                header.set_sensitive(true);
                Some(header)
            }
            Err(_) => {
                tracing::warn!("Credentials cannot be encoded into an Authorization header");
                None
            }
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("username", &self.username)
            .field("origin", &self.origin)
            .field("cached_origins", &self.cache.len())
            .finish_non_exhaustive()
    }
}
