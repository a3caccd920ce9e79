//! HTTP authentication for CalDAV requests.
//!
//! Servers answer an unauthenticated request with a `WWW-Authenticate`
//! challenge; the [`Authenticator`] remembers the negotiated scheme (Basic
//! per RFC 7617, Digest per RFC 7616) and produces `Authorization` header
//! values for subsequent requests.

use base64::Engine;
use rand::Rng;
use std::collections::HashMap;

/// Negotiated authentication state for one server.
#[derive(Debug, Clone, Default)]
pub enum Authenticator {
    /// No challenge seen yet.
    #[default]
    Unchallenged,
    /// The server accepted (or only offers) Basic.
    Basic,
    /// The server requires Digest with the captured challenge parameters.
    Digest(DigestChallenge),
}

impl Authenticator {
    /// Records a `WWW-Authenticate` challenge, upgrading to Digest when the
    /// server offers it.
    ///
    /// Returns `false` when the challenge names no scheme we can satisfy.
    pub fn accept_challenge(&mut self, header: &str) -> bool {
        if let Some(digest) = DigestChallenge::parse(header) {
            *self = Self::Digest(digest);
            return true;
        }
        if header.contains("Basic") {
            *self = Self::Basic;
            return true;
        }
        false
    }

    /// Produces the `Authorization` header value for a request, or `None`
    /// before any challenge has been seen.
    pub fn authorize(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Option<String> {
        match self {
            Self::Unchallenged => None,
            Self::Basic => Some(basic_auth(username, password)),
            Self::Digest(challenge) => Some(challenge.authorize(method, uri, username, password)),
        }
    }
}

/// Parameters captured from a Digest challenge.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    /// The realm from the server challenge.
    pub realm: String,
    /// The nonce from the server challenge.
    pub nonce: String,
    /// The opaque value from the server challenge (optional).
    pub opaque: Option<String>,
    /// The quality of protection (qop) options.
    pub qop: Option<String>,
    /// The algorithm (defaults to MD5).
    pub algorithm: String,
    /// Client nonce counter.
    nc: u32,
}

impl DigestChallenge {
    /// Parses a `WWW-Authenticate` header into digest parameters.
    pub fn parse(header: &str) -> Option<Self> {
        let content = header.strip_prefix("Digest ")?.trim();
        let params = parse_auth_params(content);

        let realm = params.get("realm")?.to_string();
        let nonce = params.get("nonce")?.to_string();
        let opaque = params.get("opaque").map(|s| s.to_string());
        let qop = params.get("qop").map(|s| s.to_string());
        let algorithm = params
            .get("algorithm")
            .map(|s| s.to_string())
            .unwrap_or_else(|| "MD5".to_string());

        Some(Self {
            realm,
            nonce,
            opaque,
            qop,
            algorithm,
            nc: 0,
        })
    }

    /// Generates an `Authorization` header value for a request.
    pub fn authorize(&mut self, method: &str, uri: &str, username: &str, password: &str) -> String {
        self.nc += 1;
        let nc = format!("{:08x}", self.nc);
        let cnonce = generate_cnonce();

        // HA1 = MD5(username:realm:password), HA2 = MD5(method:uri)
        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let response = if self.qop.as_deref().is_some_and(|q| q.contains("auth")) {
            md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, self.nonce, nc, cnonce, ha2
            ))
        } else {
            // RFC 2069 compatibility (no qop).
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut parts = vec![
            format!("username=\"{}\"", username),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{}\"", uri),
            format!("response=\"{}\"", response),
            format!("algorithm={}", self.algorithm),
        ];

        if self.qop.is_some() {
            parts.push("qop=auth".to_string());
            parts.push(format!("nc={}", nc));
            parts.push(format!("cnonce=\"{}\"", cnonce));
        }

        if let Some(ref opaque) = self.opaque {
            parts.push(format!("opaque=\"{}\"", opaque));
        }

        format!("Digest {}", parts.join(", "))
    }
}

/// Generates a Basic authentication header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    format!("Basic {}", encoded)
}

/// Parses authentication parameters from a `WWW-Authenticate` header value.
fn parse_auth_params(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = content.chars().peekable();

    while chars.peek().is_some() {
        // Skip whitespace and commas.
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_lowercase();

        if key.is_empty() {
            break;
        }

        // Value may be quoted.
        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let mut val = String::new();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    val.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    val.push(c);
                }
            }
            val
        } else {
            chars
                .by_ref()
                .take_while(|c| *c != ',' && !c.is_whitespace())
                .collect()
        };

        params.insert(key, value);
    }

    params
}

/// Generates a random client nonce.
fn generate_cnonce() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Computes an MD5 hash and returns its hex string.
fn md5_hex(input: &str) -> String {
    let digest = md5::compute(input.as_bytes());
    format!("{:x}", digest)
}
