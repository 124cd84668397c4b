//! Signed session cookies
//!
//! Cookie values use the express-session layout, `s:<id>.<signature>`, where the
//! signature is an unpadded base64 HMAC-SHA256 of the id, and the whole value is
//! percent-encoded on the wire.

use crate::{SessionError, SessionId, SessionResult};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use http::{header, HeaderMap, HeaderValue};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Signs and verifies session identifiers
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: &str) -> SessionResult<Self> {
        if secret.is_empty() {
            return Err(SessionError::store("cookie secret must not be empty"));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| SessionError::store(format!("invalid cookie secret: {}", e)))?;
        Ok(Self { mac })
    }

    fn signature(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        STANDARD_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// `s:<id>.<signature>`, not yet percent-encoded
    pub fn sign(&self, id: &SessionId) -> String {
        format!("{}{}.{}", SIGNED_PREFIX, id, self.signature(id.as_str()))
    }

    /// Verify a decoded cookie value. Anything malformed or forged yields `None`.
    pub fn unsign(&self, signed: &str) -> Option<SessionId> {
        let (value, signature) = signed.strip_prefix(SIGNED_PREFIX)?.rsplit_once('.')?;
        let signature = STANDARD_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;

        SessionId::parse(value)
    }
}

/// Raw value of cookie `name` from the `Cookie` headers, percent-decoded
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| {
            let value = value.trim().trim_matches('"');
            urlencoding::decode(value).ok().map(|v| v.into_owned())
        })
}

/// Attributes of the `Set-Cookie` header issued for new sessions
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub max_age_secs: u64,
    pub secure: bool,
}

impl SessionCookie {
    pub fn set_cookie_header(&self, signed_value: &str) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name,
            urlencoding::encode(signed_value),
            self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}
