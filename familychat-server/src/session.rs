//! Signed session cookies and the gate that turns them into identities.
//!
//! A session token is `base64url(identity) "." base64url(HMAC-SHA256(identity))`.
//! The server secret never leaves the process; anything that fails to
//! verify is treated as no session at all.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub const COOKIE_NAME: &str = "session";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionGate {
    mac: HmacSha256,
    secure: bool,
}

impl std::fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGate")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionGate {
    pub fn new(secret: &[u8], secure: bool) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
            secure,
        })
    }

    /// Gate with a fresh random key; sessions die with the process.
    pub fn random(secure: bool) -> Result<Self, InvalidLength> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key, secure)
    }

    /// Identity carried by the request's session cookie, if it verifies.
    pub fn identity(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == COOKIE_NAME)
            .find_map(|(_, value)| self.verify(value))
    }

    pub fn issue(&self, identity: &str) -> String {
        let sig = self.mac(identity.as_bytes()).finalize().into_bytes();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(identity),
            URL_SAFE_NO_PAD.encode(sig)
        )
    }

    pub fn verify(&self, token: &str) -> Option<String> {
        let (id_b64, sig_b64) = token.split_once('.')?;
        let identity = URL_SAFE_NO_PAD.decode(id_b64).ok()?;
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
        self.mac(&identity).verify_slice(&sig).ok()?;
        let identity = String::from_utf8(identity).ok()?;
        (!identity.is_empty()).then_some(identity)
    }

    /// `Set-Cookie` value establishing a session for `identity`.
    pub fn set_cookie(&self, identity: &str) -> String {
        format!("{COOKIE_NAME}={}; {}", self.issue(identity), self.attributes())
    }

    /// `Set-Cookie` value that removes the session.
    pub fn clear_cookie(&self) -> String {
        format!("{COOKIE_NAME}=; Max-Age=0; {}", self.attributes())
    }

    fn attributes(&self) -> &'static str {
        if self.secure {
            "Path=/; HttpOnly; SameSite=Lax; Secure"
        } else {
            "Path=/; HttpOnly; SameSite=Lax"
        }
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn issued_token_round_trips() {
        let gate = SessionGate::new(b"secret", false).unwrap();
        let token = gate.issue("vamsi");
        assert_eq!(gate.verify(&token).as_deref(), Some("vamsi"));
    }

    #[test]
    fn rejects_tampered_and_foreign_tokens() {
        let gate = SessionGate::new(b"secret", false).unwrap();
        let other = SessionGate::new(b"other", false).unwrap();
        let token = gate.issue("vamsi");

        assert!(other.verify(&token).is_none());
        let (_, sig) = token.split_once('.').unwrap();
        let forged = format!("{}.{sig}", URL_SAFE_NO_PAD.encode("krishna"));
        assert!(gate.verify(&forged).is_none());
        assert!(gate.verify("garbage").is_none());
        assert!(gate.verify("").is_none());
    }

    #[test]
    fn identity_from_cookie_header() {
        let gate = SessionGate::new(b"secret", false).unwrap();
        let cookie = format!("theme=dark; {COOKIE_NAME}={}", gate.issue("krishna"));
        assert_eq!(gate.identity(&headers_with(&cookie)).as_deref(), Some("krishna"));
    }

    #[test]
    fn anonymous_requests_have_no_identity() {
        let gate = SessionGate::new(b"secret", false).unwrap();
        assert!(gate.identity(&HeaderMap::new()).is_none());
        assert!(gate.identity(&headers_with("session=")).is_none());
        assert!(gate.identity(&headers_with("other=1")).is_none());
    }

    #[test]
    fn cookie_attributes() {
        let gate = SessionGate::new(b"secret", true).unwrap();
        assert!(gate.set_cookie("a").ends_with("; Secure"));
        assert!(gate.clear_cookie().starts_with("session=; Max-Age=0"));
    }
}
