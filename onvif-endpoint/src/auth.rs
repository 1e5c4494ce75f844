//! WS-Security UsernameToken authentication.
//!
//! Accepts both token forms ONVIF clients send: the digest profile
//! (`base64(sha1(nonce || created || password))`) and plain password
//! text. Comparisons are constant-time in both cases.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Maximum age of a digest token before it is rejected as a replay.
const MAX_TOKEN_AGE_SECS: i64 = 300;

/// Tolerated clock skew for tokens stamped slightly in the future.
const CLOCK_SKEW_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no WS-Security header present")]
    MissingSecurityHeader,

    #[error("UsernameToken is missing <{0}>")]
    MissingElement(&'static str),

    #[error("nonce is not valid base64")]
    InvalidNonce,

    #[error("token timestamp is not RFC 3339")]
    InvalidTimestamp,

    #[error("token expired ({age_secs}s old, max {max_secs}s)")]
    Expired { age_secs: i64, max_secs: i64 },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("XML error: {0}")]
    Xml(String),
}

/// Expected credentials for one camera's endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// How the client proved the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PasswordKind {
    Digest,
    Text,
}

#[derive(Debug, Clone)]
struct UsernameToken {
    username: String,
    password: String,
    kind: PasswordKind,
    nonce: Option<String>,
    created: Option<String>,
}

/// Validate the WS-Security header of a SOAP envelope against the
/// camera's credentials.
pub fn authenticate(xml: &str, credentials: &Credentials) -> Result<(), AuthError> {
    let token = parse_token(xml)?;

    if !ct_eq(&token.username, &credentials.username) {
        return Err(AuthError::InvalidCredentials);
    }

    match token.kind {
        PasswordKind::Text => {
            if !ct_eq(&token.password, &credentials.password) {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(())
        }
        PasswordKind::Digest => {
            let nonce = token.nonce.as_deref().ok_or(AuthError::MissingElement("Nonce"))?;
            let created = token
                .created
                .as_deref()
                .ok_or(AuthError::MissingElement("Created"))?;

            check_freshness(created)?;

            let expected = compute_digest(nonce, created, &credentials.password)?;
            if !ct_eq(&token.password, &expected) {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(())
        }
    }
}

/// The WS-Security digest: `base64(sha1(nonce || created || password))`.
pub fn compute_digest(nonce_b64: &str, created: &str, password: &str) -> Result<String, AuthError> {
    let nonce = STANDARD.decode(nonce_b64).map_err(|_| AuthError::InvalidNonce)?;

    let mut hasher = Sha1::new();
    hasher.update(&nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    Ok(STANDARD.encode(hasher.finalize()))
}

fn check_freshness(created: &str) -> Result<(), AuthError> {
    let created = DateTime::parse_from_rfc3339(created)
        .map_err(|_| AuthError::InvalidTimestamp)?
        .with_timezone(&Utc);
    let age = Utc::now().signed_duration_since(created).num_seconds();

    if age < -CLOCK_SKEW_SECS {
        return Err(AuthError::InvalidTimestamp);
    }
    if age > MAX_TOKEN_AGE_SECS {
        return Err(AuthError::Expired {
            age_secs: age,
            max_secs: MAX_TOKEN_AGE_SECS,
        });
    }
    Ok(())
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Pull the UsernameToken out of the SOAP header.
fn parse_token(xml: &str) -> Result<UsernameToken, AuthError> {
    let mut reader = Reader::from_str(xml);

    let mut in_token = false;
    let mut current: Option<&'static str> = None;
    let mut password_is_text = false;

    let mut username = None;
    let mut password = None;
    let mut nonce = None;
    let mut created = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"UsernameToken" => in_token = true,
                    b"Username" if in_token => current = Some("Username"),
                    b"Password" if in_token => {
                        current = Some("Password");
                        // Default per the UsernameToken profile is
                        // PasswordText when no Type attribute is given.
                        password_is_text = true;
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"Type" {
                                if let Ok(v) = attr.unescape_value() {
                                    password_is_text = !v.ends_with("#PasswordDigest");
                                }
                            }
                        }
                    }
                    b"Nonce" if in_token => current = Some("Nonce"),
                    b"Created" if in_token => current = Some("Created"),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"UsernameToken" => in_token = false,
                    b"Username" | b"Password" | b"Nonce" | b"Created" => current = None,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = current {
                    let text = e
                        .unescape()
                        .map_err(|e| AuthError::Xml(e.to_string()))?
                        .trim()
                        .to_string();
                    match field {
                        "Username" => username = Some(text),
                        "Password" => password = Some(text),
                        "Nonce" => nonce = Some(text),
                        "Created" => created = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AuthError::Xml(e.to_string())),
            _ => {}
        }
    }

    if username.is_none() && password.is_none() {
        return Err(AuthError::MissingSecurityHeader);
    }

    Ok(UsernameToken {
        username: username.ok_or(AuthError::MissingElement("Username"))?,
        password: password.ok_or(AuthError::MissingElement("Password"))?,
        kind: if password_is_text {
            PasswordKind::Text
        } else {
            PasswordKind::Digest
        },
        nonce,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST_TYPE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";

    fn digest_envelope(username: &str, digest: &str, nonce: &str, created: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
  <s:Header>
    <wsse:Security>
      <wsse:UsernameToken>
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="{DIGEST_TYPE}">{digest}</wsse:Password>
        <wsse:Nonce>{nonce}</wsse:Nonce>
        <wsu:Created xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{created}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body><GetDeviceInformation/></s:Body>
</s:Envelope>"#
        )
    }

    fn creds() -> Credentials {
        Credentials {
            username: "admin".to_string(),
            password: "correct horse".to_string(),
        }
    }

    fn fresh_digest_envelope(username: &str, password: &str) -> String {
        let nonce = STANDARD.encode(b"0123456789abcdef");
        let created = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let digest = compute_digest(&nonce, &created, password).unwrap();
        digest_envelope(username, &digest, &nonce, &created)
    }

    #[test]
    fn test_digest_auth_succeeds() {
        let xml = fresh_digest_envelope("admin", "correct horse");
        assert!(authenticate(&xml, &creds()).is_ok());
    }

    #[test]
    fn test_digest_auth_rejects_wrong_password() {
        let xml = fresh_digest_envelope("admin", "battery staple");
        assert!(matches!(
            authenticate(&xml, &creds()),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_digest_auth_rejects_wrong_username() {
        let xml = fresh_digest_envelope("intruder", "correct horse");
        assert!(matches!(
            authenticate(&xml, &creds()),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_digest_auth_rejects_stale_token() {
        let nonce = STANDARD.encode(b"0123456789abcdef");
        let created = (Utc::now() - chrono::Duration::seconds(900))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let digest = compute_digest(&nonce, &created, "correct horse").unwrap();
        let xml = digest_envelope("admin", &digest, &nonce, &created);
        assert!(matches!(
            authenticate(&xml, &creds()),
            Err(AuthError::Expired { .. })
        ));
    }

    #[test]
    fn test_plaintext_auth_succeeds() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header>
    <Security>
      <UsernameToken>
        <Username>admin</Username>
        <Password>correct horse</Password>
      </UsernameToken>
    </Security>
  </s:Header>
  <s:Body><GetProfiles/></s:Body>
</s:Envelope>"#;
        assert!(authenticate(xml, &creds()).is_ok());
    }

    #[test]
    fn test_plaintext_auth_rejects_wrong_password() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Header><Security><UsernameToken>
    <Username>admin</Username>
    <Password>wrong</Password>
  </UsernameToken></Security></s:Header>
  <s:Body><GetProfiles/></s:Body>
</s:Envelope>"#;
        assert!(matches!(
            authenticate(xml, &creds()),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_missing_header_detected() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body><GetProfiles/></s:Body>
</s:Envelope>"#;
        assert!(matches!(
            authenticate(xml, &creds()),
            Err(AuthError::MissingSecurityHeader)
        ));
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = compute_digest("LKqI6G/AikKCQrN0zqZFlg==", "2010-09-16T07:50:45.000Z", "pw");
        let b = compute_digest("LKqI6G/AikKCQrN0zqZFlg==", "2010-09-16T07:50:45.000Z", "pw");
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_invalid_nonce_rejected() {
        assert!(matches!(
            compute_digest("!!not base64!!", "2024-01-01T00:00:00Z", "pw"),
            Err(AuthError::InvalidNonce)
        ));
    }
}
