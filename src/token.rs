//! OneNET device token signing.
//!
//! OneNET authenticates HTTP device calls with a token of the form
//!
//! ```text
//! version=2018-10-31&res=products%2F{pid}%2Fdevices%2F{name}&et={expiry}&method=md5&sign={sig}
//! ```
//!
//! where `sig` is the HMAC-MD5 of a four-line sign string keyed by the
//! base64-decoded device key, base64-encoded and then passed through the
//! vendor's own escaping table. The upstream rejects anything that deviates
//! from this byte-for-byte, so nothing here should be "cleaned up".

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use thiserror::Error;

type HmacMd5 = Hmac<Md5>;

/// Token format version expected by OneNET.
pub const TOKEN_VERSION: &str = "2018-10-31";

/// Signature method. OneNET HTTP device auth only accepts MD5 here.
pub const SIGN_METHOD: &str = "md5";

/// Seconds between issuance and the `et` embedded in the token.
pub const TOKEN_TTL_SECS: u64 = 300;

/// Vendor escaping table, applied in order.
///
/// `%` is escaped after `+`, space, `/` and `?`, so the `%` introduced by those
/// first four substitutions is escaped again (`/` ends up as `%252F`).
const SIGNATURE_ESCAPES: [(&str, &str); 8] = [
    ("+", "%2B"),
    (" ", "%20"),
    ("/", "%2F"),
    ("?", "%3F"),
    ("%", "%25"),
    ("#", "%23"),
    ("&", "%26"),
    ("=", "%3D"),
];

/// Device credentials as issued by the OneNET console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub product_id: String,
    pub device_name: String,
    /// Base64 text of the raw device secret.
    pub device_key: String,
}

impl Credentials {
    pub fn new(
        product_id: impl Into<String>,
        device_name: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            device_name: device_name.into(),
            device_key: device_key.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("deviceKey is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    #[error("HMAC key rejected: {0}")]
    Mac(#[from] hmac::digest::InvalidLength),
}

/// Signing resource: `products/{product_id}/devices/{device_name}`.
pub fn resource_path(product_id: &str, device_name: &str) -> String {
    format!("products/{}/devices/{}", product_id, device_name)
}

/// Resource as it appears in the token: every `/` written as `%2F`.
pub fn token_resource(resource: &str) -> String {
    resource.replace('/', "%2F")
}

/// The four-line string fed to the HMAC.
pub fn sign_string(et: u64, resource: &str) -> String {
    format!("{}\n{}\n{}\n{}", et, SIGN_METHOD, resource, TOKEN_VERSION)
}

/// Base64 of HMAC-MD5(`sign_string`) keyed by the decoded device key.
pub fn compute_signature(device_key: &str, sign_string: &str) -> Result<String, SignError> {
    let key = STANDARD.decode(device_key)?;
    let mut mac = HmacMd5::new_from_slice(&key)?;
    mac.update(sign_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Apply the vendor escaping table to a base64 signature.
pub fn escape_signature(signature: &str) -> String {
    SIGNATURE_ESCAPES
        .iter()
        .fold(signature.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Build a token for `credentials` issued at `now` (unix seconds).
pub fn sign(credentials: &Credentials, now: u64) -> Result<String, SignError> {
    if credentials.product_id.is_empty() {
        return Err(SignError::EmptyField("productId"));
    }
    if credentials.device_name.is_empty() {
        return Err(SignError::EmptyField("deviceName"));
    }
    if credentials.device_key.is_empty() {
        return Err(SignError::EmptyField("deviceKey"));
    }

    let et = now.saturating_add(TOKEN_TTL_SECS);
    let res = resource_path(&credentials.product_id, &credentials.device_name);
    tracing::debug!(resource = %res, et, "signing OneNET token");

    let signature = compute_signature(&credentials.device_key, &sign_string(et, &res))?;

    Ok(format!(
        "version={}&res={}&et={}&method={}&sign={}",
        TOKEN_VERSION,
        token_resource(&res),
        et,
        SIGN_METHOD,
        escape_signature(&signature)
    ))
}

/// [`sign`] against the system clock.
pub fn sign_now(credentials: &Credentials) -> Result<String, SignError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    sign(credentials, now)
}
