// ABOUTME: EXO2-HMAC-SHA256 request signing for the Exoscale v2 API.
// ABOUTME: Signs method, escaped path, body, and expiry with the API secret.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "EXO2-HMAC-SHA256";

/// Signatures are valid for this many seconds.
pub(crate) const SIGNATURE_VALIDITY_SECS: i64 = 600;

/// Build the `Authorization` header for a request without query parameters.
///
/// `path` is the escaped URL path (e.g. `/v2/template`), `expires` a UNIX
/// timestamp.
pub(crate) fn authorization(
    api_key: &str,
    api_secret: &str,
    method: &str,
    path: &str,
    body: &[u8],
    expires: i64,
) -> String {
    // Parts: request line, body, signed query values, signed headers, expiry.
    let mut message = Vec::with_capacity(body.len() + path.len() + 32);
    message.extend_from_slice(format!("{method} {path}\n").as_bytes());
    message.extend_from_slice(body);
    message.extend_from_slice(format!("\n\n\n{expires}").as_bytes());

    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(&message);
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    format!("{SCHEME} credential={api_key},expires={expires},signature={signature}")
}
