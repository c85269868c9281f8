//! Usage: Read claims from an unverified JWT payload (diagnostics only, never trusted).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;

fn payload(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let (_header, body) = (parts.next()?, parts.next()?);
    parts.next()?;
    let decoded = URL_SAFE_NO_PAD.decode(body.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// `exp` claim in unix seconds, when the token is a JWT carrying one.
pub fn expires_at(token: &str) -> Option<i64> {
    let value = payload(token)?;
    match value.get("exp")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn claim_str(token: &str, name: &str) -> Option<String> {
    payload(token)?
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.sig")
}
