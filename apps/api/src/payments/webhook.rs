//! NowPayments IPN webhook. The signature header is an HMAC-SHA512 (hex)
//! of the JSON body re-serialized with its object keys sorted, keyed with
//! the IPN secret. A request with a bad signature changes nothing and gets
//! a 401. Valid notifications run through the same state transition as the
//! reconciliation poller.

use axum::{extract::State, http::HeaderMap, Json};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha512;
use tracing::warn;

use crate::errors::AppError;
use crate::models::payment::{CryptoPayment, PaymentStatus};
use crate::payments::sync::{apply_upstream_state, UpstreamState};
use crate::state::AppState;

type HmacSha512 = Hmac<Sha512>;

const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Serializes a JSON value with all object keys sorted recursively —
/// NowPayments signs the sorted form, not the raw body.
pub fn sorted_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).expect("string serializes"));
                    out.push(':');
                    write(&map[key.as_str()], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Verifies the IPN signature over the raw body.
pub fn verify_ipn_signature(secret: &str, body: &str, signature: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let canonical = sorted_json(&value);

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    // Signatures are attacker-supplied hex; compare case-insensitively.
    expected.eq_ignore_ascii_case(signature.trim())
}

#[derive(Debug, Deserialize)]
pub struct IpnPayload {
    pub payment_id: i64,
    pub payment_status: String,
    // Present in every IPN; lookups key on payment_id instead.
    #[allow(dead_code)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub pay_amount: f64,
    #[serde(default)]
    pub actually_paid: f64,
}

/// POST /api/v1/payments/webhook
pub async fn handle_ipn_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !verify_ipn_signature(&state.config.nowpayments_ipn_secret, &body, signature) {
        warn!("Rejected IPN with bad signature");
        return Err(AppError::Unauthorized);
    }

    let payload: IpnPayload = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("body: {e}")))?;
    let status = PaymentStatus::parse(&payload.payment_status).ok_or_else(|| {
        AppError::Validation(format!(
            "payment_status: unknown status '{}'",
            payload.payment_status
        ))
    })?;

    let payment: Option<CryptoPayment> =
        sqlx::query_as("SELECT * FROM crypto_payments WHERE nowpayments_id = $1")
            .bind(payload.payment_id.to_string())
            .fetch_optional(&state.db)
            .await?;
    let payment = payment.ok_or_else(|| {
        AppError::NotFound(format!("Unknown payment {}", payload.payment_id))
    })?;

    let upstream = UpstreamState {
        status,
        actually_paid: payload.actually_paid,
        pay_amount: if payload.pay_amount > 0.0 {
            payload.pay_amount
        } else {
            payment.pay_amount
        },
    };
    apply_upstream_state(&state.db, &state.notifier, &payment, upstream).await?;

    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &str) -> String {
        let value: Value = serde_json::from_str(body).unwrap();
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(sorted_json(&value).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_sorted_json_orders_keys_recursively() {
        let value: Value =
            serde_json::from_str(r#"{"b": 1, "a": {"z": true, "y": [2, {"d": 1, "c": 2}]}}"#)
                .unwrap();
        assert_eq!(
            sorted_json(&value),
            r#"{"a":{"y":[2,{"c":2,"d":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = r#"{"payment_id": 42, "payment_status": "finished", "actually_paid": 0.01}"#;
        let sig = sign("ipn-secret", body);
        assert!(verify_ipn_signature("ipn-secret", body, &sig));
    }

    #[test]
    fn test_signature_is_key_order_independent() {
        let secret = "ipn-secret";
        let body_a = r#"{"payment_id": 42, "payment_status": "finished"}"#;
        let body_b = r#"{"payment_status": "finished", "payment_id": 42}"#;
        // Both bodies canonicalize identically, so one signature fits both.
        let sig = sign(secret, body_a);
        assert!(verify_ipn_signature(secret, body_b, &sig));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = r#"{"payment_id": 42, "payment_status": "finished"}"#;
        let sig = sign("ipn-secret", body);
        let tampered = r#"{"payment_id": 43, "payment_status": "finished"}"#;
        assert!(!verify_ipn_signature("ipn-secret", tampered, &sig));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = r#"{"payment_id": 42}"#;
        let sig = sign("secret-a", body);
        assert!(!verify_ipn_signature("secret-b", body, &sig));
    }

    #[test]
    fn test_uppercase_signature_accepted() {
        let body = r#"{"payment_id": 42}"#;
        let sig = sign("ipn-secret", body).to_uppercase();
        assert!(verify_ipn_signature("ipn-secret", body, &sig));
    }

    #[test]
    fn test_non_json_body_rejected() {
        assert!(!verify_ipn_signature("ipn-secret", "not json", "00"));
    }
}
