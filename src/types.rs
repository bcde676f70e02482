use std::collections::BTreeMap;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::token::Credentials;

/// Value reported as `expiresIn` by the token endpoint.
///
/// Kept at 3600 for client compatibility even though the signed token's own
/// `et` is only [`crate::token::TOKEN_TTL_SECS`] ahead.
pub const REPORTED_EXPIRES_IN: u64 = 3600;

/// Property-post message format version.
pub const MESSAGE_VERSION: &str = "1.0";

/// Current time as RFC 3339 UTC with millisecond precision.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Names of required request fields that were absent or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFields(pub Vec<&'static str>);

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing required parameters: {}", self.0.join(", "))
    }
}

fn check_str(missing: &mut Vec<&'static str>, name: &'static str, value: &Option<String>) {
    if value.as_deref().is_none_or(str::is_empty) {
        missing.push(name);
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn take(value: Option<String>) -> String {
    value.unwrap_or_default()
}

/// Deserialize a field that was present in the body, even when it is `null`.
///
/// Combined with `#[serde(default)]`, an absent field stays `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Body of `POST /api/onenet/token`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_key: Option<String>,
}

impl TokenRequest {
    pub fn into_credentials(self) -> Result<Credentials, MissingFields> {
        let mut missing = Vec::new();
        check_str(&mut missing, "productId", &self.product_id);
        check_str(&mut missing, "deviceName", &self.device_name);
        check_str(&mut missing, "deviceKey", &self.device_key);
        if !missing.is_empty() {
            return Err(MissingFields(missing));
        }
        Ok(Credentials::new(
            take(self.product_id),
            take(self.device_name),
            take(self.device_key),
        ))
    }
}

/// Body of `POST /api/onenet/connect`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    /// Forwarded verbatim as the upstream body. `null`, `false`, `0` and `""`
    /// count as missing; empty objects and arrays do not.
    #[serde(default)]
    pub data: Option<Value>,
}

/// A connect request that passed validation.
#[derive(Debug, Clone)]
pub struct Connect {
    pub token: String,
    pub topic: String,
    pub data: Value,
}

impl ConnectRequest {
    pub fn validate(self) -> Result<Connect, MissingFields> {
        let mut missing = Vec::new();
        check_str(&mut missing, "token", &self.token);
        check_str(&mut missing, "topic", &self.topic);
        let Some(data) = self.data.filter(|data| !is_falsy(data)) else {
            missing.push("data");
            return Err(MissingFields(missing));
        };
        if !missing.is_empty() {
            return Err(MissingFields(missing));
        }
        Ok(Connect {
            token: take(self.token),
            topic: take(self.topic),
            data,
        })
    }
}

/// Body of `POST /api/onenet/send-data`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDataRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_key: Option<String>,
    #[serde(default)]
    pub data_name: Option<String>,
    /// Any JSON value, `null` and other falsy values included.
    #[serde(default, deserialize_with = "present")]
    pub data_value: Option<Value>,
}

/// A send-data request that passed validation.
#[derive(Debug, Clone)]
pub struct SendData {
    pub credentials: Credentials,
    pub data_name: String,
    pub data_value: Value,
}

impl SendDataRequest {
    pub fn validate(self) -> Result<SendData, MissingFields> {
        let mut missing = Vec::new();
        check_str(&mut missing, "productId", &self.product_id);
        check_str(&mut missing, "deviceName", &self.device_name);
        check_str(&mut missing, "deviceKey", &self.device_key);
        check_str(&mut missing, "dataName", &self.data_name);
        if self.data_value.is_none() {
            missing.push("dataValue");
        }
        match self.data_value {
            Some(data_value) if missing.is_empty() => Ok(SendData {
                credentials: Credentials::new(
                    take(self.product_id),
                    take(self.device_name),
                    take(self.device_key),
                ),
                data_name: take(self.data_name),
                data_value,
            }),
            _ => Err(MissingFields(missing)),
        }
    }
}

/// `$sys/{product_id}/{device_name}/thing/property/post`
pub fn property_post_topic(product_id: &str, device_name: &str) -> String {
    format!("$sys/{}/{}/thing/property/post", product_id, device_name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValue {
    pub value: Value,
}

/// Upstream body for a single property report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyPost {
    pub id: String,
    pub version: String,
    pub params: BTreeMap<String, PropertyValue>,
}

impl PropertyPost {
    pub fn single(id: String, name: String, value: Value) -> Self {
        Self {
            id,
            version: MESSAGE_VERSION.to_string(),
            params: BTreeMap::from([(name, PropertyValue { value })]),
        }
    }
}

/// Uniform envelope around a relayed upstream reply
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    /// Parsed JSON when the upstream body is JSON, otherwise the raw text.
    pub onenet_response: Value,
    pub details: RelayDetails,
}

#[derive(Debug, Serialize)]
pub struct RelayDetails {
    pub timestamp: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PropertyPost>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    pub expires_in: u64,
    pub timestamp: String,
}

/// Error body for every locally produced failure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: String,
    pub endpoints: Endpoints,
    pub documentation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: String,
    pub connect: String,
    pub token: String,
    pub send_data: String,
    pub frontend: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_request_lists_missing_fields() {
        let req: TokenRequest = serde_json::from_value(json!({"productId": "p", "deviceKey": ""})).unwrap();
        let err = req.into_credentials().unwrap_err();
        assert_eq!(err.0, vec!["deviceName", "deviceKey"]);
        assert_eq!(
            err.to_string(),
            "missing required parameters: deviceName, deviceKey"
        );
    }

    #[test]
    fn test_connect_rejects_null_data() {
        let req: ConnectRequest =
            serde_json::from_value(json!({"token": "t", "topic": "x", "data": null})).unwrap();
        assert_eq!(req.validate().unwrap_err().0, vec!["data"]);
    }

    #[test]
    fn test_connect_rejects_falsy_data() {
        for falsy in [json!(0), json!(0.0), json!(false), json!("")] {
            let req: ConnectRequest =
                serde_json::from_value(json!({"token": "t", "topic": "x", "data": falsy}))
                    .unwrap();
            assert_eq!(req.validate().unwrap_err().0, vec!["data"], "data = {}", falsy);
        }
    }

    #[test]
    fn test_connect_accepts_empty_containers_and_truthy_scalars() {
        for data in [json!({}), json!([]), json!(1), json!(true), json!("0")] {
            let req: ConnectRequest =
                serde_json::from_value(json!({"token": "t", "topic": "x", "data": data}))
                    .unwrap();
            assert_eq!(req.validate().unwrap().data, data);
        }
    }

    #[test]
    fn test_send_data_value_presence() {
        let base = json!({
            "productId": "p", "deviceName": "d", "deviceKey": "k", "dataName": "temp"
        });

        let absent: SendDataRequest = serde_json::from_value(base.clone()).unwrap();
        assert_eq!(absent.validate().unwrap_err().0, vec!["dataValue"]);

        for falsy in [json!(null), json!(0), json!(false), json!("")] {
            let mut body = base.clone();
            body["dataValue"] = falsy.clone();
            let req: SendDataRequest = serde_json::from_value(body).unwrap();
            assert_eq!(req.validate().unwrap().data_value, falsy);
        }
    }

    #[test]
    fn test_property_post_shape() {
        let post = PropertyPost::single("17".into(), "temp".into(), json!(21.5));
        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            json!({"id": "17", "version": "1.0", "params": {"temp": {"value": 21.5}}})
        );
    }

    #[test]
    fn test_topic() {
        assert_eq!(
            property_post_topic("abc123", "dev1"),
            "$sys/abc123/dev1/thing/property/post"
        );
    }

    #[test]
    fn test_relay_envelope_omits_absent_data() {
        let env = RelayEnvelope {
            success: true,
            status_code: 200,
            message: "ok".into(),
            onenet_response: json!("raw"),
            details: RelayDetails {
                timestamp: "t".into(),
                topic: "x".into(),
                data: None,
            },
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["statusCode"], 200);
        assert_eq!(v["onenetResponse"], "raw");
        assert!(v["details"].get("data").is_none());
    }

    #[test]
    fn test_iso_timestamp_is_utc_millis() {
        let ts = iso_timestamp();
        assert!(ts.ends_with('Z'), "{}", ts);
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
