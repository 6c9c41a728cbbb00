use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

use super::{LocationStore, LocationWrite, RawDocument, StoreError, StoreEvent, Subscription};

/// The realtime listen channel is a gRPC-only surface; over REST the closest
/// faithful shape is a short-period poll that emits only when the server
/// write time moves.
const SUBSCRIBE_POLL: Duration = Duration::from_secs(2);

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

/// Upper bound on any single request. Without it a stalled connection parks
/// a write forever and the tracker can never observe cancellation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Firestore-backed document store. One document per bag, keyed under
/// `artifacts/{app}/public/data/bag_{id}`; the store owns the schema, we only
/// merge fields into it.
#[derive(Clone)]
pub struct FirestoreStore {
    http: reqwest::Client,
    project_id: String,
    api_key: String,
    namespace_id: String,
    id_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: &AppConfig, id_token: Option<String>) -> Self {
        // Panics only when no TLS backend can be initialized, same as
        // `Client::new`.
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            namespace_id: config.namespace_id.clone(),
            id_token,
        }
    }

    fn document_name(&self, bag_id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/artifacts/{}/public/data/bag_{}",
            self.project_id, self.namespace_id, bag_id
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_document(&self, bag_id: &str) -> Result<Option<RawDocument>, StoreError> {
        let url = format!(
            "{FIRESTORE_BASE}/{}?key={}",
            self.document_name(bag_id),
            self.api_key
        );
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Other(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(StoreError::PermissionDenied(read_error_body(response).await))
            }
            status if status.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|err| StoreError::Other(err.to_string()))?;
                Ok(Some(document_from_json(&body)?))
            }
            _ => Err(StoreError::Other(read_error_body(response).await)),
        }
    }
}

impl LocationStore for FirestoreStore {
    async fn upsert_merge(&self, bag_id: &str, write: &LocationWrite) -> Result<(), StoreError> {
        let url = format!(
            "{FIRESTORE_BASE}/projects/{}/databases/(default)/documents:commit?key={}",
            self.project_id, self.api_key
        );

        let plain_fields = write.to_fields();
        let fields = encode_fields(&plain_fields);
        let field_paths: Vec<String> = plain_fields.keys().cloned().collect();

        let body = json!({
            "writes": [{
                "update": {
                    "name": self.document_name(bag_id),
                    "fields": fields,
                },
                "updateMask": {
                    "fieldPaths": field_paths,
                },
                "updateTransforms": [{
                    "fieldPath": "lastUpdated",
                    "setToServerValue": "REQUEST_TIME",
                }],
            }],
        });

        let response = self
            .authorize(self.http.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Other(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                debug!("committed record for bag {bag_id}");
                Ok(())
            }
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(StoreError::PermissionDenied(read_error_body(response).await))
            }
            _ => Err(StoreError::Other(read_error_body(response).await)),
        }
    }

    fn subscribe(&self, bag_id: &str, events: mpsc::Sender<StoreEvent>) -> Subscription {
        let store = self.clone();
        let bag_id = bag_id.to_string();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SUBSCRIBE_POLL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_update: Option<DateTime<Utc>> = None;
            let mut first = true;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.fetch_document(&bag_id).await {
                            Ok(doc) => {
                                let update = doc.as_ref().map(|d| d.update_time);
                                if first || update != last_update {
                                    first = false;
                                    last_update = update;
                                    if events.send(StoreEvent::Snapshot(doc)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(err) => {
                                warn!("subscription poll for bag {bag_id} failed: {err}");
                                let _ = events.send(StoreEvent::Failed(err)).await;
                                // Fatal to this subscription; a fresh one is
                                // opened when auto-refresh is re-enabled.
                                break;
                            }
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        Subscription::new(cancel, task)
    }
}

async fn read_error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<Value>().await {
        Ok(body) => body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(|message| message.to_string())
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    }
}

/// Plain JSON -> Firestore typed values.
fn encode_fields(fields: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, value) in fields {
        out.insert(key.clone(), encode_value(value));
    }
    Value::Object(out)
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_u64() || n.is_i64() => {
            json!({ "integerValue": n.to_string() })
        }
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Null => json!({ "nullValue": null }),
        other => json!({ "stringValue": other.to_string() }),
    }
}

/// Firestore document JSON -> raw field map + server write time.
fn document_from_json(body: &Value) -> Result<RawDocument, StoreError> {
    let update_time = body
        .get("updateTime")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|time| time.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut fields = Map::new();
    if let Some(Value::Object(raw_fields)) = body.get("fields") {
        for (key, value) in raw_fields {
            fields.insert(key.clone(), decode_value(value));
        }
    }

    Ok(RawDocument {
        fields,
        update_time,
    })
}

fn decode_value(value: &Value) -> Value {
    if let Some(b) = value.get("booleanValue").and_then(Value::as_bool) {
        return Value::Bool(b);
    }
    if let Some(raw) = value.get("integerValue").and_then(Value::as_str) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
    }
    if let Some(d) = value.get("doubleValue").and_then(Value::as_f64) {
        return Value::from(d);
    }
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Value::from(s);
    }
    if let Some(ts) = value.get("timestampValue").and_then(Value::as_str) {
        return Value::from(ts);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BatteryLevel;
    use crate::store::decode_record;

    #[test]
    fn encodes_field_types_the_way_firestore_expects() {
        let write = LocationWrite::new(
            40.785091,
            -73.968285,
            true,
            BatteryLevel::Percent(55),
            "agent".into(),
            9,
            Utc::now(),
        );
        let encoded = encode_fields(&write.to_fields());
        assert_eq!(encoded["lat"]["doubleValue"], json!(40.785091));
        assert_eq!(encoded["isSimulated"]["booleanValue"], json!(true));
        assert_eq!(encoded["batteryLevel"]["integerValue"], json!("55"));
        assert_eq!(encoded["sendCount"]["integerValue"], json!("9"));
        assert_eq!(encoded["deviceAgent"]["stringValue"], json!("agent"));
    }

    #[test]
    fn unknown_battery_encodes_as_the_sentinel_string() {
        let write = LocationWrite::new(
            0.0,
            0.0,
            false,
            BatteryLevel::Unknown,
            String::new(),
            1,
            Utc::now(),
        );
        let encoded = encode_fields(&write.to_fields());
        assert_eq!(encoded["batteryLevel"]["stringValue"], json!("Unknown"));
    }

    #[test]
    fn decodes_a_document_response() {
        let body = json!({
            "name": "projects/p/databases/(default)/documents/artifacts/a/public/data/bag_X7K9P2",
            "updateTime": "2026-08-29T12:00:00Z",
            "fields": {
                "lat": { "doubleValue": 40.785091 },
                "lng": { "doubleValue": -73.968285 },
                "isSimulated": { "booleanValue": false },
                "batteryLevel": { "integerValue": "87" },
                "deviceAgent": { "stringValue": "Linux/6.8 (desk)" },
                "sendCount": { "integerValue": "4" },
                "timestamp": { "stringValue": "2026-08-29T11:59:58+00:00" },
                "lastUpdated": { "timestampValue": "2026-08-29T12:00:00Z" },
            },
        });
        let doc = document_from_json(&body).unwrap();
        let record = decode_record(&doc);
        assert_eq!(record.lat, 40.785091);
        assert_eq!(record.battery_level, BatteryLevel::Percent(87));
        assert_eq!(record.send_count, 4);
        assert_eq!(
            doc.update_time,
            DateTime::parse_from_rfc3339("2026-08-29T12:00:00Z").unwrap()
        );
    }

    #[test]
    fn missing_update_time_falls_back_to_now() {
        let before = Utc::now();
        let doc = document_from_json(&json!({ "fields": {} })).unwrap();
        assert!(doc.update_time >= before);
    }
}
