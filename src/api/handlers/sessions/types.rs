//! Request/response types for the session endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceView {
    #[serde(rename = "type")]
    pub kind: String,
    pub browser: String,
    pub os: String,
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LocationView {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub login_method: String,
    pub ip_address: String,
    pub device: DeviceView,
    pub location: LocationView,
    pub is_new_device: bool,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub success: bool,
    pub sessions: Vec<SessionView>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TerminateOthersRequest {
    pub current_session_id: Option<Uuid>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TerminateOthersResponse {
    pub success: bool,
    pub message: String,
    pub terminated_count: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub recent_sessions: i64,
    pub unique_devices: usize,
    pub unique_locations: usize,
    pub device_types: Vec<String>,
    pub countries: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatsResponse {
    pub success: bool,
    pub stats: SessionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_view_serializes_camel_case() {
        let view = SessionView {
            id: Uuid::new_v4(),
            login_method: "web3".to_string(),
            ip_address: "203.0.113.7".to_string(),
            device: DeviceView {
                kind: "desktop".to_string(),
                browser: "Firefox".to_string(),
                os: "Linux".to_string(),
                name: "Firefox on Linux".to_string(),
            },
            location: LocationView {
                country: None,
                city: None,
                region: None,
            },
            is_new_device: true,
            login_at: Utc::now(),
            last_activity_at: Utc::now(),
            expires_at: Utc::now(),
        };
        let value = serde_json::to_value(&view).expect("encode");
        assert_eq!(value["ipAddress"], serde_json::json!("203.0.113.7"));
        assert_eq!(value["isNewDevice"], serde_json::json!(true));
        assert_eq!(value["device"]["type"], serde_json::json!("desktop"));
    }

    #[test]
    fn terminate_others_request_allows_missing_survivor() {
        let decoded: TerminateOthersRequest = serde_json::from_value(serde_json::json!({}))
            .expect("decode");
        assert!(decoded.current_session_id.is_none());

        let id = Uuid::new_v4();
        let decoded: TerminateOthersRequest =
            serde_json::from_value(serde_json::json!({ "currentSessionId": id }))
                .expect("decode");
        assert_eq!(decoded.current_session_id, Some(id));
    }
}
