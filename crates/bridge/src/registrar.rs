use log::info;
use crate::backend::{BackendClient, RecordedRegistration};
use crate::error::BridgeResult;
use crate::metadata::RecordingMetadata;

/// Backend-assigned identity of a registered recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedEntry {
    recorded_id: u64,
}

impl RecordedEntry {
    pub fn recorded_id(&self) -> u64 {
        self.recorded_id
    }
}

/// Registers recording metadata; any failure is fatal for the run
pub struct RecordingRegistrar<'a> {
    client: &'a BackendClient,
}

impl<'a> RecordingRegistrar<'a> {
    pub fn new(client: &'a BackendClient) -> Self {
        Self { client }
    }

    pub fn registration_body(metadata: &RecordingMetadata) -> BridgeResult<RecordedRegistration> {
        Ok(RecordedRegistration {
            channel_id: metadata.channel_id()?,
            start_at: metadata.start_at_millis(),
            end_at: metadata.end_at_millis(),
            name: metadata.title.clone(),
            description: metadata.description.clone(),
            extended: metadata.extended.clone(),
        })
    }

    /// Register once, no retry
    pub async fn register(&self, metadata: &RecordingMetadata) -> BridgeResult<RecordedEntry> {
        let body = Self::registration_body(metadata)?;
        info!("Registering '{}' on channel {}", body.name, body.channel_id);

        let recorded_id = self.client.register_recorded(&body).await?;
        info!("Registered as recorded {}", recorded_id);
        Ok(RecordedEntry { recorded_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::error::{BridgeError, Stage};
    use crate::metadata::broadcast_offset;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata() -> RecordingMetadata {
        let tz = broadcast_offset();
        RecordingMetadata {
            title: "Evening News".into(),
            original_network_id: "1".into(),
            service_id: "32736".into(),
            start: tz.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap(),
            end: tz.with_ymd_and_hms(2024, 3, 10, 0, 15, 0).unwrap(),
            description: "Today's headlines.".into(),
            extended: "出演者\nAnchor A".into(),
        }
    }

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url: server.uri(),
            connect_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/recorded"))
            .and(body_json(json!({
                "channelId": 132736,
                "startAt": 1_709_994_600_000i64,
                "endAt": 1_709_997_300_000i64,
                "name": "Evening News",
                "description": "Today's headlines.",
                "extended": "出演者\nAnchor A"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"recordedId": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let entry = RecordingRegistrar::new(&client).register(&metadata()).await.unwrap();
        assert_eq!(entry.recorded_id(), 42);
    }

    #[tokio::test]
    async fn test_backend_rejection_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/recorded"))
            .respond_with(ResponseTemplate::new(500).set_body_string("channel not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let err = RecordingRegistrar::new(&client).register(&metadata()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream { stage: Stage::Register, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_recorded_id_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/recorded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = RecordingRegistrar::new(&client).register(&metadata()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Unexpected { stage: Stage::Register, .. }));
    }

    #[tokio::test]
    async fn test_invalid_network_id_never_reaches_backend() {
        let server = MockServer::start().await;
        let client = client(&server);
        let mut meta = metadata();
        meta.original_network_id = String::new();

        let err = RecordingRegistrar::new(&client).register(&meta).await.unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
