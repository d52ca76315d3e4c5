//! Canonical model type behavior.

use wabridge::provider::{
    ConnectionState, ConnectionStatus, ListContent, MediaContent, MessageButton, MessageResult,
    MessageStatus, OutboundPayload, QrCodeData, SendMessageParams,
};

fn media(mime: &str) -> MediaContent {
    MediaContent {
        url: Some("https://cdn.example/pic.jpg".to_owned()),
        data: None,
        mime_type: mime.to_owned(),
        caption: None,
        filename: None,
    }
}

#[test]
fn qr_round_trips_raw_code_into_data_uri() {
    let qr = QrCodeData::from_raw("XYZ123");
    assert_eq!(qr.qr_code, "XYZ123");
    assert_eq!(qr.base64.as_deref(), Some("XYZ123"));
    assert_eq!(qr.url.as_deref(), Some("data:image/png;base64,XYZ123"));
}

#[test]
fn media_takes_precedence_over_text() {
    let mut params = SendMessageParams::text("5511999", "fallback caption");
    params.media = Some(media("image/png"));
    match params.payload() {
        Some(OutboundPayload::Media(m)) => assert_eq!(m.mime_type, "image/png"),
        other => panic!("expected media payload, got {other:?}"),
    }
}

#[test]
fn buttons_beat_list_and_text() {
    let params = SendMessageParams {
        to: "5511999".to_owned(),
        text: Some("pick one".to_owned()),
        buttons: Some(vec![MessageButton {
            id: "yes".to_owned(),
            label: "Yes".to_owned(),
        }]),
        list: Some(ListContent {
            button_text: "Open".to_owned(),
            sections: Vec::new(),
        }),
        ..SendMessageParams::default()
    };
    assert!(matches!(
        params.payload(),
        Some(OutboundPayload::Buttons(_))
    ));
}

#[test]
fn list_beats_text() {
    let params = SendMessageParams {
        to: "5511999".to_owned(),
        text: Some("pick one".to_owned()),
        list: Some(ListContent {
            button_text: "Open".to_owned(),
            sections: Vec::new(),
        }),
        ..SendMessageParams::default()
    };
    assert!(matches!(params.payload(), Some(OutboundPayload::List(_))));
}

#[test]
fn empty_params_resolve_to_no_payload() {
    let params = SendMessageParams {
        to: "5511999".to_owned(),
        ..SendMessageParams::default()
    };
    assert!(params.payload().is_none());
}

#[test]
fn media_without_url_or_data_is_invalid() {
    let media = MediaContent {
        url: None,
        data: None,
        mime_type: "image/png".to_owned(),
        caption: None,
        filename: None,
    };
    assert!(media.validate().is_err());
}

#[test]
fn inline_media_data_must_be_base64() {
    let mut media = MediaContent {
        url: None,
        data: Some("not base64!!!".to_owned()),
        mime_type: "image/png".to_owned(),
        caption: None,
        filename: None,
    };
    assert!(media.validate().is_err());

    media.data = Some("aGVsbG8=".to_owned());
    assert!(media.validate().is_ok());
}

#[test]
fn failed_result_carries_generated_fallback_id() {
    let result = MessageResult::failed("boom");
    assert_eq!(result.status, MessageStatus::Failed);
    assert!(result.id.starts_with("wab-"));
    assert_eq!(result.error.as_deref(), Some("boom"));
}

#[test]
fn failed_status_constructor_attaches_error() {
    let status = ConnectionStatus::failed("connection refused");
    assert_eq!(status.state, ConnectionState::Failed);
    assert!(!status.is_authenticated);
    assert_eq!(status.error.as_deref(), Some("connection refused"));
}

#[test]
fn states_serialize_lowercase() {
    let json = serde_json::to_string(&ConnectionState::Reconnecting).expect("serializes");
    assert_eq!(json, "\"reconnecting\"");
    let json = serde_json::to_string(&MessageStatus::Sent).expect("serializes");
    assert_eq!(json, "\"sent\"");
}
