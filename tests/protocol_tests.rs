#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests: JSON fixtures shaped like real backend output, the
//! outbound request bodies, and STOMP frames as a Spring broker emits them.

use lifegame_client::codec::{self, DecodeError, InboundMessage};
use lifegame_client::error_codes::ErrorCode;
use lifegame_client::protocol::{
    ActionCardRequest, CarColor, FieldType, HouseMessage, HouseSaleRequest, JobRequest,
    LobbyUpdate, MoveMessage, PlayerListMessage,
};
use lifegame_client::stomp::{Command, Frame};
use serde_json::json;

fn decoded(payload: &str) -> InboundMessage {
    codec::decode(payload)
        .expect("decodes")
        .expect("not blank")
}

// ════════════════════════════════════════════════════════════════════
// Field types and colors
// ════════════════════════════════════════════════════════════════════

#[test]
fn every_field_type_parses_from_its_wire_name() {
    for field_type in FieldType::ALL {
        assert_eq!(FieldType::from_type_string(field_type.as_str()), field_type);
        assert_eq!(
            serde_json::to_value(field_type).unwrap(),
            json!(field_type.as_str())
        );
    }
}

#[test]
fn unknown_or_blank_type_string_is_aktion() {
    for raw in ["", "   ", "LOTTERIE", "zahltag"] {
        assert_eq!(FieldType::from_type_string(raw), FieldType::Aktion, "{raw:?}");
    }
    let parsed: FieldType = serde_json::from_value(json!(null)).unwrap();
    assert_eq!(parsed, FieldType::Aktion);
    let parsed: FieldType = serde_json::from_value(json!(" HEIRAT ")).unwrap();
    assert_eq!(parsed, FieldType::Heirat);
}

#[test]
fn car_colors_use_upper_case_on_the_wire() {
    assert_eq!(serde_json::to_value(CarColor::Yellow).unwrap(), json!("YELLOW"));
    let parsed: CarColor = serde_json::from_value(json!("BLUE")).unwrap();
    assert_eq!(parsed, CarColor::Blue);
    assert_eq!("red".parse::<CarColor>().unwrap(), CarColor::Red);
    assert!("PURPLE".parse::<CarColor>().is_err());
}

#[test]
fn error_codes_are_screaming_snake_case() {
    assert_eq!(
        serde_json::to_value(ErrorCode::AllEndpointsExhausted).unwrap(),
        json!("ALL_ENDPOINTS_EXHAUSTED")
    );
    assert_eq!(
        serde_json::to_value(ErrorCode::TransportSendFailure).unwrap(),
        json!("TRANSPORT_SEND_FAILURE")
    );
    assert!(ErrorCode::ConnectionTimeout.is_connection_error());
    assert!(!ErrorCode::DecodeError.is_connection_error());
}

// ════════════════════════════════════════════════════════════════════
// Inbound fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn move_fixture_from_backend() {
    let payload = r#"{
        "playerName": "Lena",
        "fieldIndex": 14,
        "typeString": "ZAHLTAG",
        "timestamp": "2025-05-02T10:15:30",
        "nextPossibleFields": [15, 21]
    }"#;
    let InboundMessage::Move(movement) = decoded(payload) else {
        panic!("expected a move");
    };
    assert_eq!(movement.player_id(), "Lena");
    assert_eq!(movement.field_type(), FieldType::Zahltag);
    assert_eq!(movement.next_possible_fields, vec![15, 21]);
}

#[test]
fn move_with_unknown_field_type_still_decodes() {
    let movement: MoveMessage =
        serde_json::from_str(r#"{"playerName":"Lena","fieldIndex":2,"typeString":"NEU"}"#)
            .unwrap();
    assert_eq!(movement.field_type(), FieldType::Aktion);
}

#[test]
fn move_with_null_type_and_options_is_still_a_move() {
    let payload = r#"{"playerName":"A","fieldIndex":3,"typeString":null,"nextPossibleFields":null}"#;
    let Some(InboundMessage::Move(movement)) = codec::decode_game_topic(payload).unwrap() else {
        panic!("expected a move on the game topic");
    };
    assert_eq!(movement.field_index, 3);
    assert_eq!(movement.field_type(), FieldType::Aktion);
    assert!(movement.next_possible_fields.is_empty());

    let InboundMessage::Move(movement) = decoded(payload) else {
        panic!("expected a move");
    };
    assert_eq!(movement.player_id(), "A");
}

#[test]
fn player_orders_keep_slots_outside_byte_range() {
    let InboundMessage::PlayerOrders(orders) =
        decoded(r#"{"playerOrders":{"A":1,"B":300,"C":-1}}"#)
    else {
        panic!("expected a player order draft");
    };
    assert_eq!(orders.player_orders.get("A"), Some(&1));
    assert_eq!(orders.player_orders.get("B"), Some(&300));
    assert_eq!(orders.player_orders.get("C"), Some(&-1));
}

#[test]
fn lobby_update_skips_empty_slots() {
    let update: LobbyUpdate = serde_json::from_str(
        r#"{"player1":"Anna","player2":null,"player3":"  ","player4":"Tom","isStarted":false}"#,
    )
    .unwrap();
    assert_eq!(update.players(), vec!["Anna", "Tom"]);
    assert_eq!(update.started(), Some(false));

    let unflagged: LobbyUpdate = serde_json::from_str(r#"{"player1":"Anna"}"#).unwrap();
    assert_eq!(unflagged.started(), None);
}

#[test]
fn player_list_accepts_numeric_and_string_ids() {
    let list: PlayerListMessage =
        serde_json::from_str(r#"{"playerList":[3, "Anna", "", null, 7]}"#).unwrap();
    assert_eq!(list.player_ids(), vec!["3", "Anna", "7"]);
}

#[test]
fn game_action_response_defaults_to_success() {
    let payload = r#"{"gameState":{"playerPositions":{"Anna":5},"gameId":"12"}}"#;
    let InboundMessage::GameAction(response) = decoded(payload) else {
        panic!("expected a game action response");
    };
    assert!(response.success);
    assert!(response.move_result.is_none());

    let rejected = r#"{"moveResult":null,"success":false,"message":"Nicht am Zug"}"#;
    let InboundMessage::GameAction(response) = decoded(rejected) else {
        panic!("expected a game action response");
    };
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Nicht am Zug"));
}

#[test]
fn tagged_messages_decode_without_heuristics() {
    let cases = [
        (r#"{"type":"gameStatus","started":true}"#, "gameStatus"),
        (r#"{"type":"players","playerList":["A"]}"#, "players"),
        (r#"{"type":"playerUpdate","playerName":"A","color":"RED"}"#, "playerUpdate"),
        (r#"{"type":"job","jobId":4}"#, "jobs"),
        (r#"{"type":"houses","houses":[]}"#, "houses"),
        (r#"{"type":"actionCard","headline":"Erbschaft"}"#, "actionCard"),
    ];
    for (payload, kind) in cases {
        assert_eq!(decoded(payload).kind(), kind, "{payload}");
    }
}

#[test]
fn player_update_carries_color() {
    let InboundMessage::PlayerUpdate(update) =
        decoded(r#"{"playerName":"Tom","color":"GREEN"}"#)
    else {
        panic!("expected a player update");
    };
    assert_eq!(update.color, Some(CarColor::Green));
}

#[test]
fn structural_errors_are_classified() {
    assert!(matches!(
        codec::decode("{broken"),
        Err(DecodeError::InvalidJson(_))
    ));
    assert_eq!(codec::decode(r#""text""#), Err(DecodeError::NotAnObject));
    assert!(matches!(
        codec::decode_chat(r#"{"content":"no author"}"#),
        Err(DecodeError::InvalidShape { .. })
    ));
    assert!(matches!(
        codec::decode_houses(r#"{"houses":5}"#),
        Err(DecodeError::InvalidShape { .. })
    ));
}

#[test]
fn status_accepts_a_json_string() {
    let Some(InboundMessage::GameStatus(status)) =
        codec::decode_status(r#""Spiel wurde gestartet""#).unwrap()
    else {
        panic!("expected a status");
    };
    assert!(status.started);
    assert_eq!(status.message.as_deref(), Some("Spiel wurde gestartet"));
}

// ════════════════════════════════════════════════════════════════════
// Outbound bodies
// ════════════════════════════════════════════════════════════════════

#[test]
fn job_request_omits_missing_job_id() {
    let request = JobRequest {
        player_name: "Anna".into(),
        game_id: "12".into(),
        has_degree: true,
        job_id: None,
    };
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({"playerName":"Anna","gameId":"12","hasDegree":true})
    );
}

#[test]
fn house_sale_nests_the_house_card() {
    let request = HouseSaleRequest {
        game_id: "12".into(),
        player_name: "Anna".into(),
        house: HouseMessage {
            house_id: Some(3),
            bezeichnung: "Villa".into(),
            kaufpreis: 200_000,
            verkaufspreis_rot: 150_000,
            verkaufspreis_schwarz: 250_000,
        },
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["house"]["verkaufspreisRot"], json!(150_000));
    assert_eq!(value["house"]["houseId"], json!(3));
}

#[test]
fn action_card_choice_only_when_playing() {
    let draw = ActionCardRequest {
        game_id: "12".into(),
        player_name: "Anna".into(),
        choice: None,
    };
    assert_eq!(
        serde_json::to_value(&draw).unwrap(),
        json!({"gameId":"12","playerName":"Anna"})
    );
}

// ════════════════════════════════════════════════════════════════════
// STOMP frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn spring_connected_frame_with_crlf() {
    let raw = "CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
    let frame = Frame::parse(raw).unwrap().unwrap();
    assert_eq!(frame.command, Command::Connected);
    assert_eq!(frame.header("version"), Some("1.2"));
    assert!(frame.body.is_empty());
}

#[test]
fn message_frame_with_utf8_body_and_content_length() {
    let body = r#"{"playerName":"Jörg","content":"Grüße"}"#;
    let raw = format!(
        "MESSAGE\ndestination:/topic/chat\nsubscription:sub-0\nmessage-id:m1\ncontent-length:{}\n\n{body}\0",
        body.len()
    );
    let frame = Frame::parse(&raw).unwrap().unwrap();
    assert_eq!(frame.body, body);

    let Some(InboundMessage::Chat(chat)) = codec::decode_chat(&frame.body).unwrap() else {
        panic!("expected chat");
    };
    assert_eq!(chat.player_name, "Jörg");
}

#[test]
fn send_frame_escapes_header_values() {
    let frame = Frame::send("/app/chat", "{}").with_header("note", "a:b\nc");
    let encoded = frame.encode();
    assert!(encoded.contains("note:a\\cb\\nc\n"));
    assert!(encoded.ends_with("{}\0"));
    assert_eq!(Frame::parse(&encoded).unwrap().unwrap(), frame.with_header("content-length", "2"));
}

#[test]
fn heartbeats_and_garbage() {
    assert_eq!(Frame::parse("\n").unwrap(), None);
    assert_eq!(Frame::parse("\r\n\0").unwrap(), None);
    assert!(Frame::parse("HELLO\n\n\0").is_err());
    assert!(Frame::parse("MESSAGE\nno-colon\n\n\0").is_err());
    assert!(Frame::parse("MESSAGE\ncontent-length:99\n\nshort\0").is_err());
}
