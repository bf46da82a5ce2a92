//! Message parsing and path addressing tests

use crate::message::{FieldPath, Message};
use crate::ProtocolError;

const ADT: &str = "MSH|^~\\&|HIS|RIH|EKG|EKG|202401020304||ADT^A01|MSG00001|P|2.5.1\nPID|1||12345^^^MRN||DOE^JOHN";

#[test]
fn test_parse_and_render_round_trip() {
    let msg = Message::parse(ADT).unwrap();
    assert_eq!(msg.segment_count(), 2);
    assert_eq!(msg.to_string(), ADT);
}

#[test]
fn test_parse_accepts_cr_and_crlf_separators() {
    let cr = ADT.replace('\n', "\r");
    let crlf = ADT.replace('\n', "\r\n");
    assert_eq!(Message::parse(&cr).unwrap().segment_count(), 2);
    assert_eq!(Message::parse(&crlf).unwrap().segment_count(), 2);
}

#[test]
fn test_parse_empty_is_error() {
    assert!(matches!(
        Message::parse(""),
        Err(ProtocolError::EmptyMessage)
    ));
    assert!(matches!(
        Message::parse("\r\n"),
        Err(ProtocolError::EmptyMessage)
    ));
}

#[test]
fn test_msh_field_numbering() {
    let msg = Message::parse(ADT).unwrap();
    // MSH-1 is the field separator convention: MSH-2 is encoding chars.
    assert_eq!(msg.get("MSH-2").unwrap(), Some("^~\\&"));
    assert_eq!(msg.get("MSH-3").unwrap(), Some("HIS"));
    assert_eq!(msg.get("MSH-9").unwrap(), Some("ADT^A01"));
    assert_eq!(msg.get("MSH-9.1").unwrap(), Some("ADT"));
    assert_eq!(msg.get("MSH-9.2").unwrap(), Some("A01"));
    assert_eq!(msg.get("MSH-10").unwrap(), Some("MSG00001"));
    assert_eq!(msg.get("MSH-10.1").unwrap(), Some("MSG00001"));
}

#[test]
fn test_non_msh_field_numbering() {
    let msg = Message::parse(ADT).unwrap();
    assert_eq!(msg.get("PID-1").unwrap(), Some("1"));
    assert_eq!(msg.get("PID-3.1").unwrap(), Some("12345"));
    assert_eq!(msg.get("PID-3.4").unwrap(), Some("MRN"));
    assert_eq!(msg.get("PID-5.2").unwrap(), Some("JOHN"));
}

#[test]
fn test_get_missing_returns_none() {
    let msg = Message::parse(ADT).unwrap();
    assert_eq!(msg.get("ZZZ-1").unwrap(), None);
    assert_eq!(msg.get("PID-40").unwrap(), None);
    assert_eq!(msg.get("PID-3.9").unwrap(), None);
}

#[test]
fn test_invalid_paths() {
    let msg = Message::parse(ADT).unwrap();
    for path in ["MSH", "MSH-", "-10", "MSH-0", "MSH-x", "MSH-10.0", "MSH-10.x"] {
        assert!(
            matches!(msg.get(path), Err(ProtocolError::InvalidPath(_))),
            "path {path:?} should be invalid"
        );
    }
}

#[test]
fn test_set_field() {
    let mut msg = Message::parse(ADT).unwrap();
    msg.set("PID-5", "SMITH^JANE").unwrap();
    assert_eq!(msg.get("PID-5.1").unwrap(), Some("SMITH"));
    assert_eq!(msg.get("PID-5.2").unwrap(), Some("JANE"));
}

#[test]
fn test_set_component_preserves_siblings() {
    let mut msg = Message::parse(ADT).unwrap();
    msg.set("PID-5.2", "JANE").unwrap();
    assert_eq!(msg.get("PID-5").unwrap(), Some("DOE^JANE"));
}

#[test]
fn test_set_grows_fields_and_components() {
    let mut msg = Message::parse(ADT).unwrap();
    msg.set("PID-8", "M").unwrap();
    assert_eq!(msg.get("PID-8").unwrap(), Some("M"));
    assert_eq!(msg.get("PID-6").unwrap(), Some(""));

    msg.set("PID-1.3", "x").unwrap();
    assert_eq!(msg.get("PID-1").unwrap(), Some("1^^x"));
}

#[test]
fn test_set_unknown_segment_is_error() {
    let mut msg = Message::parse(ADT).unwrap();
    assert!(msg.set("ZZZ-1", "x").is_err());
}

#[test]
fn test_control_id_and_type_helpers() {
    let msg = Message::parse(ADT).unwrap();
    assert_eq!(msg.control_id(), Some("MSG00001"));
    assert_eq!(msg.message_type(), Some("ADT"));

    let bare = Message::parse("MSH|^~\\&|APP").unwrap();
    assert_eq!(bare.control_id(), None);
}

#[test]
fn test_field_path_parsing() {
    let path: FieldPath = "MSH-10.1".parse().unwrap();
    assert_eq!(path.segment, "MSH");
    assert_eq!(path.field, 10);
    assert_eq!(path.component, Some(1));

    let path: FieldPath = "PID-5".parse().unwrap();
    assert_eq!(path.component, None);
}
