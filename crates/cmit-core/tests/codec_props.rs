//! Codec behavior: round trips, streaming decode, envelope defaults.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::BytesMut;
use serde_json::{json, Value};

use cmit_core::protocol::{
    parse_request, parse_response, serialize_request, serialize_response, Envelope,
    FrameDecoder, ProtocolVersion, Request, Response, Status, DEFAULT_VERSION,
};
use cmit_core::CmitError;

fn sample_requests() -> Vec<Request> {
    vec![
        Request::new("PING", Envelope::new("t").with_payload(json!({"x": 1}))),
        Request::new(
            "EXECUTE",
            Envelope::new("a.b.c")
                .with_id("0f00")
                .with_timestamp("1700000000.000000")
                .with_payload(json!(["line\n\nbreaks", {"nested": null}])),
        ),
        Request::new("CUSTOM_VERB", Envelope::new("only.topic")).with_version("1.0"),
        Request::new("PING", Envelope::new("t").with_payload(Value::Null)),
    ]
}

#[test]
fn request_round_trip() {
    for req in sample_requests() {
        let wire = serialize_request(&req);
        assert_eq!(parse_request(&wire).unwrap(), req);
    }
}

#[test]
fn response_round_trip() {
    let req = Request::new("EXECUTE", Envelope::new("jobs").with_id("id-1"));
    let resp = Response::reply(&req, Status::OK, "Accepted", Some(json!({"depth": 3})));
    let wire = serialize_response(&resp);
    assert!(wire.starts_with(b"CMIT/1.0 ok Accepted\n\n{\"id\":\"id-1\""));
    assert!(wire.ends_with(b"\n\n"));
    assert_eq!(parse_response(&wire).unwrap(), resp);
}

#[test]
fn null_payload_survives_parse() {
    let req = parse_request(b"PING CMIT/1.0\n\n{\"topic\":\"t\",\"payload\":null}\n\n").unwrap();
    assert_eq!(req.payload(), Some(&Value::Null));

    let absent = parse_request(b"PING CMIT/1.0\n\n{\"topic\":\"t\"}\n\n").unwrap();
    assert_eq!(absent.payload(), None);
}

#[test]
fn body_keys_follow_envelope_field_order() {
    let req = Request::new(
        "PING",
        Envelope::new("t")
            .with_id("a")
            .with_timestamp("1.0")
            .with_payload(json!(1)),
    );
    let wire = serialize_request(&req);
    assert_eq!(
        wire,
        b"PING CMIT/1.0\n\n{\"id\":\"a\",\"timestamp\":\"1.0\",\"topic\":\"t\",\"payload\":1}\n\n".to_vec()
    );
}

#[test]
fn serialized_reason_stays_on_one_line() {
    let req = Request::new("PING", Envelope::new("t").with_id("1"));
    let resp = Response::reply(&req, Status::OK, "two\r\nlines", None);
    let parsed = parse_response(&serialize_response(&resp)).unwrap();
    assert_eq!(parsed.reason, "two  lines");
}

#[test]
fn decoder_waits_for_both_delimiters() {
    let wire = serialize_request(&sample_requests().remove(0));
    let decoder = FrameDecoder::default();
    let mut buf = BytesMut::new();

    // Feed byte by byte: nothing decodes until the final newline arrives.
    for (i, b) in wire.iter().enumerate() {
        buf.extend_from_slice(&[*b]);
        let got = decoder.decode_request(&mut buf).unwrap();
        if i + 1 < wire.len() {
            assert!(got.is_none(), "decoded early at byte {i}");
        } else {
            assert_eq!(got.unwrap().verb, "PING");
        }
    }
    assert!(buf.is_empty());
}

#[test]
fn decoder_handles_pipelined_frames() {
    let reqs = sample_requests();
    let mut buf = BytesMut::new();
    for r in &reqs {
        buf.extend_from_slice(&serialize_request(r));
        buf.extend_from_slice(b"\r\n"); // stray separator between frames
    }

    let decoder = FrameDecoder::default();
    let mut out = Vec::new();
    while let Some(req) = decoder.decode_request(&mut buf).unwrap() {
        out.push(req);
    }
    assert_eq!(out, reqs);
    assert!(buf.is_empty());
}

#[test]
fn decoder_resyncs_after_malformed_frame() {
    let mut buf = BytesMut::from(&b"PING CMIT/1.0\n\n{\"payload\":1}\n\nPING CMIT/1.0\n\n{\"topic\":\"ok\"}\n\n"[..]);
    let decoder = FrameDecoder::default();

    let err = decoder.decode_request(&mut buf).unwrap_err();
    assert!(matches!(err, CmitError::BadRequest(_)));

    let next = decoder.decode_request(&mut buf).unwrap().unwrap();
    assert_eq!(next.topic(), "ok");
}

#[test]
fn decoder_rejects_oversized_partial_frame() {
    let decoder = FrameDecoder::new(32);
    let mut buf = BytesMut::from(&b"PING CMIT/1.0\n\n{\"topic\":\"aaaaaaaaaaaaaaaaaaaaaaaa"[..]);
    let err = decoder.decode_request(&mut buf).unwrap_err();
    assert!(matches!(err, CmitError::PayloadTooLarge { limit: 32 }));
    assert_eq!(err.client_code().as_str(), "PAYLOAD_TOO_LARGE");
}

#[test]
fn crlf_and_lf_parse_identically() {
    let lf = b"PING CMIT/1.0\n\n{\"id\":\"1\",\"topic\":\"t\"}\n\n";
    let crlf = b"PING CMIT/1.0\r\n\r\n{\"id\":\"1\",\"topic\":\"t\"}\r\n\r\n";
    let mixed = b"PING CMIT/1.0\r\n\n{\"id\":\"1\",\"topic\":\"t\"}\n\r\n";
    let a = parse_request(lf).unwrap();
    assert_eq!(parse_request(crlf).unwrap(), a);
    assert_eq!(parse_request(mixed).unwrap(), a);
    assert_eq!(serialize_request(&a), lf.to_vec());
}

#[test]
fn stamp_defaults_only_fills_missing_fields() {
    let mut env = Envelope::new("t");
    env.stamp_defaults();
    let id = env.id.clone().unwrap();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    let ts = env.timestamp.clone().unwrap();
    let (secs, micros) = ts.split_once('.').unwrap();
    assert!(secs.parse::<u64>().unwrap() > 1_600_000_000);
    assert_eq!(micros.len(), 6);

    let mut kept = Envelope::new("t").with_id("mine").with_timestamp("42.000000");
    kept.stamp_defaults();
    assert_eq!(kept.id.as_deref(), Some("mine"));
    assert_eq!(kept.timestamp.as_deref(), Some("42.000000"));

    let mut other = Envelope::new("t");
    other.stamp_defaults();
    assert_ne!(other.id, env.id);
}

#[test]
fn error_response_mirrors_request_envelope() {
    let req = Request::new("BOGUS", Envelope::new("jobs").with_id("r-1").with_timestamp("5.0"))
        .with_version("1.0");
    let resp = Response::error_for(&req, &CmitError::UnknownVerb("BOGUS".into()));
    assert_eq!(resp.status, Status::ERROR);
    assert_eq!(resp.reason, "Not Implemented");
    assert_eq!(resp.version, "1.0");
    assert_eq!(resp.id(), "r-1");
    assert_eq!(resp.topic(), "jobs");
    assert_eq!(resp.envelope.timestamp.as_deref(), Some("5.0"));
    assert_eq!(resp.payload().unwrap()["code"], "NOT_IMPLEMENTED");
}

#[test]
fn error_response_without_request_generates_envelope() {
    let resp = Response::error(None, None, &CmitError::BadRequest("missing message body".into()));
    assert_eq!(resp.version, DEFAULT_VERSION);
    assert_eq!(resp.topic(), "error.bad_request");
    assert_eq!(resp.id().len(), 32);
    assert!(resp.envelope.timestamp.is_some());
    assert_eq!(
        resp.payload().unwrap()["reason"],
        "bad request: missing message body"
    );
    // Still a valid frame on the wire.
    assert!(parse_response(&serialize_response(&resp)).is_ok());
}

#[test]
fn protocol_versions() {
    assert_eq!(
        ProtocolVersion::check("CMIT/1.0").unwrap(),
        ProtocolVersion { major: 1, minor: 0 }
    );
    assert_eq!(ProtocolVersion::check("1.12").unwrap().minor, 12);

    for bad in ["CMIT/2.0", "HTTP/1.1x", "1", "1.0.0", "1.1234", "CMIT/a.b", ""] {
        let err = ProtocolVersion::check(bad).unwrap_err();
        assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION", "version={bad}");
    }
}

#[test]
fn status_tokens() {
    assert!(Status::OK.is_ok());
    assert!(!Status::ERROR.is_ok());
    assert_eq!(Status::new("ok").unwrap(), Status::OK);
    assert_eq!(Status::new("queued").unwrap().as_str(), "queued");
    assert!(Status::new("two words").is_err());
    assert!(Status::new("").is_err());
}
