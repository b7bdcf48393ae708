#![allow(clippy::unwrap_used)]
// Wire-path tests: raw reads through splitting, correlation, classification,
// decoding, reassembly and parsing, using the reference definitions.

use pretty_assertions::assert_eq;

use deskctl_proto::reassembly::Progress;
use deskctl_proto::structured::{Record, parse_display};
use deskctl_proto::{
    Correlator, Decoded, Dispatch, EventCategory, FrameSplitter, MessageBuilder,
    OperaDefinitions, Reassembler, TiRequest, decode,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn push(category_prefix: &str, body: &str) -> String {
    format!(
        r#"<opera_message version="1.0"><event><data>{category_prefix}{body}</data></event></opera_message>"#
    )
}

fn display_fragments(text: &str, chunk: usize) -> Vec<String> {
    let bytes = text.as_bytes();
    let pieces: Vec<&[u8]> = bytes.chunks(chunk).collect();
    let total = pieces.len();
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            // Counters are decimal digits inside the hex text.
            format!("0000{:04}{total:04}{}", i + 1, hex::encode(piece))
        })
        .collect()
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn reply_and_push_in_one_read_are_routed_separately() {
    let defs = OperaDefinitions::new();
    let splitter = FrameSplitter::new(defs.marker());
    let correlator = Correlator::new();

    let (id, reply) = correlator.issue();
    let request = defs.instrumentation(&id, &TiRequest::KeepAlive);
    assert!(request.contains(&format!(r#"unique_req_id="{id}""#)));

    let read = format!(
        "{}\r\n{}",
        r#"<opera_message unique_req_id="1"><status>OK</status></opera_message>"#,
        push("8101", "01010103"),
    );

    let mut unsolicited = Vec::new();
    for message in splitter.split(read.as_bytes()) {
        let id = defs.request_id(&message).map(str::to_owned);
        if let Dispatch::Unsolicited(msg) = correlator.dispatch(id.as_deref(), message) {
            unsolicited.push(msg);
        }
    }

    assert!(reply.await.unwrap().contains("OK"));
    assert_eq!(unsolicited.len(), 1);

    let payload = defs.event_payload(&unsolicited[0]).unwrap();
    let (category, body) = defs.classify(payload).unwrap();
    assert_eq!(category, EventCategory::Lamp);

    let Some(Decoded::Lamp(lamp)) = decode::decode(category, body).unwrap() else {
        panic!("expected lamp record");
    };
    assert_eq!((lamp.key, lamp.mode, lamp.colour), (1, 1, 3));
}

#[test]
fn reply_with_unknown_id_goes_to_event_path() {
    let defs = OperaDefinitions::new();
    let correlator = Correlator::new();
    let message = r#"<opera_message unique_req_id="42"><data>81050101</data></opera_message>"#;

    let routed = correlator.dispatch(defs.request_id(message), message.to_owned());
    assert!(matches!(routed, Dispatch::Unsolicited(_)));
}

// ── Display stream ──────────────────────────────────────────────────

#[test]
fn fragmented_display_reassembles_and_parses() {
    let defs = OperaDefinitions::new();
    let text = "object:\nname:ContactDetails\nstring0:Alice\nstring1:2000\nend:\nobject:\nname:Edit\nmode:ModeLowercase\nend:\n";
    let mut reassembler = Reassembler::new("display");

    let mut completed = None;
    for body in display_fragments(text, 16) {
        let message = push("8103", &body);
        let payload = defs.event_payload(&message).unwrap();
        let (category, rest) = defs.classify(payload).unwrap();
        assert_eq!(category, EventCategory::Display);

        let Some(Decoded::Display(fragment)) = decode::decode(category, rest).unwrap() else {
            panic!("expected display fragment");
        };
        if let Progress::Complete(content) = reassembler.push(&fragment).unwrap() {
            completed = Some(content);
        }
    }

    let content = completed.unwrap();
    assert_eq!(content, text);

    let mut modes = Vec::new();
    let model = parse_display(&content, &mut |r: Record<'_>| {
        if r.value.starts_with("Mode") {
            modes.push(r.value.to_owned());
        }
    });
    assert_eq!(model["ContactDetails"].field("string0"), Some("Alice"));
    assert_eq!(model["ContactDetails"].field("string1"), Some("2000"));
    assert_eq!(modes, vec!["ModeLowercase".to_owned()]);
}

#[test]
fn repeated_display_is_not_republished() {
    let text = "object:\nname:Idle\nend:\n";
    let mut reassembler = Reassembler::new("display");

    let feed = |r: &mut Reassembler| {
        let mut last = Progress::Pending;
        for body in display_fragments(text, 8) {
            let Some(Decoded::Display(fragment)) =
                decode::decode(EventCategory::Display, &body).unwrap()
            else {
                panic!("expected display fragment");
            };
            last = r.push(&fragment).unwrap();
        }
        last
    };

    assert!(matches!(feed(&mut reassembler), Progress::Complete(_)));
    assert_eq!(feed(&mut reassembler), Progress::Unchanged);
}
