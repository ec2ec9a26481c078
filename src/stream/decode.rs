//! Incremental frame decoding (Bytes -> JSON Value -> StreamEvent).

use crate::stream::events::{EventParser, StreamEvent};
use crate::BoxStream;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;

const FRAME_PREFIX: &str = "data: ";

/// Split a raw byte stream into parsed `data: <json>` frames.
///
/// Bytes are buffered until a `\n`-terminated line exists; the trailing
/// partial line is carried across reads, so a chunk boundary may fall
/// mid-line, mid-JSON-object or mid-multibyte-character without corrupting
/// anything. Lines without the `data: ` prefix and frames whose payload is
/// not valid JSON are skipped.
pub fn frame_lines(input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
    let stream = stream::unfold(
        (input, BytesMut::new(), false),
        |(mut input, mut buf, mut eof)| async move {
            loop {
                if let Some(idx) = buf.iter().position(|&b| b == b'\n') {
                    let line = buf.split_to(idx + 1);
                    if let Some(frame) = parse_line(&line[..idx]) {
                        return Some((Ok(frame), (input, buf, eof)));
                    }
                    continue;
                }

                if eof {
                    // One final attempt on the unterminated remainder.
                    if buf.is_empty() {
                        return None;
                    }
                    let rest = buf.split();
                    if let Some(frame) = parse_line(&rest) {
                        return Some((Ok(frame), (input, buf, eof)));
                    }
                    return None;
                }

                match input.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (input, buf, eof))),
                    None => eof = true,
                }
            }
        },
    );

    Box::pin(stream)
}

fn parse_line(raw: &[u8]) -> Option<Value> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix(FRAME_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            // Lossy tolerance: one corrupt frame must not abort the stream.
            tracing::debug!(error = %e, "skipping malformed frame");
            None
        }
    }
}

/// Full decoder: raw response bytes to typed [`StreamEvent`]s.
///
/// Lazy and single-consumption; the sequence ends when the server closes the
/// connection (the server is expected to do so after the terminal frame).
/// Errors from the underlying transport pass through as items.
pub fn decode_events(input: BoxStream<'static, Bytes>) -> BoxStream<'static, StreamEvent> {
    let frames = frame_lines(input);
    let stream = stream::unfold(
        (frames, EventParser::new(), VecDeque::new(), false),
        |(mut frames, mut parser, mut pending, mut done)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (frames, parser, pending, done)));
                }
                if done {
                    return None;
                }
                match frames.next().await {
                    Some(Ok(frame)) => pending.extend(parser.dispatch(&frame)),
                    Some(Err(e)) => return Some((Err(e), (frames, parser, pending, done))),
                    None => {
                        done = true;
                        pending.extend(parser.finish());
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::{StepStatus, StreamEvent};
    use crate::Result;

    fn byte_stream(chunks: Vec<&'static [u8]>) -> BoxStream<'static, Bytes> {
        Box::pin(stream::iter(chunks).map(|c| Ok::<_, crate::Error>(Bytes::from_static(c))))
    }

    async fn collect_events(chunks: Vec<&'static [u8]>) -> Vec<StreamEvent> {
        decode_events(byte_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    const WELL_FORMED: &[u8] = "data: {\"step\": {\"tool\": \"search_knowledge\", \"status\": \"running\"}}\n\
                                data: {\"token\": \"休暇\"}\n\
                                data: {\"token\": \"は...\"}\n\
                                data: {\"chat_id\": \"c1\"}\n\
                                data: {\"done\": true, \"references\": [{\"id\": \"d1\", \"title\": \"規定.pdf\"}]}\n"
        .as_bytes();

    fn expected_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Step(crate::stream::events::AgentStep {
                tool: "search_knowledge".to_string(),
                status: StepStatus::Running,
                label: None,
                summary: None,
                input: None,
            }),
            StreamEvent::Token {
                text: "休暇".to_string(),
            },
            StreamEvent::Token {
                text: "は...".to_string(),
            },
            StreamEvent::Terminal(crate::stream::events::ChatOutcome {
                chat_id: "c1".to_string(),
                references: vec![crate::stream::events::Reference {
                    id: "d1".to_string(),
                    title: "規定.pdf".to_string(),
                    ..Default::default()
                }],
                avg_similarity: None,
                followups: vec![],
            }),
        ]
    }

    #[tokio::test]
    async fn single_chunk_decodes_all_events() {
        let events = collect_events(vec![WELL_FORMED]).await;
        assert_eq!(events, expected_events());
    }

    #[tokio::test]
    async fn framing_is_independent_of_chunk_splits() {
        // Split at every byte offset, including mid-line, mid-JSON and inside
        // the multi-byte characters of 休暇. The decoded events must always
        // equal the single-chunk decode.
        for split in 1..WELL_FORMED.len() {
            let (a, b) = WELL_FORMED.split_at(split);
            let events = collect_events(vec![a, b]).await;
            assert_eq!(events, expected_events(), "split at byte {split}");
        }
    }

    #[tokio::test]
    async fn one_byte_chunks_decode_identically() {
        let chunks: Vec<&'static [u8]> =
            (0..WELL_FORMED.len()).map(|i| &WELL_FORMED[i..=i]).collect();
        let events = collect_events(chunks).await;
        assert_eq!(events, expected_events());
    }

    #[tokio::test]
    async fn corrupt_frame_does_not_disturb_neighbours() {
        let events = collect_events(vec![
            b"data: {\"token\": \"a\"}\n",
            b"data: {not json\n",
            b"data: {\"token\": \"b\"}\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token {
                    text: "a".to_string()
                },
                StreamEvent::Token {
                    text: "b".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn non_data_lines_are_ignored() {
        let events = collect_events(vec![
            b": keep-alive comment\n\ndata: {\"token\": \"x\"}\nevent: noise\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![StreamEvent::Token {
                text: "x".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn unterminated_trailing_frame_is_parsed_at_eof() {
        let events = collect_events(vec![b"data: {\"token\": \"tail\"}"]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Token {
                text: "tail".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let events = collect_events(vec![]).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn transport_error_passes_through_mid_stream() {
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"token\": \"a\"}\n")),
            Err(crate::Error::Http {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        ];
        let input: BoxStream<'static, Bytes> = Box::pin(stream::iter(items));
        let collected: Vec<Result<StreamEvent>> = decode_events(input).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }
}
