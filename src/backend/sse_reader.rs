//! Minimal SSE record reader for backend (Azure Responses API) event
//! streams. Authored fresh: the teacher's `parse::sse` module is referenced
//! throughout `llm/conversion/responses.rs` (a `json_passthrough`-style
//! helper) but its body was not present in the retrieval pack, only the
//! `pub mod sse;` declaration in `parse/mod.rs`. The signature below follows
//! the shape implied by those call sites.

use bytes::Bytes;
use futures::Stream;
use futures_util::StreamExt;

use crate::error::GatewayError;

#[derive(Debug, Clone, Default)]
pub struct SseEvent {
	pub event: Option<String>,
	pub data: String,
}

/// Wraps a `reqwest::Response`'s byte stream into a stream of parsed SSE
/// records, splitting on blank-line-terminated `event:`/`data:` blocks.
pub fn sse_event_stream(response: reqwest::Response) -> impl Stream<Item = Result<SseEvent, GatewayError>> {
	let byte_stream = response.bytes_stream();
	futures::stream::unfold((byte_stream, String::new(), false), |(mut stream, mut buf, mut done)| async move {
		loop {
			if let Some(record) = take_record(&mut buf) {
				return Some((Ok(record), (stream, buf, done)));
			}
			if done {
				return None;
			}
			match stream.next().await {
				Some(Ok(chunk)) => push_chunk(&mut buf, chunk),
				Some(Err(e)) => return Some((Err(GatewayError::from(e)), (stream, buf, done))),
				None => {
					done = true;
					if let Some(record) = take_record(&mut buf) {
						return Some((Ok(record), (stream, buf, done)));
					}
					return None;
				}
			}
		}
	})
}

fn push_chunk(buf: &mut String, chunk: Bytes) {
	buf.push_str(&String::from_utf8_lossy(&chunk));
}

/// Pulls one `\n\n`-terminated record out of `buf`, parsing its `event:` and
/// `data:` lines (multiple `data:` lines are joined with `\n`, per the SSE spec).
fn take_record(buf: &mut String) -> Option<SseEvent> {
	let idx = buf.find("\n\n")?;
	let record = buf[..idx].to_string();
	buf.drain(..idx + 2);

	let mut event = None;
	let mut data_lines = Vec::new();
	for line in record.lines() {
		if let Some(rest) = line.strip_prefix("event:") {
			event = Some(rest.trim().to_string());
		} else if let Some(rest) = line.strip_prefix("data:") {
			data_lines.push(rest.trim_start().to_string());
		}
	}
	Some(SseEvent { event, data: data_lines.join("\n") })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_named_event_with_data() {
		let mut buf = "event: response.created\ndata: {\"id\":\"1\"}\n\n".to_string();
		let record = take_record(&mut buf).unwrap();
		assert_eq!(record.event.as_deref(), Some("response.created"));
		assert_eq!(record.data, "{\"id\":\"1\"}");
		assert!(buf.is_empty());
	}

	#[test]
	fn parses_unnamed_data_only_event() {
		let mut buf = "data: {\"k\":1}\n\n".to_string();
		let record = take_record(&mut buf).unwrap();
		assert_eq!(record.event, None);
		assert_eq!(record.data, "{\"k\":1}");
	}

	#[test]
	fn returns_none_without_a_full_blank_line_terminator() {
		let mut buf = "event: foo\ndata: bar".to_string();
		assert!(take_record(&mut buf).is_none());
		assert_eq!(buf, "event: foo\ndata: bar");
	}

	#[test]
	fn multiple_data_lines_are_joined() {
		let mut buf = "data: line1\ndata: line2\n\n".to_string();
		let record = take_record(&mut buf).unwrap();
		assert_eq!(record.data, "line1\nline2");
	}
}
