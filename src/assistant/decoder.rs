use tracing::debug;

use super::models::StreamFrame;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
pub enum StreamEvent {
    Frame(StreamFrame),
    Done,
    /// A `data: ` line whose payload did not parse. Recovered by skipping it.
    ParseSkip(String),
}

/// Turns arbitrarily split body chunks into stream events.
///
/// Bytes of a multi-byte character cut by a read boundary are held back until
/// the rest arrives, and text after the last newline is held back until the
/// line is complete.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending_bytes: Vec<u8>,
    line_buffer: String,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.decode_utf8(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes whatever is left once the body has ended.
    pub fn finish(mut self) -> Vec<StreamEvent> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.line_buffer.push_str(&tail);
            self.pending_bytes.clear();
        }
        parse_line(&self.line_buffer).into_iter().collect()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buffer
                        .push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        // Truncated sequence at the end: wait for the next chunk
                        None => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }
    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => Some(StreamEvent::Frame(frame)),
        Err(e) => {
            debug!("Skipping unparsable stream line: {}", e);
            Some(StreamEvent::ParseSkip(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Frame(f) => f.delta_text(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let mut decoder = StreamDecoder::new();
        let first = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"con");
        assert!(first.is_empty());
        let second = decoder.feed(b"tent\":\"Hi\"}}]}\n");
        assert_eq!(deltas(&second), "Hi");
    }

    #[test]
    fn carries_split_multibyte_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"₹ नमस्ते\"}}]}\n".as_bytes();
        // Split inside the three-byte rupee sign
        let cut = line.iter().position(|b| *b == 0xE2).unwrap() + 1;

        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(&line[..cut]);
        events.extend(decoder.feed(&line[cut..]));
        assert_eq!(deltas(&events), "₹ नमस्ते");
    }

    #[test]
    fn done_and_non_data_lines() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: message\n\ndata: [DONE]\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done));
    }

    #[test]
    fn malformed_payload_is_a_skip() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(b"data: {not json\n");
        assert!(matches!(events[0], StreamEvent::ParseSkip(_)));
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n");
        assert_eq!(deltas(&events), "ok");
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = StreamDecoder::new();
        let mut chunk = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        chunk.push(0xFF);
        chunk.extend_from_slice(b"b\"}}]}\n");
        let events = decoder.feed(&chunk);
        assert_eq!(deltas(&events), "a\u{FFFD}b");
    }

    #[test]
    fn finish_flushes_unterminated_last_line() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .is_empty());
        assert_eq!(deltas(&decoder.finish()), "tail");
    }
}
