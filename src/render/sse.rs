//! Server-sent events framing.
//!
//! <https://html.spec.whatwg.org/multipage/server-sent-events.html>

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};

/// One server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    pub event: String,
    pub data: String,
    pub id: String,
    pub retry: u32,
}

impl Event {
    /// An unnamed event carrying `data`.
    pub fn data(data: impl Into<String>) -> Self {
        Self { data: data.into(), ..Self::default() }
    }

    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.event = name.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn retry(mut self, millis: u32) -> Self {
        self.retry = millis;
        self
    }

    /// Wire form: optional `event:`, `id:` and `retry:` lines, then
    /// `data: <data>` and a blank line.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 32);
        // Writing into BytesMut cannot fail.
        let _ = self.write(&mut buf);
        buf.freeze()
    }

    fn write(&self, buf: &mut BytesMut) -> std::fmt::Result {
        if !self.event.is_empty() {
            writeln!(buf, "event: {}", self.event)?;
        }
        if !self.id.is_empty() {
            writeln!(buf, "id: {}", self.id)?;
        }
        if self.retry > 0 {
            writeln!(buf, "retry: {}", self.retry)?;
        }
        write!(buf, "data: {}\n\n", self.data)
    }
}

/// Parses a complete event stream.
///
/// Comment lines (`:`) and unknown fields are skipped, field values are
/// trimmed, consecutive `data:` lines are joined with `\n`, and events
/// without a name are called `message`. A trailing event with no blank line
/// after it is dropped.
pub fn decode(raw: &[u8]) -> Vec<Event> {
    let raw = String::from_utf8_lossy(raw);
    let mut events = Vec::new();
    let mut event = Event::default();
    let mut data = String::new();

    for line in raw.split('\n') {
        if line.is_empty() {
            let trimmed = data.trim();
            if trimmed.is_empty() && event.event.is_empty() {
                continue;
            }
            event.data = trimmed.to_owned();
            if event.event.is_empty() {
                event.event = "message".to_owned();
            }
            events.push(std::mem::take(&mut event));
            data.clear();
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field.trim(), value.trim()),
            None => (line, ""),
        };
        match field {
            "event" => event.event = value.to_owned(),
            "id" => event.id = value.to_owned(),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    event.retry = retry;
                }
            }
            "data" => {
                data.push_str(value);
                data.push('\n');
            }
            _ => {}
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_only_present_fields() {
        assert_eq!(Event::data("hi").encode(), "data: hi\n\n");
        let full = Event::data("{\"n\":1}").event("tick").id("7").retry(1500);
        assert_eq!(full.encode(), "event: tick\nid: 7\nretry: 1500\ndata: {\"n\":1}\n\n");
    }

    #[test]
    fn decodes_a_stream() {
        let raw = b": keep-alive\n\nevent: tick\nid: 1\ndata: a\ndata: b\n\ndata: plain\nretry: x\n\n";
        let events = decode(raw);
        assert_eq!(
            events,
            [
                Event { event: "tick".into(), data: "a\nb".into(), id: "1".into(), retry: 0 },
                Event { event: "message".into(), data: "plain".into(), ..Event::default() },
            ]
        );
    }

    #[test]
    fn named_event_without_data_is_kept() {
        let events = decode(b"event: EOF\n\n");
        assert_eq!(events, [Event::default().event("EOF")]);
    }

    #[test]
    fn decode_reads_what_encode_writes() {
        let event = Event::data("payload").event("update").id("42").retry(10);
        assert_eq!(decode(&event.encode()), [event]);
    }
}
