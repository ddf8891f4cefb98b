use bytes::Bytes;

/// Event name carried by `data:` lines.
pub const EVENT_DATA: &str = "data";
/// Event name used for malformed lines, read failures and server errors.
pub const EVENT_ERROR: &str = "error";

pub const INVALID_SERVER_EVENT: &str = "invalid server event";
pub const UNKNOWN_FIELD: &str = "unknown field in server event";

/// One logical event produced per physical line of the event stream.
///
/// `event: <name>` lines produce a named event with an empty payload; they are
/// not merged with the `data:` line that follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEvent {
    pub event: String,
    pub data: Bytes,
}

impl DataEvent {
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            event: EVENT_DATA.to_string(),
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: Bytes::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event: EVENT_ERROR.to_string(),
            data: Bytes::from(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.event == EVENT_ERROR
    }

    /// Payload as text, lossy on invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Classify one line (terminator already stripped) into a [`DataEvent`].
///
/// The line is split at the first `": "`; everything after it is the value,
/// byte for byte.
pub fn classify_line(line: Bytes) -> DataEvent {
    let Some(split) = line.windows(2).position(|w| w == b": ") else {
        return DataEvent::error(INVALID_SERVER_EVENT);
    };

    match &line[..split] {
        b"data" => DataEvent::data(line.slice(split + 2..)),
        b"event" => DataEvent::named(String::from_utf8_lossy(&line[split + 2..]).into_owned()),
        _ => DataEvent::error(UNKNOWN_FIELD),
    }
}
