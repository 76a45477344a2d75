use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Frontend;

/// Outbound record.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Output { text: String },
    Prompt { text: String },
    /// Text the target printed, passed through as written.
    Target { text: String },
}

/// Inbound record.
#[derive(Debug, Deserialize)]
struct Request {
    command: String,
}

/// Non-interactive front end speaking one JSON object per line.
///
/// Output lines become `{"type":"output","text":..}`, prompts
/// `{"type":"prompt","text":..}` and the target's own output
/// `{"type":"target","text":..}`. Commands arrive as `{"command":..}`.
pub struct JsonLines<R, W> {
    reader: R,
    writer: W,
    /// Text written without a newline yet.
    partial: String,
}

impl<R: BufRead, W: Write> JsonLines<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            partial: String::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn send(&mut self, msg: &Message) {
        let sent = serde_json::to_string(msg)
            .map_err(std::io::Error::from)
            .and_then(|json| {
                writeln!(self.writer, "{json}")?;
                self.writer.flush()
            });
        if let Err(e) = sent {
            warn!("cannot send message: {e}");
        }
    }

    fn flush_partial(&mut self) {
        if !self.partial.is_empty() {
            let text = std::mem::take(&mut self.partial);
            self.send(&Message::Output { text });
        }
    }
}

impl<R: BufRead, W: Write> Frontend for JsonLines<R, W> {
    fn write(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(end) = self.partial.find('\n') {
            let text: String = self.partial.drain(..=end).take(end).collect();
            self.send(&Message::Output { text });
        }
    }

    fn print(&mut self, line: &str) {
        self.flush_partial();
        self.send(&Message::Output {
            text: line.to_string(),
        });
    }

    fn target(&mut self, text: &str) {
        self.flush_partial();
        self.send(&Message::Target {
            text: text.to_string(),
        });
    }

    fn prompt(&mut self, prompt: &str) -> Option<String> {
        self.flush_partial();
        self.send(&Message::Prompt {
            text: prompt.to_string(),
        });

        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("cannot read request: {e}");
                    return None;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => return Some(request.command),
                Err(e) => self.send(&Message::Output {
                    text: format!("malformed request: {e}"),
                }),
            }
        }
    }
}
