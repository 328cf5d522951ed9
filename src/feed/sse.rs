//! Incremental Server-Sent Events decoder.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers them, splits on
//! line boundaries and assembles `id:`/`event:`/`data:` fields into frames,
//! emitting one frame per blank line.

use bytes::BytesMut;

/// One dispatched SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    pending: SseFrame,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            ..Default::default()
        }
    }

    /// Feed a chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            // Skip invalid UTF-8 lines
            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                continue;
            };

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            self.apply_field(line);
        }

        frames
    }

    fn apply_field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_string()),
            "id" if !value.is_empty() => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if !self.has_data {
            self.pending = SseFrame::default();
            return None;
        }
        self.has_data = false;
        Some(std::mem::take(&mut self.pending))
    }
}
