//! Line reassembly and `data:` event decoding for streamed completions.
//!
//! Network reads split lines arbitrarily, so bytes are buffered until a `\n`
//! arrives. Each complete line is then classified on its own.

use crate::proxy::types::ChatCompletionChunk;

use super::TransportError;

/// Longest line accepted before the stream is treated as broken.
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Buffers raw bytes across reads and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl LineBuffer {
    /// Append `bytes` and drain every complete line, without its terminator.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, TransportError> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let mut line = &self.buffer[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            self.scanned = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            return Err(TransportError::Protocol(format!(
                "stream line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }

        Ok(lines)
    }

    /// Whatever is left once the body has closed, if anything.
    pub fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buffer);
        let text = text.trim_end_matches('\r');
        (!text.trim().is_empty()).then(|| text.to_string())
    }
}

/// What a single line means for the chunk sequence.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Chunk(ChatCompletionChunk),
    Done,
    Skip,
}

/// Classify one complete line.
pub(crate) fn decode_line(line: &str) -> Result<SseLine, TransportError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank lines, comments and other fields (event:, id:, retry:)
        return Ok(SseLine::Skip);
    };

    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    Ok(SseLine::Chunk(serde_json::from_str(data)?))
}
