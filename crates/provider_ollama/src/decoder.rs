/// Where the decoder is relative to the bytes it has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecoderState {
    /// Buffer holds no complete line.
    #[default]
    AwaitingLine,
    /// At least one newline-terminated line is buffered.
    HaveLine,
    /// End of input reached and the trailing partial line handed out.
    Flushed,
}

/// Splits newline-delimited JSON into lines regardless of how the transport
/// chunked it. Lines are returned trimmed; blank lines are dropped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    scanned: usize,
    state: DecoderState,
}

impl NdjsonDecoder {
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Input after [`NdjsonDecoder::finish`] is ignored.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.state == DecoderState::Flushed {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.refresh_state();
    }

    pub fn next_line(&mut self) -> Option<String> {
        while self.state == DecoderState::HaveLine {
            let newline = self.newline_position()?;
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.scanned = 0;
            self.refresh_state();
            if let Some(line) = clean(&raw) {
                return Some(line);
            }
        }
        None
    }

    /// Hands out whatever is left once input has ended, terminated or not.
    /// Call after draining [`NdjsonDecoder::next_line`].
    pub fn finish(&mut self) -> Option<String> {
        if self.state == DecoderState::Flushed {
            return None;
        }
        if let Some(line) = self.next_line() {
            return Some(line);
        }
        self.state = DecoderState::Flushed;
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        clean(&rest)
    }

    fn newline_position(&mut self) -> Option<usize> {
        let found = self.buffer[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
            .map(|offset| self.scanned + offset);
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    fn refresh_state(&mut self) {
        self.state = if self.newline_position().is_some() {
            DecoderState::HaveLine
        } else {
            DecoderState::AwaitingLine
        };
    }
}

fn clean(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_string())
}
