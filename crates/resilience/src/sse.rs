/// Splits an SSE byte stream into event payloads.
///
/// Events end with a blank line. Only `data:` fields are kept; several `data:`
/// lines in one event are joined with `\n`. Comment-only events (keep-alives)
/// yield nothing.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    buffer: Vec<u8>,
}

impl SseFrameBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete event payload, if one is buffered.
    pub fn next_data(&mut self) -> Option<String> {
        loop {
            let end = find_event_end(&self.buffer)?;
            let event: Vec<u8> = self.buffer.drain(..end.consumed).collect();
            let text = String::from_utf8_lossy(&event[..end.content]);
            if let Some(data) = event_data(&text) {
                return Some(data);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

struct EventEnd {
    content: usize,
    consumed: usize,
}

fn find_event_end(buffer: &[u8]) -> Option<EventEnd> {
    let mut index = 0;
    while index < buffer.len() {
        if buffer[index] == b'\n' {
            match buffer.get(index + 1) {
                Some(b'\n') => {
                    return Some(EventEnd {
                        content: index,
                        consumed: index + 2,
                    });
                }
                Some(b'\r') if buffer.get(index + 2) == Some(&b'\n') => {
                    return Some(EventEnd {
                        content: index,
                        consumed: index + 3,
                    });
                }
                _ => {}
            }
        }
        index += 1;
    }
    None
}

fn event_data(event: &str) -> Option<String> {
    let mut lines = event
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .peekable();
    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}
