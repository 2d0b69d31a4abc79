//! The append-only raw byte log: system of record for everything a
//! `PtySession` has ever emitted (spec.md §9: "the raw log is the system
//! of record; the emulator is a derived view").
//!
//! Two independent cursors read it — the driver byte-stream cursor and
//! the incremental line cursor (spec.md §3, invariant: both monotonically
//! non-decreasing, each consumer advances only its own).

/// An append-only byte log plus the two cursors the engine reads it
/// through. Not itself capped — `PtySession` is responsible for whatever
/// memory bound its caller wants; spec.md does not bound the raw log the
/// way it bounds emulator scrollback.
#[derive(Default)]
pub struct RawLog {
    bytes: Vec<u8>,
    /// Cursor for `get_raw_stream({ since_last: true })`.
    stream_cursor: usize,
    /// Cursor for paginated/incremental line reads.
    line_cursor: usize,
}

impl RawLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn all(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes since the last time `since_last` advanced the stream cursor,
    /// without moving it (peek).
    pub fn unread_stream(&self) -> &[u8] {
        &self.bytes[self.stream_cursor.min(self.bytes.len())..]
    }

    /// Read from the stream cursor. If `since_last`, advances the cursor
    /// to the current end so the next call returns only newer bytes
    /// (spec.md §4.1, §8 invariant 7: disjoint, contiguous ranges).
    pub fn read_stream(&mut self, since_last: bool) -> Vec<u8> {
        if since_last {
            let start = self.stream_cursor.min(self.bytes.len());
            let out = self.bytes[start..].to_vec();
            self.stream_cursor = self.bytes.len();
            out
        } else {
            self.bytes.clone()
        }
    }

    /// Strip-ANSI projection of the unread stream bytes, advancing the
    /// stream cursor exactly like `read_stream(true)`. Non-UTF-8 bytes are
    /// lossily decoded (spec.md §9 open question c) while the underlying
    /// raw log keeps the original bytes verbatim.
    pub fn drain_stream_stripped(&mut self) -> String {
        let (text, _more) = self.drain_stream_stripped_capped(usize::MAX);
        text
    }

    /// Like `drain_stream_stripped`, but returns at most `max_chars` and
    /// only advances the stream cursor past the bytes whose decode
    /// produced the returned text, so a capped drain never loses bytes.
    /// Second element is `true` if more text remains beyond the cap.
    pub fn drain_stream_stripped_capped(&mut self, max_chars: usize) -> (String, bool) {
        let start = self.stream_cursor.min(self.bytes.len());
        let chunk = &self.bytes[start..];
        let stripped = strip_ansi_escapes::strip(chunk);
        let text = String::from_utf8_lossy(&stripped).into_owned();
        if text.chars().count() <= max_chars {
            self.stream_cursor = self.bytes.len();
            (text, false)
        } else {
            let capped: String = text.chars().take(max_chars).collect();
            // Advance the cursor only as far as the bytes that produced
            // `capped` cover, conservatively re-deriving by re-encoding
            // and re-scanning the original chunk for that many stripped
            // chars. Stripping is not guaranteed byte-reversible, so we
            // advance past the prefix of `chunk` whose strip-ansi output
            // has length >= capped.len(), which is always within bounds.
            let mut advanced = chunk.len();
            for cut in 0..=chunk.len() {
                let candidate = strip_ansi_escapes::strip(&chunk[..cut]);
                if String::from_utf8_lossy(&candidate).chars().count() >= capped.chars().count() {
                    advanced = cut;
                    break;
                }
            }
            self.stream_cursor = start + advanced;
            (capped, true)
        }
    }

    /// Lines since the incremental line cursor, splitting the *entire*
    /// strip-ANSI log on `\n` and returning only lines at-or-past the
    /// cursor; advances the cursor to the new line count.
    pub fn read_incremental_lines(&mut self) -> Vec<String> {
        let (lines, _more) = self.read_incremental_lines_capped(usize::MAX);
        lines
    }

    /// Like `read_incremental_lines`, but returns at most `max_lines` and
    /// advances the cursor only past what was actually returned, so a
    /// capped read never drops unread lines. Second element is `true` if
    /// more lines remain beyond the cap.
    pub fn read_incremental_lines_capped(&mut self, max_lines: usize) -> (Vec<String>, bool) {
        let stripped = strip_ansi_escapes::strip(&self.bytes);
        let text = String::from_utf8_lossy(&stripped);
        // `split('\n')` always produces a trailing "" once the buffer ends
        // in a newline; treat that as a presentation artifact rather than
        // a real line so the cursor advances only past actual content —
        // otherwise it gets "consumed" prematurely and later appends lose
        // their first line (the trailing "" shifts index each re-split).
        let ends_with_newline = text.ends_with('\n');
        let real_lines: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else if ends_with_newline {
            text[..text.len() - 1].split('\n').collect()
        } else {
            text.split('\n').collect()
        };
        let start = self.line_cursor.min(real_lines.len());
        let available = &real_lines[start..];
        let take = max_lines.min(available.len());
        let mut out: Vec<String> = available[..take].iter().map(|s| s.to_string()).collect();
        let has_more = take < available.len();
        if !has_more && ends_with_newline {
            out.push(String::new());
        }
        self.line_cursor = start + take;
        (out, has_more)
    }

    pub fn stream_cursor(&self) -> usize {
        self.stream_cursor
    }

    pub fn line_cursor(&self) -> usize {
        self.line_cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_last_returns_disjoint_contiguous_ranges() {
        let mut log = RawLog::new();
        log.append(b"hello");
        let first = log.read_stream(true);
        log.append(b"world");
        let second = log.read_stream(true);
        assert_eq!(first, b"hello");
        assert_eq!(second, b"world");
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        let mut log = RawLog::new();
        log.append(b"\x1b[31mred\x1b[0m\n");
        let out = log.drain_stream_stripped();
        assert_eq!(out, "red\n");
    }

    #[test]
    fn incremental_lines_advance_independently_of_stream_cursor() {
        let mut log = RawLog::new();
        log.append(b"a\nb\n");
        let lines1 = log.read_incremental_lines();
        assert_eq!(lines1, vec!["a", "b", ""]);
        log.append(b"c\n");
        let lines2 = log.read_incremental_lines();
        assert_eq!(lines2, vec!["c", ""]);
        // Stream cursor untouched by incremental-line reads.
        assert_eq!(log.unread_stream(), b"a\nb\nc\n");
    }

    #[test]
    fn capped_incremental_read_does_not_lose_lines() {
        let mut log = RawLog::new();
        log.append(b"a\nb\nc\nd\n");
        let (first, more) = log.read_incremental_lines_capped(2);
        assert_eq!(first, vec!["a", "b"]);
        assert!(more);
        let (second, more) = log.read_incremental_lines_capped(usize::MAX);
        assert_eq!(second, vec!["c", "d", ""]);
        assert!(!more);
    }

    #[test]
    fn capped_drain_advances_cursor_only_past_returned_text() {
        let mut log = RawLog::new();
        log.append(b"hello world");
        let (first, more) = log.drain_stream_stripped_capped(5);
        assert_eq!(first, "hello");
        assert!(more);
        let (second, more) = log.drain_stream_stripped_capped(usize::MAX);
        assert_eq!(second, " world");
        assert!(!more);
    }
}
