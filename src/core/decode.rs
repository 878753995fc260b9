//! Byte stream to text decoding
//!
//! Reads from a pipe land at arbitrary byte offsets. A UTF-8 sequence or a `\r\n` pair may
//! straddle two reads, so both are carried over to the next chunk. Line endings are
//! normalized to `\n` here and nowhere else.

/// Longest UTF-8 sequence
const MAX_PARTIAL: usize = 4;

/// Incremental UTF-8 decoder with `\r\n` normalization
#[derive(Debug, Default)]
pub struct StreamDecoder {
    partial: [u8; MAX_PARTIAL],
    partial_len: usize,
    /// A `\r` ended the previous chunk
    pending_cr: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk. Returns an empty string when everything was carried over.
    pub fn decode(&mut self, data: &[u8]) -> String {
        let mut combined = Vec::with_capacity(self.partial_len + data.len());
        combined.extend_from_slice(&self.partial[..self.partial_len]);
        combined.extend_from_slice(data);
        self.partial_len = 0;

        let valid_up_to = match std::str::from_utf8(&combined) {
            Ok(_) => combined.len(),
            Err(e) => e.valid_up_to(),
        };

        let trailing = &combined[valid_up_to..];
        let text = if trailing.is_empty() {
            String::from_utf8_lossy(&combined).into_owned()
        } else if is_incomplete_start(trailing) {
            self.partial[..trailing.len()].copy_from_slice(trailing);
            self.partial_len = trailing.len();
            String::from_utf8_lossy(&combined[..valid_up_to]).into_owned()
        } else {
            String::from_utf8_lossy(&combined).into_owned()
        };

        self.normalize(text)
    }

    /// Flush whatever is still carried at end of stream
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if self.pending_cr {
            self.pending_cr = false;
            out.push('\r');
        }
        if self.partial_len > 0 {
            out.push_str(&String::from_utf8_lossy(&self.partial[..self.partial_len]));
            self.partial_len = 0;
        }
        out
    }

    fn normalize(&mut self, text: String) -> String {
        let mut out = String::with_capacity(text.len() + 1);
        let mut chars = text.chars().peekable();

        if self.pending_cr {
            self.pending_cr = false;
            match chars.peek() {
                Some('\n') => {}
                Some(_) => out.push('\r'),
                // Nothing new arrived, keep holding it
                None => {
                    self.pending_cr = true;
                    return out;
                }
            }
        }

        while let Some(ch) = chars.next() {
            if ch == '\r' {
                match chars.peek() {
                    Some('\n') => {}
                    Some(_) => out.push('\r'),
                    None => self.pending_cr = true,
                }
            } else {
                out.push(ch);
            }
        }
        out
    }
}

/// Does `bytes` look like a truncated (not invalid) multi-byte sequence?
fn is_incomplete_start(bytes: &[u8]) -> bool {
    let Some(&lead) = bytes.first() else {
        return false;
    };
    let expected_len = match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return false,
    };
    bytes.len() < expected_len && bytes[1..].iter().all(|&b| (0x80..=0xBF).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(b"hello world"), "hello world");
        assert_eq!(dec.finish(), "");
    }

    #[test]
    fn test_crlf_normalized() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(b"a\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(b"line\r"), "line");
        assert_eq!(dec.decode(b"\nnext"), "\nnext");
    }

    #[test]
    fn test_lone_cr_survives() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(b"50%\r"), "50%");
        assert_eq!(dec.decode(b"60%"), "\r60%");

        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(b"a\rb"), "a\rb");
        assert_eq!(dec.decode(b"end\r"), "end");
        assert_eq!(dec.finish(), "\r");
    }

    #[test]
    fn test_split_utf8_sequence() {
        // "日" is E6 97 A5
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(&[b'x', 0xE6, 0x97]), "x");
        assert_eq!(dec.decode(&[0xA5, b'y']), "日y");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_sequence_flushed_at_eof() {
        let mut dec = StreamDecoder::new();
        assert_eq!(dec.decode(&[0xE6, 0x97]), "");
        assert_eq!(dec.finish(), "\u{FFFD}");
    }
}
