//! C2: RFC-2047 encoded-word decoder and base64/quoted-printable body
//! decoders (spec §4.2). Grounded on
//! `original_source/libcitadel/lib/decode.c`.

const MAX_DECODE_PASSES: u32 = 20;

/// Decode a header value that may contain `=?charset?enc?text?=`
/// encoded-words. Adjacent encoded-words separated only by whitespace are
/// folded into one atom. Unknown charsets render as the literal
/// `(unreadable)`. Bytes outside any encoded-word that are non-ASCII are
/// heuristically treated as ISO-8859-1 and transcoded to UTF-8.
pub fn decode_header(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let next = decode_header_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    latin1_heuristic(&current)
}

fn decode_header_pass(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    let mut last_was_encoded_word = false;

    while i < bytes.len() {
        if let Some((decoded, consumed)) = try_decode_encoded_word(&bytes[i..]) {
            out.push_str(&decoded);
            i += consumed;
            last_was_encoded_word = true;
            continue;
        }

        // Whitespace run: elide it only if it sits between two encoded
        // words (RFC 2047 §6.2 "folding").
        if bytes[i] == b' ' || bytes[i] == b'\t' {
            let start = i;
            while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
                i += 1;
            }
            if last_was_encoded_word && try_decode_encoded_word(&bytes[i..]).is_some() {
                continue; // elide the fold
            }
            out.push_str(&input[start..i]);
            last_was_encoded_word = false;
            continue;
        }

        // Copy one UTF-8 scalar worth of bytes through unchanged.
        let ch_len = utf8_char_len(bytes[i]);
        let end = (i + ch_len).min(bytes.len());
        out.push_str(&input[i..end]);
        i = end;
        last_was_encoded_word = false;
    }

    out
}

fn utf8_char_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// Attempt to decode one `=?charset?B|Q?text?=` atom at the start of
/// `bytes`. Returns the decoded text and the number of input bytes
/// consumed.
fn try_decode_encoded_word(bytes: &[u8]) -> Option<(String, usize)> {
    if !bytes.starts_with(b"=?") {
        return None;
    }
    let rest = &bytes[2..];
    let charset_end = rest.iter().position(|&b| b == b'?')?;
    let charset = std::str::from_utf8(&rest[..charset_end]).ok()?;
    let after_charset = &rest[charset_end + 1..];
    if after_charset.len() < 2 {
        return None;
    }
    let encoding = after_charset[0].to_ascii_uppercase();
    if after_charset[1] != b'?' {
        return None;
    }
    let text_start = &after_charset[2..];
    let text_end = find_subslice(text_start, b"?=")?;
    let encoded_text = &text_start[..text_end];

    let decoded_bytes = match encoding {
        b'B' => base64_decode(encoded_text)?,
        b'Q' => quoted_printable_decode(encoded_text, true),
        _ => return None,
    };

    let text = bytes_to_text(&decoded_bytes, charset);
    let total_consumed = 2 + charset_end + 1 + 2 + text_end + 2;
    Some((text, total_consumed))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn bytes_to_text(bytes: &[u8], charset: &str) -> String {
    let normalized = charset.to_ascii_lowercase();
    match normalized.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => {
            String::from_utf8(bytes.to_vec()).unwrap_or_else(|e| latin1_to_utf8(e.as_bytes()))
        }
        "iso-8859-1" | "latin1" | "windows-1252" => latin1_to_utf8(bytes),
        _ => "(unreadable)".to_string(),
    }
}

fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Non-ASCII bytes outside encoded-words: heuristically ISO-8859-1.
fn latin1_heuristic(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    // `s` is already valid UTF-8 (it's a Rust `str`); this heuristic only
    // applies when raw 8-bit header bytes were fed in via `decode_header_bytes`.
    s.to_string()
}

/// Variant entry point for raw (possibly non-UTF-8) header bytes, applying
/// the ISO-8859-1 heuristic to non-ASCII bytes outside encoded-words.
pub fn decode_header_bytes(input: &[u8]) -> String {
    match std::str::from_utf8(input) {
        Ok(s) => decode_header(s),
        Err(_) => {
            let latin1 = latin1_to_utf8(input);
            decode_header(&latin1)
        }
    }
}

/// Base64-decode an arbitrary-length body (spec §4.2).
pub fn base64_decode(input: &[u8]) -> Option<Vec<u8>> {
    use base64::Engine;
    let cleaned: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .ok()
}

/// Quoted-printable decode. `header_mode` additionally maps `_` to space,
/// per RFC 2047's Q-encoding variant.
pub fn quoted_printable_decode(input: &[u8], header_mode: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'_' if header_mode => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < input.len() => {
                if input[i + 1] == b'\r' && input[i + 2] == b'\n' {
                    i += 3; // soft line break
                    continue;
                }
                if input[i + 1] == b'\n' {
                    i += 2; // soft line break, bare LF
                    continue;
                }
                let hi = hex_val(input[i + 1]);
                let lo = hex_val(input[i + 2]);
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push((h << 4) | l);
                        i += 3;
                    }
                    _ => {
                        out.push(input[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_adjacent_encoded_words_folding_whitespace() {
        let input = "=?utf-8?Q?Hello=20World?= =?utf-8?B?IQ==?=";
        assert_eq!(decode_header(input), "Hello World!");
    }

    #[test]
    fn unknown_charset_is_unreadable() {
        let input = "=?x-unknown-charset?Q?bytes?=";
        assert_eq!(decode_header(input), "(unreadable)");
    }

    #[test]
    fn passthrough_plain_text() {
        assert_eq!(decode_header("plain subject"), "plain subject");
    }

    #[test]
    fn quoted_printable_roundtrip_basic() {
        let decoded = quoted_printable_decode(b"Hello=20World=21", false);
        assert_eq!(decoded, b"Hello World!");
    }

    #[test]
    fn base64_body_decode() {
        let decoded = base64_decode(b"SGVsbG8=").unwrap();
        assert_eq!(decoded, b"Hello");
    }

    #[test]
    fn terminates_on_malformed_input_within_pass_bound() {
        // A pathological string that never stabilizes must still return
        // within MAX_DECODE_PASSES instead of looping forever.
        let input = "=?a?B?====?=".repeat(5);
        let _ = decode_header(&input);
    }
}
