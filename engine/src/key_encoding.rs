//! Key encoding: translating driver-supplied input into PTY stdin bytes.
//!
//! A pure function from a small AST to bytes (spec.md §9: "keep it a
//! separate module so it is trivially testable"). No I/O, no session
//! state — every public function here is deterministic given its input.

/// One structured input request from the driver (spec.md §4.4/§4.5).
#[derive(Debug, Clone, Default)]
pub struct InputRequest {
    pub text: Option<String>,
    pub keys: Vec<String>,
    pub hex: Vec<String>,
    pub paste: Option<String>,
}

const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

/// Translate a raw driver string unchanged — the round-trip law from
/// spec.md §8 ("translating a raw string `s` produces `s` unchanged").
pub fn encode_raw(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Translate a structured request. Concatenates, in order: decoded hex
/// bytes, `text`, each `key` token, then `paste` wrapped in bracketed-paste
/// markers (spec.md §4.5).
pub fn encode_request(req: &InputRequest) -> Vec<u8> {
    let mut out = Vec::new();
    for hex in &req.hex {
        out.extend(decode_hex(hex));
    }
    if let Some(text) = &req.text {
        out.extend_from_slice(text.as_bytes());
    }
    for key in &req.keys {
        out.extend(encode_key(key));
    }
    if let Some(paste) = &req.paste {
        out.extend_from_slice(BRACKETED_PASTE_START);
        out.extend_from_slice(paste.as_bytes());
        out.extend_from_slice(BRACKETED_PASTE_END);
    }
    out
}

/// Decode a hex string into bytes. Malformed hex decodes to nothing for
/// that token (pure function, no error type — the only caller-visible
/// effect of bad hex is fewer bytes on the wire).
fn decode_hex(hex: &str) -> Vec<u8> {
    let hex = hex.trim();
    let mut out = Vec::with_capacity(hex.len() / 2);
    let bytes = hex.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() + 1 && i + 2 <= bytes.len() {
        if let Ok(b) = u8::from_str_radix(&hex[i..i + 2], 16) {
            out.push(b);
        } else {
            return Vec::new();
        }
        i += 2;
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Modifiers {
    ctrl: bool,
    alt: bool,
    shift: bool,
}

impl Modifiers {
    /// xterm modifier encoding: `mod = 1 + shift + 2*alt + 4*ctrl`.
    fn xterm_code(&self) -> u32 {
        1 + self.shift as u32 + 2 * self.alt as u32 + 4 * self.ctrl as u32
    }

    fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift
    }
}

/// A small recognizer result for a single base token, used by the
/// classifier below (scroll keys / double-escape / other are spec.md
/// §4.2's takeover-detection inputs, kept next to the encoder since they
/// share the same token grammar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollClass {
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    Other,
}

/// Classify a key token for takeover detection (spec.md §4.2: scroll keys
/// do not take over a hands-free session).
pub fn classify_scroll(token: &str) -> ScrollClass {
    let (_, base) = strip_modifiers(token);
    match base.as_str() {
        "up" => ScrollClass::ScrollUp,
        "down" => ScrollClass::ScrollDown,
        "pageup" | "pgup" | "ppage" => ScrollClass::PageUp,
        "pagedown" | "pgdn" | "npage" => ScrollClass::PageDown,
        _ => ScrollClass::Other,
    }
}

/// Encode one key token per the grammar in spec.md §4.5. Unknown tokens
/// are forwarded literally (their raw UTF-8 bytes), per spec.
pub fn encode_key(token: &str) -> Vec<u8> {
    let (modifiers, base) = strip_modifiers(token);

    if base == "btab" || (base == "tab" && modifiers.shift && !modifiers.ctrl && !modifiers.alt) {
        return b"\x1b[Z".to_vec();
    }

    if let Some((letter_or_tilde, default_code)) = xterm_movement_key(&base) {
        return encode_xterm_movement(letter_or_tilde, default_code, &modifiers);
    }

    if let Some(bytes) = simple_named_key(&base) {
        return apply_alt_prefix(bytes, modifiers.alt);
    }

    if let Some(bytes) = function_key(&base) {
        return apply_alt_prefix(bytes, modifiers.alt);
    }

    if let Some(bytes) = keypad_key(&base) {
        return apply_alt_prefix(bytes, modifiers.alt);
    }

    if modifiers.ctrl {
        if let Some(bytes) = ctrl_special(&base) {
            return bytes;
        }
    }

    if base.chars().count() == 1 {
        let ch = base.chars().next().unwrap();
        return encode_single_char(ch, &modifiers);
    }

    // Unknown token: forward literally.
    token.as_bytes().to_vec()
}

fn strip_modifiers(token: &str) -> (Modifiers, String) {
    let mut rest = token;
    let mut m = Modifiers::default();
    loop {
        let lower = rest.to_ascii_lowercase();
        if let Some(stripped) = lower
            .strip_prefix("ctrl+")
            .or_else(|| lower.strip_prefix("ctrl-"))
            .or_else(|| lower.strip_prefix("c-"))
        {
            m.ctrl = true;
            rest = &rest[rest.len() - stripped.len()..];
            continue;
        }
        if let Some(stripped) = lower
            .strip_prefix("alt+")
            .or_else(|| lower.strip_prefix("alt-"))
            .or_else(|| lower.strip_prefix("m-"))
        {
            m.alt = true;
            rest = &rest[rest.len() - stripped.len()..];
            continue;
        }
        if let Some(stripped) = lower
            .strip_prefix("shift+")
            .or_else(|| lower.strip_prefix("shift-"))
            .or_else(|| lower.strip_prefix("s-"))
        {
            m.shift = true;
            rest = &rest[rest.len() - stripped.len()..];
            continue;
        }
        break;
    }
    (m, rest.to_ascii_lowercase())
}

/// Returns `(letter, default_param)` for tokens in the
/// `{up,down,left,right,home,end,page*,insert,delete}` xterm-modifier set.
/// `letter` is either a CSI final letter (`A`,`B`,...) or `'~'` meaning the
/// tilde-terminated form `ESC[<n>;<mod>~`.
fn xterm_movement_key(base: &str) -> Option<(char, u16)> {
    Some(match base {
        "up" => ('A', 1),
        "down" => ('B', 1),
        "right" => ('C', 1),
        "left" => ('D', 1),
        "home" => ('H', 1),
        "end" => ('F', 1),
        "insert" | "ic" => ('~', 2),
        "delete" | "del" | "dc" => ('~', 3),
        "pageup" | "pgup" | "ppage" => ('~', 5),
        "pagedown" | "pgdn" | "npage" => ('~', 6),
        _ => return None,
    })
}

fn encode_xterm_movement(letter: char, n: u16, m: &Modifiers) -> Vec<u8> {
    if m.is_empty() {
        return if letter == '~' {
            format!("\x1b[{n}~").into_bytes()
        } else {
            format!("\x1b[{letter}").into_bytes()
        };
    }
    let mod_code = m.xterm_code();
    if letter == '~' {
        format!("\x1b[{n};{mod_code}~").into_bytes()
    } else {
        format!("\x1b[1;{mod_code}{letter}").into_bytes()
    }
}

fn simple_named_key(base: &str) -> Option<Vec<u8>> {
    Some(match base {
        "enter" | "return" => b"\r".to_vec(),
        "escape" | "esc" => b"\x1b".to_vec(),
        "tab" => b"\t".to_vec(),
        "space" => b" ".to_vec(),
        "backspace" | "bspace" => vec![0x7f],
        _ => return None,
    })
}

fn function_key(base: &str) -> Option<Vec<u8>> {
    if let Some(num) = base.strip_prefix('f') {
        if let Ok(n) = num.parse::<u8>() {
            if (1..=12).contains(&n) {
                // xterm F1-F4 use SS3, F5+ use CSI ~ codes.
                return Some(match n {
                    1 => b"\x1bOP".to_vec(),
                    2 => b"\x1bOQ".to_vec(),
                    3 => b"\x1bOR".to_vec(),
                    4 => b"\x1bOS".to_vec(),
                    5 => b"\x1b[15~".to_vec(),
                    6 => b"\x1b[17~".to_vec(),
                    7 => b"\x1b[18~".to_vec(),
                    8 => b"\x1b[19~".to_vec(),
                    9 => b"\x1b[20~".to_vec(),
                    10 => b"\x1b[21~".to_vec(),
                    11 => b"\x1b[23~".to_vec(),
                    12 => b"\x1b[24~".to_vec(),
                    _ => unreachable!(),
                });
            }
        }
    }
    None
}

fn keypad_key(base: &str) -> Option<Vec<u8>> {
    Some(match base {
        "kp0" => b"\x1bOp".to_vec(),
        "kp1" => b"\x1bOq".to_vec(),
        "kp2" => b"\x1bOr".to_vec(),
        "kp3" => b"\x1bOs".to_vec(),
        "kp4" => b"\x1bOt".to_vec(),
        "kp5" => b"\x1bOu".to_vec(),
        "kp6" => b"\x1bOv".to_vec(),
        "kp7" => b"\x1bOw".to_vec(),
        "kp8" => b"\x1bOx".to_vec(),
        "kp9" => b"\x1bOy".to_vec(),
        "kp/" => b"\x1bOo".to_vec(),
        "kp*" => b"\x1bOj".to_vec(),
        "kp-" => b"\x1bOm".to_vec(),
        "kp+" => b"\x1bOk".to_vec(),
        "kp." => b"\x1bOn".to_vec(),
        "kpenter" => b"\x1bOM".to_vec(),
        _ => return None,
    })
}

/// Special `ctrl+<punct>` tokens from spec.md §4.5, matched against the
/// base token *after* modifier prefixes have already been stripped.
fn ctrl_special(base: &str) -> Option<Vec<u8>> {
    match base {
        "[" => Some(vec![0x1b]),
        "\\" => Some(vec![0x1c]),
        "]" => Some(vec![0x1d]),
        "^" => Some(vec![0x1e]),
        "_" => Some(vec![0x1f]),
        "?" => Some(vec![0x7f]),
        _ => None,
    }
}

fn apply_alt_prefix(mut bytes: Vec<u8>, alt: bool) -> Vec<u8> {
    if alt {
        let mut out = vec![0x1b];
        out.append(&mut bytes);
        out
    } else {
        bytes
    }
}

fn encode_single_char(ch: char, m: &Modifiers) -> Vec<u8> {
    if m.ctrl && ch.is_ascii_alphabetic() {
        let upper = ch.to_ascii_uppercase() as u8;
        let mut out = Vec::new();
        if m.alt {
            out.push(0x1b);
        }
        out.push(upper & 0x1f);
        return out;
    }
    let mut c = ch;
    if m.shift {
        c = c.to_ascii_uppercase();
    }
    let mut out = Vec::new();
    if m.alt {
        out.push(0x1b);
    }
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_string_round_trips() {
        assert_eq!(encode_raw("hello\n"), b"hello\n");
    }

    #[test]
    fn text_only_request_round_trips() {
        let req = InputRequest { text: Some("echo hi".to_string()), ..Default::default() };
        assert_eq!(encode_request(&req), b"echo hi");
    }

    #[test]
    fn hex_then_text_then_keys_then_paste_order() {
        let req = InputRequest {
            hex: vec!["41".to_string()],
            text: Some("B".to_string()),
            keys: vec!["enter".to_string()],
            paste: Some("C".to_string()),
        };
        let out = encode_request(&req);
        let mut expected = b"AB\r".to_vec();
        expected.extend_from_slice(BRACKETED_PASTE_START);
        expected.extend_from_slice(b"C");
        expected.extend_from_slice(BRACKETED_PASTE_END);
        assert_eq!(out, expected);
    }

    #[test]
    fn arrow_keys_plain() {
        assert_eq!(encode_key("up"), b"\x1b[A");
        assert_eq!(encode_key("down"), b"\x1b[B");
    }

    #[test]
    fn arrow_key_with_ctrl_uses_xterm_modifier() {
        assert_eq!(encode_key("ctrl+up"), b"\x1b[1;5A");
    }

    #[test]
    fn delete_with_shift_alt_uses_tilde_form() {
        // mod = 1 + shift(1) + 2*alt(1) = 4
        assert_eq!(encode_key("shift+alt+delete"), b"\x1b[3;4~");
    }

    #[test]
    fn shift_tab_is_btab() {
        assert_eq!(encode_key("shift+tab"), b"\x1b[Z");
        assert_eq!(encode_key("btab"), b"\x1b[Z");
    }

    #[test]
    fn ctrl_letter_mapping() {
        assert_eq!(encode_key("ctrl+a"), vec![0x01]);
        assert_eq!(encode_key("ctrl+z"), vec![0x1a]);
    }

    #[test]
    fn ctrl_special_tokens() {
        assert_eq!(encode_key("ctrl+["), vec![0x1b]);
        assert_eq!(encode_key("ctrl+?"), vec![0x7f]);
    }

    #[test]
    fn single_char_with_shift_uppercases() {
        assert_eq!(encode_key("shift+a"), b"A");
    }

    #[test]
    fn single_char_with_alt_prefixes_esc() {
        assert_eq!(encode_key("alt+a"), b"\x1ba");
    }

    #[test]
    fn unknown_token_forwarded_literally() {
        assert_eq!(encode_key("not-a-real-key"), b"not-a-real-key");
    }

    #[test]
    fn scroll_classification() {
        assert_eq!(classify_scroll("up"), ScrollClass::ScrollUp);
        assert_eq!(classify_scroll("pgdn"), ScrollClass::PageDown);
        assert_eq!(classify_scroll("a"), ScrollClass::Other);
    }

    #[test]
    fn function_keys() {
        assert_eq!(encode_key("f1"), b"\x1bOP");
        assert_eq!(encode_key("f5"), b"\x1b[15~");
    }
}
