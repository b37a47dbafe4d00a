//! Soundex-style phonetic code tuned for Nordic names.
//!
//! The head is the first letter of the normalized input, followed by up to
//! three consonant-class digits:
//!
//! | Class | Letters                    |
//! |-------|----------------------------|
//! | `1`   | b f p v                    |
//! | `2`   | c g j k q s x z            |
//! | `3`   | d t                        |
//! | `4`   | l                          |
//! | `5`   | m n                        |
//! | `6`   | r                          |
//!
//! Vowels (including `æ` and `ø`) and `h`, `y`, `w` are skipped and break a
//! run, so a repeated class after a vowel is written again.  Adjacent letters
//! of the same class collapse into one digit.  Codes are right-padded with `0`
//! to exactly four characters; empty input yields an empty code.
use crate::normalize::normalize;

pub const CODE_LEN: usize = 4;

pub fn phonex(text: &str) -> String {
    let normalized = normalize(text);
    encode_normalized(&normalized)
}

/// Same as [`phonex`] for input that is already normalized.
pub fn encode_normalized(normalized: &str) -> String {
    let mut chars = normalized.chars().skip_while(|ch| !ch.is_alphabetic());
    let head = match chars.next() {
        Some(ch) => ch,
        None => match normalized.chars().next() {
            Some(ch) => ch,
            None => return String::new(),
        },
    };

    let mut code = String::with_capacity(CODE_LEN);
    code.push(head);
    let mut len = 1;
    let mut last: Option<char> = None;

    for ch in chars {
        if len == CODE_LEN {
            break;
        }
        if is_separator(ch) {
            last = None;
            continue;
        }
        let Some(digit) = class_of(ch) else {
            continue;
        };
        if last != Some(digit) {
            code.push(digit);
            len += 1;
        }
        last = Some(digit);
    }

    while len < CODE_LEN {
        code.push('0');
        len += 1;
    }
    code
}

fn is_separator(ch: char) -> bool {
    matches!(ch, 'a' | 'e' | 'i' | 'o' | 'u' | 'æ' | 'ø' | 'h' | 'y' | 'w')
}

fn class_of(ch: char) -> Option<char> {
    match ch {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}
