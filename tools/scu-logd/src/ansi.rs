//! ANSI escape sequence handling (spec.md §4.L, `logd_cmdline.hpp`'s
//! `escSequences` flag): firmware log text may embed terminal colour
//! codes; a non-terminal sink (file, syslog) gets them stripped unless
//! the caller explicitly asks to keep them.

const ESC: char = '\u{1b}';

/// Removes CSI sequences (`ESC '[' ... final-byte`) from `text`,
/// leaving everything else untouched.
pub fn strip_csi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESC && chars.peek() == Some(&'[') {
            chars.next(); // consume '['
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_a_colour_sequence() {
        assert_eq!(strip_csi("\u{1b}[31mred\u{1b}[0m"), "red");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(strip_csi("no escapes here"), "no escapes here");
    }

    #[test]
    fn leaves_a_lone_escape_without_bracket_untouched() {
        assert_eq!(strip_csi("\u{1b}X"), "\u{1b}X");
    }
}
