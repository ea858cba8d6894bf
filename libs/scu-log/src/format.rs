//! Host-side rendering of the firmware's variadic log format strings
//! (spec.md §4.D). A small hand-rolled state machine, not a full
//! `printf` clone: only the conversions and padding characters spec.md
//! lists are recognized.

const PAD_CHARS: [char; 4] = [' ', '0', '.', '_'];

/// Renders `format` against `params`, fetching `%s`/`%S` targets
/// through `read_str` (an address -> string lookup backed by a `Bus`
/// read of firmware memory). Each conversion consumes exactly one
/// parameter slot; once `params` is exhausted, further conversions are
/// silently dropped, per spec.md §4.D.
pub fn render(format: &str, params: &[u32], mut read_str: impl FnMut(u32) -> String) -> String {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::with_capacity(format.len());
    let mut param_idx = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            out.push('%');
            break;
        }
        if chars[i] == '%' {
            out.push('%');
            i += 1;
            continue;
        }

        let mut pad = ' ';
        if PAD_CHARS.contains(&chars[i]) {
            pad = chars[i];
            i += 1;
        }

        let mut width = 0usize;
        let mut digits = 0;
        while i < chars.len() && chars[i].is_ascii_digit() && digits < 2 {
            width = width * 10 + (chars[i] as usize - '0' as usize);
            i += 1;
            digits += 1;
        }

        if i >= chars.len() {
            break;
        }
        let conv = chars[i];
        i += 1;

        if param_idx >= params.len() && conv != '%' {
            // Excess conversion beyond the fixed parameter count:
            // silently dropped (spec.md §4.D).
            continue;
        }
        let param = params.get(param_idx).copied().unwrap_or(0);
        param_idx += 1;

        let rendered = match conv {
            's' | 'S' => read_str(param),
            'c' => ((param as u8) as char).to_string(),
            'd' | 'i' => (param as i32).to_string(),
            'u' => param.to_string(),
            'x' => format_radix(param, 16, false),
            'X' => format_radix(param, 16, true),
            'o' => format_radix(param, 8, false),
            'p' => format!("0x{:x}", param),
            'b' => format_radix(param, 2, false),
            other => {
                // Unknown conversion: echo literally rather than
                // silently swallowing the parameter it already
                // consumed.
                param_idx -= 1;
                format!("%{other}")
            }
        };

        out.push_str(&pad_to_width(&rendered, width, pad));
    }

    out
}

fn pad_to_width(s: &str, width: usize, pad: char) -> String {
    if s.chars().count() >= width {
        return s.to_string();
    }
    let mut padded = String::with_capacity(width);
    for _ in 0..(width - s.chars().count()) {
        padded.push(pad);
    }
    padded.push_str(s);
    padded
}

fn format_radix(value: u32, radix: u32, upper: bool) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let digits = b"0123456789abcdef";
    let mut buf = Vec::new();
    let mut v = value;
    while v > 0 {
        buf.push(digits[(v % radix) as usize]);
        v /= radix;
    }
    buf.reverse();
    let s = String::from_utf8(buf).unwrap();
    if upper {
        s.to_uppercase()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_strings(_addr: u32) -> String {
        String::new()
    }

    #[test]
    fn decimal_and_string_conversion() {
        let out = render("%d %s", &[42, 0], |_| "x".to_string());
        assert_eq!(out, "42 x");
    }

    #[test]
    fn zero_padded_decimal_then_string() {
        let out = render("%04d_%s", &[7, 0], |_| "hi".to_string());
        assert_eq!(out, "0007_hi");
    }

    #[test]
    fn hex_and_binary() {
        let out = render("%x %X %b", &[255, 255, 5], no_strings);
        assert_eq!(out, "ff FF 101");
    }

    #[test]
    fn excess_conversions_beyond_param_count_are_dropped() {
        let out = render("%d %d %d", &[1], no_strings);
        assert_eq!(out, "1  ");
    }

    #[test]
    fn literal_percent_escape() {
        let out = render("100%% done", &[], no_strings);
        assert_eq!(out, "100% done");
    }
}
