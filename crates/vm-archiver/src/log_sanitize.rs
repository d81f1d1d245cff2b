//! Collapses subprocess output into one terminal-safe diagnostic line.

const MAX_SUMMARY_CHARS: usize = 1024;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc,
    OscEsc,
}

/// Strips ANSI escape sequences and control characters, joins lines with
/// `" | "` and truncates long output.
pub fn single_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_SUMMARY_CHARS));
    let mut esc: Option<Escape> = None;
    let mut pending_break = false;
    let mut count = 0usize;

    for c in input.chars() {
        if let Some(mode) = esc {
            esc = match (mode, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::Osc),
                (Escape::Start, _) => None,
                (Escape::Csi, c) if ('@'..='~').contains(&c) => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::Osc, '\x07') => None,
                (Escape::Osc, '\x1b') => Some(Escape::OscEsc),
                (Escape::Osc, _) => Some(Escape::Osc),
                (Escape::OscEsc, '\\') => None,
                (Escape::OscEsc, _) => Some(Escape::Osc),
            };
            continue;
        }

        match c {
            '\x1b' => esc = Some(Escape::Start),
            '\n' | '\r' => pending_break = !out.is_empty(),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c => {
                if pending_break {
                    out.push_str(" | ");
                    pending_break = false;
                }
                out.push(c);
                count += 1;
                if count >= MAX_SUMMARY_CHARS {
                    out.push_str(" ...[truncated]");
                    break;
                }
            }
        }
    }

    out.trim().to_string()
}
