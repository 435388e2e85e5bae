//! Undo rewrite pairs.

use super::{MARKER, split_lines};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub text: String,
    /// Number of marker pairs undone
    pub restored: usize,
}

/// Uncomment every marker line and drop the synthesized line that follows it.
///
/// The restored line takes the line ending of the dropped line, which is the
/// original ending of the edited line, so `restore(rewrite(x)) == x` byte for byte.
pub fn restore(text: &str) -> RestoreOutcome {
    let mut out = String::with_capacity(text.len());
    let mut restored = 0;
    let mut lines = split_lines(text).peekable();

    while let Some((line, ending)) = lines.next() {
        let Some(original) = line.strip_prefix(MARKER) else {
            out.push_str(line);
            out.push_str(ending);
            continue;
        };
        out.push_str(original);
        match lines.next() {
            Some((_, replacement_ending)) => out.push_str(replacement_ending),
            None => out.push_str(ending),
        }
        restored += 1;
    }

    RestoreOutcome {
        text: out,
        restored,
    }
}
