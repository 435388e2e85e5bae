//! Rules that remove the need for a person at the keyboard.
//!
//! - [`neutralize_inputs`]: `age = int(input("Age: "))` becomes a commented original
//!   followed by `age = 42 #[SENSIBLE VALUE]`.
//! - [`relax_required_args`]: `parser.add_argument("--x", required=True)` becomes a
//!   commented original followed by the same call with `required=False` and a
//!   sentinel default.

use super::{
    RewriteKind, RewriteOutcome, RewriteRecord, RewriteSkip, SENTINEL, SENTINEL_TAG, SkipReason,
    is_protected, push_edit, scan_lines,
};
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

const STR_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

fn input_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\binput\s*\(").expect("input call regex must compile"))
}

fn assignment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<indent>[ \t]*)(?P<target>[A-Za-z_][\w.]*(?:\[[^\]]*\])?)(?:[ \t]*:[^=]+)?[ \t]*=[ \t]*(?P<rhs>[^=].*)$",
        )
        .expect("assignment regex must compile")
    })
}

fn bare_input() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^input\s*\(").expect("bare input regex must compile"))
}

fn wrapped_input() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<wrapper>[A-Za-z_][\w.]*)\s*\(\s*input\s*\(")
            .expect("wrapped input regex must compile")
    })
}

fn outer_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<callee>[A-Za-z_][\w.]*)\s*\(").expect("outer call regex must compile")
    })
}

fn required_true() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\brequired\s*=\s*True\b").expect("required flag regex must compile")
    })
}

fn add_argument_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.add_argument\s*\(").expect("add_argument regex must compile")
    })
}

fn default_kwarg() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bdefault\s*=").expect("default kwarg regex must compile"))
}

/// Semantic type of a value read from `input()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Int,
    Float,
    Str,
    Bool,
}

impl InputType {
    /// Map a wrapping function name to a type. A bare `input()` yields a string.
    pub fn from_wrapper(wrapper: Option<&str>) -> Option<Self> {
        match wrapper {
            None | Some("str") => Some(InputType::Str),
            Some("int") => Some(InputType::Int),
            Some("float") => Some(InputType::Float),
            Some("bool") => Some(InputType::Bool),
            Some(_) => None,
        }
    }

    /// A Python literal of this type.
    pub fn synthesize<R: Rng>(self, rng: &mut R) -> String {
        match self {
            InputType::Int => rng.random_range(0..=100).to_string(),
            InputType::Float => {
                let value: f64 = rng.random_range(0.0..=100.0);
                format!("{:.2}", (value * 100.0).round() / 100.0)
            }
            InputType::Str => {
                let word: String = (0..5)
                    .map(|_| STR_ALPHABET[rng.random_range(0..STR_ALPHABET.len())] as char)
                    .collect();
                format!("\"{word}\"")
            }
            InputType::Bool => {
                if rng.random_bool(0.5) {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            }
        }
    }
}

/// Replace `<var> = <wrapper>(... input(...) ...)` assignments with synthesized values.
///
/// Lines that call `input()` but cannot be rewritten (no simple assignment, or a
/// wrapper whose result type is unknown) are left as they are and reported in
/// `skipped`.
pub fn neutralize_inputs<R: Rng>(text: &str, rng: &mut R) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    let mut out = String::with_capacity(text.len() + 64);

    for (idx, (line, ending, synthesized)) in scan_lines(text).enumerate() {
        let line_no = idx + 1;
        if is_protected(line, None) || !input_call().is_match(line) {
            out.push_str(line);
            out.push_str(ending);
            continue;
        }

        let Some(caps) = assignment().captures(line) else {
            outcome.skipped.push(RewriteSkip {
                kind: RewriteKind::InputReplacement,
                line_no,
                line: line.to_string(),
                reason: SkipReason::NotAnAssignment,
            });
            out.push_str(line);
            out.push_str(ending);
            continue;
        };

        let input_type = match input_type_of(&caps["rhs"]) {
            Ok(input_type) => input_type,
            Err(wrapper) => {
                tracing::warn!(line_no, line, %wrapper, "input() wrapper not recognised, line left as is");
                outcome.skipped.push(RewriteSkip {
                    kind: RewriteKind::InputReplacement,
                    line_no,
                    line: line.to_string(),
                    reason: SkipReason::UnknownWrapper(wrapper),
                });
                out.push_str(line);
                out.push_str(ending);
                continue;
            }
        };

        let replacement = format!(
            "{}{} = {} {SENTINEL_TAG}",
            &caps["indent"],
            &caps["target"],
            input_type.synthesize(rng)
        );
        push_edit(&mut out, line, ending, &replacement, synthesized);
        outcome.records.push(RewriteRecord {
            kind: RewriteKind::InputReplacement,
            line_no,
            original: line.to_string(),
            replacement,
        });
    }

    outcome.text = out;
    outcome
}

/// Type of the value an assignment's right-hand side reads from `input()`.
///
/// Only a bare `input(...)` or a call directly wrapping it counts. Anything else
/// yields the name of the outermost call (empty if there is none) as the
/// unrecognised wrapper.
fn input_type_of(rhs: &str) -> Result<InputType, String> {
    if bare_input().is_match(rhs) {
        return Ok(InputType::Str);
    }
    match wrapped_input().captures(rhs) {
        Some(caps) => InputType::from_wrapper(Some(&caps["wrapper"])).ok_or_else(|| caps["wrapper"].to_string()),
        None => Err(outer_call()
            .captures(rhs)
            .map(|caps| caps["callee"].to_string())
            .unwrap_or_default()),
    }
}

/// Make mandatory `add_argument(...)` declarations optional.
///
/// The copy gets `required=False`; a sentinel `default=` is appended only when the
/// declaration had none.
pub fn relax_required_args(text: &str) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    let mut out = String::with_capacity(text.len() + 64);

    for (idx, (line, ending, synthesized)) in scan_lines(text).enumerate() {
        let line_no = idx + 1;
        let call = add_argument_call().find(line);
        let candidate = !is_protected(line, None) && call.is_some() && required_true().is_match(line);
        let Some(call) = call.filter(|_| candidate) else {
            out.push_str(line);
            out.push_str(ending);
            continue;
        };

        let Some(close) = matching_paren(line, call.end() - 1) else {
            outcome.skipped.push(RewriteSkip {
                kind: RewriteKind::ArgDefault,
                line_no,
                line: line.to_string(),
                reason: SkipReason::UnbalancedCall,
            });
            out.push_str(line);
            out.push_str(ending);
            continue;
        };

        let mut replacement = String::with_capacity(line.len() + 32);
        let head = &line[..close];
        let relaxed_head = required_true().replace(head, "required=False");
        replacement.push_str(&relaxed_head);
        if !default_kwarg().is_match(head) {
            replacement.push_str(&format!(", default=\"{SENTINEL}\""));
        }
        replacement.push_str(&line[close..]);

        push_edit(&mut out, line, ending, &replacement, synthesized);
        outcome.records.push(RewriteRecord {
            kind: RewriteKind::ArgDefault,
            line_no,
            original: line.to_string(),
            replacement,
        });
    }

    outcome.text = out;
    outcome
}

/// Byte index of the `)` closing the `(` at `open`, skipping string literals.
fn matching_paren(line: &str, open: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                b'#' => return None,
                _ => {}
            },
        }
        i += 1;
    }
    None
}
