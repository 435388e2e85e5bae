//! # Memory Budget
//!
//! Static estimate of how much memory a script may reasonably use, from its size
//! and the average cyclomatic complexity of its functions.
//!
//! ```text
//! size_mb   = size_bytes / 1 MiB
//! threshold = max(size_mb * 10, avg_cc * 10)   when functions were found
//!           = size_mb * 100                     otherwise
//! final     = max(threshold, floor)
//! ```
//!
//! Complexity is counted on text, not on a parsed tree: a function is a `def` line
//! plus every following line indented deeper, and its complexity is one plus the
//! number of decision keywords inside it.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn def_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<indent>[ \t]*)(?:async[ \t]+)?def[ \t]+(?P<name>\w+)")
            .expect("def line regex must compile")
    })
}

fn decision_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:if|elif|for|while|except|with|assert|and|or)\b")
            .expect("decision keyword regex must compile")
    })
}

/// Complexity of one discovered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub line_no: usize,
    pub complexity: u32,
}

/// The estimate handed to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryBudget {
    pub size_mb: f64,
    pub avg_complexity: Option<f64>,
    pub threshold_mb: f64,
}

impl MemoryBudget {
    /// Estimate the budget for a script's text.
    pub fn estimate(text: &str, floor_mb: f64) -> Self {
        let size_bytes = text.len() as u64;
        let avg_complexity = average_complexity(&function_complexities(text));
        Self {
            size_mb: size_bytes as f64 / BYTES_PER_MB,
            avg_complexity,
            threshold_mb: final_threshold(size_bytes, avg_complexity, floor_mb),
        }
    }

    /// Threshold in bytes, for comparing against resident and traced memory.
    pub fn threshold_bytes(&self) -> u64 {
        (self.threshold_mb * BYTES_PER_MB) as u64
    }
}

/// Memory ceiling in MB.
///
/// Non-decreasing in `size_bytes` and in `avg_complexity`, never below `floor_mb`
/// (or 1 MB if the floor itself is unusable), always finite.
pub fn final_threshold(size_bytes: u64, avg_complexity: Option<f64>, floor_mb: f64) -> f64 {
    let floor = if floor_mb.is_finite() && floor_mb > 0.0 {
        floor_mb
    } else {
        1.0
    };
    let size_mb = size_bytes as f64 / BYTES_PER_MB;
    let threshold = match avg_complexity.filter(|cc| cc.is_finite() && *cc >= 0.0) {
        Some(cc) => (size_mb * 10.0).max(cc * 10.0),
        None => size_mb * 100.0,
    };
    let bounded = threshold.max(floor);
    if bounded.is_finite() { bounded } else { f64::MAX }
}

/// Cyclomatic complexity of every `def` found in `text`.
pub fn function_complexities(text: &str) -> Vec<FunctionComplexity> {
    let lines: Vec<&str> = text.lines().collect();
    let mut found = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = def_line().captures(line) else {
            continue;
        };
        let indent = indent_width(&caps["indent"]);
        let mut complexity = 1;
        for body in &lines[idx + 1..] {
            let code = strip_comment(body);
            if code.trim().is_empty() {
                continue;
            }
            if indent_width(body) <= indent {
                break;
            }
            // Nested defs are units of their own.
            if def_line().is_match(body) {
                continue;
            }
            complexity += decision_keyword().find_iter(code).count() as u32;
        }
        found.push(FunctionComplexity {
            name: caps["name"].to_string(),
            line_no: idx + 1,
            complexity,
        });
    }
    found
}

pub fn average_complexity(functions: &[FunctionComplexity]) -> Option<f64> {
    if functions.is_empty() {
        return None;
    }
    let total: u64 = functions.iter().map(|f| u64::from(f.complexity)).sum();
    Some(total as f64 / functions.len() as f64)
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 8 } else { 1 })
        .sum()
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_small_script_hits_floor() {
        assert_eq!(final_threshold(2_000, None, 1024.0), 1024.0);
        assert_eq!(final_threshold(2_000, Some(4.0), 1024.0), 1024.0);
    }

    #[test]
    fn test_size_only_formula() {
        assert_eq!(final_threshold(20 * MB, None, 1024.0), 2000.0);
    }

    #[test]
    fn test_complexity_formula() {
        assert_eq!(final_threshold(MB, Some(150.0), 1024.0), 1500.0);
        assert_eq!(final_threshold(200 * MB, Some(1.0), 1024.0), 2000.0);
    }

    #[test]
    fn test_monotonic_in_size_and_complexity() {
        let sizes = [0, 1, 10 * MB, 50 * MB, 500 * MB, 5000 * MB];
        let ccs = [None, Some(0.0), Some(1.0), Some(50.0), Some(150.0), Some(10_000.0)];
        for cc in ccs {
            let mut last = 0.0;
            for size in sizes {
                let t = final_threshold(size, cc, 1024.0);
                assert!(t >= last, "size {size} cc {cc:?}");
                assert!(t >= 1024.0);
                last = t;
            }
        }
        for size in sizes {
            let mut last = 0.0;
            for cc in ccs.iter().skip(1) {
                let t = final_threshold(size, *cc, 1024.0);
                assert!(t >= last, "size {size} cc {cc:?}");
                last = t;
            }
        }
    }

    #[test]
    fn test_never_non_finite() {
        assert_eq!(final_threshold(0, Some(f64::NAN), 1024.0), 1024.0);
        assert_eq!(final_threshold(0, Some(f64::INFINITY), 1024.0), 1024.0);
        assert_eq!(final_threshold(0, None, f64::NAN), 1.0);
        assert!(final_threshold(u64::MAX, Some(f64::MAX), 1024.0).is_finite());
    }

    #[test]
    fn test_function_complexities() {
        let text = "\
import os

def simple():
    return 1

async def branchy(x):
    # if in a comment does not count
    if x and os.path.exists('a'):
        for i in range(3):
            pass
    elif x:
        while False:
            pass
    try:
        pass
    except ValueError:
        pass

    return x

def outer():
    def inner():
        if True:
            pass
    return inner
";
        let found = function_complexities(text);
        let summary: Vec<(&str, u32)> = found
            .iter()
            .map(|f| (f.name.as_str(), f.complexity))
            .collect();
        assert_eq!(
            summary,
            vec![("simple", 1), ("branchy", 7), ("outer", 2), ("inner", 2)]
        );
        assert_eq!(found[1].line_no, 6);
    }

    #[test]
    fn test_no_functions_means_no_metric() {
        assert_eq!(average_complexity(&function_complexities("x = 1\nprint(x)\n")), None);
        let budget = MemoryBudget::estimate("x = 1\n", 1024.0);
        assert_eq!(budget.avg_complexity, None);
        assert_eq!(budget.threshold_mb, 1024.0);
        assert_eq!(budget.threshold_bytes(), 1024 * MB);
    }

    #[test]
    fn test_estimate_averages_units() {
        let budget = MemoryBudget::estimate("def a():\n    pass\ndef b():\n    if x or y:\n        pass\n", 1.0);
        assert_eq!(budget.avg_complexity, Some(2.0));
        assert_eq!(budget.threshold_mb, 20.0);
    }
}
