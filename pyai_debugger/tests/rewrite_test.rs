//! Rewrite rules applied in pipeline order to realistic scripts.

use pyai_debugger::budget::MemoryBudget;
use pyai_debugger::rewrite::{
    FileOrigin, MARKER, RewriteKind, SENTINEL_TAG, SkipReason, neutralize_inputs,
    relax_required_args, restore, virtualize_absolute_paths, virtualize_mode_paths,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use regex::Regex;
use std::path::Path;

const ROOT: &str = "/home/user/sig";

fn rewrite_all(text: &str, seed: u64) -> pyai_debugger::rewrite::RewriteOutcome {
    let root = Path::new(ROOT);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut outcome = virtualize_absolute_paths(text, root, |_| false);
    let pass_a = virtualize_mode_paths(&outcome.text, root);
    outcome.absorb(pass_a);
    let inputs = neutralize_inputs(&outcome.text, &mut rng);
    outcome.absorb(inputs);
    let args = relax_required_args(&outcome.text);
    outcome.absorb(args);
    outcome
}

#[test]
fn test_int_input_becomes_literal_in_range() {
    let outcome = rewrite_all("age = int(input(\"Enter age: \"))\nprint(age)\n", 1);
    let lines: Vec<&str> = outcome.text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "#%@ age = int(input(\"Enter age: \"))");
    let literal = Regex::new(r"^age = (\d+) #\[SENSIBLE VALUE\]$").unwrap();
    let caps = literal.captures(lines[1]).unwrap();
    let value: u32 = caps[1].parse().unwrap();
    assert!(value <= 100);
    assert_eq!(lines[2], "print(age)");
}

#[test]
fn test_str_input_becomes_quoted_word() {
    let outcome = rewrite_all("name = input(\"Enter name: \")\n", 2);
    let lines: Vec<&str> = outcome.text.lines().collect();
    assert_eq!(lines[0], format!("{MARKER}name = input(\"Enter name: \")"));
    let word = Regex::new(r#"^name = "[a-z0-9]{5}" #\[SENSIBLE VALUE\]$"#).unwrap();
    assert!(word.is_match(lines[1]), "{}", lines[1]);
}

#[test]
fn test_required_argument_gets_default() {
    let outcome = rewrite_all("parser.add_argument('--out', required=True)\n", 3);
    assert_eq!(
        outcome.text,
        "#%@ parser.add_argument('--out', required=True)\n\
         parser.add_argument('--out', required=False, default=\"[SENSIBLE VALUE]\")\n"
    );
    assert_eq!(outcome.records[0].kind, RewriteKind::ArgDefault);
}

#[test]
fn test_whole_chain_is_idempotent() {
    let script = "\
import argparse
CONFIG = '/etc/tool/settings.ini'
parser = argparse.ArgumentParser()
parser.add_argument('--mode', required=True, default='fast')
def run():
    n = int(input('n: '))
    flag = bool(input())
    label = custom(input())
    with open('../shared/out.csv', 'w') as fh:
        fh.write(str(n))
";
    let first = rewrite_all(script, 4);
    let second = rewrite_all(&first.text, 5);

    assert_eq!(first.edit_count(), 5);
    assert_eq!(second.edit_count(), 0);
    assert_eq!(second.text, first.text);

    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].reason, SkipReason::UnknownWrapper("custom".into()));
    assert!(first.text.contains("\n    n = "));
    assert!(first.text.contains(SENTINEL_TAG));
    assert!(first.text.contains("required=False, default='fast')"));
    assert!(!first.text.contains("required=False, default='fast', default="));

    let origins: Vec<FileOrigin> = first.sandbox_files.iter().map(|f| f.origin).collect();
    assert_eq!(origins, vec![FileOrigin::PlaceholderFile, FileOrigin::PlaceholderFile]);
    assert!(first.text.contains("open('/home/user/sig/out.csv', 'w')"));
    assert!(first.text.contains("CONFIG = '/home/user/sig/settings.ini'"));
}

#[test]
fn test_restore_reverses_the_whole_chain() {
    let script = "x = int(input())\r\nparser.add_argument('-v', required=True)\r\ny = 'done'";
    let rewritten = rewrite_all(script, 6);
    assert_eq!(rewritten.edit_count(), 2);

    let back = restore(&rewritten.text);
    assert_eq!(back.restored, 2);
    assert_eq!(back.text, script);
}

#[test]
fn test_line_edited_by_two_passes_keeps_one_marker_pair() {
    let script = "parser.add_argument('--cfg', required=True, default='/etc/app.conf')\nprint('ok')\n";
    let rewritten = rewrite_all(script, 8);
    let lines: Vec<&str> = rewritten.text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines.iter().filter(|l| l.starts_with(MARKER)).count(), 1);
    assert_eq!(lines[0], format!("{MARKER}{}", script.lines().next().unwrap()));
    assert_eq!(
        lines[1],
        "parser.add_argument('--cfg', required=False, default='/home/user/sig/app.conf')"
    );
    assert_eq!(lines[2], "print('ok')");

    let again = rewrite_all(&rewritten.text, 9);
    assert_eq!(again.edit_count(), 0);
    assert_eq!(again.text, rewritten.text);

    let back = restore(&rewritten.text);
    assert_eq!(back.restored, 1);
    assert_eq!(back.text, script);
}

#[test]
fn test_budget_of_rewritten_script_respects_floor() {
    let rewritten = rewrite_all("def f(a):\n    if a:\n        return input()\n    return 0\n", 7);
    let budget = MemoryBudget::estimate(&rewritten.text, 1024.0);
    assert_eq!(budget.avg_complexity, Some(2.0));
    assert_eq!(budget.threshold_mb, 1024.0);
}
