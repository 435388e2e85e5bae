//! End-to-end pipeline runs: artifacts on disk, verdict text, restore.

use pyai_debugger::pipeline::{Pipeline, PipelineRequest};
use pyai_debugger::rewrite::{MARKER, SENTINEL};
use pyai_debugger::runner::RunStatus;
use pyai_debugger::skip_if_no_python;
use pyai_debugger::test_utils::{scratch_config, write_script};
use tempfile::tempdir;

#[tokio::test]
async fn test_interactive_script_passes_unattended() {
    skip_if_no_python!();
    let dir = tempdir().unwrap();
    let data = dir.path().join("numbers.txt");
    std::fs::write(&data, "1 2 3").unwrap();
    let input = write_script(
        dir.path(),
        "script.py",
        &format!(
            "import argparse\n\
             parser = argparse.ArgumentParser()\n\
             parser.add_argument('--count', required=True)\n\
             args = parser.parse_args()\n\
             age = int(input('Enter age: '))\n\
             name = input('Enter name: ')\n\
             with open('{}', 'r') as fh:\n    \
                 numbers = fh.read().split()\n\
             with open('summary.txt', 'w') as out:\n    \
                 out.write(str(age))\n\
             print(name, age, args.count, len(numbers))\n",
            data.display()
        ),
    );
    let config = scratch_config(dir.path());
    let root = config.sandbox_root.clone();
    let pipeline = Pipeline::new(config);

    let outcome = pipeline
        .run(&PipelineRequest {
            input: input.clone(),
            ..PipelineRequest::default()
        })
        .await;

    let result = outcome.result.as_ref().unwrap();
    assert_eq!(result.status, RunStatus::Passed, "stderr: {}", result.stderr);
    assert!(result.stdout.ends_with(&format!("{SENTINEL} 3\n")), "{}", result.stdout);
    assert_eq!(std::fs::read_to_string(dir.path().join("codetest.txt")).unwrap(), "PASS\n");

    // The real data file moved into the sandbox; the relative output got a placeholder.
    assert!(!data.exists());
    assert_eq!(std::fs::read_to_string(root.join("numbers.txt")).unwrap(), "1 2 3");
    assert!(root.join("summary.txt").exists());
    assert!(!dir.path().join("summary.txt").exists());

    let rewritten = std::fs::read_to_string(dir.path().join("new_script.py")).unwrap();
    assert_eq!(rewritten.matches(MARKER).count(), 5);
    assert!(rewritten.contains("required=False"));

    let handoff: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("handoff.json")).unwrap()).unwrap();
    assert_eq!(handoff["status"], "PASSED");
    assert_eq!(handoff["rewrites"].as_array().unwrap().len(), 5);
    assert_eq!(std::fs::read_to_string(dir.path().join("imports.txt")).unwrap(), "");
}

#[tokio::test]
async fn test_failure_verdict_and_import_report() {
    skip_if_no_python!();
    let dir = tempdir().unwrap();
    let input = write_script(
        dir.path(),
        "script.py",
        "import os\nimport pyai_surely_missing_pkg.sub as sub\n\nprint(os.getcwd())\n",
    );
    let pipeline = Pipeline::new(scratch_config(dir.path()));

    let outcome = pipeline
        .run(&PipelineRequest {
            input,
            ..PipelineRequest::default()
        })
        .await;

    assert_eq!(outcome.imports.unresolved, vec!["pyai_surely_missing_pkg"]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("imports.txt")).unwrap(),
        "pyai_surely_missing_pkg"
    );

    let verdict = std::fs::read_to_string(dir.path().join("codetest.txt")).unwrap();
    assert!(!outcome.verdict.passed);
    assert!(verdict.starts_with("Error:\n```\nTraceback"), "{verdict}");
    assert!(verdict.contains("ModuleNotFoundError"));
    assert!(verdict.ends_with("```"));
    assert!(verdict.lines().all(|line| !line.starts_with(' ')));
}

#[tokio::test]
async fn test_restore_on_pass_puts_original_back() {
    skip_if_no_python!();
    let dir = tempdir().unwrap();
    let original = "def main():\n    count = int(input('How many? '))\n    print('x' * count)\n\nmain()\n";
    let input = write_script(dir.path(), "script.py", original);
    let pipeline = Pipeline::new(scratch_config(dir.path()));

    let outcome = pipeline
        .run(&PipelineRequest {
            input,
            restore_on_pass: true,
            ..PipelineRequest::default()
        })
        .await;

    assert!(outcome.verdict.passed);
    assert!(outcome.restored);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("new_script.py")).unwrap(),
        original
    );
}

#[tokio::test]
async fn test_context_is_handed_off_in_ai_only_mode() {
    let dir = tempdir().unwrap();
    let input = write_script(dir.path(), "script.py", "value = float(input())\n");
    let context = write_script(dir.path(), "context.txt", "The script should print the square.");
    let mut config = scratch_config(dir.path());
    config.interpreter = "/definitely/not/python".into();
    let pipeline = Pipeline::new(config);

    let outcome = pipeline
        .run(&PipelineRequest {
            input,
            context: Some(context),
            ai_only: true,
            restore_on_pass: false,
        })
        .await;

    assert!(outcome.result.is_none());
    let handoff: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("handoff.json")).unwrap()).unwrap();
    assert_eq!(handoff["context"], "The script should print the square.");
    assert_eq!(handoff["ai_only"], true);
    assert!(handoff["status"].is_null());
    assert!(
        std::fs::read_to_string(dir.path().join("codetest.txt"))
            .unwrap()
            .contains("NOT RUN")
    );
}
