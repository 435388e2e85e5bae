//! # Pipeline
//!
//! One invocation, in order:
//!
//! 1. Audit imports and write the import report.
//! 2. Virtualize absolute path literals (pass B), then `open(path, mode)` calls
//!    (pass A), and create/move the sandbox files they refer to.
//! 3. Neutralize `input()` assignments and relax required arguments.
//! 4. Write the rewritten script and estimate its memory budget.
//! 5. Run it in the sandbox (unless AI-only) and classify the run.
//! 6. Write the verdict and the handoff document.
//!
//! [`Pipeline::run`] cannot fail: any error along the way becomes a
//! `DEBUGGING ERROR` verdict, and the verdict file is always written.

use crate::audit::{ImportAuditor, ImportReport, ModuleResolver, PythonModuleResolver};
use crate::budget::MemoryBudget;
use crate::config::DebuggerConfig;
use crate::handoff::Handoff;
use crate::rewrite::{
    RewriteOutcome, SourceUnit, materialize, neutralize_inputs, relax_required_args, restore,
    virtualize_absolute_paths, virtualize_mode_paths, write_atomic,
};
use crate::runner::{ExecutionResult, RunnerSettings, SandboxRunner};
use crate::verdict::Verdict;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRequest {
    pub input: PathBuf,
    pub context: Option<PathBuf>,
    pub ai_only: bool,
    pub restore_on_pass: bool,
}

/// Where the per-invocation artifacts go: next to the input script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub script: PathBuf,
    pub verdict: PathBuf,
    pub handoff: PathBuf,
}

impl ArtifactPaths {
    pub fn for_input(input: &Path, config: &DebuggerConfig) -> Self {
        let dir = match input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            script: dir.join(&config.script_name),
            verdict: dir.join(&config.verdict_name),
            handoff: dir.join(&config.handoff_name),
        }
    }
}

/// Everything one invocation produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub verdict: Verdict,
    pub paths: ArtifactPaths,
    pub imports: ImportReport,
    pub rewrites: RewriteOutcome,
    pub budget: Option<MemoryBudget>,
    pub result: Option<ExecutionResult>,
    /// The rewritten script was restored after a pass
    pub restored: bool,
}

/// Intermediate state shared by the stages.
#[derive(Default)]
struct Stages {
    imports: ImportReport,
    rewrites: RewriteOutcome,
    context: Option<String>,
    budget: Option<MemoryBudget>,
    result: Option<ExecutionResult>,
    restored: bool,
}

pub struct Pipeline<R: ModuleResolver = PythonModuleResolver> {
    config: DebuggerConfig,
    auditor: ImportAuditor<R>,
}

impl Pipeline<PythonModuleResolver> {
    pub fn new(config: DebuggerConfig) -> Self {
        let resolver = PythonModuleResolver::new(config.interpreter.clone());
        Self::with_resolver(config, resolver)
    }
}

impl<R: ModuleResolver> Pipeline<R> {
    pub fn with_resolver(config: DebuggerConfig, resolver: R) -> Self {
        let auditor = ImportAuditor::new(resolver, config.imports_report.clone());
        Self { config, auditor }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Run every stage once. Always writes the verdict artifact.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineOutcome {
        let paths = ArtifactPaths::for_input(&request.input, &self.config);
        let mut stages = Stages::default();
        tracing::info!(
            input = %request.input.display(),
            ai_only = request.ai_only,
            sandbox_root = %self.config.sandbox_root.display(),
            "Pipeline started"
        );

        let verdict = match self.run_stages(request, &paths, &mut stages).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Pipeline stage failed");
                Verdict::error(&format!("DEBUGGING ERROR:\n{e:#}"))
            }
        };

        write_verdict(&paths, &verdict);

        let handoff = Handoff {
            created_at: chrono::Utc::now(),
            input: request.input.clone(),
            rewritten_script: paths.script.clone(),
            verdict_path: paths.verdict.clone(),
            verdict: verdict.text.clone(),
            passed: verdict.passed,
            ai_only: request.ai_only,
            status: stages.result.as_ref().map(|r| r.status),
            budget: stages.budget,
            context: stages.context.take(),
            unresolved_imports: stages.imports.unresolved.clone(),
            rewrites: stages.rewrites.records.clone(),
            skipped: stages.rewrites.skipped.clone(),
            sandbox_files: stages.rewrites.sandbox_files.clone(),
        };
        if let Err(e) = handoff.write(&paths.handoff) {
            tracing::warn!(error = %e, "Handoff document not written");
        }

        tracing::info!(passed = verdict.passed, verdict = %paths.verdict.display(), "Pipeline finished");
        PipelineOutcome {
            verdict,
            paths,
            imports: stages.imports,
            rewrites: stages.rewrites,
            budget: stages.budget,
            result: stages.result,
            restored: stages.restored,
        }
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        paths: &ArtifactPaths,
        stages: &mut Stages,
    ) -> anyhow::Result<Verdict> {
        let source = SourceUnit::load(&request.input).context("Failed to read input script")?;
        let script_dir = paths.script.parent().unwrap_or(Path::new("."));

        stages.imports = match self.auditor.audit_and_write(source.text(), script_dir).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Import report not written");
                self.auditor.audit(source.text(), script_dir).await
            }
        };

        if let Some(context) = &request.context {
            match tokio::fs::read_to_string(context).await {
                Ok(text) => stages.context = Some(text),
                Err(e) => tracing::warn!(path = %context.display(), error = %e, "Context file unreadable"),
            }
        }

        let root = self.config.sandbox_root.as_path();
        let mut rewrites = virtualize_absolute_paths(source.text(), root, |p| p.exists());
        let mode_paths = virtualize_mode_paths(&rewrites.text, root);
        rewrites.absorb(mode_paths);
        let summary = materialize(root, &rewrites.sandbox_files).context("Failed to prepare sandbox root")?;
        tracing::debug!(
            relocated = summary.relocated.len(),
            created = summary.created.len(),
            failures = summary.failures.len(),
            "Sandbox files prepared"
        );

        let inputs = neutralize_inputs(&rewrites.text, &mut rand::rng());
        rewrites.absorb(inputs);
        let args = relax_required_args(&rewrites.text);
        rewrites.absorb(args);
        for skip in &rewrites.skipped {
            tracing::warn!(line_no = skip.line_no, kind = ?skip.kind, reason = ?skip.reason, "Rewrite skipped");
        }
        tracing::info!(edits = rewrites.edit_count(), skipped = rewrites.skipped.len(), "Script rewritten");

        let rewritten = SourceUnit::in_memory(&paths.script, rewrites.text.clone());
        stages.rewrites = rewrites;
        rewritten.store().context("Failed to write rewritten script")?;

        let budget = MemoryBudget::estimate(rewritten.text(), self.config.memory_floor_mb);
        stages.budget = Some(budget);
        tracing::debug!(
            threshold_mb = budget.threshold_mb,
            avg_complexity = ?budget.avg_complexity,
            "Memory budget estimated"
        );

        if request.ai_only {
            tracing::info!("AI-only mode, sandbox run skipped");
            return Ok(Verdict::not_run());
        }

        let runner = SandboxRunner::new(RunnerSettings::from(&self.config));
        let result = runner.run(rewritten.path(), &budget).await;
        let verdict = Verdict::from_result(&result);
        stages.result = Some(result);

        if request.restore_on_pass && verdict.passed {
            let restored = restore(rewritten.text());
            SourceUnit::in_memory(&paths.script, restored.text)
                .store()
                .context("Failed to restore rewritten script")?;
            tracing::info!(pairs = restored.restored, "Rewritten script restored after pass");
            stages.restored = true;
        }
        Ok(verdict)
    }
}

/// Write the verdict artifact, falling back to a plain write. Failures are logged only.
pub fn write_verdict(paths: &ArtifactPaths, verdict: &Verdict) {
    if let Err(e) = write_atomic(&paths.verdict, &verdict.text) {
        tracing::error!(error = %e, "Could not write verdict atomically, trying a plain write");
        if let Err(e) = std::fs::write(&paths.verdict, &verdict.text) {
            tracing::error!(path = %paths.verdict.display(), error = %e, "Verdict not written");
        }
    }
}
