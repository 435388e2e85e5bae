//! Allocation tracing inside the child interpreter.
//!
//! The script is started through a bootstrap that enables `tracemalloc`, runs the
//! script as `__main__` and, when the interpreter exits, dumps current/peak traced
//! memory and the top allocation sites to a private JSON report. A child that is
//! killed never writes the report.

use super::types::{AllocationSite, MemoryReport, MemorySource};
use crate::error::DebuggerError;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BOOTSTRAP: &str = r#"
import atexit, json, os, runpy, sys, tracemalloc

_script, _report, _top = sys.argv[1], sys.argv[2], int(sys.argv[3])


def _dump():
    try:
        current, peak = tracemalloc.get_traced_memory()
        snap = tracemalloc.take_snapshot()
        own = snap.filter_traces([tracemalloc.Filter(True, _script)])
        stats = own.statistics("lineno")[:_top] or snap.statistics("lineno")[:_top]
        top = [
            {"file": s.traceback[0].filename, "line": s.traceback[0].lineno, "size": s.size, "count": s.count}
            for s in stats
        ]
        with open(_report, "w") as fh:
            json.dump({"current": current, "peak": peak, "top": top}, fh)
    except Exception:
        pass


if not tracemalloc.is_tracing():
    tracemalloc.start()
atexit.register(_dump)
sys.argv = [_script]
sys.path[0] = os.path.dirname(_script)
try:
    _globals = runpy.run_path(_script, run_name="__main__")
except SystemExit:
    raise
except BaseException:
    import traceback

    _type, _value, _tb = sys.exc_info()
    while _tb is not None and _tb.tb_frame.f_code.co_filename != _script:
        _tb = _tb.tb_next
    traceback.print_exception(_type, _value, _tb)
    sys.exit(1)
"#;

#[derive(Debug, Deserialize)]
struct RawReport {
    current: u64,
    peak: u64,
    #[serde(default)]
    top: Vec<AllocationSite>,
}

/// Scratch state for one traced run. Dropping it removes the report directory.
#[derive(Debug)]
pub struct AllocationTracer {
    dir: TempDir,
    report: PathBuf,
    top_n: usize,
}

impl AllocationTracer {
    pub fn start(top_n: usize) -> Result<Self, DebuggerError> {
        let dir = tempfile::Builder::new()
            .prefix("pyai-trace-")
            .tempdir()
            .map_err(|e| DebuggerError::io(std::env::temp_dir(), e))?;
        let report = dir.path().join("report.json");
        Ok(Self { dir, report, top_n })
    }

    /// Interpreter arguments that run `script` under the tracer.
    pub fn interpreter_args(&self, script: &Path) -> Vec<OsString> {
        vec![
            "-X".into(),
            "tracemalloc".into(),
            "-c".into(),
            BOOTSTRAP.into(),
            script.as_os_str().to_owned(),
            self.report.as_os_str().to_owned(),
            self.top_n.to_string().into(),
        ]
    }

    pub fn report_path(&self) -> &Path {
        &self.report
    }

    /// Read the report (if the child wrote one) and discard all tracer state.
    pub fn stop(self) -> Option<MemoryReport> {
        let parsed = match std::fs::read_to_string(&self.report) {
            Ok(raw) => match serde_json::from_str::<RawReport>(&raw) {
                Ok(report) => Some(MemoryReport {
                    current: report.current,
                    peak: report.peak,
                    top: report.top,
                    source: MemorySource::Tracer,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Allocation report unreadable");
                    None
                }
            },
            Err(_) => {
                tracing::debug!("Child left no allocation report");
                None
            }
        };
        if let Err(e) = self.dir.close() {
            tracing::debug!(error = %e, "Could not remove tracer scratch dir");
        }
        parsed
    }
}
