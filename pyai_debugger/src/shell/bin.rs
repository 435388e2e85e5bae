// Binary entry point for pyai_debugger
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = pyai_debugger::shell::run().await {
        eprintln!("pyai_debugger fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
