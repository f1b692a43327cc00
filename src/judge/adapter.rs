use crate::judge::HarnessRun;

/// Runtime adapter contract for language-specific snippet runs.
pub trait RuntimeAdapter: Send + Sync {
    fn language(&self) -> &'static str;
    /// File name the snippet is written under inside the run workspace
    fn source_file_name(&self) -> &'static str;
    fn run_command(&self, interpreter: &str, run: &HarnessRun) -> Vec<String>;
    /// Command verifying the interpreter has the harness prerequisites.
    /// Prints the interpreter version on success.
    fn probe_command(&self, interpreter: &str) -> Vec<String>;
}
