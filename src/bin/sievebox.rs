use anyhow::Result;

fn main() -> Result<()> {
    sievebox::cli::run()
}
