use std::path::Path;
use std::time::Instant;

use vsr_core::vcdbtree;

pub(crate) fn run_combine(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !input.is_dir() {
        return Err(format!("'{}' is not a directory", input.display()).into());
    }
    println!("Combining {} -> {}", input.display(), output.display());
    let started = Instant::now();

    let counts = vcdbtree::combine(input, output)?;

    println!(
        "Combine complete in {:.2?}: {} rows",
        started.elapsed(),
        counts.total()
    );
    Ok(())
}
