use std::path::Path;
use std::time::Instant;

use vsr_core::vcdbtree;

pub(crate) fn run_split(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Splitting {} -> {}", input.display(), output.display());
    let started = Instant::now();

    let counts = vcdbtree::split(input, output)?;

    println!(
        "Split complete in {:.2?}: {} chunks, {} mapchunks, {} mapregions, {} gamedata, {} players",
        started.elapsed(),
        counts.chunk,
        counts.mapchunk,
        counts.mapregion,
        counts.gamedata,
        counts.playerdata,
    );
    Ok(())
}
