//! `pack suggest-builders` — lists curated builder images from the
//! buildpacks.io catalog. That catalog lives behind a network fetch this
//! build doesn't perform; see `suggest_stacks` for the companion stub.

use pack_core::errors::{PackError, Result};

pub fn run() -> Result<()> {
    Err(PackError::usage(
        "suggest-builders catalog fetch is not part of this build; pass a builder image directly with -B/--builder",
    ))
}
