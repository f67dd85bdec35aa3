//! `pack suggest-stacks` — lists known stack ids from the buildpacks.io
//! catalog. See `suggest_builders` for why this is a stub here.

use pack_core::errors::{PackError, Result};

pub fn run() -> Result<()> {
    Err(PackError::usage(
        "suggest-stacks catalog fetch is not part of this build",
    ))
}
