//! `pack set-run-image-mirrors` — persist a run image's mirror list to
//! `$PACK_HOME/config.toml`.

use crate::cli::SetRunImageMirrorsArgs;
use crate::commands::shared::terminal;
use pack_core::config::{PackConfig, RunImageConfig};
use pack_core::errors::Result;

pub fn run(args: SetRunImageMirrorsArgs, no_color: bool) -> Result<()> {
    let mut config = PackConfig::load()?;

    match config.run_images.iter_mut().find(|r| r.image == args.image) {
        Some(existing) => existing.mirrors = args.mirror.clone(),
        None => config.run_images.push(RunImageConfig {
            image: args.image.clone(),
            mirrors: args.mirror.clone(),
        }),
    }
    config.save(&PackConfig::config_path()?)?;

    terminal::success(no_color, &format!("Run image '{}' mirrors configured", args.image));
    Ok(())
}
