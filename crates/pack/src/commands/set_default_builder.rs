//! `pack set-default-builder` — persist `default-builder-image` to
//! `$PACK_HOME/config.toml`.

use crate::cli::SetDefaultBuilderArgs;
use crate::commands::shared::terminal;
use pack_core::config::PackConfig;
use pack_core::errors::Result;

pub fn run(args: SetDefaultBuilderArgs, no_color: bool) -> Result<()> {
    let mut config = PackConfig::load()?;
    config.default_builder_image = Some(args.image.clone());
    config.save(&PackConfig::config_path()?)?;

    terminal::success(no_color, &format!("Builder '{}' is now the default builder", args.image));
    Ok(())
}
