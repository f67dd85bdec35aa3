//! One module per CLI subcommand, composing `pack_core::facade::PackClient`
//! plus the `shared` helpers. Mirrors this crate's
//! `commands/{build,up,down,...}.rs` split.

pub mod shared;

pub mod build;
pub mod create_builder;
pub mod inspect_builder;
pub mod inspect_image;
pub mod package_buildpack;
pub mod rebase;
pub mod report;
pub mod set_default_builder;
pub mod set_run_image_mirrors;
pub mod suggest_builders;
pub mod suggest_stacks;

use crate::cli::{Cli, Commands};
use pack_core::errors::Result;
use tokio_util::sync::CancellationToken;

pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let no_color = cli.no_color;
    let verbose = cli.verbose;
    match cli.command {
        Commands::Build(args) => build::run(args, no_color, verbose, cancel).await,
        Commands::Rebase(args) => rebase::run(args, no_color, verbose, cancel).await,
        Commands::CreateBuilder(args) => create_builder::run(args, no_color, verbose).await,
        Commands::PackageBuildpack(args) => package_buildpack::run(args, no_color, verbose).await,
        Commands::SetDefaultBuilder(args) => set_default_builder::run(args, no_color),
        Commands::SetRunImageMirrors(args) => set_run_image_mirrors::run(args, no_color),
        Commands::InspectBuilder(args) => inspect_builder::run(args, no_color, verbose).await,
        Commands::InspectImage(args) => inspect_image::run(args, no_color, verbose).await,
        Commands::SuggestBuilders => suggest_builders::run(),
        Commands::SuggestStacks => suggest_stacks::run(),
        Commands::Report => report::run(verbose).await,
    }
}
