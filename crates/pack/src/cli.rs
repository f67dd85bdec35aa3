//! Command-line surface: flags, subcommands, and dispatch into
//! `crates/pack/src/commands`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Build, rebase, and package OCI images from application source via buildpacks",
    propagate_version = true
)]
pub struct Cli {
    /// Disable ANSI color output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Stream lifecycle phase logs at debug verbosity.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an OCI image from application source.
    Build(BuildArgs),
    /// Rebase an image's run-image layers without rerunning detect/build.
    Rebase(RebaseArgs),
    /// Assemble a builder image from a builder.toml.
    CreateBuilder(CreateBuilderArgs),
    /// Assemble a buildpackage image or `.cnb` file from a package.toml.
    PackageBuildpack(PackageBuildpackArgs),
    /// Persist a builder reference as the default builder in config.toml.
    SetDefaultBuilder(SetDefaultBuilderArgs),
    /// Persist run-image mirrors for an image in config.toml.
    SetRunImageMirrors(SetRunImageMirrorsArgs),
    /// Print a builder image's stack, run image, mirrors, and lifecycle.
    InspectBuilder(InspectBuilderArgs),
    /// Print an image's buildpacks-related labels.
    InspectImage(InspectImageArgs),
    /// List suggested builders (not implemented in this build).
    SuggestBuilders,
    /// List suggested stacks (not implemented in this build).
    SuggestStacks,
    /// Print diagnostics: pack version, default builder, OS/arch, daemon status.
    Report,
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Name (and optionally tag) of the image to produce.
    pub image: String,

    /// Application source directory.
    #[arg(short = 'p', long, default_value = ".")]
    pub path: PathBuf,

    /// Builder image to run detect/build against.
    #[arg(short = 'B', long)]
    pub builder: Option<String>,

    /// Override the run image the builder would otherwise select.
    #[arg(long)]
    pub run_image: Option<String>,

    /// Environment variable to pass into detect/build, `KEY=VALUE`.
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// File of `KEY=VALUE` lines to pass into detect/build.
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Push the built image to a registry instead of the local daemon.
    #[arg(long)]
    pub publish: bool,

    /// Never pull the builder/run images; fail if they're absent locally.
    #[arg(long)]
    pub no_pull: bool,

    /// Skip restore, discarding any existing build cache.
    #[arg(long)]
    pub clear_cache: bool,

    /// Additional buildpack to include, as a local path. Repeatable.
    #[arg(short, long = "buildpack")]
    pub buildpack: Vec<PathBuf>,

    /// Docker network mode for detect/build containers.
    #[arg(long, default_value = "default")]
    pub network: String,

    /// Extra `source:target[:ro]` volume to bind into detect/build.
    #[arg(long = "volume")]
    pub volume: Vec<String>,

    /// Path to a `project.toml`, overriding the one inferred from `--path`.
    #[arg(short, long)]
    pub descriptor: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RebaseArgs {
    /// Image to rebase.
    pub image: String,

    /// Run image to rebase onto.
    #[arg(long)]
    pub run_image: String,

    /// Never pull the image/run image; fail if they're absent locally.
    #[arg(long)]
    pub no_pull: bool,

    /// Push the rebased image to a registry instead of the local daemon.
    #[arg(long)]
    pub publish: bool,
}

#[derive(clap::Args, Debug)]
pub struct CreateBuilderArgs {
    /// Name of the builder image to produce.
    pub image: String,

    /// Path to the `builder.toml` describing this builder.
    #[arg(short = 'b', long)]
    pub builder_config: PathBuf,

    /// Push the builder image to a registry instead of the local daemon.
    #[arg(long)]
    pub publish: bool,

    /// Never pull the build image or referenced buildpack images.
    #[arg(long)]
    pub no_pull: bool,
}

#[derive(clap::Args, Debug)]
pub struct PackageBuildpackArgs {
    /// Name of the buildpackage image (or `.cnb` file path) to produce.
    pub name: String,

    /// Path to the `package.toml` describing this package.
    #[arg(short = 'p', long = "config")]
    pub config: PathBuf,

    /// Push the package image to a registry instead of the local daemon.
    #[arg(long)]
    pub publish: bool,

    /// Never pull referenced buildpack/package images.
    #[arg(long)]
    pub no_pull: bool,

    /// Write a standalone `.cnb` file at this path instead of an image.
    #[arg(long)]
    pub cnb_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SetDefaultBuilderArgs {
    /// Builder image reference to persist as the default.
    pub image: String,
}

#[derive(clap::Args, Debug)]
pub struct SetRunImageMirrorsArgs {
    /// Run image to configure mirrors for.
    pub image: String,

    /// Mirror image reference. Repeatable.
    #[arg(short, long = "mirror")]
    pub mirror: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct InspectBuilderArgs {
    /// Builder image reference to inspect.
    pub reference: String,

    /// Inspect the registry copy instead of the local daemon's.
    #[arg(long)]
    pub remote: bool,
}

#[derive(clap::Args, Debug)]
pub struct InspectImageArgs {
    /// Image reference to inspect.
    pub reference: String,

    /// Inspect the registry copy instead of the local daemon's.
    #[arg(long)]
    pub remote: bool,
}
