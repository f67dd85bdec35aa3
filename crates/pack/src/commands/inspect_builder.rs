//! `pack inspect-builder` — print a builder image's stack, run image,
//! mirrors, and lifecycle version.

use crate::cli::InspectBuilderArgs;
use crate::commands::shared;
use pack_core::errors::Result;

pub async fn run(args: InspectBuilderArgs, _no_color: bool, verbose: bool) -> Result<()> {
    let client = shared::client(verbose);
    let report = client.inspect_builder(&args.reference, !args.remote).await?;

    println!("Inspecting builder: {}", report.name);
    println!();
    if !report.description.is_empty() {
        println!("Description: {}", report.description);
        println!();
    }
    println!("Stack: {}", report.stack_id);
    println!();
    println!("Run Images:");
    println!("  {}", report.run_image);
    for mirror in &report.run_image_mirrors {
        println!("  {mirror}");
    }
    println!();
    println!(
        "Lifecycle Version: {} (Buildpack API {}, Platform API {})",
        report.lifecycle.version, report.lifecycle.buildpack_api_version, report.lifecycle.platform_api_version
    );
    Ok(())
}
