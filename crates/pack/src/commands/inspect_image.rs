//! `pack inspect-image` — print an app image's buildpacks-related labels.

use crate::cli::InspectImageArgs;
use crate::commands::shared;
use pack_core::errors::Result;

pub async fn run(args: InspectImageArgs, _no_color: bool, verbose: bool) -> Result<()> {
    let client = shared::client(verbose);
    let report = client.inspect_image(&args.reference, !args.remote).await?;

    println!("Inspecting image: {}", report.name);
    println!();
    if report.labels.is_empty() {
        println!("(no buildpacks labels found; is this an app image built with pack?)");
        return Ok(());
    }
    let mut keys: Vec<&String> = report.labels.keys().collect();
    keys.sort();
    for key in keys {
        println!("{key}:");
        println!("  {}", report.labels[key]);
    }
    Ok(())
}
