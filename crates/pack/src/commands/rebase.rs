//! `pack rebase` — swap an image's run-image layers without rerunning
//! detect/build.

use crate::cli::RebaseArgs;
use crate::commands::shared::{self, terminal};
use pack_core::errors::Result;
use pack_core::facade::RebaseOptions;
use tokio_util::sync::CancellationToken;

pub async fn run(args: RebaseArgs, no_color: bool, verbose: bool, cancel: CancellationToken) -> Result<()> {
    let opts = RebaseOptions {
        repo_name: args.image.clone(),
        new_run_image: args.run_image.clone(),
        publish: args.publish,
        no_pull: args.no_pull,
    };

    let client = shared::client(verbose);
    let report = client.rebase(&opts, cancel).await?;

    terminal::success(
        no_color,
        &format!(
            "Successfully rebased image '{}' onto run image '{}'",
            report.repo_name, report.run_image
        ),
    );
    Ok(())
}
