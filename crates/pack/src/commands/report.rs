//! `pack report` — environment diagnostics for bug reports: pack version,
//! default builder, OS/arch, and Docker daemon reachability.

use pack_core::config::PackConfig;
use pack_core::docker::{CliDocker, Docker};
use pack_core::errors::Result;

pub async fn run(verbose: bool) -> Result<()> {
    let _ = verbose;
    let config = PackConfig::load()?;
    let docker = CliDocker::new();
    let docker_status = match docker.ping().await {
        Ok(()) => "available".to_string(),
        Err(e) => format!("unavailable ({e})"),
    };

    println!("Pack:");
    println!("  Version: {}", pack_core::version());
    println!("  Default Builder: {}", config.default_builder_image.as_deref().unwrap_or("(none)"));
    println!();
    println!("Platform:");
    println!("  OS/Arch: {}/{}", std::env::consts::OS, std::env::consts::ARCH);
    println!();
    println!("Docker:");
    println!("  Daemon: {docker_status}");
    Ok(())
}
