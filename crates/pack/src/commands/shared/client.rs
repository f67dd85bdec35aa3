//! `PackClient` construction shared by every command.

use pack_core::docker::CliDocker;
use pack_core::facade::PackClient;
use pack_core::fetcher::RegistryClient;
use std::sync::Arc;

/// Build a `PackClient` wired to the `docker` CLI and an unauthenticated
/// registry client. Real credential resolution (Docker config's credential
/// store) is left to a future collaborator; every command shares this
/// single construction point so that seam has one place to grow.
pub fn client(verbose: bool) -> PackClient {
    let docker: Arc<dyn pack_core::docker::Docker> = Arc::new(CliDocker::new());
    PackClient::new(docker, RegistryClient::new(), verbose)
}
