//! Image reference parsing utilities
//!
//! Shared parsing for the image references that flow through every command:
//! builder images, run images, buildpack package images, and the target
//! image a build produces. An `ImageReference` always carries a registry
//! host, a repository path, and either a tag or a digest (never both,
//! defaulting to `latest` when neither is given).

use std::fmt;

/// A parsed `[registry/]repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference, defaulting to the Docker Hub registry and an
    /// implicit `latest` tag the way `docker` itself resolves bare names.
    pub fn parse(reference: &str) -> Self {
        let default_registry = "index.docker.io";

        let parts: Vec<&str> = reference.split('/').collect();

        let (registry, repo_parts): (String, &[&str]) = match parts.as_slice() {
            [single] => (default_registry.to_string(), std::slice::from_ref(single)),
            [first, rest @ ..] if looks_like_registry(first) => (first.to_string(), rest),
            _ => (default_registry.to_string(), &parts[..]),
        };

        let name_and_tag = repo_parts.last().copied().unwrap_or("");
        let namespace = &repo_parts[..repo_parts.len().saturating_sub(1)];
        let (name, tag_or_digest) = split_name_and_tag(name_and_tag);

        let repository = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", namespace.join("/"), name)
        };

        let (tag, digest) = match tag_or_digest {
            Some(t) if t.starts_with("sha256:") => (None, Some(t.to_string())),
            Some(t) => (Some(t.to_string()), None),
            None => (Some("latest".to_string()), None),
        };

        ImageReference {
            registry,
            repository,
            tag,
            digest,
        }
    }

    /// The repository qualified with its registry, e.g. `ghcr.io/acme/app`.
    pub fn repository_with_registry(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)
        } else if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)
        } else {
            Ok(())
        }
    }
}

/// A registry host has a dot (e.g. `ghcr.io`) or a `host:port` shape
/// (e.g. `localhost:5000`); a bare namespace segment has neither.
fn looks_like_registry(s: &str) -> bool {
    if s.contains('.') || s == "localhost" {
        return true;
    }
    if let Some(colon_pos) = s.find(':') {
        let after_colon = &s[colon_pos + 1..];
        return !after_colon.is_empty() && after_colon.chars().all(|c| c.is_ascii_digit());
    }
    false
}

/// Split `name:tag`, `name@sha256:digest`, or bare `name` into `(name, Some(tag_or_digest))`.
fn split_name_and_tag(name_and_tag: &str) -> (&str, Option<&str>) {
    if let Some(at_pos) = name_and_tag.find('@') {
        return (&name_and_tag[..at_pos], Some(&name_and_tag[at_pos + 1..]));
    }
    if let Some(colon_pos) = name_and_tag.rfind(':') {
        return (
            &name_and_tag[..colon_pos],
            Some(&name_and_tag[colon_pos + 1..]),
        );
    }
    (name_and_tag, None)
}
