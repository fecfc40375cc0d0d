// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider binary resolution: explicit env override, then PATH, then
//! well-known install locations. The chosen source is recorded so
//! diagnostics can say where a binary came from.

use std::path::{Path, PathBuf};

/// Where a provider binary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    EnvOverride,
    PathLookup,
    WellKnown,
}

jv_core::wire_label! {
    ResolutionSource {
        EnvOverride => "env override",
        PathLookup => "PATH",
        WellKnown => "well-known location",
    }
}

/// A resolved provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCommand {
    pub name: String,
    pub program: PathBuf,
    pub source: ResolutionSource,
}

impl ProviderCommand {
    /// The env var that overrides this provider's binary, e.g.
    /// `JEEVES_CLAUDE_BIN`.
    pub fn env_var(name: &str) -> String {
        format!("JEEVES_{}_BIN", name.to_uppercase().replace('-', "_"))
    }
}

/// Resolve a provider by name. Returns `None` when nothing is found; the
/// caller decides how to surface that (the supervisor reports it as a
/// provider error).
pub fn resolve_provider(name: &str) -> Option<ProviderCommand> {
    let env_var = ProviderCommand::env_var(name);
    if let Some(program) = std::env::var_os(&env_var).map(PathBuf::from) {
        tracing::debug!(provider = name, program = %program.display(), source = "env", "provider resolved");
        return Some(ProviderCommand {
            name: name.to_string(),
            program,
            source: ResolutionSource::EnvOverride,
        });
    }

    if let Some(program) = path_lookup(name) {
        tracing::debug!(provider = name, program = %program.display(), source = "PATH", "provider resolved");
        return Some(ProviderCommand {
            name: name.to_string(),
            program,
            source: ResolutionSource::PathLookup,
        });
    }

    for dir in well_known_dirs() {
        let candidate = dir.join(binary_name(name));
        if is_executable(&candidate) {
            tracing::debug!(provider = name, program = %candidate.display(), source = "well-known", "provider resolved");
            return Some(ProviderCommand {
                name: name.to_string(),
                program: candidate,
                source: ResolutionSource::WellKnown,
            });
        }
    }

    None
}

fn path_lookup(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let file = binary_name(name);
    std::env::split_paths(&path)
        .map(|dir| dir.join(&file))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn binary_name(name: &str) -> String {
    format!("{name}.exe")
}

#[cfg(not(windows))]
fn binary_name(name: &str) -> String {
    name.to_string()
}

fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        dirs.push(home.join(".local/bin"));
    }
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    if let Some(local) = std::env::var_os("LOCALAPPDATA").map(PathBuf::from) {
        dirs.push(local.join("Programs"));
    }
    dirs
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
