//! OS package installation and outcome classification
//!
//! Unlike the provisioning steps, package installation never aborts a batch:
//! every requested package gets a [`PkgStatus`] record classifying what
//! happened to it, and the caller decides what a partial failure means.
//!
//! Classification is string processing over captured yum output. The rules
//! are fixed: a known set of error markers, the `No package ... available.`
//! probe for bad names/versions, and the `Dependency Installed:` block for
//! dependencies yum pulled in alongside the request.

use crate::error::{ProvisionError, Result};
use crate::session::{CommandOutput, RemoteCommand, Session};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Substrings that flag an installation error anywhere in yum output.
/// Matched word-bounded, the way `grep -w` would.
const ERROR_MARKERS: &[&str] = &[
    "Could not",
    "No matching",
    "Error:",
    "failed",
    "Requires:",
    "Errno",
];

/// Header of the block listing dependencies yum installed alongside the
/// requested package.
const DEPENDENCY_HEADER: &str = "Dependency Installed:";

/// Footer that terminates a successful transaction report.
const COMPLETE_FOOTER: &str = "Complete!";

/// Marker yum prints when no version list exists for a name.
const NO_MATCHING_LIST: &str = "Error: No matching Packages to list";

/// Outcome classification for one requested package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PkgStatusKind {
    Installed,
    InstallationError,
    InvalidVersion,
    InvalidName,
}

/// Status record for one requested package.
///
/// Constructed once per request, appended to the result list, never mutated
/// afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkgStatus {
    pub group: String,
    pub name: String,
    pub version: String,
    pub status: PkgStatusKind,
    pub error_message: String,
    /// Dependencies yum pulled in, as `<name> v.<version>` strings.
    pub add_pkgs: Vec<String>,
    /// Alternate versions discovered when the requested one does not exist.
    pub available_versions: Vec<String>,
}

impl PkgStatus {
    fn new(name: &str, version: &str, status: PkgStatusKind) -> Self {
        Self {
            group: "os_pkg".to_string(),
            name: name.to_string(),
            version: version.to_string(),
            status,
            error_message: String::new(),
            add_pkgs: Vec::new(),
            available_versions: Vec::new(),
        }
    }
}

/// A requested package: name plus optional version pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgRequest {
    pub name: String,
    pub version: Option<String>,
}

impl PkgRequest {
    /// Build a request; empty and `N/A` versions mean "latest".
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        let version = match version.as_str() {
            "" | "N/A" => None,
            _ => Some(version),
        };
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse a CLI spec of the form `name` or `name=version`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('=') {
            Some((name, version)) => Self::new(name, version),
            None => Self::new(spec, ""),
        }
    }

    /// The yum install spec: `name` or `name-version`.
    pub fn spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}", self.name, version),
            None => self.name.clone(),
        }
    }

    /// Pinned version or `N/A`, for status records.
    fn version_label(&self) -> &str {
        self.version.as_deref().unwrap_or("N/A")
    }
}

/// Run a yum command as root.
///
/// The locale is pinned so the output stays parseable whatever the host's
/// language settings are.
pub fn yum(session: &dyn Session, args: &[&str]) -> Result<CommandOutput> {
    session.sudo(
        &RemoteCommand::new("yum")
            .args(args.iter().copied())
            .env("LC_ALL", "C"),
    )
}

/// Apply pending security updates before touching the package set.
fn refresh_security_updates(session: &dyn Session) -> Result<()> {
    yum(
        session,
        &["update-minimal", "--security", "-y", "--skip-broken"],
    )?
    .ensure_success("yum security update")
}

/// Install a batch of packages, classifying each outcome individually.
///
/// A transport-level failure (the session itself breaking) marks the current
/// and remaining packages `installation_error` rather than aborting.
pub fn install_os_pkgs(session: &dyn Session, requisites: &[PkgRequest]) -> Vec<PkgStatus> {
    info!(
        "Updating repositories and installing requested tools: {:?}",
        requisites.iter().map(PkgRequest::spec).collect::<Vec<_>>()
    );

    let mut statuses = Vec::with_capacity(requisites.len());

    if let Err(e) = refresh_security_updates(session) {
        warn!("Security update pass failed: {}", e);
        for req in requisites {
            let mut status =
                PkgStatus::new(&req.name, req.version_label(), PkgStatusKind::InstallationError);
            status.error_message = e.to_string();
            statuses.push(status);
        }
        return statuses;
    }

    for (idx, req) in requisites.iter().enumerate() {
        match classify_install(session, req) {
            Ok(status) => statuses.push(status),
            Err(e) => {
                warn!("Failed to install OS package {}: {}", req.spec(), e);
                // Session is gone; fill in the rest without more remote calls
                for rest in &requisites[idx..] {
                    let mut status = PkgStatus::new(
                        &rest.name,
                        rest.version_label(),
                        PkgStatusKind::InstallationError,
                    );
                    status.error_message = e.to_string();
                    statuses.push(status);
                }
                break;
            }
        }
    }

    statuses
}

/// Install one package and classify the outcome from captured output.
fn classify_install(session: &dyn Session, req: &PkgRequest) -> Result<PkgStatus> {
    let spec = req.spec();
    let out = yum(session, &["-y", "install", &spec, "--nogpgcheck"])?;
    let combined = combine_output(&out);

    // Bad name or version beats the generic error markers, which co-occur
    if combined.contains(&format!("No package {} available", spec)) {
        let list = yum(session, &["--showduplicates", "list", &req.name])?;
        let versions = parse_available_versions(&combine_output(&list), &req.name);
        let mut status = if versions.is_empty() {
            PkgStatus::new(&req.name, req.version_label(), PkgStatusKind::InvalidName)
        } else {
            let mut s =
                PkgStatus::new(&req.name, req.version_label(), PkgStatusKind::InvalidVersion);
            s.available_versions = versions;
            s
        };
        status.error_message = collect_error_lines(&combined);
        return Ok(status);
    }

    let error_message = collect_error_lines(&combined);
    if !error_message.is_empty() {
        let mut status =
            PkgStatus::new(&req.name, req.version_label(), PkgStatusKind::InstallationError);
        status.error_message = error_message;
        status.add_pkgs = parse_dependency_block(&combined);
        return Ok(status);
    }

    match installed_version(session, &req.name)? {
        Some(version) => {
            let mut status = PkgStatus::new(&req.name, &version, PkgStatusKind::Installed);
            status.add_pkgs = parse_dependency_block(&combined);
            Ok(status)
        }
        None => {
            let mut status =
                PkgStatus::new(&req.name, req.version_label(), PkgStatusKind::InstallationError);
            status.error_message = format!("{} not present after install", req.name);
            Ok(status)
        }
    }
}

/// Installed version of a package, if any.
fn installed_version(session: &dyn Session, name: &str) -> Result<Option<String>> {
    let out = session.sudo(
        &RemoteCommand::new("rpm")
            .arg("-q")
            .arg("--queryformat")
            .arg("%{VERSION}")
            .arg(name),
    )?;
    if out.success {
        Ok(Some(out.trimmed_stdout().to_string()))
    } else {
        Ok(None)
    }
}

/// Remove packages; all or nothing.
pub fn remove_os_pkgs(session: &dyn Session, names: &[String]) -> Result<()> {
    let mut args = vec!["remove", "-y"];
    args.extend(names.iter().map(String::as_str));
    yum(session, &args)?.ensure_success("yum remove")
}

/// Map of available package name to version, from `yum -q list available`.
pub fn get_available_os_pkgs(session: &dyn Session) -> Result<BTreeMap<String, String>> {
    refresh_security_updates(session)?;
    let out = yum(session, &["-q", "list", "available"])?;
    if !out.success {
        return Err(ProvisionError::packages(format!(
            "failed to list available packages: {}",
            out.stderr.trim()
        )));
    }
    Ok(parse_available_list(&out.stdout))
}

fn combine_output(out: &CommandOutput) -> String {
    if out.stderr.is_empty() {
        out.stdout.clone()
    } else {
        format!("{}\n{}", out.stdout, out.stderr)
    }
}

/// Word-bounded marker search, the way `grep -w -E` treats the marker set.
fn line_has_error_marker(line: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| {
        let mut start = 0;
        while let Some(pos) = line[start..].find(marker) {
            let begin = start + pos;
            let end = begin + marker.len();
            let before_ok = begin == 0
                || !line[..begin]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            let after_ok = end == line.len()
                || !line[end..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if before_ok && after_ok {
                return true;
            }
            start = end;
        }
        false
    })
}

/// Every output line carrying an error marker, joined for the status record.
fn collect_error_lines(output: &str) -> String {
    output
        .lines()
        .filter(|line| line_has_error_marker(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip epoch and release from a yum version string: `1:2.7.5-68.el7` → `2.7.5`.
fn normalize_version(raw: &str) -> String {
    let without_epoch = raw.split_once(':').map_or(raw, |(_, rest)| rest);
    without_epoch
        .split_once('-')
        .map_or(without_epoch, |(version, _)| version)
        .to_string()
}

/// Scrape the `Dependency Installed:` block into `<name> v.<version>` entries.
///
/// The block lists `name.arch  epoch:version-release` pairs, several per
/// line, until `Complete!` or end of output.
pub fn parse_dependency_block(output: &str) -> Vec<String> {
    let Some(start) = output.find(DEPENDENCY_HEADER) else {
        return Vec::new();
    };
    let block = &output[start + DEPENDENCY_HEADER.len()..];
    let block = block
        .find(COMPLETE_FOOTER)
        .map_or(block, |end| &block[..end]);

    let tokens: Vec<&str> = block.split_whitespace().collect();
    tokens
        .chunks_exact(2)
        .filter_map(|pair| {
            let name = pair[0].rsplit_once('.').map_or(pair[0], |(name, _)| name);
            if name.is_empty() {
                None
            } else {
                Some(format!("{} v.{}", name, normalize_version(pair[1])))
            }
        })
        .collect()
}

/// Versions offered by `yum --showduplicates list <name>`, normalized.
pub fn parse_available_versions(output: &str, name: &str) -> Vec<String> {
    if output.contains(NO_MATCHING_LIST) {
        return Vec::new();
    }
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pkg = fields.next()?;
            let version = fields.next()?;
            // Package column is `name.arch`
            let stem = pkg.rsplit_once('.').map_or(pkg, |(stem, _)| stem);
            if stem == name {
                Some(normalize_version(version))
            } else {
                None
            }
        })
        .collect()
}

/// Parse `yum -q list available` columns into a name → version map.
///
/// yum wraps long package names onto their own line, so the parse works over
/// the token stream in (name.arch, version, repo) triples rather than
/// line-by-line.
fn parse_available_list(output: &str) -> BTreeMap<String, String> {
    let tokens: Vec<&str> = output
        .lines()
        .filter(|line| !line.starts_with("Available Packages"))
        .flat_map(str::split_whitespace)
        .collect();

    let mut map = BTreeMap::new();
    for triple in tokens.chunks_exact(3) {
        let name = triple[0].rsplit_once('.').map_or(triple[0], |(n, _)| n);
        if !name.is_empty() {
            map.insert(name.to_string(), normalize_version(triple[1]));
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkg_request_parse() {
        let plain = PkgRequest::parse("htop");
        assert_eq!(plain.name, "htop");
        assert_eq!(plain.version, None);
        assert_eq!(plain.spec(), "htop");

        let pinned = PkgRequest::parse("R-core=3.4.1");
        assert_eq!(pinned.name, "R-core");
        assert_eq!(pinned.version.as_deref(), Some("3.4.1"));
        assert_eq!(pinned.spec(), "R-core-3.4.1");

        let latest = PkgRequest::parse("R-core=N/A");
        assert_eq!(latest.version, None);
    }

    #[test]
    fn test_error_marker_is_word_bounded() {
        assert!(line_has_error_marker("Error: Nothing to do"));
        assert!(line_has_error_marker("Transaction failed"));
        assert!(line_has_error_marker("--> Requires: libpng15.so.15"));
        assert!(line_has_error_marker("[Errno 14] curl error"));
        // "failed" inside a longer word must not match
        assert!(!line_has_error_marker("checking unfailedness"));
        assert!(!line_has_error_marker("Resolving dependencies"));
    }

    #[test]
    fn test_collect_error_lines() {
        let output = "Resolving Dependencies\nError: Package: R-core-3.4.1\n--> Requires: libicu\nComplete!";
        let collected = collect_error_lines(output);
        assert_eq!(
            collected,
            "Error: Package: R-core-3.4.1\n--> Requires: libicu"
        );
        assert!(collect_error_lines("Installed:\n  cmake.x86_64\nComplete!").is_empty());
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2.7.5-68.el7"), "2.7.5");
        assert_eq!(normalize_version("1:2.7.5-68.el7"), "2.7.5");
        assert_eq!(normalize_version("3.4.1"), "3.4.1");
    }

    #[test]
    fn test_parse_dependency_block() {
        let output = "\
Running transaction
  Installing : R-core-3.4.1-1.el7.x86_64

Installed:
  R.x86_64 0:3.4.1-1.el7

Dependency Installed:
  R-core.x86_64 0:3.4.1-1.el7          R-core-devel.x86_64 0:3.4.1-1.el7
  libicu-devel.x86_64 0:50.2-4.el7_7

Complete!
";
        let deps = parse_dependency_block(output);
        assert_eq!(
            deps,
            vec![
                "R-core v.3.4.1",
                "R-core-devel v.3.4.1",
                "libicu-devel v.50.2",
            ]
        );
    }

    #[test]
    fn test_parse_dependency_block_absent() {
        assert!(parse_dependency_block("Installed:\n  cmake.x86_64\nComplete!").is_empty());
    }

    #[test]
    fn test_parse_available_versions() {
        let output = "\
Loaded plugins: fastestmirror
Available Packages
nodejs.x86_64        1:6.17.1-1nodesource      nodesource
nodejs.x86_64        2:8.17.0-1nodesource      nodesource
npm.x86_64           3.10.10-1                 nodesource
";
        let versions = parse_available_versions(output, "nodejs");
        assert_eq!(versions, vec!["6.17.1", "8.17.0"]);
    }

    #[test]
    fn test_parse_available_versions_no_matching() {
        let output = "Error: No matching Packages to list\n";
        assert!(parse_available_versions(output, "nosuchpkg").is_empty());
    }

    #[test]
    fn test_parse_available_list_handles_wrapped_names() {
        let output = "\
Available Packages
cmake.x86_64                      2.8.12.2-2.el7             base
java-1.8.0-openjdk-accessibility.x86_64
                                  1:1.8.0.242.b08-0.el7_7    updates
zlib-devel.x86_64                 1.2.7-18.el7               base
";
        let map = parse_available_list(output);
        assert_eq!(map.get("cmake").map(String::as_str), Some("2.8.12.2"));
        assert_eq!(
            map.get("java-1.8.0-openjdk-accessibility").map(String::as_str),
            Some("1.8.0.242.b08")
        );
        assert_eq!(map.get("zlib-devel").map(String::as_str), Some("1.2.7"));
    }

    #[test]
    fn test_pkg_request_spec() {
        assert_eq!(PkgRequest::new("htop", "").spec(), "htop");
        assert_eq!(PkgRequest::new("htop", "N/A").spec(), "htop");
        assert_eq!(PkgRequest::new("htop", "2.2.0").spec(), "htop-2.2.0");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let status = PkgStatus::new("htop", "2.2.0", PkgStatusKind::InvalidVersion);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "invalid_version");
        assert_eq!(json["group"], "os_pkg");
    }
}
