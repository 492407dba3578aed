//! Property-based tests: shell quoting, template substitution, enum
//! round-trips, and yum output parsing under generated input.

use proptest::prelude::*;

use notebook_provision::os_packages::parse_available_versions;
use notebook_provision::{
    marker_path, r_kernel_spec, shell_quote, Application, PkgRequest, PkgStatusKind,
};
use strum::IntoEnumIterator;

/// Minimal POSIX word parser: single quotes and backslash escapes, the only
/// two forms `shell_quote` ever emits.
fn sh_unquote(quoted: &str) -> String {
    let mut out = String::new();
    let mut chars = quoted.chars();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '\'' {
                in_quotes = false;
            } else {
                out.push(c);
            }
        } else if c == '\'' {
            in_quotes = true;
        } else if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

proptest! {
    /// Quoting then shell-parsing is the identity for any string.
    #[test]
    fn shell_quote_roundtrip(value in ".*") {
        let quoted = shell_quote(&value);
        prop_assert_eq!(sh_unquote(&quoted), value);
    }

    /// Safe strings pass through unchanged.
    #[test]
    fn shell_quote_passthrough(value in "[A-Za-z0-9_./:-]{1,40}") {
        prop_assert_eq!(shell_quote(&value), value);
    }

    /// Quoted output never exposes shell metacharacters outside quotes.
    #[test]
    fn shell_quote_neutralizes_metacharacters(value in ".*") {
        let quoted = shell_quote(&value);
        let mut in_quotes = false;
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            if in_quotes {
                if c == '\'' {
                    in_quotes = false;
                }
                continue;
            }
            match c {
                '\'' => in_quotes = true,
                '\\' => { chars.next(); }
                _ => prop_assert!(
                    !matches!(c, '$' | '`' | ';' | '|' | '&' | '>' | '<' | '*' | '(' | ')' | ' '),
                    "unquoted metacharacter {:?} in {:?}", c, quoted
                ),
            }
        }
        prop_assert!(!in_quotes, "unbalanced quotes in {:?}", quoted);
    }
}

proptest! {
    /// Rendered kernel specs never leak a substitution token.
    #[test]
    fn kernel_spec_consumes_all_tokens(
        r_version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        spark_version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
    ) {
        let spec = r_kernel_spec(&r_version, &spark_version).unwrap();
        prop_assert!(!spec.contains("R_VER"));
        prop_assert!(!spec.contains("SP_VER"));
        prop_assert!(spec.contains(&r_version));
        prop_assert!(spec.contains(&spark_version));
    }
}

fn application_strategy() -> impl Strategy<Value = Application> {
    prop_oneof![
        Just(Application::Jupyter),
        Just(Application::Zeppelin),
        Just(Application::Tensor),
        Just(Application::DeepLearning),
        Just(Application::Rstudio),
    ]
}

proptest! {
    /// Application: to_string → parse round-trip is identity.
    #[test]
    fn application_roundtrip(app in application_strategy()) {
        let s = app.to_string();
        let parsed: Application = s.parse().expect("should parse");
        prop_assert_eq!(app, parsed);
    }

    /// Application: Display output is non-empty lowercase.
    #[test]
    fn application_display_is_lowercase(app in application_strategy()) {
        let s = app.to_string();
        prop_assert!(!s.is_empty());
        let lowercase = s.to_lowercase();
        prop_assert_eq!(s, lowercase);
    }
}

#[test]
fn every_application_roundtrips_through_serde() {
    for app in Application::iter() {
        let json = serde_json::to_string(&app).unwrap();
        let back: Application = serde_json::from_str(&json).unwrap();
        assert_eq!(app, back);
    }
}

proptest! {
    /// PkgStatusKind: to_string → parse round-trip is identity.
    #[test]
    fn pkg_status_kind_roundtrip(kind in prop_oneof![
        Just(PkgStatusKind::Installed),
        Just(PkgStatusKind::InstallationError),
        Just(PkgStatusKind::InvalidVersion),
        Just(PkgStatusKind::InvalidName),
    ]) {
        let s = kind.to_string();
        let parsed: PkgStatusKind = s.parse().expect("should parse");
        prop_assert_eq!(kind, parsed);
    }
}

proptest! {
    /// Marker paths are rooted in the user's ensure directory and carry the
    /// `_ensured` suffix, whatever the step name.
    #[test]
    fn marker_path_shape(
        user in "[a-z][a-z0-9-]{0,15}",
        step in "[a-z][a-z0-9_]{0,20}",
    ) {
        let path = marker_path(&user, &step);
        let expected_prefix = format!("/home/{}/.ensure_dir/", user);
        prop_assert!(path.starts_with(&expected_prefix));
        prop_assert!(path.ends_with("_ensured"));
    }

    /// Spec strings join name and version with a dash only when pinned.
    #[test]
    fn pkg_request_spec_shape(
        name in "[a-z][a-z0-9-]{0,15}",
        version in prop_oneof![Just(String::new()), "[0-9]\\.[0-9]\\.[0-9]".prop_map(String::from)],
    ) {
        let req = PkgRequest::new(name.as_str(), version.as_str());
        if version.is_empty() {
            prop_assert_eq!(req.spec(), name);
        } else {
            prop_assert_eq!(req.spec(), format!("{}-{}", name, version));
        }
    }
}

proptest! {
    /// Generated `--showduplicates` listings parse back exactly the versions
    /// offered for the requested name.
    #[test]
    fn available_versions_recovers_listing(
        versions in prop::collection::vec("[0-9]\\.[0-9]{1,2}\\.[0-9]", 1..5),
    ) {
        let listing: String = versions
            .iter()
            .map(|v| format!("htop.x86_64    {}-1.el7    epel\n", v))
            .collect();
        let parsed = parse_available_versions(&listing, "htop");
        prop_assert_eq!(parsed, versions);
    }
}
