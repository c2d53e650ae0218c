//! Distro detection and package-manager command tables.
//!
//! The host family is derived from `/etc/os-release` (`ID` first, `ID_LIKE`
//! as fallback) and memoized for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistroFamily {
    ArchLike,
    DebianLike,
    FedoraLike,
    Unsupported,
}

impl DistroFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistroFamily::ArchLike => "arch",
            DistroFamily::DebianLike => "debian",
            DistroFamily::FedoraLike => "fedora",
            DistroFamily::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        *self != DistroFamily::Unsupported
    }
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse os-release into a key-value map
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }

    vars
}

fn family_of(id: &str) -> Option<DistroFamily> {
    match id {
        "arch" | "archlinux" | "manjaro" | "endeavouros" | "garuda" | "artix" | "cachyos" => {
            Some(DistroFamily::ArchLike)
        }
        "debian" | "ubuntu" | "linuxmint" | "mint" | "pop" | "elementary" | "kali"
        | "raspbian" | "zorin" => Some(DistroFamily::DebianLike),
        "fedora" | "rhel" | "centos" | "rocky" | "almalinux" | "nobara" => {
            Some(DistroFamily::FedoraLike)
        }
        _ => None,
    }
}

/// Classify os-release content into a package-management family.
pub fn classify(content: &str) -> DistroFamily {
    let vars = parse_os_release(content);

    if let Some(family) = vars.get("ID").and_then(|id| family_of(id)) {
        return family;
    }

    vars.get("ID_LIKE")
        .and_then(|like| like.split_whitespace().find_map(family_of))
        .unwrap_or(DistroFamily::Unsupported)
}

pub struct DistroResolver {
    paths: Vec<PathBuf>,
    resolved: OnceLock<DistroFamily>,
}

impl DistroResolver {
    pub fn new() -> Self {
        Self::with_paths(vec![
            PathBuf::from("/etc/os-release"),
            PathBuf::from("/usr/lib/os-release"),
        ])
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            resolved: OnceLock::new(),
        }
    }

    /// A resolver that never touches the filesystem.
    pub fn fixed(family: DistroFamily) -> Self {
        let resolver = Self::with_paths(Vec::new());
        let _ = resolver.resolved.set(family);
        resolver
    }

    pub fn resolve(&self) -> DistroFamily {
        *self.resolved.get_or_init(|| {
            let family = self
                .paths
                .iter()
                .find_map(|path| std::fs::read_to_string(path).ok())
                .map(|content| classify(&content))
                .unwrap_or(DistroFamily::Unsupported);
            tracing::info!(%family, "resolved distro family");
            family
        })
    }
}

impl Default for DistroResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// One command in a multi-step maintenance sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStep {
    pub label: String,
    pub argv: Vec<String>,
    /// Run through the privilege broker; AUR helpers must not run as root.
    pub privileged: bool,
    /// Runs as the user but calls `sudo -S` itself, so the password is fed on stdin.
    pub feeds_sudo: bool,
}

impl UpdateStep {
    fn privileged(label: &str, argv: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
            privileged: true,
            feeds_sudo: false,
        }
    }
}

/// Ordered package-manager invocations that bring the system up to date.
/// `aur_helpers` lists helpers known to be installed; they only apply to
/// Arch-like hosts.
pub fn update_sequence(family: DistroFamily, aur_helpers: &[String]) -> Vec<UpdateStep> {
    match family {
        DistroFamily::ArchLike => {
            let mut steps = vec![UpdateStep::privileged(
                "pacman -Syu",
                &["pacman", "-Syu", "--noconfirm"],
            )];
            // yay and paru both forward --sudoflags to their own sudo calls
            steps.extend(aur_helpers.iter().map(|helper| UpdateStep {
                label: format!("{helper} -Sua"),
                argv: vec![
                    helper.clone(),
                    "-Sua".into(),
                    "--noconfirm".into(),
                    "--sudoflags=-S".into(),
                ],
                privileged: false,
                feeds_sudo: true,
            }));
            steps
        }
        DistroFamily::DebianLike => vec![
            UpdateStep::privileged("apt update", &["apt-get", "update"]),
            UpdateStep::privileged("apt upgrade", &["apt-get", "upgrade", "-y"]),
        ],
        DistroFamily::FedoraLike => vec![UpdateStep::privileged(
            "dnf upgrade",
            &["dnf", "upgrade", "-y"],
        )],
        DistroFamily::Unsupported => Vec::new(),
    }
}

pub fn cache_clean_argv(family: DistroFamily) -> Option<Vec<String>> {
    let argv: &[&str] = match family {
        DistroFamily::ArchLike => &["pacman", "-Scc", "--noconfirm"],
        DistroFamily::DebianLike => &["apt-get", "clean"],
        DistroFamily::FedoraLike => &["dnf", "clean", "all"],
        DistroFamily::Unsupported => return None,
    };
    Some(argv.iter().map(|s| s.to_string()).collect())
}

/// How orphaned dependencies are removed on a given family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanPlan {
    /// List orphans first, then append each name to `remove` as its own argument.
    QueryThenRemove {
        query: Vec<String>,
        remove: Vec<String>,
    },
    /// The package manager resolves orphans itself.
    Direct(Vec<String>),
}

impl OrphanPlan {
    /// Removal argv for an already-resolved package list.
    pub fn removal_argv(&self, packages: &[String]) -> Vec<String> {
        match self {
            OrphanPlan::QueryThenRemove { remove, .. } => {
                remove.iter().chain(packages.iter()).cloned().collect()
            }
            OrphanPlan::Direct(argv) => argv.clone(),
        }
    }
}

pub fn orphan_plan(family: DistroFamily) -> Option<OrphanPlan> {
    let strings = |argv: &[&str]| argv.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match family {
        DistroFamily::ArchLike => Some(OrphanPlan::QueryThenRemove {
            query: strings(&["pacman", "-Qdtq"]),
            remove: strings(&["pacman", "-Rns", "--noconfirm"]),
        }),
        DistroFamily::DebianLike => Some(OrphanPlan::Direct(strings(&[
            "apt-get",
            "autoremove",
            "-y",
        ]))),
        DistroFamily::FedoraLike => Some(OrphanPlan::Direct(strings(&[
            "dnf",
            "autoremove",
            "-y",
        ]))),
        DistroFamily::Unsupported => None,
    }
}

/// Package names as printed by `pacman -Qq`; anything else is rejected.
pub fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@'))
}

pub fn install_argv(family: DistroFamily, package: &str) -> Option<Vec<String>> {
    let prefix: &[&str] = match family {
        DistroFamily::ArchLike => &["pacman", "-S", "--noconfirm"],
        DistroFamily::DebianLike => &["apt-get", "install", "-y"],
        DistroFamily::FedoraLike => &["dnf", "install", "-y"],
        DistroFamily::Unsupported => return None,
    };
    let mut argv: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
    argv.push(package.to_string());
    Some(argv)
}

/// Install argv for the prompt helper itself. Runs under pkexec because the
/// sudo prompt is exactly what is missing.
pub fn remediation_argv(family: DistroFamily, package: &str) -> Option<Vec<String>> {
    install_argv(family, package).map(|argv| {
        std::iter::once("pkexec".to_string())
            .chain(argv)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify_by_id() {
        assert_eq!(classify("ID=arch\n"), DistroFamily::ArchLike);
        assert_eq!(classify("ID=\"ubuntu\"\n"), DistroFamily::DebianLike);
        assert_eq!(classify("ID=fedora\n"), DistroFamily::FedoraLike);
    }

    #[test]
    fn test_classify_falls_back_to_id_like() {
        let content = "NAME=\"Some Spin\"\nID=somespin\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(classify(content), DistroFamily::DebianLike);
        assert_eq!(classify("ID=gentoo\n"), DistroFamily::Unsupported);
        assert_eq!(classify(""), DistroFamily::Unsupported);
    }

    #[test]
    fn test_supported_families_have_non_empty_sequences() {
        for family in [
            DistroFamily::ArchLike,
            DistroFamily::DebianLike,
            DistroFamily::FedoraLike,
        ] {
            let steps = update_sequence(family, &[]);
            assert!(!steps.is_empty(), "{family} has no update steps");
            assert!(steps[0].privileged);
        }
        assert!(update_sequence(DistroFamily::Unsupported, &["yay".into()]).is_empty());
    }

    #[test]
    fn test_debian_sequence_order() {
        let steps = update_sequence(DistroFamily::DebianLike, &[]);
        let labels: Vec<_> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["apt update", "apt upgrade"]);
        assert_eq!(steps[0].argv, vec!["apt-get", "update"]);
        assert_eq!(steps[1].argv, vec!["apt-get", "upgrade", "-y"]);
    }

    #[test]
    fn test_aur_helpers_run_unprivileged_after_pacman() {
        let steps = update_sequence(DistroFamily::ArchLike, &["paru".to_string()]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].argv[0], "pacman");
        assert_eq!(
            steps[1].argv,
            vec!["paru", "-Sua", "--noconfirm", "--sudoflags=-S"]
        );
        assert!(!steps[1].privileged);
        assert!(steps[1].feeds_sudo);
        assert!(!steps[0].feeds_sudo);
    }

    #[test]
    fn test_orphan_removal_uses_discrete_arguments() {
        let plan = orphan_plan(DistroFamily::ArchLike).unwrap();
        let argv = plan.removal_argv(&["libfoo".to_string(), "python-bar".to_string()]);
        assert_eq!(
            argv,
            vec!["pacman", "-Rns", "--noconfirm", "libfoo", "python-bar"]
        );
    }

    #[test]
    fn test_package_name_filter() {
        assert!(is_package_name("lib32-gcc-libs"));
        assert!(is_package_name("gtk+3"));
        assert!(!is_package_name("$(rm -rf ~)"));
        assert!(!is_package_name("--root=/"));
        assert!(!is_package_name(""));
    }

    #[test]
    fn test_remediation_goes_through_pkexec() {
        assert_eq!(
            remediation_argv(DistroFamily::FedoraLike, "zenity").unwrap(),
            vec!["pkexec", "dnf", "install", "-y", "zenity"]
        );
        assert!(remediation_argv(DistroFamily::Unsupported, "zenity").is_none());
    }

    #[test]
    fn test_resolver_reads_first_existing_file_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ID=manjaro").unwrap();
        let resolver = DistroResolver::with_paths(vec![
            PathBuf::from("/nonexistent/os-release"),
            file.path().to_path_buf(),
        ]);
        assert_eq!(resolver.resolve(), DistroFamily::ArchLike);

        // Memoized: rewriting the file does not change the answer.
        std::fs::write(file.path(), "ID=fedora\n").unwrap();
        assert_eq!(resolver.resolve(), DistroFamily::ArchLike);
    }

    #[test]
    fn test_fixed_resolver() {
        assert_eq!(
            DistroResolver::fixed(DistroFamily::DebianLike).resolve(),
            DistroFamily::DebianLike
        );
    }
}
