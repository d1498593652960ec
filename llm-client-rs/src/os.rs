// llm-client-rs/src/os.rs
// Operating system name given to the model

use std::fs;

const OS_RELEASE: &str = "/etc/os-release";

/// Human-readable name of the running operating system.
///
/// `NOVA_OS_DISTRO` wins when set. On Linux the `PRETTY_NAME` from
/// `/etc/os-release` is used, falling back to `"Linux"`.
pub fn detect_os_distro() -> String {
    if let Some(name) = config_rs::env_opt("NOVA_OS_DISTRO") {
        return name;
    }

    match std::env::consts::OS {
        "linux" => fs::read_to_string(OS_RELEASE)
            .ok()
            .and_then(|contents| parse_pretty_name(&contents))
            .unwrap_or_else(|| "Linux".to_string()),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

/// Extract `PRETTY_NAME` from os-release formatted text.
pub fn parse_pretty_name(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("PRETTY_NAME="))
        .map(|value| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .find(|value| !value.is_empty())
}
