use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quarry_util::errors::QuarryError;
use quarry_util::hash::sha256_pairs;

/// Marker variables whose values are compared as versions rather than strings.
pub const VERSION_KEYS: [&str; 3] = [
    "python_version",
    "python_full_version",
    "implementation_version",
];

/// The target an install is resolved for: a flat map of marker variables.
///
/// Keys and values are kept sorted, so two environments with the same
/// variables always serialize and fingerprint identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Stable hex identifier of this environment.
    ///
    /// SHA-256 over the sorted `key=value` lines. Equal environments always
    /// produce equal fingerprints.
    pub fn fingerprint(&self) -> String {
        sha256_pairs(self.iter())
    }

    /// Platform variables of the running host.
    ///
    /// Interpreter variables such as `python_version` are not known here;
    /// callers add them with [`Environment::with`].
    pub fn current() -> Self {
        use std::env::consts::{ARCH, FAMILY, OS};

        let (sys_platform, platform_system) = match OS {
            "linux" => ("linux", "Linux"),
            "macos" => ("darwin", "Darwin"),
            "windows" => ("win32", "Windows"),
            "freebsd" => ("freebsd", "FreeBSD"),
            other => (other, other),
        };
        let os_name = if FAMILY == "windows" { "nt" } else { "posix" };
        let platform_machine = match (OS, ARCH) {
            ("windows", "x86_64") => "AMD64",
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        };

        Self::new()
            .with("sys_platform", sys_platform)
            .with("platform_system", platform_system)
            .with("os_name", os_name)
            .with("platform_machine", platform_machine)
    }

    /// Read a JSON object of string variables, e.g. a snapshot captured from
    /// a target interpreter.
    pub fn from_json(text: &str) -> Result<Self, QuarryError> {
        serde_json::from_str(text).map_err(|e| QuarryError::Generic {
            message: format!("Failed to parse environment snapshot: {e}"),
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.vars).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
