//! Platform capability profile.
//!
//! Every OS-specific decision the worker and its supervisor make lives here:
//! engine environment defaults, the font path separator, the engine library
//! layout under the resource directory and the dynamic loader variable. The
//! profile is chosen once at startup with [`PlatformProfile::detect`]; the
//! protocol state machine only calls its methods and never branches on the
//! target itself.
//!
//! # Supported Platforms
//!
//! - **Linux**: headless `svp` rendering backend
//! - **macOS**: native backend, engine polled on the calling thread
//! - **Windows**: headless backend, `;`-separated font paths

use crate::config::{ClientConfig, EngineEnv};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            HostOs::Linux
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else if cfg!(target_os = "windows") {
            HostOs::Windows
        } else {
            HostOs::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::MacOs => "macos",
            HostOs::Windows => "windows",
            HostOs::Other => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    os: HostOs,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::detect()
    }
}

impl PlatformProfile {
    /// Profile for the running process.
    pub fn detect() -> Self {
        Self::for_os(HostOs::current())
    }

    pub fn for_os(os: HostOs) -> Self {
        Self { os }
    }

    pub fn os(&self) -> HostOs {
        self.os
    }

    pub fn font_path_separator(&self) -> char {
        match self.os {
            HostOs::Windows => ';',
            _ => ':',
        }
    }

    /// `SAL_FONTPATH` value for a list of font directories.
    pub fn join_font_paths<S: AsRef<str>>(&self, paths: &[S]) -> Option<String> {
        let paths: Vec<&str> = paths
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.is_empty())
            .collect();
        if paths.is_empty() {
            return None;
        }
        Some(paths.join(&self.font_path_separator().to_string()))
    }

    /// Engine environment defaults for this platform.
    pub fn process_defaults(&self) -> Vec<(&'static str, &'static str)> {
        let mut defaults = Vec::with_capacity(2);
        match self.os {
            HostOs::MacOs => defaults.push((EngineEnv::LOK_OPTIONS, EngineEnv::UNIPOLL)),
            _ => defaults.push((EngineEnv::VCL_PLUGIN, EngineEnv::HEADLESS_PLUGIN)),
        }
        defaults.push((EngineEnv::LOG, EngineEnv::LOG_FILTER));
        defaults
    }

    /// Apply [`process_defaults`](Self::process_defaults) to the current
    /// process, leaving variables the caller already set untouched.
    ///
    /// Must run before any other thread is started. Returns the names that
    /// were set.
    pub fn apply_process_defaults(&self) -> Vec<&'static str> {
        let mut applied = Vec::new();
        for (key, value) in self.process_defaults() {
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
                applied.push(key);
            }
        }
        applied
    }

    /// Point the engine at additional font directories. Replaces any value
    /// set by an earlier call.
    pub fn apply_font_paths<S: AsRef<str>>(&self, paths: &[S]) -> Option<String> {
        let joined = self.join_font_paths(paths)?;
        std::env::set_var(EngineEnv::FONT_PATH, &joined);
        Some(joined)
    }

    /// Directory holding the engine libraries inside a resource tree.
    ///
    /// A macOS application bundle ships them under `Frameworks/`; every other
    /// layout uses `program/`.
    pub fn program_dir(&self, resource_path: &Path) -> PathBuf {
        if self.os == HostOs::MacOs {
            let frameworks = resource_path.join("Frameworks");
            if frameworks.is_dir() {
                return frameworks;
            }
        }
        resource_path.join("program")
    }

    /// Dynamic loader search variable, if the platform has one.
    pub fn library_path_var(&self) -> Option<&'static str> {
        match self.os {
            HostOs::Linux | HostOs::Other => Some("LD_LIBRARY_PATH"),
            HostOs::MacOs => Some("DYLD_LIBRARY_PATH"),
            HostOs::Windows => None,
        }
    }

    /// Loader search path with `dirs` prepended to `existing`.
    pub fn library_search_path(
        &self,
        dirs: &[PathBuf],
        existing: Option<OsString>,
    ) -> Option<OsString> {
        let mut all: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            if !all.contains(dir) {
                all.push(dir.clone());
            }
        }
        if let Some(existing) = existing.filter(|e| !e.is_empty()) {
            all.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(all).ok()
    }

    pub fn worker_executable_name(&self) -> String {
        match self.os {
            HostOs::Windows => format!("{}.exe", ClientConfig::WORKER_BINARY_NAME),
            _ => ClientConfig::WORKER_BINARY_NAME.to_string(),
        }
    }
}
