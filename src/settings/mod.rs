// src/settings/mod.rs

//! Target platform settings
//!
//! Settings describe the platform a recipe is built for: operating system,
//! CPU architecture, compiler identity and version, build configuration and
//! optionally the C++ standard level. They are supplied before any lifecycle
//! phase runs and are read-only afterwards.
//!
//! Spellings follow the recipe corpus: `Linux`, `Windows`, `Macos`,
//! `x86_64`, `armv8`, `apple-clang`, `msvc`, `Release`, ...

mod profile;

pub use profile::{CrossConf, ProbeConf, Profile};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Os {
    Linux,
    Windows,
    Macos,
    FreeBsd,
    Android,
    Ios,
    TvOs,
    WatchOs,
    Emscripten,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::Macos => "Macos",
            Self::FreeBsd => "FreeBSD",
            Self::Android => "Android",
            Self::Ios => "iOS",
            Self::TvOs => "tvOS",
            Self::WatchOs => "watchOS",
            Self::Emscripten => "Emscripten",
        }
    }

    /// Value for `CMAKE_SYSTEM_NAME`
    pub fn cmake_system_name(&self) -> &'static str {
        match self {
            Self::Macos => "Darwin",
            other => other.as_str(),
        }
    }

    /// Value for the `system` key of a Meson machine file
    pub fn meson_system(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Macos | Self::Ios | Self::TvOs | Self::WatchOs => "darwin",
            Self::FreeBsd => "freebsd",
            Self::Android => "android",
            Self::Emscripten => "emscripten",
        }
    }

    /// OS/ABI part of a GNU target triple
    pub fn gnu_triple_suffix(&self) -> &'static str {
        match self {
            Self::Linux => "linux-gnu",
            Self::Windows => "w64-mingw32",
            Self::Macos => "apple-darwin",
            Self::FreeBsd => "unknown-freebsd",
            Self::Android => "linux-android",
            Self::Ios | Self::TvOs | Self::WatchOs => "apple-ios",
            Self::Emscripten => "unknown-emscripten",
        }
    }

    /// Environment variable the dynamic loader searches for shared libraries
    pub fn library_path_var(&self) -> &'static str {
        match self {
            Self::Windows => "PATH",
            Self::Macos | Self::Ios | Self::TvOs | Self::WatchOs => "DYLD_LIBRARY_PATH",
            _ => "LD_LIBRARY_PATH",
        }
    }

    /// Detect the operating system this process runs on
    pub fn detect() -> Option<Self> {
        match std::env::consts::OS {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            "macos" => Some(Self::Macos),
            "freebsd" => Some(Self::FreeBsd),
            "android" => Some(Self::Android),
            "ios" => Some(Self::Ios),
            _ => None,
        }
    }
}

impl FromStr for Os {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "macos" | "darwin" => Ok(Self::Macos),
            "freebsd" => Ok(Self::FreeBsd),
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "tvos" => Ok(Self::TvOs),
            "watchos" => Ok(Self::WatchOs),
            "emscripten" => Ok(Self::Emscripten),
            _ => Err(Error::ParseError(format!("Unknown operating system: {}", s))),
        }
    }
}

/// Broad CPU family used for execution compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchFamily {
    X86,
    Arm,
    PowerPc,
    S390,
    RiscV,
    Wasm,
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
    X86,
    X86_64,
    Armv7,
    Armv7hf,
    Armv8,
    Ppc64le,
    S390x,
    Riscv64,
    Wasm,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Armv7 => "armv7",
            Self::Armv7hf => "armv7hf",
            Self::Armv8 => "armv8",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
            Self::Riscv64 => "riscv64",
            Self::Wasm => "wasm",
        }
    }

    pub fn family(&self) -> ArchFamily {
        match self {
            Self::X86 | Self::X86_64 => ArchFamily::X86,
            Self::Armv7 | Self::Armv7hf | Self::Armv8 => ArchFamily::Arm,
            Self::Ppc64le => ArchFamily::PowerPc,
            Self::S390x => ArchFamily::S390,
            Self::Riscv64 => ArchFamily::RiscV,
            Self::Wasm => ArchFamily::Wasm,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Self::X86 | Self::Armv7 | Self::Armv7hf | Self::Wasm => 32,
            _ => 64,
        }
    }

    /// CPU part of a GNU target triple
    pub fn gnu_triple_cpu(&self) -> &'static str {
        match self {
            Self::X86 => "i686",
            Self::X86_64 => "x86_64",
            Self::Armv7 => "arm",
            Self::Armv7hf => "armv7",
            Self::Armv8 => "aarch64",
            Self::Ppc64le => "powerpc64le",
            Self::S390x => "s390x",
            Self::Riscv64 => "riscv64",
            Self::Wasm => "wasm32",
        }
    }

    /// Value for the `cpu_family` key of a Meson machine file
    pub fn meson_cpu_family(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Armv7 | Self::Armv7hf => "arm",
            Self::Armv8 => "aarch64",
            Self::Ppc64le => "ppc64",
            Self::S390x => "s390x",
            Self::Riscv64 => "riscv64",
            Self::Wasm => "wasm32",
        }
    }

    /// Value for `CMAKE_SYSTEM_PROCESSOR`
    pub fn cmake_processor(&self) -> &'static str {
        match self {
            Self::Armv8 => "aarch64",
            Self::Armv7 | Self::Armv7hf => "armv7-a",
            Self::X86 => "i686",
            other => other.as_str(),
        }
    }

    /// Detect the architecture this process runs on
    pub fn detect() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86" => Some(Self::X86),
            "x86_64" => Some(Self::X86_64),
            "arm" => Some(Self::Armv7),
            "aarch64" => Some(Self::Armv8),
            "powerpc64" => Some(Self::Ppc64le),
            "s390x" => Some(Self::S390x),
            "riscv64" => Some(Self::Riscv64),
            "wasm32" => Some(Self::Wasm),
            _ => None,
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Self::X86),
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "armv7" => Ok(Self::Armv7),
            "armv7hf" => Ok(Self::Armv7hf),
            "armv8" | "aarch64" | "arm64" => Ok(Self::Armv8),
            "ppc64le" => Ok(Self::Ppc64le),
            "s390x" => Ok(Self::S390x),
            "riscv64" => Ok(Self::Riscv64),
            "wasm" | "wasm32" => Ok(Self::Wasm),
            _ => Err(Error::ParseError(format!("Unknown architecture: {}", s))),
        }
    }
}

/// Compiler identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Compiler {
    Gcc,
    Clang,
    AppleClang,
    Msvc,
    IntelCc,
}

impl Compiler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcc => "gcc",
            Self::Clang => "clang",
            Self::AppleClang => "apple-clang",
            Self::Msvc => "msvc",
            Self::IntelCc => "intel-cc",
        }
    }
}

impl FromStr for Compiler {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gcc" => Ok(Self::Gcc),
            "clang" => Ok(Self::Clang),
            "apple-clang" => Ok(Self::AppleClang),
            "msvc" | "visual studio" => Ok(Self::Msvc),
            "intel-cc" => Ok(Self::IntelCc),
            _ => Err(Error::ParseError(format!("Unknown compiler: {}", s))),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BuildType {
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }

    /// Value for `meson setup --buildtype`
    pub fn meson_buildtype(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::RelWithDebInfo => "debugoptimized",
            Self::MinSizeRel => "minsize",
        }
    }

    /// Default C/C++ flags for generators without a build type concept
    pub fn c_flags(&self) -> &'static str {
        match self {
            Self::Debug => "-g -O0",
            Self::Release => "-O3 -DNDEBUG",
            Self::RelWithDebInfo => "-O2 -g -DNDEBUG",
            Self::MinSizeRel => "-Os -DNDEBUG",
        }
    }
}

impl FromStr for BuildType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "relwithdebinfo" => Ok(Self::RelWithDebInfo),
            "minsizerel" => Ok(Self::MinSizeRel),
            _ => Err(Error::ParseError(format!("Unknown build type: {}", s))),
        }
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl TryFrom<String> for $ty {
                type Error = Error;

                fn try_from(s: String) -> Result<Self> {
                    s.parse()
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> String {
                    value.as_str().to_string()
                }
            }
        )*
    };
}

string_conversions!(Os, Arch, Compiler, BuildType);

/// Platform description for one cook
///
/// Every field is optional so incomplete settings can be represented;
/// consumers decide how to treat missing values (the capability probe
/// treats them as "cannot run").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub os: Option<Os>,
    #[serde(default)]
    pub arch: Option<Arch>,
    #[serde(default)]
    pub compiler: Option<Compiler>,
    #[serde(default, rename = "compiler.version")]
    pub compiler_version: Option<String>,
    #[serde(default)]
    pub build_type: Option<BuildType>,
    #[serde(default, rename = "compiler.cppstd")]
    pub cppstd: Option<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings describing the machine this process runs on
    ///
    /// Only the platform is detected; compiler fields stay unset.
    pub fn detect_host() -> Self {
        Self {
            os: Os::detect(),
            arch: Arch::detect(),
            ..Self::default()
        }
    }

    pub fn with_os(mut self, os: Os) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn with_compiler(mut self, compiler: Compiler, version: impl Into<String>) -> Self {
        self.compiler = Some(compiler);
        self.compiler_version = Some(version.into());
        self
    }

    pub fn with_build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = Some(build_type);
        self
    }

    pub fn with_cppstd(mut self, cppstd: impl Into<String>) -> Self {
        self.cppstd = Some(cppstd.into());
        self
    }

    /// Overlay every field set in `other` onto a copy of `self`
    pub fn merged_with(&self, other: &Settings) -> Settings {
        Settings {
            os: other.os.or(self.os),
            arch: other.arch.or(self.arch),
            compiler: other.compiler.or(self.compiler),
            compiler_version: other
                .compiler_version
                .clone()
                .or_else(|| self.compiler_version.clone()),
            build_type: other.build_type.or(self.build_type),
            cppstd: other.cppstd.clone().or_else(|| self.cppstd.clone()),
        }
    }

    /// Whether both platform fields are known
    pub fn has_platform(&self) -> bool {
        self.os.is_some() && self.arch.is_some()
    }

    /// Build type, defaulting to Release when unset
    pub fn build_type_or_default(&self) -> BuildType {
        self.build_type.unwrap_or(BuildType::Release)
    }

    /// Flattened `key -> value` view, in corpus spelling
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(os) = self.os {
            map.insert("os".to_string(), os.to_string());
        }
        if let Some(arch) = self.arch {
            map.insert("arch".to_string(), arch.to_string());
        }
        if let Some(compiler) = self.compiler {
            map.insert("compiler".to_string(), compiler.to_string());
        }
        if let Some(version) = &self.compiler_version {
            map.insert("compiler.version".to_string(), version.clone());
        }
        if let Some(build_type) = self.build_type {
            map.insert("build_type".to_string(), build_type.to_string());
        }
        if let Some(cppstd) = &self.cppstd {
            map.insert("compiler.cppstd".to_string(), cppstd.clone());
        }
        map
    }

    /// GNU target triple for the platform, if complete
    pub fn gnu_triple(&self) -> Option<String> {
        let (os, arch) = (self.os?, self.arch?);
        let suffix = match (os, arch) {
            (Os::Linux, Arch::Armv7hf) => "linux-gnueabihf",
            (Os::Linux, Arch::Armv7) => "linux-gnueabi",
            (Os::Android, Arch::Armv7 | Arch::Armv7hf) => "linux-androideabi",
            _ => os.gnu_triple_suffix(),
        };
        Some(format!("{}-{}", arch.gnu_triple_cpu(), suffix))
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .to_map()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Numeric C++ standard level: "17", "gnu17" -> 17; "98" sorts below "11"
pub fn cppstd_level(value: &str) -> Option<i32> {
    let digits = value.trim_start_matches("gnu");
    let level: i32 = digits.parse().ok()?;
    Some(if level >= 98 { level - 100 } else { level })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corpus_spellings() {
        assert_eq!("Linux".parse::<Os>().unwrap(), Os::Linux);
        assert_eq!("Macos".parse::<Os>().unwrap(), Os::Macos);
        assert_eq!("armv8".parse::<Arch>().unwrap(), Arch::Armv8);
        assert_eq!("apple-clang".parse::<Compiler>().unwrap(), Compiler::AppleClang);
        assert_eq!("RelWithDebInfo".parse::<BuildType>().unwrap(), BuildType::RelWithDebInfo);
        assert!("sparc".parse::<Arch>().is_err());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: Settings = toml::from_str(
            r#"
os = "Windows"
arch = "armv8"
compiler = "msvc"
"compiler.version" = "193"
build_type = "Debug"
"#,
        )
        .unwrap();
        assert_eq!(settings.os, Some(Os::Windows));
        assert_eq!(settings.arch, Some(Arch::Armv8));
        assert_eq!(settings.compiler_version.as_deref(), Some("193"));
        assert_eq!(settings.build_type, Some(BuildType::Debug));
        assert!(settings.cppstd.is_none());
    }

    #[test]
    fn test_unknown_setting_value_rejected() {
        let result: std::result::Result<Settings, _> = toml::from_str("os = \"Plan9\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = Settings::new().with_os(Os::Linux).with_arch(Arch::X86_64);
        let overlay = Settings::new().with_arch(Arch::Armv8);
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.os, Some(Os::Linux));
        assert_eq!(merged.arch, Some(Arch::Armv8));
    }

    #[test]
    fn test_gnu_triple() {
        let settings = Settings::new().with_os(Os::Linux).with_arch(Arch::Armv8);
        assert_eq!(settings.gnu_triple().as_deref(), Some("aarch64-linux-gnu"));
        let hf = Settings::new().with_os(Os::Linux).with_arch(Arch::Armv7hf);
        assert_eq!(hf.gnu_triple().as_deref(), Some("armv7-linux-gnueabihf"));
        assert!(Settings::new().with_os(Os::Linux).gnu_triple().is_none());
    }

    #[test]
    fn test_cppstd_level() {
        assert_eq!(cppstd_level("17"), Some(17));
        assert_eq!(cppstd_level("gnu20"), Some(20));
        assert!(cppstd_level("98").unwrap() < cppstd_level("11").unwrap());
        assert_eq!(cppstd_level("latest"), None);
    }
}
