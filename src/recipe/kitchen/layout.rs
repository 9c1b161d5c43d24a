// src/recipe/kitchen/layout.rs

//! Working directory layout and the per-cook build context
//!
//! ```text
//! <workdir>/
//!   .cookbook.lock
//!   source/                   unpacked and patched sources
//!   build/<build_type>/       generator build folder
//!     cookbook-plan.json      exact invocations, for reproduction
//!     test_package/           test consumer build folder
//!   package/                  installed artifacts
//!     licenses/
//!     cookbook-package.json
//! ```

use crate::error::{Error, Result};
use crate::options::Options;
use crate::recipe::condition::ConditionContext;
use crate::recipe::format::Recipe;
use crate::recipe::probe::HostEnvironment;
use crate::settings::{BuildType, Settings};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Folders of one cook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub source: PathBuf,
    pub build: PathBuf,
    pub package: PathBuf,
    pub test_build: PathBuf,
}

impl Layout {
    pub const PLAN_FILE: &'static str = "cookbook-plan.json";
    pub const MANIFEST_FILE: &'static str = "cookbook-package.json";

    pub fn new(root: &Path, build_type: BuildType) -> Self {
        let build = root.join("build").join(build_type.as_str());
        Self {
            root: root.to_path_buf(),
            source: root.join("source"),
            test_build: build.join("test_package"),
            build,
            package: root.join("package"),
        }
    }

    /// Start from empty folders so nothing from an earlier cook leaks in
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.source, &self.root.join("build"), &self.package] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| {
                    Error::IoError(format!("Failed to clean {}: {}", dir.display(), e))
                })?;
            }
        }
        for dir in [&self.source, &self.build, &self.package] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Directory holding the top-level build script
    pub fn source_root(&self, subdir: Option<&str>) -> Result<PathBuf> {
        match subdir {
            Some(subdir) => resolve_inside(&self.source, subdir),
            None => Ok(self.source.clone()),
        }
    }

    pub fn plan_path(&self) -> PathBuf {
        self.build.join(Self::PLAN_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.package.join(Self::MANIFEST_FILE)
    }

    pub fn licenses_dir(&self) -> PathBuf {
        self.package.join("licenses")
    }

    /// Remove intermediate folders, keeping the package
    pub fn clean_intermediate(&self) -> Result<()> {
        for dir in [&self.source, &self.root.join("build")] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", dir.display(), e))
                })?;
            }
        }
        Ok(())
    }
}

/// Join a recipe-supplied relative path onto `base`, refusing escapes
pub fn resolve_inside(base: &Path, relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    if relative.is_empty() {
        return Err(Error::Configuration("Empty path".to_string()));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(Error::Configuration(format!(
                    "Path '{}' must stay inside {}",
                    relative,
                    base.display()
                )));
            }
        }
    }
    Ok(base.join(path))
}

/// Everything a phase needs to know about the current cook
///
/// Created by the cook after configure; borrowed by the orchestrator, the
/// test runner and the packager.
#[derive(Debug, Clone)]
pub struct BuildContext<'a> {
    pub recipe: &'a Recipe,
    pub settings: &'a Settings,
    pub options: &'a Options,
    pub host: &'a HostEnvironment,
    pub layout: &'a Layout,
    /// Environment for every spawned generator invocation
    pub env: BTreeMap<String, String>,
    pub jobs: u32,
    pub cross_building: bool,
}

impl<'a> BuildContext<'a> {
    pub fn condition_context(&self) -> ConditionContext<'a> {
        let recipe: &'a Recipe = self.recipe;
        ConditionContext {
            settings: self.settings,
            options: self.options,
            version: &recipe.package.version,
            cross_building: self.cross_building,
        }
    }

    pub fn build_type(&self) -> BuildType {
        self.settings.build_type_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new(Path::new("/work"), BuildType::Release);
        assert_eq!(layout.source, PathBuf::from("/work/source"));
        assert_eq!(layout.build, PathBuf::from("/work/build/Release"));
        assert_eq!(layout.test_build, PathBuf::from("/work/build/Release/test_package"));
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/work/package/cookbook-package.json")
        );
    }

    #[test]
    fn test_prepare_wipes_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path(), BuildType::Debug);
        layout.prepare().unwrap();
        fs::write(layout.package.join("stale.a"), b"old").unwrap();

        layout.prepare().unwrap();
        assert!(!layout.package.join("stale.a").exists());
        assert!(layout.build.is_dir());
    }

    #[test]
    fn test_resolve_inside() {
        let base = Path::new("/work/build");
        assert_eq!(
            resolve_inside(base, "bin/app").unwrap(),
            PathBuf::from("/work/build/bin/app")
        );
        assert!(resolve_inside(base, "../package/x").unwrap_err().is_configuration());
        assert!(resolve_inside(base, "/etc/passwd").is_err());
        assert!(resolve_inside(base, "").is_err());
    }
}
