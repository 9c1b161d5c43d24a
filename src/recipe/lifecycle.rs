// src/recipe/lifecycle.rs

//! Recipe lifecycle
//!
//! A recipe moves through `declared → configured → built → tested`, one
//! step at a time. The driver-facing surface is the [`Lifecycle`] trait:
//! eight entry points invoked in a fixed order by [`drive`]. Phases are
//! strictly sequential; invoking one out of order, or twice, is an
//! [`Error::InvalidTransition`].

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Where a recipe is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeState {
    Declared,
    Configured,
    Built,
    Tested,
}

impl RecipeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Configured => "configured",
            Self::Built => "built",
            Self::Tested => "tested",
        }
    }

    /// The only state this one may advance to
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Declared => Some(Self::Configured),
            Self::Configured => Some(Self::Built),
            Self::Built => Some(Self::Tested),
            Self::Tested => None,
        }
    }

    /// Advance to `to`, which must be the immediate successor
    pub fn advance(&mut self, to: RecipeState) -> Result<()> {
        if self.next() != Some(to) {
            return Err(Error::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for RecipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle entry points, in the order [`drive`] invokes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Requirements,
    BuildRequirements,
    Configure,
    Layout,
    Generate,
    Build,
    Package,
    Test,
}

impl Phase {
    pub const ORDER: [Phase; 8] = [
        Phase::Requirements,
        Phase::BuildRequirements,
        Phase::Configure,
        Phase::Layout,
        Phase::Generate,
        Phase::Build,
        Phase::Package,
        Phase::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::BuildRequirements => "build_requirements",
            Self::Configure => "configure",
            Self::Layout => "layout",
            Self::Generate => "generate",
            Self::Build => "build",
            Self::Package => "package",
            Self::Test => "test",
        }
    }

    fn index(&self) -> usize {
        Self::ORDER.iter().position(|p| p == self).unwrap_or(0)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces that phases run once each, in order
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    completed: Option<Phase>,
    failed: bool,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last phase that completed successfully
    pub fn completed(&self) -> Option<Phase> {
        self.completed
    }

    /// Check that `phase` may start now
    pub fn begin(&self, phase: Phase) -> Result<()> {
        let expected = match self.completed {
            None => Phase::ORDER[0],
            Some(last) => match Phase::ORDER.get(last.index() + 1) {
                Some(next) => *next,
                None => {
                    return Err(Error::InvalidTransition {
                        from: last.to_string(),
                        to: phase.to_string(),
                    });
                }
            },
        };
        if self.failed || phase != expected {
            return Err(Error::InvalidTransition {
                from: self
                    .completed
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "start".to_string()),
                to: phase.to_string(),
            });
        }
        Ok(())
    }

    /// Record the outcome of a phase started with [`PhaseTracker::begin`]
    ///
    /// A failed phase poisons the tracker; the cook must restart from
    /// the declared state.
    pub fn finish<T>(&mut self, phase: Phase, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.completed = Some(phase);
                Ok(value)
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

/// The eight driver-facing entry points of a recipe
pub trait Lifecycle {
    fn requirements(&mut self) -> Result<()>;
    fn build_requirements(&mut self) -> Result<()>;
    fn configure(&mut self) -> Result<()>;
    fn layout(&mut self) -> Result<()>;
    fn generate(&mut self) -> Result<()>;
    fn build(&mut self) -> Result<()>;
    fn package(&mut self) -> Result<()>;
    fn test(&mut self) -> Result<()>;
}

/// Invoke every entry point in order, stopping at the first error
pub fn drive<L: Lifecycle + ?Sized>(recipe: &mut L) -> Result<()> {
    for phase in Phase::ORDER {
        info!("Phase: {}", phase);
        match phase {
            Phase::Requirements => recipe.requirements()?,
            Phase::BuildRequirements => recipe.build_requirements()?,
            Phase::Configure => recipe.configure()?,
            Phase::Layout => recipe.layout()?,
            Phase::Generate => recipe.generate()?,
            Phase::Build => recipe.build()?,
            Phase::Package => recipe.package()?,
            Phase::Test => recipe.test()?,
        }
    }
    Ok(())
}
