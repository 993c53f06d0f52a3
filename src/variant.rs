//! Benchmark plans: the declarative list of variants a run sweeps over.
//!
//! A plan is plain TOML:
//!
//! ```toml
//! grid_size = 2048
//! iterations_hint = 1000
//! early_out = true
//! on_error = "skip"
//!
//! [[variant]]
//! name = "relax buffer"
//! kernel = "builtin:relax-buffer"
//! scheme = "buffer"
//! iterations = 370
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::grid::{default_goal, demo_terrain, flat_terrain, Cell, CostField};
use crate::pipeline::{BuiltinKernel, KernelRef};
use crate::resources::BindingScheme;
use crate::uniforms::RelaxUniforms;

/// One benchmark variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    pub kernel: KernelRef,
    pub scheme: BindingScheme,
    pub iterations: u32,
}

impl VariantConfig {
    /// A variant running the shipped kernel for `scheme`.
    pub fn builtin(name: impl Into<String>, scheme: BindingScheme, iterations: u32) -> Self {
        Self {
            name: name.into(),
            kernel: KernelRef::Builtin(BuiltinKernel::for_scheme(scheme)),
            scheme,
            iterations,
        }
    }
}

/// What the runner does when a variant fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Record the failure and continue with the next variant.
    #[default]
    Skip,
    /// Stop the sweep at the first failure.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    #[default]
    Demo,
    Flat,
}

fn default_grid_size() -> u32 {
    2048
}

fn default_iterations_hint() -> u32 {
    1000
}

fn default_early_out() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkPlan {
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_iterations_hint")]
    pub iterations_hint: u32,
    #[serde(default = "default_early_out")]
    pub early_out: bool,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub terrain: Terrain,
    /// `[x, y]`; defaults to three cells in from the far corner.
    #[serde(default)]
    pub goal: Option<[u32; 2]>,
    #[serde(default, rename = "variant")]
    pub variants: Vec<VariantConfig>,
    /// Directory that relative kernel paths fall back to.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for BenchmarkPlan {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            iterations_hint: default_iterations_hint(),
            early_out: default_early_out(),
            on_error: OnError::default(),
            terrain: Terrain::default(),
            goal: None,
            variants: vec![
                VariantConfig::builtin("relax buffer", BindingScheme::Buffer, 370),
                VariantConfig::builtin("relax texture", BindingScheme::Texture, 370),
            ],
            base_dir: None,
        }
    }
}

impl BenchmarkPlan {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a plan file.  Relative kernel paths also resolve against the
    /// file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BenchError::PlanIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut plan = Self::from_toml_str(&text)?;
        plan.base_dir = path.parent().map(Path::to_path_buf);
        Ok(plan)
    }

    pub fn goal(&self) -> Cell {
        match self.goal {
            Some([x, y]) => Cell::new(x, y),
            None => default_goal(self.grid_size),
        }
    }

    pub fn build_terrain(&self) -> Result<CostField> {
        match self.terrain {
            Terrain::Demo => demo_terrain(self.grid_size, self.goal()),
            Terrain::Flat => flat_terrain(self.grid_size, self.goal()),
        }
    }

    pub fn uniforms(&self) -> RelaxUniforms {
        RelaxUniforms::new(self.grid_size, self.iterations_hint, self.early_out)
    }

    /// Replace every variant's iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        for variant in &mut self.variants {
            variant.iterations = iterations;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_plan() {
        let plan = BenchmarkPlan::from_toml_str(
            r#"
grid_size = 256
iterations_hint = 8
early_out = false
on_error = "abort"
terrain = "flat"
goal = [10, 20]

[[variant]]
name = "tiled"
kernel = "shaders/tiled.wgsl"
scheme = "texture"
iterations = 50

[[variant]]
name = "naive"
kernel = "builtin:relax-buffer"
scheme = "buffer"
iterations = 51
"#,
        )
        .unwrap();
        assert_eq!(plan.grid_size, 256);
        assert_eq!(plan.on_error, OnError::Abort);
        assert_eq!(plan.terrain, Terrain::Flat);
        assert_eq!(plan.goal(), Cell::new(10, 20));
        assert_eq!(plan.variants.len(), 2);
        assert_eq!(plan.variants[0].kernel, KernelRef::Path("shaders/tiled.wgsl".into()));
        assert_eq!(plan.variants[1], VariantConfig::builtin("naive", BindingScheme::Buffer, 51));
        assert!(!plan.uniforms().early_out);
    }

    #[test]
    fn omitted_fields_take_defaults() {
        let plan = BenchmarkPlan::from_toml_str("grid_size = 64").unwrap();
        assert_eq!(plan.iterations_hint, 1000);
        assert!(plan.early_out);
        assert_eq!(plan.on_error, OnError::Skip);
        assert_eq!(plan.goal(), Cell::new(61, 61));
        assert!(plan.variants.is_empty());
    }

    #[test]
    fn rejects_unknown_schemes_and_fields() {
        let bad_scheme = r#"
[[variant]]
name = "x"
kernel = "builtin:relax-buffer"
scheme = "image"
iterations = 1
"#;
        assert!(matches!(BenchmarkPlan::from_toml_str(bad_scheme), Err(BenchError::Plan(_))));
        assert!(BenchmarkPlan::from_toml_str("grid = 3").is_err());
    }

    #[test]
    fn default_plan_covers_both_schemes() {
        let plan = BenchmarkPlan::default().with_iterations(12);
        let schemes: Vec<_> = plan.variants.iter().map(|v| v.scheme).collect();
        assert_eq!(schemes, [BindingScheme::Buffer, BindingScheme::Texture]);
        assert!(plan.variants.iter().all(|v| v.iterations == 12));
        let text = toml::to_string(&plan).unwrap();
        assert_eq!(BenchmarkPlan::from_toml_str(&text).unwrap(), plan);
    }

    #[test]
    fn shipped_plan_matches_the_default() {
        let plan = BenchmarkPlan::from_toml_str(include_str!("../plans/default.toml")).unwrap();
        assert_eq!(plan, BenchmarkPlan::default());
    }

    #[test]
    fn missing_plan_file_is_an_io_error() {
        let err = BenchmarkPlan::from_file("no/such/plan.toml").unwrap_err();
        assert!(matches!(err, BenchError::PlanIo { .. }));
    }
}
