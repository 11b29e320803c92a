use crate::core::io::layout::{AtomLayout, DEFAULT_ATOM_STYLE, LayoutError};
use crate::core::models::command::Side;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What a variable reference turns into when a template is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// The bound value, e.g. `17`.
    #[default]
    Values,
    /// The canonical full name, e.g. `$/atom:mols[1]/C1`.
    Names,
}

/// How `Data Masses` lines are annotated with the atom type they define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MassComments {
    Off,
    /// The type's own name, e.g. `# O`.
    #[default]
    Short,
    /// The path below the category root, e.g. `# Water/O`.
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Extra directories searched by `import` and `include`.
    pub search_path: Vec<PathBuf>,
    pub atom_layout: AtomLayout,
    /// Weight centroids by the masses written to `Data Masses`.
    pub mass_weighted_centroid: bool,
    /// Create undeclared categories at the root instead of failing.
    pub auto_categories: bool,
    /// Side used by plain `push()`.
    pub default_push_side: Side,
    pub render_mode: RenderMode,
    pub mass_comments: MassComments,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            atom_layout: AtomLayout::default(),
            mass_weighted_centroid: false,
            auto_categories: true,
            default_push_side: Side::Right,
            render_mode: RenderMode::Values,
            mass_comments: MassComments::Short,
        }
    }
}

#[derive(Default)]
pub struct CompilerConfigBuilder {
    search_path: Vec<PathBuf>,
    atom_style: Option<String>,
    mass_weighted_centroid: Option<bool>,
    auto_categories: Option<bool>,
    default_push_side: Option<Side>,
    render_mode: Option<RenderMode>,
    mass_comments: Option<MassComments>,
}

impl CompilerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_path(mut self, dir: PathBuf) -> Self {
        self.search_path.push(dir);
        self
    }
    pub fn search_paths(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_path.extend(dirs);
        self
    }
    pub fn atom_style(mut self, style: impl Into<String>) -> Self {
        self.atom_style = Some(style.into());
        self
    }
    pub fn mass_weighted_centroid(mut self, enabled: bool) -> Self {
        self.mass_weighted_centroid = Some(enabled);
        self
    }
    pub fn auto_categories(mut self, enabled: bool) -> Self {
        self.auto_categories = Some(enabled);
        self
    }
    pub fn default_push_side(mut self, side: Side) -> Self {
        self.default_push_side = Some(side);
        self
    }
    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = Some(mode);
        self
    }
    pub fn mass_comments(mut self, style: MassComments) -> Self {
        self.mass_comments = Some(style);
        self
    }

    pub fn build(self) -> Result<CompilerConfig, ConfigError> {
        let defaults = CompilerConfig::default();
        let atom_layout =
            AtomLayout::from_style(self.atom_style.as_deref().unwrap_or(DEFAULT_ATOM_STYLE))?;
        Ok(CompilerConfig {
            search_path: self.search_path,
            atom_layout,
            mass_weighted_centroid: self
                .mass_weighted_centroid
                .unwrap_or(defaults.mass_weighted_centroid),
            auto_categories: self.auto_categories.unwrap_or(defaults.auto_categories),
            default_push_side: self.default_push_side.unwrap_or(defaults.default_push_side),
            render_mode: self.render_mode.unwrap_or(defaults.render_mode),
            mass_comments: self.mass_comments.unwrap_or(defaults.mass_comments),
        })
    }
}
