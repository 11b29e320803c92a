use crate::cli::{CompileArgs, TypeComments};
use crate::error::{CliError, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;
use ttree::core::models::command::Side;
use ttree::engine::config::{CompilerConfig, CompilerConfigBuilder, MassComments, RenderMode};

/// Environment variable listing extra search directories, separated like `PATH`.
pub const SEARCH_PATH_ENV: &str = "TTREE_PATH";

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSearchConfig {
    #[serde(rename = "import-paths")]
    import_paths: Option<Vec<PathBuf>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialCoordinatesConfig {
    #[serde(rename = "atom-style")]
    atom_style: Option<String>,
    #[serde(rename = "mass-weighted")]
    mass_weighted: Option<bool>,
    #[serde(rename = "default-push-side")]
    default_push_side: Option<Side>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialVariablesConfig {
    #[serde(rename = "auto-categories")]
    auto_categories: Option<bool>,
    #[serde(rename = "render-mode")]
    render_mode: Option<RenderMode>,
    #[serde(rename = "mass-comments")]
    mass_comments: Option<MassComments>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialCompilerConfig {
    search: Option<PartialSearchConfig>,
    coordinates: Option<PartialCoordinatesConfig>,
    variables: Option<PartialVariablesConfig>,
}

impl PartialCompilerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ConfigSyntax {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merges the file settings with the command line, which wins. Directories from
    /// `env_search_path` come last in the search order.
    pub fn merge_with_cli(
        mut self,
        args: &CompileArgs,
        env_search_path: Option<OsString>,
    ) -> Result<CompilerConfig> {
        let search = self.search.take().unwrap_or_default();
        let coordinates = self.coordinates.take().unwrap_or_default();
        let variables = self.variables.take().unwrap_or_default();

        let search_path: Vec<PathBuf> = args
            .import_paths
            .iter()
            .cloned()
            .chain(search.import_paths.unwrap_or_default())
            .chain(Self::split_env_search_path(env_search_path))
            .collect();
        debug!("Resolved search path: {:?}", search_path);

        let mut builder = CompilerConfigBuilder::new()
            .search_paths(search_path)
            .mass_weighted_centroid(args.mass_weighted || coordinates.mass_weighted.unwrap_or(false))
            .auto_categories(!args.strict_categories && variables.auto_categories.unwrap_or(true));

        if let Some(style) = args.atom_style.as_ref().or(coordinates.atom_style.as_ref()) {
            builder = builder.atom_style(style.clone());
        }
        if let Some(side) = coordinates.default_push_side {
            builder = builder.default_push_side(side);
        }
        builder = builder.render_mode(if args.names {
            RenderMode::Names
        } else {
            variables.render_mode.unwrap_or_default()
        });
        builder = Self::merge_mass_comments(builder, args.type_comments, variables.mass_comments);

        Ok(builder.build()?)
    }

    fn merge_mass_comments(
        builder: CompilerConfigBuilder,
        cli_flags: TypeComments,
        file_val: Option<MassComments>,
    ) -> CompilerConfigBuilder {
        if cli_flags.full_comment_names {
            builder.mass_comments(MassComments::Full)
        } else if cli_flags.short_comment_names {
            builder.mass_comments(MassComments::Short)
        } else if cli_flags.no_comment_names {
            builder.mass_comments(MassComments::Off)
        } else {
            builder.mass_comments(file_val.unwrap_or_default())
        }
    }

    fn split_env_search_path(value: Option<OsString>) -> Vec<PathBuf> {
        value
            .map(|v| {
                std::env::split_paths(&v)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;
    use ttree::core::io::layout::AtomLayout;

    fn compile_args(extra: &[&str]) -> CompileArgs {
        let mut argv = vec!["ttree", "check", "system.lt"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Check(args) => args.compile,
            Commands::Build(_) => panic!("expected the check command"),
        }
    }

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ttree.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_config_yields_library_defaults() {
        let config = PartialCompilerConfig::default()
            .merge_with_cli(&compile_args(&[]), None)
            .unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn file_settings_are_applied() {
        let (_dir, path) = write_config(
            r#"
            [search]
            import-paths = ["/opt/ff"]

            [coordinates]
            atom-style = "atomic"
            mass-weighted = true
            default-push-side = "left"

            [variables]
            auto-categories = false
            render-mode = "names"
            mass-comments = "full"
            "#,
        );
        let config = PartialCompilerConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&compile_args(&[]), None)
            .unwrap();
        assert_eq!(config.search_path, vec![PathBuf::from("/opt/ff")]);
        assert_eq!(config.atom_layout, AtomLayout::from_style("atomic").unwrap());
        assert!(config.mass_weighted_centroid);
        assert!(!config.auto_categories);
        assert_eq!(config.default_push_side, Side::Left);
        assert_eq!(config.render_mode, RenderMode::Names);
        assert_eq!(config.mass_comments, MassComments::Full);
    }

    #[test]
    fn command_line_overrides_file_settings() {
        let (_dir, path) = write_config("[coordinates]\natom-style = \"atomic\"\n");
        let config = PartialCompilerConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&compile_args(&["--atom-style", "charge", "--strict-categories"]), None)
            .unwrap();
        assert_eq!(config.atom_layout, AtomLayout::from_style("charge").unwrap());
        assert!(!config.auto_categories);
    }

    #[test]
    fn comment_flag_overrides_the_file_choice() {
        let (_dir, path) = write_config("[variables]
mass-comments = \"full\"\n");
        let config = PartialCompilerConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&compile_args(&["--no-comment-names"]), None)
            .unwrap();
        assert_eq!(config.mass_comments, MassComments::Off);
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = PartialCompilerConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::ConfigRead { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn search_path_orders_cli_then_file_then_environment() {
        let (_dir, path) = write_config("[search]\nimport-paths = [\"/from/file\"]\n");
        let env = std::env::join_paths(["/env/a", "/env/b"]).unwrap();
        let config = PartialCompilerConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&compile_args(&["-I", "/from/cli"]), Some(env))
            .unwrap();
        assert_eq!(
            config.search_path,
            vec![
                PathBuf::from("/from/cli"),
                PathBuf::from("/from/file"),
                PathBuf::from("/env/a"),
                PathBuf::from("/env/b"),
            ]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let (_dir, path) = write_config("[coordinates]\natom-styles = \"full\"\n");
        assert!(matches!(
            PartialCompilerConfig::from_file(&path),
            Err(CliError::ConfigSyntax { .. })
        ));
    }

    #[test]
    fn unknown_atom_style_is_a_config_error() {
        let result = PartialCompilerConfig::default()
            .merge_with_cli(&compile_args(&["--atom-style", "nonsense"]), None);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
