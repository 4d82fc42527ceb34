//! Application configuration for paperflow.
//!
//! A project may carry its own `paperflow.toml` at the project root; otherwise
//! the user config at `~/.paperflow/paperflow.toml` applies. CLI flags
//! override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperflow";

// ---------------------------------------------------------------------------
// Config structs (matching paperflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Project directory names.
    #[serde(default)]
    pub project: ProjectConfig,

    /// External data harvesting.
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Tabular data cleaning.
    #[serde(default)]
    pub clean: CleanConfig,

    /// Chart generation.
    #[serde(default)]
    pub visualize: VisualizeConfig,

    /// Task manifest shape.
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Word export.
    #[serde(default)]
    pub export: ExportConfig,
}

/// `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory holding the problem statement and attachments.
    #[serde(default = "default_problem_dir")]
    pub problem_dir: String,

    /// Directory the harvester writes into.
    #[serde(default = "default_crawled_dir")]
    pub crawled_dir: String,

    /// Directory for every generated artifact.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Placeholder dictionary, relative to the project root.
    #[serde(default = "default_placeholders_file")]
    pub placeholders_file: String,

    /// Calculation results, relative to the output directory.
    #[serde(default = "default_results_file")]
    pub results_file: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            problem_dir: default_problem_dir(),
            crawled_dir: default_crawled_dir(),
            output_dir: default_output_dir(),
            placeholders_file: default_placeholders_file(),
            results_file: default_results_file(),
        }
    }
}

fn default_problem_dir() -> String {
    "problem_files".into()
}
fn default_crawled_dir() -> String {
    "crawled_data".into()
}
fn default_output_dir() -> String {
    "paper_output".into()
}
fn default_placeholders_file() -> String {
    "placeholders.toml".into()
}
fn default_results_file() -> String {
    "step2_calc_results.json".into()
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Requirements file, relative to the project root.
    #[serde(default = "default_requirements_file")]
    pub requirements_file: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between consecutive tasks.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            requirements_file: default_requirements_file(),
            timeout_secs: default_timeout_secs(),
            delay_ms: default_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_requirements_file() -> String {
    "data_requirements.json".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "Mozilla/5.0".into()
}

/// `[clean]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Directories (relative to the project root) scanned for data files.
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<String>,

    /// File extensions considered tabular data.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// A text column becomes numeric when the share of cells that fail to
    /// parse is below this value.
    #[serde(default = "default_numeric_threshold")]
    pub numeric_threshold: f64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            search_dirs: default_search_dirs(),
            extensions: default_extensions(),
            numeric_threshold: default_numeric_threshold(),
        }
    }
}

fn default_search_dirs() -> Vec<String> {
    vec![default_problem_dir(), default_crawled_dir()]
}
fn default_extensions() -> Vec<String> {
    ["csv", "xlsx", "xls", "txt"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}
fn default_numeric_threshold() -> f64 {
    0.5
}

/// `[visualize]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizeConfig {
    /// Maximum number of per-column charts of each kind.
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,

    /// Categorical columns with more distinct values are not charted.
    #[serde(default = "default_max_unique_categories")]
    pub max_unique_categories: usize,

    /// Number of bars in a category chart.
    #[serde(default = "default_top_categories")]
    pub top_categories: usize,

    /// Histogram bin count.
    #[serde(default = "default_bins")]
    pub bins: usize,

    /// Number of highest-variance columns in the scatter matrix.
    #[serde(default = "default_pair_columns")]
    pub pair_columns: usize,
}

impl Default for VisualizeConfig {
    fn default() -> Self {
        Self {
            max_columns: default_max_columns(),
            max_unique_categories: default_max_unique_categories(),
            top_categories: default_top_categories(),
            bins: default_bins(),
            pair_columns: default_pair_columns(),
        }
    }
}

fn default_max_columns() -> usize {
    20
}
fn default_max_unique_categories() -> usize {
    50
}
fn default_top_categories() -> usize {
    20
}
fn default_bins() -> usize {
    30
}
fn default_pair_columns() -> usize {
    5
}

/// `[manifest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Minimum length (in characters) each micro-unit should reach.
    #[serde(default = "default_target_words")]
    pub target_words: u32,

    /// Paper sections in output order.
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionSpec>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
            sections: default_sections(),
        }
    }
}

/// `[[manifest.sections]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Id prefix for the section's units, e.g. `ABS`.
    pub code: String,
    /// Section heading in the paper, e.g. `摘要`.
    pub name: String,
    /// Number of micro-units in the section.
    pub units: u32,
}

impl SectionSpec {
    fn new(code: &str, name: &str, units: u32) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            units,
        }
    }
}

fn default_target_words() -> u32 {
    270
}

fn default_sections() -> Vec<SectionSpec> {
    vec![
        SectionSpec::new("ABS", "摘要", 5),
        SectionSpec::new("INTRO", "问题重述", 3),
        SectionSpec::new("ASSUMP", "模型假设", 2),
        SectionSpec::new("SYMBOL", "符号说明", 1),
        SectionSpec::new("DATA", "数据预处理", 4),
        SectionSpec::new("MODEL1", "问题一", 8),
        SectionSpec::new("MODEL2", "问题二", 8),
        SectionSpec::new("MODEL3", "问题三", 8),
        SectionSpec::new("ANALYSIS", "结果分析", 5),
        SectionSpec::new("EVAL", "模型评价", 3),
        SectionSpec::new("CONCL", "结论", 2),
        SectionSpec::new("REF", "参考文献", 1),
        SectionSpec::new("APP", "附录", 2),
    ]
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// User calculation script, relative to the project root. Skipped when absent.
    #[serde(default = "default_calc_script")]
    pub calc_script: String,

    /// Interpreter used to run the calculation script.
    #[serde(default = "default_calc_interpreter")]
    pub calc_interpreter: String,

    /// Skip the harvest stage entirely.
    #[serde(default)]
    pub skip_harvest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calc_script: default_calc_script(),
            calc_interpreter: default_calc_interpreter(),
            skip_harvest: false,
        }
    }
}

fn default_calc_script() -> String {
    "step2_calc_results.py".into()
}
fn default_calc_interpreter() -> String {
    "python".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// `auto`, `builtin`, or `pandoc`.
    #[serde(default = "default_converter")]
    pub converter: String,

    /// Pandoc reference document, relative to the project root.
    #[serde(default = "default_reference_doc")]
    pub reference_doc: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            converter: default_converter(),
            reference_doc: default_reference_doc(),
        }
    }
}

fn default_converter() -> String {
    "auto".into()
}
fn default_reference_doc() -> String {
    "reference.docx".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.paperflow/paperflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PaperflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Resolve the effective config for a project.
///
/// An explicit path must exist. Otherwise `<root>/paperflow.toml` wins over
/// the user config, which wins over defaults.
pub fn resolve_config(root: &Path, explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let project_file = root.join(CONFIG_FILE_NAME);
    if project_file.exists() {
        tracing::debug!(path = %project_file.display(), "using project config");
        return load_config_from(&project_file);
    }

    load_config()
}

/// Write a default config file into `dir` (the user config dir when `None`).
/// Returns the path to the created file.
pub fn init_config(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => config_dir()?,
    };
    std::fs::create_dir_all(&dir).map_err(|e| PaperflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PaperflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("摘要"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.manifest.target_words, 270);
        assert_eq!(parsed.manifest.sections.len(), 13);
        assert_eq!(parsed.export.converter, "auto");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[project]
output_dir = "out"

[manifest]
target_words = 100

[[manifest.sections]]
code = "ABS"
name = "摘要"
units = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.project.output_dir, "out");
        assert_eq!(config.project.problem_dir, "problem_files");
        assert_eq!(config.manifest.sections.len(), 1);
        assert_eq!(config.clean.numeric_threshold, 0.5);
        assert_eq!(config.visualize.bins, 30);
    }

    #[test]
    fn default_sections_total_52_units() {
        let total: u32 = default_sections().iter().map(|s| s.units).sum();
        assert_eq!(total, 52);
    }

    #[test]
    fn project_config_file_takes_precedence() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[pipeline]\nskip_harvest = true\n",
        )
        .expect("write config");

        let config = resolve_config(tmp.path(), None).expect("resolve");
        assert!(config.pipeline.skip_harvest);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let missing = tmp.path().join("nope.toml");
        assert!(resolve_config(tmp.path(), Some(&missing)).is_err());
    }

    #[test]
    fn init_config_writes_into_given_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = init_config(Some(tmp.path())).expect("init");
        assert!(path.exists());
        let parsed = load_config_from(&path).expect("reload");
        assert_eq!(parsed.harvest.timeout_secs, 30);
    }
}
