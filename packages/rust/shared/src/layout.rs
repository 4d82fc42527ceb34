//! Resolved on-disk layout of a paper project.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Every path a stage reads or writes, resolved against the project root.
///
/// ```text
/// <root>/
/// ├── problem_files/
/// ├── crawled_data/{raw,processed}/
/// ├── placeholders.toml
/// └── paper_output/
///     ├── tasks.json
///     ├── generate_log.json
///     ├── micro_units/*.txt
///     ├── data_cleaned/*_cleaned.csv
///     ├── figures/<dataset>/*.svg
///     ├── final_paper.md
///     ├── ref_check.md
///     └── final_paper.docx
/// ```
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    problem_dir: PathBuf,
    crawled_dir: PathBuf,
    output_dir: PathBuf,
    placeholders_file: PathBuf,
    results_file: PathBuf,
}

impl ProjectLayout {
    /// Resolve the layout for `root` using the directory names in `config`.
    pub fn new(root: impl Into<PathBuf>, config: &AppConfig) -> Self {
        let root = root.into();
        let output_dir = root.join(&config.project.output_dir);
        Self {
            problem_dir: root.join(&config.project.problem_dir),
            crawled_dir: root.join(&config.project.crawled_dir),
            placeholders_file: root.join(&config.project.placeholders_file),
            results_file: output_dir.join(&config.project.results_file),
            output_dir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn problem_dir(&self) -> &Path {
        &self.problem_dir
    }

    pub fn crawled_dir(&self) -> &Path {
        &self.crawled_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn placeholders_file(&self) -> &Path {
        &self.placeholders_file
    }

    pub fn results_file(&self) -> &Path {
        &self.results_file
    }

    pub fn units_dir(&self) -> PathBuf {
        self.output_dir.join("micro_units")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.output_dir.join("tasks.json")
    }

    pub fn generate_log_file(&self) -> PathBuf {
        self.output_dir.join("generate_log.json")
    }

    pub fn cleaned_dir(&self) -> PathBuf {
        self.output_dir.join("data_cleaned")
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.output_dir.join("figures")
    }

    pub fn final_paper(&self) -> PathBuf {
        self.output_dir.join("final_paper.md")
    }

    pub fn ref_report(&self) -> PathBuf {
        self.output_dir.join("ref_check.md")
    }

    pub fn final_docx(&self) -> PathBuf {
        self.output_dir.join("final_paper.docx")
    }

    pub fn run_summary(&self) -> PathBuf {
        self.output_dir.join("run_summary.json")
    }

    /// Default text file for a micro-unit id.
    pub fn unit_file(&self, unit_id: &str) -> PathBuf {
        self.units_dir().join(format!("{unit_id}.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_config_names() {
        let mut config = AppConfig::default();
        config.project.output_dir = "out".into();
        let layout = ProjectLayout::new("/work", &config);

        assert_eq!(layout.tasks_file(), PathBuf::from("/work/out/tasks.json"));
        assert_eq!(
            layout.unit_file("ABS-1"),
            PathBuf::from("/work/out/micro_units/ABS-1.txt")
        );
        assert_eq!(
            layout.results_file(),
            Path::new("/work/out/step2_calc_results.json")
        );
        assert_eq!(layout.problem_dir(), Path::new("/work/problem_files"));
    }
}
