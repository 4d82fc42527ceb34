//! Loading the harvest requirements file.

use std::path::Path;

use tracing::{info, warn};

use paperflow_shared::{HarvestRequirements, HarvestTask, Result, write_json};

/// Starter requirements written when the project has none.
///
/// Only the manual search reminder is active, so a fresh project never hits
/// the network until the user edits the file.
pub fn requirements_template() -> HarvestRequirements {
    HarvestRequirements {
        tasks: vec![
            HarvestTask {
                kind: "direct_download".into(),
                url: Some("https://example.com/data.csv".into()),
                save_name: Some("example_data.csv".into()),
                save_prefix: None,
                query: None,
                notes: None,
                active: false,
            },
            HarvestTask {
                kind: "scrape_tables".into(),
                url: Some(
                    "https://en.wikipedia.org/wiki/List_of_countries_by_GDP_(nominal)".into(),
                ),
                save_name: None,
                save_prefix: Some("gdp_table".into()),
                query: None,
                notes: None,
                active: false,
            },
            HarvestTask {
                kind: "manual_search".into(),
                url: None,
                save_name: None,
                save_prefix: None,
                query: Some("2023年全球半导体产量统计".into()),
                notes: Some("Need to find authoritative report manually if API fails".into()),
                active: true,
            },
        ],
    }
}

/// Read `data_requirements.json`.
///
/// A missing file is scaffolded from [`requirements_template`] and the
/// template is returned. An unreadable or malformed file is logged and
/// treated as having no tasks.
pub fn load_requirements(path: &Path) -> Result<HarvestRequirements> {
    if !path.exists() {
        info!(path = %path.display(), "requirements file not found, writing template");
        let template = requirements_template();
        write_json(path, &template)?;
        return Ok(template);
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            serde_json::from_str::<HarvestRequirements>(&content).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(reqs) => Ok(reqs),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read requirements, no tasks will run");
            Ok(HarvestRequirements::default())
        }
    }
}
