//! Harness and run configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::browser::PlaywrightConfig;
use crate::credentials::CredentialRegistry;
use crate::error::{E2eError, E2eResult};
use crate::policy::{TagSet, DB_RESET_TAG};
use crate::service::ServiceConfig;

pub const DOCKER_IMAGE_ENV: &str = "N8N_DOCKER_IMAGE";
pub const BASE_URL_ENV: &str = "N8N_BASE_URL";
pub const CI_ENV: &str = "CI";

pub const PARALLEL_PROJECT: &str = "Full Parallel Tests";
pub const SEQUENTIAL_PROJECT: &str = "Sequential Tests";

/// Everything the standard fixtures need to build a test environment
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub service: ServiceConfig,
    /// Use an already running instance instead of provisioning containers
    pub base_url_override: Option<String>,
    pub playwright: PlaywrightConfig,
    pub credentials: Arc<CredentialRegistry>,
    pub ci: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            base_url_override: None,
            playwright: PlaywrightConfig::default(),
            credentials: Arc::new(CredentialRegistry::default()),
            ci: false,
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(image) = lookup(DOCKER_IMAGE_ENV).filter(|v| !v.is_empty()) {
            config.service.image = image;
        }
        config.base_url_override = lookup(BASE_URL_ENV)
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string());
        config.ci = lookup(CI_ENV).map(|v| is_truthy(&v)).unwrap_or(false);
        config
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "0" | "false" | "no")
}

/// A named group of tests sharing worker settings
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: String,
    /// Run only tests whose title or tags match
    pub grep: Option<Regex>,
    /// Skip tests whose title or tags match
    pub grep_invert: Option<Regex>,
    /// Overrides [`RunConfig::workers`]
    pub workers: Option<usize>,
    /// Projects that must finish first
    pub dependencies: Vec<String>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grep: None,
            grep_invert: None,
            workers: None,
            dependencies: Vec::new(),
        }
    }

    /// Whether a test belongs to this project
    pub fn matches(&self, title: &str, tags: &TagSet) -> bool {
        let haystack = tags.iter().fold(title.to_string(), |mut acc, tag| {
            acc.push(' ');
            acc.push_str(tag);
            acc
        });
        let included = self.grep.as_ref().map_or(true, |re| re.is_match(&haystack));
        let excluded = self
            .grep_invert
            .as_ref()
            .map_or(false, |re| re.is_match(&haystack));
        included && !excluded
    }
}

/// How a run is scheduled
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: usize,
    pub retries: usize,
    /// Fail the run when a test is marked `only`
    pub forbid_only: bool,
    pub test_timeout: Duration,
    pub projects: Vec<ProjectConfig>,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_environment(false)
    }
}

impl RunConfig {
    /// Parallel project for everything without `@db:reset`, then a single
    /// worker project for the tests that reset the database
    pub fn for_environment(ci: bool) -> Self {
        let db_reset = Regex::new(&regex::escape(DB_RESET_TAG)).ok();

        let parallel = ProjectConfig {
            grep_invert: db_reset.clone(),
            ..ProjectConfig::new(PARALLEL_PROJECT)
        };
        let sequential = ProjectConfig {
            grep: db_reset,
            workers: Some(1),
            dependencies: vec![PARALLEL_PROJECT.to_string()],
            ..ProjectConfig::new(SEQUENTIAL_PROJECT)
        };

        let workers = if ci {
            2
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };

        Self {
            workers,
            retries: if ci { 2 } else { 0 },
            forbid_only: ci,
            test_timeout: Duration::from_secs(60),
            projects: vec![parallel, sequential],
            output_dir: PathBuf::from("test-results"),
        }
    }

    /// Projects ordered so that every project follows its dependencies
    pub fn ordered_projects(&self) -> E2eResult<Vec<&ProjectConfig>> {
        let mut ordered: Vec<&ProjectConfig> = Vec::with_capacity(self.projects.len());
        let mut remaining: Vec<&ProjectConfig> = self.projects.iter().collect();

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|p| {
                p.dependencies
                    .iter()
                    .all(|dep| ordered.iter().any(|done| done.name == *dep))
            });
            match ready {
                Some(i) => ordered.push(remaining.remove(i)),
                None => {
                    let names: Vec<_> = remaining.iter().map(|p| p.name.as_str()).collect();
                    return Err(E2eError::Config(format!(
                        "unresolvable project dependencies: {}",
                        names.join(", ")
                    )));
                }
            }
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_harness_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (DOCKER_IMAGE_ENV, "n8nio/n8n:nightly"),
            (BASE_URL_ENV, "http://localhost:5678/"),
            (CI_ENV, "true"),
        ]
        .into_iter()
        .collect();

        let config = HarnessConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.service.image, "n8nio/n8n:nightly");
        assert_eq!(config.base_url_override.as_deref(), Some("http://localhost:5678"));
        assert!(config.ci);
    }

    #[test]
    fn test_harness_config_defaults() {
        let config = HarnessConfig::from_lookup(|_| None);
        assert_eq!(config.service.image, "n8nio/n8n:latest");
        assert!(config.base_url_override.is_none());
        assert!(!config.ci);
        assert_eq!(config.playwright.test_id_attribute, "data-test-id");
        assert_eq!(
            (config.playwright.viewport_width, config.playwright.viewport_height),
            (1536, 960)
        );
    }

    #[test]
    fn test_ci_settings() {
        let ci = RunConfig::for_environment(true);
        assert_eq!(ci.workers, 2);
        assert_eq!(ci.retries, 2);
        assert!(ci.forbid_only);

        let local = RunConfig::for_environment(false);
        assert_eq!(local.retries, 0);
        assert!(!local.forbid_only);
        assert!(local.workers >= 1);
    }

    #[test]
    fn test_projects_partition_db_reset_tests() {
        let config = RunConfig::default();
        let parallel = &config.projects[0];
        let sequential = &config.projects[1];

        let reset = TagSet::new(["@db:reset", "@auth:admin"]);
        let plain = TagSet::new(["@auth:admin"]);

        assert!(!parallel.matches("resets", &reset));
        assert!(sequential.matches("resets", &reset));
        assert!(parallel.matches("plain", &plain));
        assert!(!sequential.matches("plain", &plain));

        assert_eq!(sequential.workers, Some(1));
        assert_eq!(sequential.dependencies, vec![PARALLEL_PROJECT.to_string()]);
    }

    #[test]
    fn test_ordered_projects() {
        let mut config = RunConfig::default();
        config.projects.reverse();
        let names: Vec<_> = config
            .ordered_projects()
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec![PARALLEL_PROJECT, SEQUENTIAL_PROJECT]);

        config.projects[1].dependencies = vec![SEQUENTIAL_PROJECT.to_string()];
        assert!(matches!(config.ordered_projects(), Err(E2eError::Config(_))));
    }
}
