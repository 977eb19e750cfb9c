//! trellis configuration file handling
//!
//! Loads and validates the trellis.yaml project manifest from the working
//! directory: target project URL, status backend choice, and the
//! required-section map per issue kind.

use crate::model::IssueKind;
use crate::{Result, TrellisError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default config file name, resolved against the current directory.
pub const CONFIG_FILE: &str = "trellis.yaml";

/// How workflow state is projected onto the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMethod {
    /// A single `status:<state>` label at a time
    Labels,
    /// A single-select Status field on a project board
    StatusField,
}

impl StatusMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Labels => "labels",
            Self::StatusField => "status_field",
        }
    }
}

/// Parsed shape of the `project_url` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectUrl {
    Repo {
        owner: String,
        repo: String,
    },
    Project {
        /// `orgs` or `users`
        scope: String,
        owner: String,
        number: u64,
    },
}

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/]+)/([^/]+?)/?$").expect("static pattern")
    })
}

fn project_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://github\.com/(orgs|users)/([^/]+)/projects/(\d+)/?$")
            .expect("static pattern")
    })
}

impl ProjectUrl {
    /// Parse a project URL. Repository root and project-board shapes only.
    pub fn parse(url: &str) -> Option<Self> {
        if let Some(caps) = project_url_pattern().captures(url) {
            return Some(Self::Project {
                scope: caps[1].to_string(),
                owner: caps[2].to_string(),
                number: caps[3].parse().ok()?,
            });
        }
        if let Some(caps) = repo_url_pattern().captures(url) {
            // Reserved path segments that are not owners
            if matches!(&caps[1], "orgs" | "users") {
                return None;
            }
            return Some(Self::Repo {
                owner: caps[1].to_string(),
                repo: caps[2].to_string(),
            });
        }
        None
    }

    /// Status backend implied by the URL shape when the config is silent.
    pub fn default_status_method(&self) -> StatusMethod {
        match self {
            Self::Repo { .. } => StatusMethod::Labels,
            Self::Project { .. } => StatusMethod::StatusField,
        }
    }
}

/// Raw YAML shape of trellis.yaml.
#[derive(Debug, Deserialize)]
struct RawConfig {
    project_url: Option<String>,
    status_method: Option<String>,
    #[serde(default)]
    required_sections: BTreeMap<String, Vec<String>>,
}

/// Validated trellis configuration. Read-only after load.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_url: String,
    pub parsed_url: ProjectUrl,
    pub status_method: StatusMethod,
    required_sections: BTreeMap<IssueKind, Vec<String>>,
}

impl Config {
    /// Load configuration from `trellis.yaml` in the current directory.
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new(CONFIG_FILE))
    }

    /// Load configuration from a specific path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrellisError::ConfigMissing(path.to_path_buf()));
        }

        tracing::debug!(path = %path.display(), "Loading trellis configuration");

        let content = fs::read_to_string(path)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| TrellisError::ConfigInvalid {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        Self::from_raw(raw, path)
    }

    fn from_raw(raw: RawConfig, path: &Path) -> Result<Self> {
        let project_url = raw
            .project_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TrellisError::ConfigMissingField("project_url".to_string()))?
            .to_string();

        let parsed_url = ProjectUrl::parse(&project_url).ok_or_else(|| {
            TrellisError::ConfigInvalid {
                path: path.to_path_buf(),
                detail: format!(
                    "invalid project_url '{project_url}'; expected \
                     https://github.com/owner/repo or \
                     https://github.com/orgs/<org>/projects/<n>"
                ),
            }
        })?;

        let status_method = match raw.status_method.as_deref() {
            None => parsed_url.default_status_method(),
            Some("labels") => StatusMethod::Labels,
            Some("status_field") => StatusMethod::StatusField,
            Some(other) => {
                return Err(TrellisError::ConfigInvalid {
                    path: path.to_path_buf(),
                    detail: format!(
                        "invalid status_method '{other}'; valid options: labels, status_field"
                    ),
                })
            }
        };

        let mut required_sections = BTreeMap::new();
        for (key, sections) in raw.required_sections {
            let kind = IssueKind::parse(&key).ok_or_else(|| TrellisError::ConfigInvalid {
                path: path.to_path_buf(),
                detail: format!(
                    "unknown issue kind '{key}' in required_sections; \
                     valid options: epic, task, sub-task"
                ),
            })?;
            required_sections.insert(kind, sections);
        }

        Ok(Self {
            project_url,
            parsed_url,
            status_method,
            required_sections,
        })
    }

    /// Build a config directly, bypassing the file system. Used by tests and
    /// by callers that already resolved the project coordinates.
    pub fn new(project_url: &str, status_method: Option<StatusMethod>) -> Result<Self> {
        let parsed_url = ProjectUrl::parse(project_url).ok_or_else(|| {
            TrellisError::ConfigInvalid {
                path: PathBuf::from(CONFIG_FILE),
                detail: format!("invalid project_url '{project_url}'"),
            }
        })?;
        let status_method = status_method.unwrap_or_else(|| parsed_url.default_status_method());
        Ok(Self {
            project_url: project_url.to_string(),
            parsed_url,
            status_method,
            required_sections: BTreeMap::new(),
        })
    }

    /// Required section titles for a kind, falling back to the built-in
    /// defaults when the config does not override them.
    pub fn required_sections(&self, kind: IssueKind) -> Vec<String> {
        if let Some(sections) = self.required_sections.get(&kind) {
            return sections.clone();
        }
        match kind {
            IssueKind::Epic => vec![
                "Summary".to_string(),
                "Acceptance Criteria".to_string(),
                "Milestone Plan".to_string(),
            ],
            IssueKind::Task => vec![
                "Summary".to_string(),
                "Acceptance Criteria".to_string(),
                "Implementation Plan".to_string(),
            ],
            IssueKind::SubTask => {
                vec!["Summary".to_string(), "Acceptance Criteria".to_string()]
            }
            IssueKind::Issue => Vec::new(),
        }
    }

    /// The repository the config points at, when the URL is repo-shaped.
    pub fn repo(&self) -> Option<crate::model::RepoRef> {
        match &self.parsed_url {
            ProjectUrl::Repo { owner, repo } => Some(crate::model::RepoRef {
                owner: owner.clone(),
                repo: repo.clone(),
            }),
            ProjectUrl::Project { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_repo_url_defaults_to_labels() {
        let file = write_config("project_url: https://github.com/acme/svc\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.status_method, StatusMethod::Labels);
        assert_eq!(
            config.parsed_url,
            ProjectUrl::Repo {
                owner: "acme".into(),
                repo: "svc".into()
            }
        );
    }

    #[test]
    fn test_load_project_url_defaults_to_status_field() {
        let file =
            write_config("project_url: https://github.com/orgs/acme/projects/7\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.status_method, StatusMethod::StatusField);
        assert_eq!(
            config.parsed_url,
            ProjectUrl::Project {
                scope: "orgs".into(),
                owner: "acme".into(),
                number: 7
            }
        );
    }

    #[test]
    fn test_explicit_status_method_wins() {
        let file = write_config(
            "project_url: https://github.com/acme/svc\nstatus_method: status_field\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.status_method, StatusMethod::StatusField);
    }

    #[test]
    fn test_invalid_status_method() {
        let file = write_config(
            "project_url: https://github.com/acme/svc\nstatus_method: comments\n",
        );
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, TrellisError::ConfigInvalid { .. }));
        assert!(err.to_string().contains("status_field"));
    }

    #[test]
    fn test_missing_project_url() {
        let file = write_config("status_method: labels\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, TrellisError::ConfigMissingField(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/trellis.yaml")).unwrap_err();
        assert!(matches!(err, TrellisError::ConfigMissing(_)));
    }

    #[test]
    fn test_invalid_url_rejected() {
        for url in [
            "https://github.com/acme",
            "https://github.com/acme/svc/issues",
            "http://github.com/acme/svc",
            "https://gitlab.com/acme/svc",
        ] {
            let file = write_config(&format!("project_url: {url}\n"));
            assert!(Config::load(file.path()).is_err(), "accepted {url}");
        }
    }

    #[test]
    fn test_required_sections_defaults() {
        let file = write_config("project_url: https://github.com/acme/svc\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.required_sections(IssueKind::Epic),
            vec!["Summary", "Acceptance Criteria", "Milestone Plan"]
        );
        assert_eq!(
            config.required_sections(IssueKind::Task),
            vec!["Summary", "Acceptance Criteria", "Implementation Plan"]
        );
        assert_eq!(
            config.required_sections(IssueKind::SubTask),
            vec!["Summary", "Acceptance Criteria"]
        );
    }

    #[test]
    fn test_required_sections_override_and_subtask_spelling() {
        let file = write_config(
            "project_url: https://github.com/acme/svc\nrequired_sections:\n  subtask:\n    - Summary\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.required_sections(IssueKind::SubTask), vec!["Summary"]);
        // Unoverridden kinds keep defaults
        assert_eq!(config.required_sections(IssueKind::Epic).len(), 3);
    }

    #[test]
    fn test_unknown_required_sections_kind() {
        let file = write_config(
            "project_url: https://github.com/acme/svc\nrequired_sections:\n  story:\n    - Summary\n",
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_yaml_parse_error_reports_path() {
        let file = write_config("project_url: [unclosed\n");
        let err = Config::load(file.path()).unwrap_err();
        match err {
            TrellisError::ConfigInvalid { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
