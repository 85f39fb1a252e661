//! Project configuration loading.
//!
//! Two files drive the pipeline: `firebase.json` (the project
//! configuration handle named in the request) and `.firebaserc` (the
//! alias map next to it). Both are parsed into typed records at load
//! time; the pipeline never touches raw JSON maps.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default functions source directory, used when `functions.source` is
/// not declared but the directory exists next to `firebase.json`.
pub const DEFAULT_SOURCE_DIR: &str = "functions";

/// `functions.predeploy` accepts a single command or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Predeploy {
    One(String),
    Many(Vec<String>),
}

impl Predeploy {
    pub fn commands(&self) -> &[String] {
        match self {
            Predeploy::One(cmd) => std::slice::from_ref(cmd),
            Predeploy::Many(cmds) => cmds,
        }
    }
}

/// The `functions` section of `firebase.json`. Only the fields the
/// discovery pipeline consumes are modeled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionsSection {
    pub source: Option<String>,
    pub runtime: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub predeploy: Option<Predeploy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FirebaseJson {
    #[serde(default)]
    functions: Option<FunctionsSection>,
}

/// Parsed `firebase.json` plus the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Directory containing `firebase.json`; all relative paths in the
    /// configuration resolve against it.
    pub project_dir: PathBuf,
    functions: FunctionsSection,
}

impl ProjectConfig {
    /// Loads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let parsed: FirebaseJson = serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        let project_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        Ok(ProjectConfig {
            project_dir,
            functions: parsed.functions.unwrap_or_default(),
        })
    }

    /// The configured functions source directory name.
    ///
    /// Falls back to `functions` when that directory exists next to
    /// `firebase.json`; absence of both is a fatal configuration error
    /// reported before any delegate resolution.
    pub fn source_dir_name(&self) -> Result<String> {
        if let Some(source) = &self.functions.source {
            if !source.trim().is_empty() {
                return Ok(source.clone());
            }
        }
        if self.project_dir.join(DEFAULT_SOURCE_DIR).is_dir() {
            return Ok(DEFAULT_SOURCE_DIR.to_string());
        }
        Err(Error::Configuration(format!(
            "No functions code detected at default location (./{DEFAULT_SOURCE_DIR}), \
             and no functions.source defined in firebase.json"
        )))
    }

    /// Path of the functions source directory.
    pub fn source_dir(&self) -> Result<PathBuf> {
        Ok(self.project_dir.join(self.source_dir_name()?))
    }

    /// Declared runtime id, empty string meaning auto-detect.
    pub fn runtime(&self) -> &str {
        self.functions.runtime.as_deref().unwrap_or("")
    }

    /// Project-declared packaging ignore patterns, when any.
    pub fn ignore(&self) -> Option<&[String]> {
        self.functions.ignore.as_deref()
    }

    /// Predeploy hook commands, empty when none declared.
    pub fn predeploy(&self) -> &[String] {
        self.functions
            .predeploy
            .as_ref()
            .map(Predeploy::commands)
            .unwrap_or(&[])
    }
}

/// Parsed `.firebaserc`: the project alias map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectRc {
    #[serde(default)]
    projects: BTreeMap<String, String>,
}

impl ProjectRc {
    /// Loads `.firebaserc` from the project directory. A missing file is
    /// an empty alias map, not an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(".firebaserc");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectRc::default())
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("failed to parse {}: {e}", path.display())))
    }

    /// Resolves an alias to a project id. An unknown alias is taken to
    /// be a raw project id.
    pub fn resolve_alias(&self, alias: &str) -> String {
        self.projects
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("firebase.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_functions_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"functions":{"source":"fns","runtime":"nodejs20","ignore":["dist"],"predeploy":"npm run lint"}}"#,
        );
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.source_dir_name().unwrap(), "fns");
        assert_eq!(config.runtime(), "nodejs20");
        assert_eq!(config.ignore(), Some(&["dist".to_string()][..]));
        assert_eq!(config.predeploy(), &["npm run lint".to_string()]);
    }

    #[test]
    fn predeploy_accepts_a_list() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"functions":{"source":"fns","predeploy":["npm run lint","npm run build"]}}"#,
        );
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.predeploy().len(), 2);
    }

    #[test]
    fn source_defaults_to_functions_dir_when_present() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("functions")).unwrap();
        let path = write_config(dir.path(), r#"{"functions":{}}"#);
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.source_dir_name().unwrap(), "functions");
    }

    #[test]
    fn missing_source_with_no_default_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), r#"{}"#);
        let config = ProjectConfig::load(&path).unwrap();
        let err = config.source_dir_name().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("functions.source"));
    }

    #[test]
    fn unparsable_config_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), "{nope");
        assert!(matches!(
            ProjectConfig::load(&path),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn rc_resolves_known_alias() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".firebaserc"),
            r#"{"projects":{"default":"my-project-id"}}"#,
        )
        .unwrap();
        let rc = ProjectRc::load(dir.path()).unwrap();
        assert_eq!(rc.resolve_alias("default"), "my-project-id");
    }

    #[test]
    fn rc_passes_unknown_alias_through_as_project_id() {
        let dir = TempDir::new().unwrap();
        let rc = ProjectRc::load(dir.path()).unwrap();
        assert_eq!(rc.resolve_alias("raw-project-id"), "raw-project-id");
    }

    #[test]
    fn missing_firebaserc_is_an_empty_map() {
        let dir = TempDir::new().unwrap();
        let rc = ProjectRc::load(dir.path()).unwrap();
        assert_eq!(rc.resolve_alias("anything"), "anything");
    }
}
