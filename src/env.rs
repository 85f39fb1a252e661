//! Environment variable aggregation.
//!
//! Two sources feed the merged environment: variables derived from the
//! remote project configuration and variables the user declares in
//! dotenv files next to the functions source. User values win on key
//! collision.

use crate::api::FirebaseProjectConfig;
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Merged environment map, ordered for stable output.
pub type EnvMap = BTreeMap<String, String>;

/// Keys the platform owns; user env files may not set them.
const RESERVED_KEYS: &[&str] = &[
    "FIREBASE_CONFIG",
    "CLOUD_RUNTIME_CONFIG",
    "ENTRY_POINT",
    "GCP_PROJECT",
    "GCLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "FUNCTION_TRIGGER_TYPE",
    "FUNCTION_NAME",
    "FUNCTION_MEMORY_MB",
    "FUNCTION_TIMEOUT_SEC",
    "FUNCTION_IDENTITY",
    "FUNCTION_REGION",
    "FUNCTION_TARGET",
    "FUNCTION_SIGNATURE_TYPE",
    "K_SERVICE",
    "K_REVISION",
    "K_CONFIGURATION",
    "PORT",
];

const RESERVED_PREFIX: &str = "X_GOOGLE_";

/// Merges the two environment sources. User-supplied variables override
/// remote project variables on key collision. Pure; absent inputs are
/// empty maps.
pub fn merge(remote: &EnvMap, user: &EnvMap) -> EnvMap {
    let mut merged = remote.clone();
    merged.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Variables every function receives from the resolved project:
/// `FIREBASE_CONFIG` (the admin SDK config as compact JSON) and
/// `GCLOUD_PROJECT`.
pub fn firebase_envs(config: &FirebaseProjectConfig, project_id: &str) -> Result<EnvMap> {
    let mut envs = EnvMap::new();
    envs.insert(
        "FIREBASE_CONFIG".to_string(),
        serde_json::to_string(config)
            .map_err(|e| Error::Configuration(format!("unserializable project config: {e}")))?,
    );
    envs.insert("GCLOUD_PROJECT".to_string(), project_id.to_string());
    Ok(envs)
}

/// Loads user dotenv files from the functions source directory.
///
/// Files are applied in increasing precedence: `.env`,
/// `.env.<project_id>`, `.env.<alias>` (only when the alias differs from
/// the id), `.env.local`. Missing files are skipped; parse failures and
/// reserved keys are configuration errors.
pub fn load_user_envs(source_dir: &Path, project_id: &str, alias: &str) -> Result<EnvMap> {
    let mut names = vec![".env".to_string(), format!(".env.{project_id}")];
    if alias != project_id {
        names.push(format!(".env.{alias}"));
    }
    names.push(".env.local".to_string());

    let mut envs = EnvMap::new();
    for name in names {
        let path = source_dir.join(&name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io(path, e)),
        };
        envs.extend(parse_env_content(&name, &content)?);
    }
    Ok(envs)
}

/// Parses one dotenv file. Supported subset: `KEY=VALUE` lines, optional
/// `export ` prefix, `#` comment lines, single or double quoted values,
/// `\n` `\r` `\t` `\\` `\"` escapes inside double quotes.
fn parse_env_content(file_name: &str, content: &str) -> Result<EnvMap> {
    let key_re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
    let mut envs = EnvMap::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::Configuration(format!(
                "{file_name}:{}: expected KEY=VALUE, got {raw_line:?}",
                idx + 1
            ))
        })?;
        let key = key.trim();
        if !key_re.is_match(key) {
            return Err(Error::Configuration(format!(
                "{file_name}:{}: invalid environment variable key {key:?}",
                idx + 1
            )));
        }
        if RESERVED_KEYS.contains(&key) || key.starts_with(RESERVED_PREFIX) {
            return Err(Error::Configuration(format!(
                "{file_name}:{}: {key} is reserved for internal use",
                idx + 1
            )));
        }

        envs.insert(key.to_string(), parse_value(file_name, idx + 1, value)?);
    }
    Ok(envs)
}

fn parse_value(file_name: &str, line_no: usize, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner.strip_suffix('"').ok_or_else(|| {
            Error::Configuration(format!("{file_name}:{line_no}: unterminated double quote"))
        })?;
        return unescape(file_name, line_no, inner);
    }
    if let Some(inner) = raw.strip_prefix('\'') {
        let inner = inner.strip_suffix('\'').ok_or_else(|| {
            Error::Configuration(format!("{file_name}:{line_no}: unterminated single quote"))
        })?;
        return Ok(inner.to_string());
    }
    Ok(raw.to_string())
}

fn unescape(file_name: &str, line_no: usize, raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            other => {
                return Err(Error::Configuration(format!(
                    "{file_name}:{line_no}: unsupported escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn user_wins_on_collision() {
        let remote = map(&[("A", "1"), ("B", "2")]);
        let user = map(&[("B", "3"), ("C", "4")]);
        assert_eq!(merge(&remote, &user), map(&[("A", "1"), ("B", "3"), ("C", "4")]));
    }

    #[test]
    fn merge_treats_absent_inputs_as_empty() {
        let remote = map(&[("A", "1")]);
        assert_eq!(merge(&remote, &EnvMap::new()), remote);
        assert_eq!(merge(&EnvMap::new(), &remote), remote);
        assert!(merge(&EnvMap::new(), &EnvMap::new()).is_empty());
    }

    #[test]
    fn firebase_envs_carry_config_and_project() {
        let config = FirebaseProjectConfig {
            project_id: "my-project".to_string(),
            database_url: Some("https://my-project.firebaseio.com".to_string()),
            storage_bucket: Some("my-project.appspot.com".to_string()),
            location_id: None,
        };
        let envs = firebase_envs(&config, "my-project").unwrap();
        assert_eq!(envs["GCLOUD_PROJECT"], "my-project");
        let parsed: serde_json::Value = serde_json::from_str(&envs["FIREBASE_CONFIG"]).unwrap();
        assert_eq!(parsed["projectId"], "my-project");
        assert_eq!(parsed["databaseURL"], "https://my-project.firebaseio.com");
    }

    #[test]
    fn parses_quotes_comments_and_exports() {
        let envs = parse_env_content(
            ".env",
            r#"
# comment
PLAIN=one
export EXPORTED=two
SINGLE='a # b'
DOUBLE="line1\nline2"
SPACED =  three
"#,
        )
        .unwrap();
        assert_eq!(envs["PLAIN"], "one");
        assert_eq!(envs["EXPORTED"], "two");
        assert_eq!(envs["SINGLE"], "a # b");
        assert_eq!(envs["DOUBLE"], "line1\nline2");
        assert_eq!(envs["SPACED"], "three");
    }

    #[test]
    fn rejects_reserved_keys() {
        for line in ["FIREBASE_CONFIG=x", "PORT=8080", "X_GOOGLE_THING=1"] {
            let err = parse_env_content(".env", line).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "accepted: {line}");
            assert!(err.to_string().contains("reserved"));
        }
    }

    #[test]
    fn rejects_invalid_keys_and_lines() {
        assert!(parse_env_content(".env", "1BAD=x").is_err());
        assert!(parse_env_content(".env", "NOEQUALS").is_err());
        assert!(parse_env_content(".env", "OPEN=\"unterminated").is_err());
    }

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "SHARED=base\nONLY_BASE=1\n").unwrap();
        fs::write(dir.path().join(".env.my-project"), "SHARED=project\n").unwrap();
        fs::write(dir.path().join(".env.local"), "SHARED=local\n").unwrap();

        let envs = load_user_envs(dir.path(), "my-project", "my-project").unwrap();
        assert_eq!(envs["SHARED"], "local");
        assert_eq!(envs["ONLY_BASE"], "1");
    }

    #[test]
    fn alias_file_is_read_only_when_alias_differs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env.staging"), "FROM_ALIAS=1\n").unwrap();

        let envs = load_user_envs(dir.path(), "my-project", "staging").unwrap();
        assert_eq!(envs["FROM_ALIAS"], "1");

        let envs = load_user_envs(dir.path(), "my-project", "my-project").unwrap();
        assert!(envs.is_empty());
    }

    #[test]
    fn no_env_files_is_an_empty_map() {
        let dir = TempDir::new().unwrap();
        let envs = load_user_envs(dir.path(), "p", "p").unwrap();
        assert!(envs.is_empty());
    }
}
