//! # Profile Loader
//!
//! A profile is a directory:
//!
//! ```text
//! mssql2014/
//!   profile.toml      optional metadata (name, title, version, summary)
//!   attributes.toml   optional profile-level attribute values
//!   controls/         *.json / *.toml control files, searched recursively
//! ```
//!
//! Without a `controls/` subdirectory the profile root itself is searched.
//! A single control file may also be loaded directly. Files are visited in
//! sorted path order so the control order is stable across runs.

use super::error::ProfileError;
use crate::attributes::{read_values_file, AttributeStore};
use crate::types::Control;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const METADATA_FILE: &str = "profile.toml";
pub const ATTRIBUTES_FILE: &str = "attributes.toml";
pub const CONTROLS_DIR: &str = "controls";
/// Recorded probe snapshots live beside controls and are never loaded as controls
pub const FIXTURES_DIR: &str = "fixtures";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileMetadata {
    pub name: String,
    pub title: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
}

/// Loaded controls plus the attribute declarations they make
#[derive(Debug, Clone)]
pub struct Profile {
    pub metadata: ProfileMetadata,
    pub root: PathBuf,
    controls: Vec<Control>,
    attributes: AttributeStore,
}

impl Profile {
    /// Build from already-parsed controls
    pub fn from_controls(
        metadata: ProfileMetadata,
        root: PathBuf,
        controls: Vec<Control>,
    ) -> Result<Self, ProfileError> {
        let mut seen = BTreeSet::new();
        let mut attributes = AttributeStore::new();

        for control in &controls {
            if !seen.insert(control.id.clone()) {
                return Err(ProfileError::DuplicateControl {
                    id: control.id.clone(),
                });
            }
            for attribute in &control.attributes {
                attributes.register(attribute.clone()).map_err(|source| {
                    ProfileError::ConflictingAttribute {
                        control_id: control.id.clone(),
                        source,
                    }
                })?;
            }
        }

        Ok(Self {
            metadata,
            root,
            controls,
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|control| control.id == id)
    }

    pub fn attribute_store(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn defective_controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter().filter(|control| control.defect.is_some())
    }

    fn with_profile_values(mut self, path: &Path) -> Result<Self, ProfileError> {
        let values = read_values_file(path).map_err(ProfileError::AttributeValues)?;
        debug!("Loaded {} profile attribute values from {}", values.len(), path.display());
        self.attributes = self.attributes.with_profile_values(values);
        Ok(self)
    }
}

/// Load a profile directory or a single control file
pub fn load_profile(path: &Path) -> Result<Profile, ProfileError> {
    if !path.exists() {
        return Err(ProfileError::NotFound {
            path: path.display().to_string(),
        });
    }

    if path.is_file() {
        let metadata = ProfileMetadata {
            name: file_stem(path),
            ..ProfileMetadata::default()
        };
        let controls = load_control_file(path)?;
        return Profile::from_controls(metadata, path.to_path_buf(), controls);
    }

    let metadata = read_metadata(path)?;
    let controls_root = match path.join(CONTROLS_DIR) {
        dir if dir.is_dir() => dir,
        _ => path.to_path_buf(),
    };

    let mut controls = Vec::new();
    for file in discover_control_files(&controls_root)? {
        controls.extend(load_control_file(&file)?);
    }
    if controls.is_empty() {
        return Err(ProfileError::Empty {
            path: path.display().to_string(),
        });
    }

    let mut profile = Profile::from_controls(metadata, path.to_path_buf(), controls)?;
    let values_path = path.join(ATTRIBUTES_FILE);
    if values_path.is_file() {
        profile = profile.with_profile_values(&values_path)?;
    }

    let defective = profile.defective_controls().count();
    info!(
        "Loaded profile '{}': {} controls ({} defective)",
        profile.name(),
        profile.controls().len(),
        defective
    );
    Ok(profile)
}

fn read_metadata(root: &Path) -> Result<ProfileMetadata, ProfileError> {
    let path = root.join(METADATA_FILE);
    let mut metadata = if path.is_file() {
        let content = std::fs::read_to_string(&path).map_err(|e| ProfileError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str::<ProfileMetadata>(&content).map_err(|e| ProfileError::Metadata {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
    } else {
        ProfileMetadata::default()
    };

    if metadata.name.is_empty() {
        metadata.name = root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "profile".to_string());
    }
    Ok(metadata)
}

/// Control files under `root`, sorted by path
pub fn discover_control_files(root: &Path) -> Result<Vec<PathBuf>, ProfileError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != FIXTURES_DIR);

    for entry in walker {
        let entry = entry.map_err(|e| ProfileError::Io {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() == 1 && (name == METADATA_FILE || name == ATTRIBUTES_FILE) {
            continue;
        }
        if is_control_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_control_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json") | Some("toml")
    )
}

/// Parse one file into controls; unparsable content becomes defective controls
pub fn load_control_file(path: &Path) -> Result<Vec<Control>, ProfileError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let stem = file_stem(path);

    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let parsed = if is_toml {
        toml::from_str::<Value>(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
    };

    let controls = match parsed {
        Ok(value) => controls_from_value(value, &stem),
        Err(reason) => {
            warn!("Control file {} is malformed: {}", path.display(), reason);
            vec![Control::defective(stem, format!("{}: {}", path.display(), reason))]
        }
    };
    Ok(controls)
}

fn controls_from_value(value: Value, fallback_id: &str) -> Vec<Control> {
    let is_bundle = value.get("controls").is_some() && value.get("id").is_none();
    if !is_bundle {
        return vec![control_from_value(value, fallback_id)];
    }

    match value.get("controls") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                control_from_value(item.clone(), &format!("{}#{}", fallback_id, index + 1))
            })
            .collect(),
        _ => vec![Control::defective(
            fallback_id,
            "'controls' must be an array of control definitions",
        )],
    }
}

fn control_from_value(value: Value, fallback_id: &str) -> Control {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(fallback_id)
        .to_string();

    match serde_json::from_value::<Control>(value) {
        Ok(control) => control,
        Err(e) => {
            warn!("Control {} is malformed: {}", id, e);
            Control::defective(id, e.to_string())
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeOverrides;
    use crate::types::{ProbeValue, Severity};
    use assert_matches::assert_matches;
    use std::fs;

    const TRACE_CONTROL: &str = r#"{
        "id": "V-67931",
        "impact": 0.5,
        "attributes": [
            {"name": "server_trace_implemented", "default": true}
        ],
        "body": {
            "combinator": "all",
            "children": [
                {"assertion": {
                    "subject": {"attribute": {"name": "server_trace_implemented"}},
                    "matcher": {"kind": "equals"},
                    "expected": true
                }}
            ]
        }
    }"#;

    const MANUAL_CONTROL: &str = r#"
id = "V-67873"
title = "SQL Server must protect the keys of audit data"
impact = 0.5
skip = "Manual: review the key management procedures"
"#;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_directory_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "profile.toml", "name = \"mssql2014\"\nversion = \"1.0.0\"\n");
        write(dir.path(), "controls/V-67931.json", TRACE_CONTROL);
        write(dir.path(), "controls/V-67873.toml", MANUAL_CONTROL);
        write(dir.path(), "fixtures/target.json", "{\"probes\": []}");

        let profile = load_profile(dir.path()).unwrap();
        assert_eq!(profile.name(), "mssql2014");
        assert_eq!(profile.metadata.version.as_deref(), Some("1.0.0"));
        let ids: Vec<&str> = profile.controls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["V-67873", "V-67931"]);
        assert!(profile.control("V-67873").unwrap().is_manual());
    }

    #[test]
    fn test_malformed_file_becomes_defective_control() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "V-67931.json", TRACE_CONTROL);
        write(dir.path(), "V-67769.json", "{\"id\": \"V-67769\", \"body\": {\"combinator\": \"any\"}}");
        write(dir.path(), "V-1.json", "{ not json");

        let profile = load_profile(dir.path()).unwrap();
        assert_eq!(profile.controls().len(), 3);

        let defective: Vec<&str> = profile.defective_controls().map(|c| c.id.as_str()).collect();
        assert_eq!(defective, vec!["V-1", "V-67769"]);
    }

    #[test]
    fn test_bundle_file() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = format!(
            "{{\"controls\": [{}, {{\"id\": \"V-2\", \"impact\": 0.9, \"skip\": \"manual\"}}]}}",
            TRACE_CONTROL
        );
        let path = dir.path().join("bundle.json");
        fs::write(&path, bundle).unwrap();

        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.name(), "bundle");
        assert_eq!(profile.controls().len(), 2);
        assert_eq!(profile.control("V-2").unwrap().severity(), Severity::Critical);
    }

    #[test]
    fn test_profile_values_feed_attribute_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "controls/V-67931.json", TRACE_CONTROL);
        write(dir.path(), "attributes.toml", "server_trace_implemented = false\n");

        let profile = load_profile(dir.path()).unwrap();
        let value = profile
            .attribute_store()
            .resolve("server_trace_implemented", &AttributeOverrides::new())
            .unwrap();
        assert_eq!(value, ProbeValue::Boolean(false));
    }

    #[test]
    fn test_duplicate_control_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", TRACE_CONTROL);
        write(dir.path(), "b.json", TRACE_CONTROL);
        assert_matches!(
            load_profile(dir.path()),
            Err(ProfileError::DuplicateControl { id }) if id == "V-67931"
        );
    }

    #[test]
    fn test_conflicting_attribute_declarations_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", TRACE_CONTROL);
        write(
            dir.path(),
            "b.json",
            &TRACE_CONTROL
                .replace("V-67931", "V-67935")
                .replace("\"default\": true", "\"default\": false"),
        );
        assert_matches!(
            load_profile(dir.path()),
            Err(ProfileError::ConflictingAttribute { control_id, .. }) if control_id == "V-67935"
        );
    }

    #[test]
    fn test_missing_and_empty_profiles() {
        assert_matches!(
            load_profile(Path::new("/nonexistent/profile")),
            Err(ProfileError::NotFound { .. })
        );

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "nothing here");
        assert_matches!(load_profile(dir.path()), Err(ProfileError::Empty { .. }));
    }
}
