use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use shaderprog::FatalPolicy;

pub const DEFAULT_MANIFEST: &str = "programs.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    pub version: u32,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub programs: ProgramsConfig,
}

/// Where shader sources and the program manifest live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extension: default_extension(),
            manifest: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProgramsConfig {
    #[serde(
        default,
        deserialize_with = "deserialize_fatal_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub fatal: Option<FatalMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<bool>,
}

/// What a host does when a program fails to compile or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalMode {
    #[default]
    Abort,
    Propagate,
}

impl From<FatalMode> for FatalPolicy {
    fn from(mode: FatalMode) -> Self {
        match mode {
            FatalMode::Abort => FatalPolicy::Abort,
            FatalMode::Propagate => FatalPolicy::Propagate,
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("shaders")]
}

fn default_extension() -> String {
    "glsl".to_string()
}

fn deserialize_fatal_opt<'de, D>(deserializer: D) -> Result<Option<FatalMode>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Bool(bool),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let result = match helper {
        None => None,
        Some(Helper::Str(raw)) => Some(parse_fatal(&raw).map_err(de::Error::custom)?),
        Some(Helper::Bool(true)) => Some(FatalMode::Abort),
        Some(Helper::Bool(false)) => Some(FatalMode::Propagate),
    };
    Ok(result)
}

fn parse_fatal(raw: &str) -> Result<FatalMode, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "abort" | "exit" | "terminate" => Ok(FatalMode::Abort),
        "propagate" | "return" | "error" => Ok(FatalMode::Propagate),
        other => Err(format!(
            "invalid fatal policy '{other}'; expected 'abort' or 'propagate'"
        )),
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RuntimeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn fatal_mode(&self) -> FatalMode {
        self.programs.fatal.unwrap_or_default()
    }

    /// Policy a host hands to its program registry.
    pub fn fatal_policy(&self) -> FatalPolicy {
        self.fatal_mode().into()
    }

    /// Driver validation after linking; defaults to on in debug builds.
    pub fn validate_programs(&self) -> bool {
        self.programs.validate.unwrap_or(cfg!(debug_assertions))
    }

    /// Search roots with relative entries anchored at `base` (usually the
    /// directory holding the config file).
    pub fn resolved_roots(&self, base: &Path) -> Vec<PathBuf> {
        self.library
            .roots
            .iter()
            .map(|root| anchor(root, base))
            .collect()
    }

    /// Manifest path: the configured one anchored at `base`, otherwise
    /// `programs.toml` in the first search root.
    pub fn resolved_manifest(&self, base: &Path) -> PathBuf {
        match &self.library.manifest {
            Some(manifest) => anchor(manifest, base),
            None => {
                let first = self
                    .library
                    .roots
                    .first()
                    .map(|root| anchor(root, base))
                    .unwrap_or_else(|| base.to_path_buf());
                first.join(DEFAULT_MANIFEST)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.library.roots.is_empty() {
            return Err(ConfigError::Invalid(
                "library.roots must name at least one directory".into(),
            ));
        }

        if self
            .library
            .roots
            .iter()
            .any(|root| root.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid(
                "library.roots may not contain an empty path".into(),
            ));
        }

        let extension = self.library.extension.trim();
        if extension.is_empty() {
            return Err(ConfigError::Invalid(
                "library.extension may not be empty".into(),
            ));
        }
        if extension.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "library.extension '{extension}' must not contain path separators"
            )));
        }

        if let Some(manifest) = &self.library.manifest {
            if manifest.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "library.manifest may not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            library: LibraryConfig::default(),
            programs: ProgramsConfig::default(),
        }
    }
}

fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[library]
roots = ["shaders", "/opt/engine/shaders"]
extension = "glsl"
manifest = "config/programs.toml"

[programs]
fatal = "propagate"
validate = true
"#;

    #[test]
    fn parses_sample_config() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.fatal_mode(), FatalMode::Propagate);
        assert_eq!(config.fatal_policy(), FatalPolicy::Propagate);
        assert!(config.validate_programs());

        let base = Path::new("/srv/game");
        assert_eq!(
            config.resolved_roots(base),
            vec![
                PathBuf::from("/srv/game/shaders"),
                PathBuf::from("/opt/engine/shaders"),
            ]
        );
        assert_eq!(
            config.resolved_manifest(base),
            PathBuf::from("/srv/game/config/programs.toml")
        );
    }

    #[test]
    fn sparse_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("version = 1\n").expect("parse config");
        assert_eq!(config.library.roots, vec![PathBuf::from("shaders")]);
        assert_eq!(config.library.extension, "glsl");
        assert_eq!(config.fatal_mode(), FatalMode::Abort);
        assert_eq!(config.fatal_policy(), FatalPolicy::default());
        assert_eq!(
            config.resolved_manifest(Path::new("/srv")),
            PathBuf::from("/srv/shaders/programs.toml")
        );
    }

    #[test]
    fn fatal_accepts_booleans_and_aliases() {
        let config =
            RuntimeConfig::from_toml_str("version = 1\n[programs]\nfatal = false\n").unwrap();
        assert_eq!(config.fatal_mode(), FatalMode::Propagate);
        let config =
            RuntimeConfig::from_toml_str("version = 1\n[programs]\nfatal = \"Exit\"\n").unwrap();
        assert_eq!(config.fatal_mode(), FatalMode::Abort);
    }

    #[test]
    fn rejects_unknown_fatal_policy() {
        let err = RuntimeConfig::from_toml_str("version = 1\n[programs]\nfatal = \"ignore\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_wrong_version() {
        let err = RuntimeConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_roots_and_extension() {
        let err = RuntimeConfig::from_toml_str("version = 1\n[library]\nroots = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            RuntimeConfig::from_toml_str("version = 1\n[library]\nextension = \" \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let rendered = toml::to_string(&RuntimeConfig::default()).expect("serialize");
        let parsed = RuntimeConfig::from_toml_str(&rendered).expect("parse");
        assert_eq!(parsed.library.roots, vec![PathBuf::from("shaders")]);
        assert_eq!(parsed.programs.fatal, None);
    }
}
