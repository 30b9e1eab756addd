//! Configuration types for formfill

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Forms-engine configuration (binary location, execution limits)
///
/// Groups settings for the external filling engine. Used as a nested
/// sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the engine executable (auto-detected from PATH if None)
    #[serde(default)]
    pub engine_path: Option<PathBuf>,

    /// Whether to search PATH for the engine binary if no explicit path is set
    /// (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Wall-clock timeout for one fill invocation (default: 20 seconds)
    ///
    /// On expiry the child process is killed non-gracefully so that slow or
    /// hung invocations cannot accumulate under load.
    #[serde(default = "default_fill_timeout", with = "duration_serde")]
    pub fill_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            search_path: true,
            fill_timeout: default_fill_timeout(),
        }
    }
}

/// Filesystem layout (templates, mappings, working directories)
///
/// Template and mapping files are read-only shared resources; the work
/// parent is where per-request working directories are created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirsConfig {
    /// Directory holding the PDF template files (default: "./forms")
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Directory holding the per-segment mapping JSON files (default: "./mapping")
    #[serde(default = "default_mapping_dir")]
    pub mapping_dir: PathBuf,

    /// Parent directory for per-request working directories (default: "./work")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            mapping_dir: default_mapping_dir(),
            work_dir: default_work_dir(),
        }
    }
}

/// Mail transport configuration (transactional email HTTP API)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailConfig {
    /// Endpoint URL of the transactional email API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Authorization header value sent with each request (e.g., "Bearer ...")
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Sender address
    #[serde(default)]
    pub from: Option<String>,

    /// Default recipient addresses when the request names none
    #[serde(default)]
    pub default_to: Vec<String>,

    /// HTTP timeout for one send (default: 30 seconds)
    #[serde(default = "default_mail_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_header: None,
            from: None,
            default_to: Vec::new(),
            timeout: default_mail_timeout(),
        }
    }
}

/// Dispatch presentation settings (filenames, subject, body)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Display filename per segment (e.g., "acord125" -> "ACORD-125.pdf");
    /// segments without an entry fall back to `<segment>.pdf`
    #[serde(default)]
    pub display_names: HashMap<String, String>,

    /// Form field whose value names the applicant in the default subject line
    #[serde(default = "default_applicant_field")]
    pub applicant_field: String,

    /// Subject prefix for the default mail subject
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Default HTML body when the request provides none
    #[serde(default = "default_body_html")]
    pub body_html: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            display_names: HashMap::new(),
            applicant_field: default_applicant_field(),
            subject_prefix: default_subject_prefix(),
            body_html: default_body_html(),
        }
    }
}

/// Main configuration for the fill service
///
/// Fields are organized into logical sub-configs:
/// - [`engine`](EngineConfig) — external binary location, timeout
/// - [`dirs`](DirsConfig) — template/mapping/work directories
/// - [`mail`](MailConfig) — transactional email API
/// - [`dispatch`](DispatchConfig) — filenames and message presentation
///
/// Sub-config fields are flattened for serialization so the JSON/TOML format
/// stays flat. The structure is loaded once at process start and passed
/// explicitly into the pipeline; no component performs ambient lookups.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Forms-engine settings
    #[serde(flatten)]
    pub engine: EngineConfig,

    /// Filesystem layout
    #[serde(flatten)]
    pub dirs: DirsConfig,

    /// Mail transport settings
    #[serde(flatten)]
    pub mail: MailConfig,

    /// Dispatch presentation settings
    #[serde(flatten)]
    pub dispatch: DispatchConfig,

    /// Derived fields injected into every form record before mapping
    /// (producer constants, agency contact details)
    #[serde(default)]
    pub derived_fields: HashMap<String, String>,
}

// Convenience accessors — delegate to the sub-config structs so call sites
// read naturally.
impl Config {
    /// Template directory
    pub fn template_dir(&self) -> &PathBuf {
        &self.dirs.template_dir
    }

    /// Mapping directory
    pub fn mapping_dir(&self) -> &PathBuf {
        &self.dirs.mapping_dir
    }

    /// Template path for a segment
    pub fn template_path(&self, segment: &str) -> PathBuf {
        self.dirs.template_dir.join(format!("{segment}.pdf"))
    }

    /// Mapping file path for a segment
    pub fn mapping_path(&self, segment: &str) -> PathBuf {
        self.dirs.mapping_dir.join(format!("{segment}.json"))
    }

    /// Display filename for a segment's output artifact
    pub fn display_name(&self, segment: &str) -> String {
        self.dispatch
            .display_names
            .get(segment)
            .cloned()
            .unwrap_or_else(|| format!("{segment}.pdf"))
    }
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("forms")
}

fn default_mapping_dir() -> PathBuf {
    PathBuf::from("mapping")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_true() -> bool {
    true
}

fn default_fill_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_mail_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_applicant_field() -> String {
    "applicant_name".to_string()
}

fn default_subject_prefix() -> String {
    "New Submission".to_string()
}

fn default_body_html() -> String {
    "<p>Submission packet attached.</p>".to_string()
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = Config::default();

        assert_eq!(config.engine.fill_timeout, Duration::from_secs(20));
        assert!(config.engine.search_path);
        assert!(config.engine.engine_path.is_none());
        assert_eq!(config.dirs.template_dir, PathBuf::from("forms"));
        assert_eq!(config.dirs.mapping_dir, PathBuf::from("mapping"));
        assert_eq!(config.dispatch.applicant_field, "applicant_name");
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.engine.fill_timeout, Duration::from_secs(20));
        assert_eq!(config.mail.timeout, Duration::from_secs(30));
        assert!(config.mail.default_to.is_empty());
        assert!(config.derived_fields.is_empty());
    }

    #[test]
    fn flattened_fields_round_trip() {
        let json = serde_json::json!({
            "engine_path": "/usr/local/bin/pdftk",
            "fill_timeout": 45,
            "template_dir": "/srv/forms",
            "endpoint": "https://mail.example.com/send",
            "default_to": ["carrier@example.com"],
            "display_names": { "acord125": "ACORD-125.pdf" },
        });

        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(
            config.engine.engine_path,
            Some(PathBuf::from("/usr/local/bin/pdftk"))
        );
        assert_eq!(config.engine.fill_timeout, Duration::from_secs(45));
        assert_eq!(config.dirs.template_dir, PathBuf::from("/srv/forms"));
        assert_eq!(config.mail.default_to, vec!["carrier@example.com"]);

        // Round-trip preserves the flat layout
        let serialized = serde_json::to_value(&config).unwrap();
        assert_eq!(serialized["fill_timeout"], 45);
        assert_eq!(serialized["engine_path"], "/usr/local/bin/pdftk");

        let reparsed: Config = serde_json::from_value(serialized).unwrap();
        assert_eq!(reparsed.engine.fill_timeout, config.engine.fill_timeout);
    }

    #[test]
    fn segment_paths_are_derived_from_dirs() {
        let config = Config {
            dirs: DirsConfig {
                template_dir: PathBuf::from("/srv/forms"),
                mapping_dir: PathBuf::from("/srv/mapping"),
                work_dir: PathBuf::from("/tmp/work"),
            },
            ..Default::default()
        };

        assert_eq!(
            config.template_path("acord125"),
            PathBuf::from("/srv/forms/acord125.pdf")
        );
        assert_eq!(
            config.mapping_path("acord125"),
            PathBuf::from("/srv/mapping/acord125.json")
        );
    }

    #[test]
    fn display_name_falls_back_to_segment_pdf() {
        let mut config = Config::default();
        config
            .dispatch
            .display_names
            .insert("acord125".into(), "ACORD-125.pdf".into());

        assert_eq!(config.display_name("acord125"), "ACORD-125.pdf");
        assert_eq!(config.display_name("society"), "society.pdf");
    }
}
