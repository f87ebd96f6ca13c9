//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::typemap::CdsKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Base directory that relative paths are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Export bundle location and extraction cache.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Target CAP project.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Statement-file and log output locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Database client used to replay statements.
    #[serde(default)]
    pub client: ClientConfig,

    /// Row encoding behavior.
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Source dialect rules (type table, identity markers).
    #[serde(default)]
    pub dialect: DialectConfig,
}

/// Export bundle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Path to the exported `.tar.gz` bundle (default: "export.tar.gz").
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,

    /// Extraction cache directory (default: "temp_extract").
    #[serde(default = "default_extract_dir")]
    pub extract_dir: PathBuf,

    /// Explicit schema name. Auto-detected from `index/` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
            extract_dir: default_extract_dir(),
            schema: None,
        }
    }
}

/// CAP project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root (default: "cap_project").
    #[serde(default = "default_project_root")]
    pub root: PathBuf,

    /// Schema file relative to the project root (default: "db/schema.cds").
    #[serde(default = "default_schema_file")]
    pub schema_file: PathBuf,

    /// CDS namespace (default: "db").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_project_root(),
            schema_file: default_schema_file(),
            namespace: default_namespace(),
        }
    }
}

impl ProjectConfig {
    /// Database table name CAP deploys for an entity of this namespace.
    ///
    /// `db` + `ORDERS` becomes `DB_ORDERS`; dots in the namespace become underscores.
    pub fn table_name(&self, entity: &str) -> String {
        if self.namespace.is_empty() {
            return entity.to_string();
        }
        format!(
            "{}_{}",
            self.namespace.to_uppercase().replace('.', "_"),
            entity
        )
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Statement-file directory (default: "data_insert_sql").
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,

    /// Log directory (default: "logs").
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory successfully replayed files are moved to (default: "created").
    #[serde(default = "default_executed_dir")]
    pub executed_dir: PathBuf,

    /// Move files into `executed_dir` after a successful replay (default: false).
    #[serde(default)]
    pub move_executed: bool,

    /// Log progress every N statements (default: 1000).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sql_dir: default_sql_dir(),
            log_dir: default_log_dir(),
            executed_dir: default_executed_dir(),
            move_executed: false,
            progress_interval: default_progress_interval(),
        }
    }
}

/// Which client implementation replays statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// The `hdbsql` command-line client, one subprocess per statement.
    #[default]
    Hdbsql,

    /// Native PostgreSQL driver (CAP's PostgreSQL target).
    Postgres,
}

impl std::str::FromStr for ClientKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hdbsql" | "hana" => Ok(ClientKind::Hdbsql),
            "postgres" | "postgresql" | "pg" => Ok(ClientKind::Postgres),
            other => Err(format!("unknown client kind '{}'", other)),
        }
    }
}

/// Database client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client implementation (default: hdbsql).
    #[serde(default)]
    pub kind: ClientKind,

    /// Explicit path to the `hdbsql` binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Fallback installation directory searched for `hdbsql`.
    #[serde(default = "default_client_dir")]
    pub client_dir: PathBuf,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 443, SAP HANA Cloud).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database (tenant) name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema that qualifies target tables in generated statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,

    /// Derive `target_schema` from the user name when it is not set
    /// (`SCHEMA_XXXX_RT` becomes `SCHEMA`).
    #[serde(default)]
    pub derive_schema_from_user: bool,

    /// Per-statement timeout in seconds. Unbounded when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Lower-case stderr fragments that mark the client itself as unusable.
    #[serde(default = "default_fatal_patterns")]
    pub fatal_patterns: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kind: ClientKind::default(),
            path: None,
            client_dir: default_client_dir(),
            host: String::new(),
            port: default_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            target_schema: None,
            derive_schema_from_user: false,
            timeout_secs: None,
            fatal_patterns: default_fatal_patterns(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("client_dir", &self.client_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("target_schema", &self.target_schema)
            .field("derive_schema_from_user", &self.derive_schema_from_user)
            .field("timeout_secs", &self.timeout_secs)
            .field("fatal_patterns", &self.fatal_patterns)
            .finish()
    }
}

impl ClientConfig {
    /// Schema used to qualify target tables, if any.
    pub fn effective_target_schema(&self) -> Option<String> {
        if let Some(schema) = self.target_schema.as_ref().filter(|s| !s.is_empty()) {
            return Some(schema.clone());
        }
        if self.derive_schema_from_user {
            return schema_from_user(&self.user);
        }
        None
    }

    /// Per-statement timeout.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
    }
}

/// HANA Cloud technical users look like `SCHEMA_XXXXX_RT`; the schema is
/// everything before the last two segments.
pub fn schema_from_user(user: &str) -> Option<String> {
    let parts: Vec<&str> = user.split('_').collect();
    match parts.len() {
        0 | 1 => None,
        2 => Some(parts[0].to_string()),
        n => Some(parts[..n - 2].join("_")),
    }
}

/// How embedded single quotes are escaped in string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `'` becomes `''` (ANSI, HANA, PostgreSQL).
    #[default]
    Doubled,

    /// `\` becomes `\\` and `'` becomes `\'`.
    Backslash,
}

/// Row encoding configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Field value that always encodes as NULL (e.g. `\N`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_marker: Option<String>,

    /// String literal escaping (default: doubled).
    #[serde(default)]
    pub quote_style: QuoteStyle,

    /// Lower-case table and column names in generated statements. CAP
    /// deployments on PostgreSQL use lower-case names.
    #[serde(default)]
    pub lowercase_identifiers: bool,
}

impl EncodingConfig {
    /// Apply the configured identifier case.
    pub fn identifier(&self, name: &str) -> String {
        if self.lowercase_identifiers {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

/// Source dialect rules. Kept as data so new dialects need no parser changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Phrases that mark an identity column, matched case-insensitively.
    #[serde(default = "default_identity_markers")]
    pub identity_markers: Vec<String>,

    /// Token prefixes after the type that carry storage details only (HANA `CS_`).
    #[serde(default = "default_ignored_type_prefixes")]
    pub ignored_type_prefixes: Vec<String>,

    /// Additional or replacement entries for the type table.
    #[serde(default)]
    pub type_overrides: BTreeMap<String, CdsKind>,

    /// Target type for unknown source types (default: String).
    #[serde(default = "default_fallback_type")]
    pub fallback_type: CdsKind,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            identity_markers: default_identity_markers(),
            ignored_type_prefixes: default_ignored_type_prefixes(),
            type_overrides: BTreeMap::new(),
            fallback_type: default_fallback_type(),
        }
    }
}

/// Explicit overrides, usually from the command line. They win over the
/// config file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub archive_path: Option<PathBuf>,
    pub extract_dir: Option<PathBuf>,
    pub schema: Option<String>,
    pub project_root: Option<PathBuf>,
    pub sql_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub client_kind: Option<ClientKind>,
    pub timeout_secs: Option<u64>,
}

// Default value functions for serde
fn default_archive_path() -> PathBuf {
    PathBuf::from("export.tar.gz")
}

fn default_extract_dir() -> PathBuf {
    PathBuf::from("temp_extract")
}

fn default_project_root() -> PathBuf {
    PathBuf::from("cap_project")
}

fn default_schema_file() -> PathBuf {
    PathBuf::from("db").join("schema.cds")
}

fn default_namespace() -> String {
    "db".to_string()
}

fn default_sql_dir() -> PathBuf {
    PathBuf::from("data_insert_sql")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_executed_dir() -> PathBuf {
    PathBuf::from("created")
}

fn default_progress_interval() -> usize {
    1000
}

fn default_client_dir() -> PathBuf {
    PathBuf::from("client").join("hana_client")
}

fn default_port() -> u16 {
    443
}

fn default_fatal_patterns() -> Vec<String> {
    [
        "authentication failed",
        "invalid username or password",
        "connection refused",
        "connection failed",
        "cannot connect",
        "could not connect",
        "-10709",
        "-10757",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_identity_markers() -> Vec<String> {
    [
        "GENERATED ALWAYS AS IDENTITY",
        "GENERATED BY DEFAULT AS IDENTITY",
        "AUTO_INCREMENT",
        "IDENTITY",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ignored_type_prefixes() -> Vec<String> {
    vec!["CS_".to_string()]
}

fn default_fallback_type() -> CdsKind {
    CdsKind::String
}
