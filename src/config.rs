// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the `relink.yaml` project file. Each entity of the
//! file has its own typed structure with per-field defaults, so a missing
//! optional setting is an `Option` the compiler makes you handle, and a
//! missing required one is a load-time error that names the field.
//!
//! # General Layout
//!
//! A project file has two sections: `project` and `servers`. The project
//! section describes the local side, i.e., the root directory to publish and
//! the exclusion patterns to apply. The servers section maps a server name to
//! its remote settings: the served path, the deploy root holding releases,
//! SSH and MySQL credentials, URLs, and named actions.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument, warn};

/// Name of the project file searched for by [`crate::path::find_config_file`].
pub const CONFIG_FILE_NAME: &str = "relink.yaml";

/// Whole project file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Local project settings.
    pub project: Project,

    /// Remote servers by name.
    #[serde(default)]
    pub servers: BTreeMap<String, Server>,
}

impl Config {
    /// Load project file from disk.
    ///
    /// Relative paths in the file are resolved against the directory holding
    /// it, and the project root must exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::File`] if the file cannot be parsed or fails
    ///   validation.
    /// - Return [`ConfigError::MissingProjectRoot`] if the project root does
    ///   not exist.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load configuration {:?}", path.display());
        let data = read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Config = data.parse().map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new(".")))?;

        Ok(config)
    }

    /// Blank project file listing one server section per name.
    pub fn template(servers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut servers = servers
            .into_iter()
            .map(|name| (name.into(), Server::template()))
            .collect::<BTreeMap<_, _>>();
        if servers.is_empty() {
            servers.insert("example_server".into(), Server::template());
        }

        Self {
            project: Project {
                name: Some("<project name>".into()),
                root: PathBuf::from("."),
                pulls_dir: None,
                rsync_binary: None,
                exclude: Some(
                    [".git", ".well-known", "*.pyc", "*.sass", "*.scss", "__pycache__"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                ),
                note: None,
            },
            servers,
        }
    }

    /// Select server by name, or the default server when no name is given.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownServer`] if no server has that name.
    /// - Return [`ConfigError::MultipleDefaults`] if more than one server is
    ///   marked as default.
    /// - Return [`ConfigError::NoDefaultServer`] if no name was given and no
    ///   server is marked as default.
    pub fn server(&self, name: Option<&str>) -> Result<(&str, &Server)> {
        if let Some(name) = name {
            return self
                .servers
                .get_key_value(name)
                .map(|(name, server)| (name.as_str(), server))
                .ok_or_else(|| ConfigError::UnknownServer {
                    name: name.to_string(),
                    available: self.server_names().join(", "),
                });
        }

        let defaults = self
            .servers
            .iter()
            .filter(|(_, server)| server.default)
            .collect::<Vec<_>>();
        match defaults.as_slice() {
            [(name, server)] => Ok((name.as_str(), server)),
            [] => Err(ConfigError::NoDefaultServer),
            many => Err(ConfigError::MultipleDefaults {
                names: many
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Names of all configured servers in sorted order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    fn resolve_paths(&mut self, base: &Path) -> Result<()> {
        // INVARIANT: Joining an absolute path replaces the base entirely.
        let root = base.join(&self.project.root);
        if !root.is_dir() {
            return Err(ConfigError::MissingProjectRoot { path: root });
        }
        self.project.root = root;

        if let Some(pulls_dir) = self.project.pulls_dir.as_mut() {
            *pulls_dir = base.join(&*pulls_dir);
        }

        for (name, server) in self.servers.iter_mut() {
            let Some(key) = server.ssh.as_mut().and_then(|ssh| ssh.key.as_mut()) else {
                continue;
            };

            *key = base.join(&*key);
            if !key.exists() {
                warn!("ssh key for {name} does not exist: {:?}", key.display());
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = serde_yaml_ng::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on local paths.
        config.project.root = expand(&config.project.root)?;
        if let Some(pulls_dir) = config.project.pulls_dir.as_mut() {
            *pulls_dir = expand(pulls_dir)?;
        }

        for (name, server) in config.servers.iter_mut() {
            if let Some(key) = server.ssh.as_mut().and_then(|ssh| ssh.key.as_mut()) {
                *key = expand(key)?;
            }

            // INVARIANT: Deploy roots are absolute, or the file is rejected.
            if let Some(deploy_root) = &server.deploy_root {
                if !deploy_root.is_absolute() {
                    return Err(ConfigError::RelativeDeployRoot {
                        server: name.clone(),
                        path: deploy_root.clone(),
                    });
                }
            }
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_yaml_ng::to_string(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
    ))
}

/// Local project settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Project {
    /// Name of the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Local directory whose contents are published.
    ///
    /// Relative to the directory holding the project file.
    pub root: PathBuf,

    /// Local directory for pulled database dumps.
    #[serde(default, alias = "pullsDir", skip_serializing_if = "Option::is_none")]
    pub pulls_dir: Option<PathBuf>,

    /// Path to the rsync binary, `rsync` by default.
    #[serde(default, alias = "rsyncBinary", skip_serializing_if = "Option::is_none")]
    pub rsync_binary: Option<String>,

    /// Patterns excluded from every directory transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Remote server settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Server {
    /// Path clients are served from.
    ///
    /// Once deploys are initialized, this is a symlink to the active
    /// release.
    pub root: RemotePath,

    /// Directory holding release directories.
    #[serde(default, alias = "deployRoot", skip_serializing_if = "Option::is_none")]
    pub deploy_root: Option<RemotePath>,

    /// Group that owns new release directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Use this server when none is named on the command line.
    #[serde(default)]
    pub default: bool,

    /// Ask for confirmation before changing this server.
    #[serde(default)]
    pub warn: bool,

    /// Run live link and ownership changes through sudo.
    #[serde(default)]
    pub sudo: bool,

    /// Patterns excluded from directory transfers to this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// SSH access, commands run locally when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshTarget>,

    /// Databases, the first one is used by deploys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<Vec<MysqlTarget>>,

    /// Sites served from this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<UrlEntry>>,

    /// Named shell commands runnable through `relink action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<BTreeMap<String, String>>,

    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Server {
    /// Database used for deploy dumps and loads.
    pub fn deploy_database(&self) -> Option<&MysqlTarget> {
        self.mysql.as_ref().and_then(|mysql| mysql.first())
    }

    fn template() -> Self {
        Self {
            root: RemotePath::new("/var/www/site"),
            deploy_root: Some(RemotePath::new("/var/www/releases")),
            group: None,
            default: false,
            warn: true,
            sudo: false,
            exclude: None,
            ssh: Some(SshTarget {
                username: Some("<user>".into()),
                server: "<host>".into(),
                key: None,
                port: Some(22),
                note: None,
            }),
            mysql: Some(vec![MysqlTarget {
                username: "<user>".into(),
                password: Some("<password>".into()),
                db: "<database>".into(),
                hostname: Some("127.0.0.1".into()),
                skip_secure_auth: false,
                port: None,
                note: None,
            }]),
            urls: Some(vec![UrlEntry {
                url: Some("https://example.com".into()),
                admin_url: None,
                note: None,
            }]),
            actions: Some(BTreeMap::from([("uptime".into(), "uptime".into())])),
            note: None,
        }
    }
}

/// SSH access to a server.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SshTarget {
    /// Login name, the SSH client default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Host name or address.
    pub server: String,

    /// Identity file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,

    /// Port, the SSH client default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SshTarget {
    /// Destination in `user@host` form.
    pub fn destination(&self) -> String {
        match &self.username {
            Some(username) => format!("{username}@{}", self.server),
            None => self.server.clone(),
        }
    }
}

/// MySQL access on a server.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct MysqlTarget {
    /// Database user.
    pub username: String,

    /// Database password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name.
    pub db: String,

    /// Database host as seen from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Pass `--skip-secure-auth` to the MySQL clients.
    #[serde(default, alias = "skipSecureAuth")]
    pub skip_secure_auth: bool,

    /// Database port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Site served by a server.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UrlEntry {
    /// Public URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Administration URL.
    #[serde(default, alias = "adminUrl", skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,

    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Path on a remote host.
///
/// Remote paths are always Unix paths regardless of the local platform, so
/// they are kept as strings instead of [`PathBuf`].
///
/// Trailing slashes are dropped on construction. A live link spelled
/// `/var/www/site/` would make `mv -T`, `test -L`, and `readlink` follow
/// the link instead of acting on it.
#[derive(Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Construct new remote path.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();

        // INVARIANT: Only the filesystem root itself ends with a slash.
        match path.trim_end_matches('/') {
            "" if path.starts_with('/') => Self("/".into()),
            trimmed => Self(trimmed.to_string()),
        }
    }

    /// Treat remote path as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check whether path starts at the filesystem root.
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Append component to path.
    pub fn join(&self, component: impl AsRef<str>) -> Self {
        let base = self.0.trim_end_matches('/');
        Self(format!("{base}/{}", component.as_ref().trim_start_matches('/')))
    }

    /// Last component of the path, ignoring trailing slashes.
    pub fn file_name(&self) -> Option<&str> {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Path without its last component.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.0.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => Some(Self::new("/")),
            Some(index) => Some(Self::new(&trimmed[..index])),
            None => None,
        }
    }
}

impl Display for RemotePath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl From<String> for RemotePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Project file could not be read.
    #[error("failed to read configuration file {:?}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Project file is invalid.
    #[error("invalid configuration file {:?}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(serde_yaml_ng::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(serde_yaml_ng::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Deploy root is not an absolute path.
    #[error("deploy_root of server {server:?} must be an absolute path, got {path:?}")]
    RelativeDeployRoot { server: String, path: RemotePath },

    /// Project root does not exist.
    #[error("project root directory does not exist: {:?}", path.display())]
    MissingProjectRoot { path: PathBuf },

    /// Server name not present in configuration.
    #[error("server {name:?} does not exist, available servers: {available}")]
    UnknownServer { name: String, available: String },

    /// More than one server is marked as default.
    #[error("only one server can be set to default, found: {names}")]
    MultipleDefaults { names: String },

    /// No server named and none marked as default.
    #[error("no server was specified and no server is set to default")]
    NoDefaultServer,
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
