// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release deployment.
//!
//! A __release__ is an immutable, timestamped directory under the deploy root
//! holding one full snapshot of the project root. The path clients are
//! served from, the __live link__, is a symlink to exactly one release.
//!
//! # Deploy Lifecycle
//!
//! A server starts out uninitialized: its served path is a plain directory,
//! or missing. [`Deployer::init`] turns the served path into the first
//! release and replaces it with a live link. From then on
//! [`Deployer::publish`] adds releases without touching the live link, and
//! [`Deployer::switch`] repoints the live link to any release, old or new.
//! Rolling back is just switching to an older release.
//!
//! # Remote State Only
//!
//! Nothing about a server is remembered locally. Every invocation lists the
//! releases on the host and reads the live link again, so several operators
//! can work on the same server without stale local state. There is no
//! locking against operators running at the same time.
//!
//! # See Also
//!
//! 1. [`namer`]
//! 2. [`transfer`]
//! 3. [`registry`]
//! 4. [`switch`]

pub mod exclude;
pub mod namer;
pub mod registry;
pub mod switch;
pub mod transfer;

use crate::{
    config::{MysqlTarget, RemotePath, Server},
    database::{self, DatabaseError, DUMP_FILE_NAME},
    deploy::{
        exclude::ExcludeList,
        namer::{NameError, RemoteTime},
        registry::{previous_release, RegistryError, ReleaseRegistry},
        switch::{ReleaseMenu, SelectionError, SwitchError, SymlinkSwitcher},
        transfer::{FileTransfer, TransferEngine, TransferError},
    },
    remote::{ExecError, RemoteCommand, RemoteExecutor, Transport},
    ui::PromptError,
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Immutable snapshot of the project root on a server.
///
/// Ordered by name, which is chronological order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Release {
    /// Directory name, `<base>.<YY-MM-DD_HHMMSS_TZ>`.
    pub name: String,

    /// Remote time taken from the name.
    pub created_at: RemoteTime,

    /// Full path under the deploy root.
    pub path: RemotePath,
}

impl Release {
    /// Construct release of `target` from its directory name.
    ///
    /// # Errors
    ///
    /// - Return [`NameError`] if `name` is not a release name of `target`.
    pub fn from_name(target: &DeployTarget, name: &str) -> Result<Self, NameError> {
        let created_at = namer::parse_name(target.base_name(), name)?;

        Ok(Self {
            name: name.to_string(),
            created_at,
            path: target.deploy_root.join(name),
        })
    }
}

/// Deploy settings of one server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployTarget {
    /// Directory holding release directories.
    pub deploy_root: RemotePath,

    /// Symlink clients are served from.
    pub live_link: RemotePath,

    /// Group handed new release directories.
    pub owner_group: Option<String>,

    /// Run live link and ownership changes through sudo.
    pub sudo: bool,
}

impl DeployTarget {
    /// Construct deploy target from server settings.
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::NoDeployRoot`] if the server has no
    ///   deploy root.
    /// - Return [`PreconditionError::InvalidLiveLink`] if the served path is
    ///   relative or has no last component.
    pub fn from_server(name: &str, server: &Server) -> Result<Self, PreconditionError> {
        let deploy_root = server
            .deploy_root
            .clone()
            .ok_or_else(|| PreconditionError::NoDeployRoot {
                server: name.to_string(),
            })?;

        // INVARIANT: Live link needs a base name to name releases after.
        if !server.root.is_absolute() || server.root.file_name().is_none() {
            return Err(PreconditionError::InvalidLiveLink {
                path: server.root.clone(),
            });
        }

        Ok(Self {
            deploy_root,
            live_link: server.root.clone(),
            owner_group: server.group.clone(),
            sudo: server.sudo,
        })
    }

    /// Base name of releases, the last component of the live link.
    pub fn base_name(&self) -> &str {
        self.live_link.file_name().unwrap_or_default()
    }
}

/// Person answering questions during a deploy.
pub trait Operator {
    /// Pick a release from the menu by letter.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if no answer could be obtained.
    fn choose(&self, menu: &ReleaseMenu) -> Result<String, PromptError>;

    /// Answer yes or no to `message`.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if no answer could be obtained.
    fn confirm(&self, message: &str) -> Result<bool, PromptError>;
}

/// How the release to switch to is picked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseChoice {
    /// Ask the operator through the lettered menu.
    Interactive,

    /// Use the release with this exact name.
    Named(String),
}

/// Settings of a deploy run that do not come from the deploy target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Local directory published as a release.
    pub local_root: PathBuf,

    /// Patterns left out of transfers.
    pub excludes: ExcludeList,

    /// Database dumped and loaded alongside releases.
    pub database: Option<MysqlTarget>,

    /// Ask before changing the server.
    pub warn: bool,

    /// Display changes without making them.
    pub dry_run: bool,
}

/// Deploy releases to one server.
#[derive(Debug)]
pub struct Deployer<T, F, O>
where
    T: Transport,
    F: FileTransfer,
    O: Operator,
{
    executor: RemoteExecutor<T>,
    transfer: F,
    operator: O,
    target: DeployTarget,
    options: DeployOptions,
}

impl<T, F, O> Deployer<T, F, O>
where
    T: Transport,
    F: FileTransfer,
    O: Operator,
{
    /// Construct new deployer.
    pub fn new(
        executor: RemoteExecutor<T>,
        transfer: F,
        operator: O,
        target: DeployTarget,
        options: DeployOptions,
    ) -> Self {
        Self {
            executor,
            transfer,
            operator,
            target,
            options,
        }
    }

    /// Access the executor.
    pub fn executor(&self) -> &RemoteExecutor<T> {
        &self.executor
    }

    /// Access the file transfer.
    pub fn transfer(&self) -> &F {
        &self.transfer
    }

    /// Access the operator.
    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Turn the served path into the first release.
    ///
    /// An existing served directory is moved into the deploy root as is.
    /// Without one, an empty first release is created. The live link is then
    /// created in its place, before ownership of the release is changed.
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::AlreadyInitialized`] if the served path
    ///   already is a symlink.
    /// - Return [`DeployError::Declined`] if the operator declines.
    /// - Return [`DeployError`] if any remote step fails. Remaining steps are
    ///   skipped and nothing is rolled back.
    #[instrument(skip(self), level = "debug")]
    pub fn init(&self) -> Result<Release> {
        let live_link = &self.target.live_link;
        if self.is_symlink(live_link)? {
            return Err(PreconditionError::AlreadyInitialized {
                path: live_link.clone(),
            }
            .into());
        }
        self.confirm(&format!("set up releases for {live_link}?"))?;

        let dry_run = self.options.dry_run;
        let mkdir = RemoteCommand::new("mkdir")
            .arg("-p")
            .arg(self.target.deploy_root.as_str());
        self.executor.execute_checked(&mkdir, dry_run)?;

        let release = self.next_release()?;
        let test = RemoteCommand::new("test").arg("-d").arg(live_link.as_str());
        let create = if self.executor.execute(&test, false)?.is_success() {
            info!("move {live_link} into {}", release.path);
            RemoteCommand::new("mv")
                .arg(live_link.as_str())
                .arg(release.path.as_str())
                .with_sudo(self.target.sudo)
        } else {
            info!("{live_link} does not exist, first release starts empty");
            RemoteCommand::new("mkdir").arg(release.path.as_str())
        };
        self.executor.execute_checked(&create, dry_run)?;

        // INVARIANT: Served path is only missing between the move and this
        // link, so nothing fallible runs in between.
        let switcher = SymlinkSwitcher::new(&self.executor, &self.target);
        let release = switcher.prepare_fresh(&release, dry_run)?.commit()?;

        if let Some(group) = &self.target.owner_group {
            let chown = RemoteCommand::new("chown")
                .arg(format!(":{group}"))
                .arg(release.path.as_str())
                .with_sudo(self.target.sudo);
            self.executor.execute_checked(&chown, dry_run)?;
        }

        Ok(release)
    }

    /// Publish the local root as a new release.
    ///
    /// Unchanged files are hard-linked against the newest older release.
    /// With `dump_db` set, the database is dumped into the active release
    /// first. The live link is never touched.
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::NotASymlink`] if deploys were never
    ///   initialized on the server.
    /// - Return [`PreconditionError::NoDatabase`] if `dump_db` is set but
    ///   no database is configured.
    /// - Return [`DeployError::Declined`] if the operator declines.
    /// - Return [`DeployError`] if any remote step fails.
    #[instrument(skip(self), level = "debug")]
    pub fn publish(&self, dump_db: bool) -> Result<Release> {
        let database = match dump_db {
            true => Some(self.database()?),
            false => None,
        };
        if !self.is_symlink(&self.target.live_link)? {
            return Err(PreconditionError::NotASymlink {
                path: self.target.live_link.clone(),
            }
            .into());
        }
        self.confirm(&format!("publish a new release to {}?", self.target.deploy_root))?;

        let registry = ReleaseRegistry::new(&self.executor, &self.target);
        let releases = registry.list_releases()?;
        let name = self.next_release()?.name;
        let reference = previous_release(&releases, &name);

        if let Some(database) = database {
            let current = registry.current_in(&releases)?;
            let file = current.path.join(DUMP_FILE_NAME);
            database::dump(&self.executor, database, &file, self.options.dry_run)?;
        }

        let engine = TransferEngine::new(&self.executor, &self.transfer, &self.target);
        Ok(engine.publish(
            &self.options.local_root,
            &name,
            reference,
            &self.options.excludes,
            self.options.dry_run,
        )?)
    }

    /// Point the live link at another release.
    ///
    /// With `load_db` set, the dump stored in the chosen release is loaded
    /// into the database before the live link moves.
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::NoReleases`] if there is nothing to
    ///   switch to.
    /// - Return [`SelectionError`] if the choice matches no release.
    /// - Return [`PreconditionError::MissingDump`] if `load_db` is set but
    ///   the chosen release holds no dump.
    /// - Return [`DeployError::Declined`] if the operator declines.
    /// - Return [`DeployError`] if any remote step fails.
    #[instrument(skip(self), level = "debug")]
    pub fn switch(&self, choice: ReleaseChoice, load_db: bool) -> Result<Release> {
        let database = match load_db {
            true => Some(self.database()?),
            false => None,
        };

        let menu = self.releases()?;
        if menu.entries().is_empty() {
            return Err(PreconditionError::NoReleases {
                deploy_root: self.target.deploy_root.clone(),
            }
            .into());
        }

        let chosen = match choice {
            ReleaseChoice::Interactive => {
                let letter = self.operator.choose(&menu)?;
                menu.resolve(&letter)?.clone()
            }
            ReleaseChoice::Named(name) => menu.by_name(&name)?.clone(),
        };
        if menu
            .entries()
            .iter()
            .any(|entry| entry.current && entry.release == chosen)
        {
            warn!("{} already points at {}", self.target.live_link, chosen.name);
        }
        self.confirm(&format!(
            "point {} at {}?",
            self.target.live_link, chosen.name
        ))?;

        if let Some(database) = database {
            let file = chosen.path.join(DUMP_FILE_NAME);
            if !database::dump_exists(&self.executor, &file)? {
                return Err(PreconditionError::MissingDump { path: file }.into());
            }
            database::load(&self.executor, database, &file, self.options.dry_run)?;
        }

        let switcher = SymlinkSwitcher::new(&self.executor, &self.target);
        Ok(switcher.switch_to(&chosen, self.options.dry_run)?)
    }

    /// List releases with the active one marked.
    ///
    /// # Errors
    ///
    /// - Return [`DeployError::Registry`] if releases cannot be listed or
    ///   the live link cannot be resolved to one of them.
    pub fn releases(&self) -> Result<ReleaseMenu> {
        let registry = ReleaseRegistry::new(&self.executor, &self.target);
        let releases = registry.list_releases()?;
        if releases.is_empty() {
            return Ok(ReleaseMenu::default());
        }
        let current = registry.current_in(&releases)?;

        Ok(ReleaseMenu::new(&releases, Some(&current)))
    }

    fn next_release(&self) -> Result<Release> {
        let now = namer::read_remote_clock(&self.executor)?;
        let name = namer::compute_name(self.target.base_name(), &now);
        Ok(Release::from_name(&self.target, &name)?)
    }

    fn is_symlink(&self, path: &RemotePath) -> Result<bool> {
        let test = RemoteCommand::new("test").arg("-L").arg(path.as_str());
        Ok(self.executor.execute(&test, false)?.is_success())
    }

    fn database(&self) -> Result<&MysqlTarget> {
        self.options
            .database
            .as_ref()
            .ok_or_else(|| PreconditionError::NoDatabase.into())
    }

    fn confirm(&self, message: &str) -> Result<()> {
        if !self.options.warn || self.options.dry_run {
            return Ok(());
        }

        match self.operator.confirm(message)? {
            true => Ok(()),
            false => Err(DeployError::Declined),
        }
    }
}

/// Server is not in a state the deploy command can work with.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    /// Server has no deploy root.
    #[error("server {server:?} has no deploy_root configured")]
    NoDeployRoot { server: String },

    /// Served path cannot be a live link.
    #[error("served path {path:?} must be an absolute path with a last component")]
    InvalidLiveLink { path: RemotePath },

    /// Served path is not a symlink.
    #[error("{path:?} is not a symlink, run `relink deploy init` first")]
    NotASymlink { path: RemotePath },

    /// Served path already is a symlink.
    #[error("{path:?} is already a symlink, deploys are already set up")]
    AlreadyInitialized { path: RemotePath },

    /// Deploy root holds no releases.
    #[error("no releases found in {deploy_root:?}")]
    NoReleases { deploy_root: RemotePath },

    /// Database flag given without a configured database.
    #[error("no mysql database configured for this server")]
    NoDatabase,

    /// Release holds no database dump.
    #[error("database dump {path:?} does not exist")]
    MissingDump { path: RemotePath },
}

/// Deployment error types.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Operator answered no to a confirmation.
    #[error("aborted by operator")]
    Declined,

    /// Server is not ready for the command.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Release name could not be made.
    #[error(transparent)]
    Name(#[from] NameError),

    /// Release could not be published.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Releases could not be listed or resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Live link could not be switched.
    #[error(transparent)]
    Switch(#[from] SwitchError),

    /// Choice matches no release.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// Database dump or load failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Operator could not be asked.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// Remote command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = DeployError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::{fake::ScriptedOperator, *};
    use crate::{
        deploy::transfer::fake::RecordingTransfer,
        remote::fake::ScriptedTransport,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const LISTING: &str = indoc! {r#"
        /srv/releases/www.24-01-01_120000_UTC
        /srv/releases/www.24-01-01_130000_UTC
    "#};

    fn target() -> DeployTarget {
        DeployTarget {
            deploy_root: RemotePath::new("/srv/releases"),
            live_link: RemotePath::new("/srv/www"),
            owner_group: None,
            sudo: false,
        }
    }

    fn options() -> DeployOptions {
        DeployOptions {
            local_root: PathBuf::from("/home/me/site/public"),
            excludes: ExcludeList::from_iter([".git"]),
            database: Some(MysqlTarget {
                username: "app".into(),
                db: "app".into(),
                ..Default::default()
            }),
            warn: false,
            dry_run: false,
        }
    }

    fn deployer(
        transport: ScriptedTransport,
        operator: ScriptedOperator,
        options: DeployOptions,
    ) -> Deployer<ScriptedTransport, RecordingTransfer, ScriptedOperator> {
        Deployer::new(
            RemoteExecutor::new(transport).with_echo(false),
            RecordingTransfer::new(),
            operator,
            target(),
            options,
        )
    }

    #[test]
    fn target_from_server() -> anyhow::Result<()> {
        let mut server = Server {
            root: RemotePath::new("/var/www/site"),
            deploy_root: Some(RemotePath::new("/var/www/releases")),
            group: Some("www-data".into()),
            sudo: true,
            ..Default::default()
        };

        let target = DeployTarget::from_server("prod", &server)?;
        assert_eq!(target.base_name(), "site");
        assert_eq!(target.owner_group.as_deref(), Some("www-data"));
        assert!(target.sudo);

        server.root = RemotePath::new("site");
        let error = DeployTarget::from_server("prod", &server).unwrap_err();
        assert!(matches!(error, PreconditionError::InvalidLiveLink { .. }));

        server.deploy_root = None;
        let error = DeployTarget::from_server("prod", &server).unwrap_err();
        assert!(matches!(error, PreconditionError::NoDeployRoot { ref server } if server == "prod"));

        Ok(())
    }

    #[test]
    fn init_moves_served_directory_into_first_release() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .fail("test -L", "", 1)
            .reply("date", "24-01-01_120000_UTC\n")
            .reply("readlink", "/srv/releases/www.24-01-01_120000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::default(), options());

        let release = deployer.init()?;
        assert_eq!(release.name, "www.24-01-01_120000_UTC");

        let sent = deployer.executor().transport().sent();
        assert_eq!(sent[..5], [
            "test -L /srv/www",
            "mkdir -p /srv/releases",
            "date +%y-%m-%d_%H%M%S_%Z",
            "test -d /srv/www",
            "mv /srv/www /srv/releases/www.24-01-01_120000_UTC",
        ]);
        assert!(sent[5].starts_with("ln -s /srv/releases/www.24-01-01_120000_UTC /srv/.www.relink-"));
        assert!(sent[6].starts_with("mv -T /srv/.www.relink-"));
        assert_eq!(sent[7], "readlink /srv/www");

        Ok(())
    }

    #[test]
    fn init_links_before_changing_ownership() {
        let transport = ScriptedTransport::new()
            .fail("test -L", "", 1)
            .reply("date", "24-01-01_120000_UTC\n")
            .reply("readlink", "/srv/releases/www.24-01-01_120000_UTC\n")
            .fail("chown", "chown: invalid group: ':www-data'\n", 1);
        let deployer = Deployer::new(
            RemoteExecutor::new(transport).with_echo(false),
            RecordingTransfer::new(),
            ScriptedOperator::default(),
            DeployTarget {
                owner_group: Some("www-data".into()),
                ..target()
            },
            options(),
        );

        let error = deployer.init().unwrap_err();
        assert!(error.to_string().contains("invalid group"), "{error}");

        let sent = deployer.executor().transport().sent();
        let rename = sent
            .iter()
            .position(|line| line.starts_with("mv -T"))
            .expect("rename sent");
        let chown = sent
            .iter()
            .position(|line| line.starts_with("chown"))
            .expect("chown sent");
        assert!(rename < chown);
        assert_eq!(
            sent.last().map(String::as_str),
            Some("chown :www-data /srv/releases/www.24-01-01_120000_UTC")
        );
    }

    #[test]
    fn target_from_server_drops_trailing_slash() -> anyhow::Result<()> {
        let server = Server {
            root: RemotePath::new("/var/www/site/"),
            deploy_root: Some(RemotePath::new("/var/www/releases/")),
            ..Default::default()
        };

        let target = DeployTarget::from_server("prod", &server)?;
        assert_eq!(target.live_link.as_str(), "/var/www/site");
        assert_eq!(target.deploy_root.as_str(), "/var/www/releases");
        assert_eq!(target.base_name(), "site");

        Ok(())
    }

    #[test]
    fn init_without_served_directory_starts_empty() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .fail("test -L", "", 1)
            .reply("date", "24-01-01_120000_UTC\n")
            .fail("test -d", "", 1);
        let deployer = deployer(
            transport,
            ScriptedOperator::default(),
            DeployOptions {
                dry_run: true,
                ..options()
            },
        );

        deployer.init()?;
        let sent = deployer.executor().transport().sent();
        assert_eq!(
            sent,
            vec!["test -L /srv/www", "date +%y-%m-%d_%H%M%S_%Z", "test -d /srv/www"]
        );

        Ok(())
    }

    #[test]
    fn init_twice_is_refused() {
        let deployer = deployer(ScriptedTransport::new(), ScriptedOperator::default(), options());

        let error = deployer.init().unwrap_err();
        assert!(matches!(
            error,
            DeployError::Precondition(PreconditionError::AlreadyInitialized { .. })
        ));
        assert_eq!(deployer.executor().transport().sent(), vec!["test -L /srv/www"]);
    }

    #[test]
    fn publish_links_against_previous_release() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("date", "24-01-01_140000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::default(), options());

        let release = deployer.publish(false)?;
        assert_eq!(release.name, "www.24-01-01_140000_UTC");

        let plans = deployer.transfer().plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(
            plans[0].0.reference,
            Some(RemotePath::new("/srv/releases/www.24-01-01_130000_UTC"))
        );

        // Live link is left alone.
        let sent = deployer.executor().transport().sent();
        assert!(!sent.iter().any(|line| line.starts_with("ln ") || line.starts_with("mv ")));

        Ok(())
    }

    #[test]
    fn publish_dumps_database_into_active_release() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("date", "24-01-01_140000_UTC\n")
            .reply("readlink", "/srv/releases/www.24-01-01_120000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::default(), options());

        deployer.publish(true)?;

        let sent = deployer.executor().transport().sent();
        let dump = sent
            .iter()
            .position(|line| line.contains("mysqldump"))
            .expect("dump sent");
        let mkdir = sent
            .iter()
            .position(|line| line.starts_with("mkdir"))
            .expect("mkdir sent");
        assert!(dump < mkdir);
        assert!(sent[dump].ends_with("> /srv/releases/www.24-01-01_120000_UTC/DB-DUMP.sql.gz'"));

        Ok(())
    }

    #[test]
    fn publish_needs_database_for_dump() {
        let deployer = deployer(
            ScriptedTransport::new(),
            ScriptedOperator::default(),
            DeployOptions {
                database: None,
                ..options()
            },
        );

        let error = deployer.publish(true).unwrap_err();
        assert!(matches!(
            error,
            DeployError::Precondition(PreconditionError::NoDatabase)
        ));
        assert!(deployer.executor().transport().sent().is_empty());
    }

    #[test]
    fn switch_by_letter() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("readlink", "/srv/releases/www.24-01-01_130000_UTC\n")
            .reply("readlink", "/srv/releases/www.24-01-01_120000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::new("a", true), options());

        let release = deployer.switch(ReleaseChoice::Interactive, false)?;
        assert_eq!(release.name, "www.24-01-01_120000_UTC");

        let sent = deployer.executor().transport().sent();
        assert!(sent.iter().any(|line| line.starts_with("mv -T ")));

        Ok(())
    }

    #[test]
    fn invalid_letter_leaves_link_alone() {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("readlink", "/srv/releases/www.24-01-01_130000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::new("q", true), options());

        let error = deployer.switch(ReleaseChoice::Interactive, false).unwrap_err();
        assert!(matches!(
            error,
            DeployError::Selection(SelectionError::InvalidChoice { .. })
        ));

        let sent = deployer.executor().transport().sent();
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn declined_switch_changes_nothing() {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("readlink", "/srv/releases/www.24-01-01_130000_UTC\n");
        let operator = ScriptedOperator::new("a", false);
        let deployer = deployer(
            transport,
            operator,
            DeployOptions {
                warn: true,
                ..options()
            },
        );

        let error = deployer
            .switch(ReleaseChoice::Named("www.24-01-01_120000_UTC".into()), false)
            .unwrap_err();
        assert!(matches!(error, DeployError::Declined));
        assert_eq!(deployer.executor().transport().sent().len(), 2);
    }

    #[test]
    fn switch_with_load_needs_dump() {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("readlink", "/srv/releases/www.24-01-01_130000_UTC\n")
            .fail("test -f", "", 1);
        let deployer = deployer(transport, ScriptedOperator::default(), options());

        let error = deployer
            .switch(ReleaseChoice::Named("www.24-01-01_120000_UTC".into()), true)
            .unwrap_err();
        assert!(matches!(
            error,
            DeployError::Precondition(PreconditionError::MissingDump { ref path })
                if path.as_str() == "/srv/releases/www.24-01-01_120000_UTC/DB-DUMP.sql.gz"
        ));
    }

    #[test]
    fn switch_loads_dump_before_moving_link() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new()
            .reply("find", LISTING)
            .reply("readlink", "/srv/releases/www.24-01-01_130000_UTC\n")
            .reply("readlink", "/srv/releases/www.24-01-01_120000_UTC\n");
        let deployer = deployer(transport, ScriptedOperator::default(), options());

        deployer.switch(ReleaseChoice::Named("www.24-01-01_120000_UTC".into()), true)?;

        let sent = deployer.executor().transport().sent();
        let load = sent
            .iter()
            .position(|line| line.contains("gunzip"))
            .expect("load sent");
        let rename = sent
            .iter()
            .position(|line| line.starts_with("mv -T"))
            .expect("rename sent");
        assert!(load < rename);

        Ok(())
    }

    #[test]
    fn switch_without_releases_fails() {
        let deployer = deployer(ScriptedTransport::new(), ScriptedOperator::default(), options());

        let error = deployer.switch(ReleaseChoice::Interactive, false).unwrap_err();
        assert!(matches!(
            error,
            DeployError::Precondition(PreconditionError::NoReleases { .. })
        ));
    }
}
