// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use relink::{
    action,
    config::{Config, Server},
    deploy::{
        exclude::ExcludeList,
        transfer::{Rsync, RsyncTarget},
        DeployOptions, DeployTarget, Deployer, ReleaseChoice,
    },
    path::find_config_file_from_cwd,
    remote::{LocalTransport, RemoteExecutor, SshTransport, Transport},
    ui::{self, InquireOperator},
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  relink [options] deploy <deploy-command> [server]\n  relink [options] action [--server <server>] [action]\n  relink [options] config <config-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Do not show remote commands before running them.
    #[arg(short, long, global = true)]
    pub suppress_commands: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let echo = !self.suppress_commands;
        match self.command {
            Command::Deploy { command } => match command {
                DeployCommand::Init(opts) => run_deploy_init(opts, echo),
                DeployCommand::New(opts) => run_deploy_new(opts, echo),
                DeployCommand::Switch(opts) => run_deploy_switch(opts, echo),
                DeployCommand::Releases(opts) => run_deploy_releases(opts, echo),
            },
            Command::Action(opts) => run_action(opts, echo),
            Command::Config { command } => match command {
                ConfigCommand::Init(opts) => run_config_init(opts),
                ConfigCommand::Show => run_config_show(),
            },
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Publish releases and switch between them.
    #[command(override_usage = "relink deploy <deploy-command> [options] [server]")]
    Deploy {
        #[command(subcommand)]
        command: DeployCommand,
    },

    /// List or run named actions of a server.
    #[command(override_usage = "relink action [options] [action]")]
    Action(ActionOptions),

    /// Create or inspect the project file.
    #[command(override_usage = "relink config <config-command>")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum DeployCommand {
    /// Turn served directory into first release behind a symlink.
    #[command(override_usage = "relink deploy init [options] [server]")]
    Init(InitOptions),

    /// Publish project root as a new release.
    #[command(override_usage = "relink deploy new [options] [server]")]
    New(NewOptions),

    /// Point served path at another release.
    #[command(override_usage = "relink deploy switch [options] [server]")]
    Switch(SwitchOptions),

    /// List releases of a server.
    #[command(override_usage = "relink deploy releases [server]")]
    Releases(ReleasesOptions),
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print blank project file.
    #[command(override_usage = "relink config init [servers]...")]
    Init(ConfigInitOptions),

    /// Show project file in use and its servers.
    Show,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Server to set up, the default server when absent.
    #[arg(value_name = "server")]
    pub server: Option<String>,

    /// Apply changes instead of showing them.
    #[arg(long)]
    pub real: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NewOptions {
    /// Server to publish to, the default server when absent.
    #[arg(value_name = "server")]
    pub server: Option<String>,

    /// Apply changes instead of showing them.
    #[arg(long)]
    pub real: bool,

    /// Dump database into the active release before publishing.
    #[arg(long)]
    pub dump_db: bool,

    /// Do not list changed files while transferring.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SwitchOptions {
    /// Server to switch, the default server when absent.
    #[arg(value_name = "server")]
    pub server: Option<String>,

    /// Apply changes instead of showing them.
    #[arg(long)]
    pub real: bool,

    /// Load database dump of the chosen release before switching.
    #[arg(long)]
    pub load_db: bool,

    /// Switch to release with this name instead of asking.
    #[arg(long, value_name = "name")]
    pub release: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReleasesOptions {
    /// Server to list, the default server when absent.
    #[arg(value_name = "server")]
    pub server: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ActionOptions {
    /// Server to run on, the default server when absent.
    #[arg(short = 'S', long, value_name = "server")]
    pub server: Option<String>,

    /// Action to run, lists actions when absent.
    #[arg(value_name = "action")]
    pub action: Option<String>,

    /// Apply changes instead of showing them.
    #[arg(long)]
    pub real: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigInitOptions {
    /// Names of server sections to include.
    #[arg(value_name = "servers")]
    pub servers: Vec<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

type ServerDeployer = Deployer<Box<dyn Transport>, Rsync, InquireOperator>;

fn load_config() -> Result<Config> {
    let path = find_config_file_from_cwd()?;
    Ok(Config::load(path)?)
}

fn transport(server: &Server) -> Box<dyn Transport> {
    match &server.ssh {
        Some(ssh) => Box::new(SshTransport::new(ssh.clone())),
        None => Box::new(LocalTransport::new()),
    }
}

fn deployer(
    config: &Config,
    server: Option<&str>,
    real: bool,
    echo: bool,
    quiet: bool,
) -> Result<ServerDeployer> {
    let (name, server) = config.server(server)?;
    info!("deploy to server {name}");
    if !real {
        info!("dry run, pass --real to apply changes");
    }

    let target = DeployTarget::from_server(name, server)?;
    let executor = RemoteExecutor::new(transport(server)).with_echo(echo);
    let rsync_target = match &server.ssh {
        Some(ssh) => RsyncTarget::Remote(ssh.clone()),
        None => RsyncTarget::Local,
    };
    let transfer = Rsync::new(config.project.rsync_binary.clone(), rsync_target)
        .with_echo(echo)
        .with_quiet(quiet);
    let excludes = config
        .project
        .exclude
        .iter()
        .flatten()
        .chain(server.exclude.iter().flatten())
        .cloned()
        .collect::<ExcludeList>();
    let options = DeployOptions {
        local_root: config.project.root.clone(),
        excludes,
        database: server.deploy_database().cloned(),
        warn: server.warn,
        dry_run: !real,
    };

    Ok(Deployer::new(executor, transfer, InquireOperator::new(), target, options))
}

fn run_deploy_init(opts: InitOptions, echo: bool) -> Result<()> {
    let config = load_config()?;
    let deployer = deployer(&config, opts.server.as_deref(), opts.real, echo, false)?;
    let release = deployer.init()?;
    info!("first release is {}", release.name);
    ui::display_success(opts.real);

    Ok(())
}

fn run_deploy_new(opts: NewOptions, echo: bool) -> Result<()> {
    let config = load_config()?;
    let deployer = deployer(&config, opts.server.as_deref(), opts.real, echo, opts.quiet)?;
    let release = deployer.publish(opts.dump_db)?;
    info!(
        "release {} is ready, run `relink deploy switch` to make it live",
        release.name
    );
    ui::display_success(opts.real);

    Ok(())
}

fn run_deploy_switch(opts: SwitchOptions, echo: bool) -> Result<()> {
    let config = load_config()?;
    let deployer = deployer(&config, opts.server.as_deref(), opts.real, echo, false)?;
    let choice = match opts.release {
        Some(name) => ReleaseChoice::Named(name),
        None => ReleaseChoice::Interactive,
    };
    let release = deployer.switch(choice, opts.load_db)?;
    info!("switched to {}", release.name);
    ui::display_success(opts.real);

    Ok(())
}

fn run_deploy_releases(opts: ReleasesOptions, echo: bool) -> Result<()> {
    let config = load_config()?;
    let deployer = deployer(&config, opts.server.as_deref(), true, echo, false)?;
    let menu = deployer.releases()?;
    if menu.entries().is_empty() {
        info!("no releases yet, run `relink deploy init` first");
        return Ok(());
    }
    ui::display_releases(&menu);

    Ok(())
}

fn run_action(opts: ActionOptions, echo: bool) -> Result<()> {
    let config = load_config()?;
    let (name, server) = config.server(opts.server.as_deref())?;

    let Some(action_name) = opts.action else {
        let actions = action::list(server);
        if actions.is_empty() {
            info!("server {name} has no actions");
        }
        for (action_name, script) in actions {
            println!("{action_name}: {script}");
        }
        return Ok(());
    };

    let executor = RemoteExecutor::new(transport(server)).with_echo(echo);
    let result = action::run(&executor, server, &action_name, !opts.real)?;
    print!("{}", result.stdout);
    ui::display_success(opts.real);

    Ok(())
}

fn run_config_init(opts: ConfigInitOptions) -> Result<()> {
    print!("{}", Config::template(opts.servers));

    Ok(())
}

fn run_config_show() -> Result<()> {
    let path = find_config_file_from_cwd()?;
    let config = Config::load(&path)?;
    println!("project file: {}", path.display());
    println!("project root: {}", config.project.root.display());
    for (name, server) in &config.servers {
        let marker = if server.default { " (default)" } else { "" };
        println!("server {name}{marker}: {}", server.root);
    }

    Ok(())
}
