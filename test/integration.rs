// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Whole deploy lifecycle against the local filesystem.
//!
//! Needs GNU coreutils for `mv -T`.

#![cfg(target_os = "linux")]

use crate::{ClockFixture, CopyFixture, OperatorFixture};

use relink::{
    config::{RemotePath, Server},
    deploy::{
        exclude::ExcludeList, switch::SelectionError, DeployError, DeployOptions, DeployTarget,
        Deployer, PreconditionError, ReleaseChoice,
    },
    remote::RemoteExecutor,
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{create_dir_all, read_link, read_to_string, write},
    path::{Path, PathBuf},
};

type Fixture = Deployer<ClockFixture, CopyFixture, OperatorFixture>;

fn fixture(root: &Path, dry_run: bool) -> Fixture {
    let base = RemotePath::new(root.to_string_lossy());
    let target = DeployTarget {
        deploy_root: base.join("srv/releases"),
        live_link: base.join("srv/site"),
        owner_group: None,
        sudo: false,
    };
    fixture_for(root, target, dry_run)
}

fn fixture_for(root: &Path, target: DeployTarget, dry_run: bool) -> Fixture {
    let root = RemotePath::new(root.to_string_lossy());
    let options = DeployOptions {
        local_root: PathBuf::from(root.join("project/public").as_str()),
        excludes: ExcludeList::from_iter([".git"]),
        database: None,
        warn: true,
        dry_run,
    };

    Deployer::new(
        RemoteExecutor::new(ClockFixture::new()).with_echo(false),
        CopyFixture::new(),
        OperatorFixture::new(),
        target,
        options,
    )
}

fn live_target(root: &Path) -> Result<PathBuf> {
    Ok(read_link(root.join("srv/site"))?)
}

#[sealed_test]
fn init_publish_switch_rollback() -> Result<()> {
    let root = std::env::current_dir()?;
    create_dir_all(root.join("project/public"))?;
    write(root.join("project/public/index.html"), "v2")?;
    create_dir_all(root.join("srv/site"))?;
    write(root.join("srv/site/index.html"), "v1")?;

    let deployer = fixture(&root, false);
    let first = root.join("srv/releases/site.24-01-01_120000_UTC");
    let second = root.join("srv/releases/site.24-01-01_130000_UTC");

    // Served directory becomes the first release.
    deployer.executor().transport().tick("24-01-01_120000_UTC");
    let release = deployer.init()?;
    assert_eq!(release.name, "site.24-01-01_120000_UTC");
    assert_eq!(live_target(&root)?, first);
    assert_eq!(read_to_string(root.join("srv/site/index.html"))?, "v1");

    // New release is published next to it, live link stays put.
    deployer.executor().transport().tick("24-01-01_130000_UTC");
    let release = deployer.publish(false)?;
    assert_eq!(release.name, "site.24-01-01_130000_UTC");
    assert_eq!(read_to_string(second.join("index.html"))?, "v2");
    assert_eq!(live_target(&root)?, first);
    let plans = deployer.transfer().plans.borrow().clone();
    assert_eq!(
        plans[0].reference,
        Some(RemotePath::new(first.to_string_lossy()))
    );

    // Operator picks the second release by letter.
    deployer.operator().answer("b");
    let release = deployer.switch(ReleaseChoice::Interactive, false)?;
    assert_eq!(release.name, "site.24-01-01_130000_UTC");
    assert_eq!(live_target(&root)?, second);
    assert_eq!(read_to_string(root.join("srv/site/index.html"))?, "v2");

    let menu = deployer.releases()?;
    let current = menu
        .entries()
        .iter()
        .find(|entry| entry.current)
        .map(|entry| entry.release.name.clone());
    assert_eq!(current.as_deref(), Some("site.24-01-01_130000_UTC"));

    // Invalid letter changes nothing.
    deployer.operator().answer("z");
    let error = deployer.switch(ReleaseChoice::Interactive, false).unwrap_err();
    assert!(matches!(
        error,
        DeployError::Selection(SelectionError::InvalidChoice { .. })
    ));
    assert_eq!(live_target(&root)?, second);

    // Roll back by name.
    deployer.switch(
        ReleaseChoice::Named("site.24-01-01_120000_UTC".into()),
        false,
    )?;
    assert_eq!(live_target(&root)?, first);
    assert_eq!(read_to_string(root.join("srv/site/index.html"))?, "v1");

    // Setting up twice is refused.
    let error = deployer.init().unwrap_err();
    assert!(matches!(
        error,
        DeployError::Precondition(PreconditionError::AlreadyInitialized { .. })
    ));

    Ok(())
}

#[sealed_test]
fn dry_run_leaves_server_alone() -> Result<()> {
    let root = std::env::current_dir()?;
    create_dir_all(root.join("project/public"))?;
    create_dir_all(root.join("srv/site"))?;
    write(root.join("srv/site/index.html"), "v1")?;

    let deployer = fixture(&root, true);
    deployer.executor().transport().tick("24-01-01_120000_UTC");
    let release = deployer.init()?;
    assert_eq!(release.name, "site.24-01-01_120000_UTC");

    assert!(root.join("srv/site").is_dir());
    assert!(read_link(root.join("srv/site")).is_err());
    assert!(!root.join("srv/releases").exists());

    Ok(())
}

#[sealed_test]
fn served_root_with_trailing_slash() -> Result<()> {
    let root = std::env::current_dir()?;
    create_dir_all(root.join("srv/site"))?;
    write(root.join("srv/site/index.html"), "v1")?;

    let server = Server {
        root: RemotePath::new(format!("{}/srv/site/", root.display())),
        deploy_root: Some(RemotePath::new(format!("{}/srv/releases/", root.display()))),
        ..Default::default()
    };
    let target = DeployTarget::from_server("local", &server)?;
    let deployer = fixture_for(&root, target, false);

    deployer.executor().transport().tick("24-01-01_120000_UTC");
    deployer.init()?;
    assert_eq!(
        live_target(&root)?,
        root.join("srv/releases/site.24-01-01_120000_UTC")
    );
    assert_eq!(read_to_string(root.join("srv/site/index.html"))?, "v1");

    Ok(())
}

#[sealed_test]
fn failed_ownership_change_keeps_site_served() -> Result<()> {
    let root = std::env::current_dir()?;
    create_dir_all(root.join("srv/site"))?;
    write(root.join("srv/site/index.html"), "v1")?;

    let base = RemotePath::new(root.to_string_lossy());
    let target = DeployTarget {
        deploy_root: base.join("srv/releases"),
        live_link: base.join("srv/site"),
        owner_group: Some("relink-no-such-group".into()),
        sudo: false,
    };
    let deployer = fixture_for(&root, target, false);

    deployer.executor().transport().tick("24-01-01_120000_UTC");
    assert!(deployer.init().is_err());
    assert_eq!(
        live_target(&root)?,
        root.join("srv/releases/site.24-01-01_120000_UTC")
    );
    assert_eq!(read_to_string(root.join("srv/site/index.html"))?, "v1");

    Ok(())
}
