// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Database dumps tied to releases.
//!
//! A deploy can snapshot the database into the release that is active at
//! the time, and a switch can load the snapshot stored in the release being
//! switched to. This keeps code and schema moving back and forth together.
//! Dumps are gzipped SQL produced by `mysqldump` on the server itself, so
//! the data never crosses the network.

use crate::{
    config::{MysqlTarget, RemotePath},
    remote::{ExecError, RemoteCommand, RemoteExecutor, Transport},
    ui,
};

use tracing::{info, instrument};

/// Name of the dump file inside a release directory.
pub const DUMP_FILE_NAME: &str = "DB-DUMP.sql.gz";

/// Command writing a gzipped dump of `mysql` into `file`.
pub fn dump_command(mysql: &MysqlTarget, file: &RemotePath) -> RemoteCommand {
    let mysqldump = connection_args(RemoteCommand::new("mysqldump"), mysql).args([
        "--single-transaction",
        "--triggers",
        "--events",
        "--routines",
    ]);

    skip_secure_auth(mysqldump, mysql)
        .arg(mysql.db.as_str())
        .pipe(RemoteCommand::new("gzip").arg("-c"))
        .stdout_to(file.as_str())
}

/// Command loading gzipped dump `file` into `mysql`.
pub fn load_command(mysql: &MysqlTarget, file: &RemotePath) -> RemoteCommand {
    let client = connection_args(RemoteCommand::new("mysql"), mysql);

    RemoteCommand::new("gunzip")
        .arg("-c")
        .arg(file.as_str())
        .pipe(skip_secure_auth(client, mysql).arg(mysql.db.as_str()))
}

fn connection_args(command: RemoteCommand, mysql: &MysqlTarget) -> RemoteCommand {
    let mut command = command
        .arg(format!(
            "--host={}",
            mysql.hostname.as_deref().unwrap_or("localhost")
        ))
        .arg(format!("--port={}", mysql.port.unwrap_or(3306)))
        .arg(format!("--user={}", mysql.username));
    if let Some(password) = &mysql.password {
        command = command.secret_arg("--password=", password.as_str());
    }

    command
}

fn skip_secure_auth(command: RemoteCommand, mysql: &MysqlTarget) -> RemoteCommand {
    if mysql.skip_secure_auth {
        command.arg("--skip-secure-auth")
    } else {
        command
    }
}

/// Dump database into `file` on the host.
///
/// # Errors
///
/// - Return [`DatabaseError::Exec`] if the dump fails.
#[instrument(skip(executor, mysql), fields(db = %mysql.db), level = "debug")]
pub fn dump<T>(
    executor: &RemoteExecutor<T>,
    mysql: &MysqlTarget,
    file: &RemotePath,
    dry_run: bool,
) -> Result<()>
where
    T: Transport,
{
    let command = dump_command(mysql, file);
    let spinner = ui::spinner(format!("dumping {} into {file}", mysql.db));
    let result = executor.execute_checked(&command, dry_run);
    spinner.finish_and_clear();
    result?;
    info!("dumped {} into {file}", mysql.db);

    Ok(())
}

/// Load dump `file` on the host into the database.
///
/// # Errors
///
/// - Return [`DatabaseError::Exec`] if the load fails.
#[instrument(skip(executor, mysql), fields(db = %mysql.db), level = "debug")]
pub fn load<T>(
    executor: &RemoteExecutor<T>,
    mysql: &MysqlTarget,
    file: &RemotePath,
    dry_run: bool,
) -> Result<()>
where
    T: Transport,
{
    let command = load_command(mysql, file);
    let spinner = ui::spinner(format!("loading {file} into {}", mysql.db));
    let result = executor.execute_checked(&command, dry_run);
    spinner.finish_and_clear();
    result?;
    info!("loaded {file} into {}", mysql.db);

    Ok(())
}

/// Check whether a dump file exists on the host.
///
/// Always runs, even in dry-run mode.
///
/// # Errors
///
/// - Return [`DatabaseError::Exec`] if the check cannot be run.
pub fn dump_exists<T>(executor: &RemoteExecutor<T>, file: &RemotePath) -> Result<bool>
where
    T: Transport,
{
    let command = RemoteCommand::new("test").arg("-f").arg(file.as_str());
    Ok(executor.execute(&command, false)?.is_success())
}

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Dump or load command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{command::shell_quote, fake::ScriptedTransport};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn mysql() -> MysqlTarget {
        MysqlTarget {
            username: "app".into(),
            password: Some("s3cret pass".into()),
            db: "app".into(),
            hostname: Some("127.0.0.1".into()),
            skip_secure_auth: true,
            port: None,
            note: None,
        }
    }

    #[test]
    fn dump_command_pipes_into_gzip() {
        let file = RemotePath::new("/srv/releases/www.24-01-01_120000_UTC").join(DUMP_FILE_NAME);
        let command = dump_command(&mysql(), &file);

        let expect = shell_quote(
            "mysqldump --host=127.0.0.1 --port=3306 --user=app '--password=s3cret pass' \
             --single-transaction --triggers --events --routines --skip-secure-auth app \
             | gzip -c > /srv/releases/www.24-01-01_120000_UTC/DB-DUMP.sql.gz",
        );
        assert_eq!(command.to_shell(), format!("bash -o pipefail -c {expect}"));
        assert!(!command.to_string().contains("s3cret"));
    }

    #[test]
    fn load_command_feeds_mysql() {
        let file = RemotePath::new("/srv/releases/www.24-01-01_120000_UTC/DB-DUMP.sql.gz");
        let command = load_command(
            &MysqlTarget {
                password: None,
                skip_secure_auth: false,
                ..mysql()
            },
            &file,
        );

        assert_eq!(
            command.to_shell(),
            "bash -o pipefail -c 'gunzip -c /srv/releases/www.24-01-01_120000_UTC/DB-DUMP.sql.gz \
             | mysql --host=127.0.0.1 --port=3306 --user=app app'"
        );
    }

    #[test]
    fn failed_dump_is_fatal() {
        let executor = RemoteExecutor::new(ScriptedTransport::new().fail(
            "bash -o pipefail -c 'mysqldump",
            "mysqldump: Got error: 1045: Access denied\n",
            2,
        ))
        .with_echo(false);
        let file = RemotePath::new("/srv/dump.sql.gz");

        let error = dump(&executor, &mysql(), &file, false).unwrap_err();
        assert!(error.to_string().contains("Access denied"), "{error}");
        assert!(!error.to_string().contains("s3cret"), "{error}");
    }

    #[test]
    fn dump_exists_runs_in_dry_run() -> anyhow::Result<()> {
        let executor =
            RemoteExecutor::new(ScriptedTransport::new().fail("test -f", "", 1)).with_echo(false);

        assert!(!dump_exists(&executor, &RemotePath::new("/srv/dump.sql.gz"))?);
        assert!(dump_exists(&executor, &RemotePath::new("/srv/dump.sql.gz"))?);

        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[sealed_test]
    fn dump_fails_when_mysqldump_fails() -> anyhow::Result<()> {
        use crate::remote::LocalTransport;

        let executor = RemoteExecutor::new(LocalTransport::new()).with_echo(false);
        let file = RemotePath::new(std::env::current_dir()?.to_string_lossy()).join(DUMP_FILE_NAME);
        let unreachable = MysqlTarget {
            hostname: Some("relink.invalid".into()),
            port: Some(1),
            ..mysql()
        };

        let result = dump(&executor, &unreachable, &file, false);
        assert!(result.is_err());

        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[sealed_test]
    fn load_fails_on_corrupt_dump() -> anyhow::Result<()> {
        use crate::remote::LocalTransport;

        std::fs::write(DUMP_FILE_NAME, "not gzip")?;
        let executor = RemoteExecutor::new(LocalTransport::new()).with_echo(false);
        let file = RemotePath::new(std::env::current_dir()?.to_string_lossy()).join(DUMP_FILE_NAME);

        let result = load(&executor, &mysql(), &file, false);
        assert!(result.is_err());

        Ok(())
    }
}
