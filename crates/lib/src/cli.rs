//! # firstboot command line interface
//!
//! Command line tool to provision a container on its first start.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use clap::Parser;
use fn_error_context::context;
use rustix::process::getuid;

use crate::accounts::Chpasswd;
use crate::certs::SelfSigned;
use crate::config::InitConfig;
use crate::database::{MariaDb, DEFAULT_SERVICE};
use crate::initializer::{FirstBoot, RunOutcome};
use crate::sentinel::{self, InitState};

/// Options for the `run` verb.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct RunOpts {
    /// Name of the database service to start and stop around the password change.
    #[clap(long, default_value = DEFAULT_SERVICE)]
    pub(crate) db_service: String,

    /// Milliseconds to wait after starting, and again before stopping, the database.
    #[clap(long, default_value_t = 500)]
    pub(crate) db_settle_delay_ms: u64,

    /// Filesystem root that all provisioned paths are relative to.
    #[clap(long, default_value = "/", hide = true)]
    pub(crate) root: Utf8PathBuf,
}

/// Options for the `status` verb.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct StatusOpts {
    /// Output in JSON format.
    #[clap(long)]
    pub(crate) json: bool,

    /// Filesystem root to inspect.
    #[clap(long, default_value = "/", hide = true)]
    pub(crate) root: Utf8PathBuf,
}

/// Provision a container on first start, exactly once.
///
/// Reads `ROOT_PASS` and `SQL_PASS` from the environment; unset or empty
/// values skip the corresponding step.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "firstboot", version)]
pub(crate) enum Opt {
    /// Perform first boot initialization unless it already happened.
    Run(RunOpts),
    /// Report whether initialization has completed.
    Status(StatusOpts),
}

#[context("Opening root {root}")]
fn open_root(root: &Utf8Path) -> Result<Dir> {
    Ok(Dir::open_ambient_dir(root, cap_std::ambient_authority())?)
}

/// Passwords can only be changed by root.
fn require_root() -> Result<()> {
    ensure!(getuid().is_root(), "This command must be executed as the root user");
    Ok(())
}

fn run(opts: RunOpts) -> Result<()> {
    run_with_env(opts, |k| std::env::var_os(k))
}

/// The marker is checked first: once present, the uid and environment are
/// never looked at and the run succeeds.
fn run_with_env(opts: RunOpts, lookup: impl Fn(&str) -> Option<OsString>) -> Result<()> {
    let root = &open_root(&opts.root)?;
    if sentinel::is_present(root)? {
        tracing::info!(
            "Found {}; initialization already done",
            sentinel::SENTINEL_PATH
        );
        return Ok(());
    }
    require_root()?;
    let settle = Duration::from_millis(opts.db_settle_delay_ms);
    let config = InitConfig::from_lookup(settle, lookup)?;
    tracing::debug!("Using {config:?}");
    let firstboot = FirstBoot {
        root,
        accounts: &Chpasswd,
        database: &MariaDb::new(opts.db_service),
        certs: &SelfSigned,
    };
    match firstboot.run(&config)? {
        RunOutcome::AlreadyInitialized => {}
        RunOutcome::Completed { completed_at } => {
            tracing::debug!("Recorded completion at {completed_at}");
        }
    }
    Ok(())
}

fn status(opts: StatusOpts, out: &mut impl Write) -> Result<()> {
    let root = &open_root(&opts.root)?;
    let state = sentinel::state(root)?;
    if opts.json {
        serde_json::to_writer(&mut *out, &state).context("Serializing status")?;
        writeln!(out)?;
        return Ok(());
    }
    match state {
        InitState::NotInitialized => {
            writeln!(out, "Not initialized")?;
        }
        InitState::Initialized { completed_at } => {
            writeln!(out, "Initialized: {completed_at}")?;
        }
    }
    Ok(())
}

/// Parse the provided arguments and execute.
/// Calls [`clap::Error::exit`] on failure, printing the error message and aborting the program.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run_from_opt(Opt::parse_from(args))
}

fn run_from_opt(opt: Opt) -> Result<()> {
    match opt {
        Opt::Run(opts) => run(opts),
        Opt::Status(opts) => status(opts, &mut std::io::stdout().lock()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let o = Opt::try_parse_from(["firstboot", "run"]).unwrap();
        assert_eq!(
            o,
            Opt::Run(RunOpts {
                db_service: "mariadb".into(),
                db_settle_delay_ms: 500,
                root: "/".into(),
            })
        );

        let o = Opt::try_parse_from([
            "firstboot",
            "run",
            "--db-service",
            "mysql",
            "--db-settle-delay-ms",
            "2000",
            "--root",
            "/target",
        ])
        .unwrap();
        assert_eq!(
            o,
            Opt::Run(RunOpts {
                db_service: "mysql".into(),
                db_settle_delay_ms: 2000,
                root: "/target".into(),
            })
        );
    }

    #[test]
    fn test_parse_status() {
        let o = Opt::try_parse_from(["firstboot", "status", "--json"]).unwrap();
        assert_eq!(
            o,
            Opt::Status(StatusOpts {
                json: true,
                root: "/".into(),
            })
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Opt::try_parse_from(["firstboot"]).is_err());
        assert!(Opt::try_parse_from(["firstboot", "run", "--db-settle-delay-ms", "soon"]).is_err());
    }

    fn fixture() -> Result<(tempfile::TempDir, Utf8PathBuf)> {
        let td = tempfile::tempdir()?;
        let root = Utf8PathBuf::try_from(td.path().to_owned())?;
        Ok((td, root))
    }

    fn write_marker(root: &Utf8Path, contents: &str) -> Result<()> {
        std::fs::create_dir(root.join("root"))?;
        std::fs::write(root.join(sentinel::SENTINEL_PATH), contents)?;
        Ok(())
    }

    fn status_output(root: &Utf8Path, json: bool) -> Result<String> {
        let mut out = Vec::new();
        status(
            StatusOpts {
                json,
                root: root.to_owned(),
            },
            &mut out,
        )?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_status() -> Result<()> {
        let (_td, root) = fixture()?;
        similar_asserts::assert_eq!(status_output(&root, false)?, "Not initialized\n");
        similar_asserts::assert_eq!(
            status_output(&root, true)?,
            "{\"state\":\"not-initialized\"}\n"
        );

        write_marker(&root, "2024-03-01 10:15:42\n")?;
        similar_asserts::assert_eq!(
            status_output(&root, false)?,
            "Initialized: 2024-03-01 10:15:42\n"
        );
        similar_asserts::assert_eq!(
            status_output(&root, true)?,
            "{\"state\":\"initialized\",\"completed_at\":\"2024-03-01 10:15:42\"}\n"
        );
        Ok(())
    }

    fn run_opts(root: &Utf8Path) -> RunOpts {
        RunOpts {
            db_service: DEFAULT_SERVICE.into(),
            db_settle_delay_ms: 0,
            root: root.to_owned(),
        }
    }

    fn invalid_env(k: &str) -> Option<OsString> {
        use std::os::unix::ffi::OsStringExt;
        (k == crate::config::SQL_PASS_ENV).then(|| OsString::from_vec(b"pass\xEE".to_vec()))
    }

    #[test]
    fn test_run_already_initialized() -> Result<()> {
        let (_td, root) = fixture()?;
        write_marker(&root, "2024-03-01 10:15:42")?;
        // Neither the environment nor our uid matter once the marker exists
        run_with_env(run_opts(&root), invalid_env)?;
        assert_eq!(
            std::fs::read_to_string(root.join(sentinel::SENTINEL_PATH))?,
            "2024-03-01 10:15:42"
        );
        assert!(!root.join("etc").exists());
        Ok(())
    }

    #[test]
    fn test_run_fails_before_side_effects() -> Result<()> {
        let (_td, root) = fixture()?;
        // Fails on either the uid check or the environment, before touching anything
        assert!(run_with_env(run_opts(&root), invalid_env).is_err());
        assert!(!root.join(sentinel::SENTINEL_PATH).exists());
        assert!(!root.join("etc").exists());
        Ok(())
    }
}
