//! Database superuser password management.
//!
//! The database is not running when the container first boots, so the
//! password change brackets a transient start and stop of the service.

use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use firstboot_utils::CommandRunExt;
use fn_error_context::context;

/// The service name used when none is given.
pub(crate) const DEFAULT_SERVICE: &str = "mariadb";

/// Controls the local database server.
pub(crate) trait DatabaseService: std::fmt::Debug {
    /// Start the server.
    fn start(&self) -> Result<()>;
    /// Change the password of the local database superuser.
    fn set_root_password(&self, password: &str) -> Result<()>;
    /// Stop the server.
    fn stop(&self) -> Result<()>;
}

/// MariaDB (or MySQL) managed through `service(8)`, with statements
/// executed by the `mysql` client as the passwordless local root.
#[derive(Debug)]
pub(crate) struct MariaDb {
    service: String,
}

impl MariaDb {
    pub(crate) fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn service_command(&self, verb: &str) -> Result<()> {
        Command::new("service")
            .args([self.service.as_str(), verb])
            .run_inherited()
    }
}

/// Quote a value as a single-quoted SQL string literal.
fn sql_string_literal(v: &str) -> String {
    let mut r = String::with_capacity(v.len() + 2);
    r.push('\'');
    for c in v.chars() {
        match c {
            '\\' => r.push_str("\\\\"),
            '\'' => r.push_str("\\'"),
            '\0' => r.push_str("\\0"),
            c => r.push(c),
        }
    }
    r.push('\'');
    r
}

/// The statements piped to the client; kept off the command line so the
/// password does not show up in the process table.
fn set_root_password_sql(password: &str) -> String {
    format!(
        "SET PASSWORD FOR 'root'@'localhost' = PASSWORD({});\nFLUSH PRIVILEGES;\n",
        sql_string_literal(password)
    )
}

impl DatabaseService for MariaDb {
    #[context("Starting {}", self.service)]
    fn start(&self) -> Result<()> {
        self.service_command("start")
    }

    #[context("Setting database root password")]
    fn set_root_password(&self, password: &str) -> Result<()> {
        Command::new("mysql")
            .arg("-uroot")
            .run_with_stdin(set_root_password_sql(password).as_bytes())
    }

    #[context("Stopping {}", self.service)]
    fn stop(&self) -> Result<()> {
        self.service_command("stop")
    }
}

/// Start the database, change the root password, and stop it again.
///
/// There is no readiness probe; `settle` is slept after starting and again
/// before stopping. Any failure aborts immediately, which can leave the
/// service running.
#[context("Provisioning database root password")]
pub(crate) fn provision_root_password(
    db: &dyn DatabaseService,
    password: &str,
    settle: Duration,
) -> Result<()> {
    db.start()?;
    std::thread::sleep(settle);
    db.set_root_password(password)?;
    std::thread::sleep(settle);
    db.stop()?;
    Ok(())
}
