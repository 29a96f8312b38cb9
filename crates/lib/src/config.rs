//! Runtime configuration gathered from the environment.

use std::ffi::OsString;
use std::time::Duration;

use anyhow::{anyhow, Result};
use fn_error_context::context;

/// Environment variable carrying the desired root shell password.
pub(crate) const ROOT_PASS_ENV: &str = "ROOT_PASS";
/// Environment variable carrying the desired database root password.
pub(crate) const SQL_PASS_ENV: &str = "SQL_PASS";

/// Inputs for a single initializer run.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct InitConfig {
    /// Password for the `root` shell account; `None` skips the step.
    pub(crate) root_password: Option<String>,
    /// Password for the database superuser; `None` skips the step.
    pub(crate) sql_password: Option<String>,
    /// How long to wait after starting, and again before stopping, the database.
    pub(crate) db_settle_delay: Duration,
}

// Passwords must never end up in logs.
impl std::fmt::Debug for InitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("InitConfig")
            .field("root_password", &redact(&self.root_password))
            .field("sql_password", &redact(&self.sql_password))
            .field("db_settle_delay", &self.db_settle_delay)
            .finish()
    }
}

/// An unset or empty variable means "skip this step".
fn nonempty(name: &str, value: Option<OsString>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    value
        .into_string()
        .map(Some)
        .map_err(|_| anyhow!("{name} is not valid UTF-8"))
}

impl InitConfig {
    /// Read credentials through `lookup`, normally [`std::env::var_os`].
    #[context("Loading configuration from environment")]
    pub(crate) fn from_lookup(
        db_settle_delay: Duration,
        lookup: impl Fn(&str) -> Option<OsString>,
    ) -> Result<Self> {
        let root_password = nonempty(ROOT_PASS_ENV, lookup(ROOT_PASS_ENV))?;
        let sql_password = nonempty(SQL_PASS_ENV, lookup(SQL_PASS_ENV))?;
        Ok(Self {
            root_password,
            sql_password,
            db_settle_delay,
        })
    }
}
