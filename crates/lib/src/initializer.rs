//! # The run-once first boot sequence
//!
//! Steps run strictly in order and the first failure aborts the run. The
//! completion marker is only written once everything else succeeded, so
//! an interrupted run is repeated in full on the next container start.

use anyhow::Result;
use cap_std_ext::cap_std::fs::Dir;
use fn_error_context::context;

use crate::accounts::{AccountManager, ROOT_USER};
use crate::certs::{self, CertificateGenerator, CertificatePair};
use crate::config::InitConfig;
use crate::database::{self, DatabaseService};
use crate::sentinel;

/// What a call to [`FirstBoot::run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// The marker was already present; nothing was touched.
    AlreadyInitialized,
    /// All steps ran and the marker now records this time.
    Completed { completed_at: String },
}

/// The external systems the sequence mutates.
#[derive(Debug)]
pub(crate) struct FirstBoot<'a> {
    pub(crate) root: &'a Dir,
    pub(crate) accounts: &'a dyn AccountManager,
    pub(crate) database: &'a dyn DatabaseService,
    pub(crate) certs: &'a dyn CertificateGenerator,
}

impl FirstBoot<'_> {
    #[context("Running first boot initialization")]
    pub(crate) fn run(&self, config: &InitConfig) -> Result<RunOutcome> {
        if sentinel::is_present(self.root)? {
            tracing::info!(
                "Found {}; initialization already done",
                sentinel::SENTINEL_PATH
            );
            return Ok(RunOutcome::AlreadyInitialized);
        }

        self.shell_password(config)?;
        self.database_password(config)?;
        self.certificates()?;

        let completed_at =
            firstboot_utils::format_marker_timestamp(&chrono::Local::now().naive_local());
        sentinel::write(self.root, &completed_at)?;
        tracing::info!("Initialization complete");
        Ok(RunOutcome::Completed { completed_at })
    }

    fn shell_password(&self, config: &InitConfig) -> Result<()> {
        match config.root_password.as_deref() {
            Some(password) => {
                tracing::info!("Shell: setting {ROOT_USER} password from environment");
                self.accounts.set_password(ROOT_USER, password)
            }
            None => {
                tracing::info!("Shell: password not set");
                Ok(())
            }
        }
    }

    fn database_password(&self, config: &InitConfig) -> Result<()> {
        match config.sql_password.as_deref() {
            Some(password) => {
                tracing::info!("Database: setting root password from environment");
                database::provision_root_password(
                    self.database,
                    password,
                    config.db_settle_delay,
                )
            }
            None => {
                tracing::info!("Database: password not set");
                Ok(())
            }
        }
    }

    fn certificates(&self) -> Result<()> {
        for name in certs::ENDPOINTS {
            let pair = CertificatePair::for_endpoint(name);
            certs::ensure_pair(self.root, self.certs, &pair)?;
        }
        Ok(())
    }
}
