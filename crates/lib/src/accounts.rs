//! Shell account password management.

use std::process::Command;

use anyhow::{ensure, Result};
use firstboot_utils::CommandRunExt;
use fn_error_context::context;

/// The account whose password is provisioned from the environment.
pub(crate) const ROOT_USER: &str = "root";

/// Changes OS account passwords.
pub(crate) trait AccountManager: std::fmt::Debug {
    /// Set the password of `user` to exactly `password`.
    fn set_password(&self, user: &str, password: &str) -> Result<()>;
}

/// Uses `chpasswd(8)`, which reads `user:password` lines on stdin.
#[derive(Debug, Default)]
pub(crate) struct Chpasswd;

/// Build the single input line for `chpasswd`.
fn chpasswd_line(user: &str, password: &str) -> Result<String> {
    ensure!(
        !user.is_empty() && !user.contains([':', '\n']),
        "Invalid user name {user:?}"
    );
    // chpasswd splits the user at the first colon, so colons in the
    // password are fine; a newline would silently truncate it though.
    ensure!(
        !password.contains('\n'),
        "Password for {user} must not contain a newline"
    );
    Ok(format!("{user}:{password}\n"))
}

impl AccountManager for Chpasswd {
    #[context("Setting password for {user}")]
    fn set_password(&self, user: &str, password: &str) -> Result<()> {
        let line = chpasswd_line(user, password)?;
        Command::new("chpasswd").run_with_stdin(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chpasswd_line() -> Result<()> {
        assert_eq!(chpasswd_line(ROOT_USER, "hunter2")?, "root:hunter2\n");
        assert_eq!(chpasswd_line(ROOT_USER, "a:b c'\"")?, "root:a:b c'\"\n");
        Ok(())
    }

    #[test]
    fn test_chpasswd_line_rejects() {
        assert!(chpasswd_line(ROOT_USER, "two\nlines").is_err());
        assert!(chpasswd_line("ro:ot", "x").is_err());
        assert!(chpasswd_line("", "x").is_err());
    }

    #[test]
    fn test_rejects_before_exec() {
        // Nothing gets spawned for an unrepresentable password
        let e = Chpasswd.set_password(ROOT_USER, "a\nb").unwrap_err();
        let msg = format!("{e:#}");
        assert!(msg.starts_with("Setting password for root"), "{msg}");
        assert!(msg.contains("newline"), "{msg}");
        assert!(!msg.contains("a\nb"), "{msg}");
    }
}
