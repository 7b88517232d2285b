//! Storefront login resolution.
//!
//! `THEMEKIT_USERNAME` and `THEMEKIT_PASSWORD` are used when both are set.
//! Otherwise the missing values are prompted for on an attended terminal.

use console::Term;
use themekit_sync::Credentials;

use crate::error::{CliError, Result};

pub const USERNAME_VAR: &str = "THEMEKIT_USERNAME";
pub const PASSWORD_VAR: &str = "THEMEKIT_PASSWORD";

/// Resolve credentials from the environment, prompting for anything missing.
///
/// Blocks on terminal input, so call it from `spawn_blocking` inside async
/// code.
///
/// # Errors
///
/// Fails when a value is missing and stderr is not attended, or when the
/// prompt cannot be read.
pub fn resolve() -> Result<Credentials> {
    resolve_with(
        |var| std::env::var(var).ok(),
        console::user_attended_stderr(),
        &Term::stderr(),
    )
}

fn resolve_with(
    lookup: impl Fn(&str) -> Option<String>,
    attended: bool,
    term: &Term,
) -> Result<Credentials> {
    let username = lookup(USERNAME_VAR).filter(|v| !v.trim().is_empty());
    let password = lookup(PASSWORD_VAR).filter(|v| !v.is_empty());

    if let (Some(username), Some(password)) = (&username, &password) {
        return Ok(Credentials::new(username.trim(), password.as_str()));
    }

    if !attended {
        let missing = match (&username, &password) {
            (None, None) => format!("{} and {}", USERNAME_VAR, PASSWORD_VAR),
            (None, Some(_)) => USERNAME_VAR.to_string(),
            _ => PASSWORD_VAR.to_string(),
        };
        return Err(CliError::Credentials(format!(
            "{} not set and no terminal to prompt on",
            missing
        )));
    }

    let username = match username {
        Some(username) => username,
        None => {
            term.write_str("Username: ")?;
            term.read_line()?
        }
    };
    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(CliError::Credentials("username cannot be empty".to_string()));
    }

    let password = match password {
        Some(password) => password,
        None => {
            term.write_str("Password: ")?;
            term.read_secure_line()?
        }
    };

    Ok(Credentials::new(username, password))
}
