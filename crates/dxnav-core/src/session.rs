use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::notify::Notifier;
use crate::process::{args, DxRunner};
use crate::status::StatusIndicator;

pub const LOGGED_OUT_MESSAGE: &str = "You are not logged into DNAnexus. Run the login command to continue.";
pub const EXPIRED_MESSAGE: &str = "Your DNAnexus session has expired. Run the login command to log in again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginState {
    LoggedIn(String),
    LoggedOut,
    Expired,
}

impl LoginState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginState::LoggedIn(_))
    }
}

/// Asks `dx whoami` who the current user is. Any failure other than an
/// expired token counts as logged out.
pub async fn check_login(runner: &dyn DxRunner) -> LoginState {
    match runner.call_text(&args(&["whoami"])).await {
        Ok(out) => {
            let user = out.text().trim().to_string();
            if user.is_empty() {
                LoginState::LoggedOut
            } else {
                info!("User is logged in as {user}");
                LoginState::LoggedIn(user)
            }
        }
        Err(err) if err.is_auth_expired() => {
            warn!("DNAnexus session expired: {err}");
            LoginState::Expired
        }
        Err(err) => {
            warn!("Error checking login status: {err}");
            LoginState::LoggedOut
        }
    }
}

/// `check_login`, with the result pushed to the status indicator and a
/// login prompt when the user is not logged in.
pub async fn refresh_login(
    runner: &dyn DxRunner,
    status: &StatusIndicator,
    notifier: &dyn Notifier,
) -> LoginState {
    let state = check_login(runner).await;
    status.set_login(&state);
    match &state {
        LoginState::LoggedIn(_) => {}
        LoginState::LoggedOut => notifier.info(LOGGED_OUT_MESSAGE),
        LoginState::Expired => notifier.warn(EXPIRED_MESSAGE),
    }
    state
}

/// Argument vector for an interactive `dx login`.
pub fn login_command(cli_path: &Path) -> Vec<String> {
    vec![cli_path.display().to_string(), "login".into()]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub cli_path: PathBuf,
    pub version: Option<String>,
    pub login: LoginState,
}

/// Collects what `env check` prints: the tool in use, its version and the
/// current user.
pub async fn check_environment(runner: &dyn DxRunner) -> EnvironmentReport {
    let version = match runner.call_text(&args(&["--version"])).await {
        Ok(out) => Some(out.text().trim().to_string()).filter(|v| !v.is_empty()),
        Err(err) => {
            warn!("dx --version failed: {err}");
            None
        }
    };
    EnvironmentReport {
        cli_path: runner.cli_path().to_path_buf(),
        version,
        login: check_login(runner).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DxError;
    use crate::process::DxOutput;
    use crate::test_support::{exit_error, Notice, RecordingNotifier, RecordingRunner};

    #[tokio::test]
    async fn whoami_output_is_the_user() {
        let runner = RecordingRunner::text("alice\n");
        assert_eq!(check_login(&runner).await, LoginState::LoggedIn("alice".into()));
        assert_eq!(runner.lines(), ["whoami"]);
    }

    #[tokio::test]
    async fn invalid_authentication_means_expired() {
        let runner = RecordingRunner::new(|_| {
            Err(DxError::classify(
                Some(3),
                "InvalidAuthentication: the token could not be found",
            ))
        });
        assert_eq!(check_login(&runner).await, LoginState::Expired);
    }

    #[tokio::test]
    async fn other_failures_mean_logged_out() {
        let runner = RecordingRunner::new(|_| Err(exit_error("You are not logged in")));
        assert_eq!(check_login(&runner).await, LoginState::LoggedOut);
        assert_eq!(
            check_login(&RecordingRunner::text("  ")).await,
            LoginState::LoggedOut
        );
    }

    #[tokio::test]
    async fn refresh_updates_status_and_prompts() {
        let status = StatusIndicator::new();
        let notifier = RecordingNotifier::default();
        let runner = RecordingRunner::new(|_| {
            Err(DxError::classify(Some(3), "InvalidAuthentication"))
        });

        let state = refresh_login(&runner, &status, &notifier).await;

        assert_eq!(state, LoginState::Expired);
        assert_eq!(status.current().text, "$(warning) DNAnexus");
        assert_eq!(notifier.notices(), [Notice::Warn(EXPIRED_MESSAGE.into())]);
    }

    #[tokio::test]
    async fn environment_report_collects_version_and_user() {
        let runner = RecordingRunner::new(|argv| {
            Ok(DxOutput::Text(match argv[0].as_str() {
                "--version" => "dx v0.380.0\n".into(),
                _ => "bob".into(),
            }))
        });
        let report = check_environment(&runner).await;
        assert_eq!(report.version.as_deref(), Some("dx v0.380.0"));
        assert_eq!(report.login, LoginState::LoggedIn("bob".into()));
        assert_eq!(report.cli_path, Path::new("dx"));
    }

    #[test]
    fn login_command_uses_resolved_cli() {
        assert_eq!(login_command(Path::new("/opt/dx")), ["/opt/dx", "login"]);
    }
}
