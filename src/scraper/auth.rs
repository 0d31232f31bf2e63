use tracing::{info, warn};

use crate::browser::session::{ACTION_TIMEOUT, SETTLE_LONG};
use crate::browser::{BrowserSession, Locator};
use crate::config::Credentials;
use crate::error::{Result, ScrapeError};

/// Ordered login-state indicators; the first match wins. The target site has
/// shipped several revisions of its account chrome, hence the alternatives.
const LOGIN_INDICATOR: Locator = Locator::new(
    "login indicator",
    &[
        ".user-dashboard",
        ".user-menu",
        ".logout-button",
        r#"a[href*="logout"]"#,
    ],
);

const USERNAME_FIELD: Locator = Locator::new(
    "username field",
    &[r#"input[type="email"]"#, r#"input[name="username"]"#, "#username"],
);

const PASSWORD_FIELD: Locator = Locator::new(
    "password field",
    &[r#"input[type="password"]"#, "#password"],
);

const LOGIN_SUBMIT: Locator = Locator::new(
    "login submit",
    &[r#"button[type="submit"]"#, r#"input[type="submit"]"#],
);

#[derive(Debug)]
pub enum AuthOutcome {
    /// An indicator matched; the session is already authenticated.
    AlreadyLoggedIn,
    /// A credentialed login sequence completed.
    LoggedIn,
    /// Logged out with no credentials available. Terminal for the run:
    /// an operator has to log in out-of-band.
    NeedsManualLogin,
    /// Credentials were present but the login sequence failed.
    LoginFailed(ScrapeError),
}

pub struct AuthProbe;

impl AuthProbe {
    /// Classify the session's authentication state and log in if needed.
    pub async fn probe(session: &BrowserSession, credentials: Option<&Credentials>) -> AuthOutcome {
        if LOGIN_INDICATOR.try_resolve(session.page()).await.is_some() {
            info!("Session is already logged in");
            return AuthOutcome::AlreadyLoggedIn;
        }

        let Some(creds) = credentials else {
            info!("No login credentials provided");
            return AuthOutcome::NeedsManualLogin;
        };

        match Self::perform_login(session, creds).await {
            Ok(()) => {
                info!("Login performed");
                AuthOutcome::LoggedIn
            }
            Err(e) => {
                let err = ScrapeError::Authentication(format!("Login failed: {}", e));
                warn!("{}", err);
                AuthOutcome::LoginFailed(err)
            }
        }
    }

    async fn perform_login(session: &BrowserSession, creds: &Credentials) -> Result<()> {
        info!("Performing login");

        session.type_into(&USERNAME_FIELD, &creds.username).await?;
        session.type_into(&PASSWORD_FIELD, &creds.password).await?;
        session.click(&LOGIN_SUBMIT).await?;
        session.wait_for_navigation(ACTION_TIMEOUT).await?;
        session.settle(SETTLE_LONG).await;

        Ok(())
    }
}
