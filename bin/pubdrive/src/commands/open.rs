use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use pubdrive_core::{Config, Paths};
use pubdrive_engine::{actions, get_page_session, Browser, CdpConnection, Poller};

/// Launch the browser on `url` under the named profile, attach to the
/// page, and optionally block until a login predicate holds.
///
/// On success the browser is closed unless `--keep-open` was given. On
/// failure the window always stays open so the operator can finish a
/// manual step (login, captcha) and re-run against the same profile.
pub async fn run(
    url: &str,
    profile: &str,
    wait_for: Option<&str>,
    keep_open: bool,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;

    let profile_dir = paths.profile_dir(profile);
    let browser = Browser::launch(&config, url, &profile_dir).await?;

    match drive(&config, &browser, url, wait_for).await {
        Ok(final_url) => {
            println!("✅ attached — page at {}", final_url);
            if keep_open {
                browser.keep_open();
            } else {
                browser.close().await;
            }
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "run failed, leaving browser open for inspection");
            println!("❌ {}", e);
            println!("   The browser window stays open; finish any manual step and re-run.");
            browser.keep_open();
            Err(e)
        }
    }
}

async fn drive(
    config: &Config,
    browser: &Browser,
    url: &str,
    wait_for: Option<&str>,
) -> anyhow::Result<String> {
    let mut conn = CdpConnection::connect(&browser.ws_url, Duration::from_secs(5)).await?;
    conn.set_default_timeout(Duration::from_millis(config.call_timeout_ms));
    let conn = Arc::new(conn);

    // The launch tab already carries the URL; hint on its host so a
    // pre-existing profile tab does not win.
    let hint = host_hint(url);
    let session = get_page_session(conn.clone(), hint.as_deref()).await?;
    info!(target = %session.target_id, "attached");

    if let Some(script) = wait_for {
        let poller = Poller::from_config(config);
        println!(
            "⏳ waiting for login (up to {}s); complete it in the browser window...",
            poller.timeout.as_secs()
        );
        poller.wait_until(&session, "login", script).await?;
        println!("✅ login detected");
    }

    Ok(actions::current_url(&session).await?)
}

/// Extract the host part of a URL as an attachment hint.
fn host_hint(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
