use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use pubdrive_core::{Config, Paths};
use pubdrive_engine::{actions, get_page_session, Browser, CdpConnection};

/// Open `url` under the named profile and capture a screenshot into the
/// media directory.
pub async fn run(url: &str, profile: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;

    let profile_dir = paths.profile_dir(profile);
    let browser = Browser::launch(&config, url, &profile_dir).await?;

    let result = capture(&config, &browser, &paths).await;
    match result {
        Ok(path) => {
            println!("📸 {}", path.display());
            browser.close().await;
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "capture failed, leaving browser open");
            println!("❌ {}", e);
            browser.keep_open();
            Err(e)
        }
    }
}

async fn capture(
    config: &Config,
    browser: &Browser,
    paths: &Paths,
) -> anyhow::Result<std::path::PathBuf> {
    let mut conn = CdpConnection::connect(&browser.ws_url, Duration::from_secs(5)).await?;
    conn.set_default_timeout(Duration::from_millis(config.call_timeout_ms));
    let conn = Arc::new(conn);
    let session = get_page_session(conn, None).await?;
    // Give the page a moment to render before capturing.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    Ok(actions::screenshot(&session, &paths.media_dir()).await?)
}
