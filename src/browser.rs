//! Browser Launcher
//!
//! Finds Chrome, launches it with a throwaway profile, and opens the single
//! tab every product is archived through.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::accessor::{BrowserSession, ProductPage};
use crate::cdp::{Connection, Transport};
use crate::error::{Error, Result};
use crate::page::ChromePage;
use crate::BrowserConfig;

/// Global counter for unique user data directories
static BROWSER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Find a Chrome/Chromium binary in the usual install locations
pub fn find_chrome() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[]
    };

    candidates
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .ok_or(Error::ChromeNotFound)
}

/// Command-line switches for a config
fn chrome_args(config: &BrowserConfig, user_data_dir: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--disable-blink-features=AutomationControlled".into(),
        "--disable-infobars".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-popup-blocking".into(),
        "--disable-sync".into(),
        "--disable-translate".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--password-store=basic".into(),
        "--use-mock-keychain".into(),
        format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        ),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];

    if let Some(ref user_agent) = config.user_agent {
        args.push(format!("--user-agent={}", user_agent));
    }

    if config.headless {
        args.push("--headless=new".into());
    }

    args.extend(config.extra_args.iter().cloned());
    args
}

/// Launch Chrome and get the WebSocket debugging URL
fn launch_chrome(path: &Path, args: &[String]) -> Result<(Child, String)> {
    let mut child = Command::new(path)
        .args(args)
        .arg("--remote-debugging-port=0") // Let Chrome pick a free port
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Launch(format!("Failed to launch Chrome: {}", e)))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Launch("No stderr from Chrome".into()))?;
    let mut lines = BufReader::new(stderr).lines();

    // Chrome prints: DevTools listening on ws://127.0.0.1:PORT/devtools/browser/GUID
    let mut ws_url = None;
    for line in lines.by_ref() {
        let Ok(line) = line else { break };
        tracing::trace!("Chrome stderr: {}", line);

        if line.contains("DevTools listening on") {
            if let Some(start) = line.find("ws://") {
                ws_url = Some(line[start..].trim().to_string());
                break;
            }
        }
    }

    let Some(ws_url) = ws_url else {
        let _ = child.kill();
        return Err(Error::Launch(
            "Failed to get DevTools WebSocket URL from Chrome".into(),
        ));
    };

    // Keep draining stderr so Chrome never blocks on a full pipe
    std::thread::spawn(move || {
        for line in lines.map_while(std::result::Result::ok) {
            tracing::trace!("Chrome stderr: {}", line);
        }
    });

    tracing::info!("Chrome DevTools URL: {}", ws_url);
    Ok((child, ws_url))
}

/// A running Chrome with one product tab
pub struct Browser {
    connection: Connection,
    page: ChromePage,
    /// User data directory (cleaned up on close)
    user_data_dir: PathBuf,
}

impl Browser {
    /// Launch Chrome and open the product tab
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let instance_id = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "product-archiver-{}-{}",
            std::process::id(),
            instance_id
        ));

        // Clean up any stale data
        let _ = std::fs::remove_dir_all(&user_data_dir);
        std::fs::create_dir_all(&user_data_dir)?;

        let chrome_path = match &config.chrome_path {
            Some(p) => PathBuf::from(p),
            None => find_chrome()?,
        };

        tracing::info!("Launching Chrome from {:?}", chrome_path);
        let args = chrome_args(&config, &user_data_dir);
        let (child, ws_url) = launch_chrome(&chrome_path, &args)?;

        let connection = Connection::new(Transport::connect(child, &ws_url)?);

        let version = connection.version().await?;
        tracing::info!("Connected to Chrome: {}", version.product);

        let target_id = connection.create_target("about:blank").await?;
        let session = connection.attach_to_target(&target_id).await?;
        session.page_enable().await?;

        Ok(Self {
            connection,
            page: ChromePage::new(session),
            user_data_dir,
        })
    }

    /// The product tab
    pub fn chrome_page(&self) -> &ChromePage {
        &self.page
    }

    /// Get the browser version
    pub async fn version(&self) -> Result<String> {
        Ok(self.connection.version().await?.product)
    }

    /// Get the user agent Chrome reports
    pub async fn user_agent(&self) -> Result<String> {
        Ok(self.connection.version().await?.user_agent)
    }
}

#[async_trait]
impl BrowserSession for Browser {
    fn page(&self) -> &dyn ProductPage {
        &self.page
    }

    async fn close(&self) -> Result<()> {
        let _ = self
            .connection
            .close_target(self.page.session().target_id())
            .await;
        self.connection.close().await?;
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
        tracing::info!("Browser closed");
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // The Transport's Drop impl kills Chrome if close() wasn't called
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
    }
}
