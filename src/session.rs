//! Automation session management: acquiring a scriptable browser from
//! either a remote pooled engine or a local launch, with retry/backoff
//! and fallback, plus page rendering on an acquired session.
//!
//! Sessions are owned exclusively by the job that acquired them and must
//! be released on every exit path. Release semantics differ by engine:
//! a remote session is disconnected so the pooled browser survives for
//! reuse; a local session is fully shut down.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::utils::error::AppError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePreference {
    Remote,
    Local,
}

/// An acquired browser session. Lifecycle: acquired at job start,
/// released exactly once at job end.
pub struct AutomationSession {
    handle: BrowserHandle,
    engine: EngineKind,
}

/// Test builds can fabricate a session with no live browser behind it,
/// so the guard and counter machinery is testable without Chrome.
enum BrowserHandle {
    Live(Browser),
    #[cfg(test)]
    Stub,
}

impl AutomationSession {
    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn is_remote(&self) -> bool {
        self.engine == EngineKind::Remote
    }
}

pub struct SessionManager {
    config: BrowserConfig,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl SessionManager {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Acquire a session. Remote preference tries the pooled engine with
    /// exponential backoff first and falls back to a local launch when
    /// `fallback_to_local` is set; otherwise the remote failure surfaces.
    ///
    /// The session comes back already wrapped in a [`SessionGuard`], so
    /// there is no window where a cancelled caller can drop it without
    /// the manager releasing it.
    pub async fn acquire(&self, preferred: EnginePreference) -> Result<SessionGuard<'_>> {
        let session = match preferred {
            EnginePreference::Remote => self.acquire_remote_or_fallback().await?,
            EnginePreference::Local => self.acquire_local()?,
        };
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(SessionGuard {
            manager: self,
            session: Some(session),
        })
    }

    async fn acquire_remote_or_fallback(&self) -> Result<AutomationSession> {
        let ws_url = match &self.config.remote_ws_url {
            Some(url) => url.clone(),
            None => {
                if self.config.fallback_to_local {
                    debug!("no remote engine configured, using local browser");
                    return self.acquire_local();
                }
                return Err(AppError::Configuration {
                    field: "browser.remote_ws_url".to_string(),
                });
            }
        };

        match self.connect_remote(&ws_url).await {
            Ok(browser) => {
                info!("connected to remote browser engine");
                Ok(AutomationSession {
                    handle: BrowserHandle::Live(browser),
                    engine: EngineKind::Remote,
                })
            }
            Err(e) => {
                if self.config.fallback_to_local {
                    warn!(error = %e, "remote engine unavailable, falling back to local browser");
                    self.acquire_local()
                } else {
                    Err(e)
                }
            }
        }
    }

    fn acquire_local(&self) -> Result<AutomationSession> {
        let browser = self.launch_local()?;
        Ok(AutomationSession {
            handle: BrowserHandle::Live(browser),
            engine: EngineKind::Local,
        })
    }

    /// Remote connection attempts use exponential backoff: base delay
    /// doubling per attempt, up to `connect_attempts` tries.
    async fn connect_remote(&self, ws_url: &str) -> Result<Browser> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_base_delay_ms / 2)
            .take((self.config.connect_attempts as usize).saturating_sub(1));

        let url = ws_url.to_string();
        Retry::spawn(strategy, move || {
            let url = url.clone();
            async move {
                Browser::connect(url).map_err(|e| {
                    debug!(error = %e, "remote browser connection attempt failed");
                    AppError::SessionAcquisition(format!("remote connect failed: {}", e))
                })
            }
        })
        .await
    }

    fn launch_local(&self) -> Result<Browser> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Often needed in containerized environments
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
            ])
            .build()
            .map_err(|e| {
                AppError::SessionAcquisition(format!("failed to build launch options: {}", e))
            })?;

        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        Browser::new(launch_options)
            .map_err(|e| AppError::SessionAcquisition(format!("failed to launch browser: {}", e)))
    }

    /// Release a session. Remote sessions are disconnected (the pooled
    /// browser survives); local sessions are shut down entirely.
    /// Releasing `None` is a no-op, never an error.
    pub fn release(&self, session: Option<AutomationSession>) {
        let Some(session) = session else {
            return;
        };
        match &session.handle {
            BrowserHandle::Live(browser) => {
                if session.is_remote() {
                    // Dropping the handle closes the websocket transport
                    // without touching the pooled browser process.
                    debug!("disconnecting remote browser session");
                } else {
                    debug!("shutting down local browser session");
                    if let Ok(tabs) = browser.get_tabs().lock() {
                        for tab in tabs.iter() {
                            let _ = tab.close(true);
                        }
                    }
                }
            }
            #[cfg(test)]
            BrowserHandle::Stub => {}
        }
        drop(session);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Render a page in a fresh tab on the given session and return its
    /// HTML. The tab is always closed before returning.
    pub async fn fetch_rendered(
        &self,
        session: &AutomationSession,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<String> {
        let browser = match &session.handle {
            BrowserHandle::Live(browser) => browser,
            #[cfg(test)]
            BrowserHandle::Stub => {
                return Err(AppError::Extraction(
                    "no live browser behind session".to_string(),
                ))
            }
        };
        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Extraction(format!("failed to create tab: {}", e)))?;

        let result = self.render_in_tab(&tab, url, wait_selector);

        // Close the tab on every path to free the session for reuse.
        let _ = tab.close(true);
        result
    }

    fn render_in_tab(
        &self,
        tab: &headless_chrome::Tab,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<String> {
        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| AppError::Extraction(format!("failed to set user agent: {}", e)))?;

        tab.navigate_to(url)
            .map_err(|e| AppError::Extraction(format!("navigation to {} failed: {}", url, e)))?;

        tab.wait_until_navigated()
            .map_err(|e| AppError::Extraction(format!("page load for {} failed: {}", url, e)))?;

        if let Some(selector) = wait_selector {
            let timeout = Duration::from_secs(self.config.navigation_timeout);
            tab.wait_for_element_with_custom_timeout(selector, timeout)
                .map_err(|e| {
                    AppError::Extraction(format!("wait for selector '{}' failed: {}", selector, e))
                })?;
        }

        tab.get_content()
            .map_err(|e| AppError::Extraction(format!("failed to get page content: {}", e)))
    }

    /// Guard around a fabricated session with no browser behind it, for
    /// exercising the acquire/release pairing without Chrome.
    #[cfg(test)]
    fn stub_session(&self, engine: EngineKind) -> SessionGuard<'_> {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            manager: self,
            session: Some(AutomationSession {
                handle: BrowserHandle::Stub,
                engine,
            }),
        }
    }

    /// Test instrumentation: total sessions handed out.
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Test instrumentation: total sessions released.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }
}

/// Holds an acquired session and releases it through the manager when
/// dropped, so a timed-out or errored job still balances its acquire.
pub struct SessionGuard<'a> {
    manager: &'a SessionManager,
    session: Option<AutomationSession>,
}

impl<'a> SessionGuard<'a> {
    pub fn session(&self) -> Option<&AutomationSession> {
        self.session.as_ref()
    }

    /// Release early, before the guard goes out of scope. Subsequent
    /// drops are no-ops.
    pub fn release(&mut self) {
        self.manager.release(self.session.take());
    }
}

impl<'a> Drop for SessionGuard<'a> {
    fn drop(&mut self) {
        self.manager.release(self.session.take());
    }
}
