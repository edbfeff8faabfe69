//! Browser driver seam
//!
//! `BrowserEngine` starts browser processes and `BrowserInstance` drives one
//! of them. The production engine speaks CDP through chromiumoxide; tests
//! swap in [`mock::MockEngine`].

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{stream, Stream, StreamExt};
use tokio::task::JoinHandle;

use super::idle::{wait_for_network_idle, NetworkActivity};
use super::profile::LaunchProfile;
use crate::conversion::{ConversionError, RenderOptions};

/// Starts browser processes
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserInstance>, ConversionError>;
}

/// One running browser process
#[async_trait]
pub trait BrowserInstance: Send {
    /// Load `html` into a fresh page and print it
    async fn render_pdf(&mut self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError>;

    /// Shut the process down
    async fn close(&mut self) -> Result<(), ConversionError>;
}

/// Chromium driven over the DevTools protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumEngine;

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserInstance>, ConversionError> {
        profile.check_executable()?;

        let mut builder = BrowserConfig::builder()
            .launch_timeout(profile.launch_timeout)
            .request_timeout(profile.request_timeout)
            .args(profile.args.clone());
        if let Some(executable) = &profile.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(ConversionError::BrowserLaunchFailed)?;

        let launched = tokio::time::timeout(profile.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| {
                ConversionError::BrowserLaunchFailed(format!(
                    "browser did not start within {} ms",
                    profile.launch_timeout.as_millis()
                ))
            })?;
        let (browser, mut handler) =
            launched.map_err(|e| ConversionError::BrowserLaunchFailed(e.to_string()))?;

        // The handler drives the websocket; it has to be polled for the
        // browser to make any progress. Errors on single messages (e.g. CDP
        // events the driver cannot decode) are not fatal.
        let handler = tokio::spawn(async move {
            drive_handler(&mut handler).await;
        });

        tracing::debug!("Launched {:?} browser", profile.environment);

        Ok(Box::new(ChromiumInstance {
            browser,
            handler,
            network_idle: profile.network_idle,
            network_idle_max: profile.network_idle_max,
        }))
    }
}

/// A running Chromium process plus its event loop task
pub struct ChromiumInstance {
    browser: Browser,
    handler: JoinHandle<()>,
    network_idle: Duration,
    network_idle_max: Duration,
}

impl ChromiumInstance {
    async fn load_and_print(&self, page: &Page, html: &str, options: &RenderOptions) -> Result<Vec<u8>, CdpError> {
        page.execute(SetDeviceMetricsOverrideParams::new(
            options.viewport.width as i64,
            options.viewport.height as i64,
            1.0,
            false,
        ))
        .await?;

        // Subscribe before loading so no request slips past the idle wait
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(|e| NetworkActivity::Started(e.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await?
            .map(|e| NetworkActivity::Settled(e.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|e| NetworkActivity::Settled(e.request_id.inner().clone()));
        let activity = stream::select_all(vec![started.boxed(), finished.boxed(), failed.boxed()]);

        page.set_content(html).await?;
        let requests =
            wait_for_network_idle(activity, self.network_idle, idle_cap(self.network_idle_max, options)).await;
        tracing::debug!("Page settled after {} subresource requests", requests);

        page.pdf(print_params(options)).await
    }
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    async fn render_pdf(&mut self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| render_error(e, options))?;

        let result = self.load_and_print(&page, html, options).await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close page: {}", e);
        }

        result.map_err(|e| render_error(e, options))
    }

    async fn close(&mut self) -> Result<(), ConversionError> {
        let closed = self.browser.close().await;
        if closed.is_ok() {
            if let Err(e) = self.browser.wait().await {
                tracing::debug!("Failed to reap browser process: {}", e);
            }
        }
        self.handler.abort();

        closed
            .map(|_| ())
            .map_err(|e| ConversionError::BrowserCrashed(format!("browser did not close cleanly: {}", e)))
    }
}

impl Drop for ChromiumInstance {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// CDP print parameters; lengths are in inches
fn print_params(options: &RenderOptions) -> PrintToPdfParams {
    let (width, height) = options.format.paper_size();
    PrintToPdfParams {
        landscape: Some(options.landscape),
        print_background: Some(options.print_background),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(options.margin.top.to_inches()),
        margin_right: Some(options.margin.right.to_inches()),
        margin_bottom: Some(options.margin.bottom.to_inches()),
        margin_left: Some(options.margin.left.to_inches()),
        ..Default::default()
    }
}

/// Idle wait cap; half the render budget at most so printing still fits
/// Polls the CDP handler until its stream ends, returning how many events it saw
async fn drive_handler<S, E>(handler: &mut S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut events = 0;
    while let Some(event) = handler.next().await {
        events += 1;
        if let Err(e) = event {
            tracing::debug!("Browser handler error: {}", e);
        }
    }
    tracing::debug!("Browser handler finished after {} events", events);
    events
}

fn idle_cap(configured: Duration, options: &RenderOptions) -> Duration {
    configured.min(options.timeout / 2)
}

/// Lost connections mean the process went away; a command that ran out of
/// time is the render budget running out
fn render_error(err: CdpError, options: &RenderOptions) -> ConversionError {
    match err {
        CdpError::Timeout => ConversionError::RenderTimeout(options.timeout),
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            ConversionError::BrowserCrashed(err.to_string())
        }
        other => ConversionError::UnknownConversionError(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::options::{Length, Margins, PageFormat, RenderDefaults};

    #[test]
    fn test_print_params_use_inches() {
        let mut options = RenderOptions::with_defaults(&RenderDefaults::default());
        options.format = PageFormat::Letter;
        options.landscape = true;
        options.margin = Margins::uniform(Length::px(96.0));

        let params = print_params(&options);

        assert_eq!(params.paper_width, Some(8.5));
        assert_eq!(params.paper_height, Some(11.0));
        assert_eq!(params.landscape, Some(true));
        assert_eq!(params.margin_top, Some(1.0));
        assert_eq!(params.margin_left, Some(1.0));
        assert_eq!(params.print_background, Some(true));
    }

    #[tokio::test]
    async fn test_handler_survives_bad_events() {
        let mut events = stream::iter(vec![
            Err("undecodable event"),
            Ok(()),
            Err("unknown method"),
            Ok(()),
        ]);

        assert_eq!(drive_handler(&mut events).await, 4);
    }

    #[test]
    fn test_lost_connection_is_a_crash() {
        let options = RenderOptions::with_defaults(&RenderDefaults::default());

        assert!(matches!(
            render_error(CdpError::NoResponse, &options),
            ConversionError::BrowserCrashed(_)
        ));
    }

    #[test]
    fn test_command_timeout_is_a_render_timeout() {
        let mut options = RenderOptions::with_defaults(&RenderDefaults::default());
        options.timeout = Duration::from_secs(60);

        assert_eq!(
            render_error(CdpError::Timeout, &options),
            ConversionError::RenderTimeout(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_idle_cap_leaves_room_to_print() {
        let mut options = RenderOptions::with_defaults(&RenderDefaults::default());
        options.timeout = Duration::from_secs(4);
        assert_eq!(idle_cap(Duration::from_secs(10), &options), Duration::from_secs(2));

        options.timeout = Duration::from_secs(60);
        assert_eq!(idle_cap(Duration::from_secs(10), &options), Duration::from_secs(10));
    }
}
