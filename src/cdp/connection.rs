//! CDP Connection/Session Management
//!
//! Browser-level commands go through [`Connection`]; commands for the one
//! product tab go through its [`Session`].

use std::sync::Arc;

use base64::Engine;

use super::transport::Transport;
use super::types::*;
use crate::error::{Error, Result};

/// A CDP connection to Chrome
pub struct Connection {
    transport: Arc<Transport>,
}

impl Connection {
    /// Create a new connection wrapping a transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Get browser version info
    pub async fn version(&self) -> Result<BrowserGetVersionResult> {
        self.transport
            .send(None, "Browser.getVersion", &BrowserGetVersion {})
            .await
    }

    /// Create a new target (tab)
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result: TargetCreateTargetResult = self
            .transport
            .send(
                None,
                "Target.createTarget",
                &TargetCreateTarget {
                    url: url.to_string(),
                },
            )
            .await?;
        Ok(result.target_id)
    }

    /// Attach to a target and get a session
    pub async fn attach_to_target(&self, target_id: &str) -> Result<Session> {
        let result: TargetAttachToTargetResult = self
            .transport
            .send(
                None,
                "Target.attachToTarget",
                &TargetAttachToTarget {
                    target_id: target_id.to_string(),
                    flatten: Some(true),
                },
            )
            .await?;

        Ok(Session {
            transport: Arc::clone(&self.transport),
            session_id: result.session_id,
            target_id: target_id.to_string(),
        })
    }

    /// Close a target
    pub async fn close_target(&self, target_id: &str) -> Result<bool> {
        let result: TargetCloseTargetResult = self
            .transport
            .send(
                None,
                "Target.closeTarget",
                &TargetCloseTarget {
                    target_id: target_id.to_string(),
                },
            )
            .await?;
        Ok(result.success)
    }

    /// Close the browser
    pub async fn close(&self) -> Result<()> {
        let _ = self
            .transport
            .send::<_, serde_json::Value>(None, "Browser.close", &BrowserClose {})
            .await;
        self.transport.close().await
    }
}

/// A CDP session attached to a specific target
pub struct Session {
    transport: Arc<Transport>,
    session_id: String,
    target_id: String,
}

impl Session {
    /// Get the target ID
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Send a command to this session
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.transport
            .send(Some(&self.session_id), method, params)
            .await
    }

    /// Enable page events
    pub async fn page_enable(&self) -> Result<()> {
        self.send::<_, serde_json::Value>("Page.enable", &PageEnable {})
            .await?;
        Ok(())
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<PageNavigateResult> {
        self.send(
            "Page.navigate",
            &PageNavigate {
                url: url.to_string(),
            },
        )
        .await
    }

    /// Print the page to PDF
    pub async fn print_to_pdf(&self) -> Result<Vec<u8>> {
        let result: PagePrintToPdfResult = self
            .send(
                "Page.printToPDF",
                &PagePrintToPdf {
                    print_background: Some(true),
                    prefer_css_page_size: None,
                },
            )
            .await?;

        base64::engine::general_purpose::STANDARD
            .decode(&result.data)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// Dispatch a mouse event
    pub async fn dispatch_mouse_event(
        &self,
        event_type: MouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
        click_count: Option<i32>,
    ) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "Input.dispatchMouseEvent",
            &InputDispatchMouseEvent {
                r#type: event_type,
                x,
                y,
                button,
                click_count,
            },
        )
        .await?;
        Ok(())
    }

    /// Evaluate JavaScript expression and return the result by value
    pub async fn evaluate(&self, expression: &str) -> Result<RuntimeEvaluateResult> {
        self.send(
            "Runtime.evaluate",
            &RuntimeEvaluate {
                expression: expression.to_string(),
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }
}
