//! Minimal W3C WebDriver client over HTTP, e.g. against a local chromedriver.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::debug;

use super::{Driver, DriverError, ElementId, LaunchOptions, Locator};

/// Key under which the protocol returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub struct WebDriverClient {
    http: Client,
    base_url: String,
    session_id: Option<String>,
}

impl WebDriverClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn session_path(&self, suffix: &str) -> Result<String, DriverError> {
        let id = self.session_id.as_deref().ok_or(DriverError::MissingSession)?;
        Ok(format!("/session/{id}{suffix}"))
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = method.as_str(), url = url.as_str(), "WebDriver command");
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(protocol_error(&value));
        }
        Ok(value)
    }
}

/// Session capabilities for a Chrome-family browser.
pub fn capabilities(options: &LaunchOptions) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": {
                    "args": options.browser_args(),
                    "excludeSwitches": options.exclude_switches,
                    "useAutomationExtension": options.use_automation_extension,
                }
            }
        }
    })
}

fn locator_body(locator: &Locator) -> Value {
    json!({ "using": locator.strategy(), "value": locator.value() })
}

fn protocol_error(value: &Value) -> DriverError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match error.as_str() {
        "element click intercepted" => DriverError::ClickIntercepted(message),
        "no such element" => DriverError::NoSuchElement(message),
        _ => DriverError::Protocol { error, message },
    }
}

fn element_id(value: &Value) -> Result<ElementId, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_string()))
        .ok_or_else(|| DriverError::Protocol {
            error: "invalid element reference".to_string(),
            message: value.to_string(),
        })
}

#[async_trait]
impl Driver for WebDriverClient {
    async fn start(&mut self, options: &LaunchOptions) -> Result<(), DriverError> {
        let value = self
            .command(Method::POST, "/session", Some(capabilities(options)))
            .await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                error: "session not created".to_string(),
                message: value.to_string(),
            })?;
        debug!(session = id, "WebDriver session created");
        self.session_id = Some(id.to_string());
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        let path = self.session_path("/url")?;
        self.command(Method::POST, &path, Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find(&mut self, locator: &Locator) -> Result<Option<ElementId>, DriverError> {
        let path = self.session_path("/element")?;
        match self
            .command(Method::POST, &path, Some(locator_body(locator)))
            .await
        {
            Ok(value) => element_id(&value).map(Some),
            Err(DriverError::NoSuchElement(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementId>, DriverError> {
        let path = self.session_path("/elements")?;
        let value = self
            .command(Method::POST, &path, Some(locator_body(locator)))
            .await?;
        value
            .as_array()
            .map(|items| items.iter().map(element_id).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn click(&mut self, element: &ElementId) -> Result<(), DriverError> {
        let path = self.session_path(&format!("/element/{}/click", element.0))?;
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), DriverError> {
        let path = self.session_path(&format!("/element/{}/value", element.0))?;
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        let path = self.session_path("")?;
        self.command(Method::DELETE, &path, None).await?;
        self.session_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_capabilities_disable_automation_markers() {
        let options = LaunchOptions::with_user_agent("Agent/1.0", true);
        assert_eq!(
            capabilities(&options),
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "chrome",
                        "goog:chromeOptions": {
                            "args": [
                                "--disable-blink-features=AutomationControlled",
                                "--user-agent=Agent/1.0",
                                "--headless=new"
                            ],
                            "excludeSwitches": ["enable-automation"],
                            "useAutomationExtension": false
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_locator_body_uses_protocol_strategy() {
        assert_eq!(
            locator_body(&Locator::LinkText("Write a review")),
            json!({"using": "link text", "value": "Write a review"})
        );
        assert_eq!(
            locator_body(&Locator::Css("textarea")),
            json!({"using": "css selector", "value": "textarea"})
        );
    }

    #[test]
    fn test_protocol_error_classification() {
        let intercepted = json!({"error": "element click intercepted", "message": "overlay"});
        assert!(matches!(
            protocol_error(&intercepted),
            DriverError::ClickIntercepted(ref m) if m == "overlay"
        ));
        let missing = json!({"error": "no such element", "message": "nope"});
        assert!(matches!(protocol_error(&missing), DriverError::NoSuchElement(_)));
        let other = json!({"error": "stale element reference"});
        assert!(matches!(
            protocol_error(&other),
            DriverError::Protocol { ref error, .. } if error == "stale element reference"
        ));
    }

    #[test]
    fn test_element_id_reads_reference_key() {
        let mut value = json!({});
        value[ELEMENT_KEY] = json!("abc-123");
        assert_eq!(element_id(&value).unwrap(), ElementId("abc-123".to_string()));
        assert!(element_id(&json!({})).is_err());
    }

    #[test]
    fn test_commands_require_a_session() {
        let client = WebDriverClient::new("http://localhost:9515/");
        assert!(matches!(
            client.session_path("/url"),
            Err(DriverError::MissingSession)
        ));
        assert!(client.session_id().is_none());
    }
}
