use crate::error::SurfaceError;
use crate::surface::{RenderSurface, SurfaceResult};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Value, json};
use tracing::{debug, info};

/// Render surface backed by a WebDriver session (geckodriver, chromedriver, ...).
pub struct WebDriverSurface {
    client: Client,
}

impl WebDriverSurface {
    pub async fn connect(webdriver_url: &str) -> SurfaceResult<Self> {
        info!("Connecting to webdriver at {}", webdriver_url);
        let client = ClientBuilder::native().connect(webdriver_url).await?;
        Ok(Self { client })
    }
}

/// Builds an XPath string literal for arbitrary text, including text that
/// contains both quote characters.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn script_number(value: &Value) -> SurfaceResult<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| SurfaceError::Script(value.to_string()))
}

#[async_trait]
impl RenderSurface for WebDriverSurface {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> SurfaceResult<()> {
        debug!("goto {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    async fn document_extent(&mut self) -> SurfaceResult<u64> {
        let value = self
            .client
            .execute("return document.body.scrollHeight;", vec![])
            .await?;
        script_number(&value)
    }

    async fn scroll_to(&mut self, offset: u64) -> SurfaceResult<()> {
        self.client
            .execute("window.scrollTo(0, arguments[0]);", vec![json!(offset)])
            .await?;
        Ok(())
    }

    async fn find_by_text(&mut self, text: &str) -> SurfaceResult<Option<Element>> {
        let xpath = format!("//*[text()={}]", xpath_literal(text));
        match self.client.find(Locator::XPath(&xpath)).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_all(&mut self, selector: &str) -> SurfaceResult<Vec<Element>> {
        Ok(self.client.find_all(Locator::Css(selector)).await?)
    }

    async fn find_all_within(
        &mut self,
        scope: &Element,
        selector: &str,
    ) -> SurfaceResult<Vec<Element>> {
        Ok(scope.find_all(Locator::Css(selector)).await?)
    }

    async fn bring_into_view(&mut self, element: &Element) -> SurfaceResult<()> {
        // Some drivers refuse to click elements outside the viewport.
        let arg = serde_json::to_value(element).map_err(|e| SurfaceError::Script(e.to_string()))?;
        self.client
            .execute("arguments[0].scrollIntoView({block: 'center'});", vec![arg])
            .await?;
        Ok(())
    }

    async fn click(&mut self, element: &Element) -> SurfaceResult<()> {
        element.click().await?;
        Ok(())
    }

    async fn attribute(&mut self, element: &Element, name: &str) -> SurfaceResult<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn text(&mut self, element: &Element) -> SurfaceResult<String> {
        Ok(element.text().await?)
    }

    async fn close(&mut self) -> SurfaceResult<()> {
        info!("Closing webdriver session");
        self.client.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_literal_plain() {
        assert_eq!(xpath_literal("View more products"), "'View more products'");
    }

    #[test]
    fn test_xpath_literal_apostrophe() {
        assert_eq!(xpath_literal("Don't stop"), "\"Don't stop\"");
    }

    #[test]
    fn test_xpath_literal_both_quotes() {
        assert_eq!(
            xpath_literal(r#"it's "new""#),
            r#"concat('it', "'", 's "new"')"#
        );
    }

    #[test]
    fn test_script_number() {
        assert_eq!(script_number(&json!(4200)).unwrap(), 4200);
        assert_eq!(script_number(&json!(12.7)).unwrap(), 12);
        assert!(script_number(&json!("tall")).is_err());
    }
}
