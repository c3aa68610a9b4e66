use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use playcheck_engine::{ActionTarget, Automation, ExtractOptions, Handle, PerformOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thirtyfour::prelude::*;

const STATE_PROBE: &str =
    "return (window.__playcheck && window.__playcheck.state) ? window.__playcheck.state() : null";

const CLICKABLE: &str = "self::button or self::a or @role='button' \
     or (self::input and (@type='button' or @type='submit'))";

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Drop the leading verb ("find the", "click") and a trailing role noun
/// ("button") so only the visible label is matched against the page.
#[must_use]
pub fn strip_verb_phrase(description: &str) -> String {
    let mut phrase = description.trim().to_lowercase();
    for verb in ["find ", "locate ", "click "] {
        if let Some(rest) = phrase.strip_prefix(verb) {
            phrase = rest.to_string();
            break;
        }
    }
    if let Some(rest) = phrase.strip_prefix("the ") {
        phrase = rest.to_string();
    }
    for role in [" button", " link"] {
        if let Some(rest) = phrase.strip_suffix(role) {
            phrase = rest.to_string();
            break;
        }
    }
    phrase.trim().to_string()
}

fn clickable_xpath(phrase: &str) -> String {
    let needle = phrase.replace('\'', "");
    format!(
        "//*[{CLICKABLE}][contains(translate(normalize-space(concat(., ' ', @value, ' ', @aria-label)), \
         '{UPPER}', '{LOWER}'), '{needle}')]"
    )
}

/// Key name as accepted by the action chain. Single characters pass through.
#[must_use]
pub fn map_key(name: &str) -> String {
    let key = match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => Key::Enter,
        "space" | "spacebar" | " " => Key::Space,
        "escape" | "esc" => Key::Escape,
        "tab" => Key::Tab,
        "backspace" => Key::Backspace,
        "shift" => Key::Shift,
        "control" | "ctrl" => Key::Control,
        "alt" => Key::Alt,
        "arrowleft" | "left" => Key::Left,
        "arrowright" | "right" => Key::Right,
        "arrowup" | "up" => Key::Up,
        "arrowdown" | "down" => Key::Down,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "home" => Key::Home,
        "end" => Key::End,
        _ => return name.to_string(),
    };
    key.value().to_string()
}

/// Elements from the most recent `locate`, keyed by opaque ids. Each batch
/// replaces the previous one, so handles stay valid only until the next
/// lookup.
struct HandleTable<T> {
    entries: Mutex<HashMap<String, T>>,
    next_id: AtomicUsize,
}

impl<T: Clone> HandleTable<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    fn replace_with(&self, items: Vec<T>) -> Result<Vec<Handle>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("element table poisoned"))?;
        entries.clear();
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let id = format!("el-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            entries.insert(id.clone(), item);
            handles.push(Handle::new(id));
        }
        Ok(handles)
    }

    fn get(&self, handle: &Handle) -> Result<T> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("element table poisoned"))?;
        match entries.get(handle.id()) {
            Some(item) => Ok(item.clone()),
            None => bail!("no such element for handle {}", handle.id()),
        }
    }
}

/// [`Automation`] over a live WebDriver session.
///
/// Located elements are kept in a handle table so the engine only ever sees
/// opaque ids.
pub struct WebDriverAutomation {
    driver: WebDriver,
    elements: HandleTable<WebElement>,
}

impl WebDriverAutomation {
    pub fn new(driver: WebDriver) -> Self {
        Self {
            driver,
            elements: HandleTable::new(),
        }
    }

    async fn find_clickable(&self, phrase: &str) -> Result<Vec<WebElement>> {
        if phrase.is_empty() {
            return Ok(Vec::new());
        }
        let found = self
            .driver
            .find_all(By::XPath(clickable_xpath(phrase)))
            .await
            .with_context(|| format!("searching for '{phrase}'"))?;
        Ok(found)
    }
}

#[async_trait]
impl Automation for WebDriverAutomation {
    async fn locate(&self, description: &str, _timeout: Duration) -> Result<Vec<Handle>> {
        let phrase = strip_verb_phrase(description);
        let mut visible = Vec::new();
        for element in self.find_clickable(&phrase).await? {
            if element.is_displayed().await.unwrap_or(false) {
                visible.push(element);
            }
        }
        let handles = self.elements.replace_with(visible)?;
        log::debug!("locate '{description}' -> {} candidates", handles.len());
        Ok(handles)
    }

    async fn perform(&self, target: &ActionTarget, _options: PerformOptions) -> Result<()> {
        match target {
            ActionTarget::Handle(handle) => {
                let element = self.elements.get(handle)?;
                element
                    .click()
                    .await
                    .with_context(|| format!("clicking {}", handle.id()))?;
            }
            ActionTarget::Key(name) => {
                self.driver
                    .action_chain()
                    .send_keys(map_key(name))
                    .perform()
                    .await
                    .with_context(|| format!("pressing {name}"))?;
            }
            ActionTarget::Instruction(text) => {
                let phrase = strip_verb_phrase(text);
                let Some(element) = self.find_clickable(&phrase).await?.into_iter().next() else {
                    bail!("could not find anything matching '{phrase}'");
                };
                element
                    .click()
                    .await
                    .with_context(|| format!("clicking '{phrase}'"))?;
            }
        }
        Ok(())
    }

    async fn extract_structured(
        &self,
        instruction: &str,
        _schema: &Value,
        options: &ExtractOptions,
    ) -> Result<Value> {
        if let Some(selector) = &options.selector {
            let element = self
                .driver
                .find(By::Css(selector.as_str()))
                .await
                .with_context(|| format!("finding {selector} for '{instruction}'"))?;
            return Ok(Value::String(element.text().await?));
        }
        let ret = self
            .driver
            .execute(STATE_PROBE, Vec::new())
            .await
            .context("running game state probe")?;
        Ok(ret.json().clone())
    }
}
