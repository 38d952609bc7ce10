// Module: Fake browser
// Scripted in-memory implementation of the Browser trait. Lets the
// pipeline tests run the full selector/assertion machinery without a
// Chromium install. Pages are flat element lists; actions mutate them.

#![allow(clippy::field_reassign_with_default)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use super::{resolve_url, target_plan, Browser, BrowserError, ElementDescriptor, ExecMode, LocatorProbe};
use crate::locator::LocatorOp;
use crate::protocol::{Step, Target};

/// One scripted DOM element.
#[derive(Debug, Clone)]
pub struct FakeElement {
    /// Stable handle used by `reveals`.
    pub key: String,
    /// CSS selectors this element answers to.
    pub css: Vec<String>,
    pub xpath: Option<String>,
    pub test_id: Option<String>,
    pub role: String,
    /// Accessible name.
    pub name: String,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub title: Option<String>,
    /// Text content.
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub value: String,
    pub checked: bool,
    pub id: Option<String>,
    /// Clicking navigates to this page URL.
    pub on_click_goto: Option<String>,
    /// Clicking flips these element keys to visible.
    pub reveals: Vec<String>,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            key: String::new(),
            css: Vec::new(),
            xpath: None,
            test_id: None,
            role: "generic".into(),
            name: String::new(),
            label: None,
            placeholder: None,
            title: None,
            text: String::new(),
            visible: true,
            enabled: true,
            value: String::new(),
            checked: false,
            id: None,
            on_click_goto: None,
            reveals: Vec::new(),
        }
    }
}

impl FakeElement {
    /// Shorthand for the common case: role + name + one CSS selector.
    pub fn new(key: &str, role: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            role: role.to_string(),
            name: name.to_string(),
            text: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_css(mut self, selector: &str) -> Self {
        self.css.push(selector.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_test_id(mut self, test_id: &str) -> Self {
        self.test_id = Some(test_id.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn goto_on_click(mut self, url: &str) -> Self {
        self.on_click_goto = Some(url.to_string());
        self
    }

    pub fn reveals_on_click(mut self, keys: &[&str]) -> Self {
        self.reveals = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    fn matches_css(&self, selector: &str) -> bool {
        if self.css.iter().any(|s| s == selector) {
            return true;
        }
        if let Some(id) = &self.id {
            if selector == format!("#{id}") {
                return true;
            }
        }
        false
    }
}

/// Scripted browser: a map of URL → elements, plus failure knobs.
pub struct ScriptedBrowser {
    pages: HashMap<String, Vec<FakeElement>>,
    initial: HashMap<String, Vec<FakeElement>>,
    current: Option<String>,
    /// Target values whose playback execution fails.
    pub fail_values: HashSet<String>,
    /// Scripted outcomes for wait_for_network_idle (default Ok(false)).
    pub idle_outcomes: VecDeque<Result<bool, String>>,
    /// Log of performed playback actions, e.g. "click #go".
    pub executed: Vec<String>,
    pub closed: bool,
}

impl ScriptedBrowser {
    pub fn new(pages: HashMap<String, Vec<FakeElement>>) -> Self {
        Self {
            initial: pages.clone(),
            pages,
            current: None,
            fail_values: HashSet::new(),
            idle_outcomes: VecDeque::new(),
            executed: Vec::new(),
            closed: false,
        }
    }

    pub fn single_page(url: &str, elements: Vec<FakeElement>) -> Self {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), elements);
        Self::new(pages)
    }

    pub fn fail_on(mut self, target_value: &str) -> Self {
        self.fail_values.insert(target_value.to_string());
        self
    }

    fn elements(&self) -> Result<&Vec<FakeElement>, BrowserError> {
        let current = self.current.as_ref().ok_or_else(|| {
            BrowserError::StepFailed("nenhuma página carregada no fake browser".into())
        })?;
        self.pages
            .get(current)
            .ok_or_else(|| BrowserError::Navigation(format!("página desconhecida: {current}")))
    }

    fn elements_mut(&mut self) -> Result<&mut Vec<FakeElement>, BrowserError> {
        let current = self.current.clone().ok_or_else(|| {
            BrowserError::StepFailed("nenhuma página carregada no fake browser".into())
        })?;
        self.pages
            .get_mut(&current)
            .ok_or_else(|| BrowserError::Navigation(format!("página desconhecida: {current}")))
    }

    fn match_plan(&self, target: &Target) -> Result<Vec<usize>, BrowserError> {
        let plan = target_plan(target)?;
        let elements = self.elements()?;
        let mut current: Option<Vec<usize>> = None;
        for op in &plan.ops {
            let pool: Vec<usize> = match &current {
                Some(indices) => indices.clone(),
                None => (0..elements.len()).collect(),
            };
            let next = match op {
                LocatorOp::Css(sel) => pool
                    .into_iter()
                    .filter(|&i| elements[i].matches_css(sel))
                    .collect(),
                LocatorOp::Xpath(xp) => pool
                    .into_iter()
                    .filter(|&i| elements[i].xpath.as_deref() == Some(xp.as_str()))
                    .collect(),
                LocatorOp::TestId(id) => pool
                    .into_iter()
                    .filter(|&i| elements[i].test_id.as_deref() == Some(id.as_str()))
                    .collect(),
                LocatorOp::Role { role, name } => pool
                    .into_iter()
                    .filter(|&i| {
                        let el = &elements[i];
                        el.role == *role
                            && name.as_ref().map(|m| m.matches(&el.name)).unwrap_or(true)
                    })
                    .collect(),
                LocatorOp::Text(m) => pool
                    .into_iter()
                    .filter(|&i| m.matches(&elements[i].text))
                    .collect(),
                LocatorOp::Label(m) => pool
                    .into_iter()
                    .filter(|&i| {
                        elements[i].label.as_deref().map(|l| m.matches(l)).unwrap_or(false)
                    })
                    .collect(),
                LocatorOp::Placeholder(m) => pool
                    .into_iter()
                    .filter(|&i| {
                        elements[i]
                            .placeholder
                            .as_deref()
                            .map(|p| m.matches(p))
                            .unwrap_or(false)
                    })
                    .collect(),
                LocatorOp::Title(m) => pool
                    .into_iter()
                    .filter(|&i| {
                        elements[i].title.as_deref().map(|t| m.matches(t)).unwrap_or(false)
                    })
                    .collect(),
                LocatorOp::AltText(m) => pool
                    .into_iter()
                    .filter(|&i| m.matches(&elements[i].name))
                    .collect(),
                LocatorOp::Filter { has_text } => pool
                    .into_iter()
                    .filter(|&i| has_text.matches(&elements[i].text))
                    .collect(),
                LocatorOp::First => pool.into_iter().take(1).collect(),
                LocatorOp::Last => {
                    let mut v: Vec<usize> = pool;
                    if v.len() > 1 {
                        v = vec![*v.last().unwrap()];
                    }
                    v
                }
                LocatorOp::Nth(n) => pool.into_iter().skip(*n).take(1).collect(),
            };
            current = Some(next);
        }
        Ok(current.unwrap_or_default())
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(
        &mut self,
        url: &str,
        base_url: Option<&str>,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        let resolved = resolve_url(url, base_url, self.current.as_deref())?;
        if !self.pages.contains_key(&resolved) {
            return Err(BrowserError::Navigation(format!("página desconhecida: {resolved}")));
        }
        self.executed.push(format!("navigate {resolved}"));
        self.current = Some(resolved);
        Ok(())
    }

    async fn execute_step(
        &mut self,
        step: &Step,
        mode: ExecMode,
        timeout: Duration,
        base_url: Option<&str>,
    ) -> Result<(), BrowserError> {
        match step {
            Step::Navigate { url, .. } => {
                if mode == ExecMode::Analysis {
                    return Ok(());
                }
                self.navigate(url, base_url, timeout).await
            }

            Step::AssertVisible { target, .. } => {
                let matches = self.match_plan(target)?;
                let elements = self.elements()?;
                if matches.first().map(|&i| elements[i].visible).unwrap_or(false) {
                    Ok(())
                } else {
                    Err(BrowserError::AssertionFailed(format!(
                        "'{}' não está visível (matches={})",
                        target.value,
                        matches.len()
                    )))
                }
            }
            Step::AssertText { target, text, .. } => {
                let matches = self.match_plan(target)?;
                let elements = self.elements()?;
                match matches.first() {
                    Some(&i) if elements[i].text.to_lowercase().contains(&text.to_lowercase()) => {
                        Ok(())
                    }
                    Some(&i) => Err(BrowserError::AssertionFailed(format!(
                        "texto esperado '{text}', encontrado '{}'",
                        elements[i].text
                    ))),
                    None => Err(BrowserError::AssertionFailed("target não resolveu".into())),
                }
            }
            Step::AssertValue { target, value, .. } => {
                let matches = self.match_plan(target)?;
                let elements = self.elements()?;
                match matches.first() {
                    Some(&i) if elements[i].value == *value => Ok(()),
                    Some(&i) => Err(BrowserError::AssertionFailed(format!(
                        "value esperado '{value}', encontrado '{}'",
                        elements[i].value
                    ))),
                    None => Err(BrowserError::AssertionFailed("target não resolveu".into())),
                }
            }
            Step::AssertChecked { target, checked, .. } => {
                let matches = self.match_plan(target)?;
                let elements = self.elements()?;
                match matches.first() {
                    Some(&i) if elements[i].checked == *checked => Ok(()),
                    Some(&i) => Err(BrowserError::AssertionFailed(format!(
                        "checked esperado {checked}, encontrado {}",
                        elements[i].checked
                    ))),
                    None => Err(BrowserError::AssertionFailed("target não resolveu".into())),
                }
            }

            // Interacting steps.
            _ => {
                let target = step.target().expect("step interagente tem target").clone();
                let matches = self.match_plan(&target)?;
                if mode == ExecMode::Analysis {
                    return if matches.is_empty() {
                        Err(BrowserError::StepFailed(format!(
                            "target '{}' não resolve nenhum elemento",
                            target.value
                        )))
                    } else {
                        Ok(())
                    };
                }
                if self.fail_values.contains(&target.value) {
                    return Err(BrowserError::StepFailed(format!(
                        "falha roteirizada para '{}'",
                        target.value
                    )));
                }
                let Some(&index) = matches.first() else {
                    return Err(BrowserError::StepFailed(format!(
                        "target '{}' não resolve nenhum elemento",
                        target.value
                    )));
                };

                self.executed.push(format!("{} {}", step.action(), target.value));

                let (goto, reveals) = {
                    let elements = self.elements_mut()?;
                    let el = &mut elements[index];
                    match step {
                        Step::Fill { text, .. } => el.value = text.clone(),
                        Step::Select { value, .. } => el.value = value.clone(),
                        Step::Check { .. } => el.checked = true,
                        Step::Uncheck { .. } => el.checked = false,
                        _ => {}
                    }
                    (el.on_click_goto.clone(), el.reveals.clone())
                };

                if matches!(step, Step::Click { .. }) {
                    if !reveals.is_empty() {
                        let elements = self.elements_mut()?;
                        for el in elements.iter_mut() {
                            if reveals.contains(&el.key) {
                                el.visible = true;
                            }
                        }
                    }
                    if let Some(url) = goto {
                        if self.pages.contains_key(&url) {
                            self.current = Some(url);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn resolve_target(&mut self, target: &Target) -> Result<LocatorProbe, BrowserError> {
        let matches = self.match_plan(target)?;
        let elements = self.elements()?;
        Ok(LocatorProbe {
            match_count: matches.len(),
            first_visible: matches.first().map(|&i| elements[i].visible).unwrap_or(false),
        })
    }

    async fn describe_target(
        &mut self,
        target: &Target,
    ) -> Result<Option<ElementDescriptor>, BrowserError> {
        let matches = self.match_plan(target)?;
        let elements = self.elements()?;
        Ok(matches.first().map(|&i| {
            let el = &elements[i];
            ElementDescriptor {
                role: Some(el.role.clone()).filter(|r| r != "generic"),
                accessible_name: Some(el.name.clone()).filter(|n| !n.is_empty()),
                label: el.label.clone(),
                placeholder: el.placeholder.clone(),
                title: el.title.clone(),
                text: Some(el.text.clone()).filter(|t| !t.is_empty()),
                test_id: el.test_id.clone(),
                id: el.id.clone(),
                css_path: el
                    .id
                    .as_ref()
                    .map(|id| format!("#{id}"))
                    .or_else(|| el.css.first().cloned()),
            }
        }))
    }

    async fn snapshot(&mut self) -> Result<String, BrowserError> {
        let elements = self.elements()?;
        let mut lines = Vec::new();
        for el in elements.iter().filter(|el| el.visible && el.role != "generic") {
            let mut line = format!("- {}", el.role);
            if !el.name.is_empty() {
                line.push_str(&format!(" \"{}\"", el.name.replace('"', "\\\"")));
            }
            if !el.value.is_empty() {
                line.push_str(&format!(": \"{}\"", el.value.replace('"', "\\\"")));
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    async fn wait_for_network_idle(&mut self, _timeout: Duration) -> Result<bool, BrowserError> {
        match self.idle_outcomes.pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(BrowserError::NetworkIdle(message)),
            None => Ok(false),
        }
    }

    async fn reset(&mut self) -> Result<(), BrowserError> {
        self.pages = self.initial.clone();
        self.current = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TargetKind, TargetSource};

    fn login_page() -> ScriptedBrowser {
        ScriptedBrowser::single_page(
            "https://app.example.com/login",
            vec![
                FakeElement::new("name", "textbox", "Naam")
                    .with_id("name")
                    .with_label("Naam")
                    .with_placeholder("Vul je naam in"),
                FakeElement::new("go", "button", "Inloggen").with_id("go"),
                FakeElement::new("status", "status", "Opgeslagen").hidden(),
            ],
        )
    }

    fn css(value: &str) -> Target {
        Target::new(value, TargetKind::Css, TargetSource::Manual)
    }

    #[tokio::test]
    async fn navigate_then_probe() {
        let mut browser = login_page();
        browser
            .navigate("https://app.example.com/login", None, Duration::from_secs(1))
            .await
            .unwrap();
        let probe = browser.resolve_target(&css("#name")).await.unwrap();
        assert_eq!(probe.match_count, 1);
        assert!(probe.first_visible);
    }

    #[tokio::test]
    async fn fill_mutates_value_and_assert_value_passes() {
        let mut browser = login_page();
        browser
            .navigate("https://app.example.com/login", None, Duration::from_secs(1))
            .await
            .unwrap();
        let fill = Step::Fill { target: css("#name"), text: "Alice".into(), description: None };
        browser
            .execute_step(&fill, ExecMode::Playback, Duration::from_secs(1), None)
            .await
            .unwrap();
        let assert_step =
            Step::AssertValue { target: css("#name"), value: "Alice".into(), description: None };
        browser
            .execute_step(&assert_step, ExecMode::Analysis, Duration::from_secs(1), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn click_reveals_hidden_elements_in_snapshot() {
        let mut browser = ScriptedBrowser::single_page(
            "https://a.example.com/",
            vec![
                FakeElement::new("save", "button", "Opslaan")
                    .with_id("save")
                    .reveals_on_click(&["status"]),
                FakeElement::new("status", "status", "Opgeslagen").hidden(),
            ],
        );
        browser
            .navigate("https://a.example.com/", None, Duration::from_secs(1))
            .await
            .unwrap();
        let pre = browser.snapshot().await.unwrap();
        assert!(!pre.contains("Opgeslagen"));
        let click = Step::Click { target: css("#save"), description: None };
        browser
            .execute_step(&click, ExecMode::Playback, Duration::from_secs(1), None)
            .await
            .unwrap();
        let post = browser.snapshot().await.unwrap();
        assert!(post.contains("- status \"Opgeslagen\""));
    }

    #[tokio::test]
    async fn analysis_mode_never_mutates() {
        let mut browser = login_page();
        browser
            .navigate("https://app.example.com/login", None, Duration::from_secs(1))
            .await
            .unwrap();
        let fill = Step::Fill { target: css("#name"), text: "Alice".into(), description: None };
        browser
            .execute_step(&fill, ExecMode::Analysis, Duration::from_secs(1), None)
            .await
            .unwrap();
        let probe_value = browser.describe_target(&css("#name")).await.unwrap().unwrap();
        assert!(probe_value.css_path.is_some());
        let assert_step =
            Step::AssertValue { target: css("#name"), value: "".into(), description: None };
        browser
            .execute_step(&assert_step, ExecMode::Analysis, Duration::from_secs(1), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scripted_failure_and_idle_outcomes() {
        let mut browser = login_page().fail_on("#go");
        browser.idle_outcomes.push_back(Ok(true));
        browser
            .navigate("https://app.example.com/login", None, Duration::from_secs(1))
            .await
            .unwrap();
        let click = Step::Click { target: css("#go"), description: None };
        let err = browser
            .execute_step(&click, ExecMode::Playback, Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::StepFailed(_)));
        assert!(browser.wait_for_network_idle(Duration::from_secs(1)).await.unwrap());
        assert!(!browser.wait_for_network_idle(Duration::from_secs(1)).await.unwrap());
    }
}
