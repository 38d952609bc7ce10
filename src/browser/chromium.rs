//! # Implementação Chromium do Browser Facade
//!
//! Dirige um Chromium headless via CDP (chromiumoxide). A estratégia:
//! um script de init instala em toda página a biblioteca
//! `window.__improver` (consulta de locators, descrição de elementos,
//! snapshot de acessibilidade), o contador de requests em voo e o
//! dismissor multilíngue de cookie-consent. As operações do facade
//! viram chamadas `evaluate` nessa biblioteca.
//!
//! ## Sobre o dismissor de consent:
//!
//! Ele roda num intervalo dentro da página e só age com evidência de
//! contexto de consent: um marcador de CMP presente no DOM, ou a URL
//! numa host/path conhecida de consent wall. Com evidência, primeiro
//! tenta os seletores de vendor; depois botões cujo texto bate EXATO
//! no dicionário multilíngue. Controles escondidos, desabilitados ou
//! fora do viewport são pulados.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use super::{target_plan, Browser, BrowserError, ElementDescriptor, ExecMode, LocatorProbe};
use crate::consent;
use crate::locator::{LocatorOp, ResolutionPlan, TextMatch};
use crate::protocol::{Step, Target};

// ============================================================================
// BIBLIOTECA INJETADA
// ============================================================================

/// Biblioteca JS instalada em todo documento. Os placeholders
/// `__X__` são substituídos pelos dicionários de `consent` no launch.
const PAGE_LIBRARY: &str = r#"
(() => {
  if (window.__improver) { return; }

  const DISMISS_TEXTS = __DISMISS_TEXTS__;
  const CMP_SELECTORS = __CMP_SELECTORS__;
  const CMP_MARKERS = __CMP_MARKERS__;
  const CONSENT_HOSTS = __CONSENT_HOSTS__;
  const CONSENT_PATHS = __CONSENT_PATHS__;

  // ---- contador de requests em voo (para o network-idle) ----
  window.__improverPending = 0;
  const origFetch = window.fetch;
  if (origFetch) {
    window.fetch = function (...args) {
      window.__improverPending += 1;
      return origFetch.apply(this, args).finally(() => { window.__improverPending -= 1; });
    };
  }
  const origOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (...args) {
    this.addEventListener('loadstart', () => { window.__improverPending += 1; });
    this.addEventListener('loadend', () => { window.__improverPending -= 1; });
    return origOpen.apply(this, args);
  };

  // ---- utilidades ----
  const normWs = (s) => (s || '').replace(/\s+/g, ' ').trim();

  const isVisible = (el) => {
    if (!el || !el.getClientRects || el.getClientRects().length === 0) { return false; }
    const style = window.getComputedStyle(el);
    return style.visibility !== 'hidden' && style.display !== 'none' && style.opacity !== '0';
  };

  const inViewport = (el) => {
    const r = el.getBoundingClientRect();
    return r.bottom > 0 && r.right > 0 &&
      r.top < (window.innerHeight || document.documentElement.clientHeight) &&
      r.left < (window.innerWidth || document.documentElement.clientWidth);
  };

  const computeRole = (el) => {
    const explicit = el.getAttribute && el.getAttribute('role');
    if (explicit) { return explicit; }
    const tag = el.tagName ? el.tagName.toLowerCase() : '';
    if (tag === 'a' && el.hasAttribute('href')) { return 'link'; }
    if (tag === 'button') { return 'button'; }
    if (tag === 'select') { return 'combobox'; }
    if (tag === 'textarea') { return 'textbox'; }
    if (tag === 'nav') { return 'navigation'; }
    if (tag === 'dialog') { return 'dialog'; }
    if (tag === 'main') { return 'main'; }
    if (tag === 'header') { return 'banner'; }
    if (tag === 'footer') { return 'contentinfo'; }
    if (/^h[1-6]$/.test(tag)) { return 'heading'; }
    if (tag === 'input') {
      const type = (el.getAttribute('type') || 'text').toLowerCase();
      if (type === 'checkbox') { return 'checkbox'; }
      if (type === 'radio') { return 'radio'; }
      if (type === 'button' || type === 'submit' || type === 'reset') { return 'button'; }
      return 'textbox';
    }
    return null;
  };

  const labelFor = (el) => {
    if (el.id) {
      const label = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
      if (label) { return normWs(label.textContent); }
    }
    const wrapper = el.closest && el.closest('label');
    return wrapper ? normWs(wrapper.textContent) : null;
  };

  const accessibleName = (el) => {
    const aria = el.getAttribute && el.getAttribute('aria-label');
    if (aria) { return normWs(aria); }
    const labelledBy = el.getAttribute && el.getAttribute('aria-labelledby');
    if (labelledBy) {
      const parts = labelledBy.split(/\s+/)
        .map((id) => document.getElementById(id))
        .filter(Boolean)
        .map((ref) => normWs(ref.textContent));
      if (parts.length) { return parts.join(' '); }
    }
    const label = labelFor(el);
    if (label) { return label; }
    const alt = el.getAttribute && el.getAttribute('alt');
    if (alt) { return normWs(alt); }
    const title = el.getAttribute && el.getAttribute('title');
    if (title) { return normWs(title); }
    return normWs(el.textContent || el.value || '');
  };

  const matchText = (m, text) => {
    const hay = normWs(text);
    if (m.mode === 'exact') { return hay === normWs(m.value); }
    if (m.mode === 'substring') { return hay.toLowerCase().includes(normWs(m.value).toLowerCase()); }
    try { return new RegExp(m.pattern, m.flags).test(hay); } catch (e) { return false; }
  };

  const allElements = (roots) => {
    const out = [];
    for (const root of roots) {
      const scope = root === document ? document : root;
      out.push(...scope.querySelectorAll('*'));
    }
    return out;
  };

  const applyOp = (current, op) => {
    const roots = current === null ? [document] : current;
    switch (op.op) {
      case 'css': {
        const out = [];
        for (const root of roots) {
          const scope = root === document ? document : root;
          try { out.push(...scope.querySelectorAll(op.value)); } catch (e) { /* seletor inválido */ }
        }
        return out;
      }
      case 'xpath': {
        const out = [];
        try {
          const result = document.evaluate(op.value, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
          for (let i = 0; i < result.snapshotLength; i += 1) { out.push(result.snapshotItem(i)); }
        } catch (e) { /* xpath inválido */ }
        return current === null ? out : out.filter((el) => roots.some((r) => r === document || r.contains(el)));
      }
      case 'role':
        return allElements(roots).filter((el) => {
          if (computeRole(el) !== op.role) { return false; }
          return op.name ? matchText(op.name, accessibleName(el)) : true;
        });
      case 'text':
        return allElements(roots).filter((el) => el.children.length === 0 && matchText(op.match, el.textContent));
      case 'label':
        return allElements(roots).filter((el) => {
          const label = labelFor(el) || el.getAttribute('aria-label');
          return label && matchText(op.match, label);
        });
      case 'placeholder':
        return allElements(roots).filter((el) => {
          const ph = el.getAttribute && el.getAttribute('placeholder');
          return ph && matchText(op.match, ph);
        });
      case 'title':
        return allElements(roots).filter((el) => {
          const t = el.getAttribute && el.getAttribute('title');
          return t && matchText(op.match, t);
        });
      case 'alttext':
        return allElements(roots).filter((el) => {
          const alt = el.getAttribute && el.getAttribute('alt');
          return alt && matchText(op.match, alt);
        });
      case 'testid':
        return allElements(roots).filter((el) => el.getAttribute && el.getAttribute('data-testid') === op.value);
      case 'filter':
        return (current || []).filter((el) => matchText(op.hasText, el.textContent));
      case 'first':
        return (current || []).slice(0, 1);
      case 'last':
        return (current || []).slice(-1);
      case 'nth':
        return (current || []).slice(op.index, op.index + 1);
      default:
        return [];
    }
  };

  const resolveOps = (ops) => {
    let current = null;
    for (const op of ops) { current = applyOp(current, op); }
    return current || [];
  };

  const cssPath = (el) => {
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1 && parts.length < 6) {
      if (node.id) { parts.unshift('#' + node.id); break; }
      let part = node.tagName.toLowerCase();
      const parent = node.parentElement;
      if (parent) {
        const siblings = Array.from(parent.children).filter((c) => c.tagName === node.tagName);
        if (siblings.length > 1) { part += ':nth-of-type(' + (siblings.indexOf(node) + 1) + ')'; }
      }
      parts.unshift(part);
      node = parent;
    }
    return parts.join(' > ');
  };

  const currentValue = (el) => {
    if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA' || el.tagName === 'SELECT') {
      return el.value;
    }
    return null;
  };

  window.__improver = {
    query(ops) {
      const matches = resolveOps(ops);
      return { count: matches.length, firstVisible: matches.length > 0 && isVisible(matches[0]) };
    },

    describe(ops) {
      const matches = resolveOps(ops);
      if (matches.length === 0) { return null; }
      const el = matches[0];
      return {
        role: computeRole(el),
        name: accessibleName(el) || null,
        label: labelFor(el),
        placeholder: (el.getAttribute && el.getAttribute('placeholder')) || null,
        title: (el.getAttribute && el.getAttribute('title')) || null,
        text: normWs(el.textContent) || null,
        testId: (el.getAttribute && el.getAttribute('data-testid')) || null,
        id: el.id || null,
        cssPath: cssPath(el),
      };
    },

    act(ops, action, payload) {
      const matches = resolveOps(ops);
      if (matches.length === 0) { return { ok: false, error: 'nenhum elemento para ' + action }; }
      const el = matches[0];
      if (!isVisible(el)) { return { ok: false, error: 'elemento invisível para ' + action }; }
      if (el.disabled) { return { ok: false, error: 'elemento desabilitado para ' + action }; }
      const fire = (type) => el.dispatchEvent(new Event(type, { bubbles: true }));
      switch (action) {
        case 'click':
          el.click();
          return { ok: true };
        case 'hover':
          el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
          el.dispatchEvent(new MouseEvent('mouseenter', { bubbles: false }));
          return { ok: true };
        case 'fill':
          el.focus();
          el.value = payload;
          fire('input');
          fire('change');
          return { ok: true };
        case 'press':
          el.focus();
          el.dispatchEvent(new KeyboardEvent('keydown', { key: payload, bubbles: true }));
          el.dispatchEvent(new KeyboardEvent('keyup', { key: payload, bubbles: true }));
          return { ok: true };
        case 'check':
        case 'uncheck':
          el.checked = action === 'check';
          fire('change');
          return { ok: true };
        case 'select':
          el.value = payload;
          fire('input');
          fire('change');
          return { ok: true };
        default:
          return { ok: false, error: 'ação desconhecida ' + action };
      }
    },

    assert(ops, kind, expected) {
      const matches = resolveOps(ops);
      if (kind === 'visible') {
        if (matches.length > 0 && isVisible(matches[0])) { return { ok: true }; }
        return { ok: false, error: 'elemento não visível (matches=' + matches.length + ')' };
      }
      if (matches.length === 0) { return { ok: false, error: 'target não resolveu' }; }
      const el = matches[0];
      if (kind === 'text') {
        const text = normWs(el.textContent);
        if (text.toLowerCase().includes(normWs(expected).toLowerCase())) { return { ok: true }; }
        return { ok: false, error: 'texto esperado "' + expected + '", encontrado "' + text + '"' };
      }
      if (kind === 'value') {
        const value = currentValue(el);
        if (value === expected) { return { ok: true }; }
        return { ok: false, error: 'value esperado "' + expected + '", encontrado "' + value + '"' };
      }
      if (kind === 'checked') {
        if (Boolean(el.checked) === expected) { return { ok: true }; }
        return { ok: false, error: 'checked esperado ' + expected + ', encontrado ' + Boolean(el.checked) };
      }
      return { ok: false, error: 'assertion desconhecida ' + kind };
    },

    snapshot() {
      const lines = [];
      const walk = (el, depth) => {
        const role = computeRole(el);
        let nextDepth = depth;
        if (role && isVisible(el)) {
          const name = accessibleName(el);
          let line = '  '.repeat(depth) + '- ' + role;
          if (name) { line += ' "' + name.replace(/\\/g, '\\\\').replace(/"/g, '\\"') + '"'; }
          const value = currentValue(el);
          if (value) { line += ': "' + value.replace(/\\/g, '\\\\').replace(/"/g, '\\"') + '"'; }
          lines.push(line);
          nextDepth = depth + 1;
        }
        for (const child of el.children) { walk(child, nextDepth); }
      };
      if (document.body) { walk(document.body, 0); }
      return lines.join('\n');
    },
  };

  // ---- dismissor de cookie-consent ----
  const clickable = (el) => isVisible(el) && !el.disabled && inViewport(el);

  const consentEvidence = () => {
    if (CMP_MARKERS.some((sel) => { try { return document.querySelector(sel); } catch (e) { return false; } })) {
      return true;
    }
    const href = window.location.href.toLowerCase();
    return CONSENT_HOSTS.some((h) => href.includes(h)) || CONSENT_PATHS.some((p) => href.includes(p));
  };

  const tryDismiss = () => {
    for (const sel of CMP_SELECTORS) {
      let el = null;
      try { el = document.querySelector(sel); } catch (e) { continue; }
      if (el && clickable(el)) { el.click(); return; }
    }
    if (!consentEvidence()) { return; }
    const controls = document.querySelectorAll('button, a, [role="button"]');
    for (const el of controls) {
      const text = normWs(el.textContent).toLowerCase();
      if (DISMISS_TEXTS.includes(text) && clickable(el)) { el.click(); return; }
    }
  };
  setInterval(tryDismiss, 500);
})();
"#;

fn page_library() -> String {
    let to_json = |items: &[&str]| serde_json::to_string(items).expect("dictionary serializes");
    PAGE_LIBRARY
        .replace(
            "__DISMISS_TEXTS__",
            &to_json(consent::DISMISS_TEXTS),
        )
        .replace("__CMP_SELECTORS__", &to_json(consent::CMP_SELECTORS))
        .replace("__CMP_MARKERS__", &to_json(consent::CMP_MARKERS))
        .replace("__CONSENT_HOSTS__", &to_json(consent::CONSENT_HOSTS))
        .replace("__CONSENT_PATHS__", &to_json(consent::CONSENT_PATHS))
}

// ============================================================================
// SERIALIZAÇÃO DO PLANO PARA A BIBLIOTECA
// ============================================================================

fn text_match_json(m: &TextMatch) -> serde_json::Value {
    match m {
        TextMatch::Exact(value) => json!({ "mode": "exact", "value": value }),
        TextMatch::Substring(value) => json!({ "mode": "substring", "value": value }),
        TextMatch::Regex { pattern, flags } => {
            json!({ "mode": "regex", "pattern": pattern, "flags": flags })
        }
    }
}

fn plan_json(plan: &ResolutionPlan) -> serde_json::Value {
    let ops: Vec<serde_json::Value> = plan
        .ops
        .iter()
        .map(|op| match op {
            LocatorOp::Css(value) => json!({ "op": "css", "value": value }),
            LocatorOp::Xpath(value) => json!({ "op": "xpath", "value": value }),
            LocatorOp::Role { role, name } => json!({
                "op": "role",
                "role": role,
                "name": name.as_ref().map(text_match_json),
            }),
            LocatorOp::Text(m) => json!({ "op": "text", "match": text_match_json(m) }),
            LocatorOp::Label(m) => json!({ "op": "label", "match": text_match_json(m) }),
            LocatorOp::Placeholder(m) => json!({ "op": "placeholder", "match": text_match_json(m) }),
            LocatorOp::Title(m) => json!({ "op": "title", "match": text_match_json(m) }),
            LocatorOp::AltText(m) => json!({ "op": "alttext", "match": text_match_json(m) }),
            LocatorOp::TestId(value) => json!({ "op": "testid", "value": value }),
            LocatorOp::Filter { has_text } => json!({ "op": "filter", "hasText": text_match_json(has_text) }),
            LocatorOp::First => json!({ "op": "first" }),
            LocatorOp::Last => json!({ "op": "last" }),
            LocatorOp::Nth(index) => json!({ "op": "nth", "index": index }),
        })
        .collect();
    serde_json::Value::Array(ops)
}

// ============================================================================
// O FACADE
// ============================================================================

/// Facade sobre um Chromium headless. Uma página exclusiva por
/// instância; o chamador serializa as chamadas.
pub struct ChromiumBrowser {
    browser: CdpBrowser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Lança o Chromium headless e instala a biblioteca de página.
    pub async fn launch() -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = CdpBrowser::launch(config).await.map_err(map_launch_error)?;

        // O handler precisa ser drenado enquanto o browser viver.
        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let library = page_library();
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(library.clone()))
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        // O documento atual não é afetado pelo add-script; instala direto.
        page.evaluate(library)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        debug!("Chromium lançado, biblioteca de página instalada");
        Ok(Self { browser, page, handler_task })
    }

    async fn eval<T: DeserializeOwned>(
        &self,
        script: String,
        timeout: Duration,
    ) -> Result<T, BrowserError> {
        let evaluated = tokio::time::timeout(timeout, self.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::StepFailed("timeout ao avaliar script na página".into()))?
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        evaluated
            .into_value::<T>()
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    fn probe_script(target: &Target) -> Result<String, BrowserError> {
        let plan = target_plan(target)?;
        Ok(format!("window.__improver.query({})", plan_json(&plan)))
    }
}

fn map_launch_error(error: chromiumoxide::error::CdpError) -> BrowserError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("could not auto detect")
        || lowered.contains("no such file")
        || lowered.contains("executable")
    {
        BrowserError::ChromiumNotInstalled {
            hint: "instale o Chromium (ex.: apt install chromium) ou aponte CHROME com o caminho do binário".into(),
        }
    } else {
        BrowserError::Launch(message)
    }
}

#[derive(serde::Deserialize)]
struct ActOutcome {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn navigate(
        &mut self,
        url: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let current = self.current_url().await;
        let resolved = super::resolve_url(url, base_url, current.as_deref())?;
        debug!(url = %resolved, "navegando");
        let navigation = async {
            self.page
                .goto(resolved.clone())
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok::<(), BrowserError>(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| BrowserError::Navigation(format!("timeout navegando para {resolved}")))?
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
                    // Navegação nunca é observation-safe.
                    return Ok(());
                }
                self.navigate(url, base_url, timeout).await
            }

            Step::AssertVisible { target, .. } => self.run_assert(target, "visible", json!(null), timeout).await,
            Step::AssertText { target, text, .. } => {
                self.run_assert(target, "text", json!(text), timeout).await
            }
            Step::AssertValue { target, value, .. } => {
                self.run_assert(target, "value", json!(value), timeout).await
            }
            Step::AssertChecked { target, checked, .. } => {
                self.run_assert(target, "checked", json!(checked), timeout).await
            }

            // Steps interagentes.
            _ => {
                let target = step.target().expect("step interagente tem target");
                if mode == ExecMode::Analysis {
                    // Em análise, interação vira observação: só resolve.
                    let probe = self.resolve_target(target).await?;
                    if probe.match_count == 0 {
                        return Err(BrowserError::StepFailed(format!(
                            "target '{}' não resolve nenhum elemento",
                            target.value
                        )));
                    }
                    return Ok(());
                }
                let (action, payload) = match step {
                    Step::Click { .. } => ("click", json!(null)),
                    Step::Hover { .. } => ("hover", json!(null)),
                    Step::Fill { text, .. } => ("fill", json!(text)),
                    Step::Press { key, .. } => ("press", json!(key)),
                    Step::Check { .. } => ("check", json!(null)),
                    Step::Uncheck { .. } => ("uncheck", json!(null)),
                    Step::Select { value, .. } => ("select", json!(value)),
                    _ => unreachable!("actions restantes tratadas acima"),
                };
                let plan = target_plan(target)?;
                let script = format!(
                    "window.__improver.act({}, {}, {})",
                    plan_json(&plan),
                    json!(action),
                    payload
                );
                let outcome: ActOutcome = self.eval(script, timeout).await?;
                if outcome.ok {
                    Ok(())
                } else {
                    Err(BrowserError::StepFailed(
                        outcome.error.unwrap_or_else(|| "ação falhou".into()),
                    ))
                }
            }
        }
    }

    async fn resolve_target(&mut self, target: &Target) -> Result<LocatorProbe, BrowserError> {
        let script = Self::probe_script(target)?;
        #[derive(serde::Deserialize)]
        struct Probe {
            count: usize,
            #[serde(rename = "firstVisible")]
            first_visible: bool,
        }
        let probe: Probe = self
            .eval(script, Duration::from_millis(crate::limits::DEFAULT_RUNTIME_TIMEOUT_MS))
            .await?;
        Ok(LocatorProbe { match_count: probe.count, first_visible: probe.first_visible })
    }

    async fn describe_target(
        &mut self,
        target: &Target,
    ) -> Result<Option<ElementDescriptor>, BrowserError> {
        let plan = target_plan(target)?;
        let script = format!("window.__improver.describe({})", plan_json(&plan));
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Described {
            role: Option<String>,
            name: Option<String>,
            label: Option<String>,
            placeholder: Option<String>,
            title: Option<String>,
            text: Option<String>,
            test_id: Option<String>,
            id: Option<String>,
            css_path: Option<String>,
        }
        let described: Option<Described> = self
            .eval(script, Duration::from_millis(crate::limits::DEFAULT_RUNTIME_TIMEOUT_MS))
            .await?;
        Ok(described.map(|d| ElementDescriptor {
            role: d.role,
            accessible_name: d.name,
            label: d.label,
            placeholder: d.placeholder,
            title: d.title,
            text: d.text,
            test_id: d.test_id,
            id: d.id,
            css_path: d.css_path,
        }))
    }

    async fn snapshot(&mut self) -> Result<String, BrowserError> {
        self.eval::<String>(
            "window.__improver.snapshot()".to_string(),
            Duration::from_millis(crate::limits::DEFAULT_RUNTIME_TIMEOUT_MS),
        )
        .await
        .map_err(|e| BrowserError::Snapshot(e.to_string()))
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut settled = 0u8;
        loop {
            if tokio::time::Instant::now() >= deadline {
                // Timeout NÃO é erro: o chamador trata como warning.
                return Ok(true);
            }
            let quiet: bool = self
                .eval(
                    "(window.__improverPending || 0) === 0 && document.readyState === 'complete'"
                        .to_string(),
                    Duration::from_secs(2),
                )
                .await
                .map_err(|e| BrowserError::NetworkIdle(e.to_string()))?;
            if quiet {
                settled += 1;
                // Duas leituras quietas seguidas: rede assentou.
                if settled >= 2 {
                    return Ok(false);
                }
            } else {
                settled = 0;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn reset(&mut self) -> Result<(), BrowserError> {
        self.page
            .goto("about:blank")
            .await
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "falha ao fechar o browser");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

impl ChromiumBrowser {
    async fn run_assert(
        &self,
        target: &Target,
        kind: &str,
        expected: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let plan = target_plan(target)?;
        let script = format!(
            "window.__improver.assert({}, {}, {})",
            plan_json(&plan),
            json!(kind),
            expected
        );
        let outcome: ActOutcome = self.eval(script, timeout).await?;
        if outcome.ok {
            Ok(())
        } else {
            Err(BrowserError::AssertionFailed(
                outcome.error.unwrap_or_else(|| format!("assert{kind} falhou")),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TargetKind, TargetSource};

    #[test]
    fn library_embeds_all_dictionaries() {
        let lib = page_library();
        assert!(!lib.contains("__DISMISS_TEXTS__"));
        assert!(lib.contains("akkoord"));
        assert!(lib.contains("#onetrust-accept-btn-handler"));
        assert!(lib.contains("consent.google.com"));
    }

    #[test]
    fn plan_json_shape() {
        let target = Target::new(
            "getByRole('link', { name: 'Home', exact: true }).first()",
            TargetKind::LocatorExpression,
            TargetSource::Manual,
        );
        let plan = target_plan(&target).unwrap();
        let json = plan_json(&plan);
        assert_eq!(json[0]["op"], "role");
        assert_eq!(json[0]["name"]["mode"], "exact");
        assert_eq!(json[1]["op"], "first");
    }

    #[test]
    fn probe_script_embeds_plan() {
        let target = Target::new("#login", TargetKind::Css, TargetSource::Manual);
        let script = ChromiumBrowser::probe_script(&target).unwrap();
        assert!(script.starts_with("window.__improver.query("));
        assert!(script.contains("#login"));
    }
}
