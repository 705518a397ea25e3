//! HTML classifier producing a typed resource inventory
//!
//! One document is decomposed into forms, links, images, scripts and styles.
//! Each section is extracted independently: a failing section is left empty
//! and reported as an event, the others are unaffected. The classifier never
//! logs; it hands its events back so the caller decides how to surface them.

use crate::crawler::resource::{
    DiscoveredResource, FormDescriptor, FormInput, ImageDescriptor, LinkDescriptor, LinkKind,
    MetaTag, ScriptDescriptor, StyleDescriptor,
};
use crate::url::normalize;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Inventory sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Forms,
    Links,
    Images,
    Scripts,
    Styles,
    Meta,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Forms => "forms",
            Self::Links => "links",
            Self::Images => "images",
            Self::Scripts => "scripts",
            Self::Styles => "styles",
            Self::Meta => "meta",
        };
        f.write_str(name)
    }
}

/// A section that could not be extracted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to extract {section}: {message}")]
pub struct ParseError {
    pub section: Section,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Warn,
}

/// Structured note produced while classifying
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierEvent {
    pub level: EventLevel,
    pub section: Section,
    pub message: String,
}

impl ClassifierEvent {
    fn debug(section: Section, message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Debug,
            section,
            message: message.into(),
        }
    }

    fn warn(section: Section, message: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Warn,
            section,
            message: message.into(),
        }
    }
}

/// Classified content of one document
#[derive(Debug, Clone, Default)]
pub struct ResourceInventory {
    pub title: Option<String>,
    pub meta: Vec<MetaTag>,
    pub forms: Vec<FormDescriptor>,
    pub links: Vec<LinkDescriptor>,
    pub images: Vec<ImageDescriptor>,
    pub scripts: Vec<ScriptDescriptor>,
    pub styles: Vec<StyleDescriptor>,
    pub events: Vec<ClassifierEvent>,
}

/// Per-section counts for a classified document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub title: Option<String>,
    pub forms: usize,
    pub links: usize,
    pub images: usize,
    pub scripts: usize,
    pub styles: usize,
    pub meta: usize,
}

impl ResourceInventory {
    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            title: self.title.clone(),
            forms: self.forms.len(),
            links: self.links.len(),
            images: self.images.len(),
            scripts: self.scripts.len(),
            styles: self.styles.len(),
            meta: self.meta.len(),
        }
    }

    /// Returns the number of classified resources across all five sections
    pub fn total(&self) -> usize {
        self.forms.len() + self.links.len() + self.images.len() + self.scripts.len() + self.styles.len()
    }

    /// Flattens the inventory in persistence order: forms, links, images,
    /// scripts, styles
    ///
    /// Inline scripts and styles get anchors of the form
    /// `<document>#inline-script-<n>` / `<document>#inline-style-<n>`.
    pub fn into_resources(self, document_url: &Url) -> Vec<DiscoveredResource> {
        let mut base = document_url.clone();
        base.set_fragment(None);

        let mut resources = Vec::with_capacity(self.total());
        resources.extend(self.forms.into_iter().map(DiscoveredResource::Form));
        resources.extend(self.links.into_iter().map(DiscoveredResource::Link));
        resources.extend(self.images.into_iter().map(DiscoveredResource::Image));

        let mut inline_scripts = 0;
        for script in self.scripts {
            let anchor = match &script {
                ScriptDescriptor::External { url, .. } => url.clone(),
                ScriptDescriptor::Inline { .. } => {
                    inline_scripts += 1;
                    format!("{}#inline-script-{}", base, inline_scripts - 1)
                }
            };
            resources.push(DiscoveredResource::Script { anchor, script });
        }

        let mut inline_styles = 0;
        for style in self.styles {
            let anchor = match &style {
                StyleDescriptor::External { url, .. } => url.clone(),
                StyleDescriptor::Inline { .. } => {
                    inline_styles += 1;
                    format!("{}#inline-style-{}", base, inline_styles - 1)
                }
            };
            resources.push(DiscoveredResource::Stylesheet { anchor, style });
        }

        resources
    }
}

/// Parses HTML documents into resource inventories
pub struct HtmlClassifier;

impl HtmlClassifier {
    /// Classifies one document
    ///
    /// Never fails: malformed markup is handled by the HTML5 parser and a
    /// section that cannot be extracted is left empty with a warning event.
    ///
    /// # Example
    ///
    /// ```
    /// use kage_recon::crawler::HtmlClassifier;
    /// use url::Url;
    ///
    /// let base = Url::parse("https://example.com/").unwrap();
    /// let inventory = HtmlClassifier::parse(
    ///     r#"<form action="/search"><input name="q"></form>"#,
    ///     &base,
    /// );
    /// assert_eq!(inventory.forms[0].action, "https://example.com/search");
    /// assert_eq!(inventory.forms[0].method, "GET");
    /// ```
    pub fn parse(raw_html: &str, base: &Url) -> ResourceInventory {
        let document = Html::parse_document(raw_html);
        let mut events = Vec::new();

        let title = extract_title(&document);

        let result = extract_meta(&document);
        let meta = settle(Section::Meta, result, &mut events);

        let result = extract_forms(&document, base);
        let forms = settle(Section::Forms, result, &mut events);

        let result = extract_links(&document, base, &mut events);
        let links = settle(Section::Links, result, &mut events);

        let result = extract_images(&document, base, &mut events);
        let images = settle(Section::Images, result, &mut events);

        let result = extract_scripts(&document, base, &mut events);
        let scripts = settle(Section::Scripts, result, &mut events);

        let result = extract_styles(&document, base, &mut events);
        let styles = settle(Section::Styles, result, &mut events);

        ResourceInventory {
            title,
            meta,
            forms,
            links,
            images,
            scripts,
            styles,
            events,
        }
    }
}

/// Records the outcome of one section, substituting an empty list on failure
fn settle<T>(
    section: Section,
    result: Result<Vec<T>, ParseError>,
    events: &mut Vec<ClassifierEvent>,
) -> Vec<T> {
    match result {
        Ok(items) => {
            events.push(ClassifierEvent::debug(
                section,
                format!("extracted {} {}", items.len(), section),
            ));
            items
        }
        Err(e) => {
            events.push(ClassifierEvent::warn(section, e.to_string()));
            Vec::new()
        }
    }
}

fn selector(section: Section, css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError {
        section,
        message: format!("invalid selector '{}': {:?}", css, e),
    })
}

/// Collapses whitespace in an element's visible text
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn attr(element: &ElementRef, name: &str) -> Option<String> {
    element.value().attr(name).map(|v| v.trim().to_string())
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element_text(&element))
        .filter(|s| !s.is_empty())
}

fn extract_meta(document: &Html) -> Result<Vec<MetaTag>, ParseError> {
    let meta_selector = selector(Section::Meta, "meta[content]")?;

    Ok(document
        .select(&meta_selector)
        .filter_map(|element| {
            let name = attr(&element, "name").or_else(|| attr(&element, "property"))?;
            let content = attr(&element, "content")?;
            Some(MetaTag { name, content })
        })
        .collect())
}

fn extract_forms(document: &Html, base: &Url) -> Result<Vec<FormDescriptor>, ParseError> {
    let form_selector = selector(Section::Forms, "form")?;
    let input_selector = selector(Section::Forms, "input, textarea, select")?;

    let mut forms = Vec::new();
    for form in document.select(&form_selector) {
        // A missing or unresolvable action submits to the document itself
        let action = form
            .value()
            .attr("action")
            .and_then(|raw| normalize(base, raw))
            .unwrap_or_else(|| base.clone());

        let method = attr(&form, "method")
            .filter(|m| !m.is_empty())
            .map(|m| m.to_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        let inputs = form
            .select(&input_selector)
            .map(|input| {
                let tag = input.value().name();
                let kind = match tag {
                    "input" => attr(&input, "type")
                        .filter(|t| !t.is_empty())
                        .map(|t| t.to_lowercase())
                        .unwrap_or_else(|| "text".to_string()),
                    other => other.to_string(),
                };
                let value = match tag {
                    "textarea" => input.text().collect::<String>(),
                    _ => attr(&input, "value").unwrap_or_default(),
                };
                FormInput {
                    name: attr(&input, "name").unwrap_or_default(),
                    kind,
                    required: input.value().attr("required").is_some(),
                    value,
                }
            })
            .collect();

        forms.push(FormDescriptor {
            action: action.to_string(),
            method,
            inputs,
        });
    }

    Ok(forms)
}

fn extract_links(
    document: &Html,
    base: &Url,
    events: &mut Vec<ClassifierEvent>,
) -> Result<Vec<LinkDescriptor>, ParseError> {
    let link_selector = selector(Section::Links, "a[href], link[href]")?;

    let mut links = Vec::new();
    for element in document.select(&link_selector) {
        let raw = element.value().attr("href").unwrap_or_default();
        let Some(url) = normalize(base, raw) else {
            events.push(ClassifierEvent::debug(
                Section::Links,
                format!("dropped unresolvable reference '{}'", raw),
            ));
            continue;
        };

        let kind = if element.value().name() == "a" {
            LinkKind::Anchor
        } else {
            LinkKind::Resource
        };

        links.push(LinkDescriptor {
            url: url.to_string(),
            text: element_text(&element),
            title: attr(&element, "title"),
            rel: element
                .value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().map(str::to_lowercase).collect())
                .unwrap_or_default(),
            kind,
        });
    }

    Ok(links)
}

fn extract_images(
    document: &Html,
    base: &Url,
    events: &mut Vec<ClassifierEvent>,
) -> Result<Vec<ImageDescriptor>, ParseError> {
    let image_selector = selector(Section::Images, "img, source, picture")?;

    let mut images = Vec::new();
    for element in document.select(&image_selector) {
        let source = attr(&element, "src")
            .filter(|s| !s.is_empty())
            .or_else(|| attr(&element, "data-src").filter(|s| !s.is_empty()));

        let Some(raw) = source else {
            continue;
        };

        if raw.to_ascii_lowercase().starts_with("data:") {
            events.push(ClassifierEvent::debug(
                Section::Images,
                "dropped inline data URL".to_string(),
            ));
            continue;
        }

        let Some(url) = normalize(base, &raw) else {
            events.push(ClassifierEvent::debug(
                Section::Images,
                format!("dropped unresolvable source '{}'", raw),
            ));
            continue;
        };

        images.push(ImageDescriptor {
            url: url.to_string(),
            alt: attr(&element, "alt"),
            title: attr(&element, "title"),
            width: attr(&element, "width"),
            height: attr(&element, "height"),
        });
    }

    Ok(images)
}

fn extract_scripts(
    document: &Html,
    base: &Url,
    events: &mut Vec<ClassifierEvent>,
) -> Result<Vec<ScriptDescriptor>, ParseError> {
    let script_selector = selector(Section::Scripts, "script")?;

    let mut scripts = Vec::new();
    for element in document.select(&script_selector) {
        let script_type = attr(&element, "type")
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text/javascript".to_string());

        match attr(&element, "src").filter(|s| !s.is_empty()) {
            Some(raw) => match normalize(base, &raw) {
                Some(url) => scripts.push(ScriptDescriptor::External {
                    url: url.to_string(),
                    script_type,
                    is_async: element.value().attr("async").is_some(),
                    defer: element.value().attr("defer").is_some(),
                    body: None,
                }),
                None => events.push(ClassifierEvent::debug(
                    Section::Scripts,
                    format!("dropped unresolvable script source '{}'", raw),
                )),
            },
            // Inline content is kept even when empty
            None => scripts.push(ScriptDescriptor::Inline {
                content: element.text().collect::<String>().trim().to_string(),
                script_type,
            }),
        }
    }

    Ok(scripts)
}

fn extract_styles(
    document: &Html,
    base: &Url,
    events: &mut Vec<ClassifierEvent>,
) -> Result<Vec<StyleDescriptor>, ParseError> {
    let link_selector = selector(Section::Styles, "link[rel][href]")?;
    let style_selector = selector(Section::Styles, "style")?;

    let mut styles = Vec::new();
    for element in document.select(&link_selector) {
        let is_stylesheet = element
            .value()
            .attr("rel")
            .map(|rel| {
                rel.split_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
            .unwrap_or(false);
        if !is_stylesheet {
            continue;
        }

        let raw = element.value().attr("href").unwrap_or_default();
        let Some(url) = normalize(base, raw) else {
            events.push(ClassifierEvent::debug(
                Section::Styles,
                format!("dropped unresolvable stylesheet '{}'", raw),
            ));
            continue;
        };

        styles.push(StyleDescriptor::External {
            url: url.to_string(),
            media: attr(&element, "media")
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "all".to_string()),
            style_type: attr(&element, "type")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text/css".to_string()),
        });
    }

    for element in document.select(&style_selector) {
        let content = element.text().collect::<String>().trim().to_string();
        // Unlike inline scripts, an empty <style> block is not recorded
        if content.is_empty() {
            continue;
        }
        styles.push(StyleDescriptor::Inline {
            content,
            media: attr(&element, "media")
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "all".to_string()),
            style_type: attr(&element, "type")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "text/css".to_string()),
        });
    }

    Ok(styles)
}
