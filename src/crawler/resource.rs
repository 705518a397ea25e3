//! Typed resources discovered in one retrieved document

use serde::Serialize;

/// A form with its resolved action and ordered inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormDescriptor {
    /// Absolute submission URL; the document URL when the action is absent
    pub action: String,

    /// Uppercased HTTP method, `GET` by default
    pub method: String,

    pub inputs: Vec<FormInput>,
}

impl FormDescriptor {
    /// Returns `(field name, field kind)` pairs in document order
    pub fn fields(&self) -> Vec<(&str, &str)> {
        self.inputs
            .iter()
            .map(|input| (input.name.as_str(), input.kind.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub value: String,
}

/// Which element a link came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// `<a href>`
    Anchor,
    /// `<link href>`
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkDescriptor {
    pub url: String,
    pub text: String,
    pub title: Option<String>,
    pub rel: Vec<String>,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub url: String,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ScriptDescriptor {
    External {
        url: String,
        script_type: String,
        is_async: bool,
        defer: bool,
        /// Retrieved body, when script retrieval is enabled
        #[serde(skip_serializing)]
        body: Option<String>,
    },
    Inline {
        content: String,
        script_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StyleDescriptor {
    External {
        url: String,
        media: String,
        style_type: String,
    },
    Inline {
        content: String,
        media: String,
        style_type: String,
    },
}

/// `<meta>` name (or property) with its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaTag {
    pub name: String,
    pub content: String,
}

/// Kinds of persisted resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Html,
    Form,
    Link,
    Image,
    Script,
    Stylesheet,
}

impl ResourceKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Form => "form",
            Self::Link => "link",
            Self::Image => "image",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "html" => Some(Self::Html),
            "form" => Some(Self::Form),
            "link" => Some(Self::Link),
            "image" => Some(Self::Image),
            "script" => Some(Self::Script),
            "stylesheet" => Some(Self::Stylesheet),
            _ => None,
        }
    }

    pub fn all_kinds() -> Vec<Self> {
        vec![
            Self::Html,
            Self::Form,
            Self::Link,
            Self::Image,
            Self::Script,
            Self::Stylesheet,
        ]
    }
}

/// One record owned by a crawl run
///
/// Inline scripts and styles are addressed by a synthetic anchor derived
/// from the document URL so they never collide with each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveredResource {
    HtmlDocument { url: String, content: String },
    Form(FormDescriptor),
    Link(LinkDescriptor),
    Image(ImageDescriptor),
    Script { anchor: String, script: ScriptDescriptor },
    Stylesheet { anchor: String, style: StyleDescriptor },
}

impl DiscoveredResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::HtmlDocument { .. } => ResourceKind::Html,
            Self::Form(_) => ResourceKind::Form,
            Self::Link(_) => ResourceKind::Link,
            Self::Image(_) => ResourceKind::Image,
            Self::Script { .. } => ResourceKind::Script,
            Self::Stylesheet { .. } => ResourceKind::Stylesheet,
        }
    }

    /// Absolute URL, or the synthetic anchor for inline content
    pub fn url(&self) -> &str {
        match self {
            Self::HtmlDocument { url, .. } => url.as_str(),
            Self::Form(form) => form.action.as_str(),
            Self::Link(link) => link.url.as_str(),
            Self::Image(image) => image.url.as_str(),
            Self::Script { anchor, .. } | Self::Stylesheet { anchor, .. } => anchor.as_str(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Self::Script {
                script: ScriptDescriptor::Inline { .. },
                ..
            } | Self::Stylesheet {
                style: StyleDescriptor::Inline { .. },
                ..
            }
        )
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Form(form) => Some(form.method.as_str()),
            _ => None,
        }
    }

    /// Raw text carried by the resource, if any
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::HtmlDocument { content, .. } => Some(content.as_str()),
            Self::Script { script, .. } => match script {
                ScriptDescriptor::Inline { content, .. } => Some(content.as_str()),
                ScriptDescriptor::External { body, .. } => body.as_deref(),
            },
            Self::Stylesheet {
                style: StyleDescriptor::Inline { content, .. },
                ..
            } => Some(content.as_str()),
            _ => None,
        }
    }

    /// Structured payload as JSON; documents carry none
    pub fn payload(&self) -> serde_json::Result<Option<String>> {
        let value = match self {
            Self::HtmlDocument { .. } => return Ok(None),
            Self::Form(form) => serde_json::to_string(form)?,
            Self::Link(link) => serde_json::to_string(link)?,
            Self::Image(image) => serde_json::to_string(image)?,
            Self::Script { script, .. } => serde_json::to_string(script)?,
            Self::Stylesheet { style, .. } => serde_json::to_string(style)?,
        };
        Ok(Some(value))
    }
}
