//! Renderers that turn a message's `view` + `data` into Telegram HTML.
//!
//! The view name decides how `data` is decoded:
//!
//! | View           | `data` shape                          |
//! |----------------|---------------------------------------|
//! | `success.html` | string                                |
//! | `error.html`   | string                                |
//! | `info.html`    | string                                |
//! | `list.html`    | list of strings                       |
//! | `article.html` | one [`Article`]                       |
//! | `digest.html`  | map of section name to [`Article`]s   |

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, Result};

/// An article as carried in `article.html` / `digest.html` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Success,
    Error,
    Info,
    List,
    Article,
    Digest,
}

impl FromStr for View {
    type Err = DispatchError;

    fn from_str(name: &str) -> Result<Self> {
        Ok(match name {
            "success.html" => View::Success,
            "error.html" => View::Error,
            "info.html" => View::Info,
            "list.html" => View::List,
            "article.html" => View::Article,
            "digest.html" => View::Digest,
            other => return Err(DispatchError::UnknownView(other.to_string())),
        })
    }
}

impl View {
    pub fn name(self) -> &'static str {
        match self {
            View::Success => "success.html",
            View::Error => "error.html",
            View::Info => "info.html",
            View::List => "list.html",
            View::Article => "article.html",
            View::Digest => "digest.html",
        }
    }

    /// Decode `data` into this view's shape and render it.
    pub fn render(self, data: &Value) -> Result<String> {
        match self {
            View::Success => Ok(format!("✅ {}", escape_html(&self.decode::<String>(data)?))),
            View::Error => Ok(format!("❌ {}", escape_html(&self.decode::<String>(data)?))),
            View::Info => Ok(format!("ℹ️ {}", escape_html(&self.decode::<String>(data)?))),
            View::List => Ok(render_list(&self.decode::<Vec<String>>(data)?)),
            View::Article => Ok(render_article(&self.decode::<Article>(data)?)),
            View::Digest => Ok(render_digest(
                &self.decode::<BTreeMap<String, Vec<Article>>>(data)?,
            )),
        }
    }

    fn decode<T: DeserializeOwned>(self, data: &Value) -> Result<T> {
        T::deserialize(data).map_err(|e| DispatchError::InvalidData {
            view: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Render `data` with the view registered under `view`.
pub fn render(view: &str, data: &Value) -> Result<String> {
    view.parse::<View>()?.render(data)
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {}", escape_html(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_article(article: &Article) -> String {
    let mut out = format!(
        "<b><a href=\"{}\">{}</a></b>",
        escape_html(&article.link),
        escape_html(&article.title)
    );

    let mut meta = Vec::new();
    if let Some(source) = &article.source {
        meta.push(escape_html(source));
    }
    if let Some(at) = article.published_at {
        meta.push(at.format("%Y-%m-%d").to_string());
    }
    if !meta.is_empty() {
        let _ = write!(out, "\n<i>{}</i>", meta.join(" · "));
    }

    if let Some(desc) = article.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = write!(out, "\n\n{}", escape_html(desc.trim()));
    }
    out
}

fn render_digest(sections: &BTreeMap<String, Vec<Article>>) -> String {
    let mut blocks = Vec::new();
    for (name, articles) in sections {
        if articles.is_empty() {
            continue;
        }
        let mut block = format!("<b>{}</b>", escape_html(name));
        for article in articles {
            let _ = write!(
                block,
                "\n• <a href=\"{}\">{}</a>",
                escape_html(&article.link),
                escape_html(&article.title)
            );
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_views_escape_their_text() {
        assert_eq!(render("success.html", &json!("ok")).unwrap(), "✅ ok");
        assert_eq!(
            render("error.html", &json!("a < b & c")).unwrap(),
            "❌ a &lt; b &amp; c"
        );
        assert!(render("info.html", &json!("hi")).unwrap().ends_with("hi"));
    }

    #[test]
    fn list_view_renders_bullets() {
        let out = render("list.html", &json!(["one", "<two>"])).unwrap();
        assert_eq!(out, "• one\n• &lt;two&gt;");
    }

    #[test]
    fn article_view_links_title_and_trims_description() {
        let out = render(
            "article.html",
            &json!({
                "title": "Rust 2.0",
                "link": "https://example.org/a?x=1&y=2",
                "description": "  big news  ",
                "source": "Blog"
            }),
        )
        .unwrap();
        assert!(out.starts_with(
            "<b><a href=\"https://example.org/a?x=1&amp;y=2\">Rust 2.0</a></b>"
        ));
        assert!(out.contains("<i>Blog</i>"));
        assert!(out.ends_with("\n\nbig news"));
    }

    #[test]
    fn digest_view_groups_sections_in_order() {
        let out = render(
            "digest.html",
            &json!({
                "tech": [{"title": "T1", "link": "https://t/1"}],
                "empty": [],
                "arts": [{"title": "A1", "link": "https://a/1"}, {"title": "A2", "link": "https://a/2"}]
            }),
        )
        .unwrap();
        assert_eq!(
            out,
            "<b>arts</b>\n• <a href=\"https://a/1\">A1</a>\n• <a href=\"https://a/2\">A2</a>\n\n<b>tech</b>\n• <a href=\"https://t/1\">T1</a>"
        );
    }

    #[test]
    fn wrong_data_shape_is_rejected() {
        assert!(matches!(
            render("list.html", &json!("not a list")),
            Err(DispatchError::InvalidData { .. })
        ));
        assert!(matches!(
            render("unknown.html", &json!(null)),
            Err(DispatchError::UnknownView(_))
        ));
    }
}
