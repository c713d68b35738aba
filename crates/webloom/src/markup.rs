use crate::config::Config;
use crate::error::Result;
use crate::filter::{Cursor, FilterRegistry};
use crate::meta_file::MetaMap;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const THEME: &str = "base16-ocean.dark";

static HIGHLIGHT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<highlight(?:\s+lang\s*=\s*"([^"]*)")?\s*>(.*?)</highlight>"#).unwrap()
});

static PARTIAL_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{>\s*([\w./-]+)\s*\}\}").unwrap()
});

static ROOT_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(href|src)\s*=\s*(["'])/([^/])"#).unwrap()
});

pub(crate) fn register(registry: &mut FilterRegistry, config: &Config) {
    let highlighter = Arc::new(Highlighter::new());

    let markdown = MarkdownRenderer::new(highlighter.clone());
    registry.register("markdown", move |text: &str, _: &mut Cursor<'_, '_>| {
        Ok(markdown.render(text))
    });

    registry.register("highlight", move |text: &str, cursor: &mut Cursor<'_, '_>| {
        Ok(highlight_blocks(&highlighter, text, cursor))
    });

    registry.register("sass", |text: &str, cursor: &mut Cursor<'_, '_>| {
        grass::from_string(text.to_string(), &grass::Options::default())
            .map_err(|error| cursor.error(error))
    });

    registry.register("minify", |text: &str, _: &mut Cursor<'_, '_>| Ok(minify(text)));

    let base = config.base.clone();
    registry.register("basepath", move |text: &str, _: &mut Cursor<'_, '_>| {
        Ok(match &base {
            Some(base) => rewrite_base(text, base),
            None => text.to_string(),
        })
    });

    registry.register("partials", expand_partials);
}

pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let syntax = lang.and_then(|lang| self.syntax_set.find_syntax_by_token(lang));
        let theme = self.theme_set.themes.get(THEME);

        match (syntax, theme) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain_block(code, lang))
            }
            _ => plain_block(code, lang),
        }
    }
}

pub struct MarkdownRenderer {
    highlighter: Arc<Highlighter>,
}

impl MarkdownRenderer {
    pub fn new(highlighter: Arc<Highlighter>) -> Self {
        Self { highlighter }
    }

    pub fn render(&self, content: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        let mut html_output = String::new();
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in Parser::new_ext(content, options) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                    code_block = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, code)) = code_block.take() {
                        html_output.push_str(&self.highlighter.highlight(&code, lang.as_deref()));
                    }
                }
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }
                other => {
                    pulldown_cmark::html::push_html(&mut html_output, std::iter::once(other));
                }
            }
        }

        html_output
    }
}

fn plain_block(code: &str, lang: Option<&str>) -> String {
    match lang {
        Some(lang) => format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            escape_html(lang),
            escape_html(code)
        ),
        None => format!("<pre><code>{}</code></pre>", escape_html(code)),
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn highlight_blocks(highlighter: &Highlighter, text: &str, cursor: &Cursor<'_, '_>) -> String {
    let protect_from_tera = cursor.runs_later("tera");
    let protect_from_markdown = cursor.runs_later("markdown");

    HIGHLIGHT_BLOCK
        .replace_all(text, |captures: &Captures| {
            let lang = captures.get(1).map(|lang| lang.as_str());
            let code = captures.get(2).map_or("", |code| code.as_str()).trim_matches('\n');

            let mut html = format!(
                "<div class=\"highlight\">{}</div>",
                highlighter.highlight(code, lang).trim_end()
            );
            if protect_from_tera {
                html = format!("{{% raw %}}{html}{{% endraw %}}");
            }
            if protect_from_markdown {
                html = format!("\n\n{html}\n\n");
            }
            html
        })
        .into_owned()
}

fn minify(text: &str) -> String {
    let mut cfg = minify_html::Cfg::new();
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.keep_closing_tags = true;

    let minified = minify_html::minify(text.as_bytes(), &cfg);
    String::from_utf8_lossy(&minified).into_owned()
}

fn rewrite_base(text: &str, base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return text.to_string();
    }
    ROOT_RELATIVE
        .replace_all(text, |captures: &Captures| {
            format!("{}={}{}/{}", &captures[1], &captures[2], base, &captures[3])
        })
        .into_owned()
}

fn expand_partials(text: &str, cursor: &mut Cursor<'_, '_>) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for captures in PARTIAL_DIRECTIVE.captures_iter(text) {
        let (Some(directive), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&text[last..directive.start()]);
        output.push_str(&cursor.render_partial(name.as_str(), MetaMap::new())?);
        last = directive.end();
    }

    output.push_str(&text[last..]);
    Ok(output)
}
