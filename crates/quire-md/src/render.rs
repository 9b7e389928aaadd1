//! Markdown to HTML rendering.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;

use pulldown_cmark::{
    html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use pulldown_cmark_escape::FmtWriter;
use regex::Regex;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::codeblock::FenceKind;

const URL_PATTERN: &str = r#"https?://[^\s<>"'`]+"#;
const FRACTION_PATTERN: &str = r"(\d{1,3})/(\d{1,3})";

/// Markdown extensions and output flags.
///
/// Built once at startup and handed to [`MarkdownRenderer::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub definition_lists: bool,
    /// Curly quotes, en and em dashes, ellipses.
    pub smart_punctuation: bool,
    /// `1/2` becomes `½`, other fractions become `<sup>`/`<sub>` pairs.
    pub smart_fractions: bool,
    /// Generate `id` attributes for headings without an explicit `{#id}`.
    pub heading_ids: bool,
    /// Turn bare `http(s)://` URLs into links.
    pub autolink: bool,
    /// Accept ATX headings without a space after the `#`s (`#Title`).
    pub lenient_headings: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            definition_lists: true,
            smart_punctuation: true,
            smart_fractions: true,
            heading_ids: true,
            autolink: true,
            lenient_headings: true,
        }
    }
}

impl RenderOptions {
    /// Parser options for pulldown-cmark.
    pub fn parser_options(&self) -> Options {
        let mut options = Options::empty();
        if self.tables {
            options.insert(Options::ENABLE_TABLES);
        }
        if self.strikethrough {
            options.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.definition_lists {
            options.insert(Options::ENABLE_DEFINITION_LIST);
        }
        if self.smart_punctuation {
            options.insert(Options::ENABLE_SMART_PUNCTUATION);
        }
        if self.heading_ids {
            options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        }
        options
    }
}

/// Renders post bodies to HTML.
///
/// Fenced code blocks are dispatched on their language tag: known source languages are
/// highlighted with CSS classes, `shell` and `output` blocks get a wrapping `<div>`, and
/// everything else uses the default `<pre><code>` rendering. Output uses XHTML-style
/// self-closing tags (`<br />`, `<hr />`).
pub struct MarkdownRenderer {
    options: RenderOptions,
    syntaxes: SyntaxSet,
    url_pattern: Regex,
    fraction_pattern: Regex,
}

impl MarkdownRenderer {
    /// Create a renderer. Loads the bundled syntax definitions.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            syntaxes: SyntaxSet::load_defaults_newlines(),
            url_pattern: Regex::new(URL_PATTERN).expect("valid URL pattern"),
            fraction_pattern: Regex::new(FRACTION_PATTERN).expect("valid fraction pattern"),
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn syntaxes(&self) -> &SyntaxSet {
        &self.syntaxes
    }

    /// Render a Markdown document to HTML.
    pub fn render(&self, markdown: &str) -> String {
        let source = if self.options.lenient_headings {
            space_headings(markdown)
        } else {
            Cow::Borrowed(markdown)
        };
        let options = self.options.parser_options();
        let parser = Parser::new_ext(&source, options);

        let mut rewriter = Rewriter::new(self, intra_word_emphasis(&source, options));
        for event in TextMergeStream::new(parser) {
            rewriter.push(event);
        }

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, rewriter.finish().into_iter());
        html_output
    }

    /// Token-level highlighting of a source block.
    fn highlight(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntaxes
            .find_syntax_by_token(lang)
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntaxes, ClassStyle::Spaced);

        let mut highlighted = true;
        for line in LinesWithEndings::from(code) {
            if generator.parse_html_for_line_which_includes_newline(line).is_err() {
                highlighted = false;
                break;
            }
        }

        let inner = if highlighted {
            generator.finalize()
        } else {
            escape_html(code)
        };

        format!(
            "<pre class=\"highlight\"><code class=\"language-{}\">{}</code></pre>\n",
            escape_html(lang),
            inner
        )
    }

    /// Split a text run into plain text, fractions and autolinks.
    fn decorate<'a>(&self, text: CowStr<'a>) -> Vec<Event<'a>> {
        let has_url = self.options.autolink && self.url_pattern.is_match(&text);
        let has_fraction = self.options.smart_fractions && self.fraction_pattern.is_match(&text);
        if !has_url && !has_fraction {
            return vec![Event::Text(text)];
        }

        let mut events = Vec::new();
        let mut last = 0;

        if self.options.autolink {
            for m in self.url_pattern.find_iter(&text) {
                let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
                if url.ends_with("://") {
                    continue;
                }

                self.push_fractions(&text[last..m.start()], &mut events);
                events.push(Event::Start(Tag::Link {
                    link_type: LinkType::Autolink,
                    dest_url: url.to_string().into(),
                    title: CowStr::Borrowed(""),
                    id: CowStr::Borrowed(""),
                }));
                events.push(Event::Text(url.to_string().into()));
                events.push(Event::End(TagEnd::Link));
                last = m.start() + url.len();
            }
        }

        self.push_fractions(&text[last..], &mut events);
        events
    }

    fn push_fractions<'a>(&self, text: &str, events: &mut Vec<Event<'a>>) {
        if text.is_empty() {
            return;
        }
        if !self.options.smart_fractions {
            events.push(Event::Text(text.to_string().into()));
            return;
        }

        let mut last = 0;
        for caps in self.fraction_pattern.captures_iter(text) {
            let (Some(whole), Some(num), Some(den)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if !stands_alone(text, whole.start(), whole.end()) {
                continue;
            }

            if whole.start() > last {
                events.push(Event::Text(text[last..whole.start()].to_string().into()));
            }
            events.push(match (num.as_str(), den.as_str()) {
                ("1", "2") => Event::Text("\u{bd}".into()),
                ("1", "4") => Event::Text("\u{bc}".into()),
                ("3", "4") => Event::Text("\u{be}".into()),
                (n, d) => Event::InlineHtml(format!("<sup>{n}</sup>&frasl;<sub>{d}</sub>").into()),
            });
            last = whole.end();
        }

        if last < text.len() {
            events.push(Event::Text(text[last..].to_string().into()));
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

/// Insert the missing space in `#Heading` lines outside fenced code blocks.
fn space_headings(markdown: &str) -> Cow<'_, str> {
    let mut fence: Option<(char, usize)> = None;
    let mut out = String::new();
    let mut copied = 0;

    for (offset, line) in line_offsets(markdown) {
        let trimmed = line.trim_start_matches(' ');
        if line.len() - trimmed.len() > 3 {
            continue;
        }

        let marker = trimmed.chars().next().unwrap_or(' ');
        if marker == '`' || marker == '~' {
            let run = trimmed.chars().take_while(|&c| c == marker).count();
            if run >= 3 {
                match fence {
                    None => fence = Some((marker, run)),
                    Some((open, len)) if open == marker && run >= len => fence = None,
                    Some(_) => {}
                }
                continue;
            }
        }
        if fence.is_some() {
            continue;
        }

        let hashes = trimmed.chars().take_while(|&c| c == '#').count();
        let next = trimmed[hashes..].chars().next();
        if (1..=6).contains(&hashes) && next.is_some_and(|c| !c.is_whitespace()) {
            let at = offset + (line.len() - trimmed.len()) + hashes;
            out.push_str(&markdown[copied..at]);
            out.push(' ');
            copied = at;
        }
    }

    if copied == 0 {
        return Cow::Borrowed(markdown);
    }
    out.push_str(&markdown[copied..]);
    Cow::Owned(out)
}

/// Lines of `text` with their byte offsets, line endings excluded.
fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line.trim_end_matches(['\n', '\r'])))
    })
}

/// Delimiters of every emphasis span in document order, `Some` for spans that touch a
/// letter or digit on the outside and are therefore kept as literal text.
fn intra_word_emphasis(source: &str, options: Options) -> Vec<Option<(&str, &str)>> {
    Parser::new_ext(source, options)
        .into_offset_iter()
        .filter_map(|(event, range)| {
            let width = match event {
                Event::Start(Tag::Emphasis) => 1,
                Event::Start(Tag::Strong) => 2,
                _ => return None,
            };
            let before = source[..range.start].chars().next_back();
            let after = source[range.end..].chars().next();
            let in_word = before.is_some_and(char::is_alphanumeric)
                || after.is_some_and(char::is_alphanumeric);
            Some(in_word.then(|| delimiters(source, range, width)).flatten())
        })
        .collect()
}

/// Opening and closing delimiter runs of `width` characters around an emphasis span.
fn delimiters(source: &str, span: Range<usize>, width: usize) -> Option<(&str, &str)> {
    let is_run = |s: &str| s.chars().all(|c| c == '*' || c == '_');
    let open = source.get(span.start..span.start + width)?;
    let close = source.get(span.end.checked_sub(width)?..span.end)?;
    (span.len() > 2 * width && is_run(open) && is_run(close)).then_some((open, close))
}

/// `Some(true)` for an opening `<a>` tag, `Some(false)` for `</a>`.
fn anchor_tag(html: &str) -> Option<bool> {
    let tag = html.trim_start().strip_prefix('<')?;
    let (closing, name) = match tag.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, tag),
    };
    let mut chars = name.chars();
    let is_anchor = chars.next().is_some_and(|c| c.eq_ignore_ascii_case(&'a'))
        && chars.next().is_some_and(|c| c == '>' || c.is_ascii_whitespace());
    is_anchor.then_some(!closing)
}

/// A fraction must not touch other digits, letters or slashes (dates, paths, versions).
fn stands_alone(text: &str, start: usize, end: usize) -> bool {
    let blocks = |c: char| c.is_alphanumeric() || c == '/' || c == '.';
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(blocks) && !after.is_some_and(blocks)
}

struct CodeBuffer<'a> {
    kind: FenceKind,
    info: Option<CowStr<'a>>,
    text: String,
}

/// Single pass over the event stream applying the renderer's customizations.
struct Rewriter<'a, 'r> {
    renderer: &'r MarkdownRenderer,
    out: Vec<Event<'a>>,
    code: Option<CodeBuffer<'a>>,
    heading: Option<Vec<Event<'a>>>,
    heading_text: String,
    link_depth: usize,
    used_ids: HashMap<String, usize>,
    emphasis: Vec<Option<(&'a str, &'a str)>>,
    emphasis_seen: usize,
    open_emphasis: Vec<Option<&'a str>>,
}

impl<'a, 'r> Rewriter<'a, 'r> {
    fn new(renderer: &'r MarkdownRenderer, emphasis: Vec<Option<(&'a str, &'a str)>>) -> Self {
        Self {
            renderer,
            out: Vec::new(),
            code: None,
            heading: None,
            heading_text: String::new(),
            link_depth: 0,
            used_ids: HashMap::new(),
            emphasis,
            emphasis_seen: 0,
            open_emphasis: Vec::new(),
        }
    }

    fn push(&mut self, event: Event<'a>) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let (kind, info) = match kind {
                    CodeBlockKind::Fenced(info) => {
                        (FenceKind::from_info(&info, &self.renderer.syntaxes), Some(info))
                    }
                    CodeBlockKind::Indented => (FenceKind::Plain, None),
                };
                self.code = Some(CodeBuffer {
                    kind,
                    info,
                    text: String::new(),
                });
            }
            Event::Text(text) if self.code.is_some() => {
                if let Some(code) = self.code.as_mut() {
                    code.text.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = self.code.take() {
                    self.finish_code(code);
                }
            }

            Event::Start(Tag::Heading { .. }) if self.renderer.options.heading_ids => {
                self.heading = Some(vec![event]);
                self.heading_text.clear();
            }
            Event::End(TagEnd::Heading(_)) if self.heading.is_some() => {
                self.finish_heading(event);
            }

            Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. }) => {
                self.link_depth += 1;
                self.emit(event);
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                self.link_depth = self.link_depth.saturating_sub(1);
                self.emit(event);
            }

            Event::InlineHtml(html) => {
                match anchor_tag(&html) {
                    Some(true) => self.link_depth += 1,
                    Some(false) => self.link_depth = self.link_depth.saturating_sub(1),
                    None => {}
                }
                self.emit(Event::InlineHtml(html));
            }

            Event::Start(Tag::Emphasis) | Event::Start(Tag::Strong) => {
                let literal = self.emphasis.get(self.emphasis_seen).copied().flatten();
                self.emphasis_seen += 1;
                match literal {
                    Some((open, close)) => {
                        self.emit(Event::Text(CowStr::Borrowed(open)));
                        self.open_emphasis.push(Some(close));
                    }
                    None => {
                        self.open_emphasis.push(None);
                        self.emit(event);
                    }
                }
            }
            Event::End(TagEnd::Emphasis) | Event::End(TagEnd::Strong) => {
                match self.open_emphasis.pop().flatten() {
                    Some(close) => self.emit(Event::Text(CowStr::Borrowed(close))),
                    None => self.emit(event),
                }
            }

            Event::Text(text) => {
                if self.heading.is_some() {
                    self.heading_text.push_str(&text);
                }
                if self.link_depth == 0 {
                    for decorated in self.renderer.decorate(text) {
                        self.emit(decorated);
                    }
                } else {
                    self.emit(Event::Text(text));
                }
            }
            Event::Code(code) => {
                if self.heading.is_some() {
                    self.heading_text.push_str(&code);
                }
                self.emit(Event::Code(code));
            }

            other => self.emit(other),
        }
    }

    fn emit(&mut self, event: Event<'a>) {
        match self.heading.as_mut() {
            Some(buffer) => buffer.push(event),
            None => self.out.push(event),
        }
    }

    fn finish_code(&mut self, code: CodeBuffer<'a>) {
        if let (FenceKind::Source(lang), Some(_)) = (&code.kind, &code.info) {
            let highlighted = self.renderer.highlight(&code.text, lang);
            self.emit(Event::Html(highlighted.into()));
            return;
        }

        let wrapper = code.kind.wrapper_class();
        if let Some(class) = wrapper {
            self.emit(Event::Html(format!("<div class=\"{class}\">\n").into()));
        }

        let kind = match code.info {
            Some(info) => CodeBlockKind::Fenced(info),
            None => CodeBlockKind::Indented,
        };
        self.emit(Event::Start(Tag::CodeBlock(kind)));
        if !code.text.is_empty() {
            self.emit(Event::Text(code.text.into()));
        }
        self.emit(Event::End(TagEnd::CodeBlock));

        if wrapper.is_some() {
            self.emit(Event::Html("</div>\n".into()));
        }
    }

    fn finish_heading(&mut self, end: Event<'a>) {
        let Some(mut buffer) = self.heading.take() else {
            return;
        };

        if let Some(Event::Start(Tag::Heading { id, .. })) = buffer.first_mut() {
            if id.is_none() {
                let slug = slugify(&self.heading_text);
                if !slug.is_empty() {
                    *id = Some(self.unique_id(slug).into());
                }
            }
        }

        self.out.append(&mut buffer);
        self.out.push(end);
    }

    fn unique_id(&mut self, slug: String) -> String {
        let count = self.used_ids.entry(slug.clone()).or_insert(0);
        let id = if *count == 0 {
            slug
        } else {
            format!("{}-{}", slug, count)
        };
        *count += 1;
        id
    }

    fn finish(mut self) -> Vec<Event<'a>> {
        // An unterminated heading can't happen with a well-formed event stream, but never drop text.
        if let Some(mut buffer) = self.heading.take() {
            self.out.append(&mut buffer);
        }
        self.out
    }
}

/// Stylesheet for the classes highlighted code blocks carry, from a bundled syntect theme.
///
/// Returns `None` for an unknown theme name.
pub fn highlight_css(theme: &str) -> Option<String> {
    let themes = ThemeSet::load_defaults();
    let theme = themes.themes.get(theme)?;
    css_for_theme_with_class_style(theme, ClassStyle::Spaced).ok()
}

/// Convert a heading to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    // Writing to a String never fails.
    let _ = pulldown_cmark_escape::escape_html(FmtWriter(&mut escaped), text);
    escaped
}
