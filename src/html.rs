//! HTML fragment → Markdown conversion.
//!
//! The converter parses a fragment through an injected [`FragmentParser`], removes UI
//! chrome, then walks the tree bottom-up. Each element is offered to a fixed, ordered
//! rule table; the first rule whose predicate matches renders it. Elements no rule
//! claims contribute their children's output unchanged.
//!
//! Output conventions: `#` headings, triple-backtick fences, `-` bullets, `*` emphasis and
//! `**` strong.

use std::sync::LazyLock;

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::normalize::{collapse_blank_lines, strip_trailing_whitespace};

/// Elements that carry no content: controls, inline icons, navigation and toolbars.
static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "button, svg, nav, [role='navigation'], [role='toolbar'], [class*='toolbar']",
    )
    .expect("chrome selector")
});

static HTML_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\n\x0C]+").expect("whitespace regex"));

/// Elements nested deeper than this render as their flattened text.
const MAX_DEPTH: usize = 256;

const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "header",
    "main",
    "pre",
    "section",
    "summary",
];

// ---------------------------------------------------------------------------
// Parsing capability
// ---------------------------------------------------------------------------

/// Turns markup into a queryable tree. Must tolerate malformed and partial HTML.
pub trait FragmentParser {
    fn parse_fragment(&self, html: &str) -> Html;
}

/// html5ever-backed parser from `scraper`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Html5Parser;

impl FragmentParser for Html5Parser {
    fn parse_fragment(&self, html: &str) -> Html {
        Html::parse_fragment(html)
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Immutable HTML → Markdown converter. Safe to share across threads and calls.
pub struct HtmlConverter<P = Html5Parser> {
    parser: P,
    rules: Rules,
}

impl HtmlConverter {
    pub fn new() -> Self {
        Self::with_parser(Html5Parser)
    }
}

impl Default for HtmlConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: FragmentParser> HtmlConverter<P> {
    pub fn with_parser(parser: P) -> Self {
        Self {
            parser,
            rules: Rules::standard(),
        }
    }

    /// Names of the rules in evaluation order.
    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.0.iter().map(|r| r.name)
    }

    /// Convert one fragment. Never fails; unparseable markup degrades to its text.
    pub fn convert(&self, html: &str) -> String {
        let mut fragment = self.parser.parse_fragment(html);
        strip_chrome(&mut fragment);
        let raw = self.rules.render_node(fragment.tree.root());
        let tidied = collapse_blank_lines(&strip_trailing_whitespace(&raw));
        tidied.trim().to_string()
    }
}

fn strip_chrome(fragment: &mut Html) {
    let ids: Vec<NodeId> = fragment.select(&CHROME).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = fragment.tree.get_mut(id) {
            node.detach();
        }
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

struct Rule {
    name: &'static str,
    matches: fn(ElementRef<'_>) -> bool,
    render: fn(&Rules, ElementRef<'_>) -> String,
}

struct Rules(Vec<Rule>);

impl Rules {
    fn standard() -> Self {
        Rules(vec![
            Rule {
                name: "dropped",
                matches: |el| matches!(name(el), "script" | "style" | "noscript" | "template"),
                render: |_, _| String::new(),
            },
            Rule {
                name: "fencedCode",
                matches: |el| fenced_code_element(el).is_some(),
                render: render_fenced_code,
            },
            Rule {
                name: "mathBlock",
                matches: is_block_math,
                render: |_, el| format!("\n\n$$\n{}\n$$\n\n", tex_annotation(el)),
            },
            Rule {
                name: "mathInline",
                matches: |el| name(el) == "math" || has_class(el, "katex"),
                render: |_, el| format!("${}$", tex_annotation(el)),
            },
            Rule {
                name: "inlineCode",
                matches: |el| name(el) == "code" && !parent_is(el, "pre"),
                render: render_inline_code,
            },
            Rule {
                name: "image",
                matches: |el| name(el) == "img",
                render: render_image,
            },
            Rule {
                name: "lineBreak",
                matches: |el| name(el) == "br",
                render: |_, _| "\n".to_string(),
            },
            Rule {
                name: "blockquote",
                matches: |el| name(el) == "blockquote",
                render: |rules, el| {
                    let content = collapse_blank_lines(rules.render_children(*el).trim());
                    format!("\n\n{}\n\n", quote_lines(&content))
                },
            },
            Rule {
                name: "heading",
                matches: |el| heading_level(el).is_some(),
                render: render_heading,
            },
            Rule {
                name: "list",
                matches: |el| matches!(name(el), "ul" | "ol"),
                render: render_list,
            },
            Rule {
                name: "listItem",
                matches: |el| name(el) == "li",
                render: render_list_item,
            },
            Rule {
                name: "horizontalRule",
                matches: |el| name(el) == "hr",
                render: |_, _| "\n\n---\n\n".to_string(),
            },
            Rule {
                name: "table",
                matches: |el| name(el) == "table",
                render: render_table,
            },
            Rule {
                name: "strong",
                matches: |el| matches!(name(el), "strong" | "b"),
                render: |rules, el| wrap_inline(&rules.render_children(*el), "**"),
            },
            Rule {
                name: "emphasis",
                matches: |el| matches!(name(el), "em" | "i"),
                render: |rules, el| wrap_inline(&rules.render_children(*el), "*"),
            },
            Rule {
                name: "strikethrough",
                matches: |el| matches!(name(el), "del" | "s" | "strike"),
                render: |rules, el| wrap_inline(&rules.render_children(*el), "~~"),
            },
            Rule {
                name: "link",
                matches: |el| name(el) == "a" && attr(el, "href").is_some(),
                render: render_link,
            },
            Rule {
                name: "paragraph",
                matches: |el| name(el) == "p",
                render: |rules, el| format!("\n\n{}\n\n", rules.render_children(*el).trim()),
            },
            Rule {
                name: "block",
                matches: |el| BLOCK_ELEMENTS.contains(&name(el)),
                render: |rules, el| {
                    let content = rules.render_children(*el);
                    if name(el) == "pre" {
                        format!("\n\n{}\n\n", content.trim_matches('\n'))
                    } else {
                        format!("\n\n{}\n\n", content.trim())
                    }
                },
            },
        ])
    }

    fn render_node(&self, node: NodeRef<'_, Node>) -> String {
        match node.value() {
            Node::Text(text) => {
                let text: &str = text;
                if inside_pre(node) {
                    text.to_string()
                } else {
                    HTML_WHITESPACE.replace_all(text, " ").into_owned()
                }
            }
            Node::Element(_) => ElementRef::wrap(node)
                .map(|el| self.render_element(el))
                .unwrap_or_default(),
            Node::Document | Node::Fragment => self.render_children(node),
            _ => String::new(),
        }
    }

    fn render_element(&self, el: ElementRef<'_>) -> String {
        if el.ancestors().nth(MAX_DEPTH).is_some() {
            return flattened_text(el);
        }
        match self.0.iter().find(|rule| (rule.matches)(el)) {
            Some(rule) => (rule.render)(self, el),
            None => self.render_children(*el),
        }
    }

    fn render_children(&self, node: NodeRef<'_, Node>) -> String {
        let mut out = String::new();
        for child in node.children() {
            let piece = self.render_node(child);
            let is_flow_text = matches!(child.value(), Node::Text(_)) && !inside_pre(child);
            if is_flow_text && out.ends_with('\n') {
                out.push_str(piece.trim_start_matches(' '));
            } else {
                out.push_str(&piece);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

fn render_fenced_code(_: &Rules, el: ElementRef<'_>) -> String {
    let Some(code) = fenced_code_element(el) else {
        return String::new();
    };
    let language = code
        .value()
        .classes()
        .find_map(|class| {
            let lower = class.to_ascii_lowercase();
            lower
                .starts_with("language-")
                .then(|| class["language-".len()..].to_string())
        })
        .unwrap_or_default();
    let text: String = code.text().collect();
    let body = text.strip_suffix('\n').unwrap_or(&text);
    let fence = "`".repeat(longest_fence_run(body).max(2) + 1);
    format!("\n\n{fence}{language}\n{body}\n{fence}\n\n")
}

fn render_inline_code(_: &Rules, el: ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    if text.is_empty() {
        return String::new();
    }
    if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

fn render_image(_: &Rules, el: ElementRef<'_>) -> String {
    let alt = attr(el, "alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("image");
    match attr(el, "src").map(str::trim).filter(|s| !s.is_empty()) {
        Some(src) => format!("![{alt}]({src})"),
        None => format!("![{alt}]"),
    }
}

fn render_heading(rules: &Rules, el: ElementRef<'_>) -> String {
    let level = heading_level(el).unwrap_or(1);
    let content = rules.render_children(*el);
    let text = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return String::new();
    }
    format!("\n\n{} {}\n\n", "#".repeat(level), text)
}

fn render_list(rules: &Rules, el: ElementRef<'_>) -> String {
    let content = rules.render_children(*el);
    if parent_is(el, "li") {
        format!("\n{}", content.trim_end_matches('\n'))
    } else {
        format!("\n\n{}\n\n", content.trim_end_matches('\n'))
    }
}

fn render_list_item(rules: &Rules, el: ElementRef<'_>) -> String {
    let prefix = match el.parent().and_then(ElementRef::wrap) {
        Some(list) if list.value().name() == "ol" => {
            let start = attr(list, "start")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(1);
            let index = el
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .filter(|sib| sib.value().name() == "li")
                .count() as i64;
            format!("{}. ", start + index)
        }
        _ => "- ".to_string(),
    };
    let content = rules.render_children(*el);
    let indent = " ".repeat(prefix.chars().count());
    let body = content
        .trim()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.is_empty() {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{prefix}{body}\n")
}

fn render_link(rules: &Rules, el: ElementRef<'_>) -> String {
    let content = rules.render_children(*el);
    let href = attr(el, "href").map(str::trim).unwrap_or_default();
    if href.is_empty() || content.trim().is_empty() {
        return content;
    }
    format!("[{}]({href})", content.trim())
}

fn render_table(rules: &Rules, el: ElementRef<'_>) -> String {
    let rows: Vec<Vec<String>> = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|row| row.value().name() == "tr")
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "th" | "td"))
                .map(|cell| {
                    rules
                        .render_children(*cell)
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                        .replace('|', "\\|")
                })
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return format!("\n\n{}\n\n", rules.render_children(*el).trim());
    }

    let format_row = |cells: &[String]| {
        let mut padded: Vec<&str> = cells.iter().map(String::as_str).collect();
        padded.resize(width, "");
        format!("| {} |", padded.join(" | "))
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_row(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        lines.push(format_row(row));
    }
    format!("\n\n{}\n\n", lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn name<'a>(el: ElementRef<'a>) -> &'a str {
    el.value().name()
}

fn attr<'a>(el: ElementRef<'a>, key: &str) -> Option<&'a str> {
    el.value().attr(key)
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn parent_is(el: ElementRef<'_>, tag: &str) -> bool {
    el.parent()
        .and_then(ElementRef::wrap)
        .is_some_and(|p| p.value().name() == tag)
}

fn inside_pre(node: NodeRef<'_, Node>) -> bool {
    node.ancestors()
        .any(|a| matches!(a.value(), Node::Element(e) if e.name() == "pre"))
}

fn heading_level(el: ElementRef<'_>) -> Option<usize> {
    match name(el) {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Text content of `el`, whitespace-collapsed outside `pre`.
fn flattened_text(el: ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    if name(el) == "pre" || inside_pre(*el) {
        text
    } else {
        HTML_WHITESPACE.replace_all(&text, " ").into_owned()
    }
}

/// The lone `code` element of a `pre`, ignoring whitespace-only text around it.
fn fenced_code_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if name(el) != "pre" {
        return None;
    }
    let mut code = None;
    for child in el.children() {
        match child.value() {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Comment(_) => {}
            Node::Element(e) if e.name() == "code" && code.is_none() => {
                code = ElementRef::wrap(child);
            }
            _ => return None,
        }
    }
    code
}

fn is_block_math(el: ElementRef<'_>) -> bool {
    (name(el) == "math" && attr(el, "display") == Some("block")) || has_class(el, "katex-display")
}

/// The TeX source carried in a MathML annotation, or an empty formula.
fn tex_annotation(el: ElementRef<'_>) -> String {
    let annotations: Vec<ElementRef<'_>> = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|a| a.value().name() == "annotation")
        .collect();
    annotations
        .iter()
        .find(|a| attr(**a, "encoding").is_some_and(|enc| enc.contains("tex")))
        .or_else(|| annotations.first())
        .map(|a| a.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Longest run of backticks that starts a line.
fn longest_fence_run(body: &str) -> usize {
    body.lines()
        .map(|line| line.trim_start().chars().take_while(|&c| c == '`').count())
        .max()
        .unwrap_or(0)
}

/// Wrap inline content in `delimiter`, keeping surrounding whitespace outside it.
fn wrap_inline(content: &str, delimiter: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return if content.is_empty() {
            String::new()
        } else {
            " ".to_string()
        };
    }
    let lead = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{delimiter}{trimmed}{delimiter}{trail}")
}

/// Prefix each line with `> `, blank lines with a bare `>`.
pub(crate) fn quote_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn md(html: &str) -> String {
        HtmlConverter::new().convert(html)
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<_> = HtmlConverter::new().rule_names().collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("fencedCode") < pos("inlineCode"));
        assert!(pos("mathBlock") < pos("mathInline"));
        assert_eq!(names.last(), Some(&"block"));
    }

    #[test]
    fn fenced_code_with_language() {
        let html = r#"<pre><code class="Language-Rust">fn main() {
    println!("&lt;hi&gt;");
}
</code></pre>"#;
        assert_eq!(
            md(html),
            "```Rust\nfn main() {\n    println!(\"<hi>\");\n}\n```"
        );
    }

    #[test]
    fn fenced_code_without_language() {
        assert_eq!(md("<pre>\n<code>a  b</code>\n</pre>"), "```\na  b\n```");
    }

    #[test]
    fn code_inside_pre_is_never_inline() {
        let out = md("<pre><code>x = 1</code></pre>");
        assert!(!out.contains("`x = 1`"), "{out}");
        assert_eq!(out.matches("```").count(), 2);
    }

    #[test]
    fn pre_without_code_falls_through() {
        assert_eq!(md("<pre>  keep   spacing</pre>"), "keep   spacing");
        assert_eq!(md("<pre><code>a</code><code>b</code></pre>"), "ab");
    }

    #[test]
    fn nested_fences_get_a_longer_fence() {
        assert_eq!(
            md("<pre><code>```\ninner\n```</code></pre>"),
            "````\n```\ninner\n```\n````"
        );
    }

    #[test]
    fn inline_code() {
        assert_eq!(md("<p>Use <code>cargo</code> here</p>"), "Use `cargo` here");
        assert_eq!(md("<p><code>a`b</code></p>"), "`` a`b ``");
    }

    #[test]
    fn math() {
        let block = r#"<span class="katex-display"><span class="katex"><math><semantics><mrow><mi>x</mi></mrow><annotation encoding="application/x-tex">x^2</annotation></semantics></math></span></span>"#;
        assert_eq!(md(block), "$$\nx^2\n$$");

        let inline = r#"<p>So <span class="katex"><math><annotation encoding="application/x-tex">a+b</annotation></math></span> holds</p>"#;
        assert_eq!(md(inline), "So $a+b$ holds");

        assert_eq!(md(r#"<math display="block"><mi>y</mi></math>"#), "$$\n\n$$");
    }

    #[test]
    fn images() {
        assert_eq!(md(r#"<img src="a.png" alt="Chart">"#), "![Chart](a.png)");
        assert_eq!(md(r#"<img src="a.png" alt="  ">"#), "![image](a.png)");
        assert_eq!(md(r#"<img alt="x">"#), "![x]");
    }

    #[test]
    fn line_break_is_literal_newline() {
        assert_eq!(md("<p>one<br>two</p>"), "one\ntwo");
    }

    #[test]
    fn blockquotes() {
        assert_eq!(
            md("<blockquote><p>a</p><p>b</p></blockquote><blockquote>c</blockquote>"),
            "> a\n>\n> b\n\n> c"
        );
    }

    #[test]
    fn chrome_is_removed() {
        let html = r#"<div class="code-toolbar"><button>Copy</button></div>
<nav>Home</nav><p>Answer <svg><path d="M0"/></svg>text</p><div role="toolbar">x</div>"#;
        assert_eq!(md(html), "Answer text");
    }

    #[test]
    fn headings_and_emphasis() {
        assert_eq!(
            md("<h2>Plan <em>A</em></h2><p><strong>bold </strong>and <i>it</i></p>"),
            "## Plan *A*\n\n**bold** and *it*"
        );
    }

    #[test]
    fn lists() {
        let html = "<ul><li>one</li><li>two<ul><li>inner</li></ul></li></ul><ol start=\"3\"><li>c</li><li>d</li></ol>";
        assert_eq!(md(html), "- one\n- two\n  - inner\n\n3. c\n4. d");
    }

    #[test]
    fn links_and_rules() {
        assert_eq!(
            md(r#"<p><a href="https://x.dev">site</a></p><hr><p><a>plain</a></p>"#),
            "[site](https://x.dev)\n\n---\n\nplain"
        );
    }

    #[test]
    fn tables() {
        let html = "<table><tr><th>a</th><th>b</th></tr><tr><td>1</td><td>x|y</td></tr></table>";
        assert_eq!(md(html), "| a | b |\n| --- | --- |\n| 1 | x\\|y |");
    }

    #[test]
    fn scripts_and_comments_are_dropped() {
        assert_eq!(
            md("<p>a<!-- note --></p><script>alert(1)</script><style>p{}</style>"),
            "a"
        );
    }

    #[test]
    fn malformed_html_is_tolerated() {
        assert_eq!(md("<p>unclosed <b>bold"), "unclosed **bold**");
        assert_eq!(md("</div></span>text<"), "text<");
        assert_eq!(md(""), "");
    }

    #[test]
    fn deep_nesting_is_flattened() {
        let n = 20_000;
        assert_eq!(md(&format!("{}x{}", "<div>".repeat(n), "</div>".repeat(n))), "x");

        let n = MAX_DEPTH + 10;
        let html = format!(
            "<p><b>top</b></p>{}<p>a   <b>b</b></p>{}",
            "<div>".repeat(n),
            "</div>".repeat(n)
        );
        assert_eq!(md(&html), "**top**\n\na b");
    }

    #[test]
    fn whitespace_is_tidied() {
        assert_eq!(md("<p>a   </p>\n\n\n<div>\n  <p>b</p>\n</div>"), "a\n\nb");
    }

    struct Upper;

    impl FragmentParser for Upper {
        fn parse_fragment(&self, html: &str) -> Html {
            Html::parse_fragment(&html.to_uppercase())
        }
    }

    #[test]
    fn parser_is_injected() {
        assert_eq!(HtmlConverter::with_parser(Upper).convert("<p>hi</p>"), "HI");
    }
}
