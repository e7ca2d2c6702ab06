//! Render Tree - Data-Only Compiled Output
//!
//! A compiled document is an immutable tree of tagged nodes. Rendering walks
//! it with a fixed interpreter; no generated code is ever executed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::markdown::{Block, CodeBlockNode, Inline, SyntaxTree};
use crate::transform::escape_html;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderCompileError {
    #[error("code fence at line {line} was not transformed")]
    UntransformedFence { line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContainerKind {
    Document,
    /// Children rendered with no wrapper.
    Fragment,
    Heading { level: u8 },
    Paragraph,
    List { ordered: bool },
    ListItem,
    BlockQuote,
    Strong,
    Emphasis,
    InlineCode,
    Link { href: String },
    LineBreak,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum RenderNode {
    Text { value: String },
    CodeBlock(CodeBlockNode),
    Diagram { code: String },
    Container { kind: ContainerKind, children: Vec<RenderNode> },
}

impl RenderNode {
    fn text(value: impl Into<String>) -> Self {
        RenderNode::Text { value: value.into() }
    }

    fn container(kind: ContainerKind, children: Vec<RenderNode>) -> Self {
        RenderNode::Container { kind, children }
    }
}

/// Renders code-block nodes. Receives pre-rendered markup in trusted mode
/// and raw code in sandboxed mode.
pub trait CodeBlockRenderer: Send + Sync {
    fn render_code_block(&self, block: &CodeBlockNode) -> String;
}

/// Renders diagram placeholders. Drawing the diagram is left to the consumer.
pub trait DiagramRenderer: Send + Sync {
    fn render_diagram(&self, code: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCodeBlock;

impl CodeBlockRenderer for HtmlCodeBlock {
    fn render_code_block(&self, block: &CodeBlockNode) -> String {
        let lang = escape_html(&block.lang);
        let inner = match (&block.html, &block.code) {
            (Some(html), _) => html.clone(),
            (None, Some(code)) => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                lang,
                escape_html(code)
            ),
            (None, None) => "<pre><code></code></pre>".to_string(),
        };
        format!(
            r#"<div class="code-block" data-lang="{}"><div class="code-label">{}</div>{}</div>"#,
            lang, lang, inner
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDiagram;

impl DiagramRenderer for HtmlDiagram {
    fn render_diagram(&self, code: &str) -> String {
        format!(r#"<div class="mermaid">{}</div>"#, escape_html(code))
    }
}

/// The named capabilities a render entry point is invoked with.
#[derive(Clone, Copy)]
pub struct RenderCapabilities<'a> {
    pub code_block: &'a dyn CodeBlockRenderer,
    pub diagram: &'a dyn DiagramRenderer,
}

impl RenderCapabilities<'static> {
    pub fn html() -> Self {
        Self {
            code_block: &HtmlCodeBlock,
            diagram: &HtmlDiagram,
        }
    }
}

/// Invocable handle to a compiled document. Cloning shares the tree.
#[derive(Debug, Clone)]
pub struct RenderEntryPoint {
    root: Arc<RenderNode>,
}

impl RenderEntryPoint {
    pub fn tree(&self) -> &RenderNode {
        &self.root
    }

    pub fn same_tree(&self, other: &RenderEntryPoint) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    pub fn invoke(&self, caps: &RenderCapabilities<'_>) -> String {
        let mut out = String::new();
        render_node(&self.root, caps, &mut out);
        out
    }
}

fn render_children(children: &[RenderNode], caps: &RenderCapabilities<'_>, out: &mut String) {
    for child in children {
        render_node(child, caps, out);
    }
}

fn render_node(node: &RenderNode, caps: &RenderCapabilities<'_>, out: &mut String) {
    match node {
        RenderNode::Text { value } => out.push_str(&escape_html(value)),
        RenderNode::CodeBlock(block) => {
            out.push_str(&caps.code_block.render_code_block(block));
            out.push('\n');
        }
        RenderNode::Diagram { code } => {
            out.push_str(&caps.diagram.render_diagram(code));
            out.push('\n');
        }
        RenderNode::Container { kind, children } => {
            let (open, close, block_level) = match kind {
                ContainerKind::Document | ContainerKind::Fragment => {
                    render_children(children, caps, out);
                    return;
                }
                ContainerKind::LineBreak => {
                    out.push_str("<br />\n");
                    return;
                }
                ContainerKind::Rule => {
                    out.push_str("<hr />\n");
                    return;
                }
                ContainerKind::Heading { level } => {
                    (format!("<h{}>", level), format!("</h{}>", level), true)
                }
                ContainerKind::Paragraph => ("<p>".into(), "</p>".into(), true),
                ContainerKind::List { ordered: true } => ("<ol>\n".into(), "</ol>".into(), true),
                ContainerKind::List { ordered: false } => ("<ul>\n".into(), "</ul>".into(), true),
                ContainerKind::ListItem => ("<li>".into(), "</li>".into(), true),
                ContainerKind::BlockQuote => ("<blockquote>\n".into(), "</blockquote>".into(), true),
                ContainerKind::Strong => ("<strong>".into(), "</strong>".into(), false),
                ContainerKind::Emphasis => ("<em>".into(), "</em>".into(), false),
                ContainerKind::InlineCode => ("<code>".into(), "</code>".into(), false),
                ContainerKind::Link { href } => (
                    format!(r#"<a href="{}">"#, escape_html(href)),
                    "</a>".into(),
                    false,
                ),
            };
            out.push_str(&open);
            render_children(children, caps, out);
            out.push_str(&close);
            if block_level {
                out.push('\n');
            }
        }
    }
}

fn compile_inlines(inlines: &[Inline]) -> Vec<RenderNode> {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(t) => RenderNode::text(t.clone()),
            Inline::Code(c) => {
                RenderNode::container(ContainerKind::InlineCode, vec![RenderNode::text(c.clone())])
            }
            Inline::Strong(children) => {
                RenderNode::container(ContainerKind::Strong, compile_inlines(children))
            }
            Inline::Emphasis(children) => {
                RenderNode::container(ContainerKind::Emphasis, compile_inlines(children))
            }
            Inline::Link { href, children } => RenderNode::container(
                ContainerKind::Link { href: href.clone() },
                compile_inlines(children),
            ),
            Inline::LineBreak => RenderNode::container(ContainerKind::LineBreak, Vec::new()),
        })
        .collect()
}

fn compile_blocks(blocks: &[Block]) -> Result<Vec<RenderNode>, RenderCompileError> {
    blocks
        .iter()
        .map(|block| {
            Ok(match block {
                Block::Fence { line, .. } => {
                    return Err(RenderCompileError::UntransformedFence { line: *line })
                }
                Block::Heading { level, children } => RenderNode::container(
                    ContainerKind::Heading { level: *level },
                    compile_inlines(children),
                ),
                Block::Paragraph { children } => {
                    RenderNode::container(ContainerKind::Paragraph, compile_inlines(children))
                }
                Block::Plain { children } => {
                    RenderNode::container(ContainerKind::Fragment, compile_inlines(children))
                }
                Block::List { ordered, items } => RenderNode::container(
                    ContainerKind::List { ordered: *ordered },
                    items
                        .iter()
                        .map(|item| {
                            Ok(RenderNode::container(
                                ContainerKind::ListItem,
                                compile_blocks(item)?,
                            ))
                        })
                        .collect::<Result<Vec<_>, RenderCompileError>>()?,
                ),
                Block::BlockQuote { children } => {
                    RenderNode::container(ContainerKind::BlockQuote, compile_blocks(children)?)
                }
                Block::ThematicBreak => RenderNode::container(ContainerKind::Rule, Vec::new()),
                Block::CodeBlock(node) => RenderNode::CodeBlock(node.clone()),
                Block::Diagram { code } => RenderNode::Diagram { code: code.clone() },
            })
        })
        .collect()
}

/// Compile a transformed syntax tree into a render entry point.
pub fn compile_render_tree(tree: &SyntaxTree) -> Result<RenderEntryPoint, RenderCompileError> {
    let children = compile_blocks(&tree.blocks)?;
    Ok(RenderEntryPoint {
        root: Arc::new(RenderNode::container(ContainerKind::Document, children)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShoutingCodeBlock;

    impl CodeBlockRenderer for ShoutingCodeBlock {
        fn render_code_block(&self, block: &CodeBlockNode) -> String {
            block.code.clone().unwrap_or_default().to_uppercase()
        }
    }

    #[test]
    fn test_untransformed_fence_fails() {
        let tree = SyntaxTree::parse("text\n\n```js\nx\n```\n");
        assert_eq!(
            compile_render_tree(&tree).unwrap_err(),
            RenderCompileError::UntransformedFence { line: 3 }
        );
    }

    #[test]
    fn test_html_interpreter() {
        let mut tree = SyntaxTree::parse("# Hi & bye\n\nSee [docs](/d?a=1&b=2) and `x<y`.\n\n- a\n- **b**\n\n---\n");
        tree.blocks.push(Block::Diagram { code: "graph TD; A-->B".into() });
        tree.blocks.push(Block::CodeBlock(CodeBlockNode {
            lang: "js".into(),
            html: None,
            code: Some("let a = 1 < 2;".into()),
        }));

        let html = compile_render_tree(&tree)
            .unwrap()
            .invoke(&RenderCapabilities::html());

        assert_eq!(
            html,
            concat!(
                "<h1>Hi &amp; bye</h1>\n",
                "<p>See <a href=\"/d?a=1&amp;b=2\">docs</a> and <code>x&lt;y</code>.</p>\n",
                "<ul>\n<li>a</li>\n<li><strong>b</strong></li>\n</ul>\n",
                "<hr />\n",
                "<div class=\"mermaid\">graph TD; A--&gt;B</div>\n",
                "<div class=\"code-block\" data-lang=\"js\"><div class=\"code-label\">js</div>",
                "<pre><code class=\"language-js\">let a = 1 &lt; 2;</code></pre></div>\n",
            )
        );
    }

    #[test]
    fn test_capabilities_used_at_invocation() {
        let tree = SyntaxTree {
            blocks: vec![Block::CodeBlock(CodeBlockNode {
                lang: "sh".into(),
                html: None,
                code: Some("echo hi".into()),
            })],
        };
        let entry = compile_render_tree(&tree).unwrap();
        let caps = RenderCapabilities {
            code_block: &ShoutingCodeBlock,
            diagram: &HtmlDiagram,
        };
        assert_eq!(entry.invoke(&caps), "ECHO HI\n");
    }

    #[test]
    fn test_spaced_asterisks_render_literally() {
        let tree = SyntaxTree::parse("Compute 2 * 3 * 4 now.\n");
        let html = compile_render_tree(&tree)
            .unwrap()
            .invoke(&RenderCapabilities::html());
        assert_eq!(html, "<p>Compute 2 * 3 * 4 now.</p>\n");
    }

    #[test]
    fn test_loose_list_and_hard_break() {
        let tree = SyntaxTree::parse("1. one  \n   two\n\n2. three\n");
        let html = compile_render_tree(&tree)
            .unwrap()
            .invoke(&RenderCapabilities::html());
        assert_eq!(
            html,
            "<ol>\n<li><p>one<br />\ntwo</p>\n</li>\n<li><p>three</p>\n</li>\n</ol>\n"
        );
    }

    #[test]
    fn test_trusted_markup_is_not_escaped() {
        let node = CodeBlockNode {
            lang: "ts".into(),
            html: Some("<pre class=\"shiki\">x</pre>".into()),
            code: None,
        };
        let out = HtmlCodeBlock.render_code_block(&node);
        assert!(out.contains("<pre class=\"shiki\">x</pre>"));
    }
}
