//! Code-Fence Transform
//!
//! Produces a new tree in which every `Block::Fence` is replaced by either a
//! `Block::Diagram` or a `Block::CodeBlock`. The input tree is not touched.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::markdown::{Block, CodeBlockNode, SyntaxTree};

#[derive(Debug, Error)]
#[error("highlighting {lang} failed: {message}")]
pub struct HighlightError {
    pub lang: String,
    pub message: String,
}

/// External syntax highlighter. Called once per code fence in trusted mode.
#[async_trait]
pub trait Highlighter: Send + Sync {
    async fn highlight(&self, code: &str, lang: &str) -> Result<String, HighlightError>;
}

/// Escapes the code into a themed `<pre>` without tokenizing it.
#[derive(Debug, Clone)]
pub struct PlainHighlighter {
    theme: String,
}

impl PlainHighlighter {
    pub fn new(theme: impl Into<String>) -> Self {
        Self { theme: theme.into() }
    }
}

impl Default for PlainHighlighter {
    fn default() -> Self {
        Self::new("github-dark")
    }
}

#[async_trait]
impl Highlighter for PlainHighlighter {
    async fn highlight(&self, code: &str, lang: &str) -> Result<String, HighlightError> {
        Ok(format!(
            r#"<pre class="highlight {}" data-lang="{}"><code>{}</code></pre>"#,
            escape_html(&self.theme),
            escape_html(lang),
            escape_html(code)
        ))
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Highlighting is baked in at compile time.
    #[default]
    Trusted,
    /// Raw code is kept and highlighted when the document is rendered.
    Sandboxed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOptions {
    pub diagram_language: String,
    pub default_language: String,
}

impl Default for FenceOptions {
    fn default() -> Self {
        Self {
            diagram_language: "mermaid".to_string(),
            default_language: "txt".to_string(),
        }
    }
}

impl FenceOptions {
    pub fn normalize_lang(&self, lang: Option<&str>) -> String {
        let lang = lang.unwrap_or("").trim().to_lowercase();
        if lang.is_empty() {
            self.default_language.clone()
        } else {
            lang
        }
    }
}

struct PendingHighlight {
    code: String,
    lang: String,
}

fn collect_fences(blocks: &[Block], options: &FenceOptions, out: &mut Vec<PendingHighlight>) {
    for block in blocks {
        match block {
            Block::Fence { lang, code, .. } => {
                let lang = options.normalize_lang(lang.as_deref());
                if lang != options.diagram_language {
                    out.push(PendingHighlight {
                        code: code.clone(),
                        lang,
                    });
                }
            }
            Block::BlockQuote { children } => collect_fences(children, options, out),
            Block::List { items, .. } => {
                for item in items {
                    collect_fences(item, options, out);
                }
            }
            _ => {}
        }
    }
}

/// Rebuilds `blocks`, taking highlighted markup from `baked` in document order.
fn rebuild(
    blocks: &[Block],
    options: &FenceOptions,
    baked: &mut std::vec::IntoIter<String>,
) -> Vec<Block> {
    blocks
        .iter()
        .map(|block| match block {
            Block::Fence { lang, code, .. } => {
                let lang = options.normalize_lang(lang.as_deref());
                if lang == options.diagram_language {
                    Block::Diagram { code: code.clone() }
                } else {
                    match baked.next() {
                        Some(html) => Block::CodeBlock(CodeBlockNode {
                            lang,
                            html: Some(html),
                            code: None,
                        }),
                        None => Block::CodeBlock(CodeBlockNode {
                            lang,
                            html: None,
                            code: Some(code.clone()),
                        }),
                    }
                }
            }
            Block::BlockQuote { children } => Block::BlockQuote {
                children: rebuild(children, options, baked),
            },
            Block::List { ordered, items } => Block::List {
                ordered: *ordered,
                items: items
                    .iter()
                    .map(|item| rebuild(item, options, baked))
                    .collect(),
            },
            other => other.clone(),
        })
        .collect()
}

/// Replace code fences with code-block or diagram nodes.
///
/// In trusted mode all highlight calls are issued together and joined before
/// the tree is rebuilt; results are matched to fences by position.
pub async fn transform_code_fences(
    tree: &SyntaxTree,
    mode: RenderMode,
    options: &FenceOptions,
    highlighter: &dyn Highlighter,
) -> Result<SyntaxTree, HighlightError> {
    let baked = match mode {
        RenderMode::Sandboxed => Vec::new(),
        RenderMode::Trusted => {
            let mut pending = Vec::new();
            collect_fences(&tree.blocks, options, &mut pending);
            tracing::debug!(fences = pending.len(), "highlighting code fences");

            let results = join_all(
                pending
                    .iter()
                    .map(|p| highlighter.highlight(&p.code, &p.lang)),
            )
            .await;
            results.into_iter().collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(SyntaxTree {
        blocks: rebuild(&tree.blocks, options, &mut baked.into_iter()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Finishes later for earlier fences so completion order is reversed.
    struct SlowFirstHighlighter;

    #[async_trait]
    impl Highlighter for SlowFirstHighlighter {
        async fn highlight(&self, code: &str, lang: &str) -> Result<String, HighlightError> {
            let delay = 40u64.saturating_sub(code.len() as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("<{}>{}", lang, code))
        }
    }

    struct FailingHighlighter;

    #[async_trait]
    impl Highlighter for FailingHighlighter {
        async fn highlight(&self, _code: &str, lang: &str) -> Result<String, HighlightError> {
            Err(HighlightError {
                lang: lang.to_string(),
                message: "grammar not loaded".to_string(),
            })
        }
    }

    fn sample() -> SyntaxTree {
        SyntaxTree::parse(
            "```js\na\n```\n\n```  MERMAID \ngraph TD;\n```\n\n```\nabc\n```\n\n> ```Rust\n> bb\n> ```\n\n- ```go\n  ccc\n  ```\n",
        )
    }

    #[tokio::test]
    async fn test_trusted_bakes_html_in_document_order() {
        let tree = sample();
        let out = transform_code_fences(
            &tree,
            RenderMode::Trusted,
            &FenceOptions::default(),
            &SlowFirstHighlighter,
        )
        .await
        .unwrap();

        assert_eq!(out.fence_count(), 0);
        assert_eq!(
            out.blocks[0],
            Block::CodeBlock(CodeBlockNode { lang: "js".into(), html: Some("<js>a".into()), code: None })
        );
        assert_eq!(out.blocks[1], Block::Diagram { code: "graph TD;".into() });
        assert_eq!(
            out.blocks[2],
            Block::CodeBlock(CodeBlockNode { lang: "txt".into(), html: Some("<txt>abc".into()), code: None })
        );
        assert_eq!(
            out.blocks[3],
            Block::BlockQuote {
                children: vec![Block::CodeBlock(CodeBlockNode {
                    lang: "rust".into(),
                    html: Some("<rust>bb".into()),
                    code: None,
                })]
            }
        );
        assert_eq!(
            out.blocks[4],
            Block::List {
                ordered: false,
                items: vec![vec![Block::CodeBlock(CodeBlockNode {
                    lang: "go".into(),
                    html: Some("<go>ccc".into()),
                    code: None,
                })]]
            }
        );
        // input untouched
        assert_eq!(tree.fence_count(), 5);
    }

    #[tokio::test]
    async fn test_sandboxed_defers_raw_code() {
        let out = transform_code_fences(
            &sample(),
            RenderMode::Sandboxed,
            &FenceOptions::default(),
            &FailingHighlighter,
        )
        .await
        .unwrap();
        assert_eq!(
            out.blocks[0],
            Block::CodeBlock(CodeBlockNode { lang: "js".into(), html: None, code: Some("a".into()) })
        );
        assert_eq!(out.blocks[1], Block::Diagram { code: "graph TD;".into() });
    }

    #[tokio::test]
    async fn test_highlight_failure_propagates() {
        let err = transform_code_fences(
            &sample(),
            RenderMode::Trusted,
            &FenceOptions::default(),
            &FailingHighlighter,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("grammar not loaded"));
    }

    #[tokio::test]
    async fn test_plain_highlighter_escapes() {
        let html = PlainHighlighter::default().highlight("a<b", "ts").await.unwrap();
        assert_eq!(
            html,
            r#"<pre class="highlight github-dark" data-lang="ts"><code>a&lt;b</code></pre>"#
        );
    }

    #[test]
    fn test_normalize_lang() {
        let opts = FenceOptions::default();
        assert_eq!(opts.normalize_lang(Some("  TypeScript ")), "typescript");
        assert_eq!(opts.normalize_lang(Some("   ")), "txt");
        assert_eq!(opts.normalize_lang(None), "txt");
    }
}
