//! Markdown Syntax Tree
//!
//! CommonMark body parsed with `pulldown-cmark` and folded into an owned
//! block/inline tree. Fences keep their source line so later stages can
//! point at them.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Heading { level: u8, children: Vec<Inline> },
    Paragraph { children: Vec<Inline> },
    /// Inline content with no paragraph wrapper (tight list items, raw HTML).
    Plain { children: Vec<Inline> },
    /// Code as written in the source. Must be replaced by the code-fence
    /// transform before the tree can be compiled.
    Fence { lang: Option<String>, code: String, line: usize },
    List { ordered: bool, items: Vec<Vec<Block>> },
    BlockQuote { children: Vec<Block> },
    ThematicBreak,
    /// Transform output: code ready for display.
    CodeBlock(CodeBlockNode),
    /// Transform output: diagram source handed to the diagram renderer.
    Diagram { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlockNode {
    pub lang: String,
    /// Pre-rendered markup (trusted mode).
    pub html: Option<String>,
    /// Raw code awaiting highlighting at render time (sandboxed mode).
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inline {
    Text(String),
    Code(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Link { href: String, children: Vec<Inline> },
    LineBreak,
}

impl SyntaxTree {
    /// Parse a markdown body. Never fails: an unclosed fence runs to the end
    /// of the document, as CommonMark specifies.
    pub fn parse(body: &str) -> Self {
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(body.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        let line_of = |offset: usize| line_starts.partition_point(|&start| start <= offset);

        let mut builder = TreeBuilder::new();
        for (event, range) in Parser::new(body).into_offset_iter() {
            builder.event(event, line_of(range.start));
        }
        Self {
            blocks: builder.finish(),
        }
    }

    /// Number of fence nodes anywhere in the tree.
    pub fn fence_count(&self) -> usize {
        fn count(blocks: &[Block]) -> usize {
            blocks
                .iter()
                .map(|b| match b {
                    Block::Fence { .. } => 1,
                    Block::BlockQuote { children } => count(children),
                    Block::List { items, .. } => items.iter().map(|item| count(item)).sum(),
                    _ => 0,
                })
                .sum()
        }
        count(&self.blocks)
    }
}

enum BlockFrame {
    Root(Vec<Block>),
    Quote(Vec<Block>),
    List { ordered: bool, items: Vec<Vec<Block>> },
    Item(Vec<Block>),
}

enum InlineKind {
    Paragraph,
    Heading(u8),
    Plain,
    Strong,
    Emphasis,
    Link(String),
    Image,
}

struct InlineFrame {
    kind: InlineKind,
    children: Vec<Inline>,
}

struct FenceFrame {
    lang: Option<String>,
    code: String,
    line: usize,
}

/// Folds the flat event stream into nested blocks.
struct TreeBuilder {
    blocks: Vec<BlockFrame>,
    inlines: Vec<InlineFrame>,
    fence: Option<FenceFrame>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            blocks: vec![BlockFrame::Root(Vec::new())],
            inlines: Vec::new(),
            fence: None,
        }
    }

    fn event(&mut self, event: Event<'_>, line: usize) {
        match event {
            Event::Start(tag) => self.start(tag, line),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.fence.as_mut() {
                Some(fence) => fence.code.push_str(&text),
                None => self.push_inline(Inline::Text(text.into_string())),
            },
            Event::Code(code) => self.push_inline(Inline::Code(code.into_string())),
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push_inline(Inline::Text(html.into_string()))
            }
            Event::SoftBreak => self.push_inline(Inline::Text("\n".to_string())),
            Event::HardBreak => self.push_inline(Inline::LineBreak),
            Event::Rule => {
                self.flush_plain();
                self.push_block(Block::ThematicBreak);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>, line: usize) {
        match tag {
            Tag::Paragraph => self.open_inline(InlineKind::Paragraph),
            Tag::Heading { level, .. } => self.open_inline(InlineKind::Heading(level as u8)),
            Tag::BlockQuote => {
                self.flush_plain();
                self.blocks.push(BlockFrame::Quote(Vec::new()));
            }
            Tag::List(start) => {
                self.flush_plain();
                self.blocks.push(BlockFrame::List {
                    ordered: start.is_some(),
                    items: Vec::new(),
                });
            }
            Tag::Item => self.blocks.push(BlockFrame::Item(Vec::new())),
            Tag::CodeBlock(kind) => {
                self.flush_plain();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.fence = Some(FenceFrame {
                    lang,
                    code: String::new(),
                    line,
                });
            }
            Tag::Strong => self.open_nested(InlineKind::Strong),
            Tag::Emphasis => self.open_nested(InlineKind::Emphasis),
            Tag::Link { dest_url, .. } => self.open_nested(InlineKind::Link(dest_url.into_string())),
            Tag::Image { .. } => self.open_nested(InlineKind::Image),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => {
                if let Some(frame) = self.inlines.pop() {
                    let block = match frame.kind {
                        InlineKind::Heading(level) => Block::Heading {
                            level,
                            children: frame.children,
                        },
                        _ => Block::Paragraph {
                            children: frame.children,
                        },
                    };
                    self.push_block(block);
                }
            }
            TagEnd::Strong | TagEnd::Emphasis | TagEnd::Link | TagEnd::Image => {
                if let Some(frame) = self.inlines.pop() {
                    match frame.kind {
                        InlineKind::Strong => self.push_inline(Inline::Strong(frame.children)),
                        InlineKind::Emphasis => self.push_inline(Inline::Emphasis(frame.children)),
                        InlineKind::Link(href) => self.push_inline(Inline::Link {
                            href,
                            children: frame.children,
                        }),
                        // alt text only
                        _ => frame.children.into_iter().for_each(|c| self.push_inline(c)),
                    }
                }
            }
            TagEnd::BlockQuote => {
                self.flush_plain();
                if let Some(BlockFrame::Quote(children)) = self.blocks.pop() {
                    self.push_block(Block::BlockQuote { children });
                }
            }
            TagEnd::Item => {
                self.flush_plain();
                if let Some(BlockFrame::Item(blocks)) = self.blocks.pop() {
                    if let Some(BlockFrame::List { items, .. }) = self.blocks.last_mut() {
                        items.push(blocks);
                    }
                }
            }
            TagEnd::List(_) => {
                if let Some(BlockFrame::List { ordered, items }) = self.blocks.pop() {
                    self.push_block(Block::List { ordered, items });
                }
            }
            TagEnd::CodeBlock => {
                if let Some(mut fence) = self.fence.take() {
                    if fence.code.ends_with('\n') {
                        fence.code.pop();
                    }
                    self.push_block(Block::Fence {
                        lang: fence.lang,
                        code: fence.code,
                        line: fence.line,
                    });
                }
            }
            TagEnd::HtmlBlock => self.flush_plain(),
            _ => {}
        }
    }

    fn open_inline(&mut self, kind: InlineKind) {
        self.flush_plain();
        self.inlines.push(InlineFrame {
            kind,
            children: Vec::new(),
        });
    }

    fn open_nested(&mut self, kind: InlineKind) {
        if self.inlines.is_empty() {
            self.open_inline(InlineKind::Plain);
        }
        self.inlines.push(InlineFrame {
            kind,
            children: Vec::new(),
        });
    }

    fn push_inline(&mut self, inline: Inline) {
        if self.inlines.is_empty() {
            self.open_inline(InlineKind::Plain);
        }
        let Some(frame) = self.inlines.last_mut() else {
            return;
        };
        match (frame.children.last_mut(), inline) {
            (Some(Inline::Text(prev)), Inline::Text(next)) => prev.push_str(&next),
            (_, inline) => frame.children.push(inline),
        }
    }

    /// Close a bare run of inline content left open by a tight list item.
    fn flush_plain(&mut self) {
        if self.inlines.len() == 1 && matches!(self.inlines[0].kind, InlineKind::Plain) {
            if let Some(frame) = self.inlines.pop() {
                self.push_block(Block::Plain {
                    children: frame.children,
                });
            }
        }
    }

    fn push_block(&mut self, block: Block) {
        match self.blocks.last_mut() {
            Some(BlockFrame::Root(blocks))
            | Some(BlockFrame::Quote(blocks))
            | Some(BlockFrame::Item(blocks)) => blocks.push(block),
            Some(BlockFrame::List { items, .. }) => match items.last_mut() {
                Some(item) => item.push(block),
                None => items.push(vec![block]),
            },
            None => self.blocks.push(BlockFrame::Root(vec![block])),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_plain();
        // unclosed containers only happen on malformed event streams
        while self.blocks.len() > 1 {
            match self.blocks.pop() {
                Some(BlockFrame::Quote(children)) => self.push_block(Block::BlockQuote { children }),
                Some(BlockFrame::Item(blocks)) => {
                    if let Some(BlockFrame::List { items, .. }) = self.blocks.last_mut() {
                        items.push(blocks);
                    }
                }
                Some(BlockFrame::List { ordered, items }) => self.push_block(Block::List { ordered, items }),
                _ => {}
            }
        }
        match self.blocks.pop() {
            Some(BlockFrame::Root(blocks)) => blocks,
            _ => Vec::new(),
        }
    }
}
