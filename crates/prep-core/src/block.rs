//! Block tree and the assembler that builds it.
//!
//! The assembler consumes recognized items in file order and maintains a
//! stack of open frames. Content accumulates into `Text` leaves; block
//! directives push, transition, and pop frames under strict family rules.
//! The result is a fully-built tree per source file, which the expander
//! then walks lazily.

use crate::directive::{BlockForm, BlockRole, BranchKind, DirectiveRegistry};
use crate::error::{Origin, PrepError};
use crate::recognizer::Recognized;

/// One content line inside a `Text` leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    /// The line's text.
    pub text: String,
    /// Where it came from.
    pub origin: Origin,
}

/// A node of the block tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Top of a source file.
    Root {
        /// The file's blocks in order.
        children: Vec<Block>,
    },
    /// Contiguous plain content.
    Text {
        /// The content lines.
        lines: Vec<TextLine>,
    },
    /// A single-line directive call.
    Single {
        /// The directive tag.
        tag: String,
        /// The call's argument text.
        arg: String,
        /// Where the call appeared.
        origin: Origin,
    },
    /// A branching block (`if`/`ifdef`/`ifndef` family).
    Conditional {
        /// Ordered branches; at most one is expanded.
        branches: Vec<Branch>,
    },
    /// A replayed block (`for` family).
    Loop {
        /// The `VARS in EXPR:` header text.
        header: String,
        /// The body.
        children: Vec<Block>,
        /// Where the loop was opened.
        origin: Origin,
    },
}

/// One branch of a conditional block.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Branch flavor.
    pub kind: BranchKind,
    /// Predicate text (empty for `else`).
    pub arg: String,
    /// Branch body.
    pub children: Vec<Block>,
    /// Where the branch's directive appeared.
    pub origin: Origin,
}

enum Frame {
    Root {
        children: Vec<Block>,
        text: Vec<TextLine>,
    },
    Conditional {
        family: String,
        open_tag: String,
        open_origin: Origin,
        finished: Vec<Branch>,
        kind: BranchKind,
        arg: String,
        origin: Origin,
        children: Vec<Block>,
        text: Vec<TextLine>,
        seen_else: bool,
    },
    Loop {
        family: String,
        open_tag: String,
        open_origin: Origin,
        header: String,
        children: Vec<Block>,
        text: Vec<TextLine>,
    },
}

impl Frame {
    fn flush_text(&mut self) {
        let (children, text) = match self {
            Self::Root { children, text }
            | Self::Conditional { children, text, .. }
            | Self::Loop { children, text, .. } => (children, text),
        };
        if !text.is_empty() {
            children.push(Block::Text {
                lines: std::mem::take(text),
            });
        }
    }

    fn push_child(&mut self, block: Block) {
        self.flush_text();
        match self {
            Self::Root { children, .. }
            | Self::Conditional { children, .. }
            | Self::Loop { children, .. } => children.push(block),
        }
    }

    fn push_text(&mut self, line: TextLine) {
        match self {
            Self::Root { text, .. }
            | Self::Conditional { text, .. }
            | Self::Loop { text, .. } => text.push(line),
        }
    }

    fn family(&self) -> Option<&str> {
        match self {
            Self::Root { .. } => None,
            Self::Conditional { family, .. } | Self::Loop { family, .. } => {
                Some(family.as_str())
            }
        }
    }
}

/// Builds a [`Block`] tree from recognized items.
pub struct BlockAssembler<'r> {
    directives: &'r DirectiveRegistry,
    stack: Vec<Frame>,
}

impl<'r> BlockAssembler<'r> {
    /// Create an assembler resolving roles against the given registry.
    #[must_use]
    pub fn new(directives: &'r DirectiveRegistry) -> Self {
        Self {
            directives,
            stack: vec![Frame::Root {
                children: Vec::new(),
                text: Vec::new(),
            }],
        }
    }

    /// Feed one recognized item.
    pub fn feed(&mut self, item: Recognized, origin: &Origin) -> Result<(), PrepError> {
        match item {
            Recognized::Content(text) => {
                self.top().push_text(TextLine {
                    text,
                    origin: origin.clone(),
                });
                Ok(())
            }
            Recognized::Anchored { tag, arg } => self.feed_directive(&tag, arg, origin),
            Recognized::Floating {
                tag,
                arg,
                before,
                after,
            } => {
                if !before.is_empty() {
                    self.top().push_text(TextLine {
                        text: before,
                        origin: origin.clone(),
                    });
                }
                self.feed_directive(&tag, arg, origin)?;
                if !after.is_empty() {
                    self.top().push_text(TextLine {
                        text: after,
                        origin: origin.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    fn feed_directive(&mut self, tag: &str, arg: String, origin: &Origin) -> Result<(), PrepError> {
        let spec = self
            .directives
            .lookup(tag)
            .ok_or_else(|| PrepError::UnknownDirective {
                tag: tag.to_owned(),
            })?;

        match spec.role().clone() {
            BlockRole::Single => {
                self.top().push_child(Block::Single {
                    tag: tag.to_owned(),
                    arg,
                    origin: origin.clone(),
                });
                Ok(())
            }
            BlockRole::Child { family } => {
                if self.top().family() != Some(family.as_str()) {
                    return Err(self.mismatch(tag, origin));
                }
                self.top().push_child(Block::Single {
                    tag: tag.to_owned(),
                    arg,
                    origin: origin.clone(),
                });
                Ok(())
            }
            BlockRole::Open { family, form } => {
                let frame = match form {
                    BlockForm::Conditional(kind) => Frame::Conditional {
                        family,
                        open_tag: tag.to_owned(),
                        open_origin: origin.clone(),
                        finished: Vec::new(),
                        kind,
                        arg,
                        origin: origin.clone(),
                        children: Vec::new(),
                        text: Vec::new(),
                        seen_else: false,
                    },
                    BlockForm::Loop => Frame::Loop {
                        family,
                        open_tag: tag.to_owned(),
                        open_origin: origin.clone(),
                        header: arg,
                        children: Vec::new(),
                        text: Vec::new(),
                    },
                };
                self.stack.push(frame);
                Ok(())
            }
            BlockRole::Transition {
                family: tag_family,
                kind: new_kind,
            } => {
                match self.stack.last_mut() {
                    Some(Frame::Conditional {
                        family,
                        finished,
                        kind,
                        arg: branch_arg,
                        origin: branch_origin,
                        children,
                        text,
                        seen_else,
                        ..
                    }) if *family == tag_family && !*seen_else => {
                        if !text.is_empty() {
                            children.push(Block::Text {
                                lines: std::mem::take(text),
                            });
                        }
                        finished.push(Branch {
                            kind: *kind,
                            arg: std::mem::take(branch_arg),
                            children: std::mem::take(children),
                            origin: branch_origin.clone(),
                        });
                        *kind = new_kind;
                        *branch_arg = arg;
                        *branch_origin = origin.clone();
                        *seen_else = new_kind == BranchKind::Else;
                        Ok(())
                    }
                    _ => Err(self.mismatch(tag, origin)),
                }
            }
            BlockRole::Close { family: tag_family } => {
                if self.top().family() != Some(tag_family.as_str()) {
                    return Err(self.mismatch(tag, origin));
                }
                let mut frame = self.stack.pop().expect("close checked a non-root frame");
                frame.flush_text();
                let block = match frame {
                    Frame::Conditional {
                        mut finished,
                        kind,
                        arg,
                        origin: branch_origin,
                        children,
                        ..
                    } => {
                        finished.push(Branch {
                            kind,
                            arg,
                            children,
                            origin: branch_origin,
                        });
                        Block::Conditional { branches: finished }
                    }
                    Frame::Loop {
                        header,
                        children,
                        open_origin,
                        ..
                    } => Block::Loop {
                        header,
                        children,
                        origin: open_origin,
                    },
                    Frame::Root { .. } => unreachable!("root frame has no family"),
                };
                self.top().push_child(block);
                Ok(())
            }
        }
    }

    /// Finish assembly, producing the file's root block.
    pub fn finish(mut self) -> Result<Block, PrepError> {
        if self.stack.len() > 1 {
            let (tag, origin) = match self.stack.last().expect("stack is non-empty") {
                Frame::Conditional {
                    open_tag,
                    open_origin,
                    ..
                }
                | Frame::Loop {
                    open_tag,
                    open_origin,
                    ..
                } => (open_tag.clone(), open_origin.clone()),
                Frame::Root { .. } => unreachable!("root is the bottom frame"),
            };
            return Err(PrepError::UnterminatedBlock { origin, tag });
        }

        let mut root = self.stack.pop().expect("stack holds the root frame");
        root.flush_text();
        match root {
            Frame::Root { children, .. } => Ok(Block::Root { children }),
            _ => unreachable!("bottom frame is the root"),
        }
    }

    fn top(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("stack is never empty")
    }

    fn mismatch(&self, tag: &str, origin: &Origin) -> PrepError {
        PrepError::BlockMismatch {
            origin: origin.clone(),
            tag: tag.to_owned(),
        }
    }
}
