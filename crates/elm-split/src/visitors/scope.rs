//! Arena of lexical scope frames
//!
//! Frames are addressed by [`ScopeId`] and hold the index of their parent
//! instead of a pointer. References are not resolved when they are seen:
//! each frame keeps the references observed inside it, and when the frame
//! closes every reference to a name declared in that frame is dropped while
//! the rest move to the parent. A name declared anywhere in a frame therefore
//! shadows references that textually precede the declaration, which gives
//! one level of hoisting per frame.

use rustc_hash::FxHashSet;

/// Index of a frame in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Kind of frame; `var` bindings walk outward to the nearest function frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Block,
}

/// Where a binding lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `let`, `const`, `class`, function declarations, parameters
    Lexical,
    /// `var`
    Hoisted,
}

/// How an identifier occurrence uses its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Read,
    Write,
    /// `{ a }` in an object literal; rewriting must expand it to `a: x.a`
    Shorthand,
}

/// One identifier occurrence that is not yet bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub kind: ReferenceKind,
}

#[derive(Debug)]
struct Frame {
    parent: Option<ScopeId>,
    kind: FrameKind,
    declared: FxHashSet<String>,
    pending: Vec<Reference>,
}

/// Stack-shaped arena of frames; only the innermost frame can be closed
#[derive(Debug, Default)]
pub struct ScopeArena {
    frames: Vec<Frame>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost open frame
    pub fn current(&self) -> Option<ScopeId> {
        self.frames.len().checked_sub(1).map(ScopeId)
    }

    /// Open a frame nested in the current one
    pub fn open(&mut self, kind: FrameKind) -> ScopeId {
        let parent = self.current();
        self.frames.push(Frame {
            parent,
            kind,
            declared: FxHashSet::default(),
            pending: Vec::new(),
        });
        ScopeId(self.frames.len() - 1)
    }

    /// Close the innermost frame.
    ///
    /// Returns the references that escape it when it was the outermost frame;
    /// otherwise they are handed to the parent and an empty list is returned.
    pub fn close(&mut self) -> Vec<Reference> {
        let Some(frame) = self.frames.pop() else {
            return Vec::new();
        };
        let escaping: Vec<Reference> = frame
            .pending
            .into_iter()
            .filter(|reference| !frame.declared.contains(&reference.name))
            .collect();

        match frame.parent {
            Some(ScopeId(parent)) => {
                self.frames[parent].pending.extend(escaping);
                Vec::new()
            }
            None => escaping,
        }
    }

    /// Declare `name`; hoisted bindings land in the nearest function frame
    pub fn declare(&mut self, name: &str, binding: BindingKind) {
        let Some(mut id) = self.current() else {
            return;
        };
        if binding == BindingKind::Hoisted {
            while self.frames[id.0].kind != FrameKind::Function {
                match self.frames[id.0].parent {
                    Some(parent) => id = parent,
                    None => break,
                }
            }
        }
        self.frames[id.0].declared.insert(name.to_owned());
    }

    /// Record an identifier occurrence in the current frame
    pub fn reference(&mut self, reference: Reference) {
        if let Some(ScopeId(id)) = self.current() {
            self.frames[id].pending.push(reference);
        }
    }
}
