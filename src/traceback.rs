//! Frame chains recorded for a fault.
//!
//! A [`Traceback`] is a singly-linked chain of [`TraceFrame`]s. The head of
//! the chain is the outermost (earliest) call, and each frame links to the
//! call it made, ending at the frame where the fault was raised. Frames may
//! carry a snapshot of their local variables as [`Locals`].
//!
//! Tracebacks are usually built by the execution engine as a fault
//! propagates outward, one [`Traceback::push_outer`] per unwound call, or
//! captured wholesale by a companion crate such as `faultfmt-backtrace`.
//!
//! ```
//! use faultfmt::traceback::{TraceFrame, Traceback};
//!
//! let mut traceback = Traceback::new();
//! traceback.push_outer(TraceFrame::new("resolve_hello").local("attempt", 3));
//! traceback.push_outer(TraceFrame::new("execute_field").at("executor.rs", 88));
//!
//! let names: Vec<_> = traceback.frames().map(|frame| frame.function()).collect();
//! assert_eq!(names, ["execute_field", "resolve_hello"]);
//! assert_eq!(traceback.innermost().unwrap().function(), "resolve_hello");
//! ```

use core::{fmt, iter::FusedIterator};
use std::borrow::Cow;

use indexmap::IndexMap;

use crate::repr::{DebugRepr, Repr};

/// The local variables of one frame, in definition order.
#[derive(Default)]
pub struct Locals {
    entries: IndexMap<String, Box<dyn Repr + Send + Sync>>,
}

impl Locals {
    /// Creates an empty set of locals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local rendered through its [`Debug`](fmt::Debug)
    /// implementation.
    ///
    /// Recording a name twice keeps its original position and replaces the
    /// value.
    pub fn insert<T>(&mut self, name: impl Into<String>, value: T)
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        self.insert_repr(name, DebugRepr(value));
    }

    /// Records a local rendered through a custom [`Repr`].
    pub fn insert_repr<R>(&mut self, name: impl Into<String>, value: R)
    where
        R: Repr + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Box::new(value));
    }

    /// Looks up a local by name.
    pub fn get(&self, name: &str) -> Option<&(dyn Repr + Send + Sync)> {
        self.entries.get(name).map(|value| &**value)
    }

    /// Iterates over the locals in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &(dyn Repr + Send + Sync))> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), &**value))
    }

    /// The number of recorded locals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no locals were recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Values are never rendered here: `Debug` output must stay infallible.
impl fmt::Debug for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// One call in a [`Traceback`].
pub struct TraceFrame {
    function: Cow<'static, str>,
    file: Option<Cow<'static, str>>,
    line: Option<u32>,
    locals: Option<Locals>,
    next: Option<Box<TraceFrame>>,
}

impl TraceFrame {
    /// Creates a frame for `function` with an empty, available set of locals.
    pub fn new(function: impl Into<Cow<'static, str>>) -> Self {
        Self {
            function: function.into(),
            file: None,
            line: None,
            locals: Some(Locals::new()),
            next: None,
        }
    }

    /// Creates a frame whose locals could not be observed, such as a frame
    /// resolved from a native stack trace.
    pub fn opaque(function: impl Into<Cow<'static, str>>) -> Self {
        Self {
            locals: None,
            ..Self::new(function)
        }
    }

    /// Sets the source file and line of the frame.
    #[must_use]
    pub fn at(mut self, file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Sets the source file without a line number.
    #[must_use]
    pub fn in_file(mut self, file: impl Into<Cow<'static, str>>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Records a local rendered through its [`Debug`](fmt::Debug)
    /// implementation. Makes the locals of an opaque frame available.
    #[must_use]
    pub fn local<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        self.locals.get_or_insert_with(Locals::new).insert(name, value);
        self
    }

    /// Records a local rendered through a custom [`Repr`].
    #[must_use]
    pub fn local_repr<R>(mut self, name: impl Into<String>, value: R) -> Self
    where
        R: Repr + Send + Sync + 'static,
    {
        self.locals
            .get_or_insert_with(Locals::new)
            .insert_repr(name, value);
        self
    }

    /// Replaces the locals of the frame.
    #[must_use]
    pub fn with_locals(mut self, locals: Locals) -> Self {
        self.locals = Some(locals);
        self
    }

    /// The name of the function this frame belongs to.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// The source file, if known.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The line number, if known.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The locals of the frame, or `None` if they could not be observed.
    pub fn locals(&self) -> Option<&Locals> {
        self.locals.as_ref()
    }

    /// The call this frame made, if the fault was raised further in.
    pub fn next(&self) -> Option<&TraceFrame> {
        self.next.as_deref()
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function)?;
        if let Some(file) = &self.file {
            write!(f, " - {file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceFrame")
            .field("function", &self.function)
            .field("file", &self.file)
            .field("line", &self.line)
            .field("locals", &self.locals)
            .finish_non_exhaustive()
    }
}

/// A chain of frames, outermost call first.
#[derive(Default)]
pub struct Traceback {
    head: Option<Box<TraceFrame>>,
    len: usize,
}

impl Traceback {
    /// Creates an empty traceback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a traceback from frames ordered outermost first.
    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = TraceFrame>,
    {
        let frames: Vec<TraceFrame> = frames.into_iter().collect();
        let mut traceback = Self::new();
        for frame in frames.into_iter().rev() {
            traceback.push_outer(frame);
        }
        traceback
    }

    /// Adds a frame that called the current outermost frame.
    pub fn push_outer(&mut self, mut frame: TraceFrame) {
        frame.next = self.head.take();
        self.head = Some(Box::new(frame));
        self.len += 1;
    }

    /// Iterates over the frames, outermost first.
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            next: self.head.as_deref(),
            remaining: self.len,
        }
    }

    /// The outermost frame.
    pub fn outermost(&self) -> Option<&TraceFrame> {
        self.head.as_deref()
    }

    /// The frame where the fault was raised.
    pub fn innermost(&self) -> Option<&TraceFrame> {
        self.frames().last()
    }

    /// The number of frames.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the traceback holds no frames.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

// The derived drop would recurse once per frame.
impl Drop for Traceback {
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(mut frame) = next {
            next = frame.next.take();
        }
    }
}

impl fmt::Debug for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames()).finish()
    }
}

/// Iterator over the frames of a [`Traceback`], outermost first.
#[derive(Clone)]
pub struct Frames<'a> {
    next: Option<&'a TraceFrame>,
    remaining: usize,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a TraceFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.next.as_deref();
        self.remaining = self.remaining.saturating_sub(1);
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

impl FusedIterator for Frames<'_> {}
