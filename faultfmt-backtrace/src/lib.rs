#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Native stack traces for faultfmt exceptions.
//!
//! This crate captures the current call stack with the [`backtrace`] crate and
//! turns it into a [`Traceback`], so the `stacktrace` of a debug payload shows
//! where in the Rust code a resolver fault was raised. Native frames cannot
//! expose their local variables, so their locals are reported as unavailable
//! and the payload's `context` is `null` unless the engine adds frames of its
//! own.
//!
//! # Quick Start
//!
//! ```rust
//! use faultfmt::{ExecutionError, exception::Exception, format_error};
//! use faultfmt_backtrace::ExceptionBacktraceExt;
//!
//! fn resolve_total() -> Result<u64, Exception> {
//!     let raw = "12x";
//!     raw.parse::<u64>().map_err(|error| Exception::from(error).with_backtrace())
//! }
//!
//! let error = ExecutionError::from_exception(resolve_total().unwrap_err());
//! let formatted = format_error(&error, true);
//! let exception = formatted.extensions.unwrap().exception;
//! # let _ = exception;
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Disables all filtering and shows full paths
//! - `FAULTFMT_BACKTRACE` - Comma-separated options:
//!   - `full_paths` - Show full file paths in frames
//!   - `max_frames=N` - Keep at most `N` frames closest to the fault
//!
//! # Path privacy
//!
//! Frame paths are shortened for known prefixes (the Rust standard library
//! and the cargo registry) but may still expose private file system
//! structure. Debug payloads are meant for trusted clients only; consider
//! building with `--remap-path-prefix` as well.

use std::{borrow::Cow, num::ParseIntError, sync::OnceLock};

use backtrace::BytesOrWideString;
use faultfmt::{
    exception::Exception,
    traceback::{TraceFrame, Traceback},
};

/// Configuration for filtering frames out of a captured stack trace.
///
/// # Examples
///
/// ```rust
/// use faultfmt_backtrace::TraceFilter;
///
/// let filter = TraceFilter {
///     // Hide the executor's own frames at the bottom of the trace
///     skipped_final_crates: &["std", "core", "tokio", "my_executor"],
///     max_frame_count: 10,
///     ..TraceFilter::DEFAULT
/// };
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceFilter {
    /// Crates whose frames are dropped while they are the innermost frames,
    /// such as the capture machinery itself.
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose frames are dropped while they are the outermost frames,
    /// such as the runtime that started the thread.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of frames kept, counted from the innermost one.
    pub max_frame_count: usize,
    /// Whether to keep full file paths instead of shortened ones.
    pub show_full_path: bool,
}

impl TraceFilter {
    /// Default filter settings.
    pub const DEFAULT: Self = Self {
        skipped_initial_crates: &[
            "backtrace",
            "faultfmt",
            "faultfmt_backtrace",
            "core",
            "std",
            "alloc",
        ],
        skipped_final_crates: &["std", "core", "alloc", "tokio"],
        max_frame_count: 20,
        show_full_path: false,
    };

    /// Keeps every frame with its full path.
    pub const FULL: Self = Self {
        skipped_initial_crates: &[],
        skipped_final_crates: &[],
        max_frame_count: usize::MAX,
        show_full_path: true,
    };

    /// Creates a filter from the `RUST_BACKTRACE` and `FAULTFMT_BACKTRACE`
    /// environment variables.
    ///
    /// A malformed `FAULTFMT_BACKTRACE` is reported once as a warning and
    /// ignored.
    pub fn new_from_env() -> Self {
        *EnvOptions::get()
    }

    /// Applies a comma-separated option string on top of `self`.
    ///
    /// ```rust
    /// use faultfmt_backtrace::TraceFilter;
    ///
    /// let filter = TraceFilter::DEFAULT.with_options("full_paths, max_frames=5").unwrap();
    /// assert!(filter.show_full_path);
    /// assert_eq!(filter.max_frame_count, 5);
    ///
    /// assert!(TraceFilter::DEFAULT.with_options("everything").is_err());
    /// ```
    pub fn with_options(mut self, options: &str) -> Result<Self, FilterConfigError> {
        for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            if option.eq_ignore_ascii_case("full_paths") {
                self.show_full_path = true;
            } else if let Some(value) = option.strip_prefix("max_frames=") {
                self.max_frame_count =
                    value
                        .parse()
                        .map_err(|source| FilterConfigError::InvalidFrameLimit {
                            value: value.to_owned(),
                            source,
                        })?;
            } else {
                return Err(FilterConfigError::UnknownOption(option.to_owned()));
            }
        }
        Ok(self)
    }
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A malformed backtrace option string.
#[derive(Debug, thiserror::Error)]
pub enum FilterConfigError {
    /// The option is not recognized.
    #[error("unknown backtrace option `{0}`")]
    UnknownOption(String),
    /// The value of `max_frames` is not a number.
    #[error("invalid frame limit `{value}`")]
    InvalidFrameLimit {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        #[source]
        source: ParseIntError,
    },
}

struct EnvOptions;

impl EnvOptions {
    fn get() -> &'static TraceFilter {
        static FAULTFMT_BACKTRACE_FILTER: OnceLock<TraceFilter> = OnceLock::new();

        FAULTFMT_BACKTRACE_FILTER.get_or_init(|| {
            let rust_backtrace_full =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            let base = if rust_backtrace_full {
                TraceFilter::FULL
            } else {
                TraceFilter::DEFAULT
            };

            let Some(var) = std::env::var_os("FAULTFMT_BACKTRACE") else {
                return base;
            };
            match base.with_options(&var.to_string_lossy()) {
                Ok(filter) => filter,
                Err(error) => {
                    tracing::warn!(%error, "ignoring FAULTFMT_BACKTRACE");
                    base
                }
            }
        })
    }
}

/// A resolved native frame, before filtering.
#[derive(Debug)]
struct NativeFrame {
    sym_demangled: String,
    path: FramePath,
    lineno: Option<u32>,
}

impl NativeFrame {
    fn crate_name(&self) -> Option<Cow<'_, str>> {
        self.path
            .crate_name
            .as_deref()
            .map(Cow::Borrowed)
            .or_else(|| crate_of_symbol(&self.sym_demangled).map(Cow::Borrowed))
    }

    fn is_from(&self, crates: &[&str]) -> bool {
        self.crate_name()
            .is_some_and(|name| crates.iter().any(|skipped| same_crate(skipped, &name)))
    }

    fn is_process_entry(&self) -> bool {
        self.sym_demangled == "__libc_start_call_main"
            || self.sym_demangled == "__libc_start_main_impl"
            || (self.sym_demangled == "_start" && self.path.raw_path.contains("zig/libc/glibc"))
    }

    fn into_trace_frame(self, show_full_path: bool) -> TraceFrame {
        let function = get_function_name(&self.sym_demangled).to_owned();
        let file = match (&self.path.split_suffix, show_full_path) {
            (Some(suffix), false) => format!("[..]/{suffix}"),
            _ => self.path.raw_path,
        };
        let frame = TraceFrame::opaque(function);
        match self.lineno {
            Some(line) => frame.at(file, line),
            None => frame.in_file(file),
        }
    }
}

/// File path of a native frame, split at a known prefix when possible.
#[derive(Debug)]
struct FramePath {
    raw_path: String,
    crate_name: Option<String>,
    split_suffix: Option<String>,
}

impl FramePath {
    fn new(path: BytesOrWideString<'_>) -> Self {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // Rust standard library sources:
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // Cargo registry sources:
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        let raw_path = path.to_str_lossy().into_owned();
        let captures = std_regex
            .captures(&raw_path)
            .or_else(|| registry_regex.captures(&raw_path));
        let Some(crate_capture) = captures.and_then(|captures| captures.get(1)) else {
            return Self {
                raw_path,
                crate_name: None,
                split_suffix: None,
            };
        };

        let crate_name = crate_capture.as_str().to_owned();
        let split_suffix = raw_path[crate_capture.start()..].to_owned();
        Self {
            raw_path,
            crate_name: Some(crate_name),
            split_suffix: Some(split_suffix),
        }
    }
}

/// Crate names in paths use `-`, in symbols `_`.
fn same_crate(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == y || (x == b'-' || x == b'_') && (y == b'-' || y == b'_'))
}

/// The leading path segment of a demangled symbol, such as `faultfmt` for
/// `<faultfmt::Exception as core::fmt::Debug>::fmt`.
fn crate_of_symbol(sym: &str) -> Option<&str> {
    let sym = sym.trim_start_matches('<');
    let end = sym.find("::")?;
    let name = &sym[..end];
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(unicode_ident::is_xid_start)
        && chars.all(unicode_ident::is_xid_continue);
    valid.then_some(name)
}

/// Shortens a demangled symbol to the function it names, dropping the module
/// path and generic arguments.
fn get_function_name(s: &str) -> &str {
    let mut word_start = 0usize;
    let mut word_end = 0usize;
    let mut angle_nesting_level = 0u64;
    let mut curly_nesting_level = 0u64;
    let mut potential_function_arrow = false;
    let mut inside_word = false;

    for (i, c) in s.char_indices() {
        if curly_nesting_level == 0 && angle_nesting_level == 0 {
            if !inside_word && unicode_ident::is_xid_start(c) {
                word_start = i;
                inside_word = true;
            } else if inside_word && !unicode_ident::is_xid_continue(c) {
                word_end = i;
                inside_word = false;
            }
        }

        let was_potential_function_arrow = potential_function_arrow;
        potential_function_arrow = c == '-';

        if c == '<' {
            angle_nesting_level = angle_nesting_level.saturating_add(1);
        } else if c == '>' && !was_potential_function_arrow {
            angle_nesting_level = angle_nesting_level.saturating_sub(1);
        } else if c == '{' {
            curly_nesting_level = curly_nesting_level.saturating_add(1);
            if !inside_word && curly_nesting_level == 1 && angle_nesting_level == 0 {
                word_start = i;
                inside_word = true;
            }
        } else if c == '}' {
            curly_nesting_level = curly_nesting_level.saturating_sub(1);
            if inside_word && curly_nesting_level == 0 {
                word_end = i + 1;
                inside_word = false;
            }
        }
    }

    if word_start < word_end {
        &s[word_start..word_end]
    } else {
        &s[word_start..]
    }
}

/// Keeps the frames that survive `filter`, innermost first.
fn filter_frames(frames: Vec<NativeFrame>, filter: &TraceFilter) -> (Vec<NativeFrame>, usize) {
    let total = frames.len();
    let mut kept: Vec<NativeFrame> = frames
        .into_iter()
        .skip_while(|frame| frame.is_from(filter.skipped_initial_crates))
        .collect();

    while kept
        .last()
        .is_some_and(|frame| frame.is_from(filter.skipped_final_crates) || frame.is_process_entry())
    {
        kept.pop();
    }
    kept.truncate(filter.max_frame_count);

    let omitted = total - kept.len();
    (kept, omitted)
}

/// Captures the current call stack as a [`Traceback`].
///
/// Frames without a symbol name or file name are ignored. Returns `None` if
/// no frame survives the filter.
pub fn capture_traceback(filter: &TraceFilter) -> Option<Traceback> {
    let mut frames: Vec<NativeFrame> = Vec::new();

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            let (Some(sym), Some(filename_raw)) = (symbol.name(), symbol.filename_raw()) else {
                return;
            };
            frames.push(NativeFrame {
                sym_demangled: format!("{sym:#}"),
                path: FramePath::new(filename_raw),
                lineno: symbol.lineno(),
            });
        });
        true
    });

    let (kept, omitted) = filter_frames(frames, filter);
    tracing::trace!(kept = kept.len(), omitted, "captured native stack trace");
    if kept.is_empty() {
        return None;
    }

    let show_full_path = filter.show_full_path;
    Some(Traceback::from_frames(
        kept.into_iter()
            .rev()
            .map(|frame| frame.into_trace_frame(show_full_path)),
    ))
}

/// Extension trait for attaching native stack traces to exceptions.
///
/// An exception that already has a traceback keeps it.
///
/// ```rust
/// use faultfmt::exception::Exception;
/// use faultfmt_backtrace::{ExceptionBacktraceExt, TraceFilter};
///
/// let exception = Exception::new("TimeoutError", "upstream timed out")
///     .with_backtrace_filter(&TraceFilter::FULL);
/// assert!(exception.traceback().is_some());
/// ```
pub trait ExceptionBacktraceExt: Sized {
    /// Attaches a stack trace filtered with [`TraceFilter::new_from_env`].
    fn with_backtrace(self) -> Self {
        self.with_backtrace_filter(&TraceFilter::new_from_env())
    }

    /// Attaches a stack trace filtered with `filter`.
    fn with_backtrace_filter(self, filter: &TraceFilter) -> Self;
}

impl ExceptionBacktraceExt for Exception {
    fn with_backtrace_filter(mut self, filter: &TraceFilter) -> Self {
        if self.traceback().is_none()
            && let Some(traceback) = capture_traceback(filter)
        {
            self.set_traceback(traceback);
        }
        self
    }
}

impl<T> ExceptionBacktraceExt for Result<T, Exception> {
    fn with_backtrace_filter(self, filter: &TraceFilter) -> Self {
        self.map_err(|exception| exception.with_backtrace_filter(filter))
    }
}
