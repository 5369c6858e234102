//! Flattens `#include` directives so the driver only ever sees one source
//! string per stage.
//!
//! Directives occupy their own line and name a logical resource:
//!
//! ```text
//! #include lighting
//! #include <lighting>
//! #include "lighting"
//! ```
//!
//! The directive line (and its line terminator) is replaced by the resource
//! text, and expansion continues inside the included text before the rest of
//! the including file. That yields the same output as repeatedly replacing the
//! leftmost remaining directive, but walks an explicit stack of open resources
//! so self-referential include graphs are reported instead of recursing
//! forever.
use std::collections::BTreeMap;
use std::io;

use crate::error::PreprocessError;

/// Supplies raw shader text for a logical resource name.
///
/// Implementations decide how names map to storage (file extension, search
/// roots, embedded tables). A missing resource should surface as
/// [`io::ErrorKind::NotFound`].
pub trait SourceLoader {
    fn load_source(&self, name: &str) -> io::Result<String>;
}

impl<L: SourceLoader + ?Sized> SourceLoader for &L {
    fn load_source(&self, name: &str) -> io::Result<String> {
        (**self).load_source(name)
    }
}

/// In-memory resource table, handy for embedded shaders and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: BTreeMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn load_source(&self, name: &str) -> io::Result<String> {
        self.sources.get(name).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded shader named '{name}'"),
            )
        })
    }
}

/// Loads `name` through `loader` and inflates its includes.
pub fn load_and_inflate(
    loader: &dyn SourceLoader,
    name: &str,
) -> Result<String, PreprocessError> {
    let raw = loader
        .load_source(name)
        .map_err(|source| PreprocessError::Missing {
            name: name.to_string(),
            source,
        })?;
    if raw.trim().is_empty() {
        return Err(PreprocessError::EmptySource {
            name: name.to_string(),
        });
    }
    inflate(Some(name), &raw, loader)
}

/// Inflates includes in an anonymous source string.
///
/// Text without directives is returned unchanged.
pub fn inflate_includes(
    source: &str,
    loader: &dyn SourceLoader,
) -> Result<String, PreprocessError> {
    inflate(None, source, loader)
}

struct Frame {
    name: Option<String>,
    text: String,
    cursor: usize,
}

fn inflate(
    root: Option<&str>,
    source: &str,
    loader: &dyn SourceLoader,
) -> Result<String, PreprocessError> {
    if !source.lines().any(|line| parse_directive(line).is_some()) {
        return Ok(source.to_string());
    }

    let mut output = String::with_capacity(source.len());
    let mut stack = vec![Frame {
        name: root.map(str::to_string),
        text: source.to_string(),
        cursor: 0,
    }];

    loop {
        let (target, terminated) = {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.cursor >= frame.text.len() {
                stack.pop();
                continue;
            }

            let start = frame.cursor;
            let rest = &frame.text[start..];
            let (line_end, next) = match rest.find('\n') {
                Some(offset) => (start + offset, start + offset + 1),
                None => (frame.text.len(), frame.text.len()),
            };
            frame.cursor = next;
            let line = &frame.text[start..line_end];

            match parse_directive(line) {
                None => {
                    output.push_str(&frame.text[start..next]);
                    continue;
                }
                Some("") => {
                    return Err(PreprocessError::MalformedDirective {
                        resource: frame.name.clone().unwrap_or_else(|| "<inline>".into()),
                        line: line.to_string(),
                    });
                }
                Some(target) => (target.to_string(), next > line_end),
            }
        };

        if stack.iter().any(|frame| frame.name.as_deref() == Some(target.as_str())) {
            let mut chain: Vec<&str> = stack
                .iter()
                .filter_map(|frame| frame.name.as_deref())
                .collect();
            chain.push(&target);
            return Err(PreprocessError::CircularInclude {
                chain: chain.join(" -> "),
                name: target,
            });
        }

        let mut text = loader
            .load_source(&target)
            .map_err(|source| PreprocessError::Missing {
                name: target.clone(),
                source,
            })?;
        if terminated && !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        tracing::trace!(include = %target, depth = stack.len(), "inflating include");
        stack.push(Frame {
            name: Some(target),
            text,
            cursor: 0,
        });
    }

    Ok(output)
}

/// Returns the include target if `line` is a directive. An empty target marks a
/// directive without a resource name.
fn parse_directive(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    if !rest.is_empty()
        && !rest.starts_with(char::is_whitespace)
        && !rest.starts_with('<')
        && !rest.starts_with('"')
    {
        return None;
    }

    let target = rest.trim();
    let unquoted = target
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .or_else(|| {
            target
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
        })
        .unwrap_or(target);
    Some(unquoted.trim())
}
