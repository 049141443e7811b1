//! Source files and locations.
//!
//! The AST stores byte-offset spans; diagnostics and runtime error
//! messages want `file:line:column`. A `SourceMap` owns the text of every
//! parsed module together with a line map for offset conversion.

use crate::span::Span;
use serde::Serialize;

/// Identifies a file registered in a `SourceMap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(pub u32);

impl FileId {
    pub const DUMMY: FileId = FileId(u32::MAX);
}

/// A position in a source file (1-indexed line and column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A resolved source location: file plus the line/column range of a span.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub start: Position,
    pub end: Position,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.line, self.start.column)
    }
}

/// Line map for efficient offset to line/column conversion.
/// Stores the starting offset of each line.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Build a line map from source text.
    pub fn build(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }

        LineMap { line_starts }
    }

    /// Convert a byte offset to a 1-indexed position.
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_point) => insert_point.saturating_sub(1),
        };

        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        Position {
            line: line as u32 + 1,
            column: offset.saturating_sub(line_start) + 1,
        }
    }
}

/// One parsed source file.
#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_map: LineMap,
}

/// Owns the text of every file seen during a compilation run.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let text = text.into();
        let line_map = LineMap::build(&text);
        self.files.push(SourceFile {
            name: name.into(),
            text,
            line_map,
        });
        FileId(self.files.len() as u32 - 1)
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    /// Resolve a (file, span) pair into a printable location.
    pub fn location(&self, file: FileId, span: Span) -> Location {
        if file == FileId::DUMMY {
            return Location {
                file: "<builtin>".to_owned(),
                start: Position { line: 0, column: 0 },
                end: Position { line: 0, column: 0 },
            };
        }

        let f = self.file(file);
        Location {
            file: f.name.clone(),
            start: f.line_map.position(span.start),
            end: f.line_map.position(span.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_indexed() {
        let map = LineMap::build("ab\ncd\n");
        assert_eq!(map.position(0), Position { line: 1, column: 1 });
        assert_eq!(map.position(1), Position { line: 1, column: 2 });
        assert_eq!(map.position(3), Position { line: 2, column: 1 });
        assert_eq!(map.position(4), Position { line: 2, column: 2 });
    }

    #[test]
    fn source_map_resolves_locations() {
        let mut sm = SourceMap::new();
        let file = sm.add_file("test.sc", "void main() {\n}\n");
        let loc = sm.location(file, Span::new(14, 15));
        assert_eq!(loc.file, "test.sc");
        assert_eq!(loc.start.line, 2);
        assert_eq!(loc.start.column, 1);
        assert_eq!(loc.to_string(), "test.sc:2:1");
    }
}
