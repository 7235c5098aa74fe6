//! collection of hcl documents ([Body] and path to source file)
//!
//! [HclDocuments] tracks
//! - the source path (and line offsets when the text is known)
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// File name suffix of configuration files inside a module directory
pub const CONFIG_FILE_SUFFIX: &str = ".hcl";

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

impl HclDocuments {
    /// Parses, inserts and indexes an hcl document
    pub fn insert_source(
        &mut self,
        text: &str,
        path: impl Into<Option<PathBuf>>,
    ) -> Result<(), LoadError> {
        let body = hcl_edit::parser::parse_body(text)?;
        self.insert_with_source(body, Source::new(path.into(), Some(text)));
        Ok(())
    }

    fn insert_with_source(&mut self, document: Body, source: Source) {
        let source_index = self.sources.len();
        self.sources.push(source);

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .enumerate()
            .map(|(index, (source_index, attribute))| {
                (index, &self.sources[*source_index], attribute)
            })
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }
}

impl HclDocuments {
    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(path=%file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(&file_path)?;
        self.insert_source(&file_contents, Some(file_path))
    }

    /// Loads every configuration file of a directory, in file name order
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        let read_dir = std::fs::read_dir(dir_path)?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_config_file = dir_entry
                .file_name()
                .to_string_lossy()
                .ends_with(CONFIG_FILE_SUFFIX);
            if !is_config_file {
                continue;
            }

            file_paths.push(dir_entry.path());
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        file_paths.sort();
        for file_path in file_paths {
            self.load_file(&file_path)?;
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("No configuration files found in directory {}", .0.display())]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl file")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document
/// ```
/// # use modgraph::hcl_documents;
/// hcl_documents!("locals { answer = 42 }");
/// ```
///
/// Create from multiple documents (path required)
/// ```
/// # use modgraph::hcl_documents;
/// hcl_documents! {
///   "one.hcl" => "locals { one = 1 }",
///   "two.hcl" => "locals { two = 2 }"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use modgraph::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document without source
    { $expr:expr } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        docs.insert_source($expr, None).expect("body must parse");
        docs
    }};
    // multi document with sources
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert_source($expr, Some($source.into())).expect("body must parse");
        )+

        docs
    }};
}

/// Origin of a document
#[derive(Debug, Default)]
pub struct Source {
    pub path: Option<PathBuf>,
    /// byte offset of every line start, empty when the text is unknown
    line_starts: Vec<usize>,
}

impl Source {
    fn new(path: Option<PathBuf>, text: Option<&str>) -> Self {
        let line_starts = text
            .map(|text| {
                std::iter::once(0)
                    .chain(text.match_indices('\n').map(|(offset, _)| offset + 1))
                    .collect()
            })
            .unwrap_or_default();

        Self { path, line_starts }
    }

    /// Translates a byte span into a 1-based line/column position
    pub fn position(&self, span: Option<Range<usize>>) -> Option<SourcePos> {
        let offset = span?.start;
        if self.line_starts.is_empty() {
            return None;
        }

        let line = self.line_starts.partition_point(|start| *start <= offset);
        let line_start = self.line_starts[line - 1];

        Some(SourcePos {
            file: self.path.clone(),
            line,
            column: offset - line_start + 1,
        })
    }
}

/// A position inside a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file.display(), self.line, self.column),
            None => write!(f, "<input>:{}:{}", self.line, self.column),
        }
    }
}

pub type SourceAttribute<'a> = (usize, &'a Source, &'a Attribute);
pub type SourceBlock<'a> = (usize, &'a Source, &'a Block);

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn iterators() {
        let hcl_documents = hcl_documents! {r#"
        attr_1 = 1
        one two {}
        three four five {}
        attr_2 = 2
        attr_3 = 3
        "#};

        assert_eq!(hcl_documents.attributes().count(), 3);
        assert_eq!(hcl_documents.blocks().count(), 2);
    }

    #[test]
    fn positions() {
        let source = Source::new(Some("main.hcl".into()), Some("a = 1\nbb = 2\n"));

        assert_eq!(
            source.position(Some(6..7)),
            Some(SourcePos {
                file: Some("main.hcl".into()),
                line: 2,
                column: 1
            })
        );
        assert_eq!(source.position(Some(2..3)).map(|pos| pos.column), Some(3));
        assert_eq!(source.position(None), None);
    }

    #[test]
    fn unknown_text_has_no_positions() {
        let source = Source::new(Some("main.hcl".into()), None);
        assert_eq!(source.position(Some(0..1)), None);
    }
}
