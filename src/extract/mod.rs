//! Extraction engine.
//!
//! [`Extractor`] walks a container depth-first in the container's own child
//! order, classifies every node, and copies embedded objects to a
//! destination directory. Objects that are documents themselves are opened
//! and searched in turn, up to [`ExtractOptions::max_depth`] levels deep.
//!
//! Per container the engine moves through
//!
//! ```text
//! Init -> ProtectionCheck -> Traversing -> Done
//!               |
//!               +-> Failed (protected)
//! ```
//!
//! A protected *input* fails the whole call with [`Error::Protected`]
//! before anything is written. Every other problem (corrupt embedding,
//! protected nested document, failing hook, depth limit) is recorded as a
//! [`NodeFailure`] and the traversal continues with the next sibling.
//!
//! # Labels
//!
//! Objects are identified in failures and hook events by their embedding
//! path: the input name followed by the node path in each container,
//! separated by ` > `, e.g. `report.docx > word/embeddings/oleObject1.bin >
//! ObjectPool/_1234`. Control characters in node names are written as
//! `\xNN`.

mod hooks;
mod naming;
mod options;
pub mod protection;
mod report;


pub use hooks::{
    AfterExtract, BeforeExtract, ExtractFailure, ExtractionHooks, HookError, HookResult, NoHooks,
};
pub use options::ExtractOptions;
pub use protection::ProtectionKind;
pub use report::{ExtractionReport, NodeFailure};

use crate::cfb::is_compound_file;
use crate::classify::{Classifier, LogicalType, ObjectClassification, SIGNATURE_PEEK_LEN};
use crate::common::buffer::SpillBuffer;
use crate::common::error::{Error, Result};
use crate::container::{self, Container, ContainerFormat, ContainerNode};
use naming::OutputNamer;
use report::ReportBuilder;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Label of the input when the caller hands in a container directly
const CONTAINER_LABEL: &str = "<container>";

/// Embedded object extractor.
///
/// One extractor can serve any number of calls, also concurrently: all
/// per-call state lives in the call.
///
/// # Examples
///
/// ```no_run
/// use embex::{ExtractOptions, Extractor};
///
/// let extractor = Extractor::new(ExtractOptions::new().with_max_depth(1))?;
/// let report = extractor.extract_file("budget.xlsx", "attachments")?;
/// assert!(report.is_clean());
/// # Ok::<(), embex::Error>(())
/// ```
pub struct Extractor {
    options: ExtractOptions,
    classifier: Classifier,
    hooks: Box<dyn ExtractionHooks>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Where in the nesting a container sits
struct Scope {
    depth: usize,
    /// Embedding path of the container itself
    label: String,
}

impl Scope {
    fn label_for(&self, path: &str) -> String {
        let mut label = String::with_capacity(self.label.len() + path.len() + 3);
        label.push_str(&self.label);
        label.push_str(" > ");
        push_escaped(&mut label, path);
        label
    }
}

/// Per-call state
struct Session {
    namer: OutputNamer,
    report: ReportBuilder,
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_control() && (c as u32) < 0x100 {
            let _ = write!(out, "\\x{:02X}", c as u32);
        } else {
            out.push(c);
        }
    }
}

/// Attach the node to a failed byte copy.
fn copy_failure(label: &str, error: Error) -> Error {
    match error {
        Error::Io(source) => Error::CopyFailure {
            node: label.to_string(),
            source,
        },
        other => other,
    }
}

/// Key of a node in the visited set. Part names compare without case.
fn visit_key(format: ContainerFormat, path: &str) -> String {
    match format {
        ContainerFormat::Package => path.to_lowercase(),
        ContainerFormat::Compound => path.to_string(),
    }
}

fn hook_error(error: HookError) -> Error {
    Error::Hook(error.to_string())
}

/// Move the buffer into a freshly claimed output file. A partially written
/// output is removed again and its sequence number stays free.
fn persist(namer: &mut OutputNamer, buffer: &mut SpillBuffer, ext: &str) -> io::Result<PathBuf> {
    let (path, mut file) = namer.claim(ext)?;
    let written = buffer.persist_to(&mut file).and_then(|_| file.flush());
    match written {
        Ok(()) => {
            namer.commit();
            Ok(path)
        },
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(&path);
            Err(e)
        },
    }
}

impl Extractor {
    /// Create an extractor. Fails with [`Error::InvalidOptions`] when the
    /// options cannot produce output names.
    pub fn new(options: ExtractOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            classifier: Classifier::new(&options),
            options,
            hooks: Box::new(NoHooks),
        })
    }

    /// Replace the hooks.
    pub fn with_hooks(mut self, hooks: impl ExtractionHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract all embedded objects of the file at `path` into `dest`.
    ///
    /// `dest` is created when the first object is written.
    pub fn extract_file(
        &self,
        path: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<ExtractionReport> {
        let path = path.as_ref();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path)?;
        let mut container = container::open(BufReader::new(file))?;
        self.run(container.as_mut(), label, dest.as_ref())
    }

    /// Extract from a compound file or package held by any seekable reader.
    pub fn extract_reader<R: Read + Seek>(
        &self,
        reader: R,
        dest: impl AsRef<Path>,
    ) -> Result<ExtractionReport> {
        let mut container = container::open(reader)?;
        self.run(container.as_mut(), CONTAINER_LABEL.to_string(), dest.as_ref())
    }

    /// Extract from an already opened container.
    pub fn extract(
        &self,
        container: &mut dyn Container,
        dest: impl AsRef<Path>,
    ) -> Result<ExtractionReport> {
        self.run(container, CONTAINER_LABEL.to_string(), dest.as_ref())
    }

    fn run(&self, container: &mut dyn Container, label: String, dest: &Path) -> Result<ExtractionReport> {
        if let Some(kind) = protection::detect(container)? {
            warn!(input = %label, protection = %kind, "input is password protected");
            return Err(Error::Protected { kind });
        }

        let mut session = Session {
            namer: OutputNamer::new(dest, &self.options.file_stem),
            report: ReportBuilder::new(),
        };
        let scope = Scope { depth: 0, label };
        self.traverse(container, &scope, &mut session);

        info!(
            input = %scope.label,
            outputs = session.report.output_count(),
            failures = session.report.failure_count(),
            "extraction finished"
        );
        Ok(session.report.finish())
    }

    /// Walk one container from its root.
    fn traverse(&self, container: &mut dyn Container, scope: &Scope, session: &mut Session) {
        let root = container.root();
        let mut visited = HashSet::from([visit_key(container.format(), &root.path)]);
        self.walk(container, &root, scope, &mut visited, session);
    }

    fn walk(
        &self,
        container: &mut dyn Container,
        parent: &ContainerNode,
        scope: &Scope,
        visited: &mut HashSet<String>,
        session: &mut Session,
    ) {
        let children = match container.children(parent) {
            Ok(children) => children,
            Err(e) => {
                let label = if parent.is_root() {
                    scope.label.clone()
                } else {
                    scope.label_for(&parent.path)
                };
                self.fail(session, &label, parent, None, e);
                return;
            },
        };

        let format = container.format();
        for node in children {
            if !visited.insert(visit_key(format, &node.path)) {
                continue;
            }
            self.visit(container, &node, scope, visited, session);
        }
    }

    fn visit(
        &self,
        container: &mut dyn Container,
        node: &ContainerNode,
        scope: &Scope,
        visited: &mut HashSet<String>,
        session: &mut Session,
    ) {
        let label = scope.label_for(&node.path);
        debug!(label = %label, kind = ?node.kind, "visiting node");

        let classification = match self.classify(container, node, &label) {
            Ok(classification) => classification,
            Err(e) => {
                self.fail(session, &label, node, None, e);
                return;
            },
        };

        if !classification.extractable {
            if node.is_storage() {
                self.walk(container, node, scope, visited, session);
            }
            return;
        }

        // Reported, then extracted as an unknown object all the same
        if classification.ambiguous {
            let error = Error::ClassificationAmbiguous {
                node: label.clone(),
            };
            self.fail(session, &label, node, Some(&classification), error);
        }

        if let Err(e) = self.extract_node(container, node, &classification, scope, &label, session)
        {
            self.fail(session, &label, node, Some(&classification), e);
        }
    }

    fn classify(
        &self,
        container: &mut dyn Container,
        node: &ContainerNode,
        label: &str,
    ) -> Result<ObjectClassification> {
        let format = container.format();
        let prefix = if self.classifier.wants_signature(format, node) {
            let mut prefix = Vec::with_capacity(SIGNATURE_PEEK_LEN);
            container
                .open_stream(node)?
                .take(SIGNATURE_PEEK_LEN as u64)
                .read_to_end(&mut prefix)
                .map_err(|e| copy_failure(label, e.into()))?;
            Some(prefix)
        } else {
            None
        };
        Ok(self.classifier.classify(format, node, prefix.as_deref()))
    }

    fn extract_node(
        &self,
        container: &mut dyn Container,
        node: &ContainerNode,
        classification: &ObjectClassification,
        scope: &Scope,
        label: &str,
        session: &mut Session,
    ) -> Result<()> {
        let mut before = BeforeExtract {
            node,
            classification,
            embedding_path: label,
            cancel: false,
        };
        self.hooks.before_extract(&mut before).map_err(hook_error)?;
        if before.cancel {
            debug!(label = %label, "extraction cancelled by hook");
            return Ok(());
        }

        let mut buffer = SpillBuffer::new_in(self.options.temp_dir.as_deref())
            .map_err(|e| copy_failure(label, e.into()))?;
        container
            .export(node, &mut buffer)
            .map_err(|e| copy_failure(label, e))?;

        let output = persist(&mut session.namer, &mut buffer, classification.extension)
            .map_err(|e| copy_failure(label, e.into()))?;
        session.report.push_output(&output);
        debug!(label = %label, output = %output.display(), "extracted object");

        self.hooks
            .after_extract(&AfterExtract {
                node,
                classification,
                embedding_path: label,
                output: &output,
            })
            .map_err(hook_error)?;

        if self.should_descend(classification, &mut buffer)? {
            self.descend(buffer, scope, label, session)?;
        }
        Ok(())
    }

    fn should_descend(
        &self,
        classification: &ObjectClassification,
        buffer: &mut SpillBuffer,
    ) -> Result<bool> {
        Ok(match classification.logical_type {
            LogicalType::NestedDocument(_) => true,
            LogicalType::NativeObject if self.options.descend_into_native_objects => {
                is_compound_file(&buffer.peek(SIGNATURE_PEEK_LEN)?)
            },
            _ => false,
        })
    }

    /// Search an extracted document for objects of its own.
    fn descend(
        &self,
        mut buffer: SpillBuffer,
        scope: &Scope,
        label: &str,
        session: &mut Session,
    ) -> Result<()> {
        let depth = scope.depth + 1;
        if depth > self.options.max_depth {
            return Err(Error::DepthLimitExceeded {
                depth,
                max: self.options.max_depth,
            });
        }

        buffer.rewind()?;
        let mut nested = container::open(buffer)?;
        if let Some(kind) = protection::detect(nested.as_mut())? {
            return Err(Error::Protected { kind });
        }

        debug!(label = %label, depth, "searching nested document");
        let nested_scope = Scope {
            depth,
            label: label.to_string(),
        };
        self.traverse(nested.as_mut(), &nested_scope, session);
        Ok(())
    }

    fn fail(
        &self,
        session: &mut Session,
        label: &str,
        node: &ContainerNode,
        classification: Option<&ObjectClassification>,
        error: Error,
    ) {
        warn!(label = %label, error = %error, "embedded object failed");

        let mut event = ExtractFailure {
            node,
            classification,
            embedding_path: label,
            error: &error,
            cancel: false,
        };
        if let Err(e) = self.hooks.on_error(&mut event) {
            warn!(label = %label, error = %e, "error hook failed");
        }
        if event.cancel {
            debug!(label = %label, "error hook requested cancel, continuing with siblings");
        }

        session.report.push_failure(label, error);
    }
}
