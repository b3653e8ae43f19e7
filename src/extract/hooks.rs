//! Extraction callbacks.
//!
//! An [`ExtractionHooks`] implementation observes every embedded object the
//! engine finds. `before_extract` may veto a single object by setting
//! [`BeforeExtract::cancel`]; the traversal itself always continues.
//! A hook that returns an error turns the current object into a failure.

use crate::classify::ObjectClassification;
use crate::common::error::Error;
use crate::container::ContainerNode;
use std::path::Path;

/// Error returned by a hook
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

pub type HookResult = std::result::Result<(), HookError>;

/// Raised before an object is copied out.
#[derive(Debug)]
pub struct BeforeExtract<'a> {
    pub node: &'a ContainerNode,
    pub classification: &'a ObjectClassification,
    /// `top > path > nested path` label of the object
    pub embedding_path: &'a str,
    /// Set to skip this object. It is then neither extracted nor searched
    /// and no failure is recorded.
    pub cancel: bool,
}

/// Raised after an object was written to its output file.
#[derive(Debug)]
pub struct AfterExtract<'a> {
    pub node: &'a ContainerNode,
    pub classification: &'a ObjectClassification,
    pub embedding_path: &'a str,
    pub output: &'a Path,
}

/// Raised when an object could not be extracted or searched.
#[derive(Debug)]
pub struct ExtractFailure<'a> {
    pub node: &'a ContainerNode,
    /// `None` when the node failed before it was classified
    pub classification: Option<&'a ObjectClassification>,
    pub embedding_path: &'a str,
    pub error: &'a Error,
    /// Advisory: the failure is recorded either way and siblings are still
    /// visited
    pub cancel: bool,
}

/// Callbacks raised during extraction. All methods default to no-ops.
///
/// Hooks are shared by concurrent calls into one extractor and must be
/// `Send + Sync`.
pub trait ExtractionHooks: Send + Sync {
    fn before_extract(&self, _event: &mut BeforeExtract<'_>) -> HookResult {
        Ok(())
    }

    fn after_extract(&self, _event: &AfterExtract<'_>) -> HookResult {
        Ok(())
    }

    fn on_error(&self, _event: &mut ExtractFailure<'_>) -> HookResult {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ExtractionHooks for NoHooks {}
