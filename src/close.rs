//! Failure-aggregating teardown.

use crate::{Error, Result};

/// Collects failures while releasing a tree of resources, so that one failing
/// release never stops the others.
#[derive(Debug, Default)]
pub(crate) struct Closer {
    errors: Vec<Error>,
}

impl Closer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, result: Result<()>) {
        if let Err(error) = result {
            tracing::warn!(%error, "resource release failed");
            push_flattened(&mut self.errors, error);
        }
    }

    pub(crate) fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    pub(crate) fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(self.errors))
        }
    }
}

/// Append `error` to `errors`, splicing in the members of aggregated errors.
pub(crate) fn push_flattened(errors: &mut Vec<Error>, error: Error) {
    match error {
        Error::Build(inner) | Error::Close(inner) => errors.extend(inner),
        other => errors.push(other),
    }
}

/// Turn build failures, plus whatever failed while releasing the parts that
/// did get built, into one aggregated error.
pub(crate) fn build_failure(errors: Vec<Error>, closer: Closer) -> Error {
    let mut all = Vec::with_capacity(errors.len());
    for error in errors {
        push_flattened(&mut all, error);
    }
    all.extend(closer.into_errors());
    Error::Build(all)
}

// ============================================================================
// Tests
// ============================================================================
