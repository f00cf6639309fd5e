use std::io;

use anyhow::Result;

use crate::ModelArtifact;

/// Plain-text console rendering of an inspection result.
pub trait Report {
    fn render(&self, out: &mut dyn io::Write) -> io::Result<()>;
}

pub trait Inspector {
    type Report: Report + 'static;

    fn name(&self) -> &'static str;

    /// Reads the artifact once and returns everything worth printing.
    fn inspect(&self, artifact: &ModelArtifact) -> Result<Self::Report>;
}
