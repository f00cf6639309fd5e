use anyhow::Result;
use modelprobe_backend_joblib::JoblibInspector;
use modelprobe_backend_onnx::OnnxInspector;
use modelprobe_core::{Inspector, ModelArtifact, Report};
use tracing::info;

/// Inspector choices that depend on the command line rather than the artifact.
#[derive(Clone, Copy, Debug, Default)]
pub struct InspectOptions {
    pub params: bool,
}

/// Routes an artifact to the inspector that understands it.
pub fn inspect(artifact: &ModelArtifact, options: InspectOptions) -> Result<Box<dyn Report>> {
    match artifact {
        ModelArtifact::OnnxPath(_) => run(&OnnxInspector::new(), artifact),
        ModelArtifact::JoblibPath(_) => run(
            &JoblibInspector::new().with_params(options.params),
            artifact,
        ),
    }
}

fn run<I: Inspector>(inspector: &I, artifact: &ModelArtifact) -> Result<Box<dyn Report>> {
    info!(
        inspector = inspector.name(),
        path = %artifact.path().display(),
        "inspecting model artifact"
    );
    let report = inspector.inspect(artifact)?;
    Ok(Box::new(report))
}
