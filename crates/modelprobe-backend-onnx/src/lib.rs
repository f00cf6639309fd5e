use std::path::Path;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use modelprobe_core::{
    GraphReport, IOName, Inspector, ModelArtifact, ModelHeader, NodeSpec, Shape, TensorSpec,
};
use modelprobe_proto::onnx::{
    tensor_shape_proto::dimension, type_proto, ModelProto, NodeProto, TensorProto,
    ValueInfoProto,
};
use prost::Message;
use tracing::{debug, warn};

pub struct OnnxInspector;

impl OnnxInspector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OnnxInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector for OnnxInspector {
    type Report = GraphReport;

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn inspect(&self, artifact: &ModelArtifact) -> Result<Self::Report> {
        let ModelArtifact::OnnxPath(path) = artifact else {
            bail!("onnx inspector expects an ONNX file path");
        };

        let model = load_model(path)?;
        let report = build_graph_report(&model);

        for input in report.shadowed_inputs() {
            warn!(input = %input.name.0, "graph input is also declared as an initializer");
        }
        Ok(report)
    }
}

/// Reads and decodes a whole `ModelProto`; a malformed document is an error.
pub fn load_model(path: &Path) -> Result<ModelProto> {
    debug!(path = %path.display(), "reading ONNX model");
    let buf = std::fs::read(path)
        .with_context(|| format!("failed to read ONNX model {}", path.display()))?;
    let model = ModelProto::decode(Bytes::from(buf))
        .with_context(|| format!("failed to parse ONNX model {}", path.display()))?;
    debug!(
        ir_version = model.ir_version,
        producer = %model.producer_name,
        "decoded ONNX model"
    );
    Ok(model)
}

pub fn build_graph_report(model: &ModelProto) -> GraphReport {
    let header = ModelHeader {
        ir_version: model.ir_version,
        producer_name: model.producer_name.clone(),
        producer_version: model.producer_version.clone(),
        opsets: model
            .opset_import
            .iter()
            .map(|op| (op.domain.clone(), op.version))
            .collect(),
    };

    let Some(graph) = model.graph.as_ref() else {
        warn!("ONNX model has no graph");
        return GraphReport {
            header,
            ..GraphReport::default()
        };
    };

    GraphReport {
        header,
        inputs: graph.input.iter().map(value_info_spec).collect(),
        outputs: graph.output.iter().map(value_info_spec).collect(),
        initializers: graph.initializer.iter().map(initializer_spec).collect(),
        nodes: graph.node.iter().map(node_spec).collect(),
    }
}

fn value_info_spec(info: &ValueInfoProto) -> TensorSpec {
    let tensor = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(tensor)) => tensor,
        None => {
            debug!(name = %info.name, "value info without a tensor type");
            return TensorSpec {
                name: IOName(info.name.clone()),
                elem_type: 0,
                shape: Shape::default(),
            };
        }
    };

    let shape = tensor
        .shape
        .iter()
        .flat_map(|s| s.dim.iter())
        .map(|dim| match dim.value {
            Some(dimension::Value::DimValue(v)) => Some(v),
            Some(dimension::Value::DimParam(_)) | None => None,
        })
        .collect();

    TensorSpec {
        name: IOName(info.name.clone()),
        elem_type: tensor.elem_type,
        shape,
    }
}

fn initializer_spec(tensor: &TensorProto) -> TensorSpec {
    TensorSpec {
        name: IOName(tensor.name.clone()),
        elem_type: tensor.data_type,
        shape: Shape::fixed(&tensor.dims),
    }
}

fn node_spec(node: &NodeProto) -> NodeSpec {
    NodeSpec {
        name: node.name.clone(),
        op_type: node.op_type.clone(),
        inputs: node.input.clone(),
        outputs: node.output.clone(),
    }
}
