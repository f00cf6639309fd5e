use std::collections::HashSet;

use crate::Shape;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

#[derive(Clone, Debug, PartialEq)]
pub struct TensorSpec {
    pub name: IOName,
    /// Raw `TensorProto.DataType` code, resolved to a name only when printed.
    pub elem_type: i32,
    pub shape: Shape,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelHeader {
    pub ir_version: i64,
    pub producer_name: String,
    pub producer_version: String,
    /// `(domain, version)`; the empty domain is the default ONNX opset.
    pub opsets: Vec<(String, i64)>,
}

/// Everything the graph inspector reports, in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphReport {
    pub header: ModelHeader,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    pub initializers: Vec<TensorSpec>,
    pub nodes: Vec<NodeSpec>,
}

impl GraphReport {
    /// Declared inputs that also appear as constant initializers.
    pub fn shadowed_inputs(&self) -> Vec<&TensorSpec> {
        let initializer_names: HashSet<&str> = self
            .initializers
            .iter()
            .map(|init| init.name.0.as_str())
            .collect();

        self.inputs
            .iter()
            .filter(|input| initializer_names.contains(input.name.0.as_str()))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureReport {
    /// Why the primary loader gave up, when the fallback had to be used.
    pub primary_failure: Option<String>,
    /// `None` when the estimator carries no `feature_names_in_`.
    pub features: Option<Vec<String>>,
    /// `(attribute, repr)` pairs, only collected on request.
    pub params: Option<Vec<(String, String)>>,
}
