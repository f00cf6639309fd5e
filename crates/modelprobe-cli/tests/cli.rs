use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use modelprobe_proto::onnx::{
    tensor_shape_proto::{dimension, Dimension},
    type_proto, GraphProto, ModelProto, NodeProto, TensorProto, TensorShapeProto, TypeProto,
    ValueInfoProto,
};
use predicates::prelude::*;
use prost::Message;

fn modelprobe() -> Command {
    cargo_bin_cmd!("modelprobe")
}

fn float_input(name: &str, dims: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: 1,
                shape: Some(TensorShapeProto {
                    dim: dims
                        .iter()
                        .map(|d| Dimension {
                            value: Some(dimension::Value::DimValue(*d)),
                            ..Dimension::default()
                        })
                        .collect(),
                }),
            })),
            ..TypeProto::default()
        }),
        ..ValueInfoProto::default()
    }
}

fn write_onnx(dir: &Path) -> Result<PathBuf> {
    let model = ModelProto {
        ir_version: 8,
        producer_name: "skl2onnx".to_string(),
        graph: Some(GraphProto {
            input: vec![float_input("x", &[1, 4]), float_input("bias", &[4])],
            output: vec![float_input("y", &[1, 4])],
            initializer: vec![TensorProto {
                name: "bias".to_string(),
                data_type: 1,
                dims: vec![4],
                ..TensorProto::default()
            }],
            node: vec![NodeProto {
                op_type: "Add".to_string(),
                input: vec!["x".to_string(), "bias".to_string()],
                output: vec!["y".to_string()],
                ..NodeProto::default()
            }],
            ..GraphProto::default()
        }),
        ..ModelProto::default()
    };
    let path = dir.join("model.onnx");
    std::fs::write(&path, model.encode_to_vec())?;
    Ok(path)
}

/// `LinearRegression` with `feature_names_in_ = ["a", "b"]`, pickled with
/// the given class module and any extra pickled `key, value` state pairs.
fn estimator_pickle(module: &str, extra_state: &[u8]) -> Vec<u8> {
    let mut buf = b"\x80\x02".to_vec();
    buf.extend_from_slice(format!("c{module}\nLinearRegression\n").as_bytes());
    buf.extend_from_slice(b")\x81}(");
    buf.extend_from_slice(b"X\x11\x00\x00\x00feature_names_in_](X\x01\x00\x00\x00aX\x01\x00\x00\x00be");
    buf.extend_from_slice(b"X\x0e\x00\x00\x00n_features_in_K\x02");
    buf.extend_from_slice(extra_state);
    buf.extend_from_slice(b"ub.");
    buf
}

/// `train_score_` holding a joblib array wrapper that records no dtype.
const WRAPPER_WITHOUT_DTYPE: &[u8] = b"X\x0c\x00\x00\x00train_score_\
    cjoblib.numpy_pickle\nNumpyArrayWrapper\n)\x81}(\
    X\x05\x00\x00\x00shapeK\x03\x85X\x05\x00\x00\x00orderX\x01\x00\x00\x00Cub";

#[test]
fn graph_reports_initializer_inputs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_onnx(dir.path())?;

    modelprobe()
        .args(["graph", "--model-path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "Model: ir_version=8, producer=skl2onnx, opsets=[]\nModel Inputs:\n Input Name: x\n",
        ))
        .stdout(predicate::str::contains(
            "Initializer Name: bias, Shape: [4], Data Type: FLOAT\n\
             \u{26a0}\u{fe0f} Warning: Input bias is actually an initializer (constant).\n",
        ))
        .stdout(predicate::str::contains(
            "Node: Add, Inputs: ['x', 'bias'], Outputs: ['y']",
        ));
    Ok(())
}

#[test]
fn malformed_onnx_exits_non_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.onnx");
    std::fs::write(&path, [0x0a, 0xff, 0xff, 0xff])?;

    modelprobe()
        .args(["graph", "--model-path"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("failed to parse ONNX model"));
    Ok(())
}

#[test]
fn missing_default_model_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    modelprobe()
        .current_dir(dir.path())
        .arg("graph")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gbr_best_Y1_compat.onnx"));
    Ok(())
}

#[test]
fn features_lists_names() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lr.joblib");
    std::fs::write(&path, estimator_pickle("sklearn.linear_model._base", b""))?;

    modelprobe()
        .args(["features", "--model-path"])
        .arg(&path)
        .assert()
        .success()
        .stdout("\nModel input features:\na\nb\n");
    Ok(())
}

#[test]
fn features_reads_classes_from_any_module() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lr.joblib");
    std::fs::write(&path, estimator_pickle("__main__", b""))?;

    modelprobe()
        .args(["features", "--model-path"])
        .arg(&path)
        .assert()
        .success()
        .stdout("\nModel input features:\na\nb\n");
    Ok(())
}

#[test]
fn features_falls_back_when_joblib_cannot_read_an_array() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lr.joblib");
    std::fs::write(
        &path,
        estimator_pickle("sklearn.linear_model._base", WRAPPER_WITHOUT_DTYPE),
    )?;

    modelprobe()
        .args(["features", "--model-path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            "joblib.load failed: malformed joblib array wrapper: missing `dtype`\n\
             Trying plain pickle...\n\
             \nModel input features:\na\nb\n",
        )
        .stderr(predicate::str::contains("trying plain pickle"));
    Ok(())
}

#[test]
fn inspect_dispatches_by_extension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pkl = dir.path().join("lr.pkl");
    std::fs::write(&pkl, estimator_pickle("sklearn.linear_model._base", b""))?;
    let onnx = write_onnx(dir.path())?;

    modelprobe()
        .arg("inspect")
        .arg(&pkl)
        .arg("--params")
        .assert()
        .success()
        .stdout(predicate::str::ends_with(
            "\nModel parameters:\nfeature_names_in_: ['a', 'b']\nn_features_in_: 2\n",
        ));

    modelprobe()
        .arg("inspect")
        .arg(&onnx)
        .assert()
        .success()
        .stdout(predicate::str::contains(" Model Nodes:"));
    Ok(())
}

#[test]
fn inspect_rejects_unknown_extensions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("model.h5");
    std::fs::write(&path, b"HDF")?;

    modelprobe()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported model extension: .h5"));
    Ok(())
}

#[test]
fn invalid_log_filter_is_rejected() {
    modelprobe()
        .args(["--log", "modelprobe=loud", "graph"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid log filter"));
}
