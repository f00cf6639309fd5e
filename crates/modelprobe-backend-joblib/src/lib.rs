use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use modelprobe_core::{FeatureReport, Inspector, ModelArtifact};
use modelprobe_pickle::{joblib, Value};
use tracing::{debug, info, warn};

const FEATURE_NAMES_ATTR: &str = "feature_names_in_";

/// Reads `feature_names_in_` from a scikit-learn estimator saved with joblib.
#[derive(Clone, Debug, Default)]
pub struct JoblibInspector {
    include_params: bool,
}

impl JoblibInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also list the estimator's state attributes.
    pub fn with_params(mut self, include_params: bool) -> Self {
        self.include_params = include_params;
        self
    }
}

impl Inspector for JoblibInspector {
    type Report = FeatureReport;

    fn name(&self) -> &'static str {
        "joblib"
    }

    fn inspect(&self, artifact: &ModelArtifact) -> Result<Self::Report> {
        let ModelArtifact::JoblibPath(path) = artifact else {
            bail!("joblib inspector expects a joblib or pickle file path");
        };

        let (root, primary_failure) = load_estimator(path)?;
        debug!(root = root.type_name(), "estimator loaded");

        let features = feature_names(&root)?;
        match &features {
            Some(names) => info!(count = names.len(), "found feature names"),
            None => info!("estimator carries no feature names"),
        }

        let params = self.include_params.then(|| {
            root.attrs()
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        });

        Ok(FeatureReport {
            primary_failure,
            features,
            params,
        })
    }
}

/// Tries the joblib reader first, then a plain pickle load of the same file.
///
/// Returns the root value and, when the fallback was used, why the joblib
/// reader gave up.
pub fn load_estimator(path: &Path) -> Result<(Value, Option<String>)> {
    let primary = match joblib::load(path) {
        Ok(root) => return Ok((root, None)),
        Err(err) => err,
    };
    warn!(path = %path.display(), error = %primary, "joblib.load failed, trying plain pickle");

    let root = modelprobe_pickle::load_file(path).with_context(|| {
        format!(
            "failed to load {} (joblib.load failed: {primary})",
            path.display()
        )
    })?;
    Ok((root, Some(primary.to_string())))
}

/// `feature_names_in_` as an ordered list, or `None` when the attribute is
/// absent.
pub fn feature_names(root: &Value) -> Result<Option<Vec<String>>> {
    let Some(value) = lookup_feature_names(root) else {
        return Ok(None);
    };

    let names = match value {
        Value::NdArray(array) => array
            .to_strings()
            .with_context(|| format!("cannot read {FEATURE_NAMES_ATTR}"))?,
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    anyhow!(
                        "{FEATURE_NAMES_ATTR} holds a {}, not a string",
                        item.type_name()
                    )
                })
            })
            .collect::<Result<_>>()?,
        other => bail!(
            "{FEATURE_NAMES_ATTR} is a {}, expected an array of strings",
            other.type_name()
        ),
    };
    Ok(Some(names))
}

/// Finds `feature_names_in_` on an estimator, following the properties
/// through which `Pipeline` (first step) and search estimators such as
/// `GridSearchCV` (`best_estimator_`) expose it.
fn lookup_feature_names(estimator: &Value) -> Option<&Value> {
    if let Some(names) = estimator.attr(FEATURE_NAMES_ATTR) {
        return Some(names);
    }
    if let Some(steps) = estimator.attr("steps").and_then(Value::as_seq) {
        let first = steps.first()?.as_seq()?.get(1)?;
        debug!(step = %first, "following pipeline to its first step");
        return lookup_feature_names(first);
    }
    let best = estimator.attr("best_estimator_")?;
    debug!(estimator = %best, "following best_estimator_");
    lookup_feature_names(best)
}
