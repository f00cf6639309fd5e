use std::io::{self, Write};

use crate::{DataTypeTable, FeatureReport, GraphReport, ModelHeader, Report, TensorSpec};

const RULE_WIDTH: usize = 50;

impl Report for FeatureReport {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        if let Some(reason) = &self.primary_failure {
            writeln!(out, "joblib.load failed: {reason}")?;
            writeln!(out, "Trying plain pickle...")?;
        }

        match &self.features {
            Some(features) => {
                writeln!(out, "\nModel input features:")?;
                for feature in features {
                    writeln!(out, "{feature}")?;
                }
            }
            None => writeln!(out, "No feature_names_in_ attribute found in the model.")?,
        }

        if let Some(params) = &self.params {
            writeln!(out, "\nModel parameters:")?;
            if params.is_empty() {
                writeln!(out, "No parameters found in the model.")?;
            }
            for (key, value) in params {
                writeln!(out, "{key}: {value}")?;
            }
        }
        Ok(())
    }
}

impl Report for GraphReport {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        let table = DataTypeTable::new();

        write_header(out, &self.header)?;

        writeln!(out, "Model Inputs:")?;
        for input in &self.inputs {
            write_value_info(out, &table, "Input", input)?;
        }

        writeln!(out, "Model Outputs:")?;
        for output in &self.outputs {
            write_value_info(out, &table, "Output", output)?;
        }

        writeln!(out, "\n Model Initializers (Possible Missing Inputs):")?;
        for init in &self.initializers {
            writeln!(
                out,
                "Initializer Name: {}, Shape: {}, Data Type: {}",
                init.name.0,
                init.shape,
                table.name(init.elem_type)
            )?;
        }

        for input in self.shadowed_inputs() {
            writeln!(
                out,
                "\u{26a0}\u{fe0f} Warning: Input {} is actually an initializer (constant).",
                input.name.0
            )?;
        }

        writeln!(out, "\n Model Nodes:")?;
        for node in &self.nodes {
            writeln!(
                out,
                "Node: {}, Inputs: {}, Outputs: {}",
                node.op_type,
                py_list(&node.inputs),
                py_list(&node.outputs)
            )?;
        }
        Ok(())
    }
}

fn write_header(out: &mut dyn Write, header: &ModelHeader) -> io::Result<()> {
    let producer = match (
        header.producer_name.is_empty(),
        header.producer_version.is_empty(),
    ) {
        (true, _) => "unknown".to_string(),
        (false, true) => header.producer_name.clone(),
        (false, false) => format!("{} {}", header.producer_name, header.producer_version),
    };
    let opsets = header
        .opsets
        .iter()
        .map(|(domain, version)| format!("{domain}:{version}"))
        .collect::<Vec<_>>()
        .join(", ");

    writeln!(
        out,
        "Model: ir_version={}, producer={producer}, opsets=[{opsets}]",
        header.ir_version
    )
}

/// `repr()` of a Python list of strings.
fn py_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| py_str(s)).collect();
    format!("[{}]", quoted.join(", "))
}

fn py_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn write_value_info(
    out: &mut dyn Write,
    table: &DataTypeTable,
    label: &str,
    spec: &TensorSpec,
) -> io::Result<()> {
    writeln!(out, " {label} Name: {}", spec.name.0)?;
    writeln!(out, "   Shape: {}", spec.shape)?;
    writeln!(out, "   Data Type: {}", table.name(spec.elem_type))?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}
