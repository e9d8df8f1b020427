mod annotated;
mod checks;
mod compat;
mod config;
mod diagnostics;
mod engine;
mod flow;
mod ir;
mod lattice;
mod location;
mod substitute;
mod telemetry;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use serde_sarif::sarif::{
    Artifact, ArtifactLocation, Invocation, PropertyBag, Run, SCHEMA_URL, Sarif, Tool,
    ToolComponent,
};

use crate::config::AnalysisConfig;
use crate::engine::{Engine, build_context_with_timings};
use crate::ir::CompilationUnit;
use crate::telemetry::{Telemetry, init_logging};

/// CLI arguments for nullspect execution.
#[derive(Parser, Debug)]
#[command(
    name = "nullspect",
    about = "Fast, deterministic SARIF output for nullness analysis of resolved Java type graphs.",
    version
)]
struct Cli {
    /// A compilation-unit JSON file, or a directory of them.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long, value_name = "URL")]
    otlp_endpoint: Option<String>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    let telemetry = match &cli.otlp_endpoint {
        Some(endpoint) => Some(Arc::new(Telemetry::new(endpoint.clone())?)),
        None => None,
    };

    let started_at = Instant::now();
    let load_started_at = Instant::now();
    let units = load_units(&cli.input)?;
    let load_duration_ms = load_started_at.elapsed().as_millis();
    let unit_count = units.len();
    let class_count: usize = units.iter().map(|unit| unit.classes.len()).sum();
    let artifacts = unit_artifacts(&units);

    let (context, timings) = build_context_with_timings(units, config, telemetry.clone());
    let engine = Engine::new();
    let output = engine.analyze(&context)?;

    let invocation_stats = InvocationStats {
        load_duration_ms,
        type_cache_duration_ms: timings.type_cache_duration_ms,
        contract_duration_ms: timings.contract_duration_ms,
        unit_count,
        class_count,
        error_count: output.error_count,
        warning_count: output.warning_count,
    };
    let invocation = build_invocation(&invocation_stats);
    let sarif = build_sarif(artifacts, invocation, output.rules, output.results);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif).context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} load_ms={} types_ms={} contracts_ms={} units={} classes={}",
            started_at.elapsed().as_millis(),
            load_duration_ms,
            timings.type_cache_duration_ms,
            timings.contract_duration_ms,
            unit_count,
            class_count
        );
    }

    if let Some(telemetry) = telemetry {
        telemetry.shutdown()?;
    }

    Ok(())
}

/// Load one unit, or every `.json` file in a directory, in path order.
fn load_units(input: &Path) -> Result<Vec<CompilationUnit>> {
    let mut paths = Vec::new();
    if input.is_dir() {
        for entry in fs::read_dir(input)
            .with_context(|| format!("failed to read directory {}", input.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        if paths.is_empty() {
            anyhow::bail!("no .json compilation units under {}", input.display());
        }
    } else {
        paths.push(input.to_path_buf());
    }

    let mut units = Vec::new();
    for path in paths {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let deserializer = &mut serde_json::Deserializer::from_str(&contents);
        let unit: CompilationUnit = serde_path_to_error::deserialize(deserializer)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        units.push(unit);
    }
    Ok(units)
}

fn unit_artifacts(units: &[CompilationUnit]) -> Vec<Artifact> {
    units
        .iter()
        .map(|unit| {
            Artifact::builder()
                .location(ArtifactLocation::builder().uri(unit.path.clone()).build())
                .build()
        })
        .collect()
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// Metadata captured for SARIF invocation properties.
struct InvocationStats {
    load_duration_ms: u128,
    type_cache_duration_ms: u128,
    contract_duration_ms: u128,
    unit_count: usize,
    class_count: usize,
    error_count: usize,
    warning_count: usize,
}

fn build_invocation(stats: &InvocationStats) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");
    let mut properties = BTreeMap::new();
    properties.insert(
        "nullspect.load_ms".to_string(),
        json!(stats.load_duration_ms),
    );
    properties.insert(
        "nullspect.types_ms".to_string(),
        json!(stats.type_cache_duration_ms),
    );
    properties.insert(
        "nullspect.contracts_ms".to_string(),
        json!(stats.contract_duration_ms),
    );
    properties.insert("nullspect.unit_count".to_string(), json!(stats.unit_count));
    properties.insert(
        "nullspect.class_count".to_string(),
        json!(stats.class_count),
    );
    properties.insert(
        "nullspect.error_count".to_string(),
        json!(stats.error_count),
    );
    properties.insert(
        "nullspect.warning_count".to_string(),
        json!(stats.warning_count),
    );

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .properties(
            PropertyBag::builder()
                .additional_properties(properties)
                .build(),
        )
        .build()
}

fn build_sarif(
    artifacts: Vec<Artifact>,
    invocation: Invocation,
    rules: Vec<serde_sarif::sarif::ReportingDescriptor>,
    results: Vec<serde_sarif::sarif::Result>,
) -> Sarif {
    let driver = if rules.is_empty() {
        ToolComponent::builder()
            .name("nullspect")
            .information_uri("https://github.com/exoego/nullspect")
            .build()
    } else {
        ToolComponent::builder()
            .name("nullspect")
            .information_uri("https://github.com/exoego/nullspect")
            .rules(rules)
            .build()
    };
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let invocation = build_invocation(&InvocationStats {
            load_duration_ms: 0,
            type_cache_duration_ms: 0,
            contract_duration_ms: 0,
            unit_count: 0,
            class_count: 0,
            error_count: 0,
            warning_count: 0,
        });
        let sarif = build_sarif(Vec::new(), invocation, Vec::new(), Vec::new());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "nullspect");
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
    }

    #[test]
    fn analysis_of_a_unit_produces_results_with_rule_ids() {
        let json_unit = serde_json::json!({
            "path": "com/example/Sample.java",
            "package": "com.example",
            "classes": [{
                "name": "com.example.Sample",
                "span": { "line": 1 },
                "fields": [{
                    "name": "value",
                    "ty": {
                        "annotations": [{ "name": "NonNull", "span": { "line": 3 } }],
                        "shape": { "Named": { "name": "java.lang.String" } },
                        "span": { "line": 3 }
                    },
                    "init": { "Null": { "span": { "line": 3 } } },
                    "span": { "line": 3 }
                }]
            }]
        });
        let unit: CompilationUnit =
            serde_json::from_value(json_unit).expect("parse compilation unit");
        let (context, _) = build_context_with_timings(vec![unit], AnalysisConfig::default(), None);
        let output = Engine::new().analyze(&context).expect("analyze");
        assert_eq!(output.error_count, 1);
        assert_eq!(output.warning_count, 0);
        let value = serde_json::to_value(&output.results[0]).expect("serialize result");
        assert_eq!(value["ruleId"], "NULL_TYPE_MISMATCH");
        assert_eq!(
            value["message"]["text"],
            "Null type mismatch: required '@NonNull String' but the provided value is null"
        );
    }

    #[test]
    fn load_units_reports_precise_parse_errors() {
        let dir = std::env::temp_dir().join(format!("nullspect-test-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("broken.json");
        fs::write(&path, "{\"path\": 42}").expect("write broken unit");
        let error = load_units(&path).expect_err("parse must fail");
        assert!(error.to_string().contains("broken.json"));
        fs::remove_dir_all(&dir).expect("cleanup temp dir");
    }
}
