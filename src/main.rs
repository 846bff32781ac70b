use clap::{Arg, Command};
use docflow::catalog::Catalog;
use docflow::classifier::CandidateResolver;
use docflow::config::EngineConfig;
use docflow::matching::MatchEvaluator;
use docflow::workflow::WorkflowDefinitions;
use log::LevelFilter;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("docflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Document classification and workflow automation engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/docflow.yaml"),
        )
        .arg(
            Arg::new("workflows")
                .short('w')
                .long("workflows")
                .value_name("FILE")
                .help("Workflow definitions file path")
                .default_value("/etc/docflow-workflows.yaml"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("FILE")
                .help("Entity catalog file (tags, correspondents, document types, storage paths)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate configuration and workflow definitions")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("classify")
                .long("classify")
                .value_name("FILE")
                .help("Classify a text file against the catalog and print suggestions")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match EngineConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        let workflows_path = matches.get_one::<String>("workflows").unwrap();
        test_config(&config, workflows_path, matches.get_one::<String>("catalog"));
        return;
    }

    if let Some(text_file) = matches.get_one::<String>("classify") {
        let catalog_path = match matches.get_one::<String>("catalog") {
            Some(path) => path,
            None => {
                eprintln!("--classify requires --catalog");
                process::exit(1);
            }
        };
        classify_file(&config, catalog_path, text_file).await;
        return;
    }

    eprintln!("Nothing to do; try --test-config or --classify (see --help)");
    process::exit(1);
}

fn generate_default_config(path: &str) {
    let config = EngineConfig::default();
    match config.to_file(path) {
        Ok(()) => println!("Default configuration written to {path}"),
        Err(e) => {
            eprintln!("Error writing configuration: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &EngineConfig, workflows_path: &str, catalog_path: Option<&String>) {
    println!("🔍 Testing configuration...");
    println!("  auto_threshold: {}", config.auto_threshold);
    println!("  auto_timeout: {}s", config.auto_timeout_secs);
    println!("  delivery_timeout: {}s", config.delivery_timeout_secs);
    println!(
        "  smtp: {}",
        config
            .smtp
            .as_ref()
            .map(|s| format!("{}:{}", s.host, s.port))
            .unwrap_or_else(|| "not configured".to_string())
    );

    match WorkflowDefinitions::from_file(workflows_path) {
        Ok(definitions) => {
            let triggers: usize = definitions.workflows.iter().map(|w| w.triggers.len()).sum();
            let actions: usize = definitions.workflows.iter().map(|w| w.actions.len()).sum();
            println!(
                "Workflows: {} ({} triggers, {} actions)",
                definitions.workflows.len(),
                triggers,
                actions
            );
            for workflow in &definitions.workflows {
                let state = if workflow.enabled { "enabled" } else { "disabled" };
                println!("  {} [{}]: {}", workflow.id, state, workflow.name);
            }
        }
        Err(e) => {
            eprintln!("Error loading workflows from {workflows_path}: {e}");
            process::exit(1);
        }
    }

    if let Some(path) = catalog_path {
        match load_catalog(path) {
            Ok(catalog) => println!(
                "Catalog: {} tags, {} correspondents, {} document types, {} storage paths",
                catalog.tags.len(),
                catalog.correspondents.len(),
                catalog.document_types.len(),
                catalog.storage_paths.len()
            ),
            Err(e) => {
                eprintln!("Error loading catalog from {path}: {e}");
                process::exit(1);
            }
        }
    }

    println!("✅ Configuration is valid");
}

async fn classify_file(config: &EngineConfig, catalog_path: &str, text_file: &str) {
    let catalog = match load_catalog(catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error loading catalog: {e}");
            process::exit(1);
        }
    };
    let text = match std::fs::read_to_string(text_file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {text_file}: {e}");
            process::exit(1);
        }
    };

    let evaluator = MatchEvaluator::new()
        .with_auto_threshold(config.auto_threshold as f32)
        .with_auto_timeout(config.auto_timeout());
    let resolver = CandidateResolver::new(evaluator);
    let suggestions = resolver.resolve(&text, &catalog).await;
    let outcome = resolver.outcome(&suggestions);

    for warning in &suggestions.warnings {
        eprintln!("warning: {warning}");
    }
    match serde_json::to_string_pretty(&serde_json::json!({
        "suggestions": suggestions,
        "outcome": outcome,
    })) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing result: {e}");
            process::exit(1);
        }
    }
}

fn load_catalog(path: &str) -> anyhow::Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    let catalog: Catalog = serde_yaml::from_str(&content)?;
    Ok(catalog)
}
