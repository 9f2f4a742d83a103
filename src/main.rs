use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use relspace::classifier::ClassifierParams;
use relspace::driver::{self, ExperimentConfig, RunConfiguration, DEFAULT_PARTITION};
use relspace::partition::{gaussian_blobs, Disjointness, TaskPartitioner};
use relspace::projection::Centering;

const DEMO_DATASET: &str = "blobs";
const DEMO_MODEL: &str = "gaussian";

fn build_cli() -> Command {
    Command::new("relspace")
        .about("Relative representation analysis of disjoint-task embeddings")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Log filter, e.g. info or relspace=debug")
                .env("RELSPACE_LOG")
                .default_value("info")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run every configuration of an experiment config file")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Generate a synthetic disjoint-task store and analyse it")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(usize_arg("tasks", "4"))
                .arg(usize_arg("classes", "8"))
                .arg(usize_arg("anchors", "16"))
                .arg(usize_arg("dim", "32"))
                .arg(usize_arg("per-class", "60"))
                .arg(usize_arg("max-epochs", "30"))
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("0")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("disjoint")
                        .long("disjoint")
                        .help("What the tasks are disjoint in")
                        .value_parser(["classes", "samples"])
                        .default_value("classes"),
                )
                .arg(
                    Arg::new("train-on-anchors")
                        .long("train-on-anchors")
                        .help("Add the anchors to every task's train split")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("center")
                        .long("center")
                        .help("Mean-centre every split before projecting")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand_required(true)
        .disable_help_subcommand(true)
}

fn usize_arg(name: &'static str, default: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .default_value(default)
        .value_parser(clap::value_parser!(usize))
}

fn usize_of(matches: &ArgMatches, name: &str) -> usize {
    matches.get_one::<usize>(name).copied().unwrap_or_default()
}

fn run_demo(matches: &ArgMatches) -> anyhow::Result<()> {
    let out = matches.get_one::<PathBuf>("out").context("missing --out")?;
    let num_classes = usize_of(matches, "classes");
    let seed = matches.get_one::<u64>("seed").copied().unwrap_or_default();

    let (train, test) = gaussian_blobs(
        num_classes,
        usize_of(matches, "per-class"),
        usize_of(matches, "dim"),
        1.0,
        seed,
    )?;
    let disjointness = match matches.get_one::<String>("disjoint").map(String::as_str) {
        Some("samples") => Disjointness::Samples,
        _ => Disjointness::Classes,
    };
    let store = TaskPartitioner::new(usize_of(matches, "tasks"), disjointness)
        .with_anchors(usize_of(matches, "anchors"))
        .with_train_on_anchors(matches.get_flag("train-on-anchors"))
        .with_seed(seed)
        .partition(&train, &test, num_classes)?;

    let cfg = demo_config(
        out,
        num_classes,
        usize_of(matches, "max-epochs"),
        matches.get_flag("center"),
    );
    let dir = cfg.dataset_dir(DEMO_DATASET, DEMO_MODEL);
    store
        .save_to_disk(&dir)
        .with_context(|| format!("writing store to {}", dir.display()))?;
    let config_path = out.join("config.json");
    cfg.save(&config_path)?;
    info!("Demo store written to {}", dir.display());

    driver::run(&cfg)?;
    info!("Results written under {}", out.join("results").display());
    Ok(())
}

fn demo_config(out: &Path, num_classes: usize, max_epochs: usize, center: bool) -> ExperimentConfig {
    let results = out.join("results");
    ExperimentConfig {
        data_root: out.join("data"),
        partition: DEFAULT_PARTITION.to_string(),
        dataset_names: vec![DEMO_DATASET.to_string()],
        model_names: vec![DEMO_MODEL.to_string()],
        configurations: vec![RunConfiguration {
            dataset_name: DEMO_DATASET.to_string(),
            model_name: DEMO_MODEL.to_string(),
        }],
        num_total_classes: BTreeMap::from([(DEMO_DATASET.to_string(), num_classes)]),
        num_anchors: None,
        classifier_embed_dim: 64,
        cka_results_path: results.join("cka.json"),
        class_results_path: results.join("class.json"),
        knn_results_path: results.join("knn.json"),
        centering: if center {
            Centering::PerSplit
        } else {
            Centering::Disabled
        },
        train_alignment: Default::default(),
        cka_kernel: Default::default(),
        classifier: ClassifierParams::default().with_max_epochs(max_epochs),
    }
}

fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();
    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    match matches.subcommand() {
        Some(("run", sub)) => {
            let path = sub
                .get_one::<PathBuf>("config")
                .context("missing --config")?;
            let cfg = ExperimentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            driver::run(&cfg)?;
            Ok(())
        }
        Some(("demo", sub)) => run_demo(sub),
        _ => anyhow::bail!("no subcommand given"),
    }
}
