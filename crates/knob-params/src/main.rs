//! knob command-line tool for config documents

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use knob_tree::{ConfigTree, DocumentFormat};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let file = || {
        Arg::new("file")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Config document (.json, .yaml or .yml)")
    };
    Command::new("knob")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and edit knob config documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("get")
                .about("Print the value of an entry")
                .arg(file())
                .arg(Arg::new("entry").required(true).help("Entry path, e.g. /camera/exposure")),
        )
        .subcommand(
            Command::new("set")
                .about("Set the value of an entry, creating it if missing")
                .arg(file())
                .arg(Arg::new("entry").required(true).help("Entry path"))
                .arg(Arg::new("value").required(true).help("New value text")),
        )
        .subcommand(
            Command::new("list")
                .about("List all leaf entries with their values")
                .arg(file()),
        )
        .subcommand(
            Command::new("merge")
                .about("Append the entries of another document")
                .arg(file())
                .arg(
                    Arg::new("other")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Document to merge in"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the result here instead of FILE"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print the document")
                .arg(file())
                .arg(
                    Arg::new("yaml")
                        .long("yaml")
                        .action(ArgAction::SetTrue)
                        .help("Print as YAML instead of JSON"),
                ),
        )
}

fn load(path: &Path) -> Result<ConfigTree> {
    ConfigTree::load(path).with_context(|| format!("cannot load {}", path.display()))
}

fn required<'a>(args: &'a clap::ArgMatches, id: &str) -> Result<&'a String> {
    args.get_one::<String>(id)
        .with_context(|| format!("missing argument {id}"))
}

fn file_arg(args: &clap::ArgMatches) -> Result<&PathBuf> {
    args.get_one::<PathBuf>("file").context("missing config file")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("get", args)) => {
            let tree = load(file_arg(args)?)?;
            let entry = required(args, "entry")?;
            if !tree.has_entry(entry) {
                bail!("no entry {entry}");
            }
            println!("{}", tree.string_entry(entry));
        }
        Some(("set", args)) => {
            let path = file_arg(args)?;
            let mut tree = if path.exists() {
                load(path)?
            } else {
                ConfigTree::new()
            };
            let entry = required(args, "entry")?;
            let value = required(args, "value")?;
            let node = tree.get_or_recreate_entry(entry);
            tree.set_text(node, value.as_str());
            tree.save(path)
                .with_context(|| format!("cannot save {}", path.display()))?;
            tracing::info!(file = %path.display(), entry = %entry, value = %value, "entry updated");
        }
        Some(("list", args)) => {
            let tree = load(file_arg(args)?)?;
            for (entry, value) in tree.leaf_entries() {
                println!("{entry} = {value}");
            }
        }
        Some(("merge", args)) => {
            let path = file_arg(args)?;
            let mut tree = load(path)?;
            let other_path = args.get_one::<PathBuf>("other").context("missing document to merge")?;
            let other = load(other_path)?;
            tree.merge_append(&other);
            let output = args.get_one::<PathBuf>("output").unwrap_or(path);
            tree.save(output)
                .with_context(|| format!("cannot save {}", output.display()))?;
            tracing::info!(
                file = %output.display(),
                merged = %other_path.display(),
                "documents merged"
            );
        }
        Some(("show", args)) => {
            let tree = load(file_arg(args)?)?;
            let format = if args.get_flag("yaml") {
                DocumentFormat::Yaml
            } else {
                DocumentFormat::Json
            };
            println!("{}", tree.to_document_string(format)?);
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}
