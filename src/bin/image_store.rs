use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use base_image_store::cancel::CancelToken;
use base_image_store::config::{ConfigLoader, ConfigOverrides, StoreConfig};
use base_image_store::deriver::CommandDeriver;
use base_image_store::domain::ImageType;
use base_image_store::error::ImageStoreError;
use base_image_store::fetcher::HttpFetcher;
use base_image_store::output::{BaseFileResult, HaveVersionResult, JsonOutput, VersionListEntry};
use base_image_store::store::{BaseImageStore, ImageStore};

#[derive(Parser)]
#[command(name = "image-store")]
#[command(about = "Maintain the local cache of base OS boot images")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[arg(long, global = true, conflicts_with = "versions_file")]
    versions: Option<String>,

    #[arg(long, global = true)]
    versions_file: Option<String>,

    #[arg(long, global = true)]
    derive_command: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download missing full images and derive missing minimal images")]
    Populate,
    #[command(about = "Print the local path of an image")]
    BaseFile(BaseFileArgs),
    #[command(about = "Check whether a version is in the catalog")]
    HaveVersion(HaveVersionArgs),
    #[command(about = "List catalog versions")]
    Versions,
}

#[derive(Args)]
struct BaseFileArgs {
    version: String,
    image_type: String,
}

#[derive(Args)]
struct HaveVersionArgs {
    version: String,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            match report.downcast_ref::<ImageStoreError>() {
                Some(err) => ExitCode::from(map_exit_code(err)),
                None => ExitCode::from(1),
            }
        }
    }
}

fn map_exit_code(error: &ImageStoreError) -> u8 {
    match error {
        ImageStoreError::UnknownVersion(_) | ImageStoreError::UnsupportedImageType(_) => 2,
        ImageStoreError::Populate(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(ConfigOverrides {
        data_dir: cli.store.data_dir,
        versions: cli.store.versions,
        versions_file: cli.store.versions_file,
        derive_command: cli.store.derive_command,
    })?;

    match cli.command {
        Commands::Populate => run_populate(&config, cli.json),
        Commands::BaseFile(args) => run_base_file(&config, args, cli.json),
        Commands::HaveVersion(args) => run_have_version(&config, args, cli.json),
        Commands::Versions => run_versions(&config, cli.json),
    }
}

fn open_store(
    config: &StoreConfig,
) -> miette::Result<BaseImageStore<HttpFetcher, CommandDeriver>> {
    let fetcher = HttpFetcher::new().into_diagnostic()?;
    let deriver = config.deriver()?;
    Ok(BaseImageStore::new(config, fetcher, deriver)?)
}

fn run_populate(config: &StoreConfig, json: bool) -> miette::Result<ExitCode> {
    let store = open_store(config)?;
    match store.populate(&CancelToken::new()) {
        Ok(report) => {
            if json {
                JsonOutput::print_populate(&report).into_diagnostic()?;
            } else {
                for entry in &report.versions {
                    println!(
                        "{}\tfull={} ({:?})\tminimal={} ({:?})",
                        entry.version, entry.full_path, entry.full, entry.minimal_path, entry.minimal
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if json {
                JsonOutput::print_populate_failure(&err).into_diagnostic()?;
            }
            Err(ImageStoreError::from(err).into())
        }
    }
}

fn run_base_file(config: &StoreConfig, args: BaseFileArgs, json: bool) -> miette::Result<ExitCode> {
    let store = open_store(config)?;
    let image_type: ImageType = args.image_type.parse()?;
    let path = store.base_file_for(&args.version, image_type)?;
    if json {
        JsonOutput::print_base_file(&BaseFileResult {
            version: args.version,
            image_type: image_type.to_string(),
            path: path.to_string(),
        })
        .into_diagnostic()?;
    } else {
        println!("{path}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_have_version(
    config: &StoreConfig,
    args: HaveVersionArgs,
    json: bool,
) -> miette::Result<ExitCode> {
    let store = open_store(config)?;
    let present = store.have_version(&args.version);
    if json {
        JsonOutput::print_have_version(&HaveVersionResult {
            version: args.version,
            present,
        })
        .into_diagnostic()?;
    } else {
        println!("{present}");
    }
    Ok(if present {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_versions(config: &StoreConfig, json: bool) -> miette::Result<ExitCode> {
    let catalog = config.catalog()?;
    let entries = catalog
        .entries()
        .iter()
        .map(|(version, entry)| VersionListEntry::new(version, entry))
        .collect::<Vec<_>>();
    if json {
        JsonOutput::print_versions(&entries).into_diagnostic()?;
    } else {
        for entry in &entries {
            println!(
                "{}\t{}\t{}",
                entry.version,
                entry.iso_url.as_deref().unwrap_or("-"),
                entry.rootfs_url.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
