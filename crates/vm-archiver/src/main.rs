use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args as ClapArgs, Parser, Subcommand};

use vm_archiver::Result;
use vm_archiver::config::Settings;
use vm_archiver::orchestrator::{Operation, Orchestrator};
use vm_archiver::s3::AwsS3Cli;
use vm_archiver::selector::Selector;
use vm_archiver::session::Session;
use vm_archiver::staging::StagingArea;
use vm_archiver::xo::XoCli;

#[derive(Debug, Parser)]
#[command(author, version, about, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
    #[command(flatten)]
    selector: SelectorArgs,
    /// Source configuration from this env file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Resolve the selector and print the steps without running them or
    /// registering a control-plane session
    #[arg(long, global = true)]
    dry_run: bool,
    /// Emit log records as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, ClapArgs)]
struct SelectorArgs {
    /// Id of a VM known to the control plane
    #[arg(long, global = true)]
    vm_id: Option<String>,
    /// Display name of a VM known to the control plane (must be unique)
    #[arg(long, global = true)]
    vm_name: Option<String>,
    /// Name an archive was stored under in the bucket
    #[arg(long, global = true)]
    archived_vm_name: Option<String>,
    /// Storage repository to import into (with --xva-file)
    #[arg(long, global = true)]
    sr_id: Option<String>,
    /// Image file to import (with --sr-id)
    #[arg(long, global = true)]
    xva_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Export the VM image and metadata into the staging directory
    Export,
    /// Upload the staging directory to the bucket, then remove it locally
    Push,
    /// Download an archive from the bucket and check it is complete
    Pull,
    /// Delete the VM and its disks
    Delete,
    /// Export, prove the export restores, push it, then delete the VM
    Archive,
    /// Import a staged archive (or --xva-file into --sr-id)
    Import,
    /// Import --xva-file into --sr-id and delete the result right away
    TemporarilyRestoresXva,
    /// Pull an archive, import it and clean the staging directory
    Restore,
    /// Check the staged files and print the storage repository and image path
    GetMetadataFromLocalFiles,
    /// Remove the staging directory
    Clean,
}

impl Command {
    fn operation(self) -> Operation {
        match self {
            Self::Export => Operation::Export,
            Self::Push => Operation::Push,
            Self::Pull => Operation::Pull,
            Self::Delete => Operation::Delete,
            Self::Archive => Operation::Archive,
            Self::Import => Operation::Import,
            Self::TemporarilyRestoresXva => Operation::TemporarilyRestoresXva,
            Self::Restore => Operation::Restore,
            Self::GetMetadataFromLocalFiles => Operation::GetMetadataFromLocalFiles,
            Self::Clean => Operation::Clean,
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };
    vm_archiver::logging::init(args.log_json, args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            tracing::error!(exit_code = code, "{e}");
            ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.env_file.as_deref())?;
    let op = args.cmd.operation();
    let sel = args.selector;
    let selector = Selector::from_options(
        sel.vm_id,
        sel.vm_name,
        sel.archived_vm_name,
        sel.sr_id,
        sel.xva_file,
    )?;

    let cp = XoCli::new(settings.xo_cli_bin.clone());
    let store = AwsS3Cli::new(settings.aws_cli_bin.clone(), settings.s3.clone());
    let orchestrator = Orchestrator::new(
        &cp,
        &store,
        StagingArea::new(&settings.local_root),
        Session::new(settings.xo.clone()),
    );

    if args.dry_run {
        let (target, steps) = orchestrator.preview(op, selector.as_ref())?;
        for (i, step) in steps.iter().enumerate() {
            println!("{:>2}. {:<24} {}", i + 1, step.name(), target);
        }
        return Ok(());
    }

    let report = orchestrator.run(op, selector.as_ref())?;
    if op == Operation::GetMetadataFromLocalFiles {
        if let Some(record) = &report.record {
            println!("sr_id={}", record.sr_id());
            println!("xva_file={}", record.image_path().display());
        }
    }
    if let Some(vm_id) = &report.imported_vm {
        println!("imported_vm_id={vm_id}");
    }
    Ok(())
}
