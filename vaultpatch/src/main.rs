mod apply;
mod destroy;
mod import;
mod logging;
mod provider;
mod refresh;
mod show;
mod state;

use std::{io::IsTerminal as _, path::PathBuf, process::exit};

use anyhow::Result;
use clap::{ColorChoice, CommandFactory as _, Parser, Subcommand};

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "vaultpatch", &mut std::io::stdout());
            Ok(())
        }
        command => {
            logging::set_up(&logging::Options {
                verbose: args.options.verbose,
                color: use_color(args.options.color),
            })?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_command(&args.options, command))
        }
    }
}

async fn run_command(options: &Options, command: &Commands) -> Result<()> {
    match command {
        Commands::Apply(subargs) => apply::apply(options, subargs).await,
        Commands::Refresh { name } => refresh::refresh(options, name).await,
        Commands::Destroy { name } => destroy::destroy(options, name).await,
        Commands::Import { name, id } => import::import(options, name, id).await,
        Commands::Show => show::show(options),
        Commands::GenerateMan | Commands::GenerateMarkdown | Commands::GenerateCompletion { .. } => {
            unreachable!("handled before the runtime is started")
        }
    }
}

fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stderr().is_terminal(),
    }
}

fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("vaultpatch error: {:#}", e);
            exit(1);
        }
    }
}

/// vaultpatch: manage individual keys in shared Vault KV v2 secrets
///
/// Each resource owns a set of keys within one secret. Keys in the same
/// secret that belong to nobody, or to other resources, are left as they are.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Parser, Debug, Clone)]
pub(crate) struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// The state file that records which keys are managed
    #[arg(long, global = true, default_value = "vaultpatch-state.json")]
    pub state: PathBuf,

    #[command(flatten)]
    pub vault: provider::VaultOptions,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update a resource so that its keys have the declared values
    #[command()]
    Apply(apply::Args),

    /// Compare a resource with Vault and record what is actually there
    Refresh {
        /// The name of the resource in the state file
        name: String,
    },

    /// Remove the keys of a resource from Vault and stop tracking it
    Destroy {
        /// The name of the resource in the state file
        name: String,
    },

    /// Start tracking every key of an existing secret
    Import {
        /// The name to give the resource in the state file
        name: String,
        /// The secret to import, as MOUNT/PATH
        id: String,
    },

    /// List the tracked resources and the names of their keys
    Show,

    /// Generate markdown documentation for vaultpatch
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for vaultpatch
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for vaultpatch
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
