use ctor::ctor;
use eyre::Report;
use log::debug;
use medicc::utils::global_init::global_init;
use medicc_cli::cli::commands::{run_detect_wgd_command, run_medicc_command};
use medicc_cli::cli::medicc_cli::{generate_shell_completions, medicc_parse_cli_args, MediccCommands};

#[ctor]
fn init() {
  global_init();
}

fn main() -> Result<(), Report> {
  let args = medicc_parse_cli_args()?;

  debug!("{:#?}", &args);

  if args.jobs.jobs == 1 {
    rayon::ThreadPoolBuilder::new()
      .num_threads(1)
      .use_current_thread()
      .build_global()?;
  } else {
    rayon::ThreadPoolBuilder::new()
      .num_threads(args.jobs.jobs)
      .build_global()?;
  }

  match args.command {
    MediccCommands::Run(run_args) => {
      run_medicc_command(&run_args, args.jobs.jobs)?;
    }
    MediccCommands::DetectWgd(detect_wgd_args) => {
      run_detect_wgd_command(&detect_wgd_args)?;
    }
    MediccCommands::Completions { shell } => {
      generate_shell_completions(shell)?;
    }
  }

  Ok(())
}
