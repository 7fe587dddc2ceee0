use clap::{arg, ArgAction, Command};
use delinear::access::MaskPolicy;
use delinear::driver::{AnalysisConfig, ArrayInfoSink, Delinearizer, KernelFunction, RecordingSink};
use delinear::error::{Error, Result};
use delinear::fileformat;
use delinear::support::diagnostic::{DiagnosticContext, Remark};
use log::info;

fn run(file: &str, config: &AnalysisConfig, quiet: bool, diag: &DiagnosticContext) -> Result<()> {
    let module = fileformat::load_module(file)?;
    info!("Loaded {} with {} functions", module.name, module.functions.len());

    let mut sink = RecordingSink::default();
    let kernels: Vec<KernelFunction> = {
        let mut sinks: [&mut dyn ArrayInfoSink; 1] = [&mut sink];
        Delinearizer::new(&module, config, diag).run(&mut sinks)?
    };

    if !quiet {
        kernels.iter().for_each(|k| print!("{}", k));
    }
    print!("{}", sink);
    Ok(())
}

pub fn main() {
    env_logger::init();
    let matches = Command::new("delinear")
        .arg(arg!(<module> "The JSON description of the kernel module"))
        .arg(
            arg!(--"any-index-mask" "Mark dimensions indexed by any grid register, not only blockIdx")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--"fail-fast" "Stop at the first kernel that fails").action(ArgAction::SetTrue))
        .arg(arg!(--quiet "Do not print the access listings").action(ArgAction::SetTrue))
        .get_matches();

    let input_file = matches.get_one::<String>("module").unwrap();
    let config = AnalysisConfig {
        mask_policy: if matches.get_flag("any-index-mask") {
            MaskPolicy::AnyIndex
        } else {
            MaskPolicy::BlockIndex
        },
        fail_fast: matches.get_flag("fail-fast"),
        ..Default::default()
    };
    let diag = DiagnosticContext::default();

    let mut ret = 0;
    match run(input_file.as_str(), &config, matches.get_flag("quiet"), &diag) {
        // The failing kernel has already been reported
        Err(Error::AnalysisError(_)) => ret = -1,
        Err(x) => {
            diag.record(Remark::module(x, Some(format!("in {}", input_file))));
            ret = -1;
        }
        Ok(()) => {}
    }

    let r = diag.remarks();
    r.iter().for_each(|r| println!("{}", r));
    println!("Generates {} remarks", r.len());
    std::process::exit(ret);
}
