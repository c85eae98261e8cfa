extern crate trainworld;
extern crate failure;
extern crate structopt;
extern crate env_logger;
extern crate log;

use trainworld::*;
use trainworld::eventsim::Simulation;
use trainworld::world::Config;
use std::path::PathBuf;
use structopt::StructOpt;

/// Trainworld -- train coordinator on a simulated kernel
#[derive(StructOpt, Debug)]
#[structopt(name="trainworld")]
struct Opt {
    /// Verbose mode (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Ticks between a stop command and the assumed standstill
    #[structopt(long = "stop-delay")]
    stop_delay: Option<u32>,

    /// Name lookups before the routing peer is registered
    #[structopt(long = "routing-delay", default_value = "0")]
    routing_delay: usize,

    /// Scenario script
    #[structopt(parse(from_os_str))]
    script: PathBuf,
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        });
    }
    builder.init();
}

fn run(opt :&Opt) -> AppResult<()> {
    let script = get_script(&opt.script)?;
    if opt.verbose >= 2 {
        println!("Script:");
        for x in &script.commands { println!("  - {:?}", x); }
        println!("");
    }

    let mut config = Config::default();
    if let Some(d) = opt.stop_delay {
        config.stop_delay = d;
    }

    let mut sim = Simulation::new(config, opt.routing_delay);
    sim.load(&script)?;
    let result = sim.run();

    print!("{}", output::history::transcript(sim.history())?);
    result?;
    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    init_logging(opt.verbose);
    match run(&opt) {
        Ok(()) => {},
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        },
    }
}
