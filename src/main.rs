use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;

use lalrpop_util::lalrpop_mod;
use log::error;
use regex::Regex;
use structopt::StructOpt;

use crate::cpu::{load_cpu_config, CPU};
use crate::instructions::instructions::WordType;
use crate::loader::loader::load;
use crate::report::format_report;

mod cpu;
mod loader;
mod frontend;
mod backend;
mod instructions;
mod memory_subsystem;
mod report;

lalrpop_mod!(assembly, "/loader/assembly.rs");

fn parse_mem_item(item: &str) -> Result<(u16, WordType), String> {
    let re = Regex::new(r"^(\d+)=(-?\d+)$").map_err(|err| err.to_string())?;
    let captures = re.captures(item)
        .ok_or_else(|| format!("expected ADDR=VALUE, got '{}'", item))?;
    let addr = captures[1].parse::<u16>()
        .map_err(|_| format!("address {} out of range", &captures[1]))?;
    let value = captures[2].parse::<WordType>()
        .map_err(|_| format!("value {} does not fit in 16 bits", &captures[2]))?;
    Ok((addr, value))
}

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo CPU Emulator")]
struct Opt {
    /// Path of the file to load
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "cpu.yaml")]
    config: PathBuf,

    /// Seeds a data memory word as ADDR=VALUE; may be repeated
    #[structopt(short, long, parse(try_from_str = parse_mem_item))]
    mem: Vec<(u16, WordType)>,

    /// Stops the run after this many cycles
    #[structopt(long)]
    max_cycles: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let mut cpu_config = match load_cpu_config(&opt.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            exit(1);
        }
    };

    if opt.max_cycles.is_some() {
        cpu_config.max_cycles = opt.max_cycles;
    }

    let mut program = match load(&opt.file) {
        Ok(program) => program,
        Err(err) => {
            error!("{}", err);
            exit(1);
        }
    };

    // seeded after the .data statements, so the command line wins
    program.data_items.extend(opt.mem);
    let program = Rc::new(program);

    let mut cpu = CPU::new(&cpu_config);
    cpu.run(&program);

    print!("{}", format_report(&cpu, &program));
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0=5", Ok((0, 5)))]
    #[case("65535=-32768", Ok((65535, -32768)))]
    #[case("65536=1", Err("address 65536 out of range".to_string()))]
    #[case("1=40000", Err("value 40000 does not fit in 16 bits".to_string()))]
    #[case("x=1", Err("expected ADDR=VALUE, got 'x=1'".to_string()))]
    fn test_parse_mem_item(#[case] item: &str, #[case] expected: Result<(u16, WordType), String>) {
        assert_eq!(parse_mem_item(item), expected);
    }
}
