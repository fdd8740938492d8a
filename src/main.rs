#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use ferryd::config;
use ferryd::supervisor::Supervisor;
use std::env;
use std::process;

fn main() {
    let mut supervisor = Supervisor::new();
    if let Err(err) = supervisor.run() {
        eprintln!("ferryd: {err}");
        if err.wants_usage() {
            let prog = env::args().next().unwrap_or_else(|| "ferryd".to_string());
            eprintln!("{}", config::usage(&prog));
        }
        process::exit(1);
    }
}
