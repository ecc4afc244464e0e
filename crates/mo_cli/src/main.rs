mod args;
mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    env_logger::init();

    let args = match args::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    match args.cmd.as_str() {
        "inspect" => commands::inspect::run(&args),
        "upgrade" => commands::upgrade::run(&args),
        "help" => println!("{}", args::usage()),
        cmd => {
            eprintln!("Unknown command: {cmd}");
            eprintln!("{}", args::usage());
            std::process::exit(2);
        }
    }
}
