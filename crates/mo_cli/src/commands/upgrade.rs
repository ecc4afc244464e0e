use mo_runtime::snapshot::SNAPSHOT_VERSION;

use crate::args::CliArgs;
use crate::commands::common::load_or_exit;

pub(crate) fn run(args: &CliArgs) {
    if args.positional.len() != 2 {
        eprintln!("Usage: mo upgrade <in> <out>");
        std::process::exit(2);
    }
    let (input, output) = (args.positional[0].as_str(), args.positional[1].as_str());
    let mut loaded = load_or_exit(input);

    // The output file is only created once the whole snapshot saved.
    let mut bytes: Vec<u8> = Vec::new();
    let written = match loaded.pool.serialize(&mut bytes) {
        Ok(written) => written,
        Err(e) => {
            eprintln!("Save failed: {input}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::write(output, &bytes) {
        eprintln!("Write failed: {output}: {e}");
        std::process::exit(1);
    }
    println!(
        "{input} (v{}, {} objects) -> {output} (v{SNAPSHOT_VERSION}, {written} objects)",
        loaded.summary.version, loaded.summary.restored
    );
}
