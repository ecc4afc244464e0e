use std::io::Write;

use serde_json::json;

use crate::args::CliArgs;
use crate::commands::common::{Loaded, load_or_exit};

pub(crate) fn run(args: &CliArgs) {
    if args.positional.len() != 1 {
        eprintln!("Missing <snapshot>");
        std::process::exit(2);
    }
    let path = args.positional[0].as_str();
    let loaded = load_or_exit(path);

    let result = if args.json_out {
        print_json(&loaded)
    } else {
        print_text(&loaded)
    };
    if let Err(e) = result {
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            return;
        }
        eprintln!("stdout error: {e}");
        std::process::exit(2);
    }
}

struct Entry<'a> {
    handle: i32,
    type_name: &'a str,
    length: usize,
    ref_count: i32,
}

fn entries(loaded: &Loaded) -> Vec<Entry<'_>> {
    loaded
        .pool
        .live_handles()
        .filter_map(|handle| {
            let object = loaded.pool.handle_to_object(handle)?;
            Some(Entry {
                handle: handle.get(),
                type_name: object.manager.type_name(),
                length: loaded.reader.store().len_of(object.address).unwrap_or(0),
                ref_count: object.ref_count,
            })
        })
        .collect()
}

fn print_text(loaded: &Loaded) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "version {}, {} objects, next handle {}",
        loaded.summary.version,
        loaded.summary.restored,
        loaded.pool.next_handle().get()
    )?;
    for e in entries(loaded) {
        writeln!(
            out,
            "#{}\t{}\t{} bytes\trefcount {}",
            e.handle, e.type_name, e.length, e.ref_count
        )?;
    }
    Ok(())
}

fn print_json(loaded: &Loaded) -> std::io::Result<()> {
    let objects: Vec<serde_json::Value> = entries(loaded)
        .into_iter()
        .map(|e| {
            json!({
                "handle": e.handle,
                "type": e.type_name,
                "length": e.length,
                "refcount": e.ref_count,
            })
        })
        .collect();
    let obj = json!({
        "version": loaded.summary.version,
        "count": loaded.summary.restored,
        "next_handle": loaded.pool.next_handle().get(),
        "objects": objects,
    });
    writeln!(std::io::stdout().lock(), "{obj}")
}
