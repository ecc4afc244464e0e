pub(crate) struct CliArgs {
    pub cmd: String,
    pub json_out: bool,
    pub positional: Vec<String>,
}

pub(crate) fn usage() -> &'static str {
    "Usage: mo <inspect|upgrade> [json] <args>\n  mo inspect <snapshot> [json]\n  mo upgrade <in> <out>"
}

pub(crate) fn parse_args() -> Result<CliArgs, String> {
    parse_from(std::env::args().skip(1).collect())
}

fn parse_from(mut argv: Vec<String>) -> Result<CliArgs, String> {
    if argv.is_empty() {
        return Err(usage().to_string());
    }
    let cmd = argv.remove(0);

    let mut json_out = false;
    let mut positional: Vec<String> = Vec::new();
    for a in argv {
        if a.starts_with("--") {
            return Err(format!("Unknown option: {a}"));
        }
        if a == "json" {
            json_out = true;
        } else {
            positional.push(a);
        }
    }

    Ok(CliArgs {
        cmd,
        json_out,
        positional,
    })
}
