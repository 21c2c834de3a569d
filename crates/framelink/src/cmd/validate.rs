use framelink_channel::is_known;
use framelink_schema::{SchemaError, SchemaRegistry};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cmd::ValidateArgs;
use crate::exit::{io_error, schema_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct ValidateOutput<'a> {
    name: &'a str,
    valid: bool,
}

pub fn run(args: ValidateArgs, format: OutputFormat) -> CliResult<i32> {
    if !is_known(&args.name) {
        return Err(CliError::new(
            USAGE,
            format!("unknown message name: {}", args.name),
        ));
    }

    let mut registry =
        SchemaRegistry::builtin().map_err(|err| schema_error("built-in schemas", err))?;
    if let Some(dir) = &args.schemas {
        let metadata = std::fs::metadata(dir).map_err(|err| io_error("--schemas", err))?;
        if !metadata.is_dir() {
            return Err(CliError::new(
                USAGE,
                format!("--schemas: not a directory: {}", dir.display()),
            ));
        }
        let loaded = registry
            .load_directory(dir)
            .map_err(|err| schema_error("--schemas", err))?;
        debug!(loaded, dir = %dir.display(), "loaded schema overrides");
    }
    if !registry.has_schema(&args.name) {
        return Err(schema_error("validate", SchemaError::NoSchema(args.name)));
    }

    let payload: Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(DATA_INVALID, format!("--json: {err}")))?;
    registry
        .validate(&args.name, &payload)
        .map_err(|err| schema_error("validate", err))?;

    match format {
        OutputFormat::Json => print_json(&ValidateOutput {
            name: &args.name,
            valid: true,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}: valid", args.name),
    }
    Ok(SUCCESS)
}
