use std::path::Path;

use serde::Serialize;

use crate::exit_codes;
use crate::manifest::{Manifest, ManifestError, ManifestFormat};
use crate::output::{print_error, print_result, OutputFormat};
use crate::{OutputArgs, RunArgs};

#[derive(Serialize)]
struct ValidateResult {
    valid: bool,
    format: ManifestFormat,
    operations: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

pub async fn validate_cmd(path: &Path, output: OutputArgs, run: RunArgs) -> i32 {
    let (manifest, format) = match Manifest::load(path) {
        Ok(v) => v,
        Err(e @ ManifestError::Read { .. }) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let errors = manifest.validate(run.preset);
    let result = ValidateResult {
        valid: errors.is_empty(),
        format,
        operations: manifest.operations.len(),
        errors,
    };

    if output.format == OutputFormat::Text && !output.quiet {
        if result.valid {
            println!(
                "ok: valid manifest with {} operation(s) ({format:?})",
                result.operations
            );
        } else {
            eprintln!("error: validation failed");
            for e in &result.errors {
                eprintln!("- {e}");
            }
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::VALIDATION_FAILED
    }
}
